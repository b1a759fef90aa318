// crates/mx_solver/src/config.rs

//! Heun 积分器配置

use std::path::PathBuf;

use mx_foundation::{ensure, MxError, MxResult};

/// Heun 积分器配置
#[derive(Debug, Clone, PartialEq)]
pub struct HeunConfig {
    /// 初始时间步长 [s]
    pub dt: f64,
    /// 时间步长倍率（状态更新使用 `dt * multiplier`）
    pub multiplier: f64,
    /// 单步误差上限
    pub max_err: f64,
    /// 步长修正余量，取值 (0, 1]
    pub headroom: f64,
    /// 最小步长 [s]，达到后强制接受
    pub min_dt: f64,
    /// 最大步长 [s]，0 表示不限制
    pub max_dt: f64,
    /// 固定步长 [s]，0 表示自适应
    pub fixed_dt: f64,
    /// 单次修正的最大放大倍数
    pub max_growth: f64,
    /// 单次修正的最大缩小倍数
    pub max_shrink: f64,
    /// 调试轨迹文件（每次试探记录 t, dt, err）
    pub debug_trace: Option<PathBuf>,
}

impl Default for HeunConfig {
    fn default() -> Self {
        Self {
            dt: 1e-15,
            multiplier: 1.0,
            max_err: 1e-4,
            headroom: 0.75,
            min_dt: 0.0,
            max_dt: 0.0,
            fixed_dt: 0.0,
            max_growth: 2.0,
            max_shrink: 0.5,
            debug_trace: None,
        }
    }
}

impl HeunConfig {
    /// 以给定初始步长和倍率创建
    pub fn new(dt: f64, multiplier: f64) -> Self {
        Self {
            dt,
            multiplier,
            ..Default::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> MxResult<()> {
        MxError::check_positive("solver.dt", self.dt)?;
        MxError::check_positive("solver.multiplier", self.multiplier)?;
        MxError::check_positive("solver.max_err", self.max_err)?;

        ensure!(
            self.headroom > 0.0 && self.headroom <= 1.0,
            MxError::invalid_config("solver.headroom", self.headroom.to_string(), "必须在 (0, 1] 内")
        );

        for (key, value) in [
            ("solver.min_dt", self.min_dt),
            ("solver.max_dt", self.max_dt),
            ("solver.fixed_dt", self.fixed_dt),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MxError::invalid_config(
                    key,
                    value.to_string(),
                    "必须为有限非负数",
                ));
            }
        }

        ensure!(
            self.max_dt <= 0.0 || self.max_dt >= self.min_dt,
            MxError::invalid_config(
                "solver.max_dt",
                self.max_dt.to_string(),
                format!("小于 min_dt ({})", self.min_dt),
            )
        );

        if !(self.max_growth.is_finite() && self.max_growth >= 1.0) {
            return Err(MxError::invalid_config(
                "solver.max_growth",
                self.max_growth.to_string(),
                "必须为不小于 1 的有限数",
            ));
        }
        if !(self.max_shrink > 0.0 && self.max_shrink <= 1.0) {
            return Err(MxError::invalid_config(
                "solver.max_shrink",
                self.max_shrink.to_string(),
                "必须在 (0, 1] 内",
            ));
        }

        Ok(())
    }
}
