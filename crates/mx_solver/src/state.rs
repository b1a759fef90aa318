// crates/mx_solver/src/state.rs

//! 求解器状态
//!
//! 时间、步长与计数器。仅由积分器修改，报告代码只读。

use crate::config::HeunConfig;

/// 求解器状态
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    /// 当前模拟时间 [s]
    pub time: f64,
    /// 当前步长 [s]
    pub dt: f64,
    /// 步长倍率
    pub multiplier: f64,
    /// 已接受步数
    pub steps: u64,
    /// 被拒绝的试探步数
    pub undone: u64,
    /// 最小步长 [s]
    pub min_dt: f64,
    /// 最大步长 [s]（0 = 不限制）
    pub max_dt: f64,
    /// 固定步长 [s]（0 = 自适应）
    pub fixed_dt: f64,
    /// 误差上限
    pub max_err: f64,
    /// 修正余量
    pub headroom: f64,
    /// 最大放大倍数
    pub max_growth: f64,
    /// 最大缩小倍数
    pub max_shrink: f64,
    /// 最近一次试探的误差
    pub last_err: f64,
}

impl SolverState {
    /// 从配置初始化
    pub fn from_config(config: &HeunConfig) -> Self {
        let dt = if config.fixed_dt > 0.0 {
            config.fixed_dt
        } else {
            config.dt
        };
        Self {
            time: 0.0,
            dt,
            multiplier: config.multiplier,
            steps: 0,
            undone: 0,
            min_dt: config.min_dt,
            max_dt: config.max_dt,
            fixed_dt: config.fixed_dt,
            max_err: config.max_err,
            headroom: config.headroom,
            max_growth: config.max_growth,
            max_shrink: config.max_shrink,
            last_err: 0.0,
        }
    }

    /// 状态更新使用的有效步长 `dt * multiplier`
    #[inline]
    pub fn scaled_dt(&self) -> f64 {
        self.dt * self.multiplier
    }

    /// 是否应接受误差为 `err` 的试探步
    #[inline]
    pub fn accepts(&self, err: f64) -> bool {
        err < self.max_err || self.dt <= self.min_dt || self.fixed_dt > 0.0
    }

    /// 按修正因子调整步长
    ///
    /// 固定步长时直接使用 `fixed_dt`；否则修正因子乘以余量后限制在
    /// `[max_shrink, max_growth]`，结果再限制在 `[min_dt, max_dt]`。
    pub fn adapt(&mut self, corr: f64) {
        if self.fixed_dt > 0.0 {
            self.dt = self.fixed_dt;
            return;
        }
        let corr = (corr * self.headroom).clamp(self.max_shrink, self.max_growth);
        let mut dt = self.dt * corr;
        if dt < self.min_dt {
            dt = self.min_dt;
        }
        if self.max_dt > 0.0 && dt > self.max_dt {
            dt = self.max_dt;
        }
        if dt > 0.0 && dt.is_finite() {
            self.dt = dt;
        }
    }

    /// 总试探次数
    pub fn trials(&self) -> u64 {
        self.steps + self.undone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SolverState {
        SolverState::from_config(&HeunConfig::new(1e-12, 1.0))
    }

    #[test]
    fn test_adapt_clamps_growth() {
        let mut s = state();
        s.adapt(f64::INFINITY);
        assert!((s.dt - 2e-12).abs() < 1e-24);
        s.adapt(0.0);
        assert!((s.dt - 1e-12).abs() < 1e-24);
    }

    #[test]
    fn test_adapt_respects_bounds() {
        let mut s = state();
        s.min_dt = 8e-13;
        s.max_dt = 1.2e-12;
        s.adapt(0.1);
        assert_eq!(s.dt, 8e-13);
        s.adapt(100.0);
        assert_eq!(s.dt, 1.2e-12);
    }

    #[test]
    fn test_fixed_dt() {
        let cfg = HeunConfig {
            fixed_dt: 5e-13,
            ..HeunConfig::new(1e-12, 1.0)
        };
        let mut s = SolverState::from_config(&cfg);
        assert_eq!(s.dt, 5e-13);
        s.adapt(10.0);
        assert_eq!(s.dt, 5e-13);
        assert!(s.accepts(1.0));
    }

    #[test]
    fn test_accepts_at_min_dt() {
        let mut s = state();
        assert!(!s.accepts(1.0));
        s.min_dt = s.dt;
        assert!(s.accepts(1.0));
    }
}
