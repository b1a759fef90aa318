// crates/mx_solver/src/heun.rs

//! 自适应步长 Heun 预测-校正积分器
//!
//! 推进单位矢量场 `y`（每步后归一化），导数由调用方提供。
//!
//! ## 单步算法
//!
//! 记 `dt = dt_si * multiplier`：
//!
//! 1. `dy0 = f(y, t)`，预测 `y += dy0 * dt`
//! 2. `dy1 = f(y, t + dt_si)`，误差 `err = max_i |dy0_i - dy1_i| * dt`
//! 3. 接受：`y += (dy1 - dy0) * dt / 2`，归一化，`t += dt_si`，
//!    步长按 `(max_err / err)^(1/2)` 修正
//! 4. 拒绝：`y -= dy0 * dt` 还原，步长按 `(max_err / err)^(1/3)` 修正
//!
//! ## 保存时机
//!
//! 导数的 `can_save` 参数只在某个已接受状态的第一次试探的第一级为 `true`。
//! 拒绝后重试的第一级、以及所有第二级均为 `false`，因此每个已接受状态的
//! 保存副作用至多发生一次。

use mx_foundation::{ensure, MxError, MxResult};
use mx_io::{Column, TableWriter};
use mx_runtime::{kernels, Block};
use tracing::{debug, info, trace};

use crate::config::HeunConfig;
use crate::state::SolverState;

/// 导数函数 Trait
pub trait Derivative {
    /// 计算 `dy/dt`
    ///
    /// 返回的缓冲区须与 `y` 形状一致，在下一次调用前保持有效。
    /// `can_save` 为 `true` 时调用方可在此做快照记录。
    fn eval(&mut self, y: &Block, time: f64, can_save: bool) -> MxResult<&Block>;

    /// 每次推进结束时调用，刷新待处理的记录
    fn finish(&mut self) -> MxResult<()> {
        Ok(())
    }
}

/// 单次试探结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// 已接受
    Accepted {
        /// 误差估计
        err: f64,
    },
    /// 已拒绝并还原
    Rejected {
        /// 误差估计
        err: f64,
    },
}

impl StepOutcome {
    /// 是否被接受
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// 误差估计
    pub fn err(&self) -> f64 {
        match *self {
            Self::Accepted { err } | Self::Rejected { err } => err,
        }
    }
}

/// Heun 积分器
pub struct Heun<D> {
    y: Block,
    dy0: Block,
    f: D,
    state: SolverState,
    normalized: bool,
    retrying: bool,
    trace: Option<TableWriter>,
}

impl<D: Derivative> Heun<D> {
    /// 创建积分器
    pub fn new(y: Block, f: D, config: HeunConfig) -> MxResult<Self> {
        config.validate()?;
        ensure!(!y.shape().is_empty(), MxError::invalid_input("状态场为空"));
        ensure!(
            !y.is_shared(),
            MxError::BlockShared {
                refcount: y.refcount(),
            }
        );

        let trace = match &config.debug_trace {
            Some(path) => Some(TableWriter::create(
                path,
                vec![
                    Column::new("t", "s"),
                    Column::new("dt", "s"),
                    Column::new("err", ""),
                ],
            )?),
            None => None,
        };

        let dy0 = Block::zeros(y.shape(), y.location());
        Ok(Self {
            y,
            dy0,
            f,
            state: SolverState::from_config(&config),
            normalized: false,
            retrying: false,
            trace,
        })
    }

    /// 推进给定模拟时长
    pub fn advance_by_seconds(&mut self, seconds: f64) -> MxResult<()> {
        if !(seconds.is_finite() && seconds >= 0.0) {
            return Err(MxError::invalid_input(format!(
                "推进时长必须为有限非负数: {}",
                seconds
            )));
        }
        info!(seconds, "Heun 求解器推进");
        let stop = self.state.time + seconds;
        while self.state.time < stop {
            self.step()?;
        }
        self.finish_advance()
    }

    /// 推进给定试探次数（含被拒绝的试探）
    pub fn advance_by_steps(&mut self, count: u64) -> MxResult<()> {
        info!(count, "Heun 求解器推进");
        for _ in 0..count {
            self.step()?;
        }
        self.finish_advance()
    }

    fn finish_advance(&mut self) -> MxResult<()> {
        self.f.finish()?;
        if let Some(trace) = self.trace.as_mut() {
            trace.flush()?;
        }
        Ok(())
    }

    /// 执行一次试探步
    pub fn step(&mut self) -> MxResult<StepOutcome> {
        if !self.normalized {
            kernels::normalize(&mut self.y)?;
            self.normalized = true;
        }

        let t0 = self.state.time;
        let dt_si = self.state.dt;
        let dt = self.state.scaled_dt() as f32;
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(MxError::numerical(format!(
                "步长超出 f32 范围: {:e}",
                self.state.scaled_dt()
            )));
        }
        let can_save = !self.retrying;

        // 第一级
        {
            let dy = self.f.eval(&self.y, t0, can_save)?;
            MxError::check_shape("dy0", self.y.shape(), dy.shape())?;
            self.dy0.copy_from(dy)?;
        }
        kernels::madd(&mut self.y, &self.dy0, dt)?;

        // 第二级
        let dy = self.f.eval(&self.y, t0 + dt_si, false)?;
        if let Err(e) = MxError::check_shape("dy1", self.y.shape(), dy.shape()) {
            kernels::madd(&mut self.y, &self.dy0, -dt)?;
            return Err(e);
        }
        let err = kernels::max_vec_diff(&self.dy0, dy)? as f64 * dt as f64;

        if let Some(trace) = self.trace.as_mut() {
            trace.add_row(&[t0, dt_si, err])?;
        }
        self.state.last_err = err;

        if !err.is_finite() {
            kernels::madd(&mut self.y, &self.dy0, -dt)?;
            return Err(MxError::numerical(format!(
                "误差估计非有限: t={:e}, dt={:e}, err={}",
                t0, dt_si, err
            )));
        }

        if self.state.accepts(err) {
            kernels::madd_diff(&mut self.y, dy, &self.dy0, 0.5 * dt)?;
            kernels::normalize(&mut self.y)?;
            self.state.time += dt_si;
            self.state.steps += 1;
            self.state.adapt((self.state.max_err / err).powf(1.0 / 2.0));
            self.retrying = false;
            trace!(t = self.state.time, dt = dt_si, err, "接受");
            Ok(StepOutcome::Accepted { err })
        } else {
            kernels::madd(&mut self.y, &self.dy0, -dt)?;
            self.state.undone += 1;
            self.state.adapt((self.state.max_err / err).powf(1.0 / 3.0));
            self.retrying = true;
            trace!(t = t0, dt = dt_si, err, "拒绝");
            Ok(StepOutcome::Rejected { err })
        }
    }

    /// 输出求解器状态摘要（debug 级）
    pub fn log_summary(&self) {
        let s = &self.state;
        debug!(
            time = s.time,
            dt = s.dt,
            steps = s.steps,
            undone = s.undone,
            last_err = s.last_err,
            max_err = s.max_err,
            "Heun 求解器状态"
        );
    }

    /// 求解器状态
    pub fn state(&self) -> &SolverState {
        &self.state
    }

    /// 当前状态场
    pub fn y(&self) -> &Block {
        &self.y
    }

    /// 导数函数
    pub fn derivative(&self) -> &D {
        &self.f
    }

    /// 导数函数（可变）
    pub fn derivative_mut(&mut self) -> &mut D {
        &mut self.f
    }

    /// 拆出状态场与导数函数
    pub fn into_parts(self) -> (Block, D) {
        (self.y, self.f)
    }
}

impl<D> std::fmt::Debug for Heun<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heun")
            .field("shape", &self.y.shape())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
