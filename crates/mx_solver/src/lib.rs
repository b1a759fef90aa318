// crates/mx_solver/src/lib.rs

//! MxSim 求解器层 (Layer 3)
//!
//! 自适应步长 Heun 积分器，推进逐单元归一化的矢量场。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use mx_solver::{Heun, HeunConfig};
//!
//! let mut solver = Heun::new(m, torque, HeunConfig::new(1e-15, 1.0))?;
//! solver.advance_by_seconds(1e-9)?;
//! solver.log_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod heun;
pub mod state;

/// 层级标识
pub const LAYER: u8 = 3;

pub use config::HeunConfig;
pub use heun::{Derivative, Heun, StepOutcome};
pub use state::SolverState;
