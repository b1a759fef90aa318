// crates/mx_config/src/lib.rs

//! MxSim Config Layer (Layer 4)
//!
//! 配置层，加载 JSON 模拟配置并转换为各层的核心配置。
//!
//! # 模块概览
//!
//! - [`sim_config`]: SimConfig 模拟配置
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: mx_cli      ─> uses SimConfig
//! Layer 4: mx_config   ─> SimConfig (本层)
//! Layer 3: mx_io / mx_solver ─> PipelineConfig, HeunConfig
//! Layer 2: mx_runtime  ─> PoolConfig
//! Layer 1: mx_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod sim_config;

/// 层级标识
pub const LAYER: u8 = 4;

// 重导出核心类型
pub use error::ConfigError;
pub use sim_config::{MeshConfig, OutputConfig, PoolSection, SimConfig, SolverSection, TorqueConfig};
