// crates/mx_foundation/src/lib.rs

//! MxSim Foundation Layer (Layer 1)
//!
//! 基础层，提供整个项目共享的最小抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `MxError` 与 `ensure!` 宏
//! - [`shape`]: 多分量场的形状（分量数 × 单元数）
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: mx_cli        ─> 命令行与示例编排
//! Layer 4: mx_config     ─> SimConfig
//! Layer 3: mx_io / mx_solver ─> OutputPipeline, Heun
//! Layer 2: mx_runtime    ─> Block, BufferPool, Device
//! Layer 1: mx_foundation ─> MxError, Shape (本层)
//! ```
//!
//! # 示例
//!
//! ```
//! use mx_foundation::{MxError, MxResult, Shape};
//!
//! fn check(shape: Shape) -> MxResult<usize> {
//!     mx_foundation::ensure!(shape.ncell() > 0, MxError::invalid_input("空网格"));
//!     Ok(shape.len())
//! }
//!
//! assert_eq!(check(Shape::vector(8)).unwrap(), 24);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod shape;

/// 层级标识
pub const LAYER: u8 = 1;

// 重导出常用类型
pub use error::{MxError, MxResult};
pub use shape::Shape;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{MxError, MxResult};
    pub use crate::shape::Shape;
    pub use crate::ensure;
}
