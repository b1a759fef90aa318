// crates/mx_runtime/src/lib.rs

//! MxSim Runtime Layer (Layer 2)
//!
//! 运行时抽象层，提供设备缓冲区、计算设备与缓冲池。
//!
//! # 模块概览
//!
//! - [`block`]: `Block` 固定形状缓冲区（共享句柄 + 引用计数）
//! - [`device`]: `Device` trait、`HostDevice` 与独占的 `DeviceContext`
//! - [`pool`]: `BufferPool` 引用计数回收池
//! - [`kernels`]: 逐单元并行的矢量运算
//!
//! # 缓冲区生命周期
//!
//! ```text
//!  BufferPool::get() ──> 独占持有 ──share()──> 共享（refcount > 0）
//!        ^                   │                       │
//!        │                   └──── recycle() <───────┘
//!        └──── 回收集（refcount == 0，满则丢弃）
//! ```
//!
//! # 设计原则
//!
//! 1. **稳态零分配**: 仅在缓冲池未命中时分配与页锁定
//! 2. **共享不可写**: 引用计数非零时拒绝可变访问
//! 3. **独占上下文**: 传输操作必须持有 `DeviceContext`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod device;
pub mod kernels;
pub mod pool;

/// 层级标识
pub const LAYER: u8 = 2;

// 重导出核心类型
pub use block::Block;
pub use device::{ContextSlot, Device, DeviceContext, HostDevice, MemoryLocation};
pub use pool::{BufferPool, PoolConfig, PoolStats};

/// Prelude 模块
pub mod prelude {
    //! 常用类型预导入
    pub use crate::{Block, BufferPool, Device, DeviceContext, HostDevice, MemoryLocation, PoolConfig};
    pub use mx_foundation::{MxError, MxResult, Shape};
}
