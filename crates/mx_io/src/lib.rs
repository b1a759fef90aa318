// crates/mx_io/src/lib.rs

//! MxSim IO 模块 (Layer 3)
//!
//! 提供快照输出功能。
//!
//! # 模块
//!
//! - [`pipeline`]: 两级异步输出管道（下载 + 写盘）
//! - [`writer`]: 写盘契约与二进制转储格式
//! - [`table`]: 制表符分隔的数据表
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use mx_io::{DumpWriter, OutputPipeline, PipelineConfig};
//!
//! let writer = DumpWriter::new("out")?;
//! let mut pipeline = OutputPipeline::new(PipelineConfig::default(), device, pool, writer)?;
//! pipeline.submit_copy("m000000.dump", &m, 0.0)?;
//! pipeline.drain()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pipeline;
pub mod table;
pub mod writer;

/// 层级标识
pub const LAYER: u8 = 3;

// 重导出常用类型
pub use pipeline::{
    DownloadTask, OutputPipeline, PipelineConfig, PipelineState, PipelineStats, SaveTask,
};
pub use table::{Column, TableWriter};
pub use writer::{read_dump, write_dump, Dump, DumpWriter, SnapshotWriter};
