// crates/mx_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `MxError` 枚举和 `MxResult` 类型别名，用于整个项目的错误处理。
//!
//! # 错误分类
//!
//! 1. **配置错误**: 时间步长、倍率等非法配置，构造时立即失败
//! 2. **资源耗尽**: 缓冲池分配上限已到且无可回收缓冲区（正确使用时不可达）
//! 3. **数值错误**: 误差估计出现 NaN/Inf
//! 4. **IO 错误**: 写盘失败，终止保存线程
//!
//! 试探步被拒绝属于正常控制流，不是错误，不会出现在这里。
//!
//! # 示例
//!
//! ```
//! use mx_foundation::error::{MxError, MxResult};
//!
//! fn dt_config(dt: f64) -> MxResult<f64> {
//!     if dt <= 0.0 {
//!         return Err(MxError::invalid_config("solver.dt", dt.to_string(), "必须为正"));
//!     }
//!     Ok(dt)
//! }
//!
//! assert!(dt_config(-1.0).is_err());
//! ```

use crate::shape::Shape;
use thiserror::Error;

/// 统一结果类型
pub type MxResult<T> = Result<T, MxError>;

/// MxSim 错误类型
#[derive(Error, Debug)]
pub enum MxError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件格式错误
    #[error("文件格式错误: {message}")]
    Format {
        /// 错误信息
        message: String,
    },

    // ========================================================================
    // 配置与输入错误
    // ========================================================================
    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 形状不匹配
    #[error("形状不匹配: {name} 期望 {expected}, 实际 {actual}")]
    ShapeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望形状
        expected: Shape,
        /// 实际形状
        actual: Shape,
    },

    // ========================================================================
    // 资源错误
    // ========================================================================
    /// 缓冲池耗尽
    #[error("缓冲池耗尽: 已分配 {max_alloc} 个缓冲区且回收集为空")]
    PoolExhausted {
        /// 分配上限
        max_alloc: usize,
    },

    /// 缓冲区仍被共享，拒绝写入
    #[error("缓冲区仍被 {refcount} 个读者共享，不可写入")]
    BlockShared {
        /// 当前引用计数
        refcount: usize,
    },

    /// 设备上下文已被占用
    #[error("设备上下文已被占用: {device}")]
    ContextBusy {
        /// 设备名称
        device: String,
    },

    // ========================================================================
    // 并发错误
    // ========================================================================
    /// 输出管道已关闭
    #[error("输出管道已关闭")]
    PipelineClosed,

    /// 工作线程异常退出
    #[error("工作线程异常退出: {worker}")]
    WorkerPanicked {
        /// 线程名称
        worker: String,
    },

    // ========================================================================
    // 计算错误
    // ========================================================================
    /// 数值错误（NaN/Inf）
    #[error("数值错误: {message}")]
    Numerical {
        /// 错误描述
        message: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl MxError {
    /// IO 错误（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 文件格式错误
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 形状不匹配
    pub fn shape_mismatch(name: &'static str, expected: Shape, actual: Shape) -> Self {
        Self::ShapeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 数值错误
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical {
            message: message.into(),
        }
    }

    /// 工作线程异常
    pub fn worker_panicked(worker: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            worker: worker.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 检查形状是否一致
    #[inline]
    pub fn check_shape(name: &'static str, expected: Shape, actual: Shape) -> MxResult<()> {
        if expected != actual {
            Err(Self::shape_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查配置值为正且有限
    #[inline]
    pub fn check_positive(key: &'static str, value: f64) -> MxResult<()> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(Self::invalid_config(key, value.to_string(), "必须为有限正数"))
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for MxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// 条件不满足时提前返回错误
///
/// ```
/// use mx_foundation::{ensure, MxError, MxResult};
///
/// fn positive(v: i32) -> MxResult<()> {
///     ensure!(v > 0, MxError::invalid_input("必须为正"));
///     Ok(())
/// }
/// assert!(positive(-1).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

// ========================================================================
// 测试
// ========================================================================
