// crates/mx_runtime/src/device.rs

//! Device - 计算设备抽象
//!
//! 设备负责缓冲区分配、主机内存页锁定以及设备到主机的传输。
//! 传输必须在设备的独占上下文中进行：上下文由 [`ContextSlot`] 发放，
//! 同一时刻至多一个持有者，且 [`DeviceContext`] 不能跨线程移动，
//! 持有者线程在其生命周期内独占该设备的传输通道。

use mx_foundation::{MxError, MxResult};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::block::Block;

/// 内存位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// 主机内存 (CPU)
    Host,
    /// 设备内存 (GPU)
    Device(usize),
}

impl MemoryLocation {
    /// 是否为主机内存
    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device(id) => write!(f, "device:{}", id),
        }
    }
}

// =============================================================================
// 独占上下文
// =============================================================================

/// 设备上下文槽位
///
/// 每个设备持有一个槽位，记录上下文当前是否被占用。
#[derive(Debug, Default)]
pub struct ContextSlot {
    held: AtomicBool,
}

impl ContextSlot {
    /// 创建空闲槽位
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// 获取独占上下文，已被占用时返回 [`MxError::ContextBusy`]
    pub fn acquire(&self, device: &str) -> MxResult<DeviceContext<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| MxError::ContextBusy {
                device: device.to_string(),
            })?;
        Ok(DeviceContext {
            slot: self,
            _not_send: PhantomData,
        })
    }

    /// 上下文是否被占用
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// 设备独占上下文
///
/// 释放时（Drop）归还槽位。不实现 `Send`，只能在获取它的线程上使用。
pub struct DeviceContext<'a> {
    slot: &'a ContextSlot,
    _not_send: PhantomData<*const ()>,
}

impl DeviceContext<'_> {
    /// 校验上下文属于给定槽位
    pub fn check_owner(&self, slot: &ContextSlot, device: &str) -> MxResult<()> {
        if std::ptr::eq(self.slot, slot) {
            Ok(())
        } else {
            Err(MxError::invalid_input(format!(
                "上下文不属于设备 {}",
                device
            )))
        }
    }
}

impl fmt::Debug for DeviceContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext").finish_non_exhaustive()
    }
}

impl Drop for DeviceContext<'_> {
    fn drop(&mut self) {
        self.slot.held.store(false, Ordering::Release);
    }
}

// =============================================================================
// 设备 Trait
// =============================================================================

/// 计算设备 Trait
pub trait Device: Send + Sync + fmt::Debug {
    /// 设备名称
    fn name(&self) -> &str;

    /// 设备编号
    fn id(&self) -> usize;

    /// 设备内存位置
    fn location(&self) -> MemoryLocation {
        MemoryLocation::Device(self.id())
    }

    /// 分配 `len` 个 `f32` 的零初始化存储
    fn alloc(&self, len: usize) -> MxResult<Vec<f32>>;

    /// 页锁定一段主机内存，便于异步传输
    fn page_lock(&self, _bytes: usize) -> MxResult<()> {
        Ok(())
    }

    /// 设备到主机复制，必须持有本设备的上下文
    fn download(&self, ctx: &DeviceContext<'_>, src: &Block, dst: &mut Block) -> MxResult<()>;

    /// 上下文槽位
    fn context_slot(&self) -> &ContextSlot;

    /// 获取独占上下文
    fn acquire_context(&self) -> MxResult<DeviceContext<'_>> {
        self.context_slot().acquire(self.name())
    }
}

// =============================================================================
// 主机模拟设备
// =============================================================================

/// 以主机内存模拟的设备
///
/// "设备"缓冲区同样位于主机内存，传输即内存复制。用于 CPU 运行与测试。
#[derive(Debug)]
pub struct HostDevice {
    id: usize,
    name: String,
    slot: ContextSlot,
    locked_bytes: AtomicUsize,
    downloads: AtomicU64,
}

impl HostDevice {
    /// 创建主机模拟设备
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: format!("host-sim:{}", id),
            slot: ContextSlot::new(),
            locked_bytes: AtomicUsize::new(0),
            downloads: AtomicU64::new(0),
        }
    }

    /// 累计页锁定字节数
    pub fn locked_bytes(&self) -> usize {
        self.locked_bytes.load(Ordering::Relaxed)
    }

    /// 累计传输次数
    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> usize {
        self.id
    }

    fn alloc(&self, len: usize) -> MxResult<Vec<f32>> {
        Ok(vec![0.0; len])
    }

    fn page_lock(&self, bytes: usize) -> MxResult<()> {
        self.locked_bytes.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    fn download(&self, ctx: &DeviceContext<'_>, src: &Block, dst: &mut Block) -> MxResult<()> {
        ctx.check_owner(&self.slot, &self.name)?;
        dst.copy_from(src)?;
        self.downloads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn context_slot(&self) -> &ContextSlot {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_foundation::Shape;

    #[test]
    fn test_context_is_exclusive() {
        let dev = HostDevice::new(0);
        let ctx = dev.acquire_context().unwrap();
        assert!(dev.context_slot().is_held());
        assert!(matches!(dev.acquire_context(), Err(MxError::ContextBusy { .. })));

        drop(ctx);
        assert!(!dev.context_slot().is_held());
        assert!(dev.acquire_context().is_ok());
    }

    #[test]
    fn test_download_requires_own_context() {
        let a = HostDevice::new(0);
        let b = HostDevice::new(1);
        let src = Block::from_vec(Shape::scalar(2), a.location(), vec![1.0, 2.0]).unwrap();
        let mut dst = Block::zeros(Shape::scalar(2), MemoryLocation::Host);

        let ctx_b = b.acquire_context().unwrap();
        assert!(a.download(&ctx_b, &src, &mut dst).is_err());

        let ctx_a = a.acquire_context().unwrap();
        a.download(&ctx_a, &src, &mut dst).unwrap();
        assert_eq!(dst.data(), &[1.0, 2.0]);
        assert_eq!(a.downloads(), 1);
    }

    #[test]
    fn test_page_lock_accounting() {
        let dev = HostDevice::default();
        dev.page_lock(64).unwrap();
        dev.page_lock(32).unwrap();
        assert_eq!(dev.locked_bytes(), 96);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(MemoryLocation::Host.to_string(), "host");
        assert_eq!(MemoryLocation::Device(2).to_string(), "device:2");
        assert!(MemoryLocation::Host.is_host());
    }
}
