// crates/mx_runtime/src/block.rs

//! Block - 固定形状的多分量缓冲区
//!
//! `Block` 是一块 `ncomp × ncell` 的 `f32` 内存区域的句柄，记录其内存位置、
//! 来源缓冲池以及引用计数。
//!
//! # 引用计数约定
//!
//! - 持有者通过 `BufferPool::get()` 获得独占句柄，引用计数为 0
//! - `BufferPool::share()` 登记一个额外读者，计数加 1，返回同一存储的只读句柄
//! - `BufferPool::recycle()` 释放一个句柄：计数非零时只减 1，为零时进入回收集
//! - 计数非零期间 [`Block::data_mut`] 返回 [`MxError::BlockShared`]
//!
//! 计数即存储上 `Arc` 的强引用数减一，因此不会为负。`Block` 不实现 `Clone`，
//! 额外句柄只能经由缓冲池创建。
//!
//! 池缓冲区的存储持有所属池的分配计数（租约），存储析构时归还一个分配名额。
//! 因此未经 `recycle` 直接丢弃的句柄不会永久占用缓冲池上限，只是失去复用。

use mx_foundation::{MxError, MxResult, Shape};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::device::MemoryLocation;

/// 底层存储
#[derive(Debug)]
pub(crate) struct Storage {
    pub(crate) data: Vec<f32>,
    pub(crate) page_locked: bool,
    /// 所属池的在用分配数
    lease: Option<Arc<AtomicUsize>>,
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// 固定形状缓冲区句柄
pub struct Block {
    shape: Shape,
    location: MemoryLocation,
    storage: Arc<Storage>,
    /// 来源缓冲池 id（独立创建的缓冲区为 None）
    origin: Option<u64>,
}

impl Block {
    /// 创建零初始化的独立缓冲区（不属于任何缓冲池）
    pub fn zeros(shape: Shape, location: MemoryLocation) -> Self {
        Self::from_storage(shape, location, vec![0.0; shape.len()], None)
    }

    /// 从已有数据创建独立缓冲区
    pub fn from_vec(shape: Shape, location: MemoryLocation, data: Vec<f32>) -> MxResult<Self> {
        if data.len() != shape.len() {
            return Err(MxError::invalid_input(format!(
                "数据长度 {} 与形状 {} 不符",
                data.len(),
                shape
            )));
        }
        Ok(Self::from_storage(shape, location, data, None))
    }

    pub(crate) fn from_storage(
        shape: Shape,
        location: MemoryLocation,
        data: Vec<f32>,
        origin: Option<u64>,
    ) -> Self {
        debug_assert_eq!(data.len(), shape.len());
        Self {
            shape,
            location,
            storage: Arc::new(Storage {
                data,
                page_locked: false,
                lease: None,
            }),
            origin,
        }
    }

    /// 池分配的缓冲区；存储析构时 `lease` 减一
    pub(crate) fn pooled(
        shape: Shape,
        location: MemoryLocation,
        data: Vec<f32>,
        pool: u64,
        page_locked: bool,
        lease: Arc<AtomicUsize>,
    ) -> Self {
        debug_assert_eq!(data.len(), shape.len());
        Self {
            shape,
            location,
            storage: Arc::new(Storage {
                data,
                page_locked,
                lease: Some(lease),
            }),
            origin: Some(pool),
        }
    }

    /// 形状
    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// 分量数
    #[inline]
    pub fn ncomp(&self) -> usize {
        self.shape.ncomp()
    }

    /// 单元数
    #[inline]
    pub fn ncell(&self) -> usize {
        self.shape.ncell()
    }

    /// 内存位置
    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// 是否已页锁定
    pub fn is_page_locked(&self) -> bool {
        self.storage.page_locked
    }

    /// 当前引用计数（主持有者之外的读者数）
    #[inline]
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.storage) - 1
    }

    /// 是否被共享
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.refcount() > 0
    }

    /// 来源缓冲池 id
    pub(crate) fn origin(&self) -> Option<u64> {
        self.origin
    }

    /// 只读数据视图
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.storage.data
    }

    /// 可变数据视图，共享期间拒绝写入
    #[inline]
    pub fn data_mut(&mut self) -> MxResult<&mut [f32]> {
        let refcount = self.refcount();
        match Arc::get_mut(&mut self.storage) {
            Some(storage) => Ok(&mut storage.data),
            None => Err(MxError::BlockShared { refcount }),
        }
    }

    /// 第 `i` 个单元的全部分量
    #[inline]
    pub fn cell(&self, i: usize) -> &[f32] {
        let n = self.shape.ncomp();
        &self.storage.data[i * n..(i + 1) * n]
    }

    /// 从同形状缓冲区复制数据
    pub fn copy_from(&mut self, src: &Block) -> MxResult<()> {
        MxError::check_shape("copy_from", self.shape, src.shape)?;
        self.data_mut()?.copy_from_slice(src.data());
        Ok(())
    }

    /// 用指定值填充
    pub fn fill(&mut self, value: f32) -> MxResult<()> {
        self.data_mut()?.fill(value);
        Ok(())
    }

    /// 创建指向同一存储的只读句柄（引用计数 +1）
    pub(crate) fn share_handle(&self) -> Block {
        Block {
            shape: self.shape,
            location: self.location,
            storage: Arc::clone(&self.storage),
            origin: self.origin,
        }
    }

    /// 释放句柄；若为最后一个句柄则取回独占的缓冲区
    ///
    /// 多个句柄并发释放时恰好一个得到 `Some`。
    pub(crate) fn release(self) -> Option<Block> {
        let Block {
            shape,
            location,
            storage,
            origin,
        } = self;
        Arc::into_inner(storage).map(|storage| Block {
            shape,
            location,
            storage: Arc::new(storage),
            origin,
        })
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("shape", &self.shape)
            .field("location", &self.location)
            .field("refcount", &self.refcount())
            .field("origin", &self.origin)
            .finish()
    }
}
