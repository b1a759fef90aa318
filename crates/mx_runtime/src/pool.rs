// crates/mx_runtime/src/pool.rs

//! BufferPool - 引用计数回收池
//!
//! 跨时间步复用大块缓冲区，稳态运行时不再分配内存。
//!
//! # 策略
//!
//! - `get()`: 优先从回收集取出空闲缓冲区；否则在分配上限内新分配；
//!   上限已到则返回 [`MxError::PoolExhausted`]，从不阻塞
//! - `recycle()`: 仍有读者时只释放当前句柄；最后一个句柄入回收集，
//!   回收集已满时丢弃缓冲区并释放其分配名额
//! - 来自其他缓冲池或独立创建的缓冲区被忽略
//!
//! 所有操作均为 `&self`，可在多线程间共享（通常包裹在 `Arc` 中）。

use crossbeam_queue::ArrayQueue;
use mx_foundation::{MxError, MxResult, Shape};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::block::Block;
use crate::device::{Device, MemoryLocation};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// 缓冲池配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    /// 缓冲区形状
    pub shape: Shape,
    /// 内存位置
    pub location: MemoryLocation,
    /// 分配上限
    pub max_alloc: usize,
    /// 回收集容量
    pub recycle_capacity: usize,
    /// 主机缓冲区是否页锁定
    pub page_lock: bool,
}

impl PoolConfig {
    /// 主机缓冲池配置（页锁定）
    pub fn host(shape: Shape, max_alloc: usize) -> Self {
        Self {
            shape,
            location: MemoryLocation::Host,
            max_alloc,
            recycle_capacity: max_alloc,
            page_lock: true,
        }
    }

    /// 设备缓冲池配置
    pub fn device(shape: Shape, device_id: usize, max_alloc: usize) -> Self {
        Self {
            shape,
            location: MemoryLocation::Device(device_id),
            max_alloc,
            recycle_capacity: max_alloc,
            page_lock: false,
        }
    }

    /// 验证配置
    pub fn validate(&self) -> MxResult<()> {
        if self.max_alloc == 0 {
            return Err(MxError::invalid_config("pool.max_alloc", "0", "必须至少为 1"));
        }
        if self.recycle_capacity == 0 {
            return Err(MxError::invalid_config(
                "pool.recycle_capacity",
                "0",
                "必须至少为 1",
            ));
        }
        if self.shape.is_empty() {
            return Err(MxError::invalid_config(
                "pool.shape",
                self.shape.to_string(),
                "元素数必须为正",
            ));
        }
        Ok(())
    }
}

/// 缓冲池统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 累计新分配次数
    pub allocations: u64,
    /// 累计复用次数
    pub reuses: u64,
    /// 回收集满而丢弃的次数
    pub spills: u64,
    /// 当前占用的分配名额
    pub outstanding: usize,
    /// 回收集中的空闲缓冲区数
    pub idle: usize,
}

/// 引用计数回收池
#[derive(Debug)]
pub struct BufferPool {
    id: u64,
    config: PoolConfig,
    device: Arc<dyn Device>,
    recycled: ArrayQueue<Block>,
    outstanding: Arc<AtomicUsize>,
    allocations: AtomicU64,
    reuses: AtomicU64,
    spills: AtomicU64,
}

impl BufferPool {
    /// 创建缓冲池
    pub fn new(config: PoolConfig, device: Arc<dyn Device>) -> MxResult<Self> {
        config.validate()?;
        Ok(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            recycled: ArrayQueue::new(config.recycle_capacity),
            config,
            device,
            outstanding: Arc::new(AtomicUsize::new(0)),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            spills: AtomicU64::new(0),
        })
    }

    /// 缓冲区形状
    #[inline]
    pub fn shape(&self) -> Shape {
        self.config.shape
    }

    /// 配置
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 所属设备
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// 缓冲区是否出自本池
    #[inline]
    pub fn owns(&self, block: &Block) -> bool {
        block.origin() == Some(self.id)
    }

    /// 取得一个独占缓冲区
    pub fn get(&self) -> MxResult<Block> {
        if let Some(block) = self.recycled.pop() {
            self.reuses.fetch_add(1, Ordering::Relaxed);
            return Ok(block);
        }
        self.alloc()
    }

    /// 新分配一个缓冲区（受分配上限约束）
    pub fn alloc(&self) -> MxResult<Block> {
        let max_alloc = self.config.max_alloc;
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_alloc).then_some(n + 1)
            })
            .map_err(|_| MxError::PoolExhausted { max_alloc })?;

        match self.allocate_block() {
            Ok(block) => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                trace!(pool = self.id, shape = %self.config.shape, "新分配缓冲区");
                Ok(block)
            }
            Err(e) => {
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn allocate_block(&self) -> MxResult<Block> {
        let shape = self.config.shape;
        let data = self.device.alloc(shape.len())?;
        if data.len() != shape.len() {
            return Err(MxError::internal(format!(
                "设备 {} 分配了 {} 个元素，期望 {}",
                self.device.name(),
                data.len(),
                shape.len()
            )));
        }
        let page_locked = self.config.page_lock && self.config.location.is_host();
        if page_locked {
            self.device.page_lock(shape.size_bytes())?;
        }
        Ok(Block::pooled(
            shape,
            self.config.location,
            data,
            self.id,
            page_locked,
            Arc::clone(&self.outstanding),
        ))
    }

    /// 登记一个额外读者，返回指向同一存储的只读句柄
    pub fn share(&self, block: &Block) -> Block {
        block.share_handle()
    }

    /// 归还一个句柄
    ///
    /// # Panics
    ///
    /// 形状与本池不一致时 panic（调用方逻辑错误）。
    pub fn recycle(&self, block: Block) {
        assert_eq!(
            block.shape(),
            self.config.shape,
            "recycle: 缓冲区形状与缓冲池不一致"
        );
        if !self.owns(&block) {
            trace!(pool = self.id, origin = ?block.origin(), "忽略非本池缓冲区");
            return;
        }
        let Some(block) = block.release() else {
            return;
        };
        // 丢弃的缓冲区在析构时归还分配名额
        if self.recycled.push(block).is_err() {
            self.spills.fetch_add(1, Ordering::Relaxed);
            debug!(pool = self.id, "回收集已满，丢弃缓冲区");
        }
    }

    /// 批量归还
    pub fn recycle_all(&self, blocks: impl IntoIterator<Item = Block>) {
        for block in blocks {
            self.recycle(block);
        }
    }

    /// 统计信息
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            spills: self.spills.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Acquire),
            idle: self.recycled.len(),
        }
    }
}
