// crates/mx_io/src/pipeline.rs

//! 异步输出管道
//!
//! 将设备上的场快照搬运到磁盘，不阻塞计算线程。
//!
//! # 设计说明
//!
//! ```text
//!  submit() ──(容量 0)──> 下载线程 ──(容量 depth-2)──> 保存线程 ──> SnapshotWriter
//!                          │  持有 DeviceContext            │
//!                          └─ 设备缓冲区立即归还设备池      └─ 主机缓冲区归还子池
//! ```
//!
//! - 下载队列容量为零：`submit` 阻塞到下载线程接手为止（背压点）
//! - 主机子池上限为 `queue_depth`：下载线程 1 个、队列中至多 `depth-2` 个、
//!   保存线程 1 个，恰好用满
//! - 两个阶段均为 FIFO，快照不会在其下载完成前写盘
//! - 保存线程遇到 IO 错误即置失败标志并退出；下载线程同时等待任务与
//!   保存线程退出，不再接手新任务。其后 `submit` 返回 `PipelineClosed`，
//!   `drain` 返回该 IO 错误
//!
//! # 使用示例
//!
//! ```rust,ignore
//! let mut pipeline = OutputPipeline::new(config, device, device_pool, writer)?;
//! pipeline.submit_copy("m000000.dump", &m, 0.0)?;
//! pipeline.drain()?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, SendError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use mx_foundation::{MxError, MxResult};
use mx_runtime::{Block, BufferPool, Device, PoolConfig};

use crate::writer::SnapshotWriter;

// ============================================================
// 配置与状态
// ============================================================

/// 默认队列深度
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// 输出管道配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 同时在途的主机缓冲区上限（至少为 2）
    pub queue_depth: usize,
    /// 下载线程名称
    pub downloader_name: String,
    /// 保存线程名称
    pub saver_name: String,
    /// 主机缓冲区是否页锁定
    pub page_lock: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            downloader_name: "mx-download".to_string(),
            saver_name: "mx-save".to_string(),
            page_lock: true,
        }
    }
}

impl PipelineConfig {
    /// 指定队列深度
    pub fn with_depth(queue_depth: usize) -> Self {
        Self {
            queue_depth,
            ..Default::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> MxResult<()> {
        if self.queue_depth < 2 {
            return Err(MxError::invalid_config(
                "output.queue_depth",
                self.queue_depth.to_string(),
                "必须至少为 2",
            ));
        }
        Ok(())
    }

    /// 保存队列容量
    #[inline]
    pub fn save_capacity(&self) -> usize {
        self.queue_depth - 2
    }
}

/// 管道状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 运行中，接受提交
    Running,
    /// 正在排空
    Draining,
    /// 已关闭
    Closed,
}

/// 管道统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// 已提交任务数
    pub submitted: u64,
    /// 已下载任务数
    pub downloaded: u64,
    /// 已写盘任务数
    pub written: u64,
}

// ============================================================
// 任务
// ============================================================

/// 下载任务（设备缓冲区，下载后归还设备池）
#[derive(Debug)]
pub struct DownloadTask {
    /// 目标文件
    pub file: PathBuf,
    /// 设备缓冲区
    pub buffer: Block,
    /// 快照时间 [s]
    pub time: f64,
}

/// 保存任务（已填充的主机缓冲区）
#[derive(Debug)]
pub struct SaveTask {
    /// 目标文件
    pub file: PathBuf,
    /// 主机缓冲区
    pub buffer: Block,
    /// 快照时间 [s]
    pub time: f64,
}

// ============================================================
// 输出管道
// ============================================================

/// 两级异步输出管道
pub struct OutputPipeline {
    config: PipelineConfig,
    state: PipelineState,
    download_tx: Option<Sender<DownloadTask>>,
    device_pool: Arc<BufferPool>,
    host_pool: Arc<BufferPool>,
    downloader: Option<JoinHandle<MxResult<()>>>,
    saver: Option<JoinHandle<MxResult<()>>>,
    stats: Arc<Mutex<PipelineStats>>,
    failed: Arc<AtomicBool>,
}

impl OutputPipeline {
    /// 创建管道并启动下载、保存线程
    pub fn new<W>(
        config: PipelineConfig,
        device: Arc<dyn Device>,
        device_pool: Arc<BufferPool>,
        writer: W,
    ) -> MxResult<Self>
    where
        W: SnapshotWriter + 'static,
    {
        config.validate()?;

        let host_config = PoolConfig {
            page_lock: config.page_lock,
            ..PoolConfig::host(device_pool.shape(), config.queue_depth)
        };
        let host_pool = Arc::new(BufferPool::new(host_config, device.clone())?);
        let stats = Arc::new(Mutex::new(PipelineStats::default()));
        let failed = Arc::new(AtomicBool::new(false));

        let (download_tx, download_rx) = bounded::<DownloadTask>(0);
        let (save_tx, save_rx) = bounded::<SaveTask>(config.save_capacity());
        // 保存线程退出时断开，唤醒等待中的下载线程
        let (saver_alive, saver_gone) = bounded::<()>(0);

        let saver = {
            let host_pool = host_pool.clone();
            let stats = stats.clone();
            let failed = failed.clone();
            let name = config.saver_name.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let _alive = saver_alive;
                    run_saver(&name, save_rx, writer, &host_pool, &stats, &failed)
                })
                .map_err(|e| MxError::io_with_source("无法创建保存线程", e))?
        };

        let downloader = {
            let device_pool = device_pool.clone();
            let host_pool = host_pool.clone();
            let stats = stats.clone();
            let failed = failed.clone();
            let name = config.downloader_name.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    run_downloader(
                        &name,
                        device.as_ref(),
                        download_rx,
                        saver_gone,
                        save_tx,
                        &device_pool,
                        &host_pool,
                        &stats,
                        &failed,
                    )
                })
                .map_err(|e| MxError::io_with_source("无法创建下载线程", e))?
        };

        info!(
            queue_depth = config.queue_depth,
            shape = %device_pool.shape(),
            "输出管道已启动"
        );

        Ok(Self {
            config,
            state: PipelineState::Running,
            download_tx: Some(download_tx),
            device_pool,
            host_pool,
            downloader: Some(downloader),
            saver: Some(saver),
            stats,
            failed,
        })
    }

    /// 提交一个设备缓冲区，阻塞到下载线程接手
    ///
    /// 缓冲区的所有权随任务移交，下载后归还设备池。
    /// 任一工作线程失败后返回 `PipelineClosed`。
    pub fn submit(&self, file: impl Into<PathBuf>, buffer: Block, time: f64) -> MxResult<()> {
        MxError::check_shape("submit", self.device_pool.shape(), buffer.shape())?;
        let tx = match self.download_tx.as_ref() {
            Some(tx) if !self.has_failed() => tx,
            _ => {
                self.device_pool.recycle(buffer);
                return Err(MxError::PipelineClosed);
            }
        };
        let task = DownloadTask {
            file: file.into(),
            buffer,
            time,
        };
        match tx.send(task) {
            Ok(()) => {
                self.stats.lock().submitted += 1;
                Ok(())
            }
            Err(SendError(task)) => {
                self.device_pool.recycle(task.buffer);
                Err(MxError::PipelineClosed)
            }
        }
    }

    /// 将 `output` 复制到设备池缓冲区后提交，返回后 `output` 可立即修改
    pub fn submit_copy(&self, file: impl Into<PathBuf>, output: &Block, time: f64) -> MxResult<()> {
        if self.download_tx.is_none() || self.has_failed() {
            return Err(MxError::PipelineClosed);
        }
        let mut buffer = self.device_pool.get()?;
        if let Err(e) = buffer.copy_from(output) {
            self.device_pool.recycle(buffer);
            return Err(e);
        }
        self.submit(file, buffer, time)
    }

    /// 关闭下载队列并等待全部已接收任务写盘
    ///
    /// 返回第一个工作线程错误。重复调用为空操作。
    pub fn drain(&mut self) -> MxResult<()> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }
        self.state = PipelineState::Draining;
        debug!("输出管道排空中");
        drop(self.download_tx.take());

        let workers = [
            (self.config.downloader_name.as_str(), self.downloader.take()),
            (self.config.saver_name.as_str(), self.saver.take()),
        ];
        let mut first_error = None;
        for (name, handle) in workers {
            let Some(handle) = handle else { continue };
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(MxError::worker_panicked(name)));
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        self.state = PipelineState::Closed;

        let stats = self.stats();
        info!(
            submitted = stats.submitted,
            written = stats.written,
            "输出管道已关闭"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 当前状态
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// 是否有工作线程已因错误退出
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// 统计信息
    pub fn stats(&self) -> PipelineStats {
        *self.stats.lock()
    }

    /// 配置
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 设备缓冲池
    pub fn device_pool(&self) -> &Arc<BufferPool> {
        &self.device_pool
    }

    /// 主机子池
    pub fn host_pool(&self) -> &Arc<BufferPool> {
        &self.host_pool
    }
}

impl Drop for OutputPipeline {
    fn drop(&mut self) {
        if self.state != PipelineState::Closed {
            warn!("输出管道未显式排空，析构时自动排空");
            if let Err(e) = self.drain() {
                error!(error = %e, "析构排空失败");
            }
        }
    }
}

impl std::fmt::Debug for OutputPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputPipeline")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================
// 工作线程
// ============================================================

#[allow(clippy::too_many_arguments)]
fn run_downloader(
    name: &str,
    device: &dyn Device,
    tasks: Receiver<DownloadTask>,
    saver_gone: Receiver<()>,
    saves: Sender<SaveTask>,
    device_pool: &BufferPool,
    host_pool: &BufferPool,
    stats: &Mutex<PipelineStats>,
    failed: &AtomicBool,
) -> MxResult<()> {
    let fail = |e: MxError| {
        failed.store(true, Ordering::Release);
        e
    };
    let ctx = device.acquire_context().map_err(|e| {
        error!(worker = name, error = %e, "无法获取设备上下文");
        fail(e)
    })?;

    loop {
        let task = select! {
            recv(tasks) -> task => match task {
                Ok(task) => task,
                Err(_) => break,
            },
            // 保存线程已退出，错误由其返回
            recv(saver_gone) -> _ => {
                debug!(worker = name, "保存线程已退出，停止下载");
                return Ok(());
            }
        };

        let mut host = match host_pool.get() {
            Ok(host) => host,
            Err(e) => {
                error!(worker = name, error = %e, "主机子池耗尽");
                device_pool.recycle(task.buffer);
                return Err(fail(e));
            }
        };
        if let Err(e) = device.download(&ctx, &task.buffer, &mut host) {
            error!(worker = name, file = %task.file.display(), error = %e, "下载失败");
            device_pool.recycle(task.buffer);
            host_pool.recycle(host);
            return Err(fail(e));
        }
        device_pool.recycle(task.buffer);
        stats.lock().downloaded += 1;

        let save = SaveTask {
            file: task.file,
            buffer: host,
            time: task.time,
        };
        if let Err(SendError(save)) = saves.send(save) {
            host_pool.recycle(save.buffer);
            debug!(worker = name, "保存线程已退出，停止下载");
            return Ok(());
        }
    }
    Ok(())
}

fn run_saver<W: SnapshotWriter>(
    name: &str,
    tasks: Receiver<SaveTask>,
    mut writer: W,
    host_pool: &BufferPool,
    stats: &Mutex<PipelineStats>,
    failed: &AtomicBool,
) -> MxResult<()> {
    for task in tasks.iter() {
        let result = writer.write(&task.file, &task.buffer, task.time);
        host_pool.recycle(task.buffer);
        if let Err(e) = result {
            error!(worker = name, file = %task.file.display(), error = %e, "写盘失败");
            failed.store(true, Ordering::Release);
            return Err(e);
        }
        stats.lock().written += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_foundation::Shape;
    use mx_runtime::HostDevice;
    use std::path::Path;

    struct NullWriter;

    impl SnapshotWriter for NullWriter {
        fn write(&mut self, _file: &Path, _data: &Block, _time: f64) -> MxResult<()> {
            Ok(())
        }
    }

    fn setup(depth: usize) -> (Arc<dyn Device>, Arc<BufferPool>) {
        let device: Arc<dyn Device> = Arc::new(HostDevice::new(0));
        let pool = Arc::new(
            BufferPool::new(PoolConfig::device(Shape::vector(8), 0, depth + 2), device.clone())
                .unwrap(),
        );
        (device, pool)
    }

    #[test]
    fn test_config_validate() {
        assert!(PipelineConfig::with_depth(1).validate().is_err());
        assert!(PipelineConfig::with_depth(2).validate().is_ok());
        assert_eq!(PipelineConfig::default().save_capacity(), 14);
    }

    #[test]
    fn test_drain_is_idempotent() {
        let (device, pool) = setup(4);
        let mut p = OutputPipeline::new(PipelineConfig::with_depth(4), device, pool, NullWriter)
            .unwrap();
        assert_eq!(p.state(), PipelineState::Running);
        p.drain().unwrap();
        assert_eq!(p.state(), PipelineState::Closed);
        p.drain().unwrap();
    }

    #[test]
    fn test_submit_after_drain_recycles_buffer() {
        let (device, pool) = setup(4);
        let mut p =
            OutputPipeline::new(PipelineConfig::with_depth(4), device, pool.clone(), NullWriter)
                .unwrap();
        p.drain().unwrap();

        let b = pool.get().unwrap();
        assert!(matches!(p.submit("x", b, 0.0), Err(MxError::PipelineClosed)));
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_device_context_held_by_downloader() {
        let device = Arc::new(HostDevice::new(0));
        let pool = Arc::new(
            BufferPool::new(PoolConfig::device(Shape::vector(2), 0, 4), device.clone()).unwrap(),
        );
        // 先占用上下文，下载线程无法启动
        let ctx = device.acquire_context().unwrap();
        let mut p =
            OutputPipeline::new(PipelineConfig::with_depth(2), device.clone(), pool.clone(), NullWriter)
                .unwrap();
        let b = pool.get().unwrap();
        assert!(p.submit("x", b, 0.0).is_err());
        drop(ctx);
        assert!(matches!(p.drain(), Err(MxError::ContextBusy { .. })));
    }
}
