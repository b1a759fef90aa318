// crates/mx_io/tests/pipeline.rs

//! OutputPipeline 集成测试

use mx_foundation::{MxError, MxResult, Shape};
use mx_io::{read_dump, DumpWriter, OutputPipeline, PipelineConfig, PipelineState, SnapshotWriter};
use mx_runtime::{Block, BufferPool, Device, HostDevice, MemoryLocation, PoolConfig};
use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const NCELL: usize = 8;

type Records = Arc<Mutex<Vec<(PathBuf, f64, Vec<f32>)>>>;

/// 记录每次写入的写盘器
#[derive(Clone, Default)]
struct RecordingWriter {
    records: Records,
}

impl SnapshotWriter for RecordingWriter {
    fn write(&mut self, file: &Path, data: &Block, time: f64) -> MxResult<()> {
        self.records
            .lock()
            .push((file.to_path_buf(), time, data.data().to_vec()));
        Ok(())
    }
}

/// 闸门打开前所有写入阻塞
struct GatedWriter {
    gate: Arc<(Mutex<bool>, Condvar)>,
    inner: RecordingWriter,
}

impl SnapshotWriter for GatedWriter {
    fn write(&mut self, file: &Path, data: &Block, time: f64) -> MxResult<()> {
        let (open, cvar) = &*self.gate;
        let mut open = open.lock();
        while !*open {
            cvar.wait(&mut open);
        }
        drop(open);
        self.inner.write(file, data, time)
    }
}

/// 第 `fail_at` 次写入失败
struct FailingWriter {
    count: usize,
    fail_at: usize,
}

impl SnapshotWriter for FailingWriter {
    fn write(&mut self, file: &Path, _data: &Block, _time: f64) -> MxResult<()> {
        self.count += 1;
        if self.count == self.fail_at {
            return Err(MxError::io_with_source(
                format!("写入 {} 失败", file.display()),
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        Ok(())
    }
}

fn setup(max_alloc: usize) -> (Arc<dyn Device>, Arc<BufferPool>) {
    let device: Arc<dyn Device> = Arc::new(HostDevice::new(0));
    let pool = BufferPool::new(
        PoolConfig::device(Shape::vector(NCELL), 0, max_alloc),
        device.clone(),
    )
    .unwrap();
    (device, Arc::new(pool))
}

fn field(value: f32) -> Block {
    Block::from_vec(
        Shape::vector(NCELL),
        MemoryLocation::Device(0),
        vec![value; Shape::vector(NCELL).len()],
    )
    .unwrap()
}

#[test]
fn snapshots_written_in_submission_order() {
    let (device, pool) = setup(4);
    let writer = RecordingWriter::default();
    let records = writer.records.clone();
    let mut pipeline =
        OutputPipeline::new(PipelineConfig::with_depth(4), device, pool.clone(), writer).unwrap();

    for i in 0..50 {
        let out = field(i as f32);
        pipeline
            .submit_copy(format!("m{:06}.dump", i), &out, i as f64 * 1e-12)
            .unwrap();
    }
    pipeline.drain().unwrap();

    let records = records.lock();
    assert_eq!(records.len(), 50);
    for (i, (file, time, data)) in records.iter().enumerate() {
        assert_eq!(file, &PathBuf::from(format!("m{:06}.dump", i)));
        assert_eq!(*time, i as f64 * 1e-12);
        assert!(data.iter().all(|&x| x == i as f32));
    }

    let stats = pipeline.stats();
    assert_eq!(stats.submitted, 50);
    assert_eq!(stats.downloaded, 50);
    assert_eq!(stats.written, 50);

    // 所有缓冲区均已回到各自的池
    assert_eq!(pool.stats().idle, pool.stats().outstanding);
    let host = pipeline.host_pool().stats();
    assert!(host.outstanding <= 4);
    assert_eq!(host.spills, 0);
    assert_eq!(host.idle, host.outstanding);
}

#[test]
fn submit_blocks_when_pipeline_full() {
    let depth = 16;
    let (device, pool) = setup(32);
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let inner = RecordingWriter::default();
    let records = inner.records.clone();
    let writer = GatedWriter {
        gate: gate.clone(),
        inner,
    };
    let mut pipeline =
        OutputPipeline::new(PipelineConfig::with_depth(depth), device, pool, writer).unwrap();
    let completed = AtomicUsize::new(0);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..20 {
                pipeline
                    .submit_copy(format!("s{:02}", i), &field(i as f32), i as f64)
                    .unwrap();
                completed.fetch_add(1, Ordering::SeqCst);
            }
        });

        thread::sleep(Duration::from_millis(200));
        let done = completed.load(Ordering::SeqCst);

        let (open, cvar) = &*gate;
        *open.lock() = true;
        cvar.notify_all();

        assert!(done <= depth + 1, "提交未被阻塞: {}", done);
        assert!(done < 20);
    });

    assert_eq!(completed.load(Ordering::SeqCst), 20);
    pipeline.drain().unwrap();

    let records = records.lock();
    assert_eq!(records.len(), 20);
    for (i, (file, _, _)) in records.iter().enumerate() {
        assert_eq!(file, &PathBuf::from(format!("s{:02}", i)));
    }
}

#[test]
fn io_failure_closes_pipeline() {
    let (device, pool) = setup(8);
    let writer = FailingWriter {
        count: 0,
        fail_at: 3,
    };
    let mut pipeline =
        OutputPipeline::new(PipelineConfig::with_depth(4), device, pool, writer).unwrap();

    let mut closed = false;
    for i in 0..40 {
        match pipeline.submit_copy(format!("f{}", i), &field(0.0), i as f64) {
            Ok(()) => {}
            Err(MxError::PipelineClosed) => {
                closed = true;
                break;
            }
            Err(e) => panic!("意外错误: {}", e),
        }
    }
    assert!(closed, "写盘失败后管道应拒绝提交");

    let err = pipeline.drain().unwrap_err();
    assert!(matches!(err, MxError::Io { .. }), "{:?}", err);
    assert_eq!(pipeline.state(), PipelineState::Closed);
    assert_eq!(pipeline.stats().written, 2);
}

#[test]
fn submit_after_first_write_failure_is_refused() {
    let (device, pool) = setup(4);
    let writer = FailingWriter {
        count: 0,
        fail_at: 1,
    };
    let mut pipeline =
        OutputPipeline::new(PipelineConfig::with_depth(4), device, pool.clone(), writer).unwrap();

    pipeline.submit_copy("a", &field(1.0), 0.0).unwrap();
    let mut waited = 0;
    while !pipeline.has_failed() {
        assert!(waited < 500, "保存线程未报告失败");
        thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    // 下载线程退出前后均不得接手新任务
    thread::sleep(Duration::from_millis(50));

    assert!(matches!(
        pipeline.submit_copy("b", &field(2.0), 1.0),
        Err(MxError::PipelineClosed)
    ));
    let b = pool.get().unwrap();
    assert!(matches!(pipeline.submit("c", b, 2.0), Err(MxError::PipelineClosed)));

    let err = pipeline.drain().unwrap_err();
    assert!(matches!(err, MxError::Io { .. }), "{:?}", err);
    let stats = pipeline.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.written, 0);
    assert_eq!(pool.stats().idle, pool.stats().outstanding);
}

#[test]
fn dump_files_round_trip_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let (device, pool) = setup(4);
    let writer = DumpWriter::new(dir.path()).unwrap();
    let mut pipeline =
        OutputPipeline::new(PipelineConfig::with_depth(3), device, pool, writer).unwrap();

    for i in 0..5 {
        pipeline
            .submit_copy(format!("m{:06}.dump", i), &field(i as f32 + 0.25), i as f64)
            .unwrap();
    }
    pipeline.drain().unwrap();

    for i in 0..5 {
        let dump = read_dump(&dir.path().join(format!("m{:06}.dump", i))).unwrap();
        assert_eq!(dump.time, i as f64);
        assert_eq!(dump.block.shape(), Shape::vector(NCELL));
        assert!(dump.block.data().iter().all(|&x| x == i as f32 + 0.25));
    }
}

#[test]
fn drop_without_drain_flushes() {
    let (device, pool) = setup(4);
    let writer = RecordingWriter::default();
    let records = writer.records.clone();
    {
        let pipeline =
            OutputPipeline::new(PipelineConfig::with_depth(4), device, pool, writer).unwrap();
        for i in 0..6 {
            pipeline.submit_copy("d", &field(i as f32), 0.0).unwrap();
        }
    }
    assert_eq!(records.lock().len(), 6);
}
