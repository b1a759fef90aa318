// apps/mx_cli/src/simulation.rs

//! 模拟组装
//!
//! 将设备、缓冲池、输出管道与积分器连接起来：
//!
//! ```text
//! Simulation ─> Heun<Precession> ─eval(can_save)─> Snapshots ─submit_copy─> OutputPipeline
//! ```
//!
//! 导数为均匀外场中的阻尼进动（LLG 形式），仅用于驱动核心：
//!
//! `dm/dt = -γ/(1+α²) · [m × B + α m × (m × B)]`

use anyhow::{bail, Result};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;

use mx_config::{SimConfig, TorqueConfig};
use mx_foundation::{MxError, MxResult, Shape};
use mx_io::{Column, DumpWriter, OutputPipeline, TableWriter};
use mx_runtime::{kernels, Block, BufferPool, Device, HostDevice, MemoryLocation};
use mx_solver::{Derivative, Heun, SolverState};

// ============================================================
// 快照记录
// ============================================================

/// 按输出间隔保存快照并记录数据表
pub struct Snapshots {
    pipeline: OutputPipeline,
    table: Option<TableWriter>,
    interval: f64,
    next: f64,
    count: u64,
}

impl Snapshots {
    fn record(&mut self, y: &Block, time: f64) -> MxResult<()> {
        if time < self.next - self.interval * 1e-9 {
            return Ok(());
        }
        let file = format!("m{:06}.dump", self.count);
        self.pipeline.submit_copy(file, y, time)?;

        if let Some(table) = self.table.as_mut() {
            let mut row = Vec::with_capacity(1 + y.ncomp());
            row.push(time);
            row.extend(kernels::average(y));
            table.add_row(&row)?;
        }

        self.count += 1;
        self.next = ((time / self.interval).floor() + 1.0) * self.interval;
        Ok(())
    }

    fn flush(&mut self) -> MxResult<()> {
        match self.table.as_mut() {
            Some(table) => table.flush(),
            None => Ok(()),
        }
    }

    /// 排空输出管道并刷新数据表
    fn close(&mut self) -> MxResult<()> {
        let drained = self.pipeline.drain();
        let flushed = self.flush();
        drained?;
        flushed
    }

    /// 已提交的快照数
    pub fn count(&self) -> u64 {
        self.count
    }
}

// ============================================================
// 演示力矩
// ============================================================

/// 均匀场阻尼进动
pub struct Precession {
    /// γ/(1+α²) · B [rad/s]
    gb: [f32; 3],
    alpha: f32,
    torque: Block,
    snapshots: Snapshots,
}

impl Precession {
    fn new(config: &TorqueConfig, shape: Shape, location: MemoryLocation, snapshots: Snapshots) -> Self {
        let prefactor = config.gamma / (1.0 + config.alpha * config.alpha);
        let gb = config.field.map(|b| (prefactor * b) as f32);
        Self {
            gb,
            alpha: config.alpha as f32,
            torque: Block::zeros(shape, location),
            snapshots,
        }
    }
}

#[inline]
fn cross(a: &[f32], b: &[f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

impl Derivative for Precession {
    fn eval(&mut self, y: &Block, time: f64, can_save: bool) -> MxResult<&Block> {
        MxError::check_shape("torque", self.torque.shape(), y.shape())?;
        if can_save {
            self.snapshots.record(y, time)?;
        }

        let (gb, alpha) = (self.gb, self.alpha);
        self.torque
            .data_mut()?
            .par_chunks_mut(3)
            .zip(y.data().par_chunks(3))
            .for_each(|(t, m)| {
                let mxb = cross(m, &gb);
                let mxmxb = cross(m, &mxb);
                for c in 0..3 {
                    t[c] = -(mxb[c] + alpha * mxmxb[c]);
                }
            });
        Ok(&self.torque)
    }

    fn finish(&mut self) -> MxResult<()> {
        self.snapshots.flush()
    }
}

// ============================================================
// 模拟
// ============================================================

/// 运行摘要
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// 求解器最终状态
    pub state: SolverState,
    /// 提交的快照数
    pub snapshots: u64,
    /// 写盘的快照数
    pub written: u64,
}

/// 组装好的模拟
pub struct Simulation {
    config: SimConfig,
    solver: Heun<Precession>,
}

impl Simulation {
    /// 按配置组装模拟
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let shape = config.shape();

        let device: Arc<dyn Device> = Arc::new(HostDevice::new(0));
        let location = device.location();

        let data: Vec<f32> = config.mesh.initial.repeat(shape.ncell());
        let y = Block::from_vec(shape, location, data)?;
        if kernels::max_vec_norm(&y) == 0.0 {
            bail!("初始状态全为零，请先初始化磁化");
        }

        let pool = Arc::new(BufferPool::new(config.device_pool_config(device.id()), device.clone())?);
        let writer = DumpWriter::new(config.output.directory.clone())?;
        let pipeline = OutputPipeline::new(config.pipeline_config(), device, pool, writer)?;

        let table = if config.output.table {
            let columns = vec![
                Column::new("t", "s"),
                Column::new("mx", ""),
                Column::new("my", ""),
                Column::new("mz", ""),
            ];
            Some(TableWriter::create(config.output.directory.join("table.txt"), columns)?)
        } else {
            None
        };

        let snapshots = Snapshots {
            pipeline,
            table,
            interval: config.output.interval,
            next: 0.0,
            count: 0,
        };
        let torque = Precession::new(&config.torque, shape, location, snapshots);
        let solver = Heun::new(y, torque, config.heun_config())?;

        info!(
            ncell = shape.ncell(),
            output = %config.output.directory.display(),
            "模拟已组装"
        );
        Ok(Self { config, solver })
    }

    /// 运行配置的总时长
    pub fn run(&mut self) -> Result<()> {
        self.solver.advance_by_seconds(self.config.duration)?;
        Ok(())
    }

    /// 推进给定试探次数
    pub fn run_steps(&mut self, steps: u64) -> Result<()> {
        self.solver.advance_by_steps(steps)?;
        Ok(())
    }

    /// 求解器状态
    pub fn state(&self) -> &SolverState {
        self.solver.state()
    }

    /// 关闭：排空输出，刷新数据表
    pub fn close(self) -> Result<RunSummary> {
        info!("正在关闭");
        self.solver.log_summary();
        let state = self.solver.state().clone();
        let (_, mut torque) = self.solver.into_parts();
        let snapshots = &mut torque.snapshots;
        snapshots.close()?;
        Ok(RunSummary {
            state,
            snapshots: snapshots.count(),
            written: snapshots.pipeline.stats().written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_io::read_dump;

    fn small_config(dir: &std::path::Path) -> SimConfig {
        let mut config = SimConfig::default();
        config.mesh.ncell = 16;
        config.mesh.initial = [1.0, 0.0, 0.1];
        config.output.directory = dir.to_path_buf();
        config.output.interval = 5e-12;
        config.output.queue_depth = 4;
        config.duration = 2e-11;
        config
    }

    #[test]
    fn test_run_writes_snapshots_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = Simulation::new(small_config(dir.path())).unwrap();
        sim.run().unwrap();
        let summary = sim.close().unwrap();

        assert!(summary.state.time >= 2e-11);
        assert!(summary.snapshots >= 4);
        assert_eq!(summary.written, summary.snapshots);

        let first = read_dump(&dir.path().join("m000000.dump")).unwrap();
        assert_eq!(first.time, 0.0);
        assert_eq!(first.block.shape(), Shape::vector(16));

        let table = std::fs::read_to_string(dir.path().join("table.txt")).unwrap();
        assert_eq!(table.lines().count() as u64, summary.snapshots + 1);
    }

    #[test]
    fn test_state_stays_normalized_under_torque() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = Simulation::new(small_config(dir.path())).unwrap();
        sim.run_steps(50).unwrap();
        for m in sim.solver.y().data().chunks_exact(3) {
            let n = (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt();
            assert!((n - 1.0).abs() < 1e-6);
        }
        sim.close().unwrap();
    }

    #[test]
    fn test_zero_initial_state_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.mesh.initial = [0.0, 0.0, 0.0];
        assert!(Simulation::new(config).is_err());
    }

    #[test]
    fn test_torque_is_perpendicular() {
        let gb = [0.0, 0.0, 2.0];
        let m = [1.0, 0.0, 0.0];
        let t = cross(&m, &gb);
        assert_eq!(t, [0.0, -2.0, 0.0]);
        let dot: f32 = m.iter().zip(t.iter()).map(|(a, b)| a * b).sum();
        assert_eq!(dot, 0.0);
    }
}
