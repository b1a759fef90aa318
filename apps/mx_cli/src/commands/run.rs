// apps/mx_cli/src/commands/run.rs

//! 运行模拟命令
//!
//! 加载配置、应用命令行覆盖项后组装 [`Simulation`] 并推进到结束时间。

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use super::load_config;
use crate::simulation::Simulation;

/// 运行模拟参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 输出目录（覆盖配置）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 模拟总时长 [秒]（覆盖配置）
    #[arg(short = 't', long)]
    pub duration: Option<f64>,

    /// 管道队列深度（覆盖配置）
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// 按试探次数推进，忽略总时长
    #[arg(long)]
    pub steps: Option<u64>,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== MxSim 模拟启动 ===");

    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.output {
        config.output.directory = dir;
    }
    if let Some(duration) = args.duration {
        config.duration = duration;
    }
    if let Some(depth) = args.queue_depth {
        config.output.queue_depth = depth;
    }

    info!(
        "配置: {} 单元, 时长={:e} s, 输出间隔={:e} s, 队列深度={}",
        config.mesh.ncell, config.duration, config.output.interval, config.output.queue_depth
    );

    let mut sim = Simulation::new(config).context("组装模拟失败")?;

    let start = Instant::now();
    let result = match args.steps {
        Some(steps) => sim.run_steps(steps),
        None => sim.run(),
    };
    if let Err(e) = &result {
        warn!("模拟中止: {:#}", e);
    }

    // 出错时同样排空管道
    let summary = sim.close();
    result?;
    let summary = summary.context("关闭输出管道失败")?;

    let elapsed = start.elapsed();
    info!("=== 模拟完成 ===");
    info!("模拟时间: {:e} s", summary.state.time);
    info!("接受步数: {}, 拒绝步数: {}", summary.state.steps, summary.state.undone);
    info!("快照: 提交 {}, 写盘 {}", summary.snapshots, summary.written);
    info!("计算时间: {:.2} s", elapsed.as_secs_f64());

    Ok(())
}
