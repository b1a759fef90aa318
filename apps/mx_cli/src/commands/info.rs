// apps/mx_cli/src/commands/info.rs

//! 信息显示命令

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::load_config;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 显示系统信息
    #[arg(long)]
    pub system: bool,

    /// 显示默认配置
    #[arg(long)]
    pub defaults: bool,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== MxSim 信息 ===");

    let show_all = args.config.is_none() && !args.system && !args.defaults;
    if args.system || show_all {
        print_system_info();
        println!();
    }
    if args.defaults || show_all {
        println!("=== 默认配置 ===");
        print_config(None)?;
    }
    if let Some(path) = &args.config {
        println!("=== 配置: {} ===", path.display());
        print_config(Some(path))?;
    }
    Ok(())
}

fn print_system_info() {
    println!("=== 系统信息 ===");
    println!("MxSim CLI 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("目标平台: {}", std::env::consts::ARCH);
    println!("操作系统: {}", std::env::consts::OS);
    println!("rayon 线程数: {}", rayon::current_num_threads());
    println!("默认管道深度: {}", mx_io::pipeline::DEFAULT_QUEUE_DEPTH);
}

fn print_config(path: Option<&PathBuf>) -> Result<()> {
    let config = load_config(path.map(|p| p.as_path()))?;
    let json = serde_json::to_string_pretty(&config).context("序列化配置失败")?;
    println!("{}", json);

    let shape = config.shape();
    println!(
        "\n场: {}, 每个快照 {} 字节",
        shape,
        shape.size_bytes()
    );
    Ok(())
}
