// apps/mx_cli/src/main.rs

//! MxSim 命令行界面
//!
//! 驱动缓冲池、输出管道与 Heun 积分器的示例程序。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 5: Application**，只通过 `SimConfig` 配置各层，
//! 由 [`simulation::Simulation`] 组装导数函数并决定何时保存。

mod commands;
mod simulation;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MxSim 时间推进模拟命令行工具
#[derive(Parser)]
#[command(name = "mx_cli")]
#[command(author = "MxSim Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MxSim time-stepping simulation core", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行模拟
    Run(commands::run::RunArgs),
    /// 显示信息
    Info(commands::info::InfoArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
