// apps/mx_cli/src/commands/validate.rs

//! 配置验证命令

use anyhow::{bail, Result};
use clap::Args;
use mx_config::SimConfig;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== MxSim 配置验证 ===");

    let Some(path) = &args.config else {
        println!("用法: mx_cli validate --config <配置文件> [--strict]");
        return Ok(());
    };

    println!("\n检查配置文件: {}", path.display());
    let config = match SimConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            error!("  ✗ {}", e);
            println!("  ✗ {}", e);
            bail!("验证失败：{}", e);
        }
    };
    println!("  ✓ 配置文件有效");

    let warnings = collect_warnings(&config);
    for w in &warnings {
        warn!("  ⚠ {}", w);
        println!("  ⚠ {}", w);
    }

    if args.strict && !warnings.is_empty() {
        println!("\n✗ 验证失败");
        bail!("严格模式：发现 {} 个警告", warnings.len());
    }
    println!("\n✓ 验证通过");
    Ok(())
}

/// 合法但可疑的设置
fn collect_warnings(config: &SimConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.output.interval > config.duration && config.duration > 0.0 {
        warnings.push(format!(
            "输出间隔 {:e} s 大于模拟时长 {:e} s，只会保存初始状态",
            config.output.interval, config.duration
        ));
    }
    if config.output.queue_depth < 4 {
        warnings.push(format!(
            "队列深度 {} 较小，保存线程可能频繁阻塞求解",
            config.output.queue_depth
        ));
    }
    if config.solver.fixed_dt > 0.0 && config.solver.max_dt > 0.0 {
        warnings.push("已设置固定步长，max_dt 不生效".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_warnings() {
        assert!(collect_warnings(&SimConfig::default()).is_empty());
    }

    #[test]
    fn test_small_queue_warns() {
        let mut config = SimConfig::default();
        config.output.queue_depth = 2;
        assert_eq!(collect_warnings(&config).len(), 1);
    }

    #[test]
    fn test_strict_fails_on_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        let mut config = SimConfig::default();
        config.output.queue_depth = 2;
        config.save_to_file(&path).unwrap();

        let lenient = ValidateArgs { config: Some(path.clone()), strict: false };
        assert!(execute(lenient).is_ok());
        let strict = ValidateArgs { config: Some(path), strict: true };
        assert!(execute(strict).is_err());
    }
}
