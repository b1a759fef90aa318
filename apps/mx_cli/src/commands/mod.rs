// apps/mx_cli/src/commands/mod.rs

//! 子命令

pub mod info;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use mx_config::SimConfig;
use std::path::Path;

/// 加载配置文件，未指定时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    match path {
        Some(p) => SimConfig::from_file(p)
            .with_context(|| format!("无法加载配置文件 {}", p.display())),
        None => Ok(SimConfig::default()),
    }
}
