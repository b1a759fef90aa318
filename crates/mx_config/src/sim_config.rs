// crates/mx_config/src/sim_config.rs

//! SimConfig - 模拟配置
//!
//! JSON 格式，所有字段均有默认值。加载后经 [`SimConfig::validate`] 校验，
//! 再转换为各层的核心配置。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mx_foundation::Shape;
use mx_io::PipelineConfig;
use mx_runtime::PoolConfig;
use mx_solver::HeunConfig;

use crate::error::ConfigError;

/// 模拟配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// 网格与初始状态
    #[serde(default)]
    pub mesh: MeshConfig,

    /// 求解器参数
    #[serde(default)]
    pub solver: SolverSection,

    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,

    /// 设备缓冲池
    #[serde(default)]
    pub pool: PoolSection,

    /// 演示力矩参数
    #[serde(default)]
    pub torque: TorqueConfig,

    /// 模拟总时长 [s]
    #[serde(default = "default_duration")]
    pub duration: f64,
}

fn default_duration() -> f64 { 1e-9 }

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mesh: MeshConfig::default(),
            solver: SolverSection::default(),
            output: OutputConfig::default(),
            pool: PoolSection::default(),
            torque: TorqueConfig::default(),
            duration: default_duration(),
        }
    }
}

/// 网格配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// 单元数
    #[serde(default = "default_ncell")]
    pub ncell: usize,

    /// 分量数
    #[serde(default = "default_ncomp")]
    pub ncomp: usize,

    /// 每个单元的初始矢量
    #[serde(default = "default_initial")]
    pub initial: [f32; 3],
}

fn default_ncell() -> usize { 4096 }
fn default_ncomp() -> usize { 3 }
fn default_initial() -> [f32; 3] { [1.0, 0.0, 0.0] }

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ncell: default_ncell(),
            ncomp: default_ncomp(),
            initial: default_initial(),
        }
    }
}

/// 求解器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSection {
    /// 初始步长 [s]
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// 步长倍率
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// 单步误差上限
    #[serde(default = "default_max_err")]
    pub max_err: f64,

    /// 修正余量
    #[serde(default = "default_headroom")]
    pub headroom: f64,

    /// 最小步长 [s]
    #[serde(default)]
    pub min_dt: f64,

    /// 最大步长 [s]，0 表示不限制
    #[serde(default)]
    pub max_dt: f64,

    /// 固定步长 [s]，0 表示自适应
    #[serde(default)]
    pub fixed_dt: f64,

    /// 单次修正最大放大倍数
    #[serde(default = "default_max_growth")]
    pub max_growth: f64,

    /// 单次修正最大缩小倍数
    #[serde(default = "default_max_shrink")]
    pub max_shrink: f64,

    /// 调试轨迹文件（相对输出目录）
    #[serde(default)]
    pub debug_trace: Option<PathBuf>,
}

fn default_dt() -> f64 { 1e-15 }
fn default_multiplier() -> f64 { 1.0 }
fn default_max_err() -> f64 { 1e-4 }
fn default_headroom() -> f64 { 0.75 }
fn default_max_growth() -> f64 { 2.0 }
fn default_max_shrink() -> f64 { 0.5 }

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            multiplier: default_multiplier(),
            max_err: default_max_err(),
            headroom: default_headroom(),
            min_dt: 0.0,
            max_dt: 0.0,
            fixed_dt: 0.0,
            max_growth: default_max_growth(),
            max_shrink: default_max_shrink(),
            debug_trace: None,
        }
    }
}

/// 输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出目录
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// 快照间隔 [s]
    #[serde(default = "default_interval")]
    pub interval: f64,

    /// 管道队列深度
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// 主机缓冲区页锁定
    #[serde(default = "default_true")]
    pub page_lock: bool,

    /// 是否写数据表
    #[serde(default = "default_true")]
    pub table: bool,
}

fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_interval() -> f64 { 1e-11 }
fn default_queue_depth() -> usize { mx_io::pipeline::DEFAULT_QUEUE_DEPTH }
fn default_true() -> bool { true }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            interval: default_interval(),
            queue_depth: default_queue_depth(),
            page_lock: true,
            table: true,
        }
    }
}

/// 设备缓冲池配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSection {
    /// 分配上限
    #[serde(default = "default_max_alloc")]
    pub max_alloc: usize,

    /// 回收集容量
    #[serde(default = "default_max_alloc")]
    pub recycle_capacity: usize,
}

fn default_max_alloc() -> usize { 4 }

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_alloc: default_max_alloc(),
            recycle_capacity: default_max_alloc(),
        }
    }
}

/// 演示力矩：均匀场中的阻尼进动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorqueConfig {
    /// 外场 [T]
    #[serde(default = "default_field")]
    pub field: [f64; 3],

    /// 阻尼系数
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// 旋磁比 [rad/(s·T)]
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

fn default_field() -> [f64; 3] { [0.0, 0.0, 0.1] }
fn default_alpha() -> f64 { 0.02 }
fn default_gamma() -> f64 { 1.7595e11 }

impl Default for TorqueConfig {
    fn default() -> Self {
        Self {
            field: default_field(),
            alpha: default_alpha(),
            gamma: default_gamma(),
        }
    }
}

impl SimConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SimConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mesh.ncell == 0 {
            return Err(ConfigError::invalid("mesh.ncell", 0, "单元数必须为正"));
        }
        if self.mesh.ncomp != 3 {
            return Err(ConfigError::invalid(
                "mesh.ncomp",
                self.mesh.ncomp,
                "归一化矢量场必须为 3 分量",
            ));
        }

        self.heun_config().validate()?;
        self.pipeline_config().validate()?;
        self.device_pool_config(0).validate()?;

        if !(self.output.interval > 0.0 && self.output.interval.is_finite()) {
            return Err(ConfigError::invalid(
                "output.interval",
                self.output.interval,
                "必须为有限正数",
            ));
        }
        if !(self.duration >= 0.0 && self.duration.is_finite()) {
            return Err(ConfigError::invalid("duration", self.duration, "必须为有限非负数"));
        }
        if !(self.torque.alpha >= 0.0 && self.torque.alpha.is_finite()) {
            return Err(ConfigError::invalid("torque.alpha", self.torque.alpha, "不能为负"));
        }
        if !self.torque.gamma.is_finite() || self.torque.field.iter().any(|b| !b.is_finite()) {
            return Err(ConfigError::invalid("torque", "非有限值", "参数必须有限"));
        }
        Ok(())
    }

    /// 场形状
    pub fn shape(&self) -> Shape {
        Shape::new(self.mesh.ncomp, self.mesh.ncell)
    }

    /// Heun 积分器配置
    pub fn heun_config(&self) -> HeunConfig {
        let s = &self.solver;
        HeunConfig {
            dt: s.dt,
            multiplier: s.multiplier,
            max_err: s.max_err,
            headroom: s.headroom,
            min_dt: s.min_dt,
            max_dt: s.max_dt,
            fixed_dt: s.fixed_dt,
            max_growth: s.max_growth,
            max_shrink: s.max_shrink,
            debug_trace: s.debug_trace.as_ref().map(|p| self.output.directory.join(p)),
        }
    }

    /// 输出管道配置
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_depth: self.output.queue_depth,
            page_lock: self.output.page_lock,
            ..Default::default()
        }
    }

    /// 设备缓冲池配置
    pub fn device_pool_config(&self, device_id: usize) -> PoolConfig {
        PoolConfig {
            recycle_capacity: self.pool.recycle_capacity,
            ..PoolConfig::device(self.shape(), device_id, self.pool.max_alloc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shape(), Shape::vector(4096));
        assert_eq!(config.pipeline_config().queue_depth, 16);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "mesh": { "ncell": 10 }, "solver": { "max_err": 1e-5 } }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mesh.ncell, 10);
        assert_eq!(config.mesh.ncomp, 3);
        assert_eq!(config.solver.max_err, 1e-5);
        assert_eq!(config.solver.headroom, 0.75);
        assert!(config.output.page_lock);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = SimConfig::default();
        config.output.queue_depth = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "output.queue_depth"
        ));

        let mut config = SimConfig::default();
        config.solver.headroom = 0.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.pool.max_alloc = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.mesh.ncomp = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_trace_relative_to_output() {
        let mut config = SimConfig::default();
        config.output.directory = PathBuf::from("out");
        config.solver.debug_trace = Some(PathBuf::from("debug_heun.table"));
        assert_eq!(
            config.heun_config().debug_trace,
            Some(PathBuf::from("out/debug_heun.table"))
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.json");
        let mut config = SimConfig::default();
        config.duration = 5e-10;
        config.save_to_file(&path).unwrap();
        let loaded = SimConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
