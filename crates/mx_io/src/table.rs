// crates/mx_io/src/table.rs

//! 制表符分隔的数据表
//!
//! 首行为表头 `# name (unit)\t...`，之后每行一条记录。
//! 行缓存在内存写缓冲区中，[`TableWriter::flush`] 时落盘。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mx_foundation::{MxError, MxResult};

/// 数据表列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// 列名
    pub name: String,
    /// 单位（可为空）
    pub unit: String,
}

impl Column {
    /// 创建列
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// 数据表写入器
#[derive(Debug)]
pub struct TableWriter {
    path: PathBuf,
    columns: Vec<Column>,
    writer: BufWriter<File>,
    rows: usize,
}

impl TableWriter {
    /// 创建数据表文件并写入表头
    pub fn create(path: impl Into<PathBuf>, columns: Vec<Column>) -> MxResult<Self> {
        let path = path.into();
        if columns.is_empty() {
            return Err(MxError::invalid_input("数据表至少需要一列"));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)
            .map_err(|e| MxError::io_with_source(format!("无法创建 {}", path.display()), e))?;
        let mut writer = BufWriter::new(file);

        let header: Vec<String> = columns
            .iter()
            .map(|c| {
                if c.unit.is_empty() {
                    c.name.clone()
                } else {
                    format!("{} ({})", c.name, c.unit)
                }
            })
            .collect();
        writeln!(writer, "# {}", header.join("\t"))?;

        Ok(Self {
            path,
            columns,
            writer,
            rows: 0,
        })
    }

    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 列定义
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// 已写入行数
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// 追加一行
    pub fn add_row(&mut self, values: &[f64]) -> MxResult<()> {
        if values.len() != self.columns.len() {
            return Err(MxError::invalid_input(format!(
                "{}: 行有 {} 个值，表有 {} 列",
                self.path.display(),
                values.len(),
                self.columns.len()
            )));
        }
        let line: Vec<String> = values.iter().map(|v| format!("{:e}", v)).collect();
        writeln!(self.writer, "{}", line.join("\t"))?;
        self.rows += 1;
        Ok(())
    }

    /// 刷新到磁盘
    pub fn flush(&mut self) -> MxResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
