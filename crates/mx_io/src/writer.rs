// crates/mx_io/src/writer.rs

//! 快照写盘
//!
//! [`SnapshotWriter`] 是保存线程使用的持久化契约：写入要么完整落盘，
//! 要么返回错误，不做部分写入恢复。
//!
//! # 转储文件格式 (v1)
//!
//! ```text
//! [魔数: 4 bytes] "MXDP"
//! [版本: u32]
//! [时间: f64]
//! [分量数: u32]
//! [单元数: u64]
//! [数据: ncomp * ncell * f32]
//! ```
//!
//! 所有数值均为小端序，数据为交错布局。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use mx_foundation::{MxError, MxResult, Shape};
use mx_runtime::{Block, MemoryLocation};
use tracing::trace;

// ============================================================
// 常量
// ============================================================

/// 转储文件魔数
pub const DUMP_MAGIC: &[u8; 4] = b"MXDP";

/// 转储文件格式版本
pub const DUMP_VERSION: u32 = 1;

/// 头部字节数
const HEADER_LEN: usize = 4 + 4 + 8 + 4 + 8;

// ============================================================
// 写盘契约
// ============================================================

/// 快照写盘 Trait
pub trait SnapshotWriter: Send {
    /// 同步写入一个快照
    fn write(&mut self, file: &Path, data: &Block, time: f64) -> MxResult<()>;
}

impl<W: SnapshotWriter + ?Sized> SnapshotWriter for Box<W> {
    fn write(&mut self, file: &Path, data: &Block, time: f64) -> MxResult<()> {
        (**self).write(file, data, time)
    }
}

// ============================================================
// 转储写入器
// ============================================================

/// 二进制转储写入器
///
/// 相对路径解析到输出目录下；先写临时文件再重命名。
#[derive(Debug)]
pub struct DumpWriter {
    directory: PathBuf,
    files_written: u64,
    bytes_written: u64,
}

impl DumpWriter {
    /// 创建写入器（目录不存在时创建）
    pub fn new(directory: impl Into<PathBuf>) -> MxResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| {
            MxError::io_with_source(format!("无法创建输出目录 {}", directory.display()), e)
        })?;
        Ok(Self {
            directory,
            files_written: 0,
            bytes_written: 0,
        })
    }

    /// 输出目录
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 已写入文件数
    pub fn files_written(&self) -> u64 {
        self.files_written
    }

    /// 已写入字节数
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.directory.join(file)
        }
    }
}

impl SnapshotWriter for DumpWriter {
    fn write(&mut self, file: &Path, data: &Block, time: f64) -> MxResult<()> {
        let path = self.resolve(file);
        let bytes = write_dump(&path, data, time)?;
        self.files_written += 1;
        self.bytes_written += bytes;
        trace!(path = %path.display(), time, bytes, "快照已写盘");
        Ok(())
    }
}

/// 原子写入一个转储文件，返回写入字节数
pub fn write_dump(path: &Path, data: &Block, time: f64) -> MxResult<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let shape = data.shape();
    {
        let file = File::create(&temp_path).map_err(|e| {
            MxError::io_with_source(format!("无法创建 {}", temp_path.display()), e)
        })?;
        let mut writer = BufWriter::new(file);

        writer.write_all(DUMP_MAGIC)?;
        writer.write_all(&DUMP_VERSION.to_le_bytes())?;
        writer.write_all(&time.to_le_bytes())?;
        writer.write_all(&(shape.ncomp() as u32).to_le_bytes())?;
        writer.write_all(&(shape.ncell() as u64).to_le_bytes())?;

        if cfg!(target_endian = "little") {
            writer.write_all(bytemuck::cast_slice(data.data()))?;
        } else {
            for v in data.data() {
                writer.write_all(&v.to_le_bytes())?;
            }
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    std::fs::rename(&temp_path, path)
        .map_err(|e| MxError::io_with_source(format!("无法重命名到 {}", path.display()), e))?;

    Ok((HEADER_LEN + shape.size_bytes()) as u64)
}

// ============================================================
// 读取
// ============================================================

/// 读取的转储文件
#[derive(Debug)]
pub struct Dump {
    /// 快照时间 [s]
    pub time: f64,
    /// 数据（主机缓冲区）
    pub block: Block,
}

/// 读取转储文件
pub fn read_dump(path: &Path) -> MxResult<Dump> {
    let file = File::open(path)
        .map_err(|e| MxError::io_with_source(format!("无法打开 {}", path.display()), e))?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != DUMP_MAGIC {
        return Err(MxError::format(format!(
            "{}: 魔数错误 {:?}",
            path.display(),
            magic
        )));
    }

    let mut buf4 = [0u8; 4];
    let mut buf8 = [0u8; 8];

    reader.read_exact(&mut buf4)?;
    let version = u32::from_le_bytes(buf4);
    if version != DUMP_VERSION {
        return Err(MxError::format(format!(
            "{}: 不支持的版本 {}",
            path.display(),
            version
        )));
    }

    reader.read_exact(&mut buf8)?;
    let time = f64::from_le_bytes(buf8);

    reader.read_exact(&mut buf4)?;
    let ncomp = u32::from_le_bytes(buf4) as usize;

    reader.read_exact(&mut buf8)?;
    let ncell = usize::try_from(u64::from_le_bytes(buf8))
        .map_err(|_| MxError::format(format!("{}: 单元数超出范围", path.display())))?;

    let shape = Shape::new(ncomp, ncell);
    let payload = shape
        .checked_size_bytes()
        .ok_or_else(|| MxError::format(format!("{}: 形状 {} 溢出", path.display(), shape)))?;
    let available = file_len.saturating_sub(HEADER_LEN as u64);
    if payload as u64 != available {
        return Err(MxError::format(format!(
            "{}: 形状 {} 需要 {} 字节数据，文件中有 {} 字节",
            path.display(),
            shape,
            payload,
            available
        )));
    }
    let mut bytes = vec![0u8; payload];
    reader.read_exact(&mut bytes)?;

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(MxError::format(format!("{}: 数据后有多余字节", path.display())));
    }

    let data = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let block = Block::from_vec(shape, MemoryLocation::Host, data)?;

    Ok(Dump { time, block })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Block {
        let data = (0..12).map(|i| i as f32 * 0.5).collect();
        Block::from_vec(Shape::vector(4), MemoryLocation::Host, data).unwrap()
    }

    #[test]
    fn test_dump_write_and_read() {
        let dir = tempdir().unwrap();
        let mut writer = DumpWriter::new(dir.path()).unwrap();
        let block = sample();

        writer.write(Path::new("m000001.dump"), &block, 1.5e-9).unwrap();
        assert_eq!(writer.files_written(), 1);
        assert_eq!(writer.bytes_written(), (HEADER_LEN + 48) as u64);

        let dump = read_dump(&dir.path().join("m000001.dump")).unwrap();
        assert_eq!(dump.time, 1.5e-9);
        assert_eq!(dump.block.shape(), Shape::vector(4));
        assert_eq!(dump.block.data(), block.data());
    }

    #[test]
    fn test_no_temp_file_left() {
        let dir = tempdir().unwrap();
        let mut writer = DumpWriter::new(dir.path()).unwrap();
        writer.write(Path::new("a.dump"), &sample(), 0.0).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.dump")]);
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.dump");
        std::fs::write(&path, b"NOPE0000000000000000000000000000").unwrap();
        assert!(matches!(read_dump(&path), Err(MxError::Format { .. })));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dump");
        write_dump(&path, &sample(), 0.0).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(read_dump(&path).is_err());
    }

    fn header(ncomp: u32, ncell: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(DUMP_MAGIC);
        bytes.extend_from_slice(&DUMP_VERSION.to_le_bytes());
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.extend_from_slice(&ncomp.to_le_bytes());
        bytes.extend_from_slice(&ncell.to_le_bytes());
        bytes
    }

    #[test]
    fn test_oversized_header_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.dump");

        // 字节数溢出
        std::fs::write(&path, header(3, 1 << 62)).unwrap();
        assert!(matches!(read_dump(&path), Err(MxError::Format { .. })));

        // 不溢出但远超文件长度，不应按头部分配
        let mut bytes = header(3, 1 << 40);
        bytes.extend_from_slice(&[0u8; 12]);
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(read_dump(&path), Err(MxError::Format { .. })));
    }
}
