// crates/mx_foundation/src/shape.rs

//! 多分量场形状
//!
//! 一个场由 `ncomp` 个分量、`ncell` 个单元组成。数据按单元交错存放：
//! 同一单元的各分量连续，即第 `i` 个单元的第 `c` 个分量位于 `i * ncomp + c`。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 场的形状（分量数 × 单元数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    ncomp: usize,
    ncell: usize,
}

impl Shape {
    /// 创建形状
    pub const fn new(ncomp: usize, ncell: usize) -> Self {
        Self { ncomp, ncell }
    }

    /// 三分量矢量场
    pub const fn vector(ncell: usize) -> Self {
        Self::new(3, ncell)
    }

    /// 标量场
    pub const fn scalar(ncell: usize) -> Self {
        Self::new(1, ncell)
    }

    /// 分量数
    #[inline]
    pub const fn ncomp(&self) -> usize {
        self.ncomp
    }

    /// 单元数
    #[inline]
    pub const fn ncell(&self) -> usize {
        self.ncell
    }

    /// 元素总数
    #[inline]
    pub const fn len(&self) -> usize {
        self.ncomp * self.ncell
    }

    /// 是否为空
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 字节大小（f32 存储）
    #[inline]
    pub const fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<f32>()
    }

    /// 字节数，溢出时返回 `None`
    pub const fn checked_size_bytes(&self) -> Option<usize> {
        match self.ncomp.checked_mul(self.ncell) {
            Some(len) => len.checked_mul(std::mem::size_of::<f32>()),
            None => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.ncomp, self.ncell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_shape() {
        let s = Shape::vector(10);
        assert_eq!(s.ncomp(), 3);
        assert_eq!(s.ncell(), 10);
        assert_eq!(s.len(), 30);
        assert_eq!(s.size_bytes(), 120);
        assert_eq!(s.checked_size_bytes(), Some(120));
        assert_eq!(Shape::new(3, usize::MAX / 2).checked_size_bytes(), None);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_empty_shape() {
        assert!(Shape::scalar(0).is_empty());
        assert!(Shape::new(0, 5).is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let s = Shape::new(2, 7);
        let json = serde_json::to_string(&s).unwrap();
        let parsed: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
