// crates/mx_runtime/src/kernels.rs

//! 逐单元并行的矢量运算
//!
//! 所有运算按单元并行（rayon），数据为交错布局，
//! 每个单元的 `ncomp` 个分量连续存放。

use mx_foundation::{MxError, MxResult};
use rayon::prelude::*;

use crate::block::Block;

/// `dst = a * sa + b * sb`
pub fn madd2(dst: &mut Block, a: &Block, sa: f32, b: &Block, sb: f32) -> MxResult<()> {
    MxError::check_shape("madd2.a", dst.shape(), a.shape())?;
    MxError::check_shape("madd2.b", dst.shape(), b.shape())?;
    dst.data_mut()?
        .par_iter_mut()
        .zip(a.data().par_iter())
        .zip(b.data().par_iter())
        .for_each(|((d, &x), &y)| *d = x * sa + y * sb);
    Ok(())
}

/// `y += x * s`
pub fn madd(y: &mut Block, x: &Block, s: f32) -> MxResult<()> {
    MxError::check_shape("madd.x", y.shape(), x.shape())?;
    y.data_mut()?
        .par_iter_mut()
        .zip(x.data().par_iter())
        .for_each(|(d, &v)| *d += v * s);
    Ok(())
}

/// `y += (a - b) * s`
pub fn madd_diff(y: &mut Block, a: &Block, b: &Block, s: f32) -> MxResult<()> {
    MxError::check_shape("madd_diff.a", y.shape(), a.shape())?;
    MxError::check_shape("madd_diff.b", y.shape(), b.shape())?;
    y.data_mut()?
        .par_iter_mut()
        .zip(a.data().par_iter())
        .zip(b.data().par_iter())
        .for_each(|((d, &p), &q)| *d += (p - q) * s);
    Ok(())
}

/// 将每个单元的矢量归一化为单位长度，零矢量保持为零
pub fn normalize(y: &mut Block) -> MxResult<()> {
    let n = y.ncomp();
    if n == 0 {
        return Ok(());
    }
    y.data_mut()?.par_chunks_mut(n).for_each(|v| {
        let norm = v.iter().map(|c| c * c).sum::<f32>().sqrt();
        if norm > 0.0 {
            let inv = 1.0 / norm;
            v.iter_mut().for_each(|c| *c *= inv);
        }
    });
    Ok(())
}

/// `max_i |a_i - b_i|`，按单元矢量范数
pub fn max_vec_diff(a: &Block, b: &Block) -> MxResult<f32> {
    MxError::check_shape("max_vec_diff", a.shape(), b.shape())?;
    let n = a.ncomp();
    if n == 0 {
        return Ok(0.0);
    }
    let max = a
        .data()
        .par_chunks(n)
        .zip(b.data().par_chunks(n))
        .map(|(u, v)| {
            u.iter()
                .zip(v)
                .map(|(p, q)| (p - q) * (p - q))
                .sum::<f32>()
        })
        .reduce(|| 0.0, nan_max);
    Ok(max.sqrt())
}

/// `max_i |y_i|`，按单元矢量范数
pub fn max_vec_norm(y: &Block) -> f32 {
    if y.ncomp() == 0 {
        return 0.0;
    }
    y.data()
        .par_chunks(y.ncomp())
        .map(|v| v.iter().map(|c| c * c).sum::<f32>())
        .reduce(|| 0.0, nan_max)
        .sqrt()
}

/// 各分量在所有单元上的平均值
pub fn average(y: &Block) -> Vec<f64> {
    let n = y.ncomp();
    let ncell = y.ncell();
    if ncell == 0 || n == 0 {
        return vec![0.0; n];
    }
    let sums = y
        .data()
        .par_chunks(n)
        .fold(
            || vec![0.0f64; n],
            |mut acc, v| {
                acc.iter_mut().zip(v).for_each(|(a, &c)| *a += c as f64);
                acc
            },
        )
        .reduce(
            || vec![0.0f64; n],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                a
            },
        );
    sums.into_iter().map(|s| s / ncell as f64).collect()
}

/// NaN 向上传播的最大值
#[inline]
fn nan_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.max(b)
    }
}
