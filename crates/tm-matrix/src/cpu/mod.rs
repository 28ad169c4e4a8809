use crate::backend::ComputeBackend;
use crate::error::Result;
use crate::shape::MatrixShape;

/// Pure-Rust CPU backend.
///
/// Straightforward triple loop with the same reduction order as the GPU
/// multiply kernel. Serves as the reference the GPU results are checked
/// against.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        matmul(a, b, m, k, n)
    }
}

/// Row-major `[m, k] @ [k, n]`, summing over `p` in increasing order.
pub fn matmul(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
    MatrixShape::from_usize(k, m, u32::MAX)?.check_data_len(a.len())?;
    MatrixShape::from_usize(n, k, u32::MAX)?.check_data_len(b.len())?;

    let mut c = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            c[i * n + j] = sum;
        }
    }
    Ok(c)
}
