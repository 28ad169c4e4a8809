use std::fmt::Debug;

use crate::error::Result;

/// Trait for pluggable matrix multiply backends (GPU render passes, CPU
/// reference).
///
/// Data is passed in as row-major slices and returned as an owned vector,
/// so callers can compare backends without touching GPU handles.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu", "wgpu-encoded").
    fn name(&self) -> &str;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: row-major data of shape [m, k]
    /// - `b`: row-major data of shape [k, n]
    /// - Returns: row-major data of shape [m, n]
    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>>;
}
