//! `tm-matrix` - GPU matrices stored in textures and multiplied by render passes.
//!
//! This crate provides:
//! - A `Matrix` type owning one GPU texture, with multiply, copy, readback and display
//! - A `Backend` handle that opens a `wgpu` device and compiles the kernel set
//! - A `Dispatcher` binding matrices to a kernel and issuing one full-screen pass
//! - A bit-exact `f32` <-> texel codec
//! - A `ComputeBackend` trait with a reference `CpuBackend`

pub mod backend;
pub mod codec;
pub mod config;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod matrix;
pub mod shape;
pub mod storage;

// Re-export primary types at the crate root for convenience.
pub use backend::ComputeBackend;
pub use config::BackendConfig;
pub use cpu::CpuBackend;
pub use error::{BackendInitError, MatrixError, Result, ShapeError};
pub use gpu::{Backend, Dispatcher, KernelKind};
pub use matrix::Matrix;
pub use shape::MatrixShape;
pub use storage::StorageKind;
