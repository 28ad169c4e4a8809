//! GPU backend built on `wgpu` render passes.
//!
//! Matrices live in textures; every operation is a full-screen quad drawn
//! into the result's render target, one fragment per output element.
//!
//! Only readback synchronizes with the GPU. Allocation, binding and
//! dispatch return as soon as the commands are queued; the single queue
//! keeps them in issue order, so a pass reading a matrix always observes
//! the last pass that wrote it.

pub mod dispatch;
pub mod kernel;
pub(crate) mod readback;
pub(crate) mod surface;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};
use wgpu::util::DeviceExt;

use crate::backend::ComputeBackend;
use crate::config::BackendConfig;
use crate::error::{BackendInitError, MatrixError, Result};
use crate::matrix::Matrix;
use crate::shape::MatrixShape;
use crate::storage::StorageKind;

pub use dispatch::Dispatcher;
pub use kernel::{Kernel, KernelKind, KernelUniforms, DISPLAY_FORMAT};

use kernel::{KernelSet, FULL_SCREEN_QUAD};
use surface::DisplaySurface;

struct Shared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    storage: StorageKind,
    max_texture_dim: u32,
    kernels: KernelSet,
    quad: wgpu::Buffer,
    display: DisplaySurface,
    lost: Arc<AtomicBool>,
    // Serializes error scopes and queue submissions.
    submit: Mutex<()>,
}

/// Handle to a GPU device with the compiled kernel set.
///
/// Cheap to clone; every [`Matrix`] keeps a clone of the backend it was
/// allocated on. Kernels are compiled once in [`Backend::new`] and are
/// read-only afterwards.
#[derive(Clone)]
pub struct Backend {
    shared: Arc<Shared>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("adapter", &self.shared.adapter_info.name)
            .field("api", &self.shared.adapter_info.backend)
            .field("storage", &self.shared.storage)
            .field("lost", &self.is_lost())
            .finish()
    }
}

impl Backend {
    /// Create a backend: pick an adapter, open a device and compile every
    /// kernel.
    ///
    /// # Errors
    /// Fails with [`MatrixError::BackendInit`] if no adapter is available,
    /// the device cannot be opened, a kernel fails to compile, or the
    /// display surface cannot be created. No backend is returned in that
    /// case.
    pub fn new(config: BackendConfig) -> Result<Backend> {
        if config.display_width == 0 || config.display_height == 0 {
            return Err(MatrixError::InvalidArgument(format!(
                "display surface must be non-empty, got {}x{}",
                config.display_width, config.display_height
            )));
        }
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            force_fallback_adapter: config.force_fallback_adapter,
            compatible_surface: None,
        }))
        .ok_or(BackendInitError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("texmul.device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(BackendInitError::from)?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.on_uncaptured_error(Box::new(move |err| {
            error!("texmul: uncaptured GPU error, marking device lost: {err}");
            lost_flag.store(true, Ordering::SeqCst);
        }));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            error!("texmul: device lost: reason={reason:?}, message={message}");
            lost_flag.store(true, Ordering::SeqCst);
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let kernels = KernelSet::compile(&device, config.storage);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(BackendInitError::KernelCompile(err.to_string()).into());
        }

        let max_texture_dim = device.limits().max_texture_dimension_2d;
        if config.display_width > max_texture_dim || config.display_height > max_texture_dim {
            return Err(BackendInitError::DisplayTooLarge {
                width: config.display_width,
                height: config.display_height,
                max: max_texture_dim,
            }
            .into());
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texmul.quad"),
            contents: bytemuck::cast_slice(&FULL_SCREEN_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let display = DisplaySurface::new(&device, config.display_width, config.display_height);
        let oom = pollster::block_on(device.pop_error_scope());
        let validation = pollster::block_on(device.pop_error_scope());
        if let Some(err) = oom.or(validation) {
            return Err(BackendInitError::Resource(err.to_string()).into());
        }

        info!(
            "texmul: backend ready on '{}' ({:?}), storage={}, max texture {}",
            adapter_info.name, adapter_info.backend, config.storage, max_texture_dim
        );

        Ok(Backend {
            shared: Arc::new(Shared {
                device,
                queue,
                adapter_info,
                storage: config.storage,
                max_texture_dim,
                kernels,
                quad,
                display,
                lost,
                submit: Mutex::new(()),
            }),
        })
    }

    /// Storage strategy shared by every matrix on this backend.
    pub fn storage(&self) -> StorageKind {
        self.shared.storage
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.shared.adapter_info
    }

    /// Largest allowed matrix dimension along either axis.
    pub fn max_dimension(&self) -> u32 {
        self.shared.max_texture_dim
    }

    /// Look up one of the compiled kernels.
    pub fn kernel(&self, kind: KernelKind) -> &Kernel {
        self.shared.kernels.get(kind)
    }

    /// Dimensions of the default display surface as `(width, height)`.
    pub fn display_size(&self) -> (u32, u32) {
        (self.shared.display.width(), self.shared.display.height())
    }

    /// Read the display surface as tightly packed RGBA8 rows. Blocks until
    /// every queued pass has finished.
    pub fn read_display(&self) -> Result<Vec<u8>> {
        self.ensure_alive()?;
        let display = &self.shared.display;
        readback::read_texture(self, display.texture(), display.width(), display.height())
    }

    /// True once the device has reported an unrecoverable error.
    pub fn is_lost(&self) -> bool {
        self.shared.lost.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_lost() {
            return Err(MatrixError::DeviceLost(
                "backend is unusable after an earlier device failure".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn mark_lost(&self, reason: &str) {
        error!("texmul: device lost: {reason}");
        self.shared.lost.store(true, Ordering::SeqCst);
    }

    pub(crate) fn same_device(&self, other: &Backend) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    pub(crate) fn quad(&self) -> &wgpu::Buffer {
        &self.shared.quad
    }

    pub(crate) fn display_target(&self) -> &wgpu::TextureView {
        self.shared.display.view()
    }

    /// Run `f` with validation and out-of-memory error scopes pushed,
    /// holding the submission lock. Errors captured by the scopes are
    /// returned instead of `f`'s value.
    pub(crate) fn scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device, &wgpu::Queue) -> T) -> Result<T> {
        let _guard = self.lock();
        let device = &self.shared.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f(device, &self.shared.queue);
        let oom = pollster::block_on(device.pop_error_scope());
        let validation = pollster::block_on(device.pop_error_scope());
        if let Some(err) = oom {
            return Err(MatrixError::Gpu(format!("{what}: out of memory: {err}")));
        }
        if let Some(err) = validation {
            return Err(MatrixError::Gpu(format!("{what}: {err}")));
        }
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.shared
            .submit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ComputeBackend for Backend {
    fn name(&self) -> &str {
        match self.shared.storage {
            StorageKind::Encoded => "wgpu-encoded",
            StorageKind::NativeFloat => "wgpu-float",
        }
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        let max = self.max_dimension();
        let lhs_shape = MatrixShape::from_usize(k, m, max)?;
        let rhs_shape = MatrixShape::from_usize(n, k, max)?;
        debug!("texmul: matmul [{m}x{k}] @ [{k}x{n}]");
        let lhs = Matrix::allocate(self, lhs_shape.cols(), lhs_shape.rows(), Some(a))?;
        let rhs = Matrix::allocate(self, rhs_shape.cols(), rhs_shape.rows(), Some(b))?;
        lhs.multiply(&rhs)?.read_back()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::OnceLock;

    use super::*;

    /// Fresh backend not shared with other tests, or `None` without a GPU.
    pub(crate) fn open(storage: StorageKind) -> Option<Backend> {
        let config = BackendConfig {
            storage,
            display_width: 16,
            display_height: 8,
            ..BackendConfig::default()
        };
        match Backend::new(config) {
            Ok(backend) => Some(backend),
            Err(err) => {
                eprintln!("skipping GPU test ({storage} storage): {err}");
                None
            }
        }
    }

    /// Shared backend with encoded storage, or `None` without a GPU.
    pub(crate) fn backend() -> Option<Backend> {
        static BACKEND: OnceLock<Option<Backend>> = OnceLock::new();
        BACKEND.get_or_init(|| open(StorageKind::Encoded)).clone()
    }

    /// Shared backend with native float storage, or `None` without a GPU.
    pub(crate) fn float_backend() -> Option<Backend> {
        static BACKEND: OnceLock<Option<Backend>> = OnceLock::new();
        BACKEND.get_or_init(|| open(StorageKind::NativeFloat)).clone()
    }

    /// Held by tests that draw to and read the shared display surface.
    pub(crate) fn display_lock() -> MutexGuard<'static, ()> {
        static LOCK: Mutex<()> = Mutex::new(());
        LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_backend_reports_storage() {
        let Some(backend) = testing::backend() else { return };
        assert_eq!(backend.storage(), StorageKind::Encoded);
        assert_eq!(backend.name(), "wgpu-encoded");
        assert!(!backend.is_lost());
        assert!(backend.max_dimension() >= 2048);
        assert_eq!(backend.display_size(), (16, 8));
    }

    #[test]
    fn test_kernels_have_expected_targets() {
        let Some(backend) = testing::backend() else { return };
        for kind in KernelKind::ALL {
            let kernel = backend.kernel(kind);
            assert_eq!(kernel.kind(), kind);
            let expected = if kind.writes_display() {
                DISPLAY_FORMAT
            } else {
                backend.storage().texture_format()
            };
            assert_eq!(kernel.target_format(), expected);
        }
    }

    #[test]
    fn test_compute_backend_matmul() {
        let Some(backend) = testing::backend() else { return };
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let c = backend.matmul(&a, &b, 2, 2, 2).unwrap();
        let expected = [19.0, 22.0, 43.0, 50.0];
        for (x, y) in c.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_compute_backend_matmul_length_mismatch() {
        let Some(backend) = testing::backend() else { return };
        let err = backend.matmul(&[1.0, 2.0, 3.0], &[1.0; 4], 2, 2, 2).unwrap_err();
        assert!(matches!(err, MatrixError::Shape(_)));
    }

    #[test]
    fn test_empty_display_rejected() {
        let config = BackendConfig {
            display_width: 0,
            ..BackendConfig::default()
        };
        assert!(matches!(
            Backend::new(config),
            Err(MatrixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_oversized_display_fails_construction() {
        if testing::backend().is_none() {
            return;
        }
        let config = BackendConfig {
            display_width: u32::MAX,
            display_height: 8,
            ..BackendConfig::default()
        };
        assert!(matches!(
            Backend::new(config),
            Err(MatrixError::BackendInit(BackendInitError::DisplayTooLarge { .. }))
        ));
    }

    #[test]
    fn test_lost_backend_rejects_every_operation() {
        let Some(backend) = testing::open(StorageKind::Encoded) else { return };
        let m = Matrix::identity(&backend, 2).unwrap();
        let out = Matrix::zeros(&backend, 2, 2).unwrap();
        backend.mark_lost("forced by test");
        assert!(backend.is_lost());

        assert!(matches!(
            Matrix::zeros(&backend, 2, 2),
            Err(MatrixError::DeviceLost(_))
        ));
        assert!(matches!(m.read_back(), Err(MatrixError::DeviceLost(_))));
        assert!(matches!(m.multiply(&m), Err(MatrixError::DeviceLost(_))));
        assert!(matches!(m.copy(), Err(MatrixError::DeviceLost(_))));
        assert!(matches!(m.display(), Err(MatrixError::DeviceLost(_))));
        assert!(matches!(backend.read_display(), Err(MatrixError::DeviceLost(_))));

        let mut pass = Dispatcher::new(&backend, KernelKind::Copy);
        pass.bind_input(&m, 0).unwrap().bind_output(&out).unwrap();
        assert!(matches!(pass.dispatch(), Err(MatrixError::DeviceLost(_))));
    }
}
