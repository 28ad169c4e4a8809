use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::codec;
use crate::error::{MatrixError, Result};
use crate::gpu::{readback, Backend, Dispatcher, KernelKind};
use crate::shape::{flatten_rows, MatrixShape};

static NEXT_MATRIX_ID: AtomicU64 = AtomicU64::new(1);

/// The two GPU handles a live matrix owns: the texture holding its texels
/// and the render-target view passes write through.
pub(crate) struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    target: wgpu::TextureView,
}

impl GpuTexture {
    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn target(&self) -> &wgpu::TextureView {
        &self.target
    }
}

/// A row-major `f32` matrix resident in a GPU texture.
///
/// Each matrix exclusively owns its texture and render target. The shape
/// is fixed at allocation; contents only change through full-overwrite
/// render passes. After [`dispose`](Self::dispose) every operation fails
/// with [`MatrixError::UseAfterDispose`].
pub struct Matrix {
    backend: Backend,
    shape: MatrixShape,
    id: u64,
    gpu: Option<GpuTexture>,
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("id", &self.id)
            .field("cols", &self.shape.cols())
            .field("rows", &self.shape.rows())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Matrix {
    /// Allocate a `col_count` x `row_count` matrix on `backend`.
    ///
    /// With `initial` the texture is filled from row-major data; without
    /// it the contents are zero.
    ///
    /// # Errors
    /// Returns a shape error if a dimension is zero or too large for the
    /// device, or if `initial` does not hold exactly `col_count * row_count`
    /// values. Nothing is allocated in that case.
    pub fn allocate(backend: &Backend, col_count: u32, row_count: u32, initial: Option<&[f32]>) -> Result<Matrix> {
        backend.ensure_alive()?;
        let shape = MatrixShape::new(col_count, row_count, backend.max_dimension())?;
        if let Some(data) = initial {
            shape.check_data_len(data.len())?;
        }

        let id = NEXT_MATRIX_ID.fetch_add(1, Ordering::Relaxed);
        let label = format!("texmul.matrix.{id}");
        let size = wgpu::Extent3d {
            width: col_count,
            height: row_count,
            depth_or_array_layers: 1,
        };
        let format = backend.storage().texture_format();

        // wgpu zero-initializes new textures, so no upload is needed
        // without initial data.
        let texture = backend.scoped(&label, |device, queue| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            if let Some(data) = initial {
                queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    &codec::encode_slice(data),
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(col_count * codec::TEXEL_BYTES as u32),
                        rows_per_image: Some(row_count),
                    },
                    size,
                );
            }
            texture
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let target = texture.create_view(&wgpu::TextureViewDescriptor::default());

        debug!(
            "texmul: allocated matrix #{id} {shape} ({} bytes, {})",
            shape.byte_len(),
            if initial.is_some() { "uploaded" } else { "zeroed" }
        );

        Ok(Matrix {
            backend: backend.clone(),
            shape,
            id,
            gpu: Some(GpuTexture {
                texture,
                view,
                target,
            }),
        })
    }

    /// Zero-filled matrix.
    pub fn zeros(backend: &Backend, col_count: u32, row_count: u32) -> Result<Matrix> {
        Matrix::allocate(backend, col_count, row_count, None)
    }

    /// Matrix filled from row-major `data`.
    pub fn from_slice(backend: &Backend, col_count: u32, row_count: u32, data: &[f32]) -> Result<Matrix> {
        Matrix::allocate(backend, col_count, row_count, Some(data))
    }

    /// Matrix built from equally sized rows.
    pub fn from_rows(backend: &Backend, rows: &[Vec<f32>]) -> Result<Matrix> {
        let (cols, data) = flatten_rows(rows)?;
        let shape = MatrixShape::from_usize(cols, rows.len(), backend.max_dimension())?;
        Matrix::allocate(backend, shape.cols(), shape.rows(), Some(&data))
    }

    /// `n` x `n` identity matrix.
    pub fn identity(backend: &Backend, n: u32) -> Result<Matrix> {
        MatrixShape::new(n, n, backend.max_dimension())?;
        let n_usize = n as usize;
        let mut data = vec![0.0f32; n_usize * n_usize];
        for i in 0..n_usize {
            data[i * n_usize + i] = 1.0;
        }
        Matrix::allocate(backend, n, n, Some(&data))
    }

    pub fn col_count(&self) -> u32 {
        self.shape.cols()
    }

    pub fn row_count(&self) -> u32 {
        self.shape.rows()
    }

    pub fn shape(&self) -> MatrixShape {
        self.shape
    }

    /// Number of elements, `col_count * row_count`.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Process-unique identifier, stable for the matrix's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_disposed(&self) -> bool {
        self.gpu.is_none()
    }

    pub(crate) fn gpu(&self) -> Result<&GpuTexture> {
        self.gpu
            .as_ref()
            .ok_or(MatrixError::UseAfterDispose { id: self.id })
    }

    /// Matrix product `self * rhs` as a new matrix.
    ///
    /// `self` is [rows=M, cols=K], `rhs` is [rows=K, cols=N]; the result is
    /// [rows=M, cols=N]. Each output element is reduced over `k` in
    /// increasing order, so results agree with a CPU product only within
    /// floating point tolerance.
    pub fn multiply(&self, rhs: &Matrix) -> Result<Matrix> {
        self.gpu()?;
        rhs.gpu()?;
        if !self.backend.same_device(&rhs.backend) {
            return Err(MatrixError::Binding(format!(
                "matrices #{} and #{} belong to different backends",
                self.id, rhs.id
            )));
        }
        let out_shape = self.shape.matmul(&rhs.shape)?;
        let result = Matrix::zeros(&self.backend, out_shape.cols(), out_shape.rows())?;
        Dispatcher::new(&self.backend, KernelKind::Multiply)
            .bind_input(self, 0)?
            .bind_input(rhs, 1)?
            .bind_output(&result)?
            .dispatch()?;
        Ok(result)
    }

    /// Owned duplicate with identical shape and contents.
    pub fn copy(&self) -> Result<Matrix> {
        self.gpu()?;
        let result = Matrix::zeros(&self.backend, self.col_count(), self.row_count())?;
        Dispatcher::new(&self.backend, KernelKind::Copy)
            .bind_input(self, 0)?
            .bind_output(&result)?
            .dispatch()?;
        Ok(result)
    }

    /// Read the contents back as row-major data of length
    /// `col_count * row_count`.
    ///
    /// Blocks until every pass issued before this call has completed.
    pub fn read_back(&self) -> Result<Vec<f32>> {
        let gpu = self.gpu()?;
        self.backend.ensure_alive()?;
        let bytes = readback::read_texture(&self.backend, &gpu.texture, self.col_count(), self.row_count())?;
        codec::decode_slice(&bytes)
    }

    /// Draw the matrix on the display surface, positive values in red and
    /// negative values in cyan.
    pub fn display(&self) -> Result<()> {
        Dispatcher::new(&self.backend, KernelKind::Display)
            .bind_input(self, 0)?
            .bind_default_output()?
            .dispatch()
    }

    /// Draw a single raw texel channel (`0..=3`) on the display surface.
    ///
    /// With encoded storage each channel is one byte of the float's bit
    /// pattern, shown as intensity.
    pub fn display_channel(&self, channel: u32) -> Result<()> {
        if channel > 3 {
            return Err(MatrixError::InvalidArgument(format!(
                "display channel must be in 0..=3, got {channel}"
            )));
        }
        Dispatcher::new(&self.backend, KernelKind::DisplayChannel)
            .bind_input(self, 0)?
            .bind_default_output()?
            .set_channel(channel)
            .dispatch()
    }

    /// Release the texture and render target. The matrix stays `Disposed`
    /// for good; disposing twice is an error.
    pub fn dispose(&mut self) -> Result<()> {
        let gpu = self
            .gpu
            .take()
            .ok_or(MatrixError::UseAfterDispose { id: self.id })?;
        release(self.id, gpu);
        Ok(())
    }
}

impl Drop for Matrix {
    fn drop(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            release(self.id, gpu);
        }
    }
}

fn release(id: u64, gpu: GpuTexture) {
    let GpuTexture {
        texture,
        view,
        target,
    } = gpu;
    drop(view);
    drop(target);
    texture.destroy();
    debug!("texmul: released matrix #{id}");
}
