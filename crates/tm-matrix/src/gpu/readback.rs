use std::sync::mpsc;

use log::trace;

use super::Backend;
use crate::codec::TEXEL_BYTES;
use crate::error::{MatrixError, Result};

/// Round `unpadded` up to the row pitch `copy_texture_to_buffer` requires.
pub(crate) fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copy a 4-byte-per-texel texture into host memory, rows tightly packed.
///
/// This is the synchronization point of the pipeline: the copy is queued
/// behind every pass issued so far and the call blocks until the GPU has
/// drained them.
pub(crate) fn read_texture(backend: &Backend, texture: &wgpu::Texture, width: u32, height: u32) -> Result<Vec<u8>> {
    let unpadded = width * TEXEL_BYTES as u32;
    let padded = padded_bytes_per_row(unpadded);
    let size = padded as u64 * height as u64;

    let staging = backend.scoped("readback", |device, queue| {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texmul.readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texmul.readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));
        staging
    })?;

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    let _ = backend.device().poll(wgpu::Maintain::Wait);
    let mapped = rx
        .recv()
        .map_err(|_| MatrixError::DeviceLost("readback map_async callback dropped".to_string()))
        .and_then(|res| res.map_err(|e| MatrixError::DeviceLost(format!("readback map failed: {e}"))));
    if let Err(err) = mapped {
        backend.mark_lost(&err.to_string());
        return Err(err);
    }
    trace!("texmul: mapped {size} readback bytes for {width}x{height} texture");

    let mut out = Vec::with_capacity(unpadded as usize * height as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks_exact(padded as usize) {
            out.extend_from_slice(&row[..unpadded as usize]);
        }
    }
    staging.unmap();
    Ok(out)
}
