use log::debug;
use wgpu::util::DeviceExt;

use super::kernel::{texture_binding, Kernel, KernelKind, KernelUniforms, MAX_INPUTS};
use super::Backend;
use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;

struct BoundInput<'a> {
    id: u64,
    view: &'a wgpu::TextureView,
}

enum BoundOutput<'a> {
    Matrix {
        id: u64,
        target: &'a wgpu::TextureView,
    },
    Display,
}

/// Binds matrices to one kernel and issues a single full-screen pass.
///
/// ```ignore
/// Dispatcher::new(&backend, KernelKind::Multiply)
///     .bind_input(&lhs, 0)?
///     .bind_input(&rhs, 1)?
///     .bind_output(&result)?
///     .dispatch()?;
/// ```
///
/// Binding only records state on the dispatcher; nothing reaches the GPU
/// until [`dispatch`](Self::dispatch), which validates the whole binding
/// first so a rejected call never enqueues work.
pub struct Dispatcher<'a> {
    backend: &'a Backend,
    kernel: &'a Kernel,
    inputs: [Option<BoundInput<'a>>; MAX_INPUTS],
    output: Option<BoundOutput<'a>>,
    uniforms: KernelUniforms,
}

impl<'a> Dispatcher<'a> {
    pub fn new(backend: &'a Backend, kind: KernelKind) -> Self {
        Self {
            backend,
            kernel: backend.kernel(kind),
            inputs: Default::default(),
            output: None,
            uniforms: KernelUniforms::default(),
        }
    }

    /// Bind `matrix` to `tex{slot}` and set `width{slot}` / `height{slot}`.
    pub fn bind_input(&mut self, matrix: &'a Matrix, slot: usize) -> Result<&mut Self> {
        let kind = self.kernel.kind();
        if slot >= kind.arity() {
            return Err(MatrixError::Binding(format!(
                "{kind} kernel has {} input slot(s), got slot {slot}",
                kind.arity()
            )));
        }
        if self.inputs[slot].is_some() {
            return Err(MatrixError::Binding(format!("{kind} input slot {slot} bound twice")));
        }
        self.check_device(matrix)?;
        let gpu = matrix.gpu()?;
        self.uniforms.set_input(slot, matrix.col_count(), matrix.row_count());
        self.inputs[slot] = Some(BoundInput {
            id: matrix.id(),
            view: gpu.view(),
        });
        Ok(self)
    }

    /// Render into `matrix`, sized to the matrix itself.
    pub fn bind_output(&mut self, matrix: &'a Matrix) -> Result<&mut Self> {
        self.check_output_free()?;
        let kind = self.kernel.kind();
        if kind.writes_display() {
            return Err(MatrixError::Binding(format!(
                "{kind} kernel renders to the display surface, not a matrix"
            )));
        }
        self.check_device(matrix)?;
        let gpu = matrix.gpu()?;
        self.uniforms.set_output(matrix.col_count(), matrix.row_count());
        self.output = Some(BoundOutput::Matrix {
            id: matrix.id(),
            target: gpu.target(),
        });
        Ok(self)
    }

    /// Render into the backend's display surface, sized to the surface.
    pub fn bind_default_output(&mut self) -> Result<&mut Self> {
        self.check_output_free()?;
        let kind = self.kernel.kind();
        if !kind.writes_display() {
            return Err(MatrixError::Binding(format!(
                "{kind} kernel writes matrix texels and cannot target the display surface"
            )));
        }
        let (width, height) = self.backend.display_size();
        self.uniforms.set_output(width, height);
        self.output = Some(BoundOutput::Display);
        Ok(self)
    }

    /// Set the `channel` uniform read by the display-channel kernel.
    pub fn set_channel(&mut self, channel: u32) -> &mut Self {
        self.uniforms.channel = channel;
        self
    }

    /// Uniform values that the next dispatch will upload.
    pub fn uniforms(&self) -> &KernelUniforms {
        &self.uniforms
    }

    /// Draw one full-screen quad so the kernel runs once per output texel.
    pub fn dispatch(&self) -> Result<()> {
        self.backend.ensure_alive()?;
        let kind = self.kernel.kind();

        let mut views = Vec::with_capacity(kind.arity());
        for slot in 0..kind.arity() {
            match &self.inputs[slot] {
                Some(input) => views.push(input),
                None => {
                    return Err(MatrixError::Binding(format!("{kind} input slot {slot} is not bound")))
                }
            }
        }
        let target = match &self.output {
            Some(BoundOutput::Matrix { id, target }) => {
                if views.iter().any(|input| input.id == *id) {
                    return Err(MatrixError::Binding(format!(
                        "matrix #{id} cannot be both input and output of {kind}"
                    )));
                }
                *target
            }
            Some(BoundOutput::Display) => self.backend.display_target(),
            None => return Err(MatrixError::Binding(format!("{kind} has no output bound"))),
        };

        let label = format!("texmul.pass.{}", kind.name());
        self.backend.scoped(&label, |device, queue| {
            let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytemuck::bytes_of(&self.uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let mut entries = Vec::with_capacity(views.len() + 1);
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            });
            for (slot, input) in views.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: texture_binding(slot),
                    resource: wgpu::BindingResource::TextureView(input.view),
                });
            }
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&label),
                layout: self.kernel.bind_group_layout(),
                entries: &entries,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&label),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(&label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(self.kernel.pipeline());
                pass.set_bind_group(0, &bind_group, &[]);
                pass.set_vertex_buffer(0, self.backend.quad().slice(..));
                pass.draw(0..4, 0..1);
            }
            queue.submit(Some(encoder.finish()));
        })?;

        debug!(
            "texmul: dispatched {kind} -> {}x{}",
            self.uniforms.width, self.uniforms.height
        );
        Ok(())
    }

    fn check_output_free(&self) -> Result<()> {
        if self.output.is_some() {
            return Err(MatrixError::Binding(format!(
                "{} kernel already has an output bound",
                self.kernel.kind()
            )));
        }
        Ok(())
    }

    fn check_device(&self, matrix: &Matrix) -> Result<()> {
        if !matrix.backend().same_device(self.backend) {
            return Err(MatrixError::Binding(format!(
                "matrix #{} belongs to a different backend",
                matrix.id()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing;

    #[test]
    fn test_slot_out_of_range() {
        let Some(backend) = testing::backend() else { return };
        let m = Matrix::zeros(&backend, 2, 2).unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::Copy);
        let err = pass.bind_input(&m, 1).err().unwrap();
        assert!(matches!(err, MatrixError::Binding(_)));
    }

    #[test]
    fn test_slot_bound_twice() {
        let Some(backend) = testing::backend() else { return };
        let a = Matrix::zeros(&backend, 2, 2).unwrap();
        let b = Matrix::zeros(&backend, 2, 2).unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::Multiply);
        pass.bind_input(&a, 0).unwrap();
        assert!(matches!(pass.bind_input(&b, 0), Err(MatrixError::Binding(_))));
    }

    #[test]
    fn test_missing_input_and_output() {
        let Some(backend) = testing::backend() else { return };
        let a = Matrix::zeros(&backend, 2, 2).unwrap();
        let out = Matrix::zeros(&backend, 2, 2).unwrap();

        let mut pass = Dispatcher::new(&backend, KernelKind::Multiply);
        pass.bind_input(&a, 0).unwrap().bind_output(&out).unwrap();
        assert!(matches!(pass.dispatch(), Err(MatrixError::Binding(_))));

        let mut pass = Dispatcher::new(&backend, KernelKind::Copy);
        pass.bind_input(&a, 0).unwrap();
        assert!(matches!(pass.dispatch(), Err(MatrixError::Binding(_))));
    }

    #[test]
    fn test_single_output() {
        let Some(backend) = testing::backend() else { return };
        let a = Matrix::zeros(&backend, 2, 2).unwrap();
        let b = Matrix::zeros(&backend, 2, 2).unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::Copy);
        pass.bind_output(&a).unwrap();
        assert!(matches!(pass.bind_output(&b), Err(MatrixError::Binding(_))));
    }

    #[test]
    fn test_output_kind_must_match_kernel() {
        let Some(backend) = testing::backend() else { return };
        let a = Matrix::zeros(&backend, 2, 2).unwrap();
        assert!(Dispatcher::new(&backend, KernelKind::Copy)
            .bind_default_output()
            .is_err());
        assert!(Dispatcher::new(&backend, KernelKind::Display)
            .bind_output(&a)
            .is_err());
    }

    #[test]
    fn test_input_cannot_alias_output() {
        let Some(backend) = testing::backend() else { return };
        let a = Matrix::from_slice(&backend, 2, 1, &[1.0, 2.0]).unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::Copy);
        pass.bind_input(&a, 0).unwrap().bind_output(&a).unwrap();
        assert!(matches!(pass.dispatch(), Err(MatrixError::Binding(_))));
        assert_eq!(a.read_back().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_uniforms_follow_bindings() {
        let Some(backend) = testing::backend() else { return };
        let lhs = Matrix::zeros(&backend, 3, 4).unwrap();
        let rhs = Matrix::zeros(&backend, 5, 3).unwrap();
        let out = Matrix::zeros(&backend, 5, 4).unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::Multiply);
        pass.bind_input(&lhs, 0)
            .unwrap()
            .bind_input(&rhs, 1)
            .unwrap()
            .bind_output(&out)
            .unwrap();
        let u = *pass.uniforms();
        assert_eq!((u.width0, u.height0), (3, 4));
        assert_eq!((u.width1, u.height1), (5, 3));
        assert_eq!((u.width, u.height), (5, 4));
        pass.dispatch().unwrap();
    }

    #[test]
    fn test_default_output_uses_surface_size() {
        let Some(backend) = testing::backend() else { return };
        let m = Matrix::zeros(&backend, 2, 2).unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::DisplayChannel);
        pass.bind_input(&m, 0)
            .unwrap()
            .bind_default_output()
            .unwrap()
            .set_channel(2);
        let u = *pass.uniforms();
        assert_eq!((u.width, u.height), backend.display_size());
        assert_eq!(u.channel, 2);
    }

    #[test]
    fn test_disposed_matrix_cannot_be_bound() {
        let Some(backend) = testing::backend() else { return };
        let mut m = Matrix::zeros(&backend, 2, 2).unwrap();
        m.dispose().unwrap();
        let mut pass = Dispatcher::new(&backend, KernelKind::Copy);
        assert!(matches!(
            pass.bind_input(&m, 0),
            Err(MatrixError::UseAfterDispose { .. })
        ));
    }
}
