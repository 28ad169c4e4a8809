use std::borrow::Cow;
use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::storage::StorageKind;

/// Highest input arity of any kernel.
pub const MAX_INPUTS: usize = 2;

/// Texture format of the default display surface.
pub const DISPLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Two triangles (as a strip) covering clip space.
pub(crate) const FULL_SCREEN_QUAD: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]];

const COMMON_WGSL: &str = include_str!("../shaders/common.wgsl");
const SURFACE_WGSL: &str = include_str!("../shaders/surface.wgsl");

/// The fixed set of kernels compiled by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Copy,
    Multiply,
    Display,
    DisplayChannel,
}

impl KernelKind {
    pub const ALL: [KernelKind; 4] = [
        KernelKind::Copy,
        KernelKind::Multiply,
        KernelKind::Display,
        KernelKind::DisplayChannel,
    ];

    /// Number of `tex{i}` input slots.
    pub fn arity(&self) -> usize {
        match self {
            KernelKind::Multiply => 2,
            KernelKind::Copy | KernelKind::Display | KernelKind::DisplayChannel => 1,
        }
    }

    /// True if the kernel renders to the display surface rather than to a
    /// matrix.
    pub fn writes_display(&self) -> bool {
        matches!(self, KernelKind::Display | KernelKind::DisplayChannel)
    }

    pub fn name(&self) -> &'static str {
        match self {
            KernelKind::Copy => "copy",
            KernelKind::Multiply => "multiply",
            KernelKind::Display => "display",
            KernelKind::DisplayChannel => "display_channel",
        }
    }

    fn fragment_source(&self) -> &'static str {
        match self {
            KernelKind::Copy => include_str!("../shaders/copy.wgsl"),
            KernelKind::Multiply => include_str!("../shaders/multiply.wgsl"),
            KernelKind::Display => include_str!("../shaders/display.wgsl"),
            KernelKind::DisplayChannel => include_str!("../shaders/display_channel.wgsl"),
        }
    }

    /// Full WGSL module for this kernel under the given storage.
    pub fn wgsl(&self, storage: StorageKind) -> String {
        let mut src = String::new();
        src.push_str(COMMON_WGSL);
        src.push('\n');
        src.push_str(storage.wgsl_prelude());
        src.push('\n');
        if self.writes_display() {
            src.push_str(SURFACE_WGSL);
            src.push('\n');
        }
        src.push_str(self.fragment_source());
        src
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Host mirror of the WGSL `KernelUniforms` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct KernelUniforms {
    pub width: u32,
    pub height: u32,
    pub width0: u32,
    pub height0: u32,
    pub width1: u32,
    pub height1: u32,
    pub channel: u32,
    pub pad: u32,
}

impl KernelUniforms {
    /// Set `width{slot}` / `height{slot}`.
    pub fn set_input(&mut self, slot: usize, width: u32, height: u32) {
        debug_assert!(slot < MAX_INPUTS, "input slot {slot} out of range");
        match slot {
            0 => {
                self.width0 = width;
                self.height0 = height;
            }
            1 => {
                self.width1 = width;
                self.height1 = height;
            }
            _ => {}
        }
    }

    /// Set `width` / `height` of the render target.
    pub fn set_output(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

/// A compiled kernel: render pipeline plus the bind group layout its
/// inputs are bound through. Read-only once built.
pub struct Kernel {
    kind: KernelKind,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    target_format: wgpu::TextureFormat,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("kind", &self.kind)
            .field("target_format", &self.target_format)
            .finish()
    }
}

impl Kernel {
    /// Build the pipeline for `kind`. Compile and validation failures are
    /// reported through the device error scope of the caller.
    pub(crate) fn compile(device: &wgpu::Device, kind: KernelKind, storage: StorageKind) -> Kernel {
        let label = format!("texmul.kernel.{}", kind.name());
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(kind.wgsl(storage))),
        });

        let mut entries = Vec::with_capacity(kind.arity() + 1);
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
        for slot in 0..kind.arity() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture_binding(slot),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: storage.sample_type(),
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let target_format = if kind.writes_display() {
            DISPLAY_FORMAT
        } else {
            storage.texture_format()
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_main",
                buffers: &[quad_vertex_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        Kernel {
            kind,
            pipeline,
            bind_group_layout,
            target_format,
        }
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn arity(&self) -> usize {
        self.kind.arity()
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    pub(crate) fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub(crate) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }
}

/// Bind group slot holding `tex{slot}`; binding 0 is the uniform buffer.
pub(crate) fn texture_binding(slot: usize) -> u32 {
    slot as u32 + 1
}

fn quad_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// All kernels of one backend, compiled together.
#[derive(Debug)]
pub(crate) struct KernelSet {
    copy: Kernel,
    multiply: Kernel,
    display: Kernel,
    display_channel: Kernel,
}

impl KernelSet {
    pub(crate) fn compile(device: &wgpu::Device, storage: StorageKind) -> KernelSet {
        KernelSet {
            copy: Kernel::compile(device, KernelKind::Copy, storage),
            multiply: Kernel::compile(device, KernelKind::Multiply, storage),
            display: Kernel::compile(device, KernelKind::Display, storage),
            display_channel: Kernel::compile(device, KernelKind::DisplayChannel, storage),
        }
    }

    pub(crate) fn get(&self, kind: KernelKind) -> &Kernel {
        match kind {
            KernelKind::Copy => &self.copy,
            KernelKind::Multiply => &self.multiply,
            KernelKind::Display => &self.display,
            KernelKind::DisplayChannel => &self.display_channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert_eq!(KernelKind::Copy.arity(), 1);
        assert_eq!(KernelKind::Multiply.arity(), 2);
        assert_eq!(KernelKind::Display.arity(), 1);
        assert_eq!(KernelKind::DisplayChannel.arity(), 1);
        assert!(KernelKind::ALL.iter().all(|k| k.arity() <= MAX_INPUTS));
    }

    #[test]
    fn test_uniform_layout_matches_wgsl() {
        // 8 u32 fields, 16-byte multiple for uniform buffers
        assert_eq!(std::mem::size_of::<KernelUniforms>(), 32);
        for field in ["width:", "height:", "width0:", "height0:", "width1:", "height1:", "channel:"] {
            assert!(COMMON_WGSL.contains(field), "missing uniform {field}");
        }
    }

    #[test]
    fn test_set_input_slots() {
        let mut u = KernelUniforms::default();
        u.set_input(0, 3, 4);
        u.set_input(1, 5, 3);
        u.set_output(5, 4);
        assert_eq!((u.width0, u.height0, u.width1, u.height1), (3, 4, 5, 3));
        assert_eq!((u.width, u.height), (5, 4));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn test_set_input_rejects_extra_slot() {
        KernelUniforms::default().set_input(MAX_INPUTS, 1, 1);
    }

    #[test]
    fn test_sources_bind_their_slots() {
        for kind in KernelKind::ALL {
            let src = kind.wgsl(StorageKind::Encoded);
            for slot in 0..kind.arity() {
                let decl = format!("@binding({}) var tex{}", texture_binding(slot), slot);
                assert!(src.contains(&decl), "{kind} lacks {decl}");
            }
            assert!(src.contains("fn vs_main"));
            assert!(src.contains("fn fs_main"));
        }
    }

    #[test]
    fn test_multiply_reduces_over_lhs_columns() {
        let src = KernelKind::Multiply.wgsl(StorageKind::NativeFloat);
        assert!(src.contains("k < u.width0"));
    }
}
