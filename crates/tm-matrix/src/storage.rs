use std::fmt;

/// How matrix texels are stored on the GPU.
///
/// Both strategies carry the same 4-byte little-endian bit pattern per
/// texel on the host side, so upload and readback go through
/// [`codec`](crate::codec) either way. They differ in texture format and
/// in the WGSL prelude the kernels are compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageKind {
    /// `Rgba8Uint` texels; kernels decode/encode the bit pattern by hand.
    #[default]
    Encoded,
    /// `R32Float` texels read and written natively by the kernels.
    NativeFloat,
}

impl StorageKind {
    /// Texture format used for matrix textures and render targets.
    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match self {
            StorageKind::Encoded => wgpu::TextureFormat::Rgba8Uint,
            StorageKind::NativeFloat => wgpu::TextureFormat::R32Float,
        }
    }

    /// Sample type declared in kernel bind group layouts.
    pub fn sample_type(&self) -> wgpu::TextureSampleType {
        match self {
            StorageKind::Encoded => wgpu::TextureSampleType::Uint,
            StorageKind::NativeFloat => wgpu::TextureSampleType::Float { filterable: false },
        }
    }

    /// WGSL prelude defining `TexelTexture`, `Texel`, `decode_texel`,
    /// `encode_texel` and `texel_channel` for this storage.
    pub(crate) fn wgsl_prelude(&self) -> &'static str {
        match self {
            StorageKind::Encoded => include_str!("shaders/storage_encoded.wgsl"),
            StorageKind::NativeFloat => include_str!("shaders/storage_float.wgsl"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::Encoded => "encoded",
            StorageKind::NativeFloat => "float",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
