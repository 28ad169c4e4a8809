use tm_matrix::{MatrixError, StorageKind};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TmStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorShape = 2,
    ErrorUseAfterDispose = 3,
    ErrorBackendInit = 4,
    ErrorDeviceLost = 5,
    ErrorGpu = 6,
    ErrorInternal = 7,
}

impl From<&MatrixError> for TmStatus {
    fn from(err: &MatrixError) -> Self {
        match err {
            MatrixError::Shape(_) => TmStatus::ErrorShape,
            MatrixError::UseAfterDispose { .. } => TmStatus::ErrorUseAfterDispose,
            MatrixError::BackendInit(_) => TmStatus::ErrorBackendInit,
            MatrixError::DeviceLost(_) => TmStatus::ErrorDeviceLost,
            MatrixError::Gpu(_) => TmStatus::ErrorGpu,
            MatrixError::Binding(_) | MatrixError::InvalidArgument(_) => TmStatus::ErrorInvalidArgument,
        }
    }
}

/// Texel storage selector.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum TmStorageKind {
    Encoded = 0,
    NativeFloat = 1,
}

impl From<TmStorageKind> for StorageKind {
    fn from(kind: TmStorageKind) -> Self {
        match kind {
            TmStorageKind::Encoded => StorageKind::Encoded,
            TmStorageKind::NativeFloat => StorageKind::NativeFloat,
        }
    }
}
