use tm_matrix::{Backend, BackendConfig, Matrix, Result, StorageKind};

/// Opaque handle owning a GPU backend.
pub struct TmBackend {
    pub backend: Backend,
}

impl TmBackend {
    /// Open a backend configured from `TEXMUL_*` variables, with the
    /// storage strategy chosen by the caller.
    pub fn open(storage: StorageKind) -> Result<Self> {
        let config = BackendConfig {
            storage,
            ..BackendConfig::from_env()
        };
        Ok(Self {
            backend: Backend::new(config)?,
        })
    }
}

/// Opaque handle owning one matrix. The handle outlives `tm_matrix_dispose`
/// and is only freed by `tm_matrix_destroy`.
pub struct TmMatrix {
    pub matrix: Matrix,
}

impl From<Matrix> for TmMatrix {
    fn from(matrix: Matrix) -> Self {
        Self { matrix }
    }
}
