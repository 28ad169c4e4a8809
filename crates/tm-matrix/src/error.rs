use thiserror::Error;

/// Dimension problems detected on the host before any GPU work is issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("data length mismatch: {cols}x{rows} matrix needs {expected} values, got {got}")]
    DataLength {
        cols: u32,
        rows: u32,
        expected: usize,
        got: usize,
    },
    #[error("multiply dimension mismatch: lhs has {lhs_cols} columns, rhs has {rhs_rows} rows")]
    InnerDimension { lhs_cols: u32, rhs_rows: u32 },
    #[error("matrix dimensions must be non-zero, got {cols}x{rows}")]
    EmptyDimension { cols: u32, rows: u32 },
    #[error("matrix {cols}x{rows} exceeds the device texture limit of {max}")]
    TooLarge { cols: u64, rows: u64, max: u32 },
    #[error("row {row} has {got} values, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Errors raised while setting up the GPU backend. Construction never
/// yields a partially usable backend.
#[derive(Error, Debug)]
pub enum BackendInitError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("failed to compile kernels: {0}")]
    KernelCompile(String),
    #[error("display surface {width}x{height} exceeds the device texture limit of {max}")]
    DisplayTooLarge { width: u32, height: u32, max: u32 },
    #[error("failed to create backend resources: {0}")]
    Resource(String),
}

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("matrix #{id} used after dispose")]
    UseAfterDispose { id: u64 },
    #[error("backend initialization failed: {0}")]
    BackendInit(#[from] BackendInitError),
    #[error("GPU device lost: {0}")]
    DeviceLost(String),
    #[error("invalid binding: {0}")]
    Binding(String),
    #[error("GPU error: {0}")]
    Gpu(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, MatrixError>;
