mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;

use tm_matrix::{Matrix, MatrixError};

/// Execute a closure that returns a `TmStatus`, catching any panics
/// and converting them into `TmStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> TmStatus>(f: F) -> TmStatus {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            TmStatus::ErrorInternal
        }
    }
}

/// Record `err` as the last error and map it to its status code.
fn fail(err: MatrixError) -> TmStatus {
    let status = TmStatus::from(&err);
    set_last_error(err.to_string());
    status
}

fn null_argument() -> TmStatus {
    set_last_error("null argument".to_string());
    TmStatus::ErrorInvalidArgument
}

/// Box `matrix` into a handle and write it to `*out`.
unsafe fn emit(matrix: Matrix, out: *mut *mut TmMatrix) -> TmStatus {
    *out = Box::into_raw(Box::new(TmMatrix::from(matrix)));
    TmStatus::Ok
}

/// Create a GPU backend and compile its kernels.
///
/// On success, writes a heap-allocated `TmBackend` pointer into
/// `*backend_out`. The caller must later call `tm_backend_destroy`.
#[no_mangle]
pub unsafe extern "C" fn tm_backend_create(storage: TmStorageKind, backend_out: *mut *mut TmBackend) -> TmStatus {
    catch_panic(|| {
        if backend_out.is_null() {
            set_last_error("backend_out is null".to_string());
            return TmStatus::ErrorInvalidArgument;
        }
        match TmBackend::open(storage.into()) {
            Ok(backend) => {
                unsafe { *backend_out = Box::into_raw(Box::new(backend)) };
                TmStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Destroy a backend previously created by `tm_backend_create`.
///
/// Matrices allocated on it keep the device alive until they are
/// destroyed. Passing a null pointer is a no-op.
#[no_mangle]
pub unsafe extern "C" fn tm_backend_destroy(backend: *mut TmBackend) -> TmStatus {
    if backend.is_null() {
        return TmStatus::Ok;
    }
    drop(Box::from_raw(backend));
    TmStatus::Ok
}

/// Allocate a `cols` x `rows` matrix.
///
/// `data` may be null for a zero-filled matrix; otherwise it must point to
/// `len` row-major floats and `len` must equal `cols * rows`.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_allocate(
    backend: *const TmBackend,
    cols: u32,
    rows: u32,
    data: *const f32,
    len: usize,
    matrix_out: *mut *mut TmMatrix,
) -> TmStatus {
    catch_panic(|| {
        if backend.is_null() || matrix_out.is_null() {
            return null_argument();
        }
        let backend = unsafe { &(*backend).backend };
        let initial = if data.is_null() {
            None
        } else {
            Some(unsafe { std::slice::from_raw_parts(data, len) })
        };
        match Matrix::allocate(backend, cols, rows, initial) {
            Ok(m) => unsafe { emit(m, matrix_out) },
            Err(e) => fail(e),
        }
    })
}

/// Multiply `lhs * rhs` into a newly allocated matrix.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_multiply(
    lhs: *const TmMatrix,
    rhs: *const TmMatrix,
    matrix_out: *mut *mut TmMatrix,
) -> TmStatus {
    catch_panic(|| {
        if lhs.is_null() || rhs.is_null() || matrix_out.is_null() {
            return null_argument();
        }
        let (lhs, rhs) = unsafe { (&(*lhs).matrix, &(*rhs).matrix) };
        match lhs.multiply(rhs) {
            Ok(m) => unsafe { emit(m, matrix_out) },
            Err(e) => fail(e),
        }
    })
}

/// Duplicate `src` into a newly allocated matrix.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_copy(src: *const TmMatrix, matrix_out: *mut *mut TmMatrix) -> TmStatus {
    catch_panic(|| {
        if src.is_null() || matrix_out.is_null() {
            return null_argument();
        }
        match unsafe { &(*src).matrix }.copy() {
            Ok(m) => unsafe { emit(m, matrix_out) },
            Err(e) => fail(e),
        }
    })
}

/// Read the matrix into `out`, which must hold exactly `cols * rows` floats.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_read_back(matrix: *const TmMatrix, out: *mut f32, len: usize) -> TmStatus {
    catch_panic(|| {
        if matrix.is_null() || out.is_null() {
            return null_argument();
        }
        let matrix = unsafe { &(*matrix).matrix };
        if len != matrix.numel() {
            set_last_error(format!(
                "output buffer holds {len} floats, matrix has {}",
                matrix.numel()
            ));
            return TmStatus::ErrorInvalidArgument;
        }
        match matrix.read_back() {
            Ok(values) => {
                unsafe { std::slice::from_raw_parts_mut(out, len) }.copy_from_slice(&values);
                TmStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Write the column and row counts of `matrix`. Valid after dispose.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_dims(matrix: *const TmMatrix, cols_out: *mut u32, rows_out: *mut u32) -> TmStatus {
    catch_panic(|| {
        if matrix.is_null() || cols_out.is_null() || rows_out.is_null() {
            return null_argument();
        }
        let matrix = unsafe { &(*matrix).matrix };
        unsafe {
            *cols_out = matrix.col_count();
            *rows_out = matrix.row_count();
        }
        TmStatus::Ok
    })
}

/// Release the GPU resources of `matrix`. The handle stays valid; further
/// operations on it report `ErrorUseAfterDispose`.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_dispose(matrix: *mut TmMatrix) -> TmStatus {
    catch_panic(|| {
        if matrix.is_null() {
            return null_argument();
        }
        match unsafe { &mut (*matrix).matrix }.dispose() {
            Ok(()) => TmStatus::Ok,
            Err(e) => fail(e),
        }
    })
}

/// Free a matrix handle, disposing it first if needed.
///
/// Passing a null pointer is a no-op.
#[no_mangle]
pub unsafe extern "C" fn tm_matrix_destroy(matrix: *mut TmMatrix) -> TmStatus {
    if matrix.is_null() {
        return TmStatus::Ok;
    }
    drop(Box::from_raw(matrix));
    TmStatus::Ok
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `tm_free_string`.
#[no_mangle]
pub extern "C" fn tm_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `tm_last_error`.
#[no_mangle]
pub unsafe extern "C" fn tm_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
