use crate::error::ShapeError;
use std::fmt;

/// Dimensions of a 2-D row-major matrix, stored as texture width (columns)
/// by texture height (rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixShape {
    cols: u32,
    rows: u32,
}

impl MatrixShape {
    /// Create a shape, rejecting zero-sized dimensions and anything larger
    /// than `max_dim` texels along either axis.
    pub fn new(cols: u32, rows: u32, max_dim: u32) -> Result<Self, ShapeError> {
        if cols == 0 || rows == 0 {
            return Err(ShapeError::EmptyDimension { cols, rows });
        }
        if cols > max_dim || rows > max_dim {
            return Err(ShapeError::TooLarge {
                cols: cols as u64,
                rows: rows as u64,
                max: max_dim,
            });
        }
        Ok(MatrixShape { cols, rows })
    }

    /// Convert `usize` dimensions as used by host-side slices.
    pub fn from_usize(cols: usize, rows: usize, max_dim: u32) -> Result<Self, ShapeError> {
        let too_large = || ShapeError::TooLarge {
            cols: cols as u64,
            rows: rows as u64,
            max: max_dim,
        };
        let c = u32::try_from(cols).map_err(|_| too_large())?;
        let r = u32::try_from(rows).map_err(|_| too_large())?;
        MatrixShape::new(c, r, max_dim)
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of elements (texels).
    pub fn numel(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Byte length of the texture backing this shape.
    pub fn byte_len(&self) -> usize {
        self.numel() * crate::codec::TEXEL_BYTES
    }

    /// Check that a row-major data slice fills this shape exactly.
    pub fn check_data_len(&self, len: usize) -> Result<(), ShapeError> {
        if len != self.numel() {
            return Err(ShapeError::DataLength {
                cols: self.cols,
                rows: self.rows,
                expected: self.numel(),
                got: len,
            });
        }
        Ok(())
    }

    /// Shape of `self * rhs`.
    ///
    /// `self` is [rows=M, cols=K], `rhs` is [rows=K, cols=N], the result is
    /// [rows=M, cols=N].
    pub fn matmul(&self, rhs: &MatrixShape) -> Result<MatrixShape, ShapeError> {
        if self.cols != rhs.rows {
            return Err(ShapeError::InnerDimension {
                lhs_cols: self.cols,
                rhs_rows: rhs.rows,
            });
        }
        Ok(MatrixShape {
            cols: rhs.cols,
            rows: self.rows,
        })
    }
}

impl fmt::Display for MatrixShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} (rows x cols)", self.rows, self.cols)
    }
}

/// Flatten rows of equal length into a row-major buffer, returning
/// `(cols, data)`.
pub fn flatten_rows(rows: &[Vec<f32>]) -> Result<(usize, Vec<f32>), ShapeError> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(cols * rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() != cols {
            return Err(ShapeError::RaggedRows {
                row: i,
                expected: cols,
                got: row.len(),
            });
        }
        data.extend_from_slice(row);
    }
    Ok((cols, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 8192;

    #[test]
    fn test_basic_shape() {
        let s = MatrixShape::new(3, 4, MAX).unwrap();
        assert_eq!(s.cols(), 3);
        assert_eq!(s.rows(), 4);
        assert_eq!(s.numel(), 12);
        assert_eq!(s.byte_len(), 48);
    }

    #[test]
    fn test_data_length() {
        let s = MatrixShape::new(2, 3, MAX).unwrap();
        assert_eq!(
            s.check_data_len(5),
            Err(ShapeError::DataLength {
                cols: 2,
                rows: 3,
                expected: 6,
                got: 5
            })
        );
        assert!(s.check_data_len(6).is_ok());
    }

    #[test]
    fn test_zero_and_oversized() {
        assert!(matches!(
            MatrixShape::new(0, 3, MAX),
            Err(ShapeError::EmptyDimension { .. })
        ));
        assert!(matches!(
            MatrixShape::new(3, MAX + 1, MAX),
            Err(ShapeError::TooLarge { .. })
        ));
        assert!(matches!(
            MatrixShape::from_usize(usize::MAX, 1, MAX),
            Err(ShapeError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_matmul_shape() {
        // 4 rows x 3 cols times 3 rows x 5 cols
        let a = MatrixShape::new(3, 4, MAX).unwrap();
        let b = MatrixShape::new(5, 3, MAX).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!((c.rows(), c.cols()), (4, 5));
    }

    #[test]
    fn test_matmul_mismatch() {
        // 4 rows x 3 cols times 5 rows x 4 cols
        let a = MatrixShape::new(3, 4, MAX).unwrap();
        let b = MatrixShape::new(4, 5, MAX).unwrap();
        assert_eq!(
            a.matmul(&b),
            Err(ShapeError::InnerDimension {
                lhs_cols: 3,
                rhs_rows: 5
            })
        );
    }

    #[test]
    fn test_flatten_rows() {
        let (cols, data) = flatten_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(cols, 2);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(
            flatten_rows(&[vec![1.0, 2.0], vec![3.0]]),
            Err(ShapeError::RaggedRows { row: 1, .. })
        ));
    }
}
