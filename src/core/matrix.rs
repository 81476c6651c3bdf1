//! Dense row-major matrix used as regressor input.

use crate::error::{ForecastError, Result};

/// Row-major dense `f64` matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Matrix of zeros.
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    /// Matrix with no rows and `n_cols` columns, filled by `push_row`.
    pub fn with_columns(n_cols: usize) -> Self {
        Self {
            n_rows: 0,
            n_cols,
            data: Vec::new(),
        }
    }

    /// Build from a flat row-major buffer.
    pub fn from_vec(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_rows * n_cols {
            return Err(ForecastError::DimensionMismatch {
                expected: n_rows * n_cols,
                got: data.len(),
            });
        }
        Ok(Self {
            n_rows,
            n_cols,
            data,
        })
    }

    /// Build from rows of equal length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut matrix = Self::with_columns(n_cols);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    /// Append a row.
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_cols {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_cols,
                got: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        self.n_rows += 1;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n_cols + j] = value;
    }

    /// Copy of column `j`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.get(i, j)).collect()
    }

    /// Flat row-major data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(rows.len() * self.n_cols);
        for &i in rows {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            n_rows: rows.len(),
            n_cols: self.n_cols,
            data,
        }
    }

    /// Stack matrices on top of each other.
    pub fn vstack(blocks: &[&Matrix]) -> Result<Matrix> {
        let n_cols = blocks.first().map(|b| b.n_cols).unwrap_or(0);
        let mut out = Matrix::with_columns(n_cols);
        for block in blocks {
            if block.n_cols != n_cols {
                return Err(ForecastError::DimensionMismatch {
                    expected: n_cols,
                    got: block.n_cols,
                });
            }
            out.data.extend_from_slice(&block.data);
            out.n_rows += block.n_rows;
        }
        Ok(out)
    }

    /// Concatenate matrices side by side.
    pub fn hstack(blocks: &[&Matrix]) -> Result<Matrix> {
        let n_rows = blocks.first().map(|b| b.n_rows).unwrap_or(0);
        if let Some(bad) = blocks.iter().find(|b| b.n_rows != n_rows) {
            return Err(ForecastError::DimensionMismatch {
                expected: n_rows,
                got: bad.n_rows,
            });
        }
        let n_cols = blocks.iter().map(|b| b.n_cols).sum();
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for i in 0..n_rows {
            for block in blocks {
                data.extend_from_slice(block.row(i));
            }
        }
        Ok(Matrix {
            n_rows,
            n_cols,
            data,
        })
    }

    /// Rows that contain no NaN.
    pub fn complete_rows(&self) -> Vec<usize> {
        (0..self.n_rows)
            .filter(|&i| self.row(i).iter().all(|v| !v.is_nan()))
            .collect()
    }
}
