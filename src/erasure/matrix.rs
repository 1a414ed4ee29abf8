//! Matrix algebra over GF(2^8)
//!
//! Not on the hot path: encoding only uses rows pulled out of a matrix
//! built once per coder. The implementations favour clarity.

use std::fmt;

use crate::error::{Error, Result};

use super::galois;

/// Dense row-major matrix of field elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    columns: usize,
    data: Vec<Vec<u8>>,
}

impl Matrix {
    /// Create a zero-filled matrix
    pub fn new(rows: usize, columns: usize) -> Self {
        Matrix {
            rows,
            columns,
            data: vec![vec![0u8; columns]; rows],
        }
    }

    /// Create a matrix from explicit rows
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if the rows are not all the same length
    pub fn from_rows(data: Vec<Vec<u8>>) -> Result<Self> {
        let rows = data.len();
        let columns = data.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = data.iter().position(|r| r.len() != columns) {
            return Err(Error::DimensionMismatch(format!(
                "row {} has {} columns, expected {}",
                bad,
                data[bad].len(),
                columns
            )));
        }
        Ok(Matrix { rows, columns, data })
    }

    /// Identity matrix of the given size
    pub fn identity(size: usize) -> Self {
        let mut result = Matrix::new(size, size);
        for i in 0..size {
            result.data[i][i] = 1;
        }
        result
    }

    /// Vandermonde matrix: entry (r, c) is r^c.
    ///
    /// Any square subset of its rows is invertible as long as
    /// `rows <= FIELD_SIZE`.
    pub fn vandermonde(rows: usize, columns: usize) -> Self {
        let mut result = Matrix::new(rows, columns);
        for r in 0..rows {
            for c in 0..columns {
                result.data[r][c] = galois::exp(r as u8, c);
            }
        }
        result
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Get the element at (r, c)
    pub fn get(&self, r: usize, c: usize) -> Result<u8> {
        self.check_index(r, c)?;
        Ok(self.data[r][c])
    }

    /// Set the element at (r, c)
    pub fn set(&mut self, r: usize, c: usize, value: u8) -> Result<()> {
        self.check_index(r, c)?;
        self.data[r][c] = value;
        Ok(())
    }

    /// Borrow one row
    pub fn row(&self, r: usize) -> Result<&[u8]> {
        self.data
            .get(r)
            .map(|row| row.as_slice())
            .ok_or(Error::IndexOutOfRange {
                index: r,
                len: self.rows,
            })
    }

    /// Matrix product `self * right`
    pub fn times(&self, right: &Matrix) -> Result<Matrix> {
        if self.columns != right.rows {
            return Err(Error::DimensionMismatch(format!(
                "columns on left ({}) differ from rows on right ({})",
                self.columns, right.rows
            )));
        }
        let mut result = Matrix::new(self.rows, right.columns);
        for r in 0..self.rows {
            for c in 0..right.columns {
                let mut value = 0u8;
                for i in 0..self.columns {
                    value ^= galois::multiply(self.data[r][i], right.data[i][c]);
                }
                result.data[r][c] = value;
            }
        }
        Ok(result)
    }

    /// Concatenate the columns of `right` after the columns of `self`
    pub fn augment(&self, right: &Matrix) -> Result<Matrix> {
        if self.rows != right.rows {
            return Err(Error::DimensionMismatch(format!(
                "row counts differ: {} vs {}",
                self.rows, right.rows
            )));
        }
        let data = self
            .data
            .iter()
            .zip(&right.data)
            .map(|(left, right)| {
                let mut row = Vec::with_capacity(left.len() + right.len());
                row.extend_from_slice(left);
                row.extend_from_slice(right);
                row
            })
            .collect();
        Ok(Matrix {
            rows: self.rows,
            columns: self.columns + right.columns,
            data,
        })
    }

    /// Rows `rmin..rmax`, columns `cmin..cmax`.
    ///
    /// Callers are internal and pass ranges already known to fit.
    pub fn submatrix(&self, rmin: usize, cmin: usize, rmax: usize, cmax: usize) -> Matrix {
        debug_assert!(rmin <= rmax && rmax <= self.rows);
        debug_assert!(cmin <= cmax && cmax <= self.columns);
        let data = self.data[rmin..rmax]
            .iter()
            .map(|row| row[cmin..cmax].to_vec())
            .collect();
        Matrix {
            rows: rmax - rmin,
            columns: cmax - cmin,
            data,
        }
    }

    /// Exchange two rows in place
    pub fn swap_rows(&mut self, r1: usize, r2: usize) -> Result<()> {
        for r in [r1, r2] {
            if r >= self.rows {
                return Err(Error::IndexOutOfRange {
                    index: r,
                    len: self.rows,
                });
            }
        }
        self.data.swap(r1, r2);
        Ok(())
    }

    /// Inverse via Gaussian elimination on `[self | I]`
    ///
    /// # Errors
    /// `DimensionMismatch` for a non-square matrix, `Singular` if a pivot
    /// column cannot be made non-zero
    pub fn invert(&self) -> Result<Matrix> {
        if self.rows != self.columns {
            return Err(Error::DimensionMismatch(format!(
                "only square matrices can be inverted, got {}x{}",
                self.rows, self.columns
            )));
        }

        let mut work = self.augment(&Matrix::identity(self.rows))?;
        work.gaussian_elimination()?;
        Ok(work.submatrix(0, self.rows, self.rows, self.columns * 2))
    }

    /// Drive the left square of the matrix to the identity
    fn gaussian_elimination(&mut self) -> Result<()> {
        // Clear out the part below the main diagonal and scale the main
        // diagonal to be 1.
        for r in 0..self.rows {
            if self.data[r][r] == 0 {
                if let Some(below) = (r + 1..self.rows).find(|&b| self.data[b][r] != 0) {
                    self.swap_rows(r, below)?;
                }
            }
            if self.data[r][r] == 0 {
                return Err(Error::Singular);
            }

            if self.data[r][r] != 1 {
                let scale = galois::divide(1, self.data[r][r])?;
                for c in 0..self.columns {
                    self.data[r][c] = galois::multiply(self.data[r][c], scale);
                }
            }

            for below in r + 1..self.rows {
                let factor = self.data[below][r];
                if factor != 0 {
                    self.eliminate(below, r, factor);
                }
            }
        }

        // Clear out the part above the main diagonal.
        for d in 0..self.rows {
            for above in 0..d {
                let factor = self.data[above][d];
                if factor != 0 {
                    self.eliminate(above, d, factor);
                }
            }
        }
        Ok(())
    }

    /// row[target] -= factor * row[pivot]
    fn eliminate(&mut self, target: usize, pivot: usize, factor: u8) {
        for c in 0..self.columns {
            let delta = galois::multiply(factor, self.data[pivot][c]);
            self.data[target][c] = galois::subtract(self.data[target][c], delta);
        }
    }

    fn check_index(&self, r: usize, c: usize) -> Result<()> {
        if r >= self.rows {
            return Err(Error::IndexOutOfRange {
                index: r,
                len: self.rows,
            });
        }
        if c >= self.columns {
            return Err(Error::IndexOutOfRange {
                index: c,
                len: self.columns,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.data {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "[{}]", cells.join(", "))?;
        }
        Ok(())
    }
}
