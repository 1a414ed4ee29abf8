//! Systematic Reed-Solomon coding over GF(2^8)
//!
//! The encoding matrix is a Vandermonde matrix normalised so its top square
//! is the identity: data shards pass through unchanged and any
//! `data_shard_count` rows still form an invertible matrix.

use tracing::debug;

use crate::error::{Error, Result};

use super::galois::{self, FIELD_SIZE};
use super::matrix::Matrix;

/// Reed-Solomon encoder/decoder for a fixed shard geometry
#[derive(Debug, Clone)]
pub struct ReedSolomon {
    data_shard_count: usize,
    parity_shard_count: usize,
    total_shard_count: usize,
    matrix: Matrix,
    /// Parity rows of `matrix`, kept separately for the inner loop
    parity_rows: Vec<Vec<u8>>,
}

impl ReedSolomon {
    /// Create a coder with `data_shard_count` data shards and
    /// `parity_shard_count` parity shards
    ///
    /// # Errors
    /// Returns `InvalidErasureConfig` if there are no data shards or more
    /// shards than the field can distinguish
    pub fn new(data_shard_count: usize, parity_shard_count: usize) -> Result<Self> {
        if data_shard_count == 0 {
            return Err(Error::InvalidErasureConfig(
                "data_shard_count must be greater than 0".to_string(),
            ));
        }
        let total_shard_count = data_shard_count + parity_shard_count;
        if total_shard_count > FIELD_SIZE {
            return Err(Error::InvalidErasureConfig(format!(
                "total shard count {} exceeds {}",
                total_shard_count, FIELD_SIZE
            )));
        }

        let matrix = build_matrix(data_shard_count, total_shard_count)?;
        let parity_rows = (data_shard_count..total_shard_count)
            .map(|r| matrix.row(r).map(|row| row.to_vec()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            data_shard_count,
            parity_shard_count,
            total_shard_count,
            matrix,
            parity_rows,
        })
    }

    pub fn data_shard_count(&self) -> usize {
        self.data_shard_count
    }

    pub fn parity_shard_count(&self) -> usize {
        self.parity_shard_count
    }

    pub fn total_shard_count(&self) -> usize {
        self.total_shard_count
    }

    /// The full `(data + parity) x data` encoding matrix
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Compute the parity shards from the data shards.
    ///
    /// `shards` holds the data shards followed by the parity shards, all the
    /// same length. Only bytes `offset..offset + byte_count` of the parity
    /// shards are written.
    pub fn encode_parity(
        &self,
        shards: &mut [Vec<u8>],
        offset: usize,
        byte_count: usize,
    ) -> Result<()> {
        self.check_buffers_and_sizes(shards, offset, byte_count)?;

        let (data, parity) = shards.split_at_mut(self.data_shard_count);
        let inputs: Vec<&[u8]> = data.iter().map(|s| s.as_slice()).collect();
        let rows: Vec<&[u8]> = self.parity_rows.iter().map(|r| r.as_slice()).collect();
        let mut outputs: Vec<&mut [u8]> = parity.iter_mut().map(|s| s.as_mut_slice()).collect();

        self.code_some_shards(&rows, &inputs, &mut outputs, offset, byte_count);
        Ok(())
    }

    /// Check that the parity shards hold the right data. Nothing is written.
    pub fn is_parity_correct(
        &self,
        shards: &[Vec<u8>],
        offset: usize,
        byte_count: usize,
    ) -> Result<bool> {
        self.check_buffers_and_sizes(shards, offset, byte_count)?;

        let inputs: Vec<&[u8]> = shards[..self.data_shard_count]
            .iter()
            .map(|s| s.as_slice())
            .collect();

        for byte in offset..offset + byte_count {
            for (row, to_check) in self
                .parity_rows
                .iter()
                .zip(&shards[self.data_shard_count..])
            {
                if to_check[byte] != dot(row, &inputs, byte) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Fill in every shard whose `present` flag is false.
    ///
    /// Does nothing when all shards are present. Missing data shards are
    /// recovered through the inverse of the rows belonging to the first
    /// `data_shard_count` present shards; missing parity is then recomputed
    /// from the completed data shards, since the decode matrix can only
    /// produce data.
    ///
    /// # Errors
    /// `InsufficientShards` if fewer than `data_shard_count` are present
    pub fn decode_missing(
        &self,
        shards: &mut [Vec<u8>],
        present: &[bool],
        offset: usize,
        byte_count: usize,
    ) -> Result<()> {
        self.check_buffers_and_sizes(shards, offset, byte_count)?;
        if present.len() != self.total_shard_count {
            return Err(Error::DimensionMismatch(format!(
                "presence has {} entries, expected {}",
                present.len(),
                self.total_shard_count
            )));
        }

        let number_present = present.iter().filter(|p| **p).count();
        if number_present == self.total_shard_count {
            return Ok(());
        }
        if number_present < self.data_shard_count {
            return Err(Error::InsufficientShards {
                present: number_present,
                required: self.data_shard_count,
            });
        }

        // Square matrix of the rows for the shards we have
        let mut sub_matrix = Matrix::new(self.data_shard_count, self.data_shard_count);
        let mut sub_rows = Vec::with_capacity(self.data_shard_count);
        for (matrix_row, _) in present
            .iter()
            .enumerate()
            .filter(|(_, p)| **p)
            .take(self.data_shard_count)
        {
            for c in 0..self.data_shard_count {
                sub_matrix.set(sub_rows.len(), c, self.matrix.get(matrix_row, c)?)?;
            }
            sub_rows.push(matrix_row);
        }
        let data_decode_matrix = sub_matrix.invert()?;

        let missing_data: Vec<usize> = (0..self.data_shard_count)
            .filter(|&i| !present[i])
            .collect();
        debug!(
            present = number_present,
            missing_data = missing_data.len(),
            "Decoding missing shards"
        );

        // Re-create missing data shards from the shards we have
        if !missing_data.is_empty() {
            let rows: Vec<&[u8]> = missing_data
                .iter()
                .map(|&i| data_decode_matrix.row(i))
                .collect::<Result<_>>()?;

            let mut inputs: Vec<&[u8]> = Vec::with_capacity(self.data_shard_count);
            let mut outputs: Vec<&mut [u8]> = Vec::with_capacity(missing_data.len());
            let mut next_input = sub_rows.iter().peekable();
            for (i, shard) in shards.iter_mut().enumerate() {
                if next_input.peek() == Some(&&i) {
                    next_input.next();
                    inputs.push(shard.as_slice());
                } else if i < self.data_shard_count && !present[i] {
                    outputs.push(shard.as_mut_slice());
                }
            }
            self.code_some_shards(&rows, &inputs, &mut outputs, offset, byte_count);
        }

        // All data shards are intact now; recompute missing parity
        let (data, parity) = shards.split_at_mut(self.data_shard_count);
        let inputs: Vec<&[u8]> = data.iter().map(|s| s.as_slice()).collect();
        let mut rows: Vec<&[u8]> = Vec::new();
        let mut outputs: Vec<&mut [u8]> = Vec::new();
        for (p, shard) in parity.iter_mut().enumerate() {
            if !present[self.data_shard_count + p] {
                rows.push(&self.parity_rows[p]);
                outputs.push(shard.as_mut_slice());
            }
        }
        if !outputs.is_empty() {
            self.code_some_shards(&rows, &inputs, &mut outputs, offset, byte_count);
        }
        Ok(())
    }

    /// Multiply `matrix_rows` by the input shards, writing the outputs
    fn code_some_shards(
        &self,
        matrix_rows: &[&[u8]],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
        offset: usize,
        byte_count: usize,
    ) {
        for byte in offset..offset + byte_count {
            for (row, output) in matrix_rows.iter().zip(outputs.iter_mut()) {
                output[byte] = dot(row, inputs, byte);
            }
        }
    }

    fn check_buffers_and_sizes(
        &self,
        shards: &[Vec<u8>],
        offset: usize,
        byte_count: usize,
    ) -> Result<()> {
        if shards.len() != self.total_shard_count {
            return Err(Error::DimensionMismatch(format!(
                "wrong number of shards: {}, expected {}",
                shards.len(),
                self.total_shard_count
            )));
        }

        let shard_length = shards[0].len();
        if let Some(bad) = shards.iter().position(|s| s.len() != shard_length) {
            return Err(Error::DimensionMismatch(format!(
                "shard {} has length {}, expected {}",
                bad,
                shards[bad].len(),
                shard_length
            )));
        }

        let end = offset.checked_add(byte_count).ok_or_else(|| {
            Error::DimensionMismatch("byte range overflows".to_string())
        })?;
        if shard_length < end {
            return Err(Error::DimensionMismatch(format!(
                "buffers too small: {} bytes needed, shards are {}",
                end, shard_length
            )));
        }
        Ok(())
    }
}

/// One output byte: sum over c of row[c] * inputs[c][byte]
#[inline]
fn dot(row: &[u8], inputs: &[&[u8]], byte: usize) -> u8 {
    row.iter()
        .zip(inputs)
        .fold(0u8, |acc, (&coefficient, input)| {
            acc ^ galois::multiply(coefficient, input[byte])
        })
}

/// Vandermonde matrix times the inverse of its top square
fn build_matrix(data_shards: usize, total_shards: usize) -> Result<Matrix> {
    let vandermonde = Matrix::vandermonde(total_shards, data_shards);
    let top = vandermonde.submatrix(0, 0, data_shards, data_shards);
    vandermonde.times(&top.invert()?)
}
