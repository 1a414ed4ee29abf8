//! Shard sizing and padding rules
//!
//! A payload is terminated with a single `0x01` byte, zero-padded to a
//! multiple of the data shard count and split into equal data shards.
//! The terminator makes the padding strippable even when the payload
//! itself ends in zero bytes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::reed_solomon::ReedSolomon;

/// Most shards a single coding operation can produce
pub const MAX_SHARDS: usize = 255;

/// Payload granularity: one more shard per server for each 256 bytes
pub const SIZE_GRANULARITY: usize = 256;

/// Byte appended to every payload before padding
pub const PADDING_TERMINATOR: u8 = 0x01;

/// Shard counts and length for one coding operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGeometry {
    /// Length of every shard in bytes
    pub shard_len: usize,
    /// Data + parity shards
    pub total_shards: usize,
    /// Data shards (K)
    pub data_shards: usize,
    /// Parity shards
    pub parity_shards: usize,
}

impl ShardGeometry {
    /// Create a geometry from explicit counts
    pub fn new(shard_len: usize, data_shards: usize, parity_shards: usize) -> Self {
        ShardGeometry {
            shard_len,
            total_shards: data_shards + parity_shards,
            data_shards,
            parity_shards,
        }
    }

    /// Geometry for a payload of `payload_len` bytes sent to `servers` servers
    pub fn for_payload(payload_len: usize, servers: usize) -> Result<Self> {
        if servers == 0 {
            return Err(Error::InvalidErasureConfig(
                "at least one server is required".to_string(),
            ));
        }
        let total_shards = calculate_n_shards(payload_len, servers);
        let (data_shards, parity_shards) = split_shard_counts(total_shards);
        let padded = calculate_data_padding(payload_len + 1, data_shards);
        let geometry = ShardGeometry::new(padded / data_shards, data_shards, parity_shards);

        debug!(
            payload_len,
            servers,
            total = geometry.total_shards,
            data = geometry.data_shards,
            shard_len = geometry.shard_len,
            "Computed shard geometry"
        );
        Ok(geometry)
    }

    /// Geometry implied by received shards: the count and length are known,
    /// the data/parity split follows the sizing rule.
    pub fn from_total(total_shards: usize, shard_len: usize) -> Result<Self> {
        if total_shards == 0 || total_shards > MAX_SHARDS {
            return Err(Error::GeometryMismatch(format!(
                "shard count {} outside 1..={}",
                total_shards, MAX_SHARDS
            )));
        }
        let (data_shards, parity_shards) = split_shard_counts(total_shards);
        Ok(ShardGeometry::new(shard_len, data_shards, parity_shards))
    }

    /// Validate internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.data_shards == 0 {
            return Err(Error::InvalidErasureConfig(
                "data_shards must be at least 1".to_string(),
            ));
        }
        if self.data_shards + self.parity_shards != self.total_shards {
            return Err(Error::InvalidErasureConfig(format!(
                "data ({}) + parity ({}) != total ({})",
                self.data_shards, self.parity_shards, self.total_shards
            )));
        }
        if self.total_shards > MAX_SHARDS {
            return Err(Error::InvalidErasureConfig(format!(
                "total shards {} exceeds {}",
                self.total_shards, MAX_SHARDS
            )));
        }
        Ok(())
    }

    /// Bytes covered by the data shards (payload + terminator + padding)
    pub fn data_len(&self) -> usize {
        self.shard_len * self.data_shards
    }

    /// How many servers may be lost entirely with `servers` servers
    pub fn tolerated_server_losses(&self, servers: usize) -> usize {
        let per_server = shards_per_server(self.total_shards, servers);
        if per_server == 0 {
            return 0;
        }
        self.parity_shards / per_server
    }
}

/// Total shards for a payload: grows with size and server count, capped at
/// [`MAX_SHARDS`].
pub fn calculate_n_shards(data_size: usize, server_count: usize) -> usize {
    (1 + data_size / SIZE_GRANULARITY)
        .saturating_mul(server_count)
        .min(MAX_SHARDS)
}

/// Padded size for `data_size` bytes split into `num_data_shards` shards.
///
/// At least one byte per shard; otherwise the next multiple of the shard
/// count.
pub fn calculate_data_padding(data_size: usize, num_data_shards: usize) -> usize {
    if data_size < num_data_shards {
        return num_data_shards;
    }
    match data_size % num_data_shards {
        0 => data_size,
        rem => data_size + (num_data_shards - rem),
    }
}

/// Split a total shard count into (data, parity): half parity, rounded down
pub fn split_shard_counts(total_shards: usize) -> (usize, usize) {
    let parity = total_shards / 2;
    (total_shards - parity, parity)
}

/// Shards handed to each server (ceil, so every shard has an owner)
pub fn shards_per_server(total_shards: usize, servers: usize) -> usize {
    if servers == 0 {
        return 0;
    }
    total_shards.div_ceil(servers)
}

/// Key index owning a shard. Index 0 is the primary key and never owns one.
pub fn server_for_shard(shard_index: usize, shards_per_server: usize) -> usize {
    shard_index / shards_per_server + 1
}

/// Terminate, pad and split `payload` into data shards, then fill parity
pub fn calculate_reed_solomon_shards(
    payload: &[u8],
    total_shards: usize,
    parity_shards: usize,
    data_shards: usize,
) -> Result<Vec<Vec<u8>>> {
    if data_shards + parity_shards != total_shards {
        return Err(Error::InvalidErasureConfig(format!(
            "data ({}) + parity ({}) != total ({})",
            data_shards, parity_shards, total_shards
        )));
    }
    if data_shards == 0 {
        return Err(Error::InvalidErasureConfig(
            "data_shards must be at least 1".to_string(),
        ));
    }

    let padded_size = calculate_data_padding(payload.len() + 1, data_shards);
    let shard_len = padded_size / data_shards;

    let mut padded = Vec::with_capacity(padded_size);
    padded.extend_from_slice(payload);
    padded.push(PADDING_TERMINATOR);
    padded.resize(padded_size, 0);

    let mut shards: Vec<Vec<u8>> = padded.chunks(shard_len).map(|c| c.to_vec()).collect();
    shards.resize(total_shards, vec![0u8; shard_len]);

    let rs = ReedSolomon::new(data_shards, parity_shards)?;
    rs.encode_parity(&mut shards, 0, shard_len)?;
    Ok(shards)
}

/// Shards for `payload` under the geometry [`ShardGeometry::for_payload`]
/// picks for `servers` servers
pub fn encode_payload(payload: &[u8], servers: usize) -> Result<(ShardGeometry, Vec<Vec<u8>>)> {
    let geometry = ShardGeometry::for_payload(payload.len(), servers)?;
    let shards = calculate_reed_solomon_shards(
        payload,
        geometry.total_shards,
        geometry.parity_shards,
        geometry.data_shards,
    )?;
    Ok((geometry, shards))
}

/// Remove the zero padding and the terminator byte.
///
/// # Errors
/// `Deserialization` if the buffer has no terminator before the padding
pub fn strip_padding(buffer: &[u8]) -> Result<&[u8]> {
    let terminator = buffer
        .iter()
        .rposition(|&b| b != 0)
        .ok_or_else(|| Error::Deserialization("padding terminator not found".to_string()))?;

    if buffer[terminator] != PADDING_TERMINATOR {
        return Err(Error::Deserialization(format!(
            "expected padding terminator, found 0x{:02x}",
            buffer[terminator]
        )));
    }
    Ok(&buffer[..terminator])
}
