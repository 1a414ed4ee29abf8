//! shardwire - erasure-coded, per-server encrypted transaction envelopes
//!
//! A transaction is serialized, split into Reed-Solomon shards, and each
//! shard is encrypted for the server that will hold it. Any half of the
//! servers' shards (rounded up) rebuilds the transaction.

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod erasure;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::KeySet;
    pub use crate::envelope::{open, seal, SealedEnvelope, Transaction, Value};
    pub use crate::erasure::{ReedSolomon, ShardCollector, ShardGeometry};
    pub use crate::error::{Error, Result};
}
