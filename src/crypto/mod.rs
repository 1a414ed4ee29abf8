//! Cryptography module for shardwire
//!
//! AES-256-GCM for per-server shard encryption and HMAC-SHA256 integrity
//! tags, both from `ring`. Key material is supplied per envelope and never
//! persisted.

mod encryption;
mod integrity;
mod keys;

pub use encryption::{open_shard, seal_shard, shard_nonce};
pub use integrity::{sign, truncated_tag, verify, verify_truncated};
pub use keys::{EncryptionKey, KeySet, SigningKey};

/// Size of AES-256 and HMAC keys in bytes
pub const KEY_SIZE: usize = 32;

/// Size of GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of the source tag shared by both ends of an envelope
pub const SOURCE_TAG_SIZE: usize = 8;

/// Size of a full HMAC-SHA256 tag
pub const INTEGRITY_TAG_SIZE: usize = 32;

/// Size of the truncated per-server tags
pub const SERVER_TAG_SIZE: usize = 16;
