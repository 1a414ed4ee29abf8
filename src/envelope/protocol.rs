//! Sealing and opening envelopes
//!
//! Outbound path for one transaction:
//!
//! 1. serialize the transaction (stage 1)
//! 2. append one truncated HMAC per server signing key (stage 2, the
//!    attestation)
//! 3. erasure-code the stage 1 bytes
//! 4. encrypt each shard with the key of the server that owns it and bundle
//!    the ciphertexts followed by the source tag (stage 4)
//! 5. tag the bundle with the primary signing key
//!
//! Opening reverses steps 5 to 1. A bad outer tag rejects the envelope; a
//! shard that fails decryption counts as missing and the erasure code
//! covers for it.
//!
//! Every envelope draws a fresh random source tag. The tag is the nonce
//! prefix for all of its shards, so a key never sees the same nonce twice
//! unless two envelopes collide on 64 random bits.

use rand::RngCore;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::crypto::{
    open_shard, seal_shard, sign, truncated_tag, verify, verify_truncated, KeySet, SigningKey,
    SERVER_TAG_SIZE, SOURCE_TAG_SIZE, TAG_SIZE,
};
use crate::erasure::sizing::MAX_SHARDS;
use crate::erasure::{encode_payload, server_for_shard, shards_per_server, strip_padding};
use crate::erasure::{ShardCollector, ShardGeometry};
use crate::error::{Error, Result};

use super::codec::{decode_exact, decode_sequence, encode_sequence};
use super::transaction::Transaction;

/// Result of [`seal`]
#[derive(Debug, Clone)]
pub struct SealedEnvelope {
    /// Bytes to hand to the transport
    pub envelope: Vec<u8>,
    /// Stage 1 bytes followed by one truncated tag per server
    pub attestation: Vec<u8>,
    /// Shard layout used for this envelope
    pub geometry: ShardGeometry,
}

/// Encrypted shards carried inside an envelope.
///
/// Serialized as `[shard 0, .., shard n-1, source tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardBundle {
    pub shards: Vec<Vec<u8>>,
    pub source_tag: [u8; SOURCE_TAG_SIZE],
}

impl ShardBundle {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(self.shards.len() + 1);
        parts.extend(self.shards.iter().map(|s| s.as_slice()));
        parts.push(&self.source_tag);
        encode_sequence(&parts)
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut shards = decode_sequence(data)?;
        let source_tag = shards
            .pop()
            .and_then(|tag| <[u8; SOURCE_TAG_SIZE]>::try_from(tag.as_slice()).ok())
            .ok_or_else(|| Error::Deserialization("missing or malformed source tag".to_string()))?;
        Ok(ShardBundle { shards, source_tag })
    }

    /// Geometry implied by the shard count and ciphertext length.
    ///
    /// # Errors
    /// `GeometryMismatch` if shards differ in length, are too short to hold
    /// an AEAD tag, or their count cannot come from `servers` servers
    pub fn geometry(&self, servers: usize) -> Result<ShardGeometry> {
        let first = self
            .shards
            .first()
            .ok_or_else(|| Error::GeometryMismatch("envelope carries no shards".to_string()))?;
        let sealed_len = first.len();
        if sealed_len <= TAG_SIZE {
            return Err(Error::GeometryMismatch(format!(
                "shard length {} leaves no room for data",
                sealed_len
            )));
        }
        if let Some(index) = self.shards.iter().position(|s| s.len() != sealed_len) {
            return Err(Error::GeometryMismatch(format!(
                "shard {} has length {}, expected {}",
                index,
                self.shards[index].len(),
                sealed_len
            )));
        }

        let total = self.shards.len();
        if servers == 0 || (total % servers != 0 && total != MAX_SHARDS) {
            return Err(Error::GeometryMismatch(format!(
                "{} shards cannot be spread over {} servers",
                total, servers
            )));
        }
        ShardGeometry::from_total(total, sealed_len - TAG_SIZE)
    }
}

/// Seal `transaction` for the servers in `keys` under a fresh source tag
pub fn seal(transaction: &Transaction, keys: &KeySet) -> Result<SealedEnvelope> {
    let mut source_tag = [0u8; SOURCE_TAG_SIZE];
    rand::thread_rng().fill_bytes(&mut source_tag);
    seal_with_source_tag(transaction, keys, &source_tag)
}

fn seal_with_source_tag(
    transaction: &Transaction,
    keys: &KeySet,
    source_tag: &[u8; SOURCE_TAG_SIZE],
) -> Result<SealedEnvelope> {
    let servers = keys.server_count();
    let stage1 = transaction.to_bytes()?;

    let tags: Vec<[u8; SERVER_TAG_SIZE]> = keys
        .server_signing_keys()
        .par_iter()
        .map(|key| truncated_tag(key.key(), &stage1))
        .collect();
    let mut attestation_parts: Vec<&[u8]> = Vec::with_capacity(servers + 1);
    attestation_parts.push(&stage1);
    attestation_parts.extend(tags.iter().map(|t| t.as_slice()));
    let attestation = encode_sequence(&attestation_parts)?;

    let (geometry, shards) = encode_payload(&stage1, servers)?;
    let per_server = shards_per_server(geometry.total_shards, servers);

    let sealed: Vec<Vec<u8>> = shards
        .par_iter()
        .enumerate()
        .map(|(index, shard)| {
            let key = keys.encryption_key(server_for_shard(index, per_server))?;
            seal_shard(key.key(), source_tag, index, shard)
        })
        .collect::<Result<_>>()?;

    let body = ShardBundle {
        shards: sealed,
        source_tag: *source_tag,
    }
    .to_bytes()?;
    let tag = sign(keys.primary_signing_key().key(), &body);
    let envelope = encode_sequence(&[body.as_slice(), tag.as_slice()])?;

    info!(
        servers,
        payload_len = stage1.len(),
        shards = geometry.total_shards,
        shard_len = geometry.shard_len,
        envelope_len = envelope.len(),
        "Sealed envelope"
    );

    Ok(SealedEnvelope {
        envelope,
        attestation,
        geometry,
    })
}

/// Check the outer tag and return the shard bundle inside.
///
/// The source tag is taken from the bundle; the outer tag covers it.
pub fn unwrap_envelope(envelope: &[u8], keys: &KeySet) -> Result<ShardBundle> {
    let mut parts = decode_exact(envelope, 2, "envelope")?;
    let tag = parts.pop().unwrap_or_default();
    let body = parts.pop().unwrap_or_default();
    verify(keys.primary_signing_key().key(), &body, &tag)?;

    ShardBundle::from_bytes(&body)
}

/// Open an envelope and recover the transaction
pub fn open(envelope: &[u8], keys: &KeySet) -> Result<Transaction> {
    let servers = keys.server_count();
    let bundle = unwrap_envelope(envelope, keys)?;
    let geometry = bundle.geometry(servers)?;
    let per_server = shards_per_server(geometry.total_shards, servers);

    let opened: Vec<Option<Vec<u8>>> = bundle
        .shards
        .par_iter()
        .enumerate()
        .map(|(index, sealed)| {
            let server = server_for_shard(index, per_server);
            let key = keys.encryption_key(server)?;
            match open_shard(key.key(), &bundle.source_tag, index, sealed) {
                Ok(shard) => Ok(Some(shard)),
                Err(e) => {
                    warn!(shard = index, server, error = %e, "Dropping unreadable shard");
                    Ok(None)
                }
            }
        })
        .collect::<Result<_>>()?;

    let shards = opened
        .into_iter()
        .enumerate()
        .filter_map(|(index, shard)| shard.map(|s| (index, s)));
    let stage1 = reassemble(geometry, shards)?;
    let transaction = Transaction::from_bytes(&stage1)?;

    info!(
        servers,
        shards = geometry.total_shards,
        fields = transaction.len(),
        "Opened envelope"
    );
    Ok(transaction)
}

/// Rebuild stage 1 bytes from plaintext shards `(index, bytes)`
pub fn reassemble<I>(geometry: ShardGeometry, shards: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (usize, Vec<u8>)>,
{
    let mut collector = ShardCollector::new();
    for (index, shard) in shards {
        collector.set_shard(index, &shard, geometry)?;
    }
    if !collector.reconstruct()? {
        return Err(Error::InsufficientShards {
            present: collector.received_count(),
            required: geometry.data_shards,
        });
    }
    let data = collector
        .data()
        .ok_or_else(|| Error::Internal("collector reconstructed no data".to_string()))?;
    debug!(
        received = collector.received_count(),
        total = geometry.total_shards,
        "Reassembled payload"
    );
    Ok(strip_padding(data)?.to_vec())
}

/// Check every server tag in an attestation and return its transaction
pub fn verify_attestation(attestation: &[u8], keys: &KeySet) -> Result<Transaction> {
    let servers = keys.server_count();
    let parts = decode_exact(attestation, servers + 1, "attestation")?;
    let (stage1, tags) = parts.split_at(1);
    let stage1 = &stage1[0];

    keys.server_signing_keys()
        .par_iter()
        .zip(tags.par_iter())
        .try_for_each(|(key, tag)| verify_truncated(key.key(), stage1, tag))?;

    Transaction::from_bytes(stage1)
}

/// Check the tag of a single server (1-based) in an attestation
pub fn verify_server_tag(attestation: &[u8], server: usize, key: &SigningKey) -> Result<()> {
    let parts = decode_sequence(attestation)?;
    if server == 0 || server >= parts.len() {
        return Err(Error::IndexOutOfRange {
            index: server,
            len: parts.len(),
        });
    }
    verify_truncated(key.key(), &parts[0], &parts[server])
}
