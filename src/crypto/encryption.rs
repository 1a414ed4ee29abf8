//! AES-256-GCM shard encryption
//!
//! Each shard is sealed with the key of the server that owns it. The nonce
//! is not transmitted: both ends rebuild it from the envelope's source tag
//! and the shard index. Each envelope draws a fresh source tag, so nonces
//! are unique per shard and per envelope.

use crate::crypto::{KEY_SIZE, NONCE_SIZE, SOURCE_TAG_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};

/// Nonce for `shard_index`: source tag, then the index as big-endian u32
pub fn shard_nonce(
    source_tag: &[u8; SOURCE_TAG_SIZE],
    shard_index: usize,
) -> Result<[u8; NONCE_SIZE]> {
    let index = u32::try_from(shard_index).map_err(|_| Error::IndexOutOfRange {
        index: shard_index,
        len: u32::MAX as usize,
    })?;

    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..SOURCE_TAG_SIZE].copy_from_slice(source_tag);
    nonce[SOURCE_TAG_SIZE..].copy_from_slice(&index.to_be_bytes());
    Ok(nonce)
}

/// Encrypt one shard. Returns ciphertext with the tag appended.
///
/// The source tag is bound as additional authenticated data.
pub fn seal_shard(
    key: &[u8; KEY_SIZE],
    source_tag: &[u8; SOURCE_TAG_SIZE],
    shard_index: usize,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Encryption("Failed to create encryption key".to_string()))?;
    let sealing_key = LessSafeKey::new(unbound_key);
    let nonce = Nonce::assume_unique_for_key(shard_nonce(source_tag, shard_index)?);

    let mut in_out = plaintext.to_vec();
    in_out.reserve(TAG_SIZE);

    sealing_key
        .seal_in_place_append_tag(nonce, Aad::from(source_tag), &mut in_out)
        .map_err(|_| Error::Encryption(format!("Encryption of shard {} failed", shard_index)))?;

    Ok(in_out)
}

/// Decrypt one shard sealed by [`seal_shard`]
pub fn open_shard(
    key: &[u8; KEY_SIZE],
    source_tag: &[u8; SOURCE_TAG_SIZE],
    shard_index: usize,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Decryption(format!(
            "Shard {} ciphertext too short",
            shard_index
        )));
    }

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Decryption("Failed to create decryption key".to_string()))?;
    let opening_key = LessSafeKey::new(unbound_key);
    let nonce = Nonce::assume_unique_for_key(shard_nonce(source_tag, shard_index)?);

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, Aad::from(source_tag), &mut in_out)
        .map_err(|_| {
            Error::Decryption(format!(
                "Shard {} failed authentication - corrupted or wrong key",
                shard_index
            ))
        })?;

    Ok(plaintext.to_vec())
}
