//! HMAC-SHA256 integrity tags

use ring::hmac;

use crate::crypto::{INTEGRITY_TAG_SIZE, KEY_SIZE, SERVER_TAG_SIZE};
use crate::error::{Error, Result};

/// Full HMAC-SHA256 tag over `data`
pub fn sign(key: &[u8; KEY_SIZE], data: &[u8]) -> [u8; INTEGRITY_TAG_SIZE] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, data);
    let mut out = [0u8; INTEGRITY_TAG_SIZE];
    out.copy_from_slice(tag.as_ref());
    out
}

/// First [`SERVER_TAG_SIZE`] bytes of the HMAC-SHA256 tag over `data`
pub fn truncated_tag(key: &[u8; KEY_SIZE], data: &[u8]) -> [u8; SERVER_TAG_SIZE] {
    let full = sign(key, data);
    let mut out = [0u8; SERVER_TAG_SIZE];
    out.copy_from_slice(&full[..SERVER_TAG_SIZE]);
    out
}

/// Verify a full tag in constant time
pub fn verify(key: &[u8; KEY_SIZE], data: &[u8], tag: &[u8]) -> Result<()> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, data, tag)
        .map_err(|_| Error::IntegrityTagMismatch("envelope tag does not match".to_string()))
}

/// Verify a truncated tag without an early exit on the first differing byte
pub fn verify_truncated(key: &[u8; KEY_SIZE], data: &[u8], tag: &[u8]) -> Result<()> {
    let expected = truncated_tag(key, data);
    let diff = if tag.len() == expected.len() {
        expected.iter().zip(tag).fold(0u8, |acc, (a, b)| acc | (a ^ b))
    } else {
        1
    };
    if diff != 0 {
        return Err(Error::IntegrityTagMismatch(
            "server tag does not match".to_string(),
        ));
    }
    Ok(())
}
