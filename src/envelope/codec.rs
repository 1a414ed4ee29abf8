//! Byte-sequence framing
//!
//! Every envelope stage is an ordered list of byte strings. This module
//! turns such a list into one buffer and back; order is preserved.
//! Decoding is strict: bytes left over after the sequence are an error.

use bincode::Options;

use crate::error::{Error, Result};

/// Serialize an ordered list of byte strings
pub fn encode_sequence<T: AsRef<[u8]>>(items: &[T]) -> Result<Vec<u8>> {
    let items: Vec<&[u8]> = items.iter().map(|item| item.as_ref()).collect();
    bincode::serialize(&items).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse a buffer produced by [`encode_sequence`]
pub fn decode_sequence(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(data)
        .map_err(|e| Error::Deserialization(e.to_string()))
}

/// Parse a sequence that must hold exactly `expected` items
pub fn decode_exact(data: &[u8], expected: usize, what: &str) -> Result<Vec<Vec<u8>>> {
    let items = decode_sequence(data)?;
    if items.len() != expected {
        return Err(Error::Deserialization(format!(
            "{} has {} parts, expected {}",
            what,
            items.len(),
            expected
        )));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_preserves_order() {
        let items = vec![b"first".to_vec(), Vec::new(), vec![0u8; 40], b"last".to_vec()];
        let encoded = encode_sequence(&items).unwrap();
        assert_eq!(decode_sequence(&encoded).unwrap(), items);
    }

    #[test]
    fn test_empty_sequence() {
        let encoded = encode_sequence::<Vec<u8>>(&[]).unwrap();
        assert!(decode_sequence(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_decode_exact() {
        let encoded = encode_sequence(&[b"a", b"b"]).unwrap();
        assert_eq!(decode_exact(&encoded, 2, "pair").unwrap().len(), 2);
        assert!(matches!(
            decode_exact(&encoded, 3, "triple"),
            Err(Error::Deserialization(_))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let encoded = encode_sequence(&[b"payload"]).unwrap();
        assert!(decode_sequence(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = encode_sequence(&[&b"body"[..], &b"tag"[..]]).unwrap();
        encoded.push(0);
        assert!(matches!(
            decode_sequence(&encoded),
            Err(Error::Deserialization(_))
        ));
        assert!(decode_exact(&encoded, 2, "envelope").is_err());
    }
}
