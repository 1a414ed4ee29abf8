//! Per-server shares of a sealed envelope
//!
//! Each server receives only the shards encrypted under its own key. A
//! server opens its share with that key alone; the plaintext shards of
//! enough servers are then reassembled into the transaction.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{open_shard, EncryptionKey, KeySet, SOURCE_TAG_SIZE};
use crate::erasure::{server_for_shard, shards_per_server, ShardGeometry};
use crate::error::{Error, Result};

use super::protocol::unwrap_envelope;

/// Encrypted shards owned by one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerShare {
    /// Key index of the owning server (1-based)
    pub server: usize,
    pub source_tag: [u8; SOURCE_TAG_SIZE],
    /// Geometry of the whole envelope
    pub geometry: ShardGeometry,
    /// `(shard index, ciphertext)` pairs
    pub shards: Vec<(usize, Vec<u8>)>,
}

/// Verify an envelope and split its shards by owning server.
///
/// Returns one share per server, in server order. A server whose range is
/// empty (possible when the shard count was capped) gets an empty share.
pub fn split_for_servers(envelope: &[u8], keys: &KeySet) -> Result<Vec<ServerShare>> {
    let servers = keys.server_count();
    let bundle = unwrap_envelope(envelope, keys)?;
    let geometry = bundle.geometry(servers)?;
    let per_server = shards_per_server(geometry.total_shards, servers);

    let mut shares: Vec<ServerShare> = (1..=servers)
        .map(|server| ServerShare {
            server,
            source_tag: bundle.source_tag,
            geometry,
            shards: Vec::with_capacity(per_server),
        })
        .collect();

    for (index, shard) in bundle.shards.into_iter().enumerate() {
        let server = server_for_shard(index, per_server);
        let share = shares.get_mut(server - 1).ok_or(Error::IndexOutOfRange {
            index: server,
            len: servers,
        })?;
        share.shards.push((index, shard));
    }

    debug!(servers, per_server, "Split envelope into server shares");
    Ok(shares)
}

/// Decrypt one share with its server's key
pub fn decrypt_share(share: &ServerShare, key: &EncryptionKey) -> Result<Vec<(usize, Vec<u8>)>> {
    share
        .shards
        .iter()
        .map(|(index, sealed)| {
            let plain = open_shard(key.key(), &share.source_tag, *index, sealed)?;
            Ok((*index, plain))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::protocol::{reassemble, seal};
    use crate::envelope::transaction::Transaction;

    fn setup(servers: usize) -> (KeySet, Transaction, Vec<u8>) {
        let keys = KeySet::derive(b"share tests", servers).unwrap();
        let tx = Transaction::new().with("blob", vec![1u8; 600]);
        let sealed = seal(&tx, &keys).unwrap();
        (keys, tx, sealed.envelope)
    }

    #[test]
    fn test_split_covers_every_shard_once() {
        let (keys, _, envelope) = setup(3);
        let shares = split_for_servers(&envelope, &keys).unwrap();
        assert_eq!(shares.len(), 3);

        let mut indices: Vec<usize> = shares
            .iter()
            .flat_map(|s| s.shards.iter().map(|(i, _)| *i))
            .collect();
        indices.sort_unstable();
        let total = shares[0].geometry.total_shards;
        assert_eq!(indices, (0..total).collect::<Vec<_>>());

        for share in &shares {
            assert_eq!(share.shards.len(), total / 3);
        }
    }

    #[test]
    fn test_share_needs_its_own_key() {
        let (keys, _, envelope) = setup(2);
        let shares = split_for_servers(&envelope, &keys).unwrap();
        decrypt_share(&shares[0], keys.encryption_key(1).unwrap()).unwrap();
        assert!(matches!(
            decrypt_share(&shares[0], keys.encryption_key(2).unwrap()),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_reassemble_without_one_server() {
        let (keys, tx, envelope) = setup(3);
        let shares = split_for_servers(&envelope, &keys).unwrap();
        let geometry = shares[0].geometry;

        let mut plain = Vec::new();
        for share in shares.iter().filter(|s| s.server != 2) {
            plain.extend(decrypt_share(share, keys.encryption_key(share.server).unwrap()).unwrap());
        }
        let stage1 = reassemble(geometry, plain).unwrap();
        assert_eq!(Transaction::from_bytes(&stage1).unwrap(), tx);
    }

    #[test]
    fn test_split_rejects_tampered_envelope() {
        let (keys, _, mut envelope) = setup(2);
        let last = envelope.len() - 1;
        envelope[last] ^= 0x80;
        assert!(split_for_servers(&envelope, &keys).is_err());
    }
}
