use shardwire::crypto::{KeySet, SOURCE_TAG_SIZE, TAG_SIZE};
use shardwire::envelope::codec::decode_sequence;
use shardwire::envelope::{
    decrypt_share, open, reassemble, seal, split_for_servers, unwrap_envelope, verify_attestation,
    Transaction,
};
use shardwire::erasure::encode_payload;
use shardwire::Error;

fn transaction(blob_len: usize) -> Transaction {
    Transaction::new()
        .with("op", "append")
        .with("account", 42i64)
        .with("blob", (0..blob_len).map(|i| i as u8).collect::<Vec<u8>>())
}

#[test]
fn seal_and_open() {
    let keys = KeySet::generate(3).unwrap();
    let tx = transaction(300);
    let sealed = seal(&tx, &keys).unwrap();

    assert_eq!(open(&sealed.envelope, &keys).unwrap(), tx);
    assert_eq!(verify_attestation(&sealed.attestation, &keys).unwrap(), tx);
}

#[test]
fn flipped_outer_tag_bit_is_rejected() {
    let keys = KeySet::generate(3).unwrap();
    let sealed = seal(&transaction(300), &keys).unwrap();

    let mut envelope = sealed.envelope.clone();
    let last = envelope.len() - 1;
    envelope[last] ^= 0x04;

    let err = open(&envelope, &keys).unwrap_err();
    assert!(matches!(err, Error::IntegrityTagMismatch(_)));
    assert!(!err.is_recoverable());
}

#[test]
fn one_server_missing_still_opens() {
    let keys = KeySet::derive(b"integration", 3).unwrap();
    let tx = transaction(300);
    let sealed = seal(&tx, &keys).unwrap();
    let shares = split_for_servers(&sealed.envelope, &keys).unwrap();

    for lost in 1..=3 {
        let shards = shares
            .iter()
            .filter(|share| share.server != lost)
            .flat_map(|share| {
                decrypt_share(share, keys.encryption_key(share.server).unwrap()).unwrap()
            });
        let stage1 = reassemble(sealed.geometry, shards).unwrap();
        assert_eq!(Transaction::from_bytes(&stage1).unwrap(), tx);
    }
}

#[test]
fn two_servers_missing_is_insufficient() {
    let keys = KeySet::derive(b"integration", 3).unwrap();
    let sealed = seal(&transaction(300), &keys).unwrap();
    let shares = split_for_servers(&sealed.envelope, &keys).unwrap();

    let share = &shares[0];
    let shards = decrypt_share(share, keys.encryption_key(share.server).unwrap()).unwrap();
    let err = reassemble(sealed.geometry, shards).unwrap_err();
    assert!(err.is_recoverable());
}

#[test]
fn many_servers() {
    let keys = KeySet::generate(16).unwrap();
    let tx = transaction(5000);
    let sealed = seal(&tx, &keys).unwrap();
    assert_eq!(sealed.geometry.total_shards, 255);
    assert_eq!(open(&sealed.envelope, &keys).unwrap(), tx);
}

#[test]
fn envelopes_under_one_key_set_do_not_share_keystream() {
    let keys = KeySet::derive(b"shared secret", 3).unwrap();
    let tx_a = Transaction::new().with("blob", vec![0x00u8; 300]);
    let tx_b = Transaction::new().with("blob", vec![0xFFu8; 300]);
    let sealed_a = seal(&tx_a, &keys).unwrap();
    let sealed_b = seal(&tx_b, &keys).unwrap();
    let shard_len = sealed_a.geometry.shard_len;

    let bundle_a = unwrap_envelope(&sealed_a.envelope, &keys).unwrap();
    let bundle_b = unwrap_envelope(&sealed_b.envelope, &keys).unwrap();
    assert_ne!(bundle_a.source_tag, bundle_b.source_tag);

    let plain_a = encode_payload(&tx_a.to_bytes().unwrap(), 3).unwrap().1;
    let plain_b = encode_payload(&tx_b.to_bytes().unwrap(), 3).unwrap().1;
    let plain_xor: Vec<u8> = plain_a[0].iter().zip(&plain_b[0]).map(|(a, b)| a ^ b).collect();
    let sealed_xor: Vec<u8> = bundle_a.shards[0][..shard_len]
        .iter()
        .zip(&bundle_b.shards[0][..shard_len])
        .map(|(a, b)| a ^ b)
        .collect();
    assert_ne!(sealed_xor, plain_xor);

    assert_eq!(open(&sealed_a.envelope, &keys).unwrap(), tx_a);
    assert_eq!(open(&sealed_b.envelope, &keys).unwrap(), tx_b);
}

#[test]
fn bundle_carries_source_tag_after_shards() {
    let keys = KeySet::generate(3).unwrap();
    let sealed = seal(&transaction(300), &keys).unwrap();

    let outer = decode_sequence(&sealed.envelope).unwrap();
    assert_eq!(outer.len(), 2);
    let inner = decode_sequence(&outer[0]).unwrap();
    assert_eq!(inner.len(), sealed.geometry.total_shards + 1);

    let (tag, shards) = inner.split_last().unwrap();
    assert_eq!(tag.len(), SOURCE_TAG_SIZE);
    for shard in shards {
        assert_eq!(shard.len(), sealed.geometry.shard_len + TAG_SIZE);
    }
}

#[test]
fn appended_bytes_are_rejected() {
    let keys = KeySet::generate(3).unwrap();
    let mut envelope = seal(&transaction(300), &keys).unwrap().envelope;
    envelope.extend_from_slice(b"attacker-appended");

    let err = open(&envelope, &keys).unwrap_err();
    assert!(matches!(err, Error::Deserialization(_)));
}
