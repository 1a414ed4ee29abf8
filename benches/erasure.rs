use shardwire::crypto::KeySet;
use shardwire::envelope::{open, seal, Transaction};
use shardwire::erasure::{encode_payload, ReedSolomon};

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

pub fn bench_encode(c: &mut Criterion) {
    let payload = vec![0x5Au8; 64 * 1024];
    c.bench_function("encode 64 KiB for 3 servers", |b| {
        b.iter(|| encode_payload(black_box(&payload), 3).unwrap())
    });
}

pub fn bench_decode(c: &mut Criterion) {
    let rs = ReedSolomon::new(10, 4).unwrap();
    let mut shards: Vec<Vec<u8>> = (0..14).map(|i| vec![i as u8; 4096]).collect();
    rs.encode_parity(&mut shards, 0, 4096).unwrap();
    let mut present = vec![true; 14];
    present[0] = false;
    present[3] = false;
    present[7] = false;

    c.bench_function("decode 10+4 with 3 lost", |b| {
        b.iter(|| {
            let mut damaged = shards.clone();
            rs.decode_missing(black_box(&mut damaged), &present, 0, 4096).unwrap();
        })
    });
}

pub fn bench_envelope(c: &mut Criterion) {
    let keys = KeySet::generate(5).unwrap();
    let tx = Transaction::new().with("blob", vec![7u8; 16 * 1024]);
    let sealed = seal(&tx, &keys).unwrap();

    c.bench_function("seal 16 KiB for 5 servers", |b| {
        b.iter(|| seal(black_box(&tx), &keys).unwrap())
    });
    c.bench_function("open 16 KiB from 5 servers", |b| {
        b.iter(|| open(black_box(&sealed.envelope), &keys).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_envelope);
criterion_main!(benches);
