//! Reed-Solomon erasure coding over GF(2^8)
//!
//! Any `data_shards` of the `total_shards` produced for a payload are
//! enough to rebuild it. Sizing rules decide how many shards a payload gets
//! for a given number of servers; the collector gathers shards arriving
//! from those servers.

pub mod collector;
pub mod galois;
pub mod matrix;
pub mod reed_solomon;
pub mod sizing;

pub use collector::{CollectorRegistry, CollectorState, ShardCollector};
pub use matrix::Matrix;
pub use reed_solomon::ReedSolomon;
pub use sizing::{
    calculate_data_padding, calculate_n_shards, calculate_reed_solomon_shards, encode_payload,
    server_for_shard, shards_per_server, strip_padding, ShardGeometry,
};
