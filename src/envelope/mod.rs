//! Envelope protocol
//!
//! Turns a [`Transaction`] into one authenticated buffer whose contents are
//! erasure-coded and encrypted per server, and back.

pub mod codec;
pub mod protocol;
pub mod share;
pub mod transaction;
pub mod transport;

pub use protocol::{
    open, reassemble, seal, unwrap_envelope, verify_attestation, verify_server_tag, SealedEnvelope,
    ShardBundle,
};
pub use share::{decrypt_share, split_for_servers, ServerShare};
pub use transaction::{Transaction, Value};
pub use transport::{decode_response, EnvelopeClient, Transport};
