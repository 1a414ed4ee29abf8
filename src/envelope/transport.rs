//! Transport seam
//!
//! The core never performs I/O. A [`Transport`] posts one envelope to an
//! endpoint and returns the response body; [`EnvelopeClient`] wraps sealing,
//! posting and opening around it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use tracing::{debug, instrument};

use crate::config::{Config, ResponseEncoding};
use crate::crypto::KeySet;
use crate::error::{Error, Result};

use super::protocol::{open, seal};
use super::transaction::Transaction;

/// Posts an envelope to `endpoint` and returns the response body
pub trait Transport: Send + Sync {
    fn post<'a>(&'a self, endpoint: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Decode a response body into envelope bytes
pub fn decode_response(body: &[u8], encoding: ResponseEncoding) -> Result<Vec<u8>> {
    match encoding {
        ResponseEncoding::Raw => Ok(body.to_vec()),
        ResponseEncoding::Base64 => {
            let text = std::str::from_utf8(body)
                .map_err(|e| Error::Deserialization(format!("response is not text: {}", e)))?;
            STANDARD
                .decode(text.trim())
                .map_err(|e| Error::Deserialization(format!("invalid base64 response: {}", e)))
        }
    }
}

/// Sends transactions through a [`Transport`]
pub struct EnvelopeClient<T> {
    transport: T,
    keys: KeySet,
    endpoint: String,
    encoding: ResponseEncoding,
}

impl<T: Transport> EnvelopeClient<T> {
    pub fn new(
        transport: T,
        keys: KeySet,
        endpoint: impl Into<String>,
        encoding: ResponseEncoding,
    ) -> Self {
        EnvelopeClient {
            transport,
            keys,
            endpoint: endpoint.into(),
            encoding,
        }
    }

    /// Client for the endpoint and response encoding in `config`
    pub fn from_config(transport: T, keys: KeySet, config: &Config) -> Self {
        Self::new(
            transport,
            keys,
            config.endpoint.clone(),
            config.envelope.response_encoding,
        )
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Seal `transaction`, post it and open the response
    #[instrument(skip_all, fields(endpoint = %self.endpoint, servers = self.keys.server_count()))]
    pub async fn send(&self, transaction: &Transaction) -> Result<Transaction> {
        let sealed = seal(transaction, &self.keys)?;
        let response = self.transport.post(&self.endpoint, sealed.envelope).await?;
        debug!(response_len = response.len(), "Received response");

        let envelope = decode_response(&response, self.encoding)?;
        open(&envelope, &self.keys)
    }
}
