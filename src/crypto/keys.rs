//! Per-server key material
//!
//! A [`KeySet`] holds `servers + 1` encryption keys and `servers + 1`
//! signing keys. Index 0 is the primary (local) key: its signing key tags
//! the whole envelope and its encryption key is never used for shards.
//! Indices `1..=servers` belong to the servers, in order.
//!
//! A key set carries no nonce material: every sealed envelope draws its own
//! source tag.

use std::fmt;

use rand::RngCore;
use ring::hkdf::{self, Salt, HKDF_SHA256};
use zeroize::Zeroizing;

use crate::crypto::KEY_SIZE;
use crate::error::{Error, Result};

/// AES-256-GCM key
#[derive(Clone)]
pub struct EncryptionKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

/// HMAC-SHA256 key
#[derive(Clone)]
pub struct SigningKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

macro_rules! raw_key_impl {
    ($name:ident) => {
        impl $name {
            pub fn new(key: [u8; KEY_SIZE]) -> Self {
                $name {
                    key: Zeroizing::new(key),
                }
            }

            /// Build from a slice of exactly [`KEY_SIZE`] bytes
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| Error::InvalidKeyLength {
                    expected: KEY_SIZE,
                    got: bytes.len(),
                })?;
                Ok(Self::new(key))
            }

            /// Get the raw key bytes
            pub fn key(&self) -> &[u8; KEY_SIZE] {
                &self.key
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

raw_key_impl!(EncryptionKey);
raw_key_impl!(SigningKey);

/// Primary and per-server keys
#[derive(Clone)]
pub struct KeySet {
    encrypt: Vec<EncryptionKey>,
    sign: Vec<SigningKey>,
}

impl KeySet {
    /// Assemble a key set from externally derived keys
    ///
    /// # Errors
    /// `InvalidConfig` unless both lists have the same length and hold at
    /// least the primary key plus one server key
    pub fn new(encrypt: Vec<EncryptionKey>, sign: Vec<SigningKey>) -> Result<Self> {
        if encrypt.len() != sign.len() {
            return Err(Error::InvalidConfig(format!(
                "{} encryption keys but {} signing keys",
                encrypt.len(),
                sign.len()
            )));
        }
        if encrypt.len() < 2 {
            return Err(Error::InvalidConfig(
                "key set needs a primary key and at least one server key".to_string(),
            ));
        }
        Ok(KeySet { encrypt, sign })
    }

    /// Derive keys for `servers` servers from a shared secret with
    /// HKDF-SHA256.
    ///
    /// A salt is derived first and salts every later step.
    pub fn derive(secret: &[u8], servers: usize) -> Result<Self> {
        if servers == 0 {
            return Err(Error::KeyDerivation("at least one server is required".to_string()));
        }

        let root = Salt::new(HKDF_SHA256, &[]).extract(secret);
        let mut salt = [0u8; DERIVATION_SALT_SIZE];
        expand(&root, &[b"src".as_slice()], &mut salt)?;

        let salted = Salt::new(HKDF_SHA256, &salt).extract(secret);
        let mut encrypt_base = Zeroizing::new([0u8; KEY_SIZE]);
        let mut sign_base = Zeroizing::new([0u8; KEY_SIZE]);
        expand(&salted, &[b"encrypt".as_slice()], &mut encrypt_base[..])?;
        expand(&salted, &[b"sign".as_slice()], &mut sign_base[..])?;

        let encrypt_prk = Salt::new(HKDF_SHA256, &salt).extract(&encrypt_base[..]);
        let sign_prk = Salt::new(HKDF_SHA256, &salt).extract(&sign_base[..]);

        let mut encrypt = Vec::with_capacity(servers + 1);
        let mut sign = Vec::with_capacity(servers + 1);
        for index in 0..=servers {
            let index_bytes = (index as u32).to_be_bytes();

            let mut key = [0u8; KEY_SIZE];
            expand(&encrypt_prk, &[b"encrypts".as_slice(), &index_bytes], &mut key)?;
            encrypt.push(EncryptionKey::new(key));

            let mut key = [0u8; KEY_SIZE];
            expand(&sign_prk, &[b"signs".as_slice(), &index_bytes], &mut key)?;
            sign.push(SigningKey::new(key));
        }

        KeySet::new(encrypt, sign)
    }

    /// Random keys for `servers` servers
    pub fn generate(servers: usize) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut random_key = || {
            let mut key = [0u8; KEY_SIZE];
            rng.fill_bytes(&mut key);
            key
        };
        let encrypt = (0..=servers).map(|_| EncryptionKey::new(random_key())).collect();
        let sign = (0..=servers).map(|_| SigningKey::new(random_key())).collect();
        KeySet::new(encrypt, sign)
    }

    /// Number of servers (keys excluding the primary)
    pub fn server_count(&self) -> usize {
        self.encrypt.len() - 1
    }

    /// Encryption key at `index` (0 = primary)
    pub fn encryption_key(&self, index: usize) -> Result<&EncryptionKey> {
        self.encrypt.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.encrypt.len(),
        })
    }

    /// Signing key at `index` (0 = primary)
    pub fn signing_key(&self, index: usize) -> Result<&SigningKey> {
        self.sign.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.sign.len(),
        })
    }

    /// Primary signing key, used for the outer envelope tag
    pub fn primary_signing_key(&self) -> &SigningKey {
        &self.sign[0]
    }

    /// Signing keys of the servers, in server order
    pub fn server_signing_keys(&self) -> &[SigningKey] {
        &self.sign[1..]
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("servers", &self.server_count())
            .finish()
    }
}

/// Length of the salt derived from the secret
const DERIVATION_SALT_SIZE: usize = 8;

/// HKDF output length for ring
struct HkdfLen(usize);

impl hkdf::KeyType for HkdfLen {
    fn len(&self) -> usize {
        self.0
    }
}

fn expand(prk: &hkdf::Prk, info: &[&[u8]], out: &mut [u8]) -> Result<()> {
    prk.expand(info, HkdfLen(out.len()))
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".to_string()))?
        .fill(out)
        .map_err(|_| Error::KeyDerivation("HKDF fill failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = KeySet::derive(b"owner code", 3).unwrap();
        let b = KeySet::derive(b"owner code", 3).unwrap();
        for i in 0..=3 {
            assert_eq!(
                a.encryption_key(i).unwrap().key(),
                b.encryption_key(i).unwrap().key()
            );
            assert_eq!(a.signing_key(i).unwrap().key(), b.signing_key(i).unwrap().key());
        }
    }

    #[test]
    fn test_derive_distinct_keys() {
        let keys = KeySet::derive(b"owner code", 3).unwrap();
        assert_eq!(keys.server_count(), 3);
        for i in 0..=3 {
            for j in (i + 1)..=3 {
                assert_ne!(
                    keys.encryption_key(i).unwrap().key(),
                    keys.encryption_key(j).unwrap().key()
                );
                assert_ne!(keys.signing_key(i).unwrap().key(), keys.signing_key(j).unwrap().key());
            }
            assert_ne!(keys.encryption_key(i).unwrap().key(), keys.signing_key(i).unwrap().key());
        }
    }

    #[test]
    fn test_different_secrets_differ() {
        let a = KeySet::derive(b"alpha", 2).unwrap();
        let b = KeySet::derive(b"beta", 2).unwrap();
        assert_ne!(a.encryption_key(1).unwrap().key(), b.encryption_key(1).unwrap().key());
        assert_ne!(a.primary_signing_key().key(), b.primary_signing_key().key());
    }

    #[test]
    fn test_derive_requires_servers() {
        assert!(KeySet::derive(b"secret", 0).is_err());
    }

    #[test]
    fn test_new_validates_lengths() {
        let e = |n: usize| (0..n).map(|i| EncryptionKey::new([i as u8; KEY_SIZE])).collect();
        let s = |n: usize| (0..n).map(|i| SigningKey::new([i as u8; KEY_SIZE])).collect();
        assert!(KeySet::new(e(3), s(3)).is_ok());
        assert!(KeySet::new(e(3), s(2)).is_err());
        assert!(KeySet::new(e(1), s(1)).is_err());
    }

    #[test]
    fn test_key_from_slice() {
        assert!(EncryptionKey::from_slice(&[0u8; KEY_SIZE]).is_ok());
        assert!(matches!(
            SigningKey::from_slice(&[0u8; 16]),
            Err(Error::InvalidKeyLength { expected: 32, got: 16 })
        ));
    }

    #[test]
    fn test_accessors() {
        let keys = KeySet::generate(2).unwrap();
        assert_eq!(keys.server_signing_keys().len(), 2);
        assert!(keys.encryption_key(3).is_err());
        assert!(keys.signing_key(2).is_ok());
    }

    #[test]
    fn test_debug_hides_keys() {
        let keys = KeySet::derive(b"secret", 1).unwrap();
        let printed = format!("{:?} {:?}", keys, keys.primary_signing_key());
        assert!(printed.contains("servers: 1"));
        assert!(printed.contains("SigningKey(..)"));
    }
}
