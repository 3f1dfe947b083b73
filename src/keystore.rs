//! Key material access.
//!
//! The signer and verifier reach key material only through the [`KeyStore`]
//! trait: ECDSA keys by vehicle id and role, Falcon-512 keys by vehicle id.
//! [`FileKeyStore`] reads the on-disk layout (PEM EC keys, hex Falcon keys)
//! and memoizes every verification key behind a read/write lock.
//! [`MemoryKeyStore`] generates fresh key material for tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use pqcrypto_falcon::falcon512;
use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _};
use rand::rngs::OsRng;

use crate::error::KeyStoreError;

/// Which of a vehicle's two ECDSA keypairs is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Signs the tbsData of every SPDU.
    Message,
    /// Signs the embedded certificate.
    Certificate,
}

pub trait KeyStore {
    fn signing_key(&self, vehicle_id: u8, role: KeyRole) -> Result<SigningKey, KeyStoreError>;
    fn verifying_key(&self, vehicle_id: u8, role: KeyRole) -> Result<VerifyingKey, KeyStoreError>;
    fn falcon_secret_key(&self, vehicle_id: u8) -> Result<falcon512::SecretKey, KeyStoreError>;
    fn falcon_public_key(&self, vehicle_id: u8) -> Result<falcon512::PublicKey, KeyStoreError>;
}

#[derive(Default)]
struct KeyCache {
    verifying: HashMap<(u8, KeyRole), VerifyingKey>,
    falcon_public: HashMap<u8, falcon512::PublicKey>,
}

/// Key store over the on-disk layout:
/// `keys/<n>/p256.key`, `cert_keys/<n>/p256.key` (PEM),
/// `falcon_keys/<n>/falcon.key` and `falcon_keys/<n>/falcon.pub` (hex).
pub struct FileKeyStore {
    root: PathBuf,
    cache: RwLock<KeyCache>,
}

impl FileKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(KeyCache::default()),
        }
    }

    fn ec_key_path(&self, vehicle_id: u8, role: KeyRole) -> PathBuf {
        let dir = match role {
            KeyRole::Message => "keys",
            KeyRole::Certificate => "cert_keys",
        };
        self.root.join(dir).join(vehicle_id.to_string()).join("p256.key")
    }

    fn falcon_key_path(&self, vehicle_id: u8, public: bool) -> PathBuf {
        let name = if public { "falcon.pub" } else { "falcon.key" };
        self.root
            .join("falcon_keys")
            .join(vehicle_id.to_string())
            .join(name)
    }

    fn load_ec_signing_key(path: &Path) -> Result<SigningKey, KeyStoreError> {
        let display = path.display().to_string();
        let pem = fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
            path: display.clone(),
            source,
        })?;
        // OpenSSL-generated EC keys are SEC1 PEM; PKCS#8 is accepted too.
        let secret = match p256::SecretKey::from_sec1_pem(&pem) {
            Ok(secret) => secret,
            Err(_) => p256::SecretKey::from_pkcs8_pem(&pem).map_err(|e| {
                KeyStoreError::Decode {
                    path: display,
                    detail: e.to_string(),
                }
            })?,
        };
        Ok(SigningKey::from(secret))
    }

    fn load_hex_key(path: &Path, expected: usize) -> Result<Vec<u8>, KeyStoreError> {
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
            path: display.clone(),
            source,
        })?;
        let bytes = hex::decode(text.trim()).map_err(|e| KeyStoreError::Decode {
            path: display.clone(),
            detail: e.to_string(),
        })?;
        if bytes.len() != expected {
            return Err(KeyStoreError::LengthMismatch {
                path: display,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }
}

impl KeyStore for FileKeyStore {
    fn signing_key(&self, vehicle_id: u8, role: KeyRole) -> Result<SigningKey, KeyStoreError> {
        Self::load_ec_signing_key(&self.ec_key_path(vehicle_id, role))
    }

    fn verifying_key(&self, vehicle_id: u8, role: KeyRole) -> Result<VerifyingKey, KeyStoreError> {
        if let Some(key) = self
            .cache
            .read()
            .expect("key cache poisoned")
            .verifying
            .get(&(vehicle_id, role))
        {
            return Ok(*key);
        }
        let key = *self.signing_key(vehicle_id, role)?.verifying_key();
        self.cache
            .write()
            .expect("key cache poisoned")
            .verifying
            .insert((vehicle_id, role), key);
        Ok(key)
    }

    fn falcon_secret_key(&self, vehicle_id: u8) -> Result<falcon512::SecretKey, KeyStoreError> {
        let path = self.falcon_key_path(vehicle_id, false);
        let bytes = Self::load_hex_key(&path, falcon512::secret_key_bytes())?;
        falcon512::SecretKey::from_bytes(&bytes).map_err(|e| KeyStoreError::Decode {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    fn falcon_public_key(&self, vehicle_id: u8) -> Result<falcon512::PublicKey, KeyStoreError> {
        if let Some(key) = self
            .cache
            .read()
            .expect("key cache poisoned")
            .falcon_public
            .get(&vehicle_id)
        {
            return Ok(key.clone());
        }
        let path = self.falcon_key_path(vehicle_id, true);
        let bytes = Self::load_hex_key(&path, falcon512::public_key_bytes())?;
        let key = falcon512::PublicKey::from_bytes(&bytes).map_err(|e| KeyStoreError::Decode {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        self.cache
            .write()
            .expect("key cache poisoned")
            .falcon_public
            .insert(vehicle_id, key.clone());
        Ok(key)
    }
}

struct MemoryKeys {
    message: SigningKey,
    certificate: SigningKey,
    falcon_public: falcon512::PublicKey,
    falcon_secret: falcon512::SecretKey,
}

/// In-memory key store with freshly generated material, one entry per
/// vehicle id. Used by tests and anywhere no key files exist.
pub struct MemoryKeyStore {
    vehicles: HashMap<u8, MemoryKeys>,
}

impl MemoryKeyStore {
    pub fn generate(vehicle_ids: &[u8]) -> Self {
        let mut vehicles = HashMap::new();
        for &id in vehicle_ids {
            let (falcon_public, falcon_secret) = falcon512::keypair();
            vehicles.insert(
                id,
                MemoryKeys {
                    message: SigningKey::random(&mut OsRng),
                    certificate: SigningKey::random(&mut OsRng),
                    falcon_public,
                    falcon_secret,
                },
            );
        }
        Self { vehicles }
    }

    fn keys(&self, vehicle_id: u8) -> Result<&MemoryKeys, KeyStoreError> {
        self.vehicles
            .get(&vehicle_id)
            .ok_or(KeyStoreError::UnknownVehicle { vehicle_id })
    }
}

impl KeyStore for MemoryKeyStore {
    fn signing_key(&self, vehicle_id: u8, role: KeyRole) -> Result<SigningKey, KeyStoreError> {
        let keys = self.keys(vehicle_id)?;
        Ok(match role {
            KeyRole::Message => keys.message.clone(),
            KeyRole::Certificate => keys.certificate.clone(),
        })
    }

    fn verifying_key(&self, vehicle_id: u8, role: KeyRole) -> Result<VerifyingKey, KeyStoreError> {
        Ok(*self.signing_key(vehicle_id, role)?.verifying_key())
    }

    fn falcon_secret_key(&self, vehicle_id: u8) -> Result<falcon512::SecretKey, KeyStoreError> {
        Ok(self.keys(vehicle_id)?.falcon_secret.clone())
    }

    fn falcon_public_key(&self, vehicle_id: u8) -> Result<falcon512::PublicKey, KeyStoreError> {
        Ok(self.keys(vehicle_id)?.falcon_public.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_roles() {
        let store = MemoryKeyStore::generate(&[0, 1]);
        let message = store.verifying_key(0, KeyRole::Message).unwrap();
        let certificate = store.verifying_key(0, KeyRole::Certificate).unwrap();
        assert_ne!(message, certificate);
        assert!(store.falcon_public_key(1).is_ok());
        assert!(matches!(
            store.signing_key(9, KeyRole::Message),
            Err(KeyStoreError::UnknownVehicle { vehicle_id: 9 })
        ));
    }

    #[test]
    fn file_store_reports_missing_keys() {
        let store = FileKeyStore::new("/nonexistent-v2x-key-root");
        assert!(matches!(
            store.signing_key(0, KeyRole::Message),
            Err(KeyStoreError::Io { .. })
        ));
        assert!(matches!(
            store.falcon_public_key(0),
            Err(KeyStoreError::Io { .. })
        ));
    }

    #[test]
    fn file_store_rejects_bad_hex_length() {
        let dir = std::env::temp_dir().join("v2verifier-keystore-test");
        let key_dir = dir.join("falcon_keys").join("0");
        fs::create_dir_all(&key_dir).unwrap();
        fs::write(key_dir.join("falcon.pub"), "aabbcc").unwrap();
        let store = FileKeyStore::new(&dir);
        assert!(matches!(
            store.falcon_public_key(0),
            Err(KeyStoreError::LengthMismatch { .. })
        ));
        fs::remove_dir_all(&dir).ok();
    }
}
