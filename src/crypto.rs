//! Signature and digest primitives.
//!
//! ECDSA P-256 signatures travel DER-encoded (variable length, at most 72
//! bytes) and are made over a SHA-256 digest. Falcon-512 signatures are
//! detached and made over the raw message bytes. Verification never panics:
//! malformed input yields `false`.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use pqcrypto_falcon::falcon512;
use pqcrypto_traits::sign::DetachedSignature as _;
use sha2::{Digest, Sha256};

use crate::error::SignError;
use crate::types::CERT_SIGNATURE_CAP;

/// SHA-256 over an arbitrary byte region.
pub fn sha256_digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Sign a SHA-256 digest, returning the DER-encoded signature.
pub fn ecdsa_sign_digest(key: &SigningKey, digest: &[u8; 32]) -> Result<Vec<u8>, SignError> {
    let signature: Signature = key
        .sign_prehash(digest)
        .map_err(|e| SignError::EcdsaFailure(e.to_string()))?;
    let der = signature.to_der();
    let bytes = der.as_bytes().to_vec();
    if bytes.len() > CERT_SIGNATURE_CAP {
        return Err(SignError::EcdsaOversize {
            len: bytes.len(),
            cap: CERT_SIGNATURE_CAP,
        });
    }
    Ok(bytes)
}

/// Verify a DER-encoded ECDSA signature against a SHA-256 digest.
pub fn ecdsa_verify_digest(key: &VerifyingKey, digest: &[u8; 32], der: &[u8]) -> bool {
    match Signature::from_der(der) {
        Ok(signature) => key.verify_prehash(digest, &signature).is_ok(),
        Err(_) => false,
    }
}

/// Detached Falcon-512 signature over the raw message bytes.
pub fn falcon_sign(message: &[u8], secret_key: &falcon512::SecretKey) -> Vec<u8> {
    falcon512::detached_sign(message, secret_key)
        .as_bytes()
        .to_vec()
}

/// Verify a detached Falcon-512 signature. Falcon verifies against the
/// message itself, not a pre-hash.
pub fn falcon_verify(message: &[u8], signature: &[u8], public_key: &falcon512::PublicKey) -> bool {
    match falcon512::DetachedSignature::from_bytes(signature) {
        Ok(signature) => {
            falcon512::verify_detached_signature(&signature, message, public_key).is_ok()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqcrypto_traits::sign::PublicKey as _;
    use rand::rngs::OsRng;

    #[test]
    fn ecdsa_digest_round_trip() {
        let key = SigningKey::random(&mut OsRng);
        let digest = sha256_digest(b"basic safety message");
        let der = ecdsa_sign_digest(&key, &digest).unwrap();
        assert!(der.len() <= CERT_SIGNATURE_CAP);
        assert!(ecdsa_verify_digest(key.verifying_key(), &digest, &der));
    }

    #[test]
    fn ecdsa_rejects_wrong_digest() {
        let key = SigningKey::random(&mut OsRng);
        let digest = sha256_digest(b"original");
        let der = ecdsa_sign_digest(&key, &digest).unwrap();
        let other = sha256_digest(b"tampered");
        assert!(!ecdsa_verify_digest(key.verifying_key(), &other, &der));
    }

    #[test]
    fn ecdsa_rejects_garbage_der() {
        let key = SigningKey::random(&mut OsRng);
        let digest = sha256_digest(b"message");
        assert!(!ecdsa_verify_digest(key.verifying_key(), &digest, &[0u8; 72]));
        assert!(!ecdsa_verify_digest(key.verifying_key(), &digest, &[]));
    }

    #[test]
    fn falcon_round_trip() {
        let (pk, sk) = falcon512::keypair();
        let signature = falcon_sign(b"basic safety message", &sk);
        assert!(signature.len() <= falcon512::signature_bytes());
        assert!(falcon_verify(b"basic safety message", &signature, &pk));
    }

    #[test]
    fn falcon_rejects_wrong_message() {
        let (pk, sk) = falcon512::keypair();
        let signature = falcon_sign(b"original", &sk);
        assert!(!falcon_verify(b"tampered", &signature, &pk));
    }

    #[test]
    fn falcon_rejects_wrong_key() {
        let (_, sk) = falcon512::keypair();
        let (other_pk, _) = falcon512::keypair();
        let signature = falcon_sign(b"message", &sk);
        assert!(!falcon_verify(b"message", &signature, &other_pk));
        // Sanity: the two public keys differ.
        assert_ne!(other_pk.as_bytes().len(), 0);
    }
}
