//! SPDU assembly and signing.
//!
//! The builder produces one unsigned template per (sender, sequence):
//! tbsData with a fresh microsecond timestamp, the sender's certificate,
//! and a certificate signature computed once per SPDU and replicated into
//! every fragment. The signer then dispatches on scheme: ECDSA always fits
//! one fragment; Falcon signatures are split across several.

use chrono::{DateTime, Utc};
use p256::ecdsa::SigningKey;
use pqcrypto_falcon::falcon512;

use crate::crypto;
use crate::error::SignError;
use crate::types::{
    Bsm, Certificate, HeaderInfo, SignatureScheme, SignedData, SpduFragment, TbsData,
    CERT_SIGNATURE_CAP, MAX_FRAGMENT_BYTES, MAX_SIGNATURE_BYTES,
};
use crate::wire;

/// Requested fragment size, clamped to the datagram budget; 0 selects the
/// maximum.
pub fn clamp_fragment_size(requested: usize) -> usize {
    if requested == 0 {
        MAX_FRAGMENT_BYTES
    } else {
        requested.min(MAX_FRAGMENT_BYTES)
    }
}

/// Wall clock truncated to the wire's microsecond resolution.
fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Assemble the unsigned SPDU template for one (sender, sequence).
///
/// The certificate signature is made here, once per SPDU, over the SHA-256
/// digest of the certificate's byte image.
pub fn build_template(
    vehicle_id: u8,
    sequence_number: u32,
    message: Bsm,
    certificate: Certificate,
    certificate_signing_key: &SigningKey,
) -> Result<SpduFragment, SignError> {
    let tbs_data = TbsData {
        message,
        header_info: HeaderInfo {
            timestamp: now_micros(),
        },
    };

    let certificate_digest = crypto::sha256_digest(&wire::encode_certificate(&certificate));
    let signature = crypto::ecdsa_sign_digest(certificate_signing_key, &certificate_digest)?;
    let mut certificate_signature = [0u8; CERT_SIGNATURE_CAP];
    certificate_signature[..signature.len()].copy_from_slice(&signature);

    let mut fragment = SpduFragment::template(
        vehicle_id,
        sequence_number,
        SignedData {
            tbs_data,
            certificate,
            certificate_signature,
        },
    );
    fragment.certificate_signature_len = signature.len() as u32;
    Ok(fragment)
}

/// ECDSA path: SHA-256 over tbsData, one fragment carrying the whole DER
/// signature.
pub fn sign_ecdsa(
    fragment: &mut SpduFragment,
    signing_key: &SigningKey,
) -> Result<(), SignError> {
    let digest = crypto::sha256_digest(&wire::encode_tbs_data(&fragment.signed_data.tbs_data));
    let signature = crypto::ecdsa_sign_digest(signing_key, &digest)?;

    fragment.scheme = SignatureScheme::Ecdsa;
    fragment.fragment_index = 0;
    fragment.fragment_count = 1;
    fragment.signature_buffer_len = signature.len() as u32;
    fragment.signature_offset = 0;
    fragment.fragment_len = signature.len() as u32;
    fragment.signature_fragment = [0u8; MAX_FRAGMENT_BYTES];
    fragment.signature_fragment[..signature.len()].copy_from_slice(&signature);
    Ok(())
}

/// Falcon path: detached signature over the raw tbsData bytes, split into
/// contiguous fragments of the clamped size, each zero-padded to the
/// datagram budget.
pub fn sign_falcon(
    template: &SpduFragment,
    secret_key: &falcon512::SecretKey,
    requested_fragment_size: usize,
) -> Result<Vec<SpduFragment>, SignError> {
    let message = wire::encode_tbs_data(&template.signed_data.tbs_data);
    let signature = crypto::falcon_sign(&message, secret_key);
    if signature.len() > MAX_SIGNATURE_BYTES {
        return Err(SignError::FalconOversize {
            len: signature.len(),
            cap: MAX_SIGNATURE_BYTES,
        });
    }

    let fragment_size = clamp_fragment_size(requested_fragment_size);
    let fragment_count = signature.len().div_ceil(fragment_size);

    let mut fragments = Vec::with_capacity(fragment_count);
    for index in 0..fragment_count {
        let offset = index * fragment_size;
        let length = fragment_size.min(signature.len() - offset);

        let mut fragment = *template;
        fragment.scheme = SignatureScheme::Falcon;
        fragment.fragment_index = index as u16;
        fragment.fragment_count = fragment_count as u16;
        fragment.signature_buffer_len = signature.len() as u32;
        fragment.signature_offset = offset as u32;
        fragment.fragment_len = length as u32;
        fragment.signature_fragment = [0u8; MAX_FRAGMENT_BYTES];
        fragment.signature_fragment[..length].copy_from_slice(&signature[offset..offset + length]);
        fragments.push(fragment);
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{KeyRole, KeyStore, MemoryKeyStore};
    use crate::types::message_key;

    fn test_bsm() -> Bsm {
        Bsm {
            latitude: 42.0,
            longitude: -77.0,
            elevation: 100.0,
            speed_kph: 30.0,
            heading_degrees: 90.0,
        }
    }

    fn test_certificate() -> Certificate {
        Certificate {
            version: 3,
            issuer_id: [0; 8],
            craca_id: [0; 3],
            crl_series: 0,
            validity_start_us: 0,
            validity_duration_s: 604_800,
            curve_point_type: 2,
            verification_key: [0x11; 33],
        }
    }

    #[test]
    fn fragment_size_is_clamped() {
        assert_eq!(clamp_fragment_size(0), MAX_FRAGMENT_BYTES);
        assert_eq!(clamp_fragment_size(128), 128);
        assert_eq!(clamp_fragment_size(512), 512);
        assert_eq!(clamp_fragment_size(4096), MAX_FRAGMENT_BYTES);
    }

    #[test]
    fn ecdsa_signing_emits_one_self_consistent_fragment() {
        let store = MemoryKeyStore::generate(&[0]);
        let cert_key = store.signing_key(0, KeyRole::Certificate).unwrap();
        let message_sign_key = store.signing_key(0, KeyRole::Message).unwrap();

        let mut fragment =
            build_template(0, 5, test_bsm(), test_certificate(), &cert_key).unwrap();
        sign_ecdsa(&mut fragment, &message_sign_key).unwrap();

        assert_eq!(fragment.scheme, SignatureScheme::Ecdsa);
        assert_eq!(fragment.fragment_count, 1);
        assert_eq!(fragment.fragment_index, 0);
        assert_eq!(fragment.signature_offset, 0);
        assert_eq!(fragment.fragment_len, fragment.signature_buffer_len);
        assert!(fragment.signature_buffer_len as usize <= MAX_FRAGMENT_BYTES);
        // Trailing bytes past the signature stay zero.
        assert!(fragment.signature_fragment[fragment.fragment_len as usize..]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn falcon_fragments_partition_the_signature() {
        let store = MemoryKeyStore::generate(&[0]);
        let cert_key = store.signing_key(0, KeyRole::Certificate).unwrap();
        let falcon_key = store.falcon_secret_key(0).unwrap();

        let template = build_template(0, 0, test_bsm(), test_certificate(), &cert_key).unwrap();
        let fragments = sign_falcon(&template, &falcon_key, 256).unwrap();

        let total = fragments[0].signature_buffer_len as usize;
        assert_eq!(fragments.len(), total.div_ceil(256));
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.fragment_index as usize, i);
            assert_eq!(fragment.signature_offset as usize, i * 256);
            assert_eq!(fragment.fragment_count as usize, fragments.len());
            assert_eq!(fragment.signature_buffer_len as usize, total);
            assert!(
                fragment.signature_offset + fragment.fragment_len
                    <= fragment.signature_buffer_len
            );
        }
        let last = fragments.last().unwrap();
        assert_eq!(
            last.signature_offset as usize + last.fragment_len as usize,
            total
        );
    }

    #[test]
    fn certificate_signature_is_shared_across_fragments() {
        let store = MemoryKeyStore::generate(&[1]);
        let cert_key = store.signing_key(1, KeyRole::Certificate).unwrap();
        let falcon_key = store.falcon_secret_key(1).unwrap();

        let template = build_template(1, 7, test_bsm(), test_certificate(), &cert_key).unwrap();
        let fragments = sign_falcon(&template, &falcon_key, 128).unwrap();

        assert!(fragments.len() > 1);
        let first = &fragments[0];
        for fragment in &fragments[1..] {
            assert_eq!(fragment.certificate_signature(), first.certificate_signature());
            assert_eq!(fragment.signed_data, first.signed_data);
            assert_eq!(
                message_key(fragment.vehicle_id, fragment.sequence_number),
                message_key(first.vehicle_id, first.sequence_number)
            );
        }
    }

    #[test]
    fn certificate_signature_verifies_against_certificate_digest() {
        let store = MemoryKeyStore::generate(&[2]);
        let cert_key = store.signing_key(2, KeyRole::Certificate).unwrap();
        let fragment = build_template(2, 0, test_bsm(), test_certificate(), &cert_key).unwrap();

        let digest = crypto::sha256_digest(&wire::encode_certificate(
            &fragment.signed_data.certificate,
        ));
        let verifying = store.verifying_key(2, KeyRole::Certificate).unwrap();
        assert!(crypto::ecdsa_verify_digest(
            &verifying,
            &digest,
            fragment.certificate_signature()
        ));
    }
}
