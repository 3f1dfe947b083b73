//! Two-stage SPDU verification plus the freshness window.
//!
//! Certificate authenticity and payload authenticity are checked
//! independently; both verdicts and the freshness flag travel in the
//! report so a failure's cause stays observable. Cryptographic failures
//! become `false` flags; only key-store failures abort.

use chrono::{DateTime, Utc};

use crate::crypto;
use crate::error::KeyStoreError;
use crate::keystore::{KeyRole, KeyStore};
use crate::reassembly::CompletedSpdu;
use crate::types::{SignatureScheme, SpduFragment, RECENCY_WINDOW_MS};
use crate::wire;

/// Outcome of verifying one SPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationReport {
    /// The embedded certificate's ECDSA signature checked out.
    pub certificate_ok: bool,
    /// The payload signature checked out under the declared scheme.
    pub signature_ok: bool,
    /// The SPDU is younger than the recency window.
    pub recent: bool,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.certificate_ok && self.signature_ok && self.recent
    }
}

/// Verify a reassembled SPDU against the sender's published keys.
pub fn verify_spdu(
    spdu: &SpduFragment,
    signature: &[u8],
    received_at: DateTime<Utc>,
    keys: &dyn KeyStore,
) -> Result<VerificationReport, KeyStoreError> {
    let certificate_verifying_key = keys.verifying_key(spdu.vehicle_id, KeyRole::Certificate)?;

    let certificate_digest =
        crypto::sha256_digest(&wire::encode_certificate(&spdu.signed_data.certificate));
    let certificate_ok = crypto::ecdsa_verify_digest(
        &certificate_verifying_key,
        &certificate_digest,
        spdu.certificate_signature(),
    );

    let tbs_image = wire::encode_tbs_data(&spdu.signed_data.tbs_data);
    let signature_ok = match spdu.scheme {
        SignatureScheme::Ecdsa => {
            let verifying_key = keys.verifying_key(spdu.vehicle_id, KeyRole::Message)?;
            let digest = crypto::sha256_digest(&tbs_image);
            crypto::ecdsa_verify_digest(&verifying_key, &digest, signature)
        }
        SignatureScheme::Falcon => {
            // Falcon verifies against the message itself, not a pre-hash.
            let public_key = keys.falcon_public_key(spdu.vehicle_id)?;
            crypto::falcon_verify(&tbs_image, signature, &public_key)
        }
    };

    let age_ms = received_at
        .signed_duration_since(spdu.signed_data.tbs_data.header_info.timestamp)
        .num_milliseconds();
    let recent = age_ms < RECENCY_WINDOW_MS;

    Ok(VerificationReport {
        certificate_ok,
        signature_ok,
        recent,
    })
}

/// Convenience wrapper for a completed reassembly entry.
pub fn verify_completed(
    completed: &CompletedSpdu,
    keys: &dyn KeyStore,
) -> Result<VerificationReport, KeyStoreError> {
    verify_spdu(
        &completed.spdu,
        &completed.signature,
        completed.completed_at,
        keys,
    )
}
