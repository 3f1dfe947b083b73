//! Per-vehicle state and the transmit loop.
//!
//! Each vehicle owns its identity, signing keys, certificate, and trace.
//! The transmitter runs one OS thread per vehicle; each thread owns its own
//! socket and RNG, so no state is shared between senders.

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use colored::*;
use p256::ecdsa::SigningKey;
use pqcrypto_falcon::falcon512;
use rand::Rng;

use crate::bsm::Trace;
use crate::config::PqcOptions;
use crate::crypto;
use crate::error::{SignError, SimError, TraceError};
use crate::keystore::{KeyRole, KeyStore};
use crate::spdu;
use crate::types::{Certificate, SignatureScheme, SpduFragment};
use crate::wire;

/// Pause between SPDUs of one sender.
pub const MESSAGE_CADENCE: Duration = Duration::from_millis(100);

/// Pause before the single retry burst.
pub const RESEND_DELAY: Duration = Duration::from_millis(5);

const CERTIFICATE_VALIDITY_S: u32 = 604_800;

/// Transmit-side parameters for one run.
#[derive(Debug, Clone)]
pub struct TransmitConfig {
    pub target: SocketAddr,
    pub num_msgs: u16,
    /// Per-fragment drop probability in [0, 1], applied independently to
    /// the first pass and the retry.
    pub loss_rate: f64,
    pub cadence: Duration,
    pub resend_delay: Duration,
}

impl TransmitConfig {
    pub fn new(target: SocketAddr, num_msgs: u16, loss_rate: f64) -> Self {
        Self {
            target,
            num_msgs,
            loss_rate,
            cadence: MESSAGE_CADENCE,
            resend_delay: RESEND_DELAY,
        }
    }
}

/// Per-run transmit accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub sent_datagrams: u64,
    pub dropped_fragments: u64,
    pub resent_fragments: u64,
    /// Fragments dropped on both attempts; the receiver will never see them.
    pub lost_fragments: u64,
}

/// One simulated vehicle: identity, key material, certificate, and trace.
pub struct Vehicle {
    id: u8,
    options: PqcOptions,
    trace: Trace,
    certificate: Certificate,
    signing_key: SigningKey,
    certificate_signing_key: SigningKey,
    falcon_secret_key: Option<falcon512::SecretKey>,
}

impl Vehicle {
    /// Pull this vehicle's key material from the store and mint its
    /// certificate. The Falcon secret key is only loaded when the run
    /// signs with Falcon.
    pub fn provision(
        id: u8,
        options: PqcOptions,
        trace: Trace,
        keys: &dyn KeyStore,
    ) -> Result<Self, SimError> {
        let signing_key = keys.signing_key(id, KeyRole::Message)?;
        let certificate_signing_key = keys.signing_key(id, KeyRole::Certificate)?;
        let falcon_secret_key = match options.scheme {
            SignatureScheme::Falcon => Some(keys.falcon_secret_key(id)?),
            SignatureScheme::Ecdsa => None,
        };
        let certificate = build_certificate(id, &signing_key);
        Ok(Self {
            id,
            options,
            trace,
            certificate,
            signing_key,
            certificate_signing_key,
            falcon_secret_key,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Build and sign the SPDU for one sequence number. Timestep and
    /// sequence number coincide by design.
    pub fn prepare_signed_fragments(
        &self,
        sequence_number: u32,
    ) -> Result<Vec<SpduFragment>, SimError> {
        let timestep = sequence_number as usize;
        let message = self
            .trace
            .bsm_at(timestep)
            .ok_or(SimError::Trace(TraceError::Exhausted {
                timestep,
                len: self.trace.len(),
            }))?;

        let mut template = spdu::build_template(
            self.id,
            sequence_number,
            message,
            self.certificate,
            &self.certificate_signing_key,
        )?;

        match self.options.scheme {
            SignatureScheme::Ecdsa => {
                spdu::sign_ecdsa(&mut template, &self.signing_key)?;
                Ok(vec![template])
            }
            SignatureScheme::Falcon => {
                let secret_key = self
                    .falcon_secret_key
                    .as_ref()
                    .ok_or(SimError::Sign(SignError::MissingFalconKey {
                        vehicle_id: self.id,
                    }))?;
                Ok(spdu::sign_falcon(
                    &template,
                    secret_key,
                    self.options.falcon_fragment_size,
                )?)
            }
        }
    }

    /// Drive the full transmit loop on a fresh socket and RNG.
    pub fn transmit(&self, config: &TransmitConfig) -> Result<TransmitStats, SimError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        let mut rng = rand::thread_rng();
        let stats = self.transmit_with(config, &socket, &mut rng)?;

        if config.loss_rate > 0.0 {
            println!(
                "{} vehicle {} dropped {} fragments at configured rate {} (resent: {}, lost: {})",
                "→".yellow(),
                self.id,
                stats.dropped_fragments,
                config.loss_rate,
                stats.resent_fragments,
                stats.lost_fragments,
            );
        }
        Ok(stats)
    }

    /// Transmit loop body with the socket and RNG injected.
    ///
    /// Per message: every fragment draws the loss probability once; dropped
    /// fragments go to the resend queue, sent in one burst after a short
    /// delay. The retry draws loss again, so a fragment survives with
    /// probability 1 - p^2. OS-level send failures are fatal on both passes.
    pub fn transmit_with(
        &self,
        config: &TransmitConfig,
        socket: &UdpSocket,
        rng: &mut impl Rng,
    ) -> Result<TransmitStats, SimError> {
        let mut stats = TransmitStats::default();

        for sequence_number in 0..config.num_msgs as u32 {
            let fragments = self.prepare_signed_fragments(sequence_number)?;

            let mut resend_queue: Vec<&SpduFragment> = Vec::new();
            for fragment in &fragments {
                if should_drop(rng, config.loss_rate) {
                    stats.dropped_fragments += 1;
                    resend_queue.push(fragment);
                    continue;
                }
                socket.send_to(&wire::encode_fragment(fragment), config.target)?;
                stats.sent_datagrams += 1;
            }

            if !resend_queue.is_empty() {
                thread::sleep(config.resend_delay);
                for fragment in resend_queue {
                    if should_drop(rng, config.loss_rate) {
                        stats.lost_fragments += 1;
                        continue;
                    }
                    socket.send_to(&wire::encode_fragment(fragment), config.target)?;
                    stats.sent_datagrams += 1;
                    stats.resent_fragments += 1;
                }
            }

            thread::sleep(config.cadence);
        }

        Ok(stats)
    }
}

/// One independent Uniform[0,1) draw against the configured loss rate.
pub fn should_drop(rng: &mut impl Rng, loss_rate: f64) -> bool {
    loss_rate > 0.0 && rng.gen::<f64>() < loss_rate
}

/// Mint the vehicle's explicit certificate around its compressed P-256
/// verification key.
pub fn build_certificate(id: u8, signing_key: &SigningKey) -> Certificate {
    let point = signing_key.verifying_key().to_encoded_point(true);
    let point_bytes = point.as_bytes();
    let mut verification_key = [0u8; 33];
    verification_key.copy_from_slice(point_bytes);

    let digest = crypto::sha256_digest(point_bytes);
    let mut issuer_id = [0u8; 8];
    issuer_id.copy_from_slice(&digest[..8]);

    Certificate {
        version: 3,
        issuer_id,
        craca_id: digest[8..11].try_into().expect("slice of fixed length"),
        crl_series: id as u16,
        validity_start_us: chrono::Utc::now().timestamp_micros(),
        validity_duration_s: CERTIFICATE_VALIDITY_S,
        curve_point_type: point_bytes[0],
        verification_key,
    }
}
