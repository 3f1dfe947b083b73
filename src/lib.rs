//! V2X message-security simulator core.
//!
//! Models broadcast of Basic Safety Messages between vehicles over UDP,
//! signed with either classical ECDSA P-256 or post-quantum Falcon-512.
//! Falcon signatures exceed a single datagram's signature budget, so they
//! are fragmented on the way out and reassembled before verification.

pub mod bsm;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod gui;
pub mod keystore;
pub mod metrics;
pub mod reassembly;
pub mod receiver;
pub mod spdu;
pub mod types;
pub mod vehicle;
pub mod verify;
pub mod wire;

pub use config::{PqcOptions, SimConfig};
pub use error::SimError;
pub use keystore::{FileKeyStore, KeyRole, KeyStore, MemoryKeyStore};
pub use reassembly::{CompletedSpdu, IngestOutcome, ReassemblyTable};
pub use types::{Bsm, SignatureScheme, SpduFragment};
pub use vehicle::{TransmitConfig, Vehicle};
pub use verify::VerificationReport;
