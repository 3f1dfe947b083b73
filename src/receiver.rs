//! Receiver loop: UDP datagrams in, verified SPDUs out.
//!
//! Single-threaded; blocks in the kernel with a short read timeout so the
//! stale-entry sweep and the no-progress watchdog keep running even when
//! the link goes quiet. Terminates when the expected SPDU count completes
//! or the watchdog fires.

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use colored::*;

use crate::display;
use crate::error::SimError;
use crate::gui::{GuiForwarder, GuiMode};
use crate::keystore::KeyStore;
use crate::metrics::{MetricsConfig, RunMetrics};
use crate::reassembly::{IngestOutcome, ReassemblyTable};
use crate::types::SignatureScheme;
use crate::verify;
use crate::wire::{self, FRAGMENT_WIRE_BYTES};

/// The receiver stops once this long passes without a completed SPDU.
pub const NO_PROGRESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Socket read timeout; bounds how often the sweep and watchdog run.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Receive-side parameters for one run.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub bind_port: u16,
    /// SPDUs to wait for: num_messages x num_vehicles.
    pub expected_total: u32,
    /// Configured scheme, recorded in metrics.
    pub scheme: SignatureScheme,
    pub gui: GuiMode,
    pub metrics: MetricsConfig,
    pub watchdog: Duration,
}

impl ReceiverConfig {
    pub fn new(bind_port: u16, expected_total: u32, scheme: SignatureScheme) -> Self {
        Self {
            bind_port,
            expected_total,
            scheme,
            gui: GuiMode::None,
            metrics: MetricsConfig {
                path: None,
                run_id: "0".to_string(),
                note: String::new(),
            },
            watchdog: NO_PROGRESS_TIMEOUT,
        }
    }
}

/// Datagrams the loop ignored, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveAnomalies {
    pub undecodable: u64,
    pub duplicates: u64,
    pub out_of_bounds: u64,
    pub contradictions: u64,
    /// Stale reassembly entries dropped by the sweep.
    pub evicted: u64,
}

/// What a receiver run saw and produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub completed: u32,
    pub valid: u32,
    pub anomalies: ReceiveAnomalies,
    pub metrics: Option<RunMetrics>,
    pub watchdog_fired: bool,
    /// Reassembly entries still incomplete at exit.
    pub pending_left: usize,
}

/// Bind the configured port and run to completion.
pub fn run(config: &ReceiverConfig, keys: &dyn KeyStore) -> Result<RunSummary, SimError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.bind_port))?;
    run_on_socket(config, keys, &socket)
}

/// Receive loop over an already-bound socket.
pub fn run_on_socket(
    config: &ReceiverConfig,
    keys: &dyn KeyStore,
    socket: &UdpSocket,
) -> Result<RunSummary, SimError> {
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    let gui = GuiForwarder::new(config.gui)?;

    let mut table = ReassemblyTable::new();
    let mut anomalies = ReceiveAnomalies::default();
    let mut completed: u32 = 0;
    let mut valid: u32 = 0;
    let mut first_fragment_at: Option<DateTime<Utc>> = None;
    let mut last_completion_at: Option<DateTime<Utc>> = None;
    let mut last_progress = Instant::now();
    let mut watchdog_fired = false;
    let mut buf = [0u8; FRAGMENT_WIRE_BYTES];

    while completed < config.expected_total {
        match socket.recv_from(&mut buf) {
            Ok((len, _peer)) => {
                let received_at = Utc::now();
                if first_fragment_at.is_none() {
                    first_fragment_at = Some(received_at);
                    last_progress = Instant::now();
                }

                let fragment = match wire::decode_fragment(&buf[..len]) {
                    Ok(fragment) => fragment,
                    Err(_) => {
                        anomalies.undecodable += 1;
                        continue;
                    }
                };

                match table.ingest(&fragment, received_at) {
                    IngestOutcome::Completed(spdu) => {
                        let report = verify::verify_completed(&spdu, keys)?;

                        display::print_divider();
                        display::print_spdu(&spdu.spdu, &report);
                        display::print_bsm(&spdu.spdu.signed_data.tbs_data.message);
                        if let Some(gui) = &gui {
                            gui.forward(
                                &spdu.spdu.signed_data.tbs_data.message,
                                report.is_valid(),
                                spdu.spdu.vehicle_id,
                            );
                        }

                        completed += 1;
                        if report.is_valid() {
                            valid += 1;
                        }
                        last_completion_at = Some(received_at);
                        last_progress = Instant::now();
                    }
                    IngestOutcome::Stored => {}
                    IngestOutcome::Duplicate => anomalies.duplicates += 1,
                    IngestOutcome::OutOfBounds => anomalies.out_of_bounds += 1,
                    IngestOutcome::Contradiction => anomalies.contradictions += 1,
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                anomalies.evicted += table.evict_stale(Utc::now()) as u64;
            }
            Err(e) => return Err(SimError::Socket(e)),
        }

        if first_fragment_at.is_some() && last_progress.elapsed() >= config.watchdog {
            watchdog_fired = true;
            println!(
                "{} no SPDU completed in {:?}; stopping at {} of {}",
                "✗".red().bold(),
                config.watchdog,
                completed,
                config.expected_total,
            );
            break;
        }
    }

    let metrics = match (first_fragment_at, last_completion_at) {
        (Some(first), Some(last)) => {
            let metrics = RunMetrics {
                scheme: config.scheme,
                first_fragment_at: first,
                last_completion_at: last,
            };
            metrics.record(&config.metrics).map_err(SimError::Metrics)?;
            metrics.print_summary(&config.metrics);
            Some(metrics)
        }
        _ => None,
    };

    Ok(RunSummary {
        completed,
        valid,
        anomalies,
        metrics,
        watchdog_fired,
        pending_left: table.pending_len(),
    })
}
