//! Reassembly table behavior: arrival order, duplicates, partial delivery,
//! bound checks, and metadata contradiction handling.

use chrono::Utc;

use v2verifier::bsm::{Trace, TraceSample};
use v2verifier::keystore::{KeyRole, KeyStore, MemoryKeyStore};
use v2verifier::reassembly::{IngestOutcome, ReassemblyTable};
use v2verifier::spdu;
use v2verifier::types::SpduFragment;
use v2verifier::vehicle;
use v2verifier::verify;

fn trace() -> Trace {
    Trace::from_samples(vec![TraceSample {
        latitude: 42.0,
        longitude: -77.0,
        elevation: 100.0,
    }])
}

/// Falcon SPDU split at the given fragment size, with the store to verify
/// against.
fn falcon_spdu(fragment_size: usize) -> (Vec<SpduFragment>, MemoryKeyStore) {
    let store = MemoryKeyStore::generate(&[0]);
    let cert_key = store.signing_key(0, KeyRole::Certificate).unwrap();
    let signing_key = store.signing_key(0, KeyRole::Message).unwrap();
    let secret_key = store.falcon_secret_key(0).unwrap();
    let certificate = vehicle::build_certificate(0, &signing_key);
    let message = trace().bsm_at(0).unwrap();

    let template = spdu::build_template(0, 0, message, certificate, &cert_key).unwrap();
    let fragments = spdu::sign_falcon(&template, &secret_key, fragment_size).unwrap();
    (fragments, store)
}

#[test]
fn out_of_order_delivery_completes_on_the_last_index() {
    let (fragments, store) = falcon_spdu(256);
    assert_eq!(fragments.len(), 3, "Falcon-512 at 256 bytes is 3 fragments");

    let mut table = ReassemblyTable::new();
    let now = Utc::now();

    assert_eq!(table.ingest(&fragments[2], now), IngestOutcome::Stored);
    assert_eq!(table.ingest(&fragments[0], now), IngestOutcome::Stored);
    match table.ingest(&fragments[1], now) {
        IngestOutcome::Completed(completed) => {
            let report = verify::verify_completed(&completed, &store).unwrap();
            assert!(report.is_valid());
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(table.pending_len(), 0);
}

#[test]
fn every_arrival_permutation_yields_the_same_verdict() {
    let (fragments, store) = falcon_spdu(256);
    assert_eq!(fragments.len(), 3);

    for order in [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ] {
        let mut table = ReassemblyTable::new();
        let now = Utc::now();
        let mut completed = None;
        for &index in &order {
            if let IngestOutcome::Completed(spdu) = table.ingest(&fragments[index], now) {
                completed = Some(spdu);
            }
        }
        let completed = completed.unwrap_or_else(|| panic!("order {:?} never completed", order));
        let report = verify::verify_completed(&completed, &store).unwrap();
        assert!(report.is_valid(), "order {:?} failed verification", order);
    }
}

#[test]
fn duplicate_fragments_are_discarded_and_harmless() {
    let (fragments, store) = falcon_spdu(256);
    let mut table = ReassemblyTable::new();
    let now = Utc::now();

    assert_eq!(table.ingest(&fragments[0], now), IngestOutcome::Stored);
    assert_eq!(table.ingest(&fragments[0], now), IngestOutcome::Duplicate);
    assert_eq!(table.ingest(&fragments[1], now), IngestOutcome::Stored);
    assert_eq!(table.ingest(&fragments[1], now), IngestOutcome::Duplicate);

    match table.ingest(&fragments[2], now) {
        IngestOutcome::Completed(completed) => {
            let report = verify::verify_completed(&completed, &store).unwrap();
            assert!(report.is_valid(), "duplicates corrupted the buffer");
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn a_permanently_lost_fragment_leaves_a_pending_entry() {
    let (fragments, _store) = falcon_spdu(128);
    assert!(fragments.len() >= 4, "128-byte fragments give at least 4");

    let mut table = ReassemblyTable::new();
    let now = Utc::now();

    // Index 2 never arrives, original or retry.
    for (index, fragment) in fragments.iter().enumerate() {
        if index == 2 {
            continue;
        }
        assert_eq!(table.ingest(fragment, now), IngestOutcome::Stored);
    }
    assert_eq!(table.pending_len(), 1, "incomplete SPDU stays pending");
}

#[test]
fn oversized_offsets_are_silently_ignored() {
    let (fragments, store) = falcon_spdu(256);
    let mut table = ReassemblyTable::new();
    let now = Utc::now();

    assert_eq!(table.ingest(&fragments[0], now), IngestOutcome::Stored);

    // A fragment claiming a slice past the end of the signature buffer is
    // dropped without storing its index.
    let mut rogue = fragments[1];
    rogue.signature_offset = rogue.signature_buffer_len - 1;
    assert_eq!(table.ingest(&rogue, now), IngestOutcome::OutOfBounds);

    let mut rogue = fragments[1];
    rogue.fragment_len = rogue.signature_buffer_len; // offset 256 + full length
    assert_eq!(table.ingest(&rogue, now), IngestOutcome::OutOfBounds);

    // The honest fragments still complete the SPDU afterwards.
    assert_eq!(table.ingest(&fragments[1], now), IngestOutcome::Stored);
    match table.ingest(&fragments[2], now) {
        IngestOutcome::Completed(completed) => {
            let report = verify::verify_completed(&completed, &store).unwrap();
            assert!(report.is_valid());
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn contradicting_metadata_is_rejected() {
    let (fragments, _store) = falcon_spdu(256);
    let mut table = ReassemblyTable::new();
    let now = Utc::now();

    assert_eq!(table.ingest(&fragments[0], now), IngestOutcome::Stored);

    let mut forged = fragments[1];
    forged.fragment_count += 1;
    assert_eq!(table.ingest(&forged, now), IngestOutcome::Contradiction);

    let mut forged = fragments[1];
    forged.signed_data.tbs_data.message.latitude += 1.0;
    assert_eq!(table.ingest(&forged, now), IngestOutcome::Contradiction);

    // The honest fragment is still accepted.
    assert_eq!(table.ingest(&fragments[1], now), IngestOutcome::Stored);
}

#[test]
fn a_completed_spdu_can_be_recreated_by_late_fragments() {
    // The sender never reuses a (vehicle, sequence) pair, so this only
    // happens under replay; the table simply starts a fresh entry.
    let (fragments, _store) = falcon_spdu(256);
    let mut table = ReassemblyTable::new();
    let now = Utc::now();

    for fragment in &fragments[..2] {
        table.ingest(fragment, now);
    }
    assert!(matches!(
        table.ingest(&fragments[2], now),
        IngestOutcome::Completed(_)
    ));
    assert_eq!(table.pending_len(), 0);

    assert_eq!(table.ingest(&fragments[0], now), IngestOutcome::Stored);
    assert_eq!(table.pending_len(), 1);
}
