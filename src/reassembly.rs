//! Receiver-side reassembly of fragmented SPDU signatures.
//!
//! Entries are created lazily on the first fragment of a (vehicle,
//! sequence) pair and destroyed on completion. The first fragment fixes the
//! entry's template and shared metadata; later fragments that contradict it
//! are ignored. Entries that never complete are evicted once older than the
//! recency window.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{message_key, SpduFragment, MAX_FRAGMENT_BYTES, RECENCY_WINDOW_MS};

/// A fully reassembled SPDU ready for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSpdu {
    /// Template fragment: metadata and signed data, signature region zeroed.
    pub spdu: SpduFragment,
    /// The reconstructed signature buffer.
    pub signature: Vec<u8>,
    pub first_fragment_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// What the table did with one incoming fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Stored; the SPDU is still incomplete.
    Stored,
    /// This fragment completed the SPDU.
    Completed(CompletedSpdu),
    /// The fragment's index was already received; ignored.
    Duplicate,
    /// Index or signature slice falls outside the entry's buffer; ignored.
    OutOfBounds,
    /// Shared metadata contradicts the first fragment of this SPDU; ignored.
    Contradiction,
}

struct PendingSpdu {
    template: SpduFragment,
    signature_buffer: Vec<u8>,
    fragments_received: Vec<bool>,
    first_fragment_at: DateTime<Utc>,
}

impl PendingSpdu {
    fn new(fragment: &SpduFragment, received_at: DateTime<Utc>) -> Self {
        let mut template = *fragment;
        template.fragment_index = 0;
        template.fragment_len = 0;
        template.signature_fragment = [0u8; MAX_FRAGMENT_BYTES];
        Self {
            template,
            signature_buffer: vec![0u8; fragment.signature_buffer_len as usize],
            fragments_received: vec![false; fragment.fragment_count as usize],
            first_fragment_at: received_at,
        }
    }

    /// Shared metadata every fragment of one SPDU must agree on.
    fn matches(&self, fragment: &SpduFragment) -> bool {
        self.template.scheme == fragment.scheme
            && self.template.fragment_count == fragment.fragment_count
            && self.template.signature_buffer_len == fragment.signature_buffer_len
            && self.template.certificate_signature_len == fragment.certificate_signature_len
            && self.template.signed_data == fragment.signed_data
    }

    fn is_complete(&self) -> bool {
        self.fragments_received.iter().all(|&received| received)
    }
}

/// Per-(vehicle, sequence) reassembly state.
#[derive(Default)]
pub struct ReassemblyTable {
    pending: HashMap<u64, PendingSpdu>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one decoded fragment through the table.
    pub fn ingest(&mut self, fragment: &SpduFragment, received_at: DateTime<Utc>) -> IngestOutcome {
        let key = message_key(fragment.vehicle_id, fragment.sequence_number);
        let entry = self
            .pending
            .entry(key)
            .or_insert_with(|| PendingSpdu::new(fragment, received_at));

        if !entry.matches(fragment) {
            return IngestOutcome::Contradiction;
        }

        let index = fragment.fragment_index as usize;
        if index >= entry.fragments_received.len() {
            return IngestOutcome::OutOfBounds;
        }
        if entry.fragments_received[index] {
            return IngestOutcome::Duplicate;
        }

        let offset = fragment.signature_offset as usize;
        let length = fragment.fragment_len as usize;
        if length > MAX_FRAGMENT_BYTES || offset + length > entry.signature_buffer.len() {
            return IngestOutcome::OutOfBounds;
        }

        entry.signature_buffer[offset..offset + length]
            .copy_from_slice(&fragment.signature_fragment[..length]);
        entry.fragments_received[index] = true;

        if !entry.is_complete() {
            return IngestOutcome::Stored;
        }

        let entry = self
            .pending
            .remove(&key)
            .expect("entry present: it was just updated");
        IngestOutcome::Completed(CompletedSpdu {
            spdu: entry.template,
            signature: entry.signature_buffer,
            first_fragment_at: entry.first_fragment_at,
            completed_at: received_at,
        })
    }

    /// Drop entries whose first fragment is older than the recency window;
    /// they can no longer verify as fresh even if they complete.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, entry| {
            now.signed_duration_since(entry.first_fragment_at)
                .num_milliseconds()
                < RECENCY_WINDOW_MS
        });
        before - self.pending.len()
    }
}
