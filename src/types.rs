use chrono::{DateTime, Utc};

/// Maximum signature bytes carried by a single datagram fragment.
pub const MAX_FRAGMENT_BYTES: usize = 512;

/// Upper bound on a full (reassembled) signature buffer.
pub const MAX_SIGNATURE_BYTES: usize = 1536;

/// Upper bound on a DER-encoded ECDSA P-256 signature.
pub const CERT_SIGNATURE_CAP: usize = 72;

/// Maximum age of an SPDU before the freshness check rejects it.
pub const RECENCY_WINDOW_MS: i64 = 30_000;

/// IEEE 802.2 LLC framing constants carried in every fragment.
pub const LLC_DSAP_SSAP: u16 = 0xAAAA;
pub const LLC_CONTROL: u8 = 3;
pub const LLC_TYPE: u16 = 0x88DC;

/// WSMP framing constants carried in every fragment.
pub const WSMP_N_SUBTYPE_OPT_VERSION: u8 = 3;
pub const WSMP_N_TPID: u8 = 0;
pub const WSMP_T_HEADER_LENGTH_AND_PSID: u8 = 32;
pub const WSMP_T_LENGTH: u8 = 0;

/// Payload signature scheme declared by each SPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Ecdsa,
    Falcon,
}

impl SignatureScheme {
    pub fn as_u8(&self) -> u8 {
        match self {
            SignatureScheme::Ecdsa => 0,
            SignatureScheme::Falcon => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SignatureScheme::Ecdsa),
            1 => Some(SignatureScheme::Falcon),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignatureScheme::Ecdsa => "ECDSA",
            SignatureScheme::Falcon => "Falcon",
        }
    }
}

/// Basic Safety Message: vehicle location and kinematic state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bsm {
    pub latitude: f32,
    pub longitude: f32,
    pub elevation: f32,
    /// Kilometers per hour, >= 0.
    pub speed_kph: f32,
    /// Degrees, in [0, 360).
    pub heading_degrees: f32,
}

/// SPDU header: wall-clock instant of assembly, microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub timestamp: DateTime<Utc>,
}

/// Byte length of the certificate wire image.
pub const CERTIFICATE_BYTES: usize = 60;

/// ECDSA explicit certificate carrying the signer's public key material.
///
/// Structurally mimics an IEEE 1609.2 explicit certificate; the core treats
/// it as an opaque 60-byte region except to hash it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Certificate {
    pub version: u8,
    pub issuer_id: [u8; 8],
    pub craca_id: [u8; 3],
    pub crl_series: u16,
    /// Microseconds since the Unix epoch.
    pub validity_start_us: i64,
    /// Seconds from validity start.
    pub validity_duration_s: u32,
    /// SEC1 point tag of the verification key (0x02 or 0x03, compressed).
    pub curve_point_type: u8,
    /// Compressed P-256 verification key.
    pub verification_key: [u8; 33],
}

/// The exact region the payload signature covers: BSM plus header info.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TbsData {
    pub message: Bsm,
    pub header_info: HeaderInfo,
}

/// Signed payload replicated into every fragment of an SPDU.
///
/// The valid length of `certificate_signature` travels at fragment level
/// (`SpduFragment::certificate_signature_len`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignedData {
    pub tbs_data: TbsData,
    pub certificate: Certificate,
    pub certificate_signature: [u8; CERT_SIGNATURE_CAP],
}

/// One UDP datagram: a slice of one SPDU's signature plus the full SPDU
/// metadata and signed data, self-describing for reassembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpduFragment {
    /// Sender identity (0 <= id < 256).
    pub vehicle_id: u8,
    /// Per-sender monotonically increasing counter.
    pub sequence_number: u32,
    /// Declared payload signature scheme for this SPDU.
    pub scheme: SignatureScheme,
    /// 0 <= fragment_index < fragment_count.
    pub fragment_index: u16,
    /// Total fragments in this SPDU (>= 1).
    pub fragment_count: u16,
    /// Total bytes of the full signature buffer.
    pub signature_buffer_len: u32,
    /// Byte offset of this fragment within the full signature.
    pub signature_offset: u32,
    /// Valid bytes in `signature_fragment`.
    pub fragment_len: u32,
    /// Valid bytes of `signed_data.certificate_signature`.
    pub certificate_signature_len: u32,
    pub signed_data: SignedData,
    pub signature_fragment: [u8; MAX_FRAGMENT_BYTES],
}

impl SpduFragment {
    /// Unsigned template: all fragmentation metadata and the signature
    /// region zeroed, framing constants implied by the wire codec.
    pub fn template(vehicle_id: u8, sequence_number: u32, signed_data: SignedData) -> Self {
        Self {
            vehicle_id,
            sequence_number,
            scheme: SignatureScheme::Ecdsa,
            fragment_index: 0,
            fragment_count: 1,
            signature_buffer_len: 0,
            signature_offset: 0,
            fragment_len: 0,
            certificate_signature_len: 0,
            signed_data,
            signature_fragment: [0u8; MAX_FRAGMENT_BYTES],
        }
    }

    /// The signature bytes this fragment carries.
    pub fn signature_slice(&self) -> &[u8] {
        let len = (self.fragment_len as usize).min(MAX_FRAGMENT_BYTES);
        &self.signature_fragment[..len]
    }

    /// The valid portion of the certificate signature.
    pub fn certificate_signature(&self) -> &[u8] {
        let len = (self.certificate_signature_len as usize).min(CERT_SIGNATURE_CAP);
        &self.signed_data.certificate_signature[..len]
    }
}

/// Map key for the reassembly table.
pub fn message_key(vehicle_id: u8, sequence_number: u32) -> u64 {
    ((vehicle_id as u64) << 32) | sequence_number as u64
}
