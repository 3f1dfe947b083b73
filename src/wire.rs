//! Explicit wire serialization for SPDU fragments.
//!
//! Every field is fixed-width little-endian with no padding, so datagrams
//! are portable across endianness and ABI. Both sides of the link share
//! this one layout; the receiver rejects anything that does not decode.

use chrono::DateTime;

use crate::error::WireError;
use crate::types::{
    Bsm, Certificate, HeaderInfo, SignatureScheme, SignedData, SpduFragment, TbsData,
    CERTIFICATE_BYTES, CERT_SIGNATURE_CAP, LLC_CONTROL, LLC_DSAP_SSAP, LLC_TYPE,
    MAX_FRAGMENT_BYTES, MAX_SIGNATURE_BYTES, WSMP_N_SUBTYPE_OPT_VERSION, WSMP_N_TPID,
    WSMP_T_HEADER_LENGTH_AND_PSID, WSMP_T_LENGTH,
};

/// Wire length of the tbsData region: five f32 fields plus an i64 timestamp.
pub const TBS_DATA_BYTES: usize = 28;

/// Wire length of one fragment datagram.
pub const FRAGMENT_WIRE_BYTES: usize = 195 + MAX_FRAGMENT_BYTES;

struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put_u16(&mut self, v: u16) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_i64(&mut self, v: i64) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.put_bytes(&v.to_le_bytes());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn get_u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn get_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.get_array())
    }

    fn get_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.get_array())
    }

    fn get_i64(&mut self) -> i64 {
        i64::from_le_bytes(self.get_array())
    }

    fn get_f32(&mut self) -> f32 {
        f32::from_le_bytes(self.get_array())
    }

    fn get_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

/// Byte image of the tbsData region: exactly what the payload signature
/// covers.
pub fn encode_tbs_data(tbs: &TbsData) -> [u8; TBS_DATA_BYTES] {
    let mut out = [0u8; TBS_DATA_BYTES];
    let mut w = ByteWriter::new(&mut out);
    w.put_f32(tbs.message.latitude);
    w.put_f32(tbs.message.longitude);
    w.put_f32(tbs.message.elevation);
    w.put_f32(tbs.message.speed_kph);
    w.put_f32(tbs.message.heading_degrees);
    w.put_i64(tbs.header_info.timestamp.timestamp_micros());
    out
}

fn decode_tbs_data(r: &mut ByteReader<'_>) -> Result<TbsData, WireError> {
    let latitude = r.get_f32();
    let longitude = r.get_f32();
    let elevation = r.get_f32();
    let speed_kph = r.get_f32();
    let heading_degrees = r.get_f32();
    let timestamp_us = r.get_i64();
    let timestamp = DateTime::from_timestamp_micros(timestamp_us)
        .ok_or(WireError::InvalidTimestamp(timestamp_us))?;
    Ok(TbsData {
        message: Bsm {
            latitude,
            longitude,
            elevation,
            speed_kph,
            heading_degrees,
        },
        header_info: HeaderInfo { timestamp },
    })
}

/// Byte image of the certificate: the region the certificate signature
/// covers.
pub fn encode_certificate(cert: &Certificate) -> [u8; CERTIFICATE_BYTES] {
    let mut out = [0u8; CERTIFICATE_BYTES];
    let mut w = ByteWriter::new(&mut out);
    w.put_u8(cert.version);
    w.put_bytes(&cert.issuer_id);
    w.put_bytes(&cert.craca_id);
    w.put_u16(cert.crl_series);
    w.put_i64(cert.validity_start_us);
    w.put_u32(cert.validity_duration_s);
    w.put_u8(cert.curve_point_type);
    w.put_bytes(&cert.verification_key);
    out
}

fn decode_certificate(r: &mut ByteReader<'_>) -> Certificate {
    Certificate {
        version: r.get_u8(),
        issuer_id: r.get_array(),
        craca_id: r.get_array(),
        crl_series: r.get_u16(),
        validity_start_us: r.get_i64(),
        validity_duration_s: r.get_u32(),
        curve_point_type: r.get_u8(),
        verification_key: r.get_array(),
    }
}

/// Serialize one fragment into its datagram image.
pub fn encode_fragment(fragment: &SpduFragment) -> [u8; FRAGMENT_WIRE_BYTES] {
    let mut out = [0u8; FRAGMENT_WIRE_BYTES];
    let mut w = ByteWriter::new(&mut out);
    w.put_u8(fragment.vehicle_id);
    w.put_u32(fragment.sequence_number);
    w.put_u16(LLC_DSAP_SSAP);
    w.put_u8(LLC_CONTROL);
    w.put_u16(LLC_TYPE);
    w.put_u8(WSMP_N_SUBTYPE_OPT_VERSION);
    w.put_u8(WSMP_N_TPID);
    w.put_u8(WSMP_T_HEADER_LENGTH_AND_PSID);
    w.put_u8(WSMP_T_LENGTH);
    w.put_u8(fragment.scheme.as_u8());
    w.put_u16(fragment.fragment_index);
    w.put_u16(fragment.fragment_count);
    w.put_u32(fragment.signature_buffer_len);
    w.put_u32(fragment.signature_offset);
    w.put_u32(fragment.fragment_len);
    w.put_u32(fragment.certificate_signature_len);
    w.put_bytes(&encode_tbs_data(&fragment.signed_data.tbs_data));
    w.put_bytes(&encode_certificate(&fragment.signed_data.certificate));
    w.put_bytes(&fragment.signed_data.certificate_signature);
    w.put_bytes(&fragment.signature_fragment);
    out
}

/// Parse one datagram as a fragment, rejecting anything structurally
/// malformed. Bound checks that belong to reassembly (offset versus buffer
/// size, duplicate indices) are not performed here.
pub fn decode_fragment(datagram: &[u8]) -> Result<SpduFragment, WireError> {
    if datagram.len() != FRAGMENT_WIRE_BYTES {
        return Err(WireError::Truncated {
            len: datagram.len(),
            expected: FRAGMENT_WIRE_BYTES,
        });
    }

    let mut r = ByteReader::new(datagram);
    let vehicle_id = r.get_u8();
    let sequence_number = r.get_u32();

    let framing_ok = r.get_u16() == LLC_DSAP_SSAP
        && r.get_u8() == LLC_CONTROL
        && r.get_u16() == LLC_TYPE
        && r.get_u8() == WSMP_N_SUBTYPE_OPT_VERSION
        && r.get_u8() == WSMP_N_TPID
        && r.get_u8() == WSMP_T_HEADER_LENGTH_AND_PSID
        && r.get_u8() == WSMP_T_LENGTH;
    if !framing_ok {
        return Err(WireError::BadFraming);
    }

    let scheme_byte = r.get_u8();
    let scheme =
        SignatureScheme::from_u8(scheme_byte).ok_or(WireError::UnknownScheme(scheme_byte))?;
    let fragment_index = r.get_u16();
    let fragment_count = r.get_u16();
    let signature_buffer_len = r.get_u32();
    let signature_offset = r.get_u32();
    let fragment_len = r.get_u32();
    let certificate_signature_len = r.get_u32();

    if fragment_count == 0 {
        return Err(WireError::ZeroFragmentCount);
    }
    if fragment_index >= fragment_count {
        return Err(WireError::IndexOutOfRange {
            index: fragment_index,
            count: fragment_count,
        });
    }
    if signature_buffer_len as usize > MAX_SIGNATURE_BYTES {
        return Err(WireError::OversizeSignatureBuffer(signature_buffer_len));
    }
    if fragment_len as usize > MAX_FRAGMENT_BYTES {
        return Err(WireError::OversizeFragment(fragment_len));
    }
    if certificate_signature_len as usize > CERT_SIGNATURE_CAP {
        return Err(WireError::OversizeCertificateSignature(
            certificate_signature_len,
        ));
    }
    if scheme == SignatureScheme::Ecdsa
        && (fragment_count != 1
            || signature_offset != 0
            || signature_buffer_len as usize > MAX_FRAGMENT_BYTES)
    {
        return Err(WireError::EcdsaFragmentation);
    }

    let tbs_data = decode_tbs_data(&mut r)?;
    let certificate = decode_certificate(&mut r);
    let certificate_signature: [u8; CERT_SIGNATURE_CAP] = r.get_array();
    let signature_fragment: [u8; MAX_FRAGMENT_BYTES] = r.get_array();

    Ok(SpduFragment {
        vehicle_id,
        sequence_number,
        scheme,
        fragment_index,
        fragment_count,
        signature_buffer_len,
        signature_offset,
        fragment_len,
        certificate_signature_len,
        signed_data: SignedData {
            tbs_data,
            certificate,
            certificate_signature,
        },
        signature_fragment,
    })
}
