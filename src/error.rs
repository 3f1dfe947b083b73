use std::fmt;
use std::io;

/// Configuration errors: bad argv, unparseable environment, missing or
/// malformed config document. Always fatal.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: String, source: io::Error },
    Parse { path: String, detail: String },
    InvalidValue { key: String, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path, source)
            }
            ConfigError::Parse { path, detail } => {
                write!(f, "cannot parse config {}: {}", path, detail)
            }
            ConfigError::InvalidValue { key, detail } => {
                write!(f, "invalid config value for {}: {}", key, detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Key material loading errors. Always fatal: the process cannot proceed
/// without keys.
#[derive(Debug)]
pub enum KeyStoreError {
    Io { path: String, source: io::Error },
    Decode { path: String, detail: String },
    LengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    UnknownVehicle { vehicle_id: u8 },
}

impl fmt::Display for KeyStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStoreError::Io { path, source } => {
                write!(f, "cannot read key file {}: {}", path, source)
            }
            KeyStoreError::Decode { path, detail } => {
                write!(f, "cannot decode key file {}: {}", path, detail)
            }
            KeyStoreError::LengthMismatch {
                path,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "unexpected key length in {}: expected {} bytes, got {}",
                    path, expected, actual
                )
            }
            KeyStoreError::UnknownVehicle { vehicle_id } => {
                write!(f, "no key material for vehicle {}", vehicle_id)
            }
        }
    }
}

impl std::error::Error for KeyStoreError {}

/// Trace file loading errors. Always fatal.
#[derive(Debug)]
pub enum TraceError {
    Io { path: String, source: io::Error },
    Malformed {
        path: String,
        line: usize,
        detail: String,
    },
    Empty { path: String },
    /// More messages were requested than the trace has timesteps.
    Exhausted { timestep: usize, len: usize },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io { path, source } => {
                write!(f, "cannot read trace file {}: {}", path, source)
            }
            TraceError::Malformed { path, line, detail } => {
                write!(f, "malformed trace {} line {}: {}", path, line, detail)
            }
            TraceError::Empty { path } => write!(f, "trace file {} has no samples", path),
            TraceError::Exhausted { timestep, len } => {
                write!(f, "timestep {} beyond trace of {} samples", timestep, len)
            }
        }
    }
}

impl std::error::Error for TraceError {}

/// Signing-primitive errors. Fatal at the sender.
#[derive(Debug)]
pub enum SignError {
    /// DER ECDSA signature does not fit a single fragment.
    EcdsaOversize { len: usize, cap: usize },
    /// The ECDSA backend refused to sign.
    EcdsaFailure(String),
    /// Falcon signature exceeds the total signature budget.
    FalconOversize { len: usize, cap: usize },
    /// Signing was requested for a scheme the vehicle has no key for.
    MissingFalconKey { vehicle_id: u8 },
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignError::EcdsaOversize { len, cap } => {
                write!(f, "ECDSA signature of {} bytes exceeds {} byte cap", len, cap)
            }
            SignError::EcdsaFailure(detail) => write!(f, "ECDSA signing failed: {}", detail),
            SignError::FalconOversize { len, cap } => {
                write!(f, "Falcon signature of {} bytes exceeds {} byte cap", len, cap)
            }
            SignError::MissingFalconKey { vehicle_id } => {
                write!(f, "vehicle {} has no Falcon private key loaded", vehicle_id)
            }
        }
    }
}

impl std::error::Error for SignError {}

/// Reasons a datagram fails to decode as an SPDU fragment.
///
/// A wire error never aborts the receiver: the datagram is dropped and
/// counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Truncated { len: usize, expected: usize },
    BadFraming,
    UnknownScheme(u8),
    ZeroFragmentCount,
    IndexOutOfRange { index: u16, count: u16 },
    OversizeSignatureBuffer(u32),
    OversizeFragment(u32),
    OversizeCertificateSignature(u32),
    EcdsaFragmentation,
    InvalidTimestamp(i64),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated { len, expected } => {
                write!(f, "datagram of {} bytes, expected {}", len, expected)
            }
            WireError::BadFraming => write!(f, "LLC/WSMP framing constants do not match"),
            WireError::UnknownScheme(byte) => write!(f, "unknown scheme byte {:#04x}", byte),
            WireError::ZeroFragmentCount => write!(f, "fragment count is zero"),
            WireError::IndexOutOfRange { index, count } => {
                write!(f, "fragment index {} not below count {}", index, count)
            }
            WireError::OversizeSignatureBuffer(len) => {
                write!(f, "signature buffer length {} exceeds budget", len)
            }
            WireError::OversizeFragment(len) => {
                write!(f, "fragment length {} exceeds budget", len)
            }
            WireError::OversizeCertificateSignature(len) => {
                write!(f, "certificate signature length {} exceeds budget", len)
            }
            WireError::EcdsaFragmentation => {
                write!(f, "ECDSA SPDU violates the single-fragment invariant")
            }
            WireError::InvalidTimestamp(us) => {
                write!(f, "header timestamp {} out of range", us)
            }
        }
    }
}

impl std::error::Error for WireError {}

/// Top-level fatal error for the binary.
#[derive(Debug)]
pub enum SimError {
    Config(ConfigError),
    KeyStore(KeyStoreError),
    Trace(TraceError),
    Sign(SignError),
    Socket(io::Error),
    Metrics(io::Error),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(e) => write!(f, "{}", e),
            SimError::KeyStore(e) => write!(f, "{}", e),
            SimError::Trace(e) => write!(f, "{}", e),
            SimError::Sign(e) => write!(f, "{}", e),
            SimError::Socket(e) => write!(f, "socket error: {}", e),
            SimError::Metrics(e) => write!(f, "cannot write metrics: {}", e),
        }
    }
}

impl std::error::Error for SimError {}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Config(e)
    }
}

impl From<KeyStoreError> for SimError {
    fn from(e: KeyStoreError) -> Self {
        SimError::KeyStore(e)
    }
}

impl From<TraceError> for SimError {
    fn from(e: TraceError) -> Self {
        SimError::Trace(e)
    }
}

impl From<SignError> for SimError {
    fn from(e: SignError) -> Self {
        SimError::Sign(e)
    }
}

impl From<io::Error> for SimError {
    fn from(e: io::Error) -> Self {
        SimError::Socket(e)
    }
}
