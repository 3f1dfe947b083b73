//! Scenario configuration: JSON document plus environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::SignatureScheme;

/// Production UDP port shared by the transmit target and the receiver bind.
pub const PRODUCTION_PORT: u16 = 52001;

/// Port used by both sides when running with `--test`.
pub const DEFAULT_TEST_PORT: u16 = 6666;

pub const CONFIG_PATH_ENV: &str = "V2X_CONFIG_PATH";
pub const SCHEME_ENV: &str = "V2X_SIGNATURE_SCHEME";
pub const FRAGMENT_BYTES_ENV: &str = "V2X_FALCON_FRAGMENT_BYTES";
pub const COMPRESSION_ENV: &str = "V2X_FALCON_COMPRESSION";
pub const TEST_PORT_ENV: &str = "V2X_TEST_PORT";
pub const LOSS_RATE_ENV: &str = "V2X_PACKET_LOSS_RATE";

/// Post-quantum signing options for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PqcOptions {
    pub scheme: SignatureScheme,
    /// Requested Falcon fragment payload size; 0 means "use maximum".
    pub falcon_fragment_size: usize,
    /// Informational label; carried through configuration but never
    /// interpreted.
    pub compression: String,
}

impl Default for PqcOptions {
    fn default() -> Self {
        Self {
            scheme: SignatureScheme::Ecdsa,
            falcon_fragment_size: 256,
            compression: "none".to_string(),
        }
    }
}

/// Fully resolved run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub num_vehicles: u8,
    pub num_messages: u16,
    pub pqc: PqcOptions,
    /// Per-fragment drop probability in [0, 1].
    pub loss_rate: f64,
    pub test_port: u16,
}

impl SimConfig {
    /// Total SPDUs the receiver waits for.
    pub fn expected_total(&self) -> u32 {
        self.num_messages as u32 * self.num_vehicles as u32
    }
}

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    scenario: ScenarioSection,
}

#[derive(Debug, Deserialize)]
struct ScenarioSection {
    #[serde(rename = "numVehicles")]
    num_vehicles: u8,
    #[serde(rename = "numMessages")]
    num_messages: u16,
    #[serde(rename = "signatureScheme")]
    signature_scheme: Option<String>,
    falcon: Option<FalconSection>,
}

#[derive(Debug, Deserialize)]
struct FalconSection {
    #[serde(rename = "fragmentBytes")]
    fragment_bytes: Option<i64>,
    compression: Option<String>,
}

/// Config document location: `V2X_CONFIG_PATH` or `./config.json`.
pub fn config_path_from_env() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"))
}

/// `falcon` selects Falcon; anything else is ECDSA. Case-insensitive.
pub fn scheme_from_label(label: &str) -> SignatureScheme {
    if label.trim().eq_ignore_ascii_case("falcon") {
        SignatureScheme::Falcon
    } else {
        SignatureScheme::Ecdsa
    }
}

pub fn clamp_loss_rate(rate: f64) -> f64 {
    if !rate.is_finite() || rate < 0.0 {
        0.0
    } else if rate > 1.0 {
        1.0
    } else {
        rate
    }
}

pub fn parse_loss_rate(text: &str) -> Result<f64, ConfigError> {
    let rate = text
        .trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::InvalidValue {
            key: LOSS_RATE_ENV.to_string(),
            detail: e.to_string(),
        })?;
    Ok(clamp_loss_rate(rate))
}

pub fn parse_port(text: &str) -> Result<u16, ConfigError> {
    let port = text
        .trim()
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidValue {
            key: TEST_PORT_ENV.to_string(),
            detail: e.to_string(),
        })?;
    if port == 0 || port > u16::MAX as u32 {
        return Err(ConfigError::InvalidValue {
            key: TEST_PORT_ENV.to_string(),
            detail: format!("port {} outside (0, 65536)", port),
        });
    }
    Ok(port as u16)
}

pub fn parse_fragment_bytes(text: &str) -> Result<usize, ConfigError> {
    text.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            key: FRAGMENT_BYTES_ENV.to_string(),
            detail: e.to_string(),
        })
}

/// Non-positive configured values mean "use maximum".
fn fragment_bytes_from_config(value: i64) -> usize {
    if value <= 0 {
        0
    } else {
        value as usize
    }
}

/// Load the JSON document and apply environment overrides.
pub fn load(path: &Path) -> Result<SimConfig, ConfigError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let document: ConfigDocument =
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: display,
            detail: e.to_string(),
        })?;

    let mut pqc = PqcOptions::default();
    if let Some(falcon) = &document.scenario.falcon {
        if let Some(bytes) = falcon.fragment_bytes {
            pqc.falcon_fragment_size = fragment_bytes_from_config(bytes);
        }
        if let Some(compression) = &falcon.compression {
            pqc.compression = compression.clone();
        }
    }
    if let Some(label) = &document.scenario.signature_scheme {
        pqc.scheme = scheme_from_label(label);
    }

    // Environment beats the document.
    if let Ok(label) = env::var(SCHEME_ENV) {
        pqc.scheme = scheme_from_label(&label);
    }
    if let Ok(text) = env::var(FRAGMENT_BYTES_ENV) {
        pqc.falcon_fragment_size = parse_fragment_bytes(&text)?;
    }
    if let Ok(label) = env::var(COMPRESSION_ENV) {
        pqc.compression = label;
    }

    let loss_rate = match env::var(LOSS_RATE_ENV) {
        Ok(text) => parse_loss_rate(&text)?,
        Err(_) => 0.0,
    };
    let test_port = match env::var(TEST_PORT_ENV) {
        Ok(text) => parse_port(&text)?,
        Err(_) => DEFAULT_TEST_PORT,
    };

    Ok(SimConfig {
        num_vehicles: document.scenario.num_vehicles,
        num_messages: document.scenario.num_messages,
        pqc,
        loss_rate,
        test_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_labels_are_case_insensitive() {
        assert_eq!(scheme_from_label("falcon"), SignatureScheme::Falcon);
        assert_eq!(scheme_from_label("FALCON"), SignatureScheme::Falcon);
        assert_eq!(scheme_from_label(" Falcon "), SignatureScheme::Falcon);
        assert_eq!(scheme_from_label("ecdsa"), SignatureScheme::Ecdsa);
        assert_eq!(scheme_from_label("anything"), SignatureScheme::Ecdsa);
    }

    #[test]
    fn loss_rate_is_clamped() {
        assert_eq!(clamp_loss_rate(-0.5), 0.0);
        assert_eq!(clamp_loss_rate(0.25), 0.25);
        assert_eq!(clamp_loss_rate(1.5), 1.0);
        assert_eq!(clamp_loss_rate(f64::NAN), 0.0);
        assert_eq!(parse_loss_rate("0.3").unwrap(), 0.3);
        assert!(parse_loss_rate("three").is_err());
    }

    #[test]
    fn ports_must_be_nonzero_u16() {
        assert_eq!(parse_port("6666").unwrap(), 6666);
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("not-a-port").is_err());
    }

    #[test]
    fn fragment_bytes_parse_and_zero_means_maximum() {
        assert_eq!(parse_fragment_bytes("256").unwrap(), 256);
        assert!(parse_fragment_bytes("-1").is_err());
        assert_eq!(fragment_bytes_from_config(-4), 0);
        assert_eq!(fragment_bytes_from_config(0), 0);
        assert_eq!(fragment_bytes_from_config(128), 128);
    }

    #[test]
    fn document_parses_with_and_without_falcon_section() {
        let text = r#"{"scenario": {"numVehicles": 2, "numMessages": 10}}"#;
        let document: ConfigDocument = serde_json::from_str(text).unwrap();
        assert_eq!(document.scenario.num_vehicles, 2);
        assert!(document.scenario.falcon.is_none());

        let text = r#"{
            "scenario": {
                "numVehicles": 1,
                "numMessages": 3,
                "signatureScheme": "falcon",
                "falcon": {"fragmentBytes": 256, "compression": "zstd"}
            }
        }"#;
        let document: ConfigDocument = serde_json::from_str(text).unwrap();
        let falcon = document.scenario.falcon.unwrap();
        assert_eq!(falcon.fragment_bytes, Some(256));
        assert_eq!(falcon.compression.as_deref(), Some("zstd"));
        assert_eq!(
            scheme_from_label(document.scenario.signature_scheme.as_deref().unwrap()),
            SignatureScheme::Falcon
        );
    }

    #[test]
    fn expected_total_multiplies_messages_by_vehicles() {
        let config = SimConfig {
            num_vehicles: 3,
            num_messages: 200,
            pqc: PqcOptions::default(),
            loss_rate: 0.0,
            test_port: DEFAULT_TEST_PORT,
        };
        assert_eq!(config.expected_total(), 600);
    }
}
