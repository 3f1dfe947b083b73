//! BSM generation from geospatial traces.
//!
//! A trace is one sample per 100 ms timestep. Speed and heading come from
//! consecutive samples by great-circle geometry; timestep zero reports both
//! as zero.

use std::fs;
use std::path::Path;

use crate::error::TraceError;
use crate::types::Bsm;

/// Fixed timestep between trace samples, matching the transmit cadence.
pub const TRACE_STEP_MS: u32 = 100;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One geospatial sample of a vehicle trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    pub latitude: f32,
    pub longitude: f32,
    pub elevation: f32,
}

/// Ordered trace of samples driving BSM generation for one vehicle.
#[derive(Debug, Clone)]
pub struct Trace {
    samples: Vec<TraceSample>,
}

impl Trace {
    pub fn from_samples(samples: Vec<TraceSample>) -> Self {
        Self { samples }
    }

    /// Load `trace_files/<n>.csv`-style data: one timestep per line,
    /// comma-separated floats, of which the first three are used.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: display.clone(),
            source,
        })?;

        let mut samples = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split(',');
            let mut next_float = |name: &str| -> Result<f32, TraceError> {
                let field = fields.next().ok_or_else(|| TraceError::Malformed {
                    path: display.clone(),
                    line: index + 1,
                    detail: format!("missing {} field", name),
                })?;
                field.trim().parse::<f32>().map_err(|e| TraceError::Malformed {
                    path: display.clone(),
                    line: index + 1,
                    detail: format!("bad {} value: {}", name, e),
                })
            };
            samples.push(TraceSample {
                latitude: next_float("latitude")?,
                longitude: next_float("longitude")?,
                elevation: next_float("elevation")?,
            });
        }

        if samples.is_empty() {
            return Err(TraceError::Empty { path: display });
        }
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The BSM for a timestep, or `None` past the end of the trace.
    pub fn bsm_at(&self, timestep: usize) -> Option<Bsm> {
        let sample = *self.samples.get(timestep)?;
        let (speed_kph, heading_degrees) = if timestep == 0 {
            (0.0, 0.0)
        } else {
            let prev = self.samples[timestep - 1];
            (
                calculate_speed_kph(
                    prev.latitude,
                    sample.latitude,
                    prev.longitude,
                    sample.longitude,
                    TRACE_STEP_MS,
                ),
                calculate_heading(
                    prev.latitude,
                    sample.latitude,
                    prev.longitude,
                    sample.longitude,
                ),
            )
        };
        Some(Bsm {
            latitude: sample.latitude,
            longitude: sample.longitude,
            elevation: sample.elevation,
            speed_kph,
            heading_degrees,
        })
    }
}

/// Speed in km/h from two positions `delta_ms` apart, by great-circle
/// (haversine) distance.
pub fn calculate_speed_kph(
    prev_lat: f32,
    lat: f32,
    prev_lon: f32,
    lon: f32,
    delta_ms: u32,
) -> f32 {
    let lat1 = (prev_lat as f64).to_radians();
    let lat2 = (lat as f64).to_radians();
    let dlat = ((lat - prev_lat) as f64).to_radians();
    let dlon = ((lon - prev_lon) as f64).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let distance_m = 2.0 * EARTH_RADIUS_M * a.sqrt().asin();

    let meters_per_second = distance_m / (delta_ms as f64 / 1000.0);
    (meters_per_second * 3.6) as f32
}

/// Initial great-circle bearing from the previous position to the current
/// one, in degrees normalized to [0, 360).
pub fn calculate_heading(prev_lat: f32, lat: f32, prev_lon: f32, lon: f32) -> f32 {
    let lat1 = (prev_lat as f64).to_radians();
    let lat2 = (lat as f64).to_radians();
    let dlon = ((lon - prev_lon) as f64).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let degrees = y.atan2(x).to_degrees();
    degrees.rem_euclid(360.0) as f32
}
