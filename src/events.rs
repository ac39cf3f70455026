//! Core observation types and enums for the risk monitor
//!
//! This module defines the fundamental data structures shared by the source
//! clients, the risk engine and the alert manager.

use crate::error::AssessmentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Category of monitored phenomenon
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceDomain {
    /// Weather station network
    Meteo,
    /// Marine / oceanographic service
    Ocean,
    /// Earthquake catalog
    Seismic,
    /// Solar flares and geomagnetic activity
    Solar,
    /// Lunar-tidal model
    Lunar,
}

impl SourceDomain {
    /// Every domain, in the order used for breakdowns and digests
    pub const ALL: [SourceDomain; 5] = [
        SourceDomain::Seismic,
        SourceDomain::Ocean,
        SourceDomain::Meteo,
        SourceDomain::Solar,
        SourceDomain::Lunar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDomain::Meteo => "METEO",
            SourceDomain::Ocean => "OCEAN",
            SourceDomain::Seismic => "SEISMIC",
            SourceDomain::Solar => "SOLAR",
            SourceDomain::Lunar => "LUNAR",
        }
    }
}

impl fmt::Display for SourceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a synthetic observation replaced a live reading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackReason {
    /// Retries exhausted or the payload failed validation
    Fallback,
    /// Upstream rejected the credentials (HTTP 401/403)
    AuthFailure,
    /// The client overran its wall-clock budget
    Timeout,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FallbackReason::Fallback => "FALLBACK",
            FallbackReason::AuthFailure => "AUTH_FAILURE",
            FallbackReason::Timeout => "TIMEOUT",
        };
        f.write_str(tag)
    }
}

/// Where an observation came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Live upstream data, or the local lunar model
    Real,
    /// Baseline-derived stand-in for a failed fetch
    Synthetic(FallbackReason),
}

impl Provenance {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Provenance::Synthetic(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Real => f.write_str("REAL"),
            Provenance::Synthetic(reason) => write!(f, "SYNTHETIC/{}", reason),
        }
    }
}

/// Most severe earthquake reported for the monitored region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeismicEvent {
    pub magnitude: f64,
    pub depth_km: f64,
    /// Upstream flagged tsunami potential
    pub tsunami: bool,
    pub latitude: f64,
    pub longitude: f64,
}

/// Minimal typed projection of a reading, one variant per domain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "domain", rename_all = "UPPERCASE")]
pub enum ObservationDetail {
    Meteo {
        wind_speed_kmh: f64,
        precipitation_mm: f64,
    },
    Ocean {
        wave_height_m: f64,
        current_speed_ms: f64,
        sea_level_m: f64,
    },
    Seismic {
        event: Option<SeismicEvent>,
        event_count: usize,
    },
    Solar {
        m_class_flares: u32,
        x_class_flares: u32,
        kp_index: f64,
    },
    Lunar {
        /// Fraction of the synodic cycle, 0 = new moon, 0.5 = full moon
        phase: f64,
        illumination: f64,
    },
}

impl ObservationDetail {
    pub fn domain(&self) -> SourceDomain {
        match self {
            ObservationDetail::Meteo { .. } => SourceDomain::Meteo,
            ObservationDetail::Ocean { .. } => SourceDomain::Ocean,
            ObservationDetail::Seismic { .. } => SourceDomain::Seismic,
            ObservationDetail::Solar { .. } => SourceDomain::Solar,
            ObservationDetail::Lunar { .. } => SourceDomain::Lunar,
        }
    }

    /// Headline metric as (name, value, unit)
    pub fn headline(&self) -> (&'static str, f64, &'static str) {
        match self {
            ObservationDetail::Meteo { wind_speed_kmh, .. } => {
                ("wind_speed", *wind_speed_kmh, "km/h")
            }
            ObservationDetail::Ocean { wave_height_m, .. } => ("wave_height", *wave_height_m, "m"),
            ObservationDetail::Seismic { event, .. } => (
                "max_magnitude",
                event.as_ref().map(|e| e.magnitude).unwrap_or(0.0),
                "Mw",
            ),
            ObservationDetail::Solar { kp_index, .. } => ("kp_index", *kp_index, "Kp"),
            ObservationDetail::Lunar { phase, .. } => ("lunar_phase", *phase, "cycle"),
        }
    }

    fn numeric_fields(&self) -> Vec<(&'static str, f64)> {
        match self {
            ObservationDetail::Meteo {
                wind_speed_kmh,
                precipitation_mm,
            } => vec![
                ("wind_speed_kmh", *wind_speed_kmh),
                ("precipitation_mm", *precipitation_mm),
            ],
            ObservationDetail::Ocean {
                wave_height_m,
                current_speed_ms,
                sea_level_m,
            } => vec![
                ("wave_height_m", *wave_height_m),
                ("current_speed_ms", *current_speed_ms),
                ("sea_level_m", *sea_level_m),
            ],
            ObservationDetail::Seismic { event, .. } => match event {
                Some(e) => vec![
                    ("magnitude", e.magnitude),
                    ("depth_km", e.depth_km),
                    ("latitude", e.latitude),
                    ("longitude", e.longitude),
                ],
                None => Vec::new(),
            },
            ObservationDetail::Solar { kp_index, .. } => vec![("kp_index", *kp_index)],
            ObservationDetail::Lunar {
                phase,
                illumination,
            } => vec![("phase", *phase), ("illumination", *illumination)],
        }
    }
}

/// A single reading produced by a source client for one cycle
///
/// Every source client yields exactly one observation per cycle, either real
/// or synthetic. Observations are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub source_domain: SourceDomain,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: Timestamp,
    pub provenance: Provenance,
    /// Station code, event id or feed name the reading belongs to
    pub station_or_event_id: String,
    pub detail: ObservationDetail,
}

impl Observation {
    /// Build an observation backed by live data
    pub fn real(
        station_or_event_id: impl Into<String>,
        detail: ObservationDetail,
        timestamp: Timestamp,
    ) -> Self {
        Self::build(station_or_event_id.into(), detail, timestamp, Provenance::Real)
    }

    /// Build a fallback observation tagged with the reason it was substituted
    pub fn synthetic(
        station_or_event_id: impl Into<String>,
        detail: ObservationDetail,
        timestamp: Timestamp,
        reason: FallbackReason,
    ) -> Self {
        Self::build(
            station_or_event_id.into(),
            detail,
            timestamp,
            Provenance::Synthetic(reason),
        )
    }

    fn build(
        station_or_event_id: String,
        detail: ObservationDetail,
        timestamp: Timestamp,
        provenance: Provenance,
    ) -> Self {
        let (metric_name, value, unit) = detail.headline();
        Self {
            source_domain: detail.domain(),
            metric_name: metric_name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp,
            provenance,
            station_or_event_id,
            detail,
        }
    }

    /// Check the observation against the risk engine's input contract
    ///
    /// The domain tag must agree with the detail variant and every numeric
    /// field must be finite.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        let malformed = |reason: String| AssessmentError::MalformedObservation {
            source_id: self.station_or_event_id.clone(),
            reason,
        };

        if self.detail.domain() != self.source_domain {
            return Err(malformed(format!(
                "domain tag {} does not match {} detail",
                self.source_domain,
                self.detail.domain()
            )));
        }

        if !self.value.is_finite() {
            return Err(malformed(format!("{} is not finite", self.metric_name)));
        }

        for (name, value) in self.detail.numeric_fields() {
            if !value.is_finite() {
                return Err(malformed(format!("{} is not finite", name)));
            }
        }

        Ok(())
    }
}

/// Ordered classification of the combined risk score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Normal,
    Watch,
    Advisory,
    Warning,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "NORMAL",
            AlertLevel::Watch => "WATCH",
            AlertLevel::Advisory => "ADVISORY",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
