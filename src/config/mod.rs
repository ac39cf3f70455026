//! Static configuration bundle loaded once at startup
//!
//! Every section has working defaults for the Gulf of Cádiz deployment, so an
//! absent file still yields a runnable monitor. A file that is present but
//! invalid is rejected: the monitor refuses to start with undefined weights or
//! thresholds.

use crate::error::ConfigError;
use crate::events::{AlertLevel, SourceDomain, Timestamp};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Longest look-back window a source may request
pub const MAX_LOOKBACK_DAYS: u64 = 30;

/// Longest re-notify cooldown
pub const MAX_COOLDOWN_MINUTES: u64 = 30 * 24 * 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub retry: RetryConfig,
    pub region: RegionConfig,
    pub sources: SourcesConfig,
    pub scoring: ScoringConfig,
    pub weights: WeightsConfig,
    pub levels: LevelThresholds,
    pub alerts: AlertsConfig,
}

/// Cycle timing for the monitoring loop and the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between successful cycles
    pub interval_seconds: u64,
    /// Shortened sleep after a failed cycle
    pub recovery_interval_seconds: u64,
    /// Wall-clock budget for a single source client, retries included
    pub client_budget_seconds: u64,
    /// Hard deadline for the whole acquisition phase
    pub cycle_deadline_seconds: u64,
    /// Run source clients concurrently inside a cycle
    pub concurrent_sources: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            recovery_interval_seconds: 60,
            client_budget_seconds: 45,
            cycle_deadline_seconds: 90,
            concurrent_sources: true,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_seconds)
    }

    pub fn client_budget(&self) -> Duration {
        Duration::from_secs(self.client_budget_seconds)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_seconds)
    }
}

/// Retry policy shared by every networked source client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, the first one included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Upper bound for backoff and for server retry-after hints
    pub max_delay_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_seconds: 30,
            request_timeout_seconds: 10,
        }
    }
}

/// Geographic bounding box of the monitored region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            lat_min: 35.0,
            lat_max: 37.5,
            lon_min: -8.0,
            lon_max: -5.0,
        }
    }
}

impl RegionConfig {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&latitude)
            && (self.lon_min..=self.lon_max).contains(&longitude)
    }
}

/// Upstream endpoints, credentials and fallback baselines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Synthetic readings vary by at most this fraction of their baseline
    pub jitter_fraction: f64,
    pub meteo: MeteoSourceConfig,
    pub ocean: OceanSourceConfig,
    pub seismic: SeismicSourceConfig,
    pub solar: SolarSourceConfig,
    pub lunar: LunarSourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            jitter_fraction: 0.1,
            meteo: MeteoSourceConfig::default(),
            ocean: OceanSourceConfig::default(),
            seismic: SeismicSourceConfig::default(),
            solar: SolarSourceConfig::default(),
            lunar: LunarSourceConfig::default(),
        }
    }
}

/// AEMET OpenData weather stations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeteoSourceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub stations: Vec<StationConfig>,
}

impl Default for MeteoSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://opendata.aemet.es/opendata/api".to_string(),
            api_key: None,
            stations: vec![
                StationConfig::new("5783", "Cádiz", 15.3, 0.0),
                StationConfig::new("5675", "Jerez de la Frontera", 12.8, 0.0),
                StationConfig::new("6000", "Tarifa", 18.2, 0.0),
                StationConfig::new("5785", "Huelva", 14.1, 0.0),
            ],
        }
    }
}

/// A weather station and the baseline used when it cannot be reached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    pub id: String,
    pub name: String,
    pub baseline_wind_kmh: f64,
    #[serde(default)]
    pub baseline_precipitation_mm: f64,
}

impl StationConfig {
    pub fn new(id: &str, name: &str, baseline_wind_kmh: f64, baseline_precipitation_mm: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            baseline_wind_kmh,
            baseline_precipitation_mm,
        }
    }
}

/// Marine service delivering wave, current and sea-level fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OceanSourceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub station_id: String,
    pub baseline_wave_height_m: f64,
    pub baseline_current_ms: f64,
    pub baseline_sea_level_m: f64,
}

impl Default for OceanSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://data.marine.copernicus.eu/api/data".to_string(),
            api_key: None,
            station_id: "GOLFO_CADIZ".to_string(),
            baseline_wave_height_m: 0.8,
            baseline_current_ms: 0.2,
            baseline_sea_level_m: 0.1,
        }
    }
}

/// USGS GeoJSON earthquake feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeismicSourceConfig {
    pub enabled: bool,
    pub feed_url: String,
    /// Only events newer than this count as recent
    pub lookback_hours: u64,
}

impl Default for SeismicSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feed_url: "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson"
                .to_string(),
            lookback_hours: 24,
        }
    }
}

impl SeismicSourceConfig {
    /// Look-back window, capped at [`MAX_LOOKBACK_DAYS`]
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours.min(MAX_LOOKBACK_DAYS * 24) as i64)
    }
}

/// NASA DONKI flare list and NOAA planetary K-index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolarSourceConfig {
    pub enabled: bool,
    pub flare_url: String,
    pub kp_url: String,
    pub api_key: Option<String>,
    pub lookback_days: u32,
    pub baseline_kp: f64,
}

impl Default for SolarSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flare_url: "https://api.nasa.gov/DONKI/FLR".to_string(),
            kp_url: "https://services.swpc.noaa.gov/products/noaa-planetary-k-index.json"
                .to_string(),
            api_key: Some("DEMO_KEY".to_string()),
            lookback_days: 1,
            baseline_kp: 2.0,
        }
    }
}

impl SolarSourceConfig {
    /// Flare look-back window, capped at [`MAX_LOOKBACK_DAYS`]
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(u64::from(self.lookback_days).min(MAX_LOOKBACK_DAYS) as i64)
    }
}

/// Local synodic-cycle model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LunarSourceConfig {
    pub enabled: bool,
    pub reference_new_moon: Timestamp,
    pub cycle_days: f64,
}

impl Default for LunarSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 2024-01-11T11:57:00Z
            reference_new_moon: DateTime::<Utc>::UNIX_EPOCH
                + chrono::Duration::seconds(1_704_974_220),
            cycle_days: 29.53,
        }
    }
}

/// A threshold and the score reached once a value meets it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub threshold: f64,
    pub score: f64,
}

impl Step {
    pub const fn new(threshold: f64, score: f64) -> Self {
        Self { threshold, score }
    }
}

/// Score of the highest step whose threshold `value` meets, or 0
pub fn step_score(steps: &[Step], value: f64) -> f64 {
    best_step(steps, |step| value >= step.threshold)
}

/// Like [`step_score`], but `value` must strictly exceed the threshold
pub fn step_score_above(steps: &[Step], value: f64) -> f64 {
    best_step(steps, |step| value > step.threshold)
}

fn best_step<F>(steps: &[Step], reached: F) -> f64
where
    F: Fn(&Step) -> bool,
{
    steps
        .iter()
        .filter(|step| reached(step))
        .map(|step| step.score)
        .fold(0.0, f64::max)
}

/// Per-domain scoring thresholds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub seismic: SeismicScoring,
    pub ocean: OceanScoring,
    pub meteo: MeteoScoring,
    pub solar: SolarScoring,
    pub lunar: LunarScoring,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeismicScoring {
    pub magnitude_steps: Vec<Step>,
    pub shallow_depth_km: f64,
    pub shallow_boost: f64,
    pub tsunami_boost: f64,
}

impl Default for SeismicScoring {
    fn default() -> Self {
        Self {
            magnitude_steps: vec![
                Step::new(4.0, 0.15),
                Step::new(5.0, 0.30),
                Step::new(6.0, 0.60),
                Step::new(7.0, 0.80),
            ],
            shallow_depth_km: 30.0,
            shallow_boost: 0.2,
            tsunami_boost: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OceanScoring {
    pub wave_steps: Vec<Step>,
    pub current_steps: Vec<Step>,
    /// Absolute sea-level anomaly treated as a tidal extreme
    pub tidal_extreme_m: f64,
    pub tidal_increment: f64,
}

impl Default for OceanScoring {
    fn default() -> Self {
        Self {
            wave_steps: vec![
                Step::new(1.5, 0.30),
                Step::new(2.0, 0.60),
                Step::new(4.0, 0.85),
            ],
            current_steps: vec![Step::new(0.5, 0.15), Step::new(1.0, 0.30)],
            tidal_extreme_m: 0.3,
            tidal_increment: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeteoScoring {
    pub wind_steps: Vec<Step>,
    pub precipitation_steps: Vec<Step>,
}

impl Default for MeteoScoring {
    fn default() -> Self {
        Self {
            wind_steps: vec![
                Step::new(20.0, 0.30),
                Step::new(25.0, 0.60),
                Step::new(60.0, 0.85),
            ],
            precipitation_steps: vec![Step::new(2.0, 0.15), Step::new(4.0, 0.30)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolarScoring {
    /// M-class count at which flares start to accumulate as a storm
    pub m_class_threshold: u32,
    pub x_base: f64,
    pub x_increment: f64,
    pub m_base: f64,
    pub m_increment: f64,
    pub m_cap: u32,
    /// Score per M-class flare below the storm threshold
    pub m_single: f64,
    pub kp_steps: Vec<Step>,
}

impl Default for SolarScoring {
    fn default() -> Self {
        Self {
            m_class_threshold: 3,
            x_base: 0.8,
            x_increment: 0.1,
            m_base: 0.5,
            m_increment: 0.05,
            m_cap: 10,
            m_single: 0.1,
            kp_steps: vec![Step::new(4.0, 0.3), Step::new(5.0, 0.6), Step::new(7.0, 0.9)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LunarScoring {
    /// Distance in cycle fraction from new or full moon counted as syzygy
    pub syzygy_window: f64,
    pub syzygy_score: f64,
}

impl Default for LunarScoring {
    fn default() -> Self {
        Self {
            syzygy_window: 0.05,
            syzygy_score: 1.0,
        }
    }
}

/// Combination weights, non-negative and summing to 1
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightsConfig {
    pub seismic: f64,
    pub ocean: f64,
    pub meteo: f64,
    pub solar: f64,
    pub lunar: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            seismic: 0.30,
            ocean: 0.25,
            meteo: 0.20,
            solar: 0.20,
            lunar: 0.05,
        }
    }
}

impl WeightsConfig {
    pub fn weight(&self, domain: SourceDomain) -> f64 {
        match domain {
            SourceDomain::Seismic => self.seismic,
            SourceDomain::Ocean => self.ocean,
            SourceDomain::Meteo => self.meteo,
            SourceDomain::Solar => self.solar,
            SourceDomain::Lunar => self.lunar,
        }
    }

    pub fn total(&self) -> f64 {
        SourceDomain::ALL.iter().map(|d| self.weight(*d)).sum()
    }
}

/// Lower bounds of each alert level on the combined score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelThresholds {
    pub watch: f64,
    pub advisory: f64,
    pub warning: f64,
    pub emergency: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            watch: 0.2,
            advisory: 0.4,
            warning: 0.6,
            emergency: 0.8,
        }
    }
}

impl LevelThresholds {
    pub fn classify(&self, score: f64) -> AlertLevel {
        if score >= self.emergency {
            AlertLevel::Emergency
        } else if score >= self.warning {
            AlertLevel::Warning
        } else if score >= self.advisory {
            AlertLevel::Advisory
        } else if score >= self.watch {
            AlertLevel::Watch
        } else {
            AlertLevel::Normal
        }
    }
}

/// Deduplication and channel settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertsConfig {
    /// Re-send an unchanged level after this long, as a liveness digest
    pub cooldown_minutes: u64,
    /// Lowest level that opens a notification history
    pub min_level: AlertLevel,
    /// Retry a failed channel delivery once
    pub retry_delivery: bool,
    /// Domain score at which the alert names the hazard and its reading
    pub hazard_threshold: f64,
    pub telegram: Option<TelegramConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 24 * 60,
            min_level: AlertLevel::Watch,
            retry_delivery: true,
            hazard_threshold: 0.6,
            telegram: None,
        }
    }
}

impl AlertsConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown_minutes.min(MAX_COOLDOWN_MINUTES) as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

impl Config {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::ParseError` if it is not UTF-8, a TOML error if it does
    /// not parse, and `ConfigError::ValidationError` if any value is out of
    /// range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay secrets from the environment onto the loaded configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("AEMET_API_KEY") {
            debug!("Using AEMET_API_KEY from environment");
            self.sources.meteo.api_key = Some(key);
        }
        if let Some(key) = lookup("COPERNICUS_API_KEY") {
            debug!("Using COPERNICUS_API_KEY from environment");
            self.sources.ocean.api_key = Some(key);
        }
        if let Some(key) = lookup("NASA_API_KEY") {
            debug!("Using NASA_API_KEY from environment");
            self.sources.solar.api_key = Some(key);
        }

        let token = lookup("TELEGRAM_BOT_TOKEN");
        let chat_id = lookup("TELEGRAM_CHAT_ID");
        match (&mut self.alerts.telegram, token, chat_id) {
            (Some(telegram), token, chat_id) => {
                if let Some(token) = token {
                    telegram.bot_token = token;
                }
                if let Some(chat_id) = chat_id {
                    telegram.chat_id = chat_id;
                }
            }
            (None, Some(bot_token), Some(chat_id)) => {
                debug!("Configuring Telegram channel from environment");
                self.alerts.telegram = Some(TelegramConfig {
                    bot_token,
                    chat_id,
                    api_base: default_telegram_api(),
                });
            }
            _ => {}
        }
    }

    /// Check every value the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.monitor.interval_seconds == 0 {
            return invalid("monitor.interval_seconds must be positive".to_string());
        }
        if self.monitor.recovery_interval_seconds == 0 {
            return invalid("monitor.recovery_interval_seconds must be positive".to_string());
        }
        if self.monitor.client_budget_seconds == 0 || self.monitor.cycle_deadline_seconds == 0 {
            return invalid("monitor budgets must be positive".to_string());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.request_timeout_seconds == 0 {
            return invalid("retry.request_timeout_seconds must be positive".to_string());
        }

        let region = &self.region;
        if region.lat_min >= region.lat_max || region.lon_min >= region.lon_max {
            return invalid("region bounding box is empty".to_string());
        }

        if !(0.0..1.0).contains(&self.sources.jitter_fraction) {
            return invalid(format!(
                "sources.jitter_fraction must be in [0, 1), got {}",
                self.sources.jitter_fraction
            ));
        }
        if self.sources.meteo.enabled && self.sources.meteo.stations.is_empty() {
            return invalid("sources.meteo is enabled but lists no stations".to_string());
        }
        if self.sources.seismic.lookback_hours == 0
            || self.sources.seismic.lookback_hours > MAX_LOOKBACK_DAYS * 24
        {
            return invalid(format!(
                "sources.seismic.lookback_hours must be in 1..={}, got {}",
                MAX_LOOKBACK_DAYS * 24,
                self.sources.seismic.lookback_hours
            ));
        }
        if self.sources.solar.lookback_days == 0
            || u64::from(self.sources.solar.lookback_days) > MAX_LOOKBACK_DAYS
        {
            return invalid(format!(
                "sources.solar.lookback_days must be in 1..={}, got {}",
                MAX_LOOKBACK_DAYS, self.sources.solar.lookback_days
            ));
        }
        if self.sources.lunar.cycle_days <= 0.0 {
            return invalid("sources.lunar.cycle_days must be positive".to_string());
        }

        self.validate_weights()?;
        self.validate_levels()?;
        self.validate_scoring()?;

        if !(0.0..=1.0).contains(&self.alerts.hazard_threshold) {
            return invalid(format!(
                "alerts.hazard_threshold must be in [0, 1], got {}",
                self.alerts.hazard_threshold
            ));
        }
        if self.alerts.cooldown_minutes == 0 || self.alerts.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return invalid(format!(
                "alerts.cooldown_minutes must be in 1..={}, got {}",
                MAX_COOLDOWN_MINUTES, self.alerts.cooldown_minutes
            ));
        }

        Ok(())
    }

    fn validate_weights(&self) -> Result<(), ConfigError> {
        for domain in SourceDomain::ALL {
            let weight = self.weights.weight(domain);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "weight for {} must be non-negative, got {}",
                    domain, weight
                )));
            }
        }

        let total = self.weights.total();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "weights must sum to 1, got {}",
                total
            )));
        }

        Ok(())
    }

    fn validate_levels(&self) -> Result<(), ConfigError> {
        let l = &self.levels;
        let ordered = 0.0 < l.watch && l.watch < l.advisory && l.advisory < l.warning
            && l.warning < l.emergency
            && l.emergency <= 1.0;
        if !ordered {
            return Err(ConfigError::ValidationError(format!(
                "alert level boundaries must satisfy 0 < watch < advisory < warning < emergency <= 1, got {:?}",
                l
            )));
        }
        Ok(())
    }

    fn validate_scoring(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        let step_lists: [(&str, &[Step]); 6] = [
            ("scoring.seismic.magnitude_steps", &s.seismic.magnitude_steps),
            ("scoring.ocean.wave_steps", &s.ocean.wave_steps),
            ("scoring.ocean.current_steps", &s.ocean.current_steps),
            ("scoring.meteo.wind_steps", &s.meteo.wind_steps),
            ("scoring.meteo.precipitation_steps", &s.meteo.precipitation_steps),
            ("scoring.solar.kp_steps", &s.solar.kp_steps),
        ];

        for (name, steps) in step_lists {
            if steps.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
                return Err(ConfigError::ValidationError(format!(
                    "{} thresholds must be strictly increasing",
                    name
                )));
            }
            if steps.iter().any(|step| !is_unit(step.score)) {
                return Err(ConfigError::ValidationError(format!(
                    "{} scores must be within [0, 1]",
                    name
                )));
            }
        }

        let increments = [
            ("scoring.seismic.shallow_boost", s.seismic.shallow_boost),
            ("scoring.seismic.tsunami_boost", s.seismic.tsunami_boost),
            ("scoring.ocean.tidal_increment", s.ocean.tidal_increment),
            ("scoring.solar.x_base", s.solar.x_base),
            ("scoring.solar.x_increment", s.solar.x_increment),
            ("scoring.solar.m_base", s.solar.m_base),
            ("scoring.solar.m_increment", s.solar.m_increment),
            ("scoring.solar.m_single", s.solar.m_single),
            ("scoring.lunar.syzygy_score", s.lunar.syzygy_score),
        ];
        for (name, value) in increments {
            if !is_unit(value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=0.25).contains(&s.lunar.syzygy_window) {
            return Err(ConfigError::ValidationError(format!(
                "scoring.lunar.syzygy_window must be within [0, 0.25], got {}",
                s.lunar.syzygy_window
            )));
        }

        Ok(())
    }
}

fn is_unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!((config.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [monitor]
            interval_seconds = 900

            [alerts]
            cooldown_minutes = 120
            min_level = "ADVISORY"
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.interval_seconds, 900);
        assert_eq!(config.monitor.recovery_interval_seconds, 60);
        assert_eq!(config.alerts.cooldown_minutes, 120);
        assert_eq!(config.alerts.min_level, AlertLevel::Advisory);
        assert_eq!(config.weights, WeightsConfig::default());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let result = Config::from_toml_str(
            r#"
            [weights]
            seismic = 0.5
            ocean = 0.5
            meteo = 0.5
            solar = 0.0
            lunar = 0.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = Config::default();
        config.weights.seismic = -0.1;
        config.weights.ocean = 0.65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_level_boundaries_must_increase() {
        let mut config = Config::default();
        config.levels.advisory = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unordered_steps_rejected() {
        let mut config = Config::default();
        config.scoring.meteo.wind_steps = vec![Step::new(30.0, 0.5), Step::new(20.0, 0.3)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_meteo_requires_stations() {
        let mut config = Config::default();
        config.sources.meteo.stations.clear();
        assert!(config.validate().is_err());

        config.sources.meteo.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let result = Config::from_toml_str("[monitor\ninterval_seconds = ");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[sources.meteo.stations]]
            id = "5783"
            name = "Cádiz"
            baseline_wind_kmh = 14.0

            [alerts.telegram]
            bot_token = "token"
            chat_id = "42"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sources.meteo.stations.len(), 1);
        assert_eq!(config.sources.meteo.stations[0].baseline_precipitation_mm, 0.0);
        let telegram = config.alerts.telegram.unwrap();
        assert_eq!(telegram.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::from_file(Path::new("/nonexistent/tidewatch.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_non_utf8_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[weights]\nseismic = 0.9\xff\xfe").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_lookback_windows_are_bounded() {
        let mut config = Config::default();
        config.sources.seismic.lookback_hours = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.sources.seismic.lookback_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sources.solar.lookback_days = u32::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.sources.seismic.lookback_hours = MAX_LOOKBACK_DAYS * 24;
        config.sources.solar.lookback_days = MAX_LOOKBACK_DAYS as u32;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cooldown_is_bounded() {
        let mut config = Config::default();
        config.alerts.cooldown_minutes = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        // Unvalidated values are capped rather than overflowing
        assert_eq!(config.alerts.cooldown(), chrono::Duration::days(30));
    }

    #[test]
    fn test_hazard_threshold_must_be_unit() {
        let result = Config::from_toml_str("[alerts]\nhazard_threshold = 1.5");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_lookback_helpers_cap_unvalidated_values() {
        let seismic = SeismicSourceConfig {
            lookback_hours: u64::MAX,
            ..SeismicSourceConfig::default()
        };
        let solar = SolarSourceConfig {
            lookback_days: u32::MAX,
            ..SolarSourceConfig::default()
        };

        assert_eq!(seismic.lookback(), chrono::Duration::days(30));
        assert_eq!(solar.lookback(), chrono::Duration::days(30));
        assert_eq!(SeismicSourceConfig::default().lookback(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_env_overrides_fill_secrets() {
        let env: HashMap<&str, &str> = [
            ("AEMET_API_KEY", "aemet-secret"),
            ("TELEGRAM_BOT_TOKEN", "bot"),
            ("TELEGRAM_CHAT_ID", "99"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.sources.meteo.api_key.as_deref(), Some("aemet-secret"));
        assert_eq!(config.sources.solar.api_key.as_deref(), Some("DEMO_KEY"));
        let telegram = config.alerts.telegram.unwrap();
        assert_eq!(telegram.bot_token, "bot");
        assert_eq!(telegram.chat_id, "99");
    }

    #[test]
    fn test_classify_boundaries() {
        let levels = LevelThresholds::default();
        assert_eq!(levels.classify(0.0), AlertLevel::Normal);
        assert_eq!(levels.classify(0.19), AlertLevel::Normal);
        assert_eq!(levels.classify(0.2), AlertLevel::Watch);
        assert_eq!(levels.classify(0.4), AlertLevel::Advisory);
        assert_eq!(levels.classify(0.6), AlertLevel::Warning);
        assert_eq!(levels.classify(0.8), AlertLevel::Emergency);
        assert_eq!(levels.classify(1.0), AlertLevel::Emergency);
    }

    #[test]
    fn test_step_score_picks_highest_met_step() {
        let steps = SeismicScoring::default().magnitude_steps;
        assert_eq!(step_score(&steps, 3.9), 0.0);
        assert_eq!(step_score(&steps, 4.0), 0.15);
        assert_eq!(step_score(&steps, 6.2), 0.60);
        assert_eq!(step_score(&steps, 9.1), 0.80);

        let wind = MeteoScoring::default().wind_steps;
        assert_eq!(step_score_above(&wind, 20.0), 0.0);
        assert_eq!(step_score_above(&wind, 20.5), 0.30);
    }

    #[test]
    fn test_region_contains() {
        let region = RegionConfig::default();
        assert!(region.contains(36.5, -6.3));
        assert!(!region.contains(40.4, -3.7));
    }
}
