//! Per-domain scoring rules
//!
//! Each rule maps the typed detail of one observation to a score in [0,1].
//! Thresholds come from configuration; `with_defaults` builds the calibrated
//! defaults for the Gulf of Cádiz.

use crate::config::{
    step_score, step_score_above, LunarScoring, MeteoScoring, OceanScoring, SeismicScoring,
    SolarScoring,
};
use crate::events::{ObservationDetail, SourceDomain};
use crate::scoring::ScoringRule;

/// Stepwise magnitude score with shallow-depth and tsunami boosts
///
/// A region without a qualifying event scores 0.
pub struct SeismicRule {
    pub config: SeismicScoring,
}

impl SeismicRule {
    pub fn new(config: SeismicScoring) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SeismicScoring::default())
    }
}

impl ScoringRule for SeismicRule {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Seismic
    }

    fn name(&self) -> &str {
        "SeismicRule"
    }

    fn score(&self, detail: &ObservationDetail) -> f64 {
        let ObservationDetail::Seismic {
            event: Some(event), ..
        } = detail
        else {
            return 0.0;
        };

        let base = step_score(&self.config.magnitude_steps, event.magnitude);
        if base == 0.0 {
            // Boosts amplify a felt event, they do not create one
            return 0.0;
        }

        let mut score = base;
        if event.depth_km < self.config.shallow_depth_km {
            score += self.config.shallow_boost;
        }
        if event.tsunami {
            score += self.config.tsunami_boost;
        }
        score
    }
}

/// Wave height steps plus current and tidal-extreme increments
pub struct OceanRule {
    pub config: OceanScoring,
}

impl OceanRule {
    pub fn new(config: OceanScoring) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(OceanScoring::default())
    }
}

impl ScoringRule for OceanRule {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Ocean
    }

    fn name(&self) -> &str {
        "OceanRule"
    }

    fn score(&self, detail: &ObservationDetail) -> f64 {
        let ObservationDetail::Ocean {
            wave_height_m,
            current_speed_ms,
            sea_level_m,
        } = detail
        else {
            return 0.0;
        };

        let mut score = step_score_above(&self.config.wave_steps, *wave_height_m)
            + step_score_above(&self.config.current_steps, *current_speed_ms);
        if sea_level_m.abs() > self.config.tidal_extreme_m {
            score += self.config.tidal_increment;
        }
        score
    }
}

/// Wind speed steps plus precipitation increments
pub struct MeteoRule {
    pub config: MeteoScoring,
}

impl MeteoRule {
    pub fn new(config: MeteoScoring) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(MeteoScoring::default())
    }
}

impl ScoringRule for MeteoRule {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Meteo
    }

    fn name(&self) -> &str {
        "MeteoRule"
    }

    fn score(&self, detail: &ObservationDetail) -> f64 {
        let ObservationDetail::Meteo {
            wind_speed_kmh,
            precipitation_mm,
        } = detail
        else {
            return 0.0;
        };

        step_score_above(&self.config.wind_steps, *wind_speed_kmh)
            + step_score_above(&self.config.precipitation_steps, *precipitation_mm)
    }
}

/// Flare activity and geomagnetic storm level, combined as independent risks
///
/// A single X-class flare dominates; M-class flares accumulate once there are
/// enough of them to count as a storm.
pub struct SolarRule {
    pub config: SolarScoring,
}

impl SolarRule {
    pub fn new(config: SolarScoring) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SolarScoring::default())
    }

    pub fn flare_score(&self, m_class: u32, x_class: u32) -> f64 {
        let c = &self.config;
        let score = if x_class > 0 {
            c.x_base + c.x_increment * f64::from(x_class)
        } else if m_class >= c.m_class_threshold {
            c.m_base + c.m_increment * f64::from(m_class.min(c.m_cap))
        } else {
            c.m_single * f64::from(m_class)
        };
        score.clamp(0.0, 1.0)
    }

    pub fn geomagnetic_score(&self, kp_index: f64) -> f64 {
        step_score(&self.config.kp_steps, kp_index).clamp(0.0, 1.0)
    }
}

impl ScoringRule for SolarRule {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Solar
    }

    fn name(&self) -> &str {
        "SolarRule"
    }

    fn score(&self, detail: &ObservationDetail) -> f64 {
        let ObservationDetail::Solar {
            m_class_flares,
            x_class_flares,
            kp_index,
        } = detail
        else {
            return 0.0;
        };

        let flare = self.flare_score(*m_class_flares, *x_class_flares);
        let geomagnetic = self.geomagnetic_score(*kp_index);
        1.0 - (1.0 - flare) * (1.0 - geomagnetic)
    }
}

/// Syzygy modifier: full score near new or full moon, nothing otherwise
pub struct LunarRule {
    pub config: LunarScoring,
}

impl LunarRule {
    pub fn new(config: LunarScoring) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(LunarScoring::default())
    }
}

impl ScoringRule for LunarRule {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Lunar
    }

    fn name(&self) -> &str {
        "LunarRule"
    }

    fn score(&self, detail: &ObservationDetail) -> f64 {
        let ObservationDetail::Lunar { phase, .. } = detail else {
            return 0.0;
        };

        let phase = phase.rem_euclid(1.0);
        let from_new = phase.min(1.0 - phase);
        let from_full = (phase - 0.5).abs();
        if from_new.min(from_full) <= self.config.syzygy_window {
            self.config.syzygy_score
        } else {
            0.0
        }
    }
}
