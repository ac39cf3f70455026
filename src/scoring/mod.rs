use crate::config::ScoringConfig;
use crate::events::{ObservationDetail, SourceDomain};

/// Built-in per-domain scoring rules
pub mod rules;

pub use rules::{LunarRule, MeteoRule, OceanRule, SeismicRule, SolarRule};

/// Maps one observation's detail to a raw domain score
///
/// Rules return 0 for details of another domain. The engine clamps whatever
/// a rule returns into [0,1].
pub trait ScoringRule: Send + Sync {
    fn domain(&self) -> SourceDomain;

    fn name(&self) -> &str;

    fn score(&self, detail: &ObservationDetail) -> f64;
}

/// One rule per domain
pub struct RuleSet {
    rules: Vec<Box<dyn ScoringRule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn ScoringRule>>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(vec![
            Box::new(SeismicRule::new(config.seismic.clone())),
            Box::new(OceanRule::new(config.ocean.clone())),
            Box::new(MeteoRule::new(config.meteo.clone())),
            Box::new(SolarRule::new(config.solar.clone())),
            Box::new(LunarRule::new(config.lunar.clone())),
        ])
    }

    /// Score of `detail` in [0,1] under its domain's rule, 0 if none applies
    pub fn score(&self, detail: &ObservationDetail) -> f64 {
        let domain = detail.domain();
        self.rules
            .iter()
            .find(|rule| rule.domain() == domain)
            .map(|rule| rule.score(detail).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_set_covers_every_domain() {
        let rules = RuleSet::default();
        assert_eq!(
            rules.rule_names(),
            vec!["SeismicRule", "OceanRule", "MeteoRule", "SolarRule", "LunarRule"]
        );
    }

    #[test]
    fn test_scores_are_clamped() {
        let rules = RuleSet::default();
        let storm = ObservationDetail::Meteo {
            wind_speed_kmh: 120.0,
            precipitation_mm: 40.0,
        };
        assert_eq!(rules.score(&storm), 1.0);
    }

    #[test]
    fn test_missing_rule_scores_zero() {
        let rules = RuleSet::new(vec![Box::new(MeteoRule::with_defaults())]);
        let ocean = ObservationDetail::Ocean {
            wave_height_m: 5.0,
            current_speed_ms: 2.0,
            sea_level_m: 1.0,
        };
        assert_eq!(rules.score(&ocean), 0.0);
    }
}
