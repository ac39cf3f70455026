//! Risk aggregation engine
//!
//! Turns an observation batch into per-domain scores and one weighted combined
//! score. The engine performs no I/O and keeps no state between calls, so the
//! same batch always yields the same assessment.

use crate::collectors::ObservationBatch;
use crate::config::{Config, LevelThresholds, WeightsConfig};
use crate::error::AssessmentError;
use crate::events::{AlertLevel, ObservationDetail, Provenance, SourceDomain, Timestamp};
use crate::scoring::RuleSet;
use log::debug;
use serde::Serialize;

/// Reference to an observation that fed a domain score
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContributingObservation {
    pub source_id: String,
    pub provenance: Provenance,
    pub score: f64,
    /// The measured values, kept so alerts can name what tripped
    pub detail: ObservationDetail,
}

impl ContributingObservation {
    /// Headline metric as (name, value, unit)
    pub fn headline(&self) -> (&'static str, f64, &'static str) {
        self.detail.headline()
    }
}

/// Score of one domain for the current cycle
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DomainRiskScore {
    pub domain: SourceDomain,
    /// In [0,1]; the maximum over contributing observations
    pub score: f64,
    pub weight: f64,
    pub contributing_observations: Vec<ContributingObservation>,
}

impl DomainRiskScore {
    pub fn weighted(&self) -> f64 {
        self.score * self.weight
    }

    /// Highest-scoring contribution; the first one wins ties
    pub fn worst(&self) -> Option<&ContributingObservation> {
        self.contributing_observations
            .iter()
            .fold(None, |worst: Option<&ContributingObservation>, c| match worst {
                Some(w) if w.score >= c.score => Some(w),
                _ => Some(c),
            })
    }

    /// "REAL", "SYNTHETIC", "MIXED", or "MISSING" when nothing contributed
    pub fn provenance_label(&self) -> &'static str {
        let synthetic = self
            .contributing_observations
            .iter()
            .filter(|c| c.provenance.is_synthetic())
            .count();
        match (synthetic, self.contributing_observations.len()) {
            (_, 0) => "MISSING",
            (0, _) => "REAL",
            (s, n) if s == n => "SYNTHETIC",
            _ => "MIXED",
        }
    }
}

/// Outcome of one assessment, never mutated after creation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskAssessment {
    pub combined_score: f64,
    pub alert_level: AlertLevel,
    pub timestamp: Timestamp,
    /// One entry per domain, in [`SourceDomain::ALL`] order
    pub domain_breakdown: Vec<DomainRiskScore>,
}

impl RiskAssessment {
    pub fn domain(&self, domain: SourceDomain) -> Option<&DomainRiskScore> {
        self.domain_breakdown.iter().find(|d| d.domain == domain)
    }
}

/// Scores observation batches with configured rules, weights and levels
pub struct RiskEngine {
    rules: RuleSet,
    weights: WeightsConfig,
    levels: LevelThresholds,
}

impl RiskEngine {
    pub fn new(rules: RuleSet, weights: WeightsConfig, levels: LevelThresholds) -> Self {
        Self {
            rules,
            weights,
            levels,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RuleSet::from_config(&config.scoring),
            config.weights.clone(),
            config.levels.clone(),
        )
    }

    /// Assess one batch
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::MalformedObservation` if an observation's
    /// detail does not match its domain or carries non-finite values.
    pub fn assess(&self, batch: &ObservationBatch) -> Result<RiskAssessment, AssessmentError> {
        for observation in &batch.observations {
            observation.validate()?;
        }

        let domain_breakdown: Vec<DomainRiskScore> = SourceDomain::ALL
            .iter()
            .map(|&domain| self.score_domain(domain, batch))
            .collect();

        let combined_score = self.combine(
            domain_breakdown
                .iter()
                .map(|d| (d.domain, d.score)),
        );
        let alert_level = self.levels.classify(combined_score);

        debug!(
            "Assessment: combined {:.3} -> {} ({})",
            combined_score,
            alert_level,
            domain_breakdown
                .iter()
                .map(|d| format!("{}={:.2}", d.domain, d.score))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(RiskAssessment {
            combined_score,
            alert_level,
            timestamp: batch.collected_at,
            domain_breakdown,
        })
    }

    /// Weighted sum of domain scores, clamped to [0,1]
    pub fn combine<I>(&self, domain_scores: I) -> f64
    where
        I: IntoIterator<Item = (SourceDomain, f64)>,
    {
        domain_scores
            .into_iter()
            .map(|(domain, score)| self.weights.weight(domain) * score.clamp(0.0, 1.0))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    fn score_domain(&self, domain: SourceDomain, batch: &ObservationBatch) -> DomainRiskScore {
        let contributing_observations: Vec<ContributingObservation> = batch
            .observations
            .iter()
            .filter(|o| o.source_domain == domain)
            .map(|o| ContributingObservation {
                source_id: o.station_or_event_id.clone(),
                provenance: o.provenance,
                score: self.rules.score(&o.detail),
                detail: o.detail.clone(),
            })
            .collect();

        let score = contributing_observations
            .iter()
            .map(|c| c.score)
            .fold(0.0, f64::max);

        DomainRiskScore {
            domain,
            score,
            weight: self.weights.weight(domain),
            contributing_observations,
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
