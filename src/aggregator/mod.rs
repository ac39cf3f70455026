/// Weighted multi-domain risk engine
pub mod risk_engine;

pub use risk_engine::{ContributingObservation, DomainRiskScore, RiskAssessment, RiskEngine};
