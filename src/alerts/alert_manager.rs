use crate::aggregator::{DomainRiskScore, RiskAssessment};
use crate::alerts::NotificationChannel;
use crate::clock::Clock;
use crate::config::AlertsConfig;
use crate::events::{AlertLevel, ObservationDetail, SourceDomain, Timestamp};
use chrono::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Last dispatch attempt, threaded by the monitoring loop between cycles
///
/// The record exists as soon as a dispatch was attempted. `dispatched` only
/// reports whether the channel confirmed delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    pub message_digest: String,
    pub alert_level: AlertLevel,
    pub created_at: Timestamp,
    pub dispatched: bool,
}

/// Why a notification goes out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReason {
    FirstAlert,
    LevelChanged { from: AlertLevel },
    CooldownElapsed,
}

impl fmt::Display for DispatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchReason::FirstAlert => write!(f, "first alert"),
            DispatchReason::LevelChanged { from } => write!(f, "level changed from {}", from),
            DispatchReason::CooldownElapsed => write!(f, "periodic digest, level unchanged"),
        }
    }
}

/// Deduplicates assessments and dispatches the ones worth sending
///
/// A notification goes out when there is no history yet and the level is at
/// least `min_level`, when the level differs from the last dispatched one, or
/// when the same level has not been sent for longer than the cooldown.
pub struct AlertManager {
    channel: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    min_level: AlertLevel,
    retry_delivery: bool,
    hazard_threshold: f64,
}

impl AlertManager {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        config: &AlertsConfig,
    ) -> Self {
        Self {
            channel,
            clock,
            cooldown: config.cooldown(),
            min_level: config.min_level,
            retry_delivery: config.retry_delivery,
            hazard_threshold: config.hazard_threshold,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Decide whether `assessment` warrants a notification given the history
    pub fn dispatch_reason(
        &self,
        assessment: &RiskAssessment,
        last: Option<&AlertRecord>,
        now: Timestamp,
    ) -> Option<DispatchReason> {
        let Some(last) = last else {
            return (assessment.alert_level >= self.min_level).then_some(DispatchReason::FirstAlert);
        };

        if assessment.alert_level != last.alert_level {
            return Some(DispatchReason::LevelChanged {
                from: last.alert_level,
            });
        }

        if now - last.created_at > self.cooldown {
            return Some(DispatchReason::CooldownElapsed);
        }

        None
    }

    /// Dispatch `assessment` if warranted
    ///
    /// # Arguments
    /// * `assessment` - This cycle's assessment
    /// * `last` - Record of the previous dispatch attempt, if any
    ///
    /// # Returns
    /// The new record when a dispatch was attempted, `None` when suppressed.
    /// Delivery failures are logged; the record is returned regardless.
    pub async fn maybe_notify(
        &self,
        assessment: &RiskAssessment,
        last: Option<&AlertRecord>,
    ) -> Option<AlertRecord> {
        let now = self.clock.now();
        let digest = compute_digest(assessment);

        let Some(reason) = self.dispatch_reason(assessment, last, now) else {
            match last {
                Some(last) if last.message_digest != digest => debug!(
                    "Suppressed changed {} assessment within cooldown (digest {})",
                    assessment.alert_level,
                    short_digest(&digest)
                ),
                _ => debug!(
                    "Suppressed duplicate {} assessment",
                    assessment.alert_level
                ),
            }
            return None;
        };

        let message = format_message(assessment, reason, &digest, self.hazard_threshold);
        info!(
            "Dispatching {} alert via {} ({})",
            assessment.alert_level,
            self.channel.name(),
            reason
        );

        let mut dispatched = self.channel.send(&message).await;
        if !dispatched && self.retry_delivery {
            warn!("Retrying {} delivery once", self.channel.name());
            dispatched = self.channel.send(&message).await;
        }
        if !dispatched {
            warn!(
                "{} alert not confirmed by {}; it will not be re-sent before the level changes or the cooldown elapses",
                assessment.alert_level,
                self.channel.name()
            );
        }

        Some(AlertRecord {
            message_digest: digest,
            alert_level: assessment.alert_level,
            created_at: now,
            dispatched,
        })
    }
}

/// SHA-256 over the level, the rounded combined score and the rounded
/// domain scores in domain order
///
/// Rounding to two decimals keeps jitter-level differences from producing a
/// new digest.
pub fn compute_digest(assessment: &RiskAssessment) -> String {
    let mut hasher = Sha256::new();
    hasher.update(assessment.alert_level.as_str().as_bytes());
    hasher.update(format!("|{:.2}", assessment.combined_score).as_bytes());
    for domain in SourceDomain::ALL {
        let score = assessment.domain(domain).map(|d| d.score).unwrap_or(0.0);
        hasher.update(format!("|{}={:.2}", domain, score).as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Plain-text alert body; channels apply their own markup
///
/// Domains scoring at least `hazard_threshold` are called out by name with
/// the reading that tripped them.
pub fn format_message(
    assessment: &RiskAssessment,
    reason: DispatchReason,
    digest: &str,
    hazard_threshold: f64,
) -> String {
    let mut lines = vec![
        format!(
            "{} coastal risk {:.2}",
            assessment.alert_level, assessment.combined_score
        ),
        format!("Reason: {}", reason),
        String::new(),
    ];

    let hazards: Vec<String> = assessment
        .domain_breakdown
        .iter()
        .filter(|d| d.score >= hazard_threshold)
        .filter_map(hazard_line)
        .collect();
    if !hazards.is_empty() {
        lines.push("Hazards:".to_string());
        lines.extend(hazards.into_iter().map(|h| format!("- {}", h)));
        lines.push(String::new());
    }

    for domain in &assessment.domain_breakdown {
        let mut line = format!(
            "{:<8} {:.2} x {:.2} = {:.3} [{}]",
            domain.domain.as_str(),
            domain.score,
            domain.weight,
            domain.weighted(),
            domain.provenance_label()
        );
        if let Some(worst) = domain.worst() {
            let (metric, value, unit) = worst.headline();
            line.push_str(&format!(" {} {:.1} {}", metric, value, unit));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!(
        "Assessed at {}",
        assessment.timestamp.format("%Y-%m-%d %H:%M UTC")
    ));
    lines.push(format!("Digest {}", short_digest(digest)));
    lines.join("\n")
}

/// Names the hazard behind a domain score, using its worst reading
fn hazard_line(domain: &DomainRiskScore) -> Option<String> {
    let worst = domain.worst()?;
    let text = match &worst.detail {
        ObservationDetail::Meteo {
            wind_speed_kmh,
            precipitation_mm,
        } => format!(
            "DANGEROUS WIND: {:.0} km/h, rain {:.1} mm",
            wind_speed_kmh, precipitation_mm
        ),
        ObservationDetail::Ocean {
            wave_height_m,
            current_speed_ms,
            sea_level_m,
        } => format!(
            "DANGEROUS SEA: waves {:.1} m, current {:.2} m/s, sea level {:+.2} m",
            wave_height_m, current_speed_ms, sea_level_m
        ),
        ObservationDetail::Seismic { event: Some(event), .. } => format!(
            "EARTHQUAKE: M{:.1} at {:.0} km depth ({:.2}, {:.2}){}",
            event.magnitude,
            event.depth_km,
            event.latitude,
            event.longitude,
            if event.tsunami { ", TSUNAMI RISK" } else { "" }
        ),
        ObservationDetail::Seismic { event: None, .. } => return None,
        ObservationDetail::Solar {
            m_class_flares,
            x_class_flares,
            kp_index,
        } => format!(
            "GEOMAGNETIC STORM: Kp {:.1}, {} X-class and {} M-class flares",
            kp_index, x_class_flares, m_class_flares
        ),
        ObservationDetail::Lunar {
            phase,
            illumination,
        } => format!(
            "LUNAR SYZYGY: phase {:.2}, {:.0}% illuminated",
            phase,
            illumination * 100.0
        ),
    };

    Some(format!("{} [{}, {}]", text, worst.source_id, worst.provenance))
}
