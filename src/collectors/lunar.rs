use crate::collectors::{ClientContext, SourceClient, SourceFuture};
use crate::config::LunarSourceConfig;
use crate::error::SourceError;
use crate::events::{FallbackReason, Observation, ObservationDetail, SourceDomain, Timestamp};
use std::f64::consts::TAU;
use std::sync::Arc;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Lunar phase from a mean synodic-month model
///
/// Needs no network, so its readings are always REAL.
pub struct LunarClient {
    context: ClientContext,
    config: Arc<LunarSourceConfig>,
}

impl LunarClient {
    pub fn new(context: ClientContext, config: Arc<LunarSourceConfig>) -> Self {
        Self { context, config }
    }

    /// Phase at `at` as a cycle fraction: 0 new moon, 0.5 full moon
    pub fn phase_at(&self, at: Timestamp) -> f64 {
        let elapsed = (at - self.config.reference_new_moon).num_seconds() as f64;
        (elapsed / SECONDS_PER_DAY / self.config.cycle_days).rem_euclid(1.0)
    }

    fn detail_at(&self, at: Timestamp) -> ObservationDetail {
        let phase = self.phase_at(at);
        ObservationDetail::Lunar {
            phase,
            illumination: (1.0 - (TAU * phase).cos()) / 2.0,
        }
    }
}

impl SourceClient for LunarClient {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Lunar
    }

    fn source_id(&self) -> &str {
        "lunar-model"
    }

    fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>> {
        let now = self.context.clock.now();
        let observation = Observation::real(self.source_id(), self.detail_at(now), now);
        Box::pin(async move { Ok(observation) })
    }

    fn synthetic(&self, reason: FallbackReason) -> Observation {
        let now = self.context.clock.now();
        Observation::synthetic(self.source_id(), self.detail_at(now), now, reason)
    }
}
