use crate::clock::Clock;
use crate::error::SourceError;
use crate::events::{FallbackReason, Observation, SourceDomain};
use log::warn;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// HTTP transport abstraction and status classification
pub mod http;

/// Retry decorator with exponential backoff
pub mod retry;

/// Baseline jitter for synthetic readings
pub mod fallback;

/// AEMET weather station client
pub mod meteo;

/// Marine wave and current client
pub mod ocean;

/// USGS earthquake feed client
pub mod seismic;

/// Solar flare and geomagnetic index client
pub mod solar;

/// Local lunar phase model
pub mod lunar;

/// Per-cycle acquisition across all clients
pub mod orchestrator;

pub use lunar::LunarClient;
pub use meteo::MeteoClient;
pub use ocean::OceanClient;
pub use orchestrator::{AcquisitionOrchestrator, ObservationBatch};
pub use seismic::SeismicClient;
pub use solar::SolarClient;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Collaborators every source client shares
#[derive(Clone)]
pub struct ClientContext {
    pub transport: Arc<dyn http::HttpTransport>,
    pub clock: Arc<dyn Clock>,
    pub retry: retry::RetryPolicy,
    /// Fraction of the baseline used as synthetic jitter
    pub jitter_fraction: f64,
}

/// One upstream data source
///
/// Implementors provide the fallible fetch and the baseline reading. The
/// provided [`SourceClient::fetch`] turns every failure into a tagged
/// synthetic observation, so callers always get exactly one observation back.
pub trait SourceClient: Send + Sync {
    fn domain(&self) -> SourceDomain;

    fn source_id(&self) -> &str;

    /// Fetch and parse a live reading
    fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>>;

    /// Baseline reading tagged with `reason`
    fn synthetic(&self, reason: FallbackReason) -> Observation;

    /// Live reading, or a synthetic one if anything went wrong
    fn fetch(&self) -> SourceFuture<'_, Observation> {
        Box::pin(async move {
            let result = self.try_fetch().await.and_then(|observation| {
                observation
                    .validate()
                    .map_err(|e| SourceError::Validation(e.to_string()))?;
                Ok(observation)
            });

            match result {
                Ok(observation) => observation,
                Err(err) => {
                    let reason = err.fallback_reason();
                    warn!(
                        "{}: live fetch failed ({}), using synthetic {} reading",
                        self.source_id(),
                        err,
                        reason
                    );
                    self.synthetic(reason)
                }
            }
        })
    }
}

/// Required numeric field, rejected when absent or non-finite
pub(crate) fn required(value: Option<f64>, field: &str) -> Result<f64, SourceError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(SourceError::Validation(format!(
            "field '{}' is not finite: {}",
            field, v
        ))),
        None => Err(SourceError::Validation(format!(
            "required field '{}' is missing",
            field
        ))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::MockClock;
    use crate::collectors::http::MockTransport;
    use crate::events::Timestamp;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    pub fn fixed_time() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    pub fn fixed_clock(now: Timestamp) -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock.expect_now().return_const(now);
        Arc::new(clock)
    }

    /// Context with millisecond backoff and no jitter
    pub fn context(transport: Arc<MockTransport>) -> ClientContext {
        ClientContext {
            transport,
            clock: fixed_clock(fixed_time()),
            retry: retry::RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                request_timeout: Duration::from_millis(500),
            },
            jitter_fraction: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ObservationDetail, Provenance};
    use test_support::fixed_time;

    struct ScriptedSource {
        result: Result<Observation, SourceError>,
    }

    impl SourceClient for ScriptedSource {
        fn domain(&self) -> SourceDomain {
            SourceDomain::Meteo
        }

        fn source_id(&self) -> &str {
            "scripted"
        }

        fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>> {
            let result = self.result.clone();
            Box::pin(async move { result })
        }

        fn synthetic(&self, reason: FallbackReason) -> Observation {
            Observation::synthetic(
                "scripted",
                ObservationDetail::Meteo {
                    wind_speed_kmh: 10.0,
                    precipitation_mm: 0.0,
                },
                fixed_time(),
                reason,
            )
        }
    }

    #[tokio::test]
    async fn test_fetch_passes_real_reading_through() {
        let real = Observation::real(
            "scripted",
            ObservationDetail::Meteo {
                wind_speed_kmh: 31.0,
                precipitation_mm: 1.0,
            },
            fixed_time(),
        );
        let source = ScriptedSource {
            result: Ok(real.clone()),
        };

        assert_eq!(source.fetch().await, real);
    }

    #[tokio::test]
    async fn test_fetch_tags_auth_failures() {
        let source = ScriptedSource {
            result: Err(SourceError::Auth(401)),
        };

        let observation = source.fetch().await;
        assert_eq!(
            observation.provenance,
            Provenance::Synthetic(FallbackReason::AuthFailure)
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_finite_live_values() {
        let broken = Observation::real(
            "scripted",
            ObservationDetail::Meteo {
                wind_speed_kmh: f64::NAN,
                precipitation_mm: 0.0,
            },
            fixed_time(),
        );
        let source = ScriptedSource { result: Ok(broken) };

        let observation = source.fetch().await;
        assert_eq!(
            observation.provenance,
            Provenance::Synthetic(FallbackReason::Fallback)
        );
    }

    #[test]
    fn test_required_field() {
        assert_eq!(required(Some(2.5), "vv"), Ok(2.5));
        assert!(required(None, "vv").is_err());
        assert!(required(Some(f64::INFINITY), "vv").is_err());
    }
}
