//! Solar flare counts from NASA DONKI and the NOAA planetary K-index

use crate::collectors::fallback::jittered;
use crate::collectors::http::{fetch_json, HttpRequest};
use crate::collectors::{required, ClientContext, SourceClient, SourceFuture};
use crate::config::SolarSourceConfig;
use crate::error::SourceError;
use crate::events::{FallbackReason, Observation, ObservationDetail, SourceDomain};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Number of most recent K-index readings considered
const KP_WINDOW: usize = 12;

#[derive(Debug, Deserialize)]
struct Flare {
    #[serde(rename = "classType", default)]
    class_type: Option<String>,
}

/// Flare counts and geomagnetic activity for the look-back window
pub struct SolarClient {
    context: ClientContext,
    config: Arc<SolarSourceConfig>,
}

impl SolarClient {
    pub fn new(context: ClientContext, config: Arc<SolarSourceConfig>) -> Self {
        Self { context, config }
    }

    fn flare_request(&self) -> HttpRequest {
        let end = self.context.clock.now().date_naive();
        let start = end - self.config.lookback();
        let mut request = HttpRequest::get(self.config.flare_url.clone())
            .query("startDate", start.format("%Y-%m-%d"))
            .query("endDate", end.format("%Y-%m-%d"));
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.query("api_key", key);
        }
        request
    }

    async fn fetch_reading(&self) -> Result<Observation, SourceError> {
        let ctx = &self.context;
        let transport = ctx.transport.as_ref();

        let flares: Vec<Flare> =
            fetch_json(transport, &ctx.retry, "donki", &self.flare_request()).await?;
        let (m_class_flares, x_class_flares) = count_flares(&flares);

        let kp_payload: Value = fetch_json(
            transport,
            &ctx.retry,
            "noaa-kp",
            &HttpRequest::get(self.config.kp_url.clone()),
        )
        .await?;
        let kp_index = required(max_recent_kp(&kp_payload)?, "Kp")?;

        Ok(Observation::real(
            self.source_id(),
            ObservationDetail::Solar {
                m_class_flares,
                x_class_flares,
                kp_index,
            },
            ctx.clock.now(),
        ))
    }
}

/// Count M- and X-class flares by their `classType` prefix
fn count_flares(flares: &[Flare]) -> (u32, u32) {
    flares
        .iter()
        .filter_map(|flare| flare.class_type.as_deref())
        .fold((0, 0), |(m, x), class| match class.chars().next() {
            Some('M') | Some('m') => (m + 1, x),
            Some('X') | Some('x') => (m, x + 1),
            _ => (m, x),
        })
}

/// Maximum Kp over the most recent readings
///
/// NOAA publishes the product either as rows with a header row
/// (`[["time_tag", "Kp", ...], ["2025-03-01 00:00:00.000", "2.33", ...]]`) or
/// as an array of objects; values may be numbers or numeric strings.
fn max_recent_kp(payload: &Value) -> Result<Option<f64>, SourceError> {
    let rows = payload
        .as_array()
        .ok_or_else(|| SourceError::Validation("K-index payload is not an array".to_string()))?;

    let readings: Vec<f64> = match rows.first() {
        Some(Value::Array(header)) => {
            let column = header
                .iter()
                .position(|name| name.as_str().is_some_and(is_kp_key))
                .ok_or_else(|| SourceError::Validation("no Kp column in header".to_string()))?;
            rows[1..]
                .iter()
                .filter_map(|row| row.get(column).and_then(as_number))
                .collect()
        }
        Some(Value::Object(_)) => rows
            .iter()
            .filter_map(|row| {
                row.as_object()?
                    .iter()
                    .find(|(key, _)| is_kp_key(key))
                    .and_then(|(_, value)| as_number(value))
            })
            .collect(),
        Some(_) => {
            return Err(SourceError::Validation(
                "unrecognised K-index layout".to_string(),
            ))
        }
        None => Vec::new(),
    };

    let start = readings.len().saturating_sub(KP_WINDOW);
    Ok(readings[start..].iter().copied().reduce(f64::max))
}

fn is_kp_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("kp") || key.eq_ignore_ascii_case("kp_index")
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl SourceClient for SolarClient {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Solar
    }

    fn source_id(&self) -> &str {
        "donki+noaa"
    }

    fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>> {
        Box::pin(self.fetch_reading())
    }

    fn synthetic(&self, reason: FallbackReason) -> Observation {
        Observation::synthetic(
            self.source_id(),
            ObservationDetail::Solar {
                m_class_flares: 0,
                x_class_flares: 0,
                kp_index: jittered(self.config.baseline_kp, self.context.jitter_fraction),
            },
            self.context.clock.now(),
            reason,
        )
    }
}
