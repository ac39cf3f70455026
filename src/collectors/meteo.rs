//! AEMET OpenData station client
//!
//! AEMET answers a data request with an envelope pointing at a second URL that
//! holds the actual readings. Both hops go through the retry policy.

use crate::collectors::fallback::jittered;
use crate::collectors::http::{fetch_json, fetch_parsed, HttpRequest};
use crate::collectors::{required, ClientContext, SourceClient, SourceFuture};
use crate::config::{MeteoSourceConfig, StationConfig};
use crate::error::SourceError;
use crate::events::{FallbackReason, Observation, ObservationDetail, SourceDomain, Timestamp};
use chrono::NaiveDateTime;
use log::debug;
use serde::Deserialize;
use std::sync::Arc;

const MS_TO_KMH: f64 = 3.6;

/// First-hop response
#[derive(Debug, Deserialize)]
struct Envelope {
    estado: u16,
    #[serde(default)]
    descripcion: Option<String>,
    #[serde(default)]
    datos: Option<String>,
}

/// One station reading; AEMET omits sensors a station does not have
#[derive(Debug, Deserialize)]
struct StationReading {
    #[serde(default)]
    fint: Option<String>,
    /// Mean wind speed, m/s
    #[serde(default)]
    vv: Option<f64>,
    /// Precipitation, mm
    #[serde(default)]
    prec: Option<f64>,
}

/// Weather client for a single AEMET station
pub struct MeteoClient {
    context: ClientContext,
    config: Arc<MeteoSourceConfig>,
    station: StationConfig,
    source_id: String,
}

impl MeteoClient {
    pub fn new(context: ClientContext, config: Arc<MeteoSourceConfig>, station: StationConfig) -> Self {
        let source_id = format!("aemet:{}", station.id);
        Self {
            context,
            config,
            station,
            source_id,
        }
    }

    fn station_url(&self) -> String {
        format!(
            "{}/observacion/convencional/datos/estacion/{}",
            self.config.base_url.trim_end_matches('/'),
            self.station.id
        )
    }

    async fn fetch_reading(&self) -> Result<Observation, SourceError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            // AEMET rejects every anonymous request
            .ok_or(SourceError::Auth(401))?;

        let ctx = &self.context;
        let request = HttpRequest::get(self.station_url())
            .header("accept", "application/json")
            .header("api_key", api_key);

        let datos_url = fetch_parsed(
            ctx.transport.as_ref(),
            &ctx.retry,
            &self.source_id,
            &request,
            parse_envelope,
        )
        .await?;
        debug!("{}: readings available at {}", self.source_id, datos_url);

        let readings: Vec<StationReading> = fetch_json(
            ctx.transport.as_ref(),
            &ctx.retry,
            &self.source_id,
            &HttpRequest::get(datos_url),
        )
        .await?;

        let latest = readings
            .iter()
            .max_by(|a, b| a.fint.cmp(&b.fint))
            .ok_or_else(|| SourceError::Validation("station returned no readings".to_string()))?;

        let wind_ms = required(latest.vv, "vv")?;
        let precipitation_mm = required(latest.prec, "prec")?;
        let timestamp = latest
            .fint
            .as_deref()
            .and_then(parse_aemet_time)
            .unwrap_or_else(|| ctx.clock.now());

        Ok(Observation::real(
            self.source_id.clone(),
            ObservationDetail::Meteo {
                wind_speed_kmh: wind_ms * MS_TO_KMH,
                precipitation_mm,
            },
            timestamp,
        ))
    }
}

/// Extract the readings URL, mapping the envelope status onto the error taxonomy
fn parse_envelope(body: String) -> Result<String, SourceError> {
    let envelope: Envelope = serde_json::from_str(&body)?;
    match envelope.estado {
        200 => envelope
            .datos
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SourceError::Validation("envelope has no 'datos' URL".to_string())),
        401 | 403 => Err(SourceError::Auth(envelope.estado)),
        429 => Err(SourceError::RateLimited { retry_after: None }),
        status @ 500..=599 => Err(SourceError::Server(status)),
        status => Err(SourceError::Validation(format!(
            "envelope status {}: {}",
            status,
            envelope.descripcion.unwrap_or_default()
        ))),
    }
}

fn parse_aemet_time(value: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl SourceClient for MeteoClient {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Meteo
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>> {
        Box::pin(self.fetch_reading())
    }

    fn synthetic(&self, reason: FallbackReason) -> Observation {
        let jitter = self.context.jitter_fraction;
        Observation::synthetic(
            self.source_id.clone(),
            ObservationDetail::Meteo {
                wind_speed_kmh: jittered(self.station.baseline_wind_kmh, jitter),
                precipitation_mm: jittered(self.station.baseline_precipitation_mm, jitter),
            },
            self.context.clock.now(),
            reason,
        )
    }
}
