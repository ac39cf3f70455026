use crate::collectors::fallback::jittered;
use crate::collectors::http::{fetch_json, HttpRequest};
use crate::collectors::{required, ClientContext, SourceClient, SourceFuture};
use crate::config::{OceanSourceConfig, RegionConfig};
use crate::error::SourceError;
use crate::events::{FallbackReason, Observation, ObservationDetail, SourceDomain};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Significant wave height
const WAVE_HEIGHT: &str = "VHM0";
/// Eastward current component
const CURRENT_EAST: &str = "uo";
/// Northward current component
const CURRENT_NORTH: &str = "vo";
/// Sea surface height above geoid
const SEA_LEVEL: &str = "zos";

#[derive(Debug, Deserialize)]
struct MarineResponse {
    #[serde(default)]
    variables: HashMap<String, MarineVariable>,
}

#[derive(Debug, Deserialize)]
struct MarineVariable {
    #[serde(default)]
    values: Vec<Option<f64>>,
}

impl MarineResponse {
    fn first_value(&self, name: &str) -> Option<f64> {
        self.variables
            .get(name)
            .and_then(|variable| variable.values.first().copied().flatten())
    }
}

/// Wave, current and sea-level client for the monitored box
pub struct OceanClient {
    context: ClientContext,
    config: Arc<OceanSourceConfig>,
    region: Arc<RegionConfig>,
    source_id: String,
}

impl OceanClient {
    pub fn new(
        context: ClientContext,
        config: Arc<OceanSourceConfig>,
        region: Arc<RegionConfig>,
    ) -> Self {
        let source_id = format!("marine:{}", config.station_id);
        Self {
            context,
            config,
            region,
            source_id,
        }
    }

    fn request(&self, token: &str) -> HttpRequest {
        let variables = [WAVE_HEIGHT, CURRENT_EAST, CURRENT_NORTH, SEA_LEVEL].join(",");
        HttpRequest::get(self.config.base_url.clone())
            .header("Authorization", format!("Bearer {}", token))
            .query("variables", variables)
            .query("minimum_latitude", self.region.lat_min)
            .query("maximum_latitude", self.region.lat_max)
            .query("minimum_longitude", self.region.lon_min)
            .query("maximum_longitude", self.region.lon_max)
    }

    async fn fetch_reading(&self) -> Result<Observation, SourceError> {
        let token = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(SourceError::Auth(401))?;

        let ctx = &self.context;
        let response: MarineResponse = fetch_json(
            ctx.transport.as_ref(),
            &ctx.retry,
            &self.source_id,
            &self.request(token),
        )
        .await?;

        let wave_height_m = required(response.first_value(WAVE_HEIGHT), WAVE_HEIGHT)?;
        let east = required(response.first_value(CURRENT_EAST), CURRENT_EAST)?;
        let north = required(response.first_value(CURRENT_NORTH), CURRENT_NORTH)?;
        let sea_level_m = match response.first_value(SEA_LEVEL) {
            Some(level) => required(Some(level), SEA_LEVEL)?,
            None => 0.0,
        };

        Ok(Observation::real(
            self.source_id.clone(),
            ObservationDetail::Ocean {
                wave_height_m,
                current_speed_ms: east.hypot(north),
                sea_level_m,
            },
            ctx.clock.now(),
        ))
    }
}

impl SourceClient for OceanClient {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Ocean
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
            ObservationDetail::Ocean {
                wave_height_m: jittered(self.config.baseline_wave_height_m, jitter),
                current_speed_ms: jittered(self.config.baseline_current_ms, jitter),
                sea_level_m: jittered(self.config.baseline_sea_level_m, jitter),
            },
            self.context.clock.now(),
            reason,
        )
    }
}
