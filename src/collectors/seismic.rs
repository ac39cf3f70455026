use crate::collectors::http::{fetch_json, HttpRequest};
use crate::collectors::{ClientContext, SourceClient, SourceFuture};
use crate::config::{RegionConfig, SeismicSourceConfig};
use crate::error::SourceError;
use crate::events::{FallbackReason, Observation, ObservationDetail, SeismicEvent, SourceDomain};
use chrono::DateTime;
use log::debug;
use serde::Deserialize;
use std::sync::Arc;

/// USGS GeoJSON summary feed
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<String>,
    properties: FeatureProperties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    /// Unreviewed events may have no magnitude yet
    mag: Option<f64>,
    /// Milliseconds since the Unix epoch
    time: i64,
    #[serde(default)]
    tsunami: u8,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[longitude, latitude, depth_km]`
    coordinates: Vec<f64>,
}

/// Most severe recent earthquake inside the monitored box
pub struct SeismicClient {
    context: ClientContext,
    config: Arc<SeismicSourceConfig>,
    region: Arc<RegionConfig>,
}

impl SeismicClient {
    pub fn new(
        context: ClientContext,
        config: Arc<SeismicSourceConfig>,
        region: Arc<RegionConfig>,
    ) -> Self {
        Self {
            context,
            config,
            region,
        }
    }

    async fn fetch_reading(&self) -> Result<Observation, SourceError> {
        let ctx = &self.context;
        let feed: FeatureCollection = fetch_json(
            ctx.transport.as_ref(),
            &ctx.retry,
            self.source_id(),
            &HttpRequest::get(self.config.feed_url.clone()),
        )
        .await?;

        let now = ctx.clock.now();
        let cutoff = now - self.config.lookback();

        let mut recent = Vec::new();
        for feature in &feed.features {
            let Some(event) = self.qualifying_event(feature, cutoff.timestamp_millis())? else {
                continue;
            };
            debug!(
                "seismic: M{:.1} at ({:.2}, {:.2}) depth {:.0} km ({})",
                event.magnitude,
                event.latitude,
                event.longitude,
                event.depth_km,
                feature.id.as_deref().unwrap_or("unknown")
            );
            recent.push((event, feature.properties.time));
        }

        let event_count = recent.len();
        let strongest = recent
            .into_iter()
            .max_by(|(a, _), (b, _)| a.magnitude.total_cmp(&b.magnitude));
        let timestamp = strongest
            .as_ref()
            .and_then(|(_, millis)| DateTime::from_timestamp_millis(*millis))
            .unwrap_or(now);

        Ok(Observation::real(
            self.source_id(),
            ObservationDetail::Seismic {
                event: strongest.map(|(event, _)| event),
                event_count,
            },
            timestamp,
        ))
    }

    /// The feature as an event if it falls inside the box and window
    fn qualifying_event(
        &self,
        feature: &Feature,
        cutoff_millis: i64,
    ) -> Result<Option<SeismicEvent>, SourceError> {
        let props = &feature.properties;
        if props.time < cutoff_millis {
            return Ok(None);
        }
        let Some(magnitude) = props.mag else {
            return Ok(None);
        };

        let [longitude, latitude, depth_km] = match feature.geometry.coordinates.as_slice() {
            [lon, lat, depth, ..] => [*lon, *lat, *depth],
            _ => {
                return Err(SourceError::Validation(
                    "feature geometry needs longitude, latitude and depth".to_string(),
                ))
            }
        };
        if !self.region.contains(latitude, longitude) {
            return Ok(None);
        }

        Ok(Some(SeismicEvent {
            magnitude,
            depth_km,
            tsunami: props.tsunami != 0,
            latitude,
            longitude,
        }))
    }
}

impl SourceClient for SeismicClient {
    fn domain(&self) -> SourceDomain {
        SourceDomain::Seismic
    }

    fn source_id(&self) -> &str {
        "usgs"
    }

    fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>> {
        Box::pin(self.fetch_reading())
    }

    /// A quiet catalogue: the baseline for seismic activity is no event at all
    fn synthetic(&self, reason: FallbackReason) -> Observation {
        Observation::synthetic(
            self.source_id(),
            ObservationDetail::Seismic {
                event: None,
                event_count: 0,
            },
            self.context.clock.now(),
            reason,
        )
    }
}
