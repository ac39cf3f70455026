use crate::clock::Clock;
use crate::collectors::http::HttpTransport;
use crate::collectors::retry::RetryPolicy;
use crate::collectors::{
    ClientContext, LunarClient, MeteoClient, OceanClient, SeismicClient, SolarClient,
    SourceClient,
};
use crate::config::Config;
use crate::events::{FallbackReason, Observation, Timestamp};
use futures::future::join_all;
use futures::FutureExt;
use log::{error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Everything gathered in one acquisition phase, one observation per client
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationBatch {
    pub observations: Vec<Observation>,
    pub collected_at: Timestamp,
}

impl ObservationBatch {
    pub fn synthetic_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|o| o.provenance.is_synthetic())
            .count()
    }
}

/// Runs every registered source client once per cycle
///
/// Each client gets a wall-clock budget. A client that overruns it, or
/// panics, is replaced by its synthetic reading so the batch stays complete.
pub struct AcquisitionOrchestrator {
    clients: Vec<Arc<dyn SourceClient>>,
    clock: Arc<dyn Clock>,
    client_budget: Duration,
    cycle_deadline: Duration,
    concurrent: bool,
}

impl AcquisitionOrchestrator {
    pub fn new(
        clients: Vec<Arc<dyn SourceClient>>,
        clock: Arc<dyn Clock>,
        client_budget: Duration,
        cycle_deadline: Duration,
        concurrent: bool,
    ) -> Self {
        Self {
            clients,
            clock,
            client_budget,
            cycle_deadline,
            concurrent,
        }
    }

    /// Build one client per enabled source (one per weather station)
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let context = ClientContext {
            transport,
            clock: clock.clone(),
            retry: RetryPolicy::from(&config.retry),
            jitter_fraction: config.sources.jitter_fraction,
        };
        let sources = &config.sources;
        let region = Arc::new(config.region.clone());
        let mut clients: Vec<Arc<dyn SourceClient>> = Vec::new();

        if sources.meteo.enabled {
            let meteo = Arc::new(sources.meteo.clone());
            for station in &sources.meteo.stations {
                clients.push(Arc::new(MeteoClient::new(
                    context.clone(),
                    meteo.clone(),
                    station.clone(),
                )));
            }
        }
        if sources.ocean.enabled {
            clients.push(Arc::new(OceanClient::new(
                context.clone(),
                Arc::new(sources.ocean.clone()),
                region.clone(),
            )));
        }
        if sources.seismic.enabled {
            clients.push(Arc::new(SeismicClient::new(
                context.clone(),
                Arc::new(sources.seismic.clone()),
                region,
            )));
        }
        if sources.solar.enabled {
            clients.push(Arc::new(SolarClient::new(
                context.clone(),
                Arc::new(sources.solar.clone()),
            )));
        }
        if sources.lunar.enabled {
            clients.push(Arc::new(LunarClient::new(
                context,
                Arc::new(sources.lunar.clone()),
            )));
        }

        info!("Registered {} source clients", clients.len());

        Self::new(
            clients,
            clock,
            config.monitor.client_budget(),
            config.monitor.cycle_deadline(),
            config.monitor.concurrent_sources,
        )
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Invoke every client exactly once
    pub async fn collect(&self) -> ObservationBatch {
        let observations = if self.concurrent {
            let budget = self.client_budget.min(self.cycle_deadline);
            join_all(
                self.clients
                    .iter()
                    .map(|client| run_client(client.as_ref(), budget)),
            )
            .await
        } else {
            let deadline = Instant::now() + self.cycle_deadline;
            let mut observations = Vec::with_capacity(self.clients.len());
            for client in &self.clients {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let budget = self.client_budget.min(remaining);
                observations.push(run_client(client.as_ref(), budget).await);
            }
            observations
        };

        let batch = ObservationBatch {
            observations,
            collected_at: self.clock.now(),
        };
        info!(
            "Collected {} observations ({} synthetic)",
            batch.observations.len(),
            batch.synthetic_count()
        );
        batch
    }
}

/// One client under its budget, isolated from panics
async fn run_client(client: &dyn SourceClient, budget: Duration) -> Observation {
    if budget.is_zero() {
        warn!("{}: cycle deadline exhausted before fetch", client.source_id());
        return client.synthetic(FallbackReason::Timeout);
    }

    let guarded = AssertUnwindSafe(client.fetch()).catch_unwind();
    match tokio::time::timeout(budget, guarded).await {
        Ok(Ok(observation)) => observation,
        Ok(Err(_)) => {
            error!("{}: client panicked during fetch", client.source_id());
            client.synthetic(FallbackReason::Fallback)
        }
        Err(_) => {
            warn!(
                "{}: exceeded budget of {:?}, using synthetic reading",
                client.source_id(),
                budget
            );
            client.synthetic(FallbackReason::Timeout)
        }
    }
}
