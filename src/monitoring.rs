//! The top-level monitoring loop
//!
//! Each cycle acquires one observation per source, assesses the batch and
//! hands the assessment to the alert manager. Failures inside a cycle never
//! end the loop; only the stop signal does.

use crate::aggregator::{RiskAssessment, RiskEngine};
use crate::alerts::{AlertManager, AlertRecord, NotificationChannel};
use crate::clock::Clock;
use crate::collectors::http::HttpTransport;
use crate::collectors::AcquisitionOrchestrator;
use crate::config::Config;
use crate::error::MonitorError;
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Init,
    Running,
    Stopped,
}

/// Outcome of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub assessment: RiskAssessment,
    pub observation_count: usize,
    pub synthetic_count: usize,
    /// Present when this cycle attempted a notification
    pub alert: Option<AlertRecord>,
}

pub struct Monitor {
    orchestrator: AcquisitionOrchestrator,
    engine: RiskEngine,
    alerts: AlertManager,
    interval: Duration,
    recovery_interval: Duration,
    state: MonitorState,
    cycle: u64,
    last_record: Option<AlertRecord>,
    reports: Option<mpsc::UnboundedSender<CycleReport>>,
}

impl Monitor {
    pub fn new(
        orchestrator: AcquisitionOrchestrator,
        engine: RiskEngine,
        alerts: AlertManager,
        interval: Duration,
        recovery_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            engine,
            alerts,
            interval,
            recovery_interval,
            state: MonitorState::Init,
            cycle: 0,
            last_record: None,
            reports: None,
        }
    }

    /// Wire every component from configuration
    ///
    /// # Arguments
    /// * `config` - Validated configuration
    /// * `transport` - Shared HTTP transport for all source clients
    /// * `clock` - Time source for clients, assessments and cooldowns
    /// * `channel` - Where alerts are delivered
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        let orchestrator = AcquisitionOrchestrator::from_config(config, transport, clock.clone());
        let alerts = AlertManager::new(channel, clock, &config.alerts);

        Self::new(
            orchestrator,
            RiskEngine::from_config(config),
            alerts,
            config.monitor.interval(),
            config.monitor.recovery_interval(),
        )
    }

    /// Publish every completed cycle's report to `sender`
    pub fn with_reports(mut self, sender: mpsc::UnboundedSender<CycleReport>) -> Self {
        self.reports = Some(sender);
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    pub fn last_record(&self) -> Option<&AlertRecord> {
        self.last_record.as_ref()
    }

    /// Run cycles until `stop` turns true or its sender goes away
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        self.state = MonitorState::Running;
        info!(
            "Monitor running: {} sources, interval {:?}, alerts via {}",
            self.orchestrator.client_count(),
            self.interval,
            self.alerts.channel_name()
        );

        while !*stop.borrow() {
            let pause = match self.run_cycle().await {
                Ok(_) => self.interval,
                Err(e) => {
                    error!("Cycle {} failed: {}", self.cycle, e);
                    self.recovery_interval
                }
            };

            debug!("Sleeping {:?} before next cycle", pause);
            if sleep_or_stop(pause, &mut stop).await {
                break;
            }
        }

        self.state = MonitorState::Stopped;
        info!("Monitor stopped after {} cycles", self.cycle);
    }

    /// Run a single isolated cycle: acquire, assess, notify
    ///
    /// # Returns
    /// The cycle report, or the error or panic that aborted the cycle. The
    /// alert history is only updated by cycles that complete.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, MonitorError> {
        self.cycle += 1;
        let cycle = self.cycle;
        debug!("Starting cycle {}", cycle);

        let outcome = AssertUnwindSafe(self.execute_cycle(cycle))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(MonitorError::Panicked(panic_message(payload))));
        let report = outcome?;

        if let Some(record) = &report.alert {
            self.last_record = Some(record.clone());
        }

        info!(
            "Cycle {}: {} risk {:.2} ({} of {} readings synthetic{})",
            cycle,
            report.assessment.alert_level,
            report.assessment.combined_score,
            report.synthetic_count,
            report.observation_count,
            match &report.alert {
                Some(record) if record.dispatched => ", alert sent",
                Some(_) => ", alert delivery failed",
                None => "",
            }
        );

        if let Some(sender) = &self.reports {
            if sender.send(report.clone()).is_err() {
                debug!("Cycle report subscriber is gone");
            }
        }

        Ok(report)
    }

    async fn execute_cycle(&self, cycle: u64) -> Result<CycleReport, MonitorError> {
        let batch = self.orchestrator.collect().await;
        let assessment = self.engine.assess(&batch)?;
        let alert = self
            .alerts
            .maybe_notify(&assessment, self.last_record.as_ref())
            .await;

        Ok(CycleReport {
            cycle,
            observation_count: batch.observations.len(),
            synthetic_count: batch.synthetic_count(),
            assessment,
            alert,
        })
    }
}

/// Sleep for `pause` unless stopped first; true means stop
async fn sleep_or_stop(pause: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(pause);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = stop.changed() => {
                if changed.is_err() {
                    warn!("Stop signal sender dropped, shutting down");
                    return true;
                }
                if *stop.borrow() {
                    return true;
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::channel::DeliveryFuture;
    use crate::alerts::MockChannel;
    use crate::collectors::http::MockTransport;
    use crate::collectors::test_support::{fixed_clock, fixed_time};
    use crate::collectors::{SourceClient, SourceFuture};
    use crate::config::{AlertsConfig, LevelThresholds, WeightsConfig};
    use crate::error::{AlertError, SourceError};
    use crate::events::{
        AlertLevel, FallbackReason, Observation, ObservationDetail, SeismicEvent, SourceDomain,
    };
    use crate::scoring::RuleSet;
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};

    /// Replays scripted observations, repeating the last one
    ///
    /// Overrides `fetch` so malformed readings reach the engine unchecked.
    struct ScriptedClient {
        domain: SourceDomain,
        script: Mutex<VecDeque<Observation>>,
    }

    impl ScriptedClient {
        fn new(observations: Vec<Observation>) -> Arc<dyn SourceClient> {
            Arc::new(Self {
                domain: observations[0].detail.domain(),
                script: Mutex::new(observations.into()),
            })
        }
    }

    impl SourceClient for ScriptedClient {
        fn domain(&self) -> SourceDomain {
            self.domain
        }

        fn source_id(&self) -> &str {
            "scripted"
        }

        fn try_fetch(&self) -> SourceFuture<'_, Result<Observation, SourceError>> {
            Box::pin(async move { Err(SourceError::Transport("unused".to_string())) })
        }

        fn synthetic(&self, reason: FallbackReason) -> Observation {
            let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            let detail = script.front().unwrap().detail.clone();
            Observation::synthetic("scripted", detail, fixed_time(), reason)
        }

        fn fetch(&self) -> SourceFuture<'_, Observation> {
            Box::pin(async move {
                let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap()
                }
            })
        }
    }

    struct PanickingChannel;

    impl NotificationChannel for PanickingChannel {
        fn name(&self) -> &str {
            "panicking"
        }

        fn deliver<'a>(&'a self, text: &'a str) -> DeliveryFuture<'a> {
            Box::pin(async move {
                if !text.is_empty() {
                    panic!("formatter exploded");
                }
                Err(AlertError::NotificationFailed("empty message".to_string()))
            })
        }
    }

    fn quake(magnitude: f64) -> Observation {
        Observation::real(
            "usgs",
            ObservationDetail::Seismic {
                event: Some(SeismicEvent {
                    magnitude,
                    depth_km: 12.0,
                    tsunami: true,
                    latitude: 36.2,
                    longitude: -7.1,
                }),
                event_count: 1,
            },
            fixed_time(),
        )
    }

    fn calm_wind() -> Observation {
        Observation::real(
            "aemet:5783",
            ObservationDetail::Meteo {
                wind_speed_kmh: 10.0,
                precipitation_mm: 0.0,
            },
            fixed_time(),
        )
    }

    fn calm_sea() -> Observation {
        Observation::real(
            "marine:GOLFO_CADIZ",
            ObservationDetail::Ocean {
                wave_height_m: 0.5,
                current_speed_ms: 0.1,
                sea_level_m: 0.0,
            },
            fixed_time(),
        )
    }

    fn no_quake() -> Observation {
        Observation::real(
            "usgs",
            ObservationDetail::Seismic {
                event: None,
                event_count: 0,
            },
            fixed_time(),
        )
    }

    fn quiet_sun() -> Observation {
        Observation::real(
            "donki+noaa",
            ObservationDetail::Solar {
                m_class_flares: 0,
                x_class_flares: 0,
                kp_index: 2.0,
            },
            fixed_time(),
        )
    }

    fn quarter_moon() -> Observation {
        Observation::real(
            "lunar-model",
            ObservationDetail::Lunar {
                phase: 0.25,
                illumination: 0.5,
            },
            fixed_time(),
        )
    }

    /// One scripted client per domain, seismic reading supplied by the caller
    fn all_domains(seismic: Observation) -> Vec<Arc<dyn SourceClient>> {
        vec![
            ScriptedClient::new(vec![seismic]),
            ScriptedClient::new(vec![calm_sea()]),
            ScriptedClient::new(vec![calm_wind()]),
            ScriptedClient::new(vec![quiet_sun()]),
            ScriptedClient::new(vec![quarter_moon()]),
        ]
    }

    fn monitor_with(
        clients: Vec<Arc<dyn SourceClient>>,
        weights: WeightsConfig,
        channel: Arc<dyn NotificationChannel>,
        interval: Duration,
        recovery_interval: Duration,
    ) -> Monitor {
        let clock = fixed_clock(fixed_time());
        let orchestrator = AcquisitionOrchestrator::new(
            clients,
            clock.clone(),
            Duration::from_millis(200),
            Duration::from_millis(500),
            true,
        );
        let engine = RiskEngine::new(RuleSet::default(), weights, LevelThresholds::default());
        let alerts = AlertManager::new(channel, clock, &AlertsConfig::default());
        Monitor::new(orchestrator, engine, alerts, interval, recovery_interval)
    }

    fn seismic_weighted() -> WeightsConfig {
        WeightsConfig {
            seismic: 0.70,
            ocean: 0.10,
            meteo: 0.10,
            solar: 0.05,
            lunar: 0.05,
        }
    }

    fn seismic_dominant() -> WeightsConfig {
        WeightsConfig {
            seismic: 0.90,
            ocean: 0.025,
            meteo: 0.025,
            solar: 0.025,
            lunar: 0.025,
        }
    }

    #[tokio::test]
    async fn test_strong_quake_cycle_sends_one_alert() {
        let channel = Arc::new(MockChannel::new());
        let mut monitor = monitor_with(
            all_domains(quake(6.2)),
            seismic_weighted(),
            channel.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report.cycle, 1);
        assert_eq!(report.observation_count, 5);
        assert_eq!(report.synthetic_count, 0);
        assert!(report.assessment.alert_level >= AlertLevel::Warning);
        for domain in [SourceDomain::Ocean, SourceDomain::Meteo, SourceDomain::Solar, SourceDomain::Lunar] {
            assert_eq!(report.assessment.domain(domain).unwrap().score, 0.0);
        }
        let record = report.alert.unwrap();
        assert!(record.dispatched);
        let delivered = channel.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("EARTHQUAKE: M6.2"));
        assert!(delivered[0].contains("TSUNAMI RISK"));
        assert!(!delivered[0].contains("DANGEROUS WIND"));
        assert_eq!(monitor.last_record(), Some(&record));
    }

    #[tokio::test]
    async fn test_calm_cycle_is_normal_and_silent() {
        let channel = Arc::new(MockChannel::new());
        let mut monitor = monitor_with(
            all_domains(no_quake()),
            WeightsConfig::default(),
            channel.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report.observation_count, 5);
        assert_eq!(report.synthetic_count, 0);
        assert_eq!(report.assessment.combined_score, 0.0);
        assert!(report
            .assessment
            .domain_breakdown
            .iter()
            .all(|d| d.provenance_label() == "REAL"));
        assert_eq!(report.assessment.alert_level, AlertLevel::Normal);
        assert!(report.alert.is_none());
        assert_eq!(channel.attempt_count(), 0);
        assert!(monitor.last_record().is_none());
    }

    #[tokio::test]
    async fn test_repeated_emergency_is_sent_once() {
        let channel = Arc::new(MockChannel::new());
        let mut monitor = monitor_with(
            vec![ScriptedClient::new(vec![quake(7.0)])],
            seismic_dominant(),
            channel.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        for cycle in 1..=3 {
            let report = monitor.run_cycle().await.unwrap();
            assert_eq!(report.cycle, cycle);
            assert_eq!(report.assessment.alert_level, AlertLevel::Emergency);
        }

        assert_eq!(channel.delivered().len(), 1);
        assert_eq!(monitor.cycles_run(), 3);
    }

    #[tokio::test]
    async fn test_malformed_batch_fails_cycle_then_recovers() {
        let mut broken = calm_wind();
        broken.source_domain = SourceDomain::Ocean;
        let channel = Arc::new(MockChannel::new());
        let mut monitor = monitor_with(
            vec![ScriptedClient::new(vec![broken, calm_wind()])],
            WeightsConfig::default(),
            channel,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        let first = monitor.run_cycle().await;
        assert!(matches!(first, Err(MonitorError::Assessment(_))));

        let second = monitor.run_cycle().await.unwrap();
        assert_eq!(second.cycle, 2);
        assert_eq!(second.assessment.alert_level, AlertLevel::Normal);
    }

    #[tokio::test]
    async fn test_panic_inside_cycle_is_isolated() {
        let mut monitor = monitor_with(
            vec![ScriptedClient::new(vec![quake(7.0)])],
            seismic_dominant(),
            Arc::new(PanickingChannel),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        match monitor.run_cycle().await {
            Err(MonitorError::Panicked(message)) => assert!(message.contains("formatter exploded")),
            other => panic!("unexpected outcome {:?}", other.map(|r| r.cycle)),
        }
        assert!(monitor.last_record().is_none());
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_normal_baseline() {
        let mut config = Config::default();
        config.retry.max_attempts = 1;
        config.retry.base_delay_ms = 1;
        let transport = Arc::new(MockTransport::failing(SourceError::Transport(
            "connection refused".to_string(),
        )));
        let channel = Arc::new(MockChannel::new());
        let mut monitor = Monitor::from_config(
            &config,
            transport,
            fixed_clock(fixed_time()),
            channel.clone(),
        );

        let report = monitor.run_cycle().await.unwrap();

        // The lunar model never needs the network
        assert_eq!(report.observation_count, 8);
        assert_eq!(report.synthetic_count, 7);
        assert_eq!(report.assessment.alert_level, AlertLevel::Normal);
        assert_eq!(channel.attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_signal_interrupts_sleep() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut monitor = monitor_with(
            vec![ScriptedClient::new(vec![calm_wind()])],
            WeightsConfig::default(),
            Arc::new(MockChannel::new()),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        )
        .with_reports(report_tx);

        let handle = tokio::spawn(async move {
            monitor.run(stop_rx).await;
            monitor
        });

        let report = report_rx.recv().await.unwrap();
        assert_eq!(report.cycle, 1);
        stop_tx.send(true).unwrap();

        let monitor = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(monitor.cycles_run(), 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_uses_recovery_interval() {
        let mut broken = calm_wind();
        broken.source_domain = SourceDomain::Ocean;
        let (stop_tx, stop_rx) = watch::channel(false);
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut monitor = monitor_with(
            vec![ScriptedClient::new(vec![broken, calm_wind()])],
            WeightsConfig::default(),
            Arc::new(MockChannel::new()),
            Duration::from_secs(3600),
            Duration::from_millis(10),
        )
        .with_reports(report_tx);

        let handle = tokio::spawn(async move {
            monitor.run(stop_rx).await;
            monitor
        });

        // Only completed cycles report; the first one failed
        let report = tokio::time::timeout(Duration::from_secs(5), report_rx.recv())
            .await
            .expect("no recovery cycle")
            .unwrap();
        assert_eq!(report.cycle, 2);

        stop_tx.send(true).unwrap();
        let monitor = handle.await.unwrap();
        assert_eq!(monitor.cycles_run(), 2);
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_nothing() {
        let (_stop_tx, stop_rx) = watch::channel(true);
        let mut monitor = monitor_with(
            vec![ScriptedClient::new(vec![calm_wind()])],
            WeightsConfig::default(),
            Arc::new(MockChannel::new()),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        assert_eq!(monitor.state(), MonitorState::Init);

        monitor.run(stop_rx).await;

        assert_eq!(monitor.cycles_run(), 0);
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }
}
