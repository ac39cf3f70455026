/// Error types for sources, assessment, alerts and configuration
pub mod error;

/// Observation data model shared by every stage
pub mod events;

/// Injectable time source
pub mod clock;

/// Configuration management
pub mod config;

/// Source clients and per-cycle acquisition
pub mod collectors;

/// Per-domain scoring rules
pub mod scoring;

/// Weighted risk engine
pub mod aggregator;

/// Alert deduplication and notification channels
pub mod alerts;

/// The monitoring loop
pub mod monitoring;

// Re-export commonly used types
pub use error::{AlertError, AssessmentError, ConfigError, MonitorError, SourceError};
pub use events::{AlertLevel, Observation, SourceDomain};
pub use monitoring::{CycleReport, Monitor};
