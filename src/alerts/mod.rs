/// Deduplication and dispatch of risk alerts
pub mod alert_manager;

/// Telegram, log and mock notification channels
pub mod channel;

pub use alert_manager::{AlertManager, AlertRecord, DispatchReason};
pub use channel::{LogChannel, MockChannel, NotificationChannel, TelegramChannel};
