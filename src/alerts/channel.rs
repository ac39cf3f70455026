//! Outbound notification channels
//!
//! Channels take plain text and own their formatting: markup, escaping and
//! length limits are applied here, never by the alert manager.

use crate::collectors::http::{HttpRequest, HttpTransport};
use crate::config::TelegramConfig;
use crate::error::AlertError;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Telegram rejects messages longer than this many characters
pub const TELEGRAM_MAX_CHARS: usize = 4096;

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;

/// A destination for alert messages
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `text`, reporting why delivery failed
    fn deliver<'a>(&'a self, text: &'a str) -> DeliveryFuture<'a>;

    /// Fire-and-forget delivery: failures are logged and reported as `false`
    fn send<'a>(&'a self, text: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match self.deliver(text).await {
                Ok(()) => true,
                Err(e) => {
                    error!("{} delivery failed: {}", self.name(), e);
                    false
                }
            }
        })
    }
}

/// Telegram bot `sendMessage` in HTML parse mode
pub struct TelegramChannel {
    transport: Arc<dyn HttpTransport>,
    config: TelegramConfig,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(transport: Arc<dyn HttpTransport>, config: TelegramConfig) -> Self {
        Self { transport, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Escape the text and bold its first line
    pub fn render(text: &str) -> String {
        let (headline, rest) = match text.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (text, None),
        };
        let mut html = format!("<b>{}</b>", escape_html(headline));
        if let Some(rest) = rest {
            html.push('\n');
            html.push_str(&escape_html(rest));
        }

        if html.chars().count() > TELEGRAM_MAX_CHARS {
            // Markup could be cut mid-tag, so fall back to escaped plain text
            truncate_escaped(&escape_html(text), TELEGRAM_MAX_CHARS)
        } else {
            html
        }
    }
}

impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn deliver<'a>(&'a self, text: &'a str) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let request = HttpRequest::post_json(
                self.endpoint(),
                json!({
                    "chat_id": self.config.chat_id,
                    "text": Self::render(text),
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            );

            let response = self.transport.send(&request).await?;
            let reply: Option<TelegramReply> = serde_json::from_str(&response.body).ok();
            let accepted = (200..300).contains(&response.status)
                && reply.as_ref().map(|r| r.ok).unwrap_or(true);

            if accepted {
                info!("Telegram message delivered to chat {}", self.config.chat_id);
                Ok(())
            } else {
                Err(AlertError::Rejected {
                    status: response.status,
                    description: reply
                        .and_then(|r| r.description)
                        .unwrap_or_else(|| "no description".to_string()),
                })
            }
        })
    }
}

/// Writes alerts to the log when no messaging credentials are configured
#[derive(Debug, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver<'a>(&'a self, text: &'a str) -> DeliveryFuture<'a> {
        Box::pin(async move {
            info!("ALERT\n{}", text);
            Ok(())
        })
    }
}

/// Recording channel for tests
///
/// Fails the first `failures` deliveries, then accepts everything.
#[derive(Debug, Default)]
pub struct MockChannel {
    failures: usize,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationChannel for MockChannel {
    fn name(&self) -> &str {
        "mock"
    }

    fn deliver<'a>(&'a self, text: &'a str) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(AlertError::NotificationFailed(format!(
                    "simulated failure {}",
                    attempt + 1
                )));
            }
            self.delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(text.to_string());
            Ok(())
        })
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Truncate to at most `max_chars` characters, marking the cut with "..."
///
/// Cuts on character boundaries, so multi-byte text never panics.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    format!("{}...", &text[..cut])
}

/// Like [`truncate_text`] for HTML-escaped text: never leaves a partial
/// entity such as `&am` before the "..." marker
fn truncate_escaped(escaped: &str, max_chars: usize) -> String {
    let truncated = truncate_text(escaped, max_chars);
    let Some(head) = truncated.strip_suffix("...").filter(|_| truncated != escaped) else {
        return truncated;
    };

    match head.rfind('&') {
        Some(amp) if !head[amp..].contains(';') => format!("{}...", &head[..amp]),
        _ => truncated,
    }
}
