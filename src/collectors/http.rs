//! HTTP seam shared by every networked source client and the Telegram channel

use crate::collectors::retry::{with_retry, RetryPolicy};
use crate::error::SourceError;
use crate::events::Timestamp;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, SourceError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Outbound request description, independent of the HTTP library
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            json_body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, body and retry hint of a completed exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
            body: String::new(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Map the status onto the source error taxonomy
    pub fn into_body(self) -> Result<String, SourceError> {
        match self.status {
            200..=299 => Ok(self.body),
            401 | 403 => Err(SourceError::Auth(self.status)),
            429 => Err(SourceError::RateLimited {
                retry_after: self.retry_after,
            }),
            500..=599 => Err(SourceError::Server(self.status)),
            status => Err(SourceError::Client(status)),
        }
    }
}

/// Performs one HTTP exchange
///
/// Implementations report transport failures as errors and every completed
/// exchange, whatever its status, as a response.
pub trait HttpTransport: Send + Sync {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a>;
}

/// `reqwest`-backed transport used in production
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tidewatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            for (key, value) in &request.headers {
                builder = builder.header(key.as_str(), value.as_str());
            }
            if let Some(body) = &request.json_body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, Utc::now()));
            let body = response.text().await?;

            Ok(HttpResponse {
                status,
                retry_after,
                body,
            })
        })
    }
}

/// Parse a `Retry-After` header given as delta-seconds or as an HTTP date
pub fn parse_retry_after(value: &str, now: Timestamp) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    // A date in the past means "retry now"
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Send `request` under the retry policy and return the body of the first
/// successful response
///
/// Each attempt is bounded by the policy's request timeout.
pub async fn fetch_text(
    transport: &dyn HttpTransport,
    policy: &RetryPolicy,
    label: &str,
    request: &HttpRequest,
) -> Result<String, SourceError> {
    fetch_parsed(transport, policy, label, request, Ok).await
}

/// Like [`fetch_text`], decoding the body as JSON
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    policy: &RetryPolicy,
    label: &str,
    request: &HttpRequest,
) -> Result<T, SourceError> {
    fetch_parsed(transport, policy, label, request, |body| {
        Ok(serde_json::from_str(&body)?)
    })
    .await
}

/// Fetch and post-process a body inside the retry loop
///
/// A retryable error returned by `parse` (an envelope carrying a 5xx status,
/// say) is retried like a transport failure.
pub async fn fetch_parsed<T, P>(
    transport: &dyn HttpTransport,
    policy: &RetryPolicy,
    label: &str,
    request: &HttpRequest,
    parse: P,
) -> Result<T, SourceError>
where
    P: Fn(String) -> Result<T, SourceError>,
{
    let parse = &parse;
    let timeout = policy.request_timeout;
    with_retry(policy, label, move || async move {
        let response = tokio::time::timeout(timeout, transport.send(request))
            .await
            .map_err(|_| SourceError::Timeout)??;
        parse(response.into_body()?)
    })
    .await
}

/// Scripted transport for tests
///
/// Requests are matched against routes by URL substring, first match wins.
/// Each route replays its responses in order and keeps repeating the last one.
pub struct MockTransport {
    routes: Vec<MockRoute>,
    delay: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

struct MockRoute {
    pattern: String,
    responses: Vec<Result<HttpResponse, SourceError>>,
    cursor: AtomicUsize,
}

impl MockTransport {
    /// Answer every request from one scripted sequence
    pub fn with_responses(responses: Vec<Result<HttpResponse, SourceError>>) -> Self {
        Self::new().route("", responses)
    }

    /// Transport that fails every request with the same error
    pub fn failing(error: SourceError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(mut self, pattern: &str, responses: Vec<Result<HttpResponse, SourceError>>) -> Self {
        self.routes.push(MockRoute {
            pattern: pattern.to_string(),
            responses,
            cursor: AtomicUsize::new(0),
        });
        self
    }

    /// Delay every response (useful for exercising budgets)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_response(&self, url: &str) -> Result<HttpResponse, SourceError> {
        let route = self
            .routes
            .iter()
            .find(|route| url.contains(&route.pattern) && !route.responses.is_empty());

        match route {
            Some(route) => {
                let index = route.cursor.fetch_add(1, Ordering::SeqCst);
                let last = route.responses.len() - 1;
                route.responses[index.min(last)].clone()
            }
            None => Ok(HttpResponse::status(404)),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for MockTransport {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.next_response(&request.url)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            request_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(HttpResponse::ok("x").into_body(), Ok("x".to_string()));
        assert_eq!(
            HttpResponse::status(401).into_body(),
            Err(SourceError::Auth(401))
        );
        assert_eq!(
            HttpResponse::status(403).into_body(),
            Err(SourceError::Auth(403))
        );
        assert_eq!(
            HttpResponse::status(429)
                .with_retry_after(Duration::from_secs(3))
                .into_body(),
            Err(SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            })
        );
        assert_eq!(
            HttpResponse::status(502).into_body(),
            Err(SourceError::Server(502))
        );
        assert_eq!(
            HttpResponse::status(404).into_body(),
            Err(SourceError::Client(404))
        );
    }

    #[test]
    fn test_parse_retry_after_seconds_and_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();

        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[tokio::test]
    async fn test_fetch_retries_server_errors() {
        let transport = MockTransport::with_responses(vec![
            Ok(HttpResponse::status(503)),
            Ok(HttpResponse::status(429)),
            Ok(HttpResponse::ok("{\"value\": 1}")),
        ]);
        let request = HttpRequest::get("https://example.test/data");

        let value: serde_json::Value = fetch_json(&transport, &fast_policy(), "test", &request)
            .await
            .unwrap();

        assert_eq!(value["value"], 1);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_invalid_json() {
        let transport = MockTransport::with_responses(vec![Ok(HttpResponse::ok("not json"))]);
        let request = HttpRequest::get("https://example.test/data");

        let result: Result<serde_json::Value, _> =
            fetch_json(&transport, &fast_policy(), "test", &request).await;

        assert!(matches!(result, Err(SourceError::Validation(_))));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let transport = MockTransport::with_responses(vec![Ok(HttpResponse::ok("late"))])
            .with_delay(Duration::from_secs(5));
        let policy = RetryPolicy {
            max_attempts: 1,
            request_timeout: Duration::from_millis(20),
            ..fast_policy()
        };
        let request = HttpRequest::get("https://example.test/slow");

        let result = fetch_text(&transport, &policy, "test", &request).await;

        assert_eq!(result, Err(SourceError::Timeout));
    }

    #[tokio::test]
    async fn test_mock_routes_by_url() {
        let transport = MockTransport::new()
            .route("/flares", vec![Ok(HttpResponse::ok("flares"))])
            .route("/kp", vec![Ok(HttpResponse::ok("kp"))]);

        let kp = transport
            .send(&HttpRequest::get("https://example.test/kp"))
            .await
            .unwrap();
        let other = transport
            .send(&HttpRequest::get("https://example.test/unknown"))
            .await
            .unwrap();

        assert_eq!(kp.body, "kp");
        assert_eq!(other.status, 404);
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://example.test")
            .query("bbox", "1,2,3,4")
            .header("api_key", "secret");

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.header_value("API_KEY"), Some("secret"));
        assert_eq!(request.query, vec![("bbox".to_string(), "1,2,3,4".to_string())]);
    }
}
