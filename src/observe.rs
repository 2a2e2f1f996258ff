//! Structured, size-bounded log records for outbound calls.
//!
//! Records go through `tracing`; installing a subscriber is up to the
//! application. Emitting a record never fails the call it describes.

use crate::request::PreparedRequest;
use crate::Error;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Default cap on logged body bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1000;

/// Appended to a logged body that was cut at the cap.
pub const TRUNCATION_MARKER: &str = "...";

/// Logging policy shared by every call made through a client.
///
/// # Examples
///
/// ```
/// use breakwater::LogConfig;
///
/// let config: LogConfig = serde_json::from_str(r#"{ "max_body_bytes": 256 }"#).unwrap();
/// assert_eq!(config.max_body_bytes, 256);
/// assert!(config.log_transport_errors);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Bodies longer than this are cut and suffixed with [`TRUNCATION_MARKER`],
    /// unless the request asks for unlimited body logging.
    pub max_body_bytes: usize,

    /// Whether a failed round trip emits an error record.
    ///
    /// The record carries the URL, the error, and the status and headers when
    /// the failure happened after they arrived.
    pub log_transport_errors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_transport_errors: true,
        }
    }
}

/// Cuts `bytes` to at most `limit` bytes, reporting whether anything was cut.
///
/// # Examples
///
/// ```
/// use breakwater::observe::cap;
///
/// assert_eq!(cap(b"abcdef", 4), (&b"abcd"[..], true));
/// assert_eq!(cap(b"abc", 4), (&b"abc"[..], false));
/// ```
pub fn cap(bytes: &[u8], limit: usize) -> (&[u8], bool) {
    if bytes.len() > limit {
        (&bytes[..limit], true)
    } else {
        (bytes, false)
    }
}

/// Renders a body for a log record.
pub(crate) fn body_text(bytes: &[u8], limit: usize, unlimited: bool) -> String {
    if unlimited {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let (kept, truncated) = cap(bytes, limit);
    let mut text = String::from_utf8_lossy(kept).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

pub(crate) fn request(prepared: &PreparedRequest, config: &LogConfig) {
    if prepared.log.hide_request {
        return;
    }

    tracing::info!(
        request_id = %prepared.request_id,
        method = %prepared.method,
        url = %prepared.url,
        headers = ?prepared.headers,
        body = %body_text(&prepared.body, config.max_body_bytes, prepared.log.unlimited_request_body),
        "Sending HTTP request"
    );
}

pub(crate) fn response(
    prepared: &PreparedRequest,
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    latency: Duration,
    config: &LogConfig,
) {
    if prepared.log.hide_response {
        return;
    }

    tracing::info!(
        request_id = %prepared.request_id,
        url = %prepared.url,
        status = status.as_u16(),
        headers = ?headers,
        latency_ms = latency.as_millis(),
        body = %body_text(body, config.max_body_bytes, prepared.log.unlimited_response_body),
        "Received HTTP response"
    );
}

pub(crate) fn failure(
    prepared: &PreparedRequest,
    error: &Error,
    partial: Option<&(StatusCode, HeaderMap)>,
    latency: Duration,
    config: &LogConfig,
) {
    if prepared.log.hide_response || !config.log_transport_errors {
        return;
    }

    match partial {
        Some((status, headers)) => tracing::warn!(
            request_id = %prepared.request_id,
            url = %prepared.url,
            status = status.as_u16(),
            headers = ?headers,
            latency_ms = latency.as_millis(),
            error = %error,
            "HTTP request failed"
        ),
        None => tracing::warn!(
            request_id = %prepared.request_id,
            url = %prepared.url,
            latency_ms = latency.as_millis(),
            error = %error,
            "HTTP request failed"
        ),
    }
}

pub(crate) fn rejected(prepared: &PreparedRequest, error: &Error) {
    if prepared.log.hide_request || prepared.log.hide_response {
        return;
    }

    tracing::warn!(
        request_id = %prepared.request_id,
        method = %prepared.method,
        url = %prepared.url,
        error = %error,
        "HTTP request rejected by circuit breaker"
    );
}
