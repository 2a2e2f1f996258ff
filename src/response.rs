//! Response wrapper that keeps the raw body and the request's marshaller.
//!
//! A [`Response`] is returned for every completed round trip, whatever the
//! status code. Use [`Response::is_ok`] to classify it and
//! [`Response::unmarshal`] to decode the body.

use crate::context::RequestId;
use crate::{Error, Marshaller, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::Duration;

/// A completed HTTP exchange.
///
/// # Examples
///
/// ```no_run
/// use breakwater::{Client, Request};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Item {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), breakwater::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.call(Request::get("/items/1")).await?;
/// if response.is_ok() {
///     let item: Item = response.unmarshal()?;
///     println!("{} took {:?}", item.name, response.latency);
/// } else {
///     println!("status {}: {}", response.status, response.text());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body.
    pub body: Bytes,

    /// The marshaller picked for the request's content type, used to decode
    /// this body.
    pub marshaller: Marshaller,

    /// Time from sending the request until the body was fully read.
    pub latency: Duration,

    /// The correlation id of the call.
    pub request_id: RequestId,
}

impl Response {
    /// Creates a new `Response`.
    ///
    /// This is typically called internally by the client once the body has
    /// been read.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        marshaller: Marshaller,
        latency: Duration,
        request_id: RequestId,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            marshaller,
            latency,
            request_id,
        }
    }

    /// Returns `true` when the status code is below 300.
    ///
    /// # Examples
    ///
    /// ```
    /// # use breakwater::{Marshaller, Response, context::RequestId};
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     StatusCode::NO_CONTENT,
    ///     HeaderMap::new(),
    ///     bytes::Bytes::new(),
    ///     Marshaller::Json,
    ///     Duration::from_millis(3),
    ///     RequestId::from("r-1"),
    /// );
    ///
    /// assert!(response.is_ok());
    /// assert!(!response.is_not_ok());
    /// ```
    pub fn is_ok(&self) -> bool {
        self.status.as_u16() < 300
    }

    /// Returns `true` when the status code is 300 or above.
    pub fn is_not_ok(&self) -> bool {
        !self.is_ok()
    }

    /// Decodes the body with the request's marshaller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body attached
    /// when decoding fails. Whether the call itself succeeded is unaffected.
    pub fn unmarshal<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.marshaller.unmarshal(&self.body).map_err(|e| {
            tracing::debug!(
                request_id = %self.request_id,
                status = self.status.as_u16(),
                error = %e,
                "Failed to decode response body"
            );
            Error::DeserializationFailed {
                raw_response: self.text().into_owned(),
                serde_error: e.message,
                status: self.status,
            }
        })
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl AsRef<[u8]> for Response {
    fn as_ref(&self) -> &[u8] {
        &self.body
    }
}
