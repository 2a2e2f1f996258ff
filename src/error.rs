//! Error types for outbound HTTP calls.
//!
//! Every failure surfaces to the immediate caller as a distinguishable
//! [`Error`] variant. Nothing in this crate retries on its own; callers that
//! want retries layer them above [`Client::call`](crate::Client::call) and can
//! use [`Error::kind`] to decide what is worth retrying.

use http::StatusCode;

/// The main error type for outbound HTTP calls.
///
/// # Examples
///
/// ```no_run
/// use breakwater::{Client, Error, Request};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.call(Request::get("/items/1")).await {
///     Ok(response) if response.is_ok() => println!("body: {}", response.text()),
///     Ok(response) => println!("upstream said {}", response.status),
///     Err(e) if e.is_admission_rejected() => println!("breaker refused the call: {}", e),
///     Err(e) => println!("call failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed,
    /// body could not be read, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out, either at the transport or inside the circuit
    /// breaker's measured section.
    #[error("Request timed out")]
    Timeout,

    /// The circuit breaker is open and refused the call without contacting
    /// the upstream service.
    #[error("Circuit breaker {name} is open")]
    CircuitOpen {
        /// The breaker's name
        name: String,
    },

    /// The circuit breaker's in-flight cap was reached and the call was
    /// refused without contacting the upstream service.
    #[error("Circuit breaker {name} rejected the call: {limit} requests already in flight")]
    ConcurrencyLimitExceeded {
        /// The breaker's name
        name: String,
        /// The configured in-flight cap
        limit: usize,
    },

    /// Failed to decode a response body into the requested type.
    ///
    /// The raw body is preserved to make production debugging easier.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to decode
        raw_response: String,
        /// The decoder's error message
        serde_error: String,
        /// The HTTP status code of the response
        status: StatusCode,
    },

    /// Invalid configuration was provided.
    ///
    /// Raised once when the client is constructed, or when a request carries
    /// an invalid header.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body. The transport was not contacted.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid construction parameters or request configuration.
    Configuration,
    /// The request body could not be encoded.
    Encoding,
    /// The circuit breaker refused the call.
    AdmissionRejected,
    /// The network round trip failed or timed out.
    Transport,
    /// A response body could not be decoded.
    Decode,
}

impl Error {
    /// Returns the [`ErrorKind`] this error belongs to.
    ///
    /// # Examples
    ///
    /// ```
    /// use breakwater::{Error, ErrorKind};
    ///
    /// let err = Error::CircuitOpen { name: "orders".to_string() };
    /// assert_eq!(err.kind(), ErrorKind::AdmissionRejected);
    ///
    /// let err = Error::SerializationFailed("bad value".to_string());
    /// assert_eq!(err.kind(), ErrorKind::Encoding);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::Timeout => ErrorKind::Transport,
            Error::CircuitOpen { .. } | Error::ConcurrencyLimitExceeded { .. } => {
                ErrorKind::AdmissionRejected
            }
            Error::DeserializationFailed { .. } => ErrorKind::Decode,
            Error::ConfigurationError(_) | Error::InvalidUrl(_) => ErrorKind::Configuration,
            Error::SerializationFailed(_) => ErrorKind::Encoding,
        }
    }

    /// Returns `true` if the circuit breaker refused the call before it
    /// reached the network.
    pub fn is_admission_rejected(&self) -> bool {
        self.kind() == ErrorKind::AdmissionRejected
    }

    /// Returns `true` for transport timeouts.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Network(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Folds transport timeouts into [`Error::Timeout`].
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }
}

/// A specialized `Result` type for outbound HTTP calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Timeout.kind(), ErrorKind::Transport);
        assert_eq!(
            Error::ConcurrencyLimitExceeded {
                name: "svc".to_string(),
                limit: 4,
            }
            .kind(),
            ErrorKind::AdmissionRejected
        );
        assert_eq!(
            Error::ConfigurationError("missing".to_string()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::DeserializationFailed {
                raw_response: "<".to_string(),
                serde_error: "eof".to_string(),
                status: StatusCode::OK,
            }
            .kind(),
            ErrorKind::Decode
        );
    }

    #[test]
    fn test_admission_rejected_helpers() {
        let err = Error::CircuitOpen {
            name: "svc".to_string(),
        };
        assert!(err.is_admission_rejected());
        assert!(!err.is_timeout());
        assert!(err.status().is_none());
        assert!(err.to_string().contains("svc"));
    }

    #[test]
    fn test_raw_response_on_decode_error() {
        let err = Error::DeserializationFailed {
            raw_response: "not json".to_string(),
            serde_error: "expected value".to_string(),
            status: StatusCode::BAD_GATEWAY,
        };
        assert_eq!(err.raw_response(), Some("not json"));
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }
}
