//! Outbound request description and preparation.
//!
//! A [`Request`] is what callers build. [`Client::call`](crate::Client::call)
//! consumes it and resolves the derived parts (full URL, required headers,
//! marshaller, encoded body) into a `PreparedRequest` before anything is sent.

use crate::config::BasicAuth;
use crate::context::{self, RequestId};
use crate::header::{self, X_REQUEST_ID};
use crate::marshaller::{CodecError, Marshaller};
use crate::{Error, Result};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use url::Url;

type EncodeFn = dyn Fn(Marshaller) -> std::result::Result<Vec<u8>, CodecError> + Send + Sync;

/// The body of a [`Request`].
///
/// Text and byte bodies are sent verbatim whatever the declared content
/// type. Only [`Body::Value`] goes through the request's [`Marshaller`].
#[derive(Default)]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// A pre-encoded payload.
    Bytes(Bytes),
    /// A pre-encoded text payload.
    Text(String),
    /// A structured value, encoded once the content type is known.
    Value(Box<EncodeFn>),
}

impl Body {
    /// Wraps a serializable value.
    ///
    /// Strings and byte buffers are not marshalled: they become
    /// [`Body::Text`] or [`Body::Bytes`] and are sent verbatim.
    pub fn value<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        let mut slot = Some(value);
        let any = &mut slot as &mut dyn Any;

        if let Some(text) = any.downcast_mut::<Option<String>>() {
            return Body::Text(text.take().unwrap_or_default());
        }
        if let Some(text) = any.downcast_mut::<Option<&'static str>>() {
            return Body::Text(text.take().unwrap_or_default().to_string());
        }
        if let Some(bytes) = any.downcast_mut::<Option<Vec<u8>>>() {
            return Body::Bytes(Bytes::from(bytes.take().unwrap_or_default()));
        }
        if let Some(bytes) = any.downcast_mut::<Option<Bytes>>() {
            return Body::Bytes(bytes.take().unwrap_or_default());
        }

        match slot {
            Some(value) => Body::Value(Box::new(move |marshaller| marshaller.marshal(&value))),
            None => Body::Empty,
        }
    }

    fn encode(self, marshaller: Marshaller) -> Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bytes) => Ok(bytes),
            Body::Text(text) => Ok(Bytes::from(text)),
            Body::Value(encode) => encode(marshaller)
                .map(Bytes::from)
                .map_err(|e| Error::SerializationFailed(e.to_string())),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Body::Value(_) => f.write_str("Value(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

/// Per-request log visibility switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Skip the outbound record and any admission-rejection record.
    pub hide_request: bool,
    /// Skip the inbound, failure and admission-rejection records.
    pub hide_response: bool,
    /// Log the whole request body.
    pub unlimited_request_body: bool,
    /// Log the whole response body.
    pub unlimited_response_body: bool,
}

/// A single outbound HTTP call.
///
/// # Examples
///
/// ```
/// use breakwater::Request;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Order { sku: String, quantity: u32 }
///
/// # fn example() -> Result<(), breakwater::Error> {
/// let request = Request::post("/orders")
///     .with_header("Content-Type", "application/xml")?
///     .with_body(Order { sku: "A-1".to_string(), quantity: 2 })
///     .with_request_id("order-flow-17")
///     .hide_response_log();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,

    /// Appended verbatim to the client's base URL.
    pub path: String,

    /// The request payload.
    pub body: Body,

    /// Headers for this request. Values given here are never overwritten.
    pub headers: HeaderMap,

    /// Query parameters appended to the full URL.
    pub query_params: Vec<(String, String)>,

    /// Replaces the client's credentials for this call.
    pub basic_auth: Option<BasicAuth>,

    /// Correlation id for this call.
    pub request_id: Option<String>,

    /// Log visibility for this call.
    pub log: LogOptions,
}

impl Request {
    /// Creates a request with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: Body::Empty,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            basic_auth: None,
            request_id: None,
            log: LogOptions::default(),
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Creates a PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = header::parse_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Merges a header map into the request, e.g. one of the
    /// [`header`](crate::header) presets.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a structured body, encoded with the request's marshaller.
    ///
    /// See [`Body::value`]: strings and byte buffers are sent as is.
    pub fn with_body<T>(mut self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body = Body::value(value);
        self
    }

    /// Sets a pre-encoded body that is sent as is.
    pub fn with_raw_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Uses these credentials instead of the client's.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth::new(username, password));
        self
    }

    /// Sets the correlation id for this call.
    ///
    /// An `X-Request-ID` header already on the request takes precedence, so
    /// the id that is logged is always the one sent.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Suppresses the outbound log record.
    pub fn hide_request_log(mut self) -> Self {
        self.log.hide_request = true;
        self
    }

    /// Suppresses the inbound and failure log records.
    pub fn hide_response_log(mut self) -> Self {
        self.log.hide_response = true;
        self
    }

    /// Logs request and response bodies without the size cap.
    pub fn unlimited_body_log(mut self) -> Self {
        self.log.unlimited_request_body = true;
        self.log.unlimited_response_body = true;
        self
    }

    /// Resolves URL, headers, marshaller and body.
    pub(crate) fn prepare(self, base_url: &str, default_headers: &HeaderMap) -> Result<PreparedRequest> {
        let mut headers = self.headers;
        for name in default_headers.keys() {
            if !headers.contains_key(name) {
                for value in default_headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        let request_id = RequestId::from_headers(&headers)
            .unwrap_or_else(|| context::resolve(self.request_id.as_deref()));

        headers
            .entry(CONTENT_TYPE)
            .or_insert_with(|| HeaderValue::from_static(header::APPLICATION_JSON));
        if !headers.contains_key(X_REQUEST_ID) {
            let value = HeaderValue::from_str(request_id.as_str()).map_err(|e| {
                Error::ConfigurationError(format!("Invalid request id {:?}: {}", request_id.as_str(), e))
            })?;
            headers.insert(X_REQUEST_ID, value);
        }

        let mut url = Url::parse(&format!("{}{}", base_url, self.path))?;
        if !self.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query_params);
        }

        let marshaller = Marshaller::from_header(headers.get(CONTENT_TYPE));
        let body = self.body.encode(marshaller)?;

        Ok(PreparedRequest {
            method: self.method,
            url,
            headers,
            body,
            marshaller,
            request_id,
            basic_auth: self.basic_auth,
            log: self.log,
        })
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

/// A request whose derived parts are resolved and ready to send.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) marshaller: Marshaller,
    pub(crate) request_id: RequestId,
    pub(crate) basic_auth: Option<BasicAuth>,
    pub(crate) log: LogOptions,
}
