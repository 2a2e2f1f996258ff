//! HTTP client with circuit breaking and correlated request logging.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`Client::new`] with a [`ClientConfig`] or [`ClientBuilder`] to create
//! one.

use crate::{
    circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig},
    config::{BasicAuth, ClientConfig},
    header,
    observe::{self, LogConfig},
    request::PreparedRequest,
    Error, Request, Response, Result,
};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// An HTTP client bound to one upstream service.
///
/// The client is cheap to clone and safe to share between tasks. Clones share
/// the connection pool and the circuit breaker.
///
/// # Examples
///
/// ```no_run
/// use breakwater::{CircuitBreakerConfig, Client, Request};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct CreateItem {
///     name: String,
/// }
///
/// #[derive(Deserialize)]
/// struct Item {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), breakwater::Error> {
/// let client = Client::builder()
///     .base_url("https://inventory.internal")?
///     .timeout(Duration::from_secs(5))
///     .circuit_breaker(CircuitBreakerConfig::enabled().request_volume_threshold(20))
///     .build()?;
///
/// let item: Item = client.get("/items/1").await?.unmarshal()?;
/// println!("item: {}", item.name);
///
/// let request = Request::post("/items").with_body(CreateItem {
///     name: "widget".to_string(),
/// });
/// let created = client.call(request).await?;
/// println!("created with status {}", created.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    default_headers: HeaderMap,
    basic_auth: Option<BasicAuth>,
    timeout: Option<Duration>,
    connections: Option<Arc<Semaphore>>,
    breaker: Option<Arc<CircuitBreaker>>,
    log: LogConfig,
}

/// A fully read response.
struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// A failed round trip, with status and headers when they had arrived.
struct Failure {
    error: Error,
    partial: Option<(StatusCode, HeaderMap)>,
}

impl Failure {
    fn bare(error: Error) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use breakwater::Client;
    ///
    /// # async fn example() -> Result<(), breakwater::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from a configuration.
    ///
    /// When the breaker is enabled it is created here under a fresh UUID name
    /// and lives as long as the client and its clones.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid (see
    /// [`ClientConfig::validate`]) or the transport cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let timeout = (!config.timeout.is_zero()).then_some(config.timeout);

        let mut http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify);
        if config.max_conns_per_host > 0 {
            http_client = http_client.pool_max_idle_per_host(config.max_conns_per_host);
        }
        if let Some(timeout) = timeout {
            http_client = http_client.timeout(timeout);
        }
        let http_client = http_client.build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let connections = (config.max_conns_per_host > 0)
            .then(|| Arc::new(Semaphore::new(config.max_conns_per_host)));

        let breaker = config.circuit_breaker.enabled.then(|| {
            let cap = config.circuit_breaker.concurrency_cap(config.max_conns_per_host);
            let breaker = CircuitBreaker::new(
                uuid::Uuid::new_v4().to_string(),
                config.circuit_breaker.clone(),
                cap,
            );
            tracing::debug!(
                breaker = %breaker.name(),
                base_url = %config.base_url,
                max_concurrent = cap,
                "Circuit breaker configured"
            );
            Arc::new(breaker)
        });

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: config.base_url,
                default_headers: config.default_headers,
                basic_auth: config.basic_auth.filter(BasicAuth::is_set),
                timeout,
                connections,
                breaker,
                log: config.log,
            }),
        })
    }

    /// The base URL every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The client's circuit breaker, when enabled.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.inner.breaker.as_deref()
    }

    /// Sends a request and reads the whole response.
    ///
    /// Exactly one transport call is made; nothing is retried. Non-2xx
    /// statuses are returned as a [`Response`], not as an error.
    ///
    /// # Errors
    ///
    /// - [`Error::SerializationFailed`] if the body cannot be encoded; the
    ///   transport is not contacted.
    /// - [`Error::CircuitOpen`] or [`Error::ConcurrencyLimitExceeded`] if the
    ///   breaker refuses the call; the transport is not contacted.
    /// - [`Error::Network`] or [`Error::Timeout`] if the round trip or body
    ///   read fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use breakwater::{header, Client, Request};
    ///
    /// # async fn example() -> Result<(), breakwater::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://legacy.internal")?
    ///     .build()?;
    ///
    /// let request = Request::post("/soap")
    ///     .with_headers(header::text_xml())
    ///     .with_raw_body("<Envelope/>");
    ///
    /// let response = client.call(request).await?;
    /// println!("{} in {:?}", response.status, response.latency);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call(&self, request: Request) -> Result<Response> {
        let deadline = self.inner.timeout.map(|limit| Instant::now() + limit);
        let prepared = request.prepare(&self.inner.base_url, &self.inner.default_headers)?;

        observe::request(&prepared, &self.inner.log);

        let http_request = self.build_http_request(&prepared)?;

        let admission = match &self.inner.breaker {
            Some(breaker) => match breaker.admit() {
                Ok(admission) => Some(admission),
                Err(e) => {
                    observe::rejected(&prepared, &e);
                    return Err(e);
                }
            },
            None => None,
        };

        let start = Instant::now();
        let outcome = self.exchange(http_request, deadline).await;
        let latency = start.elapsed();

        match outcome {
            Ok(exchange) => {
                self.settle(admission, exchange.status);
                observe::response(
                    &prepared,
                    exchange.status,
                    &exchange.headers,
                    &exchange.body,
                    latency,
                    &self.inner.log,
                );
                Ok(Response::new(
                    exchange.status,
                    exchange.headers,
                    exchange.body,
                    prepared.marshaller,
                    latency,
                    prepared.request_id,
                ))
            }
            Err(failure) => {
                if let Some(admission) = admission {
                    admission.failure();
                }
                observe::failure(
                    &prepared,
                    &failure.error,
                    failure.partial.as_ref(),
                    latency,
                    &self.inner.log,
                );
                Err(failure.error)
            }
        }
    }

    fn build_http_request(&self, prepared: &PreparedRequest) -> Result<reqwest::Request> {
        let mut request = self
            .inner
            .http_client
            .request(prepared.method.clone(), prepared.url.clone())
            .headers(prepared.headers.clone());

        if !prepared.body.is_empty() {
            request = request.body(prepared.body.clone());
        }

        let auth = prepared
            .basic_auth
            .as_ref()
            .filter(|auth| auth.is_set())
            .or(self.inner.basic_auth.as_ref())
            .filter(|_| !prepared.headers.contains_key(AUTHORIZATION));
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        Ok(request.build()?)
    }

    /// Runs the round trip, including any wait for a connection slot, until
    /// the call's deadline or the breaker's timeout, whichever comes first.
    async fn exchange(
        &self,
        request: reqwest::Request,
        deadline: Option<Instant>,
    ) -> std::result::Result<Exchange, Failure> {
        let breaker_deadline = self
            .inner
            .breaker
            .as_ref()
            .and_then(|breaker| breaker.config().timeout)
            .map(|limit| Instant::now() + limit);

        let deadline = match (deadline, breaker_deadline) {
            (Some(call), Some(breaker)) => Some(call.min(breaker)),
            (call, breaker) => call.or(breaker),
        };

        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.round_trip(request))
                .await
                .unwrap_or_else(|_| Err(Failure::bare(Error::Timeout))),
            None => self.round_trip(request).await,
        }
    }

    /// Sends the request and reads the whole body. The transport response is
    /// consumed on every path.
    async fn round_trip(&self, request: reqwest::Request) -> std::result::Result<Exchange, Failure> {
        let _connection = self.acquire_connection().await.map_err(Failure::bare)?;

        let response = self
            .inner
            .http_client
            .execute(request)
            .await
            .map_err(|e| Failure::bare(Error::from_transport(e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => Ok(Exchange {
                status,
                headers,
                body,
            }),
            Err(e) => Err(Failure {
                error: Error::from_transport(e),
                partial: Some((status, headers)),
            }),
        }
    }

    /// Waits for a connection slot when `max_conns_per_host` is set. The wait
    /// counts against the call's deadline.
    async fn acquire_connection(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(connections) = &self.inner.connections else {
            return Ok(None);
        };

        Arc::clone(connections)
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|_| Error::ConfigurationError("Connection limiter closed".to_string()))
    }

    fn settle(&self, admission: Option<Admission>, status: StatusCode) {
        let Some(admission) = admission else {
            return;
        };

        let counts_as_failure = status.is_server_error()
            && self
                .inner
                .breaker
                .as_ref()
                .is_some_and(|breaker| breaker.config().count_server_errors);

        if counts_as_failure {
            admission.failure();
        } else {
            admission.success();
        }
    }

    /// Makes a GET request to the specified path.
    pub async fn get(&self, path: impl Into<String>) -> Result<Response> {
        self.call(Request::get(path)).await
    }

    /// Makes a POST request with a body encoded per the default content type.
    pub async fn post<T>(&self, path: impl Into<String>, body: T) -> Result<Response>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.call(Request::post(path).with_body(body)).await
    }

    /// Makes a PUT request with a body encoded per the default content type.
    pub async fn put<T>(&self, path: impl Into<String>, body: T) -> Result<Response>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.call(Request::put(path).with_body(body)).await
    }

    /// Makes a PATCH request with a body encoded per the default content type.
    pub async fn patch<T>(&self, path: impl Into<String>, body: T) -> Result<Response>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.call(Request::patch(path).with_body(body)).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete(&self, path: impl Into<String>) -> Result<Response> {
        self.call(Request::delete(path)).await
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use breakwater::{CircuitBreakerConfig, ClientBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), breakwater::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .max_conns_per_host(32)
///     .basic_auth("svc", "secret")
///     .circuit_breaker(
///         CircuitBreakerConfig::enabled()
///             .error_percent_threshold(50)
///             .sleep_window(Duration::from_secs(5)),
///     )
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        url::Url::parse(url.as_ref())?;
        self.config.base_url = url.as_ref().to_string();
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = header::parse_pair(name, value)?;
        self.config.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Caps concurrent connections to the base host.
    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.config.max_conns_per_host = max;
        self
    }

    /// Accepts invalid TLS certificates.
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.config.insecure_skip_verify = skip;
        self
    }

    /// Sets credentials attached to every call.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.basic_auth = Some(BasicAuth::new(username, password));
        self
    }

    /// Sets the circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Sets the logging policy.
    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.config.log = config;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or if the client
    /// configuration is invalid.
    pub fn build(self) -> Result<Client> {
        Client::new(self.config)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ClientConfig> for ClientBuilder {
    fn from(config: ClientConfig) -> Self {
        Self { config }
    }
}
