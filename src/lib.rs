//! # Breakwater - a resilient outbound HTTP client
//!
//! Breakwater is an HTTP client core built on top of `reqwest` for calling one
//! upstream service. It protects callers with a circuit breaker, picks the body
//! encoding from the request's content type, and writes size-bounded request
//! and response records through `tracing`, correlated by a request id.
//!
//! ## Quick Start
//!
//! ```no_run
//! use breakwater::{CircuitBreakerConfig, Client, Request};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), breakwater::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .max_conns_per_host(16)
//!         .circuit_breaker(
//!             CircuitBreakerConfig::enabled()
//!                 .error_percent_threshold(50)
//!                 .request_volume_threshold(20)
//!                 .sleep_window(Duration::from_secs(5)),
//!         )
//!         .build()?;
//!
//!     let response = client.get("/users/123").await?;
//!     if response.is_ok() {
//!         let user: User = response.unmarshal()?;
//!         println!("User: {} ({:?})", user.name, response.latency);
//!     }
//!
//!     let request = Request::post("/users").with_body(CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     });
//!     let created: User = client.call(request).await?.unmarshal()?;
//!     println!("Created user with ID: {}", created.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Circuit breaker** - Rolling error-rate tracking, half-open trial calls and an in-flight cap, owned per client
//! - **Content-type marshalling** - JSON or XML chosen from `Content-Type`; text and byte bodies are sent verbatim
//! - **Correlated logging** - Every record carries the call's `X-Request-ID`; bodies are capped
//! - **Typed errors** - Admission rejections, transport failures and codec failures are distinct variants
//! - **No hidden retries** - One transport call per request; retry policy belongs to the caller
//!
//! ## Error Handling
//!
//! ```no_run
//! use breakwater::{Client, Error, ErrorKind};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get("/endpoint").await {
//!     Ok(response) if response.is_not_ok() => {
//!         eprintln!("Upstream returned {}: {}", response.status, response.text());
//!     }
//!     Ok(response) => println!("Success: {}", response.text()),
//!     Err(e) => match e.kind() {
//!         ErrorKind::AdmissionRejected => eprintln!("Breaker refused the call: {}", e),
//!         ErrorKind::Transport => eprintln!("Network trouble: {}", e),
//!         _ => eprintln!("Other error: {}", e),
//!     },
//! }
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
mod client;
mod config;
pub mod context;
mod error;
pub mod header;
mod marshaller;
pub mod observe;
mod request;
mod response;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{Client, ClientBuilder};
pub use config::{BasicAuth, ClientConfig};
pub use error::{Error, ErrorKind, Result};
pub use marshaller::{CodecError, Marshaller};
pub use observe::LogConfig;
pub use request::{Body, LogOptions, Request};
pub use response::Response;
