//! Example demonstrating the circuit breaker.
//!
//! This example shows how to:
//! - Enable the breaker with custom thresholds
//! - Watch it open after repeated failures
//! - Inspect its state and rolling counts
//! - Let it recover through a half-open trial call
//!
//! Run with: `cargo run --example circuit_breaker`

use breakwater::{CircuitBreakerConfig, CircuitState, Client, Error};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("breakwater=info")
        .init();

    // httpbin answers /status/503 with a 503, which we count as a failure
    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .timeout(Duration::from_secs(10))
        .max_conns_per_host(4)
        .circuit_breaker(
            CircuitBreakerConfig::enabled()
                .error_percent_threshold(50)
                .request_volume_threshold(5)
                .sleep_window(Duration::from_secs(2))
                .count_server_errors(true),
        )
        .build()?;

    let Some(breaker) = client.circuit_breaker() else {
        return Ok(());
    };
    println!(
        "Breaker {} allows {} calls in flight",
        breaker.name(),
        breaker.config().concurrency_cap(4)
    );
    println!();

    println!("=== Tripping the breaker ===");
    for i in 1..=7 {
        match client.get("/status/503").await {
            Ok(response) => println!("Call {}: upstream returned {}", i, response.status),
            Err(e) if e.is_admission_rejected() => println!("Call {}: rejected ({})", i, e),
            Err(e) => println!("Call {}: failed ({})", i, e),
        }
    }

    let snapshot = breaker.snapshot();
    println!(
        "State: {:?}, {} failures out of {} calls",
        snapshot.state, snapshot.failures, snapshot.requests
    );
    println!();

    println!("=== Recovering ===");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let response = client.get("/status/200").await?;
    println!("Trial call returned {}", response.status);
    assert_eq!(breaker.state(), CircuitState::Closed);
    println!("State: {:?}", breaker.state());

    Ok(())
}
