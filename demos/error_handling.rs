//! Example demonstrating error handling.
//!
//! This example shows how to:
//! - Tell non-2xx responses apart from call failures
//! - Access the raw body when decoding fails
//! - Classify errors with `ErrorKind`
//! - Deal with network failures
//!
//! Run with: `cargo run --example error_handling`

use breakwater::{Client, Error, ErrorKind};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("breakwater=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== Example 1: Non-2xx Responses ===");
    // A 404 is a completed call, not an error
    let response = client.get("/posts/999999").await?;
    if response.is_not_ok() {
        println!("Upstream said no!");
        println!("  Status: {}", response.status);
        println!("  Is client error (4xx): {}", response.status.is_client_error());
        println!("  Is server error (5xx): {}", response.status.is_server_error());
        println!("  Raw response: {}", response.text());
        println!("  Content-Type: {:?}", response.header("content-type"));
    }
    println!();

    println!("=== Example 2: Handling Deserialization Errors ===");
    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct WrongSchema {
        nonexistent_field: String,
    }

    let response = client.get("/posts/1").await?;
    match response.unmarshal::<WrongSchema>() {
        Ok(_) => println!("Unexpected success"),
        Err(Error::DeserializationFailed {
            raw_response,
            serde_error,
            status,
        }) => {
            println!("Deserialization Failed!");
            println!("  Status: {}", status);
            println!("  Serde error: {}", serde_error);
            println!(
                "  Raw response (first 200 chars): {}",
                raw_response.chars().take(200).collect::<String>()
            );
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 3: Classifying Errors ===");
    let errors = vec![
        Error::CircuitOpen {
            name: "orders".to_string(),
        },
        Error::ConcurrencyLimitExceeded {
            name: "orders".to_string(),
            limit: 8,
        },
        Error::Timeout,
        Error::SerializationFailed("unsupported value".to_string()),
        Error::ConfigurationError("Invalid config".to_string()),
    ];

    for error in errors {
        println!("Error: {}", error);
        println!("  Kind: {:?}", error.kind());
        println!("  Rejected by breaker: {}", error.is_admission_rejected());
        println!("  Is timeout: {}", error.is_timeout());
        println!();
    }

    println!("=== Example 4: Handling Network Errors ===");
    let bad_client = Client::builder()
        .base_url("https://this-domain-does-not-exist-12345.com")?
        .build()?;

    match bad_client.get("/").await {
        Ok(_) => println!("Unexpected success"),
        Err(Error::Network(e)) => {
            println!("Network Error!");
            println!("  Error: {}", e);
            println!("  Is connect error: {}", e.is_connect());
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 5: Deciding What To Do ===");
    match bad_client.get("/").await {
        Ok(response) => println!("Status {}", response.status),
        Err(e) => match e.kind() {
            ErrorKind::AdmissionRejected => println!("Back off, the upstream is being shed"),
            ErrorKind::Transport => println!("Transport failure, safe to retry idempotent calls"),
            ErrorKind::Encoding | ErrorKind::Configuration => println!("Fix the request: {}", e),
            ErrorKind::Decode => println!("Schema mismatch: {}", e),
        },
    }

    Ok(())
}
