//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Make GET requests and decode the body
//! - Make POST requests with a JSON body
//! - Send an XML body chosen by content type
//! - Access response data and metadata
//!
//! Run with: `cargo run --example basic_call`

use breakwater::{header, Client, Error, Request};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Request and response records are emitted at info level
    tracing_subscriber::fmt()
        .with_env_filter("breakwater=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .timeout(Duration::from_secs(10))
        .build()?;

    println!("=== GET Request Example ===");
    let response = client.get("/posts/1").await?;
    let post: Post = response.unmarshal()?;

    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!("Request ID: {}", response.request_id);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let response = client.post("/posts", new_post).await?;
    let created: Post = response.unmarshal()?;

    println!("Created post ID: {}", created.id);
    println!("Title: {}", created.title);
    println!();

    println!("=== XML Body Example ===");
    let request = Request::post("/posts")
        .with_headers(header::xml())
        .with_body(NewPost {
            title: "Encoded as XML".to_string(),
            body: "The marshaller follows Content-Type".to_string(),
            user_id: 1,
        })
        .with_request_id("basic-call-xml");

    let response = client.call(request).await?;
    println!("Status: {} (request id {})", response.status, response.request_id);
    println!();

    println!("=== Accessing Response Metadata ===");
    println!("Raw response length: {} bytes", response.body.len());
    println!("Content-Type: {:?}", response.header("content-type"));
    println!("Marshaller: {}", response.marshaller);

    Ok(())
}
