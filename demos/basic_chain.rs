//! Basic example demonstrating a request chain end to end.
//!
//! This example shows how to:
//! - Configure a request with headers and redirects
//! - Decode a JSON response
//! - Reuse the response cache across calls
//! - Inspect every error the chain recorded
//!
//! Run with: `cargo run --example basic_chain`

use httpchain::Client;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("httpchain=debug,basic_chain=info")
        .init();

    println!("=== JSON Example ===");
    let mut post = Post::default();
    let client = Client::new()
        .enable_cache()
        .enable_redirect()
        .get("jsonplaceholder.typicode.com/posts/1")
        .set_header("Accept", ["application/json"])
        .send()
        .await
        .json(&mut post)
        .await;

    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!();

    println!("=== Cached Call ===");
    let mut client = client
        .get("jsonplaceholder.typicode.com/posts/1")
        .send()
        .await;
    if let (Some(response), _) = client.response().await {
        println!("Status: {}", response.status);
        println!("Served from cache: {}", response.from_cache);
    }
    println!();

    println!("=== Errors ===");
    let errors = client.close();
    if errors.is_empty() {
        println!("No errors recorded");
    }
    for error in errors {
        println!("- {}", error);
    }
}
