//! Typed client example
//!
//! Calls the demo user API through a hand-written typed client whose
//! methods dispatch to prebuilt action descriptors.
//!
//! Usage:
//!   # First, start the server in another terminal:
//!   cargo run --bin demo-server
//!
//!   # Then run this client (defaults to http://localhost:3000):
//!   cargo run --bin typed-client
//!
//!   # Or specify a custom server URL:
//!   cargo run --bin typed-client -- http://localhost:8080
//!
//! Set `RUST_LOG=httpapi_client=debug` to see call spans and token events.

use std::env;
use std::time::Duration;

use httpapi_client::CancellationToken;
use httpapi_client::oauth::ClientCredentials;
use httpapi_examples::{SearchQuery, User, UserApiClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let base_url = env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    println!("=== Typed client example ===");
    println!("Server URL: {}", base_url);
    println!();

    let client = UserApiClient::new(
        &base_url,
        ClientCredentials {
            client_id: "demo".to_string(),
            client_secret: "demo-secret".to_string(),
            ..Default::default()
        },
    )
    .await?;

    // Test 1: JSON body plus a header bound from a parameter
    println!("Test 1: create_user()...");
    let created = {
        let user = User {
            id: 0,
            name: "laojiu".to_string(),
            email: Some("laojiu@example.com".to_string()),
        };
        let created = client.create_user(&user, "acme").await?;
        assert_eq!(created.name, "laojiu");
        println!("  PASS: created user {}", created.id);
        created
    };

    // Test 2: path template
    println!("Test 2: get_user()...");
    {
        let user = client.get_user(created.id).await?;
        assert_eq!(user, created);
        println!("  PASS: {:?}", user);
    }

    // Test 3: complex parameter flattened into the query string
    println!("Test 3: search_users()...");
    {
        let query = SearchQuery {
            name: Some("lao".to_string()),
            page: 0,
        };
        let users = client.search_users(&query, CancellationToken::new()).await?;
        assert!(users.iter().any(|user| user.id == created.id));
        println!("  PASS: {} match(es)", users.len());
    }

    // Test 4: a canceled token aborts the call
    println!("Test 4: canceled search_users()...");
    {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .search_users(&SearchQuery::default(), cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        println!("  PASS: {}", err);
    }

    // Test 5: OAuth token fetched once, reused afterwards
    println!("Test 5: me() with client credentials...");
    {
        for _ in 0..3 {
            let me = client.me().await?;
            assert_eq!(me.name, "demo");
        }
        println!("  PASS: authenticated three times");
    }

    // Test 6: missing resource surfaces the status code
    println!("Test 6: get_user() for an unknown id...");
    {
        let err = tokio::time::timeout(Duration::from_secs(5), client.get_user(u64::MAX))
            .await?
            .unwrap_err();
        assert_eq!(err.status().map(|status| status.as_u16()), Some(404));
        println!("  PASS: {}", err);
    }

    println!();
    println!(
        "All tests passed ({} pipelines built).",
        client.executor().pipeline_count()
    );
    Ok(())
}
