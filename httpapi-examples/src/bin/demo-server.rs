//! Demo user API
//!
//! A small REST API the typed client example talks to:
//! - `GET /api/users/{id}`, `GET /api/users?name=&page=`, `POST /api/users`
//! - `GET /api/me` (requires a bearer token)
//! - `POST /connect/token` (`client_credentials` grant)
//!
//! Run with: cargo run --bin demo-server

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use httpapi_examples::{SearchQuery, User, server_addr};
use tokio::sync::RwLock;

const CLIENT_ID: &str = "demo";
const CLIENT_SECRET: &str = "demo-secret";

#[derive(Default)]
struct AppState {
    users: RwLock<Vec<User>>,
    next_id: AtomicU64,
    tokens_issued: AtomicU64,
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<User>, StatusCode> {
    let users = state.users.read().await;
    users
        .iter()
        .find(|user| user.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<User>> {
    const PAGE_SIZE: usize = 10;
    let users = state.users.read().await;
    let matches = users
        .iter()
        .filter(|user| match &query.name {
            Some(name) => user.name.contains(name.as_str()),
            None => true,
        })
        .skip(query.page as usize * PAGE_SIZE)
        .take(PAGE_SIZE)
        .cloned()
        .collect();
    Json(matches)
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut user): Json<User>,
) -> (StatusCode, Json<User>) {
    let tenant = headers
        .get("x-tenant")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("default");
    user.id = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    println!("created user {} for tenant {}", user.id, tenant);
    state.users.write().await.push(user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn me(headers: HeaderMap) -> Result<Json<User>, StatusCode> {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer demo-token-"));
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(User {
        id: 0,
        name: CLIENT_ID.to_string(),
        email: None,
    }))
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let field = |name: &str| form.get(name).map(String::as_str);
    let valid = field("grant_type") == Some("client_credentials")
        && field("client_id") == Some(CLIENT_ID)
        && field("client_secret") == Some(CLIENT_SECRET);
    if !valid {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "unknown client or secret",
            })),
        );
    }
    let n = state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "access_token": format!("demo-token-{}", n),
            "token_type": "Bearer",
            "expires_in": 3600,
        })),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = Router::new()
        .route("/api/users", get(search_users).post(create_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/me", get(me))
        .route("/connect/token", post(issue_token))
        .with_state(Arc::new(AppState::default()));

    let addr = server_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("=== Demo user API ===");
    println!("Server listening on http://{}", addr);
    println!();
    println!("Token endpoint: POST /connect/token");
    println!("  client_id={} client_secret={}", CLIENT_ID, CLIENT_SECRET);

    axum::serve(listener, app).await?;
    Ok(())
}
