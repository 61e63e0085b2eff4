//! HTTP transport layer.
//!
//! The call engine hands a fully assembled `http::Request<Bytes>` to a
//! [`Transport`] and gets back a buffered [`HttpResponse`]. [`HyperTransport`]
//! is the default implementation, built on hyper_util's legacy client:
//!
//! - HTTP/1.1 and HTTP/2 with automatic protocol negotiation
//! - TLS with rustls (feature-gated)
//! - Connection pooling
//! - A cap on buffered response bodies
//! - Tower service integration
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates
//!
//! # Example
//!
//! ```ignore
//! use httpapi_client::transport::HyperTransport;
//! use std::time::Duration;
//!
//! let transport = HyperTransport::builder()
//!     .pool_idle_timeout(Duration::from_secs(60))
//!     .build()?;
//! ```

mod connector;
mod hyper;

use async_trait::async_trait;
use bytes::Bytes;
use httpapi_core::ApiError;

pub use connector::{default_tls_config, has_tls_support};
pub use hyper::{
    DEFAULT_MAX_RESPONSE_BYTES, HttpVersionPolicy, HyperTransport, HyperTransportBuilder,
};

/// A buffered HTTP response.
pub type HttpResponse = http::Response<Bytes>;

/// Sends one request and returns the buffered response.
///
/// Implementations must not interpret the status code; non-success handling
/// belongs to the return bindings.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: http::Request<Bytes>) -> Result<HttpResponse, ApiError>;
}
