use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use httpapi_core::ApiError;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tower_service::Service;

use super::connector::{build_https_connector, default_tls_config};
use super::{HttpResponse, Transport};

type PooledClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Response bodies larger than this fail unless the limit is changed.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Which HTTP versions the transport may speak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HttpVersionPolicy {
    /// HTTP/1.1, or HTTP/2 when ALPN selects it.
    #[default]
    Negotiate,
    /// HTTP/2 only, including prior-knowledge h2c for `http://`.
    Http2Only,
}

/// The default [`Transport`]: a pooled hyper client over rustls.
///
/// Bodies are buffered in both directions. A response body above
/// [`max_response_bytes`](HyperTransportBuilder::max_response_bytes) fails the
/// call with [`ApiError::Transport`].
///
/// ```ignore
/// let transport = HyperTransport::builder()
///     .pool_max_idle_per_host(8)
///     .max_response_bytes(1024 * 1024)
///     .build()?;
/// let executor = ApiExecutor::new(options, transport);
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    client: PooledClient,
    versions: HttpVersionPolicy,
    max_response_bytes: Option<usize>,
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// A transport with default pool, TLS and body settings.
    pub fn new() -> Result<Self, ApiError> {
        Self::builder().build()
    }

    pub fn version_policy(&self) -> HttpVersionPolicy {
        self.versions
    }

    pub fn max_response_bytes(&self) -> Option<usize> {
        self.max_response_bytes
    }

    fn exchange(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send + 'static {
        let client = self.client.clone();
        let limit = self.max_response_bytes;
        let target = request.uri().clone();
        async move {
            let response = client.request(request.map(Full::new)).await.map_err(|e| {
                ApiError::transport(format!("request to `{}` failed: {}", target, e))
            })?;
            let (parts, body) = response.into_parts();
            let body = match limit {
                Some(limit) => Limited::new(body, limit)
                    .collect()
                    .await
                    .map_err(|e| {
                        ApiError::transport(format!("reading response from `{}`: {}", target, e))
                    })?
                    .to_bytes(),
                None => body
                    .collect()
                    .await
                    .map_err(|e| {
                        ApiError::transport(format!("reading response from `{}`: {}", target, e))
                    })?
                    .to_bytes(),
            };
            Ok(http::Response::from_parts(parts, body))
        }
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("versions", &self.versions)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: http::Request<Bytes>) -> Result<HttpResponse, ApiError> {
        self.exchange(request).await
    }
}

/// Lets the transport sit under tower middleware.
impl Service<http::Request<Bytes>> for HyperTransport {
    type Response = HttpResponse;
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, ApiError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), ApiError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<Bytes>) -> Self::Future {
        Box::pin(self.exchange(request))
    }
}

/// Connection pool settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PoolSettings {
    idle_timeout: Option<Duration>,
    max_idle_per_host: usize,
    connect_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(90)),
            max_idle_per_host: 32,
            connect_timeout: None,
        }
    }
}

/// Builder for [`HyperTransport`].
#[derive(Default)]
pub struct HyperTransportBuilder {
    tls: Option<ClientConfig>,
    versions: HttpVersionPolicy,
    pool: PoolSettings,
    max_response_bytes: Option<Option<usize>>,
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the feature-selected TLS defaults, e.g. for
    /// private roots or client certificates.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn version_policy(mut self, versions: HttpVersionPolicy) -> Self {
        self.versions = versions;
        self
    }

    pub fn http2_only(self, enabled: bool) -> Self {
        self.version_policy(if enabled {
            HttpVersionPolicy::Http2Only
        } else {
            HttpVersionPolicy::Negotiate
        })
    }

    /// How long an idle pooled connection is kept. Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool.idle_timeout = Some(timeout);
        self
    }

    /// Keep idle pooled connections until the server closes them.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool.idle_timeout = None;
        self
    }

    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool.max_idle_per_host = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.pool.connect_timeout = Some(timeout);
        self
    }

    /// Cap on buffered response bodies. Default:
    /// [`DEFAULT_MAX_RESPONSE_BYTES`]; `None` removes the cap.
    pub fn max_response_bytes(mut self, limit: impl Into<Option<usize>>) -> Self {
        self.max_response_bytes = Some(limit.into());
        self
    }

    /// Fails with [`ApiError::Configuration`] when no TLS configuration was
    /// given and the enabled features cannot provide one.
    pub fn build(self) -> Result<HyperTransport, ApiError> {
        let tls = match self.tls {
            Some(config) => config,
            None => default_tls_config()?,
        };

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(self.pool.connect_timeout);

        let mut client = Client::builder(TokioExecutor::new());
        // The idle timeout is only enforced with a timer.
        client.pool_timer(TokioTimer::new());
        client.pool_idle_timeout(self.pool.idle_timeout);
        client.pool_max_idle_per_host(self.pool.max_idle_per_host);
        client.http2_only(self.versions == HttpVersionPolicy::Http2Only);

        Ok(HyperTransport {
            client: client.build(build_https_connector(tls, connector)),
            versions: self.versions,
            max_response_bytes: self
                .max_response_bytes
                .unwrap_or(Some(DEFAULT_MAX_RESPONSE_BYTES)),
        })
    }
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("tls", &self.tls.is_some())
            .field("versions", &self.versions)
            .field("pool", &self.pool)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = HyperTransportBuilder::new();
        assert_eq!(builder.versions, HttpVersionPolicy::Negotiate);
        assert_eq!(builder.pool, PoolSettings::default());
        assert_eq!(builder.pool.max_idle_per_host, 32);
        assert!(builder.max_response_bytes.is_none());
    }

    #[test]
    fn test_builder_settings() {
        let builder = HyperTransportBuilder::new()
            .http2_only(true)
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .connect_timeout(Duration::from_secs(3))
            .max_response_bytes(None);
        assert_eq!(builder.versions, HttpVersionPolicy::Http2Only);
        assert_eq!(
            builder.pool,
            PoolSettings {
                idle_timeout: Some(Duration::from_secs(60)),
                max_idle_per_host: 10,
                connect_timeout: Some(Duration::from_secs(3)),
            }
        );
        assert_eq!(builder.max_response_bytes, Some(None));

        let builder = builder.pool_idle_timeout_none();
        assert!(builder.pool.idle_timeout.is_none());
    }

    #[cfg(all(
        any(feature = "tls-ring", feature = "tls-aws-lc"),
        any(feature = "tls-native-roots", feature = "tls-webpki-roots")
    ))]
    #[tokio::test]
    async fn test_build_transport() {
        let transport = HyperTransport::new().unwrap();
        assert_eq!(transport.version_policy(), HttpVersionPolicy::Negotiate);
        assert_eq!(transport.max_response_bytes(), Some(DEFAULT_MAX_RESPONSE_BYTES));

        let transport = HyperTransport::builder()
            .http2_only(true)
            .max_response_bytes(1024)
            .build()
            .unwrap();
        assert_eq!(transport.version_policy(), HttpVersionPolicy::Http2Only);
        assert_eq!(transport.max_response_bytes(), Some(1024));
    }
}
