use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::Method;
use httpapi_core::{ApiError, FormatOptions, KeyValueFormatter, KeyValueSerializer, ToValue, Value};
use serde::{Deserialize, Serialize};
use url::Url;

use super::token::{TokenResponse, TokenResult};
use crate::request::HttpApiRequest;
use crate::transport::Transport;

/// Where credential records come from.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn request_token(&self) -> Result<TokenResult, ApiError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResult, ApiError>;
}

/// Client credentials grant parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
    /// Additional form fields sent with every token request.
    pub extra: BTreeMap<String, String>,
}

/// Resource owner password grant parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub scope: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Posts url-encoded grant forms to a token endpoint.
#[derive(Clone)]
struct TokenClient {
    endpoint: Url,
    transport: Arc<dyn Transport>,
    key_value: KeyValueSerializer,
    options: FormatOptions,
}

impl TokenClient {
    fn new(endpoint: &str, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            ApiError::configuration(format!("invalid token endpoint `{}`: {}", endpoint, e))
        })?;
        Ok(Self {
            endpoint,
            transport,
            key_value: KeyValueSerializer::new(),
            options: FormatOptions::default().ignore_null_property(true),
        })
    }

    async fn post(
        &self,
        grant: Value,
        extra: &BTreeMap<String, String>,
    ) -> Result<TokenResult, ApiError> {
        let mut request = HttpApiRequest::new(Method::POST);
        request.set_uri(self.endpoint.clone());
        request.add_form_fields(self.key_value.serialize("grant", &grant, &self.options)?);
        request.add_form_fields(self.key_value.serialize("extra", &extra.to_value(), &self.options)?);

        let issued_at = Instant::now();
        let response = self.transport.send(request.to_http()?).await?;
        let status = response.status();
        let parsed = serde_json::from_slice::<TokenResponse>(response.body());

        match parsed {
            Ok(token) if status.is_success() || token.error.is_some() => {
                Ok(token.into_result(issued_at))
            }
            Err(e) if status.is_success() => Err(ApiError::decode(format!(
                "invalid token response from `{}`: {}",
                self.endpoint, e
            ))),
            _ => Err(ApiError::ResponseStatus {
                status,
                body: response.into_body(),
            }),
        }
    }

    async fn refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<TokenResult, ApiError> {
        let grant = Value::object([
            ("grant_type", "refresh_token".to_value()),
            ("client_id", client_id.to_value()),
            ("client_secret", client_secret.to_value()),
            ("refresh_token", refresh_token.to_value()),
        ]);
        self.post(grant, extra).await
    }
}

/// Obtains tokens with the `client_credentials` grant.
#[derive(Clone)]
pub struct ClientCredentialsTokenSource {
    client: TokenClient,
    credentials: ClientCredentials,
}

impl ClientCredentialsTokenSource {
    /// Fails with [`ApiError::Configuration`] when `endpoint` is not an
    /// absolute URL.
    pub fn new(
        endpoint: &str,
        credentials: ClientCredentials,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: TokenClient::new(endpoint, transport)?,
            credentials,
        })
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsTokenSource {
    async fn request_token(&self) -> Result<TokenResult, ApiError> {
        let credentials = &self.credentials;
        let grant = Value::object([
            ("grant_type", "client_credentials".to_value()),
            ("client_id", credentials.client_id.to_value()),
            ("client_secret", credentials.client_secret.to_value()),
            ("scope", credentials.scope.to_value()),
        ]);
        self.client.post(grant, &credentials.extra).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResult, ApiError> {
        let credentials = &self.credentials;
        self.client
            .refresh(
                &credentials.client_id,
                &credentials.client_secret,
                refresh_token,
                &credentials.extra,
            )
            .await
    }
}

/// Obtains tokens with the `password` grant.
#[derive(Clone)]
pub struct PasswordCredentialsTokenSource {
    client: TokenClient,
    credentials: PasswordCredentials,
    use_refresh_token: bool,
}

impl PasswordCredentialsTokenSource {
    pub fn new(
        endpoint: &str,
        credentials: PasswordCredentials,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: TokenClient::new(endpoint, transport)?,
            credentials,
            use_refresh_token: true,
        })
    }

    /// When disabled, an expired token is replaced by a new password grant
    /// instead of a refresh. Enabled by default.
    pub fn use_refresh_token(mut self, enabled: bool) -> Self {
        self.use_refresh_token = enabled;
        self
    }
}

#[async_trait]
impl TokenSource for PasswordCredentialsTokenSource {
    async fn request_token(&self) -> Result<TokenResult, ApiError> {
        let credentials = &self.credentials;
        let grant = Value::object([
            ("grant_type", "password".to_value()),
            ("client_id", credentials.client_id.to_value()),
            ("client_secret", credentials.client_secret.to_value()),
            ("username", credentials.username.to_value()),
            ("password", credentials.password.to_value()),
            ("scope", credentials.scope.to_value()),
        ]);
        self.client.post(grant, &credentials.extra).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResult, ApiError> {
        if !self.use_refresh_token {
            return self.request_token().await;
        }
        let credentials = &self.credentials;
        self.client
            .refresh(
                &credentials.client_id,
                &credentials.client_secret,
                refresh_token,
                &credentials.extra,
            )
            .await
    }
}

type TokenFn = dyn Fn() -> BoxFuture<'static, Result<TokenResult, ApiError>> + Send + Sync;
type RefreshFn = dyn Fn(String) -> BoxFuture<'static, Result<TokenResult, ApiError>> + Send + Sync;

/// A token source built from closures.
///
/// Without a refresh closure, refreshing requests a new token.
///
/// ```ignore
/// let source = FnTokenSource::new(|| {
///     Box::pin(async { Ok(TokenResult::new("token", Duration::from_secs(3600))) })
/// });
/// ```
#[derive(Clone)]
pub struct FnTokenSource {
    request: Arc<TokenFn>,
    refresh: Option<Arc<RefreshFn>>,
}

impl FnTokenSource {
    pub fn new<F>(request: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<TokenResult, ApiError>> + Send + Sync + 'static,
    {
        Self {
            request: Arc::new(request),
            refresh: None,
        }
    }

    pub fn with_refresh<F>(mut self, refresh: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<TokenResult, ApiError>> + Send + Sync + 'static,
    {
        self.refresh = Some(Arc::new(refresh));
        self
    }
}

#[async_trait]
impl TokenSource for FnTokenSource {
    async fn request_token(&self) -> Result<TokenResult, ApiError> {
        (self.request)().await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResult, ApiError> {
        match &self.refresh {
            Some(refresh) => refresh(refresh_token.to_string()).await,
            None => (self.request)().await,
        }
    }
}
