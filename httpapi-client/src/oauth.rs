//! OAuth 2.0 token management.
//!
//! A [`TokenProvider`] caches one credential record per logical client and
//! refreshes it when it expires. Providers are looked up by name in a
//! [`TokenProviderRegistry`] set on the client options, and applied to
//! requests by the [`OAuthToken`] behavior.
//!
//! # Example
//!
//! ```ignore
//! use httpapi_client::oauth::{ClientCredentials, ClientCredentialsTokenSource, OAuthToken, TokenProviderRegistry};
//!
//! let source = ClientCredentialsTokenSource::new(
//!     "https://auth.example.com/connect/token",
//!     ClientCredentials { client_id: "app".into(), client_secret: "secret".into(), ..Default::default() },
//!     transport.clone(),
//! )?;
//! let registry = TokenProviderRegistry::builder().register("UserApi", source).build();
//!
//! let options = HttpApiOptions::builder()
//!     .token_providers(Arc::new(registry))
//!     .build()?;
//! let signature = MethodSignature::new("UserApi", "me")
//!     .behavior(HttpMethod::get("me"))
//!     .behavior(OAuthToken::new())
//!     .filter(TokenResetFilter);
//! ```

mod provider;
mod registry;
mod source;
mod token;

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use http::header::AUTHORIZATION;
use httpapi_core::ApiError;

use crate::behavior::ActionBehavior;
use crate::context::{RequestContext, ResponseContext};
use crate::filter::{Filter, ResponseNext};

pub use provider::TokenProvider;
pub use registry::{TokenProviderRegistry, TokenProviderRegistryBuilder};
pub use source::{
    ClientCredentials, ClientCredentialsTokenSource, FnTokenSource, PasswordCredentials,
    PasswordCredentialsTokenSource, TokenSource,
};
pub use token::{EXPIRY_SKEW, TokenResponse, TokenResult};

/// The provider whose token was applied to the current request.
#[derive(Clone)]
struct AppliedProvider(Arc<TokenProvider>);

/// Sets `Authorization: <token_type> <access_token>` from the client's
/// token provider.
///
/// The provider is looked up by the action's interface name unless a name
/// is given with [`OAuthToken::named`].
#[derive(Clone, Debug, Default)]
pub struct OAuthToken {
    name: Option<String>,
}

impl OAuthToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

#[async_trait]
impl ActionBehavior for OAuthToken {
    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let registry = ctx.options().token_providers.clone().ok_or_else(|| {
            ApiError::configuration("OAuthToken requires `token_providers` in the client options")
        })?;
        let name = match &self.name {
            Some(name) => name.clone(),
            None => ctx.action().id().interface.clone(),
        };
        let provider = registry.get_or_create(&name).await?;
        let token = provider.get_token().await?;
        ctx.request
            .set_header(AUTHORIZATION.as_str(), &token.authorization())?;
        ctx.properties_mut().insert(AppliedProvider(provider));
        Ok(())
    }
}

/// Clears the applied token when the server answers `401 Unauthorized`, so
/// the next call obtains a new one.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenResetFilter;

#[async_trait]
impl Filter for TokenResetFilter {
    async fn on_response(
        &self,
        ctx: &mut ResponseContext,
        next: ResponseNext<'_>,
    ) -> Result<(), ApiError> {
        if ctx.status() == Some(StatusCode::UNAUTHORIZED) {
            if let Some(AppliedProvider(provider)) = ctx.request.properties().get::<AppliedProvider>().cloned() {
                #[cfg(feature = "tracing")]
                tracing::debug!(provider = %provider.name(), "clearing token after 401");
                provider.clear().await;
            }
        }
        next.run(ctx).await
    }
}
