use std::collections::HashMap;
use std::sync::Arc;

use httpapi_core::{ApiError, SingleFlightCache};

use super::provider::TokenProvider;
use super::source::TokenSource;

type SourceFactory = Arc<dyn Fn() -> Result<Arc<dyn TokenSource>, ApiError> + Send + Sync>;

/// Token providers by logical client name.
///
/// Registrations are fixed when the registry is built. Each provider is
/// created on first use, once, even under concurrent first use.
///
/// ```ignore
/// let registry = TokenProviderRegistry::builder()
///     .register("UserApi", ClientCredentialsTokenSource::new(endpoint, credentials, transport)?)
///     .build();
/// let provider = registry.get_or_create("UserApi").await?;
/// ```
pub struct TokenProviderRegistry {
    factories: HashMap<String, SourceFactory>,
    providers: SingleFlightCache<String, Arc<TokenProvider>>,
}

impl TokenProviderRegistry {
    pub fn builder() -> TokenProviderRegistryBuilder {
        TokenProviderRegistryBuilder::default()
    }

    /// The provider registered as `name`.
    ///
    /// Fails with [`ApiError::Configuration`] when nothing is registered
    /// under `name`.
    pub async fn get_or_create(&self, name: &str) -> Result<Arc<TokenProvider>, ApiError> {
        let factory = self.factories.get(name).cloned().ok_or_else(|| {
            ApiError::configuration(format!("no token provider is registered for `{}`", name))
        })?;
        self.providers
            .get_or_add(name.to_string(), move |name| {
                let name = name.clone();
                async move {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(provider = %name, "creating token provider");
                    let source = factory()?;
                    Ok(Arc::new(TokenProvider::new(name, source)))
                }
            })
            .await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for TokenProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TokenProviderRegistry")
            .field("names", &names)
            .field("created", &self.providers.len())
            .finish()
    }
}

/// Builder for [`TokenProviderRegistry`].
#[derive(Default)]
pub struct TokenProviderRegistryBuilder {
    factories: HashMap<String, SourceFactory>,
}

impl TokenProviderRegistryBuilder {
    /// Register `source` for `name`, replacing an earlier registration.
    pub fn register(self, name: impl Into<String>, source: impl TokenSource) -> Self {
        let source: Arc<dyn TokenSource> = Arc::new(source);
        self.register_with(name, move || Ok(source.clone()))
    }

    /// Register a factory called once, when the provider is first used.
    pub fn register_with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TokenSource>, ApiError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn build(self) -> TokenProviderRegistry {
        TokenProviderRegistry {
            factories: self.factories,
            providers: SingleFlightCache::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{FnTokenSource, TokenResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn source() -> FnTokenSource {
        FnTokenSource::new(|| Box::pin(async { Ok(TokenResult::new("abc", Duration::from_secs(60))) }))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_provider_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let registry = Arc::new(
            TokenProviderRegistry::builder()
                .register_with("IUserApi", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(source()) as Arc<dyn TokenSource>)
                })
                .build(),
        );

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("IUserApi").await.unwrap() })
            })
            .collect();
        let mut providers = Vec::new();
        for task in tasks {
            providers.push(task.await.unwrap());
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(providers.iter().all(|p| Arc::ptr_eq(p, &providers[0])));
        assert_eq!(providers[0].name(), "IUserApi");
    }

    #[tokio::test]
    async fn test_unregistered_name() {
        let registry = TokenProviderRegistry::builder().register("IUserApi", source()).build();
        assert!(registry.contains("IUserApi"));
        let err = registry.get_or_create("IOrderApi").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_factory_failure_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let registry = TokenProviderRegistry::builder()
            .register_with("IUserApi", move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ApiError::configuration("endpoint not configured yet"));
                }
                Ok(Arc::new(source()) as Arc<dyn TokenSource>)
            })
            .build();

        assert!(registry.get_or_create("IUserApi").await.is_err());
        assert!(registry.get_or_create("IUserApi").await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
