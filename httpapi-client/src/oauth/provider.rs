use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use httpapi_core::ApiError;
use tokio::sync::Mutex;

use super::source::TokenSource;
use super::token::TokenResult;

#[derive(Default)]
struct State {
    token: Option<Arc<TokenResult>>,
    /// Failure of the most recent attempt, if it failed.
    last_failure: Option<ApiError>,
}

/// Caches one credential record and refreshes it when it expires.
///
/// At most one request or refresh runs at a time. Callers that queued
/// behind an attempt receive its outcome instead of starting another: the
/// same token on success, the same error on failure.
///
/// Dropping a caller that holds the lock cancels its network call and
/// releases the lock; the next caller starts a fresh attempt.
pub struct TokenProvider {
    name: String,
    source: Arc<dyn TokenSource>,
    state: Mutex<State>,
    /// Completed attempts, successful or not.
    attempts: AtomicU64,
}

impl TokenProvider {
    pub fn new(name: impl Into<String>, source: Arc<dyn TokenSource>) -> Self {
        Self {
            name: name.into(),
            source,
            state: Mutex::new(State::default()),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A valid token: the cached one, a refreshed one, or a new one.
    ///
    /// Fails with [`ApiError::TokenAcquisition`] when the source returns a
    /// record without an access token or with an error.
    pub async fn get_token(&self) -> Result<Arc<TokenResult>, ApiError> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut state = self.state.lock().await;

        // An attempt finished while this caller waited: share its outcome.
        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(err) = &state.last_failure {
                return Err(err.clone());
            }
            if let Some(token) = &state.token {
                return Ok(token.clone());
            }
        }

        let outcome = match &state.token {
            Some(token) if !token.is_expired() => return Ok(token.clone()),
            Some(token) if token.can_refresh() => {
                let refresh_token = token.refresh_token.clone().unwrap_or_default();
                self.refresh_or_request(&refresh_token).await
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::debug!(provider = %self.name, "requesting token");
                self.source.request_token().await
            }
        };

        let outcome = outcome.and_then(|token| {
            token.ensure_success()?;
            Ok(Arc::new(token))
        });
        match &outcome {
            Ok(token) => {
                state.token = Some(token.clone());
                state.last_failure = None;
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(provider = %self.name, error = %err, "token acquisition failed");
                state.token = None;
                state.last_failure = Some(err.clone());
            }
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn refresh_or_request(&self, refresh_token: &str) -> Result<TokenResult, ApiError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(provider = %self.name, "refreshing token");
        match self.source.refresh_token(refresh_token).await {
            Ok(token) if token.is_success() => Ok(token),
            _ => {
                #[cfg(feature = "tracing")]
                tracing::debug!(provider = %self.name, "refresh failed, requesting token");
                self.source.request_token().await
            }
        }
    }

    /// Drop the cached token so the next call requests a new one.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.token = None;
        state.last_failure = None;
    }

    /// The cached token, if any, without contacting the source.
    pub async fn cached(&self) -> Option<Arc<TokenResult>> {
        self.state.lock().await.token.clone()
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("name", &self.name)
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Counts calls and hands out tokens with a configurable lifetime.
    #[derive(Default)]
    struct CountingSource {
        requests: AtomicUsize,
        refreshes: AtomicUsize,
        lifetime_secs: u64,
        fail_requests: bool,
        fail_refreshes: bool,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn request_token(&self) -> Result<TokenResult, ApiError> {
            let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_requests {
                return Ok(TokenResult::failure("invalid_client", None));
            }
            Ok(TokenResult::new(format!("request-{}", n), Duration::from_secs(self.lifetime_secs))
                .with_refresh_token("r"))
        }

        async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResult, ApiError> {
            assert_eq!(refresh_token, "r");
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_refreshes {
                return Err(ApiError::transport("refresh endpoint down"));
            }
            Ok(TokenResult::new(format!("refresh-{}", n), Duration::from_secs(self.lifetime_secs))
                .with_refresh_token("r"))
        }
    }

    fn provider(source: CountingSource) -> (Arc<TokenProvider>, Arc<CountingSource>) {
        let source = Arc::new(source);
        let provider = Arc::new(TokenProvider::new("IUserApi", source.clone()));
        (provider, source)
    }

    #[tokio::test]
    async fn test_first_call_requests_then_caches() {
        let (provider, source) = provider(CountingSource {
            lifetime_secs: 3600,
            ..Default::default()
        });

        let first = provider.get_token().await.unwrap();
        let second = provider.get_token().await.unwrap();
        assert_eq!(first.access_token.as_deref(), Some("request-1"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        // Zero lifetime: every token is expired as soon as it is issued.
        let (provider, source) = provider(CountingSource::default());

        provider.get_token().await.unwrap();
        let refreshed = provider.get_token().await.unwrap();
        assert_eq!(refreshed.access_token.as_deref(), Some("refresh-1"));
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_request() {
        let (provider, source) = provider(CountingSource {
            fail_refreshes: true,
            ..Default::default()
        });

        provider.get_token().await.unwrap();
        let token = provider.get_token().await.unwrap();
        assert_eq!(token.access_token.as_deref(), Some("request-2"));
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(source.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_request() {
        let (provider, source) = provider(CountingSource {
            lifetime_secs: 3600,
            ..Default::default()
        });

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.get_token().await.unwrap() })
            })
            .collect();
        let mut tokens = Vec::new();
        for task in tasks {
            tokens.push(task.await.unwrap());
        }

        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| Arc::ptr_eq(t, &tokens[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let (provider, source) = provider(CountingSource::default());
        provider.get_token().await.unwrap();

        // Refreshed tokens are expired too; callers queued behind the
        // refresh still reuse its outcome.
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.get_token().await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_callers_share_failure() {
        let (provider, source) = provider(CountingSource {
            fail_requests: true,
            ..Default::default()
        });

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.get_token().await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap_err().is_token_acquisition());
        }
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);

        // A later call tries again.
        assert!(provider.get_token().await.is_err());
        assert_eq!(source.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_forces_new_request() {
        let (provider, source) = provider(CountingSource {
            lifetime_secs: 3600,
            ..Default::default()
        });
        provider.get_token().await.unwrap();
        provider.clear().await;
        assert!(provider.cached().await.is_none());

        let token = provider.get_token().await.unwrap();
        assert_eq!(token.access_token.as_deref(), Some("request-2"));
        assert_eq!(source.requests.load(Ordering::SeqCst), 2);
    }
}
