//! Client options.

use std::sync::Arc;
use std::time::Duration;

use httpapi_core::{
    ApiError, DefaultJsonFormatter, DefaultXmlFormatter, FormatOptions, JsonFormatter,
    KeyValueFormatter, KeyValueSerializer, XmlFormatter,
};
use url::Url;

use crate::filter::Filter;
use crate::oauth::TokenProviderRegistry;

/// `User-Agent` sent when `use_default_user_agent` is enabled.
pub const DEFAULT_USER_AGENT: &str = concat!("httpapi-client/", env!("CARGO_PKG_VERSION"));

/// Shared configuration of every action executed by one client.
#[derive(Clone)]
pub struct HttpApiOptions {
    /// Base URI relative action paths resolve against.
    pub http_host: Option<Url>,
    /// Timeout for each call, unless a behavior sets one.
    pub default_timeout: Option<Duration>,
    pub format_options: FormatOptions,
    pub json: Arc<dyn JsonFormatter>,
    pub xml: Arc<dyn XmlFormatter>,
    pub key_value: Arc<dyn KeyValueFormatter>,
    /// Filters wrapped around every action, merged with the action's own.
    pub filters: Vec<Arc<dyn Filter>>,
    pub token_providers: Option<Arc<TokenProviderRegistry>>,
    /// `User-Agent` added to requests that carry none.
    pub user_agent: Option<String>,
}

impl Default for HttpApiOptions {
    fn default() -> Self {
        Self {
            http_host: None,
            default_timeout: None,
            format_options: FormatOptions::default(),
            json: Arc::new(DefaultJsonFormatter),
            xml: Arc::new(DefaultXmlFormatter),
            key_value: Arc::new(KeyValueSerializer::new()),
            filters: Vec::new(),
            token_providers: None,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

impl HttpApiOptions {
    pub fn builder() -> HttpApiOptionsBuilder {
        HttpApiOptionsBuilder::new()
    }
}

impl std::fmt::Debug for HttpApiOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiOptions")
            .field("http_host", &self.http_host.as_ref().map(Url::as_str))
            .field("default_timeout", &self.default_timeout)
            .field("format_options", &self.format_options)
            .field("filter_count", &self.filters.len())
            .field("token_providers", &self.token_providers.is_some())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Builder for [`HttpApiOptions`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use httpapi_client::HttpApiOptions;
///
/// let options = HttpApiOptions::builder()
///     .http_host("http://localhost:3000/api/")
///     .default_timeout(Duration::from_secs(10))
///     .use_camel_case(true)
///     .build()
///     .unwrap();
/// assert_eq!(options.http_host.unwrap().as_str(), "http://localhost:3000/api/");
/// ```
pub struct HttpApiOptionsBuilder {
    http_host: Option<String>,
    options: HttpApiOptions,
}

impl Default for HttpApiOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpApiOptionsBuilder {
    pub fn new() -> Self {
        Self {
            http_host: None,
            options: HttpApiOptions::default(),
        }
    }

    /// Base URI for relative action paths. Include a trailing slash when the
    /// host has a path prefix (`http://host/api/`).
    pub fn http_host<S: Into<String>>(mut self, host: S) -> Self {
        self.http_host = Some(host.into());
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.options.default_timeout = Some(timeout);
        self
    }

    pub fn format_options(mut self, options: FormatOptions) -> Self {
        self.options.format_options = options;
        self
    }

    pub fn use_camel_case(mut self, enabled: bool) -> Self {
        self.options.format_options.use_camel_case = enabled;
        self
    }

    pub fn ignore_null_property(mut self, enabled: bool) -> Self {
        self.options.format_options.ignore_null_property = enabled;
        self
    }

    pub fn date_time_format<S: Into<String>>(mut self, format: S) -> Self {
        self.options.format_options.date_time_format = format.into();
        self
    }

    pub fn json_formatter(mut self, formatter: impl JsonFormatter) -> Self {
        self.options.json = Arc::new(formatter);
        self
    }

    pub fn xml_formatter(mut self, formatter: impl XmlFormatter) -> Self {
        self.options.xml = Arc::new(formatter);
        self
    }

    pub fn key_value_formatter(mut self, formatter: impl KeyValueFormatter) -> Self {
        self.options.key_value = Arc::new(formatter);
        self
    }

    /// Add a filter wrapped around every action.
    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.options.filters.push(Arc::new(filter));
        self
    }

    pub fn token_providers(mut self, registry: Arc<TokenProviderRegistry>) -> Self {
        self.options.token_providers = Some(registry);
        self
    }

    /// Whether to send [`DEFAULT_USER_AGENT`]. Enabled by default.
    pub fn use_default_user_agent(mut self, enabled: bool) -> Self {
        self.options.user_agent = enabled.then(|| DEFAULT_USER_AGENT.to_string());
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.options.user_agent = Some(user_agent.into());
        self
    }

    /// Fails with [`ApiError::Configuration`] when the host is not an
    /// absolute URL.
    pub fn build(self) -> Result<HttpApiOptions, ApiError> {
        let mut options = self.options;
        if let Some(host) = self.http_host {
            let url = Url::parse(&host).map_err(|e| {
                ApiError::configuration(format!("invalid http_host `{}`: {}", host, e))
            })?;
            if url.cannot_be_a_base() {
                return Err(ApiError::configuration(format!(
                    "http_host `{}` cannot be used as a base URI",
                    host
                )));
            }
            options.http_host = Some(url);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = HttpApiOptions::default();
        assert!(options.http_host.is_none());
        assert_eq!(options.format_options, FormatOptions::default());
        assert_eq!(options.user_agent.as_deref(), Some(DEFAULT_USER_AGENT));
    }

    #[test]
    fn test_builder() {
        let options = HttpApiOptions::builder()
            .http_host("http://localhost:5000/")
            .default_timeout(Duration::from_secs(5))
            .use_camel_case(true)
            .ignore_null_property(true)
            .date_time_format("%Y-%m-%d")
            .use_default_user_agent(false)
            .build()
            .unwrap();
        assert_eq!(options.http_host.unwrap().as_str(), "http://localhost:5000/");
        assert_eq!(options.default_timeout, Some(Duration::from_secs(5)));
        assert!(options.format_options.use_camel_case);
        assert!(options.format_options.ignore_null_property);
        assert_eq!(options.format_options.date_time_format, "%Y-%m-%d");
        assert!(options.user_agent.is_none());
    }

    #[test]
    fn test_invalid_host() {
        let err = HttpApiOptions::builder().http_host("localhost").build().unwrap_err();
        assert!(err.is_configuration());
    }
}
