use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::Method;
use http::header::AUTHORIZATION;
use httpapi_core::{ApiError, KeyValue};
use url::Url;

use super::ActionBehavior;
use crate::context::RequestContext;

/// Sets the request URI to a fixed host, overriding the client's `http_host`.
#[derive(Clone, Debug)]
pub struct HttpHost {
    host: Url,
}

impl HttpHost {
    /// Fails with [`ApiError::Configuration`] unless `host` is an absolute URL.
    pub fn new(host: &str) -> Result<Self, ApiError> {
        let host = Url::parse(host)
            .map_err(|e| ApiError::configuration(format!("invalid host `{}`: {}", host, e)))?;
        if host.cannot_be_a_base() {
            return Err(ApiError::configuration(format!("`{}` cannot be used as a host", host)));
        }
        Ok(Self { host })
    }

    pub fn host(&self) -> &Url {
        &self.host
    }
}

#[async_trait]
impl ActionBehavior for HttpHost {
    fn order(&self) -> i32 {
        i32::MIN
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.request.set_uri(self.host.clone());
        Ok(())
    }
}

/// Sets the HTTP method and resolves the action path against the host.
///
/// An absolute path replaces the URI; a relative one needs a host.
#[derive(Clone, Debug)]
pub struct HttpMethod {
    method: Method,
    path: Option<String>,
}

impl HttpMethod {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            path: (!path.is_empty()).then_some(path),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    pub fn options(path: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, path)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

#[async_trait]
impl ActionBehavior for HttpMethod {
    fn order(&self) -> i32 {
        i32::MIN + 1
    }

    fn http_method(&self) -> Option<Method> {
        Some(self.method.clone())
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.request.method = self.method.clone();
        if let Some(path) = &self.path {
            ctx.request.join_path(path)?;
        }
        Ok(())
    }
}

/// Adds a constant header.
#[derive(Clone, Debug)]
pub struct StaticHeader {
    name: String,
    value: String,
    order: i32,
}

impl StaticHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

#[async_trait]
impl ActionBehavior for StaticHeader {
    fn order(&self) -> i32 {
        self.order
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.request.add_header(&self.name, &self.value)
    }
}

/// Sets the call timeout, overriding the client default.
#[derive(Clone, Copy, Debug)]
pub struct Timeout(pub Duration);

#[async_trait]
impl ActionBehavior for Timeout {
    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.set_timeout(self.0);
        Ok(())
    }
}

/// Adds a constant url-encoded form field.
#[derive(Clone, Debug)]
pub struct FormField {
    name: String,
    value: String,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl ActionBehavior for FormField {
    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.request
            .add_form_fields([KeyValue::new(self.name.clone(), self.value.clone())]);
        Ok(())
    }
}

/// Sets `Authorization: Basic <base64(user:password)>`.
#[derive(Clone)]
pub struct BasicAuth {
    header: String,
}

impl BasicAuth {
    pub fn new(user: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", user, password));
        Self {
            header: format!("Basic {}", encoded),
        }
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth").finish_non_exhaustive()
    }
}

#[async_trait]
impl ActionBehavior for BasicAuth {
    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.request.set_header(AUTHORIZATION.as_str(), &self.header)
    }
}
