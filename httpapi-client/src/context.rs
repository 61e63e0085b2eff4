//! Per-call request and response state.
//!
//! A [`RequestContext`] is created for every call and owned by that call
//! alone. After the request phase it is moved into a [`ResponseContext`]
//! together with the response, so response filters and return bindings can
//! still see what was sent.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Extensions;
use httpapi_core::{ApiError, FormatOptions, ToValue, Value};
use tokio_util::sync::CancellationToken;

use crate::descriptor::ActionDescriptor;
use crate::options::HttpApiOptions;
use crate::request::HttpApiRequest;
use crate::transport::HttpResponse;

/// One argument supplied to a call, in parameter order.
#[derive(Clone, Debug)]
pub enum Argument {
    Value(Value),
    Cancellation(CancellationToken),
}

impl Argument {
    pub fn value(value: impl ToValue) -> Self {
        Argument::Value(value.to_value())
    }

    /// Wrap any `Serialize` value, e.g. a request model.
    pub fn serialize<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self, ApiError> {
        Value::from_serialize(value).map(Argument::Value)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<CancellationToken> for Argument {
    fn from(token: CancellationToken) -> Self {
        Argument::Cancellation(token)
    }
}

/// The decoded outcome of a call.
#[derive(Debug)]
pub enum ApiResult {
    Json(serde_json::Value),
    Xml(String),
    Text(String),
    Bytes(Bytes),
    Response(HttpResponse),
    Unit,
}

impl ApiResult {
    pub fn into_json(self) -> Result<serde_json::Value, ApiError> {
        match self {
            ApiResult::Json(json) => Ok(json),
            other => Err(ApiError::decode(format!("expected a JSON result, got {}", other.kind()))),
        }
    }

    pub fn into_text(self) -> Result<String, ApiError> {
        match self {
            ApiResult::Text(text) | ApiResult::Xml(text) => Ok(text),
            ApiResult::Bytes(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|e| ApiError::decode(format!("invalid UTF-8: {e}"))),
            other => Err(ApiError::decode(format!("expected a text result, got {}", other.kind()))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiResult::Json(_) => "json",
            ApiResult::Xml(_) => "xml",
            ApiResult::Text(_) => "text",
            ApiResult::Bytes(_) => "bytes",
            ApiResult::Response(_) => "response",
            ApiResult::Unit => "unit",
        }
    }
}

/// Mutable state of one in-flight call before the request is sent.
pub struct RequestContext {
    action: Arc<ActionDescriptor>,
    options: Arc<HttpApiOptions>,
    arguments: Vec<Argument>,
    pub request: HttpApiRequest,
    cancellation: CancellationToken,
    timeout: Option<Duration>,
    properties: Extensions,
}

impl RequestContext {
    /// Start a call. The request URI begins as the client's `http_host`.
    pub fn new(
        action: Arc<ActionDescriptor>,
        options: Arc<HttpApiOptions>,
        arguments: Vec<Argument>,
        cancellation: CancellationToken,
    ) -> Self {
        let timeout = options.default_timeout;
        let mut request = HttpApiRequest::default();
        if let Some(host) = &options.http_host {
            request.set_uri(host.clone());
        }
        Self {
            action,
            options,
            arguments,
            request,
            cancellation,
            timeout,
            properties: Extensions::new(),
        }
    }

    pub fn action(&self) -> &Arc<ActionDescriptor> {
        &self.action
    }

    pub fn options(&self) -> &HttpApiOptions {
        &self.options
    }

    pub fn format_options(&self) -> &FormatOptions {
        &self.options.format_options
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// The value passed for the parameter at `index`, if it was a value.
    pub fn argument(&self, index: usize) -> Option<&Value> {
        match self.arguments.get(index) {
            Some(Argument::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// The caller's cancellation signal, linked to every cancellation argument.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Typed per-call properties shared between behaviors and filters.
    pub fn properties(&self) -> &Extensions {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Extensions {
        &mut self.properties
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("action", &self.action.id())
            .field("request", &self.request)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one call after the request phase.
#[derive(Debug)]
pub struct ResponseContext {
    pub request: RequestContext,
    /// The response, absent when a filter short-circuited without one or
    /// the send failed.
    pub response: Option<HttpResponse>,
    /// The decoded result. A filter may set it to bypass the return binding.
    pub result: Option<ApiResult>,
    /// The failure of the request phase, if any. A filter may take it to
    /// recover, or replace it.
    pub error: Option<ApiError>,
}

impl ResponseContext {
    pub fn new(request: RequestContext, outcome: Result<Option<HttpResponse>, ApiError>) -> Self {
        let (response, error) = match outcome {
            Ok(response) => (response, None),
            Err(err) => (None, Some(err)),
        };
        Self {
            request,
            response,
            result: None,
            error,
        }
    }

    pub fn action(&self) -> &Arc<ActionDescriptor> {
        self.request.action()
    }

    pub fn status(&self) -> Option<http::StatusCode> {
        self.response.as_ref().map(|response| response.status())
    }
}
