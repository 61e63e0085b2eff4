//! Helpers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use httpapi_core::ApiError;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::descriptor::{ActionDescriptor, MethodSignature};
use crate::options::HttpApiOptions;
use crate::transport::{HttpResponse, Transport};

pub(crate) fn response(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = http::Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
}

pub(crate) fn options(host: Option<&str>) -> HttpApiOptions {
    let mut builder = HttpApiOptions::builder();
    if let Some(host) = host {
        builder = builder.http_host(host);
    }
    builder.build().unwrap()
}

pub(crate) fn context_for(signature: MethodSignature, host: Option<&str>) -> RequestContext {
    let descriptor = ActionDescriptor::build(&signature).unwrap();
    RequestContext::new(
        Arc::new(descriptor),
        Arc::new(options(host)),
        Vec::new(),
        CancellationToken::new(),
    )
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Responder = dyn Fn(&RecordedRequest) -> Result<HttpResponse, ApiError> + Send + Sync;

/// In-memory transport that records requests and answers from a closure.
#[derive(Clone)]
pub(crate) struct MockTransport {
    respond: Arc<Responder>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    /// Answers every request with `200 OK` and an empty body.
    pub fn new() -> Self {
        Self::responding(|_| Ok(response(StatusCode::OK, "")))
    }

    pub fn responding<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            log: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(err: ApiError) -> Self {
        Self::responding(move |_| Err(err.clone()))
    }

    /// Pushes `"send"` into `log` on every request.
    pub fn with_log(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log: Some(log),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: http::Request<Bytes>) -> Result<HttpResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push("send".to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (parts, body) = request.into_parts();
        let recorded = RecordedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        };
        self.requests.lock().unwrap().push(recorded.clone());
        (self.respond)(&recorded)
    }
}
