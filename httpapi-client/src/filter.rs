//! Filters wrapping a call with request and response logic.
//!
//! Filters compose in onion order. In the request phase filters run in
//! ascending [`order`](Filter::order); each receives a [`RequestNext`]
//! continuation for the filters after it plus the transport send. A filter
//! that does not run its continuation short-circuits everything inside it,
//! including the send.
//!
//! In the response phase only the filters that entered the request phase
//! take part, innermost first: the last filter to run before the send is the
//! first to see the response.
//!
//! # Example
//!
//! ```ignore
//! use httpapi_client::filter::FnFilter;
//!
//! let stamp = FnFilter::new(|ctx, next| {
//!     Box::pin(async move {
//!         ctx.request.add_header("x-stamp", "1")?;
//!         next.run(ctx).await
//!     })
//! });
//!
//! let options = HttpApiOptions::builder()
//!     .http_host("http://localhost:3000/")
//!     .filter(stamp)
//!     .build()?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use httpapi_core::ApiError;

use crate::context::{RequestContext, ResponseContext};
use crate::transport::{HttpResponse, Transport};

/// A request/response interceptor.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    /// Sort key; lower runs first (outermost), ties keep declaration order.
    fn order(&self) -> i32 {
        0
    }

    /// Request-phase logic. Run `next` at most once to proceed.
    ///
    /// Returns the response from further in, `Some` with a fabricated
    /// response, or `None` to short-circuit without one.
    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        next: RequestNext<'_>,
    ) -> Result<Option<HttpResponse>, ApiError> {
        next.run(ctx).await
    }

    /// Response-phase logic. Run `next` to hand the response outward.
    async fn on_response(
        &self,
        ctx: &mut ResponseContext,
        next: ResponseNext<'_>,
    ) -> Result<(), ApiError> {
        next.run(ctx).await
    }
}

/// The rest of the request phase: the remaining filters, then the send.
///
/// `run` consumes the continuation, so it can be run at most once.
pub struct RequestNext<'a> {
    filters: &'a [Arc<dyn Filter>],
    entered: &'a AtomicUsize,
    transport: &'a dyn Transport,
}

impl<'a> RequestNext<'a> {
    pub fn run<'c>(
        self,
        ctx: &'c mut RequestContext,
    ) -> BoxFuture<'c, Result<Option<HttpResponse>, ApiError>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            match self.filters.split_first() {
                Some((filter, rest)) => {
                    self.entered.fetch_add(1, Ordering::SeqCst);
                    let next = RequestNext {
                        filters: rest,
                        entered: self.entered,
                        transport: self.transport,
                    };
                    filter.on_request(ctx, next).await
                }
                None => send(ctx, self.transport).await.map(Some),
            }
        })
    }

    /// Filters still to run before the send.
    pub fn remaining(&self) -> usize {
        self.filters.len()
    }
}

/// The rest of the response phase, moving outward.
pub struct ResponseNext<'a> {
    filters: &'a [Arc<dyn Filter>],
}

impl<'a> ResponseNext<'a> {
    pub fn run<'c>(self, ctx: &'c mut ResponseContext) -> BoxFuture<'c, Result<(), ApiError>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            match self.filters.split_last() {
                Some((filter, rest)) => filter.on_response(ctx, ResponseNext { filters: rest }).await,
                None => Ok(()),
            }
        })
    }

    pub fn remaining(&self) -> usize {
        self.filters.len()
    }
}

async fn send(ctx: &mut RequestContext, transport: &dyn Transport) -> Result<HttpResponse, ApiError> {
    let request = ctx.request.to_http()?;
    match ctx.timeout() {
        Some(timeout) => tokio::time::timeout(timeout, transport.send(request))
            .await
            .map_err(|_| ApiError::Timeout(timeout))?,
        None => transport.send(request).await,
    }
}

/// The ordered filters of one action: global filters from the client options
/// followed by the action's own, stable-sorted by order key.
#[derive(Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new(global: &[Arc<dyn Filter>], action: &[Arc<dyn Filter>]) -> Self {
        let mut filters: Vec<_> = global.iter().chain(action).cloned().collect();
        filters.sort_by_key(|filter| filter.order());
        Self { filters }
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run both phases.
    ///
    /// A request-phase failure is stored in [`ResponseContext::error`] and
    /// the response phase still runs. A response-phase failure is returned.
    pub async fn execute(
        &self,
        mut ctx: RequestContext,
        transport: &dyn Transport,
    ) -> Result<ResponseContext, ApiError> {
        let entered = AtomicUsize::new(0);
        let next = RequestNext {
            filters: &self.filters,
            entered: &entered,
            transport,
        };
        let outcome = next.run(&mut ctx).await;

        #[cfg(feature = "tracing")]
        if let Ok(None) = &outcome {
            tracing::debug!(action = %ctx.action().id(), "request phase short-circuited");
        }

        let entered = entered.load(Ordering::SeqCst).min(self.filters.len());
        let mut response = ResponseContext::new(ctx, outcome);
        ResponseNext {
            filters: &self.filters[..entered],
        }
        .run(&mut response)
        .await?;
        Ok(response)
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// A request-phase filter built from a closure.
///
/// ```ignore
/// let deny = FnFilter::new(|ctx, next| {
///     Box::pin(async move {
///         if ctx.request.headers.contains_key("x-deny") {
///             return Ok(None);
///         }
///         next.run(ctx).await
///     })
/// });
/// ```
pub struct FnFilter<F> {
    order: i32,
    func: F,
}

impl<F> FnFilter<F>
where
    F: for<'c> Fn(
            &'c mut RequestContext,
            RequestNext<'c>,
        ) -> BoxFuture<'c, Result<Option<HttpResponse>, ApiError>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(func: F) -> Self {
        Self { order: 0, func }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

#[async_trait]
impl<F> Filter for FnFilter<F>
where
    F: for<'c> Fn(
            &'c mut RequestContext,
            RequestNext<'c>,
        ) -> BoxFuture<'c, Result<Option<HttpResponse>, ApiError>>
        + Send
        + Sync
        + 'static,
{
    fn order(&self) -> i32 {
        self.order
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        next: RequestNext<'_>,
    ) -> Result<Option<HttpResponse>, ApiError> {
        (self.func)(ctx, next).await
    }
}

#[cfg(feature = "tracing")]
#[derive(Clone, Copy)]
struct TraceStart(std::time::Instant);

/// Logs a summary of every request and response at debug level.
///
/// Runs innermost (order `i32::MAX`) so it sees the request as sent.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceFilter;

#[cfg(feature = "tracing")]
#[async_trait]
impl Filter for TraceFilter {
    fn order(&self) -> i32 {
        i32::MAX
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        next: RequestNext<'_>,
    ) -> Result<Option<HttpResponse>, ApiError> {
        tracing::debug!(
            action = %ctx.action().id(),
            method = %ctx.request.method,
            uri = ctx.request.uri().map(|uri| uri.as_str()).unwrap_or_default(),
            headers = ?ctx.request.headers,
            body_len = ctx.request.body().map_or(0, |body| body.len()),
            "sending request"
        );
        ctx.properties_mut()
            .insert(TraceStart(std::time::Instant::now()));
        next.run(ctx).await
    }

    async fn on_response(
        &self,
        ctx: &mut ResponseContext,
        next: ResponseNext<'_>,
    ) -> Result<(), ApiError> {
        let elapsed = ctx
            .request
            .properties()
            .get::<TraceStart>()
            .map(|start| start.0.elapsed());
        match (&ctx.response, &ctx.error) {
            (_, Some(err)) => tracing::debug!(
                action = %ctx.action().id(),
                elapsed = ?elapsed,
                error = %err,
                "request failed"
            ),
            (Some(response), None) => tracing::debug!(
                action = %ctx.action().id(),
                elapsed = ?elapsed,
                status = %response.status(),
                body_len = response.body().len(),
                "received response"
            ),
            (None, None) => tracing::debug!(
                action = %ctx.action().id(),
                "no response"
            ),
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::MethodSignature;
    use crate::test_util::{MockTransport, context_for, response};
    use http::StatusCode;
    use std::sync::Mutex;

    /// Records its request and response phases into a shared log.
    struct Recording {
        name: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Filter for Recording {
        fn order(&self) -> i32 {
            self.order
        }

        async fn on_request(
            &self,
            ctx: &mut RequestContext,
            next: RequestNext<'_>,
        ) -> Result<Option<HttpResponse>, ApiError> {
            self.log.lock().unwrap().push(format!("{}-req", self.name));
            next.run(ctx).await
        }

        async fn on_response(
            &self,
            ctx: &mut ResponseContext,
            next: ResponseNext<'_>,
        ) -> Result<(), ApiError> {
            self.log.lock().unwrap().push(format!("{}-resp", self.name));
            next.run(ctx).await
        }
    }

    fn recording(name: &'static str, order: i32, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Filter> {
        Arc::new(Recording {
            name,
            order,
            log: log.clone(),
        })
    }

    fn request() -> RequestContext {
        context_for(MethodSignature::new("IUserApi", "get"), Some("http://localhost/"))
    }

    #[tokio::test]
    async fn test_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::with_log(log.clone());
        // Declared out of order on purpose.
        let pipeline = FilterPipeline::new(&[], &[recording("B", 2, &log), recording("A", 1, &log)]);

        let ctx = pipeline.execute(request(), &transport).await.unwrap();
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        assert_eq!(
            *log.lock().unwrap(),
            ["A-req", "B-req", "send", "B-resp", "A-resp"]
        );
    }

    #[tokio::test]
    async fn test_global_filters_precede_action_filters_on_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::with_log(log.clone());
        let pipeline = FilterPipeline::new(&[recording("G", 0, &log)], &[recording("L", 0, &log)]);

        pipeline.execute(request(), &transport).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["G-req", "L-req", "send", "L-resp", "G-resp"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_filters_and_send() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::with_log(log.clone());
        let cached = FnFilter::new(|_ctx, _next| {
            Box::pin(async move { Ok(Some(response(StatusCode::ACCEPTED, "cached"))) })
        })
        .with_order(1);
        let pipeline = FilterPipeline::new(
            &[],
            &[recording("A", 0, &log), Arc::new(cached), recording("C", 2, &log)],
        );

        let ctx = pipeline.execute(request(), &transport).await.unwrap();
        assert_eq!(ctx.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(*log.lock().unwrap(), ["A-req", "A-resp"]);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_short_circuit_without_response() {
        let transport = MockTransport::new();
        let deny = FnFilter::new(|_ctx, _next| Box::pin(async move { Ok(None) }));
        let pipeline = FilterPipeline::new(&[Arc::new(deny)], &[]);

        let ctx = pipeline.execute(request(), &transport).await.unwrap();
        assert!(ctx.response.is_none());
        assert!(ctx.error.is_none());
    }

    #[tokio::test]
    async fn test_request_failure_reaches_response_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::failing(ApiError::transport("connection refused"));
        let pipeline = FilterPipeline::new(&[], &[recording("A", 0, &log)]);

        let ctx = pipeline.execute(request(), &transport).await.unwrap();
        assert!(matches!(ctx.error, Some(ApiError::Transport(_))));
        assert_eq!(*log.lock().unwrap(), ["A-req", "A-resp"]);
    }

    #[tokio::test]
    async fn test_filter_observes_inner_errors() {
        let transport = MockTransport::failing(ApiError::transport("boom"));
        let translate = FnFilter::new(|ctx, next| {
            Box::pin(async move {
                match next.run(ctx).await {
                    Err(ApiError::Transport(_)) => Ok(Some(response(StatusCode::SERVICE_UNAVAILABLE, ""))),
                    other => other,
                }
            })
        });
        let pipeline = FilterPipeline::new(&[Arc::new(translate)], &[]);

        let ctx = pipeline.execute(request(), &transport).await.unwrap();
        assert!(ctx.error.is_none());
        assert_eq!(ctx.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_send_applies_timeout() {
        let transport = MockTransport::new().with_delay(std::time::Duration::from_millis(200));
        let pipeline = FilterPipeline::default();
        let mut ctx = request();
        ctx.set_timeout(std::time::Duration::from_millis(10));

        let ctx = pipeline.execute(ctx, &transport).await.unwrap();
        assert!(ctx.error.unwrap().is_timeout());
    }
}
