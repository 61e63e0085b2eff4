//! Call execution.
//!
//! [`ApiExecutor`] runs one call of an action:
//!
//! 1. check the arguments against the parameters
//! 2. run the action behaviors, then each parameter's binding
//! 3. run the filter pipeline around the transport send
//! 4. surface a remaining error, or decode the response with the return
//!    binding unless a filter already produced a result
//!
//! The whole call races the caller's cancellation token and every
//! cancellation argument; the first to fire fails the call with
//! [`ApiError::Canceled`] and drops the in-flight send.

use std::sync::Arc;

use futures::future::select_all;
use http::header::USER_AGENT;
use httpapi_core::{ApiError, SingleFlightCache, Value, from_xml};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::context::{ApiResult, Argument, RequestContext};
use crate::descriptor::{ActionDescriptor, ActionId, TypeKind};
use crate::filter::FilterPipeline;
use crate::options::HttpApiOptions;
use crate::transport::Transport;

/// Executes actions against one transport with one set of options.
pub struct ApiExecutor {
    options: Arc<HttpApiOptions>,
    transport: Arc<dyn Transport>,
    pipelines: SingleFlightCache<ActionId, Arc<FilterPipeline>>,
}

impl ApiExecutor {
    pub fn new(options: HttpApiOptions, transport: impl Transport) -> Self {
        Self::from_shared(Arc::new(options), Arc::new(transport))
    }

    pub fn from_shared(options: Arc<HttpApiOptions>, transport: Arc<dyn Transport>) -> Self {
        Self {
            options,
            transport,
            pipelines: SingleFlightCache::new(),
        }
    }

    pub fn options(&self) -> &Arc<HttpApiOptions> {
        &self.options
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Execute `action` with `arguments`, in parameter order.
    pub async fn invoke(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
    ) -> Result<ApiResult, ApiError> {
        self.invoke_with(action, arguments, CancellationToken::new())
            .await
    }

    /// Execute `action`, failing with [`ApiError::Canceled`] once `cancel`
    /// or any cancellation argument fires.
    pub async fn invoke_with(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
        cancel: CancellationToken,
    ) -> Result<ApiResult, ApiError> {
        let call = self.race(action, arguments, cancel);

        #[cfg(feature = "tracing")]
        let call = {
            use tracing::Instrument;
            let method = action
                .http_method()
                .map(|method| method.to_string())
                .unwrap_or_default();
            let span = tracing::debug_span!(
                "api_call",
                http.method = %method,
                api.action = %action.name()
            );
            call.instrument(span)
        };

        call.await
    }

    /// Execute `action` and deserialize its JSON result into `T`.
    pub async fn invoke_json<T: DeserializeOwned>(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
    ) -> Result<T, ApiError> {
        let json = self.invoke(action, arguments).await?.into_json()?;
        serde_json::from_value(json).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// Execute `action` and deserialize its XML result into `T`.
    pub async fn invoke_xml<T: DeserializeOwned>(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
    ) -> Result<T, ApiError> {
        let xml = self.invoke(action, arguments).await?.into_text()?;
        from_xml(&xml)
    }

    pub async fn invoke_text(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
    ) -> Result<String, ApiError> {
        self.invoke(action, arguments).await?.into_text()
    }

    async fn race(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
        cancel: CancellationToken,
    ) -> Result<ApiResult, ApiError> {
        let mut tokens = vec![cancel.clone()];
        tokens.extend(arguments.iter().filter_map(|argument| match argument {
            Argument::Cancellation(token) => Some(token.clone()),
            Argument::Value(_) => None,
        }));
        let canceled = select_all(tokens.iter().map(|token| Box::pin(token.cancelled())));

        tokio::select! {
            biased;
            _ = canceled => {
                #[cfg(feature = "tracing")]
                tracing::debug!(action = %action.id(), "call canceled");
                Err(ApiError::Canceled)
            }
            result = self.execute(action, arguments, cancel) => result,
        }
    }

    async fn execute(
        &self,
        action: &Arc<ActionDescriptor>,
        arguments: Vec<Argument>,
        cancel: CancellationToken,
    ) -> Result<ApiResult, ApiError> {
        check_arguments(action, &arguments)?;
        let pipeline = self.pipeline(action).await?;

        let mut ctx = RequestContext::new(action.clone(), self.options.clone(), arguments, cancel);
        for behavior in action.behaviors() {
            behavior.on_request(&mut ctx).await?;
        }
        for param in action.parameters() {
            let value = ctx.argument(param.index).cloned().unwrap_or(Value::Null);
            param.binding.on_request(&mut ctx, param, &value).await?;
        }
        if let Some(user_agent) = &self.options.user_agent {
            if !ctx.request.headers.contains_key(USER_AGENT) {
                ctx.request.set_header(USER_AGENT.as_str(), user_agent)?;
            }
        }

        let mut response = pipeline.execute(ctx, self.transport.as_ref()).await?;
        if let Some(err) = response.error.take() {
            return Err(err);
        }
        if let Some(result) = response.result.take() {
            return Ok(result);
        }
        action.returns().binding.on_response(&mut response).await
    }

    /// The filter pipeline of `action`, built on first use.
    async fn pipeline(&self, action: &ActionDescriptor) -> Result<Arc<FilterPipeline>, ApiError> {
        let global = self.options.filters.clone();
        let local = action.filters().to_vec();
        self.pipelines
            .get_or_add(action.id().clone(), move |_| async move {
                Ok(Arc::new(FilterPipeline::new(&global, &local)))
            })
            .await
    }

    /// Number of actions whose pipeline has been built.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

impl std::fmt::Debug for ApiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiExecutor")
            .field("options", &self.options)
            .field("pipelines", &self.pipelines.len())
            .finish_non_exhaustive()
    }
}

fn check_arguments(action: &ActionDescriptor, arguments: &[Argument]) -> Result<(), ApiError> {
    let parameters = action.parameters();
    if arguments.len() != parameters.len() {
        return Err(ApiError::invalid_argument(format!(
            "`{}` takes {} arguments but {} were supplied",
            action.name(),
            parameters.len(),
            arguments.len()
        )));
    }
    for (param, argument) in parameters.iter().zip(arguments) {
        let matches = matches!(
            (param.kind, argument),
            (TypeKind::Cancellation, Argument::Cancellation(_))
                | (TypeKind::Simple(_) | TypeKind::Complex, Argument::Value(_))
        );
        if !matches {
            return Err(ApiError::invalid_argument(format!(
                "argument for `{}` of `{}` has the wrong kind",
                param.name,
                action.name()
            )));
        }
    }
    Ok(())
}
