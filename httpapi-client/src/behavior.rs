//! Behaviors that turn a call into a request and a response into a result.
//!
//! Three kinds of steps make up an [`ActionDescriptor`](crate::descriptor::ActionDescriptor):
//!
//! - [`ActionBehavior`]: request-phase steps attached to the action, run in
//!   ascending [`order`](ActionBehavior::order)
//! - [`ParameterBinding`]: maps one argument into the request (path, query,
//!   header, body)
//! - [`ReturnBinding`]: decodes the response into an [`ApiResult`]
//!
//! Built-in action behaviors have fixed orders so the host is set before the
//! method and path are applied:
//!
//! | Behavior | Order |
//! |----------|-------|
//! | [`HttpHost`] | `i32::MIN` |
//! | [`HttpMethod`] | `i32::MIN + 1` |
//! | everything else | `0` unless configured |

mod action;
mod parameter;
mod returns;

use async_trait::async_trait;
use http::Method;
use httpapi_core::{ApiError, Value};

use crate::context::{ApiResult, RequestContext, ResponseContext};
use crate::descriptor::ParameterDescriptor;

pub use action::{BasicAuth, FormField, HttpHost, HttpMethod, StaticHeader, Timeout};
pub use parameter::{
    BearerToken, CancellationBinding, FormContent, FormDataText, Header, Headers, JsonContent,
    MultipartFile, PathQuery, TimeoutParam, Uri, XmlContent,
};
pub use returns::{JsonReturn, RawReturn, XmlReturn};

/// A request-phase step attached to an action.
#[async_trait]
pub trait ActionBehavior: Send + Sync + 'static {
    /// Sort key; lower runs first, ties keep declaration order.
    fn order(&self) -> i32 {
        0
    }

    /// The HTTP method this behavior sets, if any.
    fn http_method(&self) -> Option<Method> {
        None
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> Result<(), ApiError>;
}

/// Maps one argument into the outbound request.
#[async_trait]
pub trait ParameterBinding: Send + Sync + 'static {
    /// Short identifier, for diagnostics.
    fn name(&self) -> &'static str;

    /// Check that the binding can be applied to `param`. Called once when
    /// the descriptor is built; the error becomes an unsupported signature.
    fn validate(&self, _param: &ParameterDescriptor) -> Result<(), String> {
        Ok(())
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError>;
}

/// Decodes the response of a call.
#[async_trait]
pub trait ReturnBinding: Send + Sync + 'static {
    /// Short identifier, for diagnostics.
    fn name(&self) -> &'static str;

    async fn on_response(&self, ctx: &mut ResponseContext) -> Result<ApiResult, ApiError>;
}
