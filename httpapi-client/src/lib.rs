//! Declarative HTTP API client.
//!
//! Interface methods are registered as [`MethodSignature`]s: a method
//! name, its parameters and return shape, plus the behaviors and filters
//! that turn a call into an HTTP request. Each signature is compiled once
//! into an immutable [`ActionDescriptor`] and executed by an
//! [`ApiExecutor`] against a [`Transport`].
//!
//! ## Features
//!
//! - Path templates, query strings, headers, JSON / XML / form bodies from
//!   arguments, through a pluggable key-value engine
//! - Binding inference: simple parameters go to the path and query, complex
//!   ones to a JSON body (or the query on GET / HEAD)
//! - Onion-ordered request / response filters
//! - OAuth 2.0 token caching with refresh
//! - Cancellation through `CancellationToken` arguments, and timeouts
//! - hyper + rustls transport with connection pooling
//!
//! ## Example
//!
//! ```ignore
//! use httpapi_client::{
//!     ApiExecutor, Argument, DescriptorRegistry, HttpApiOptions, HyperTransport,
//!     behavior::HttpMethod,
//!     descriptor::{MethodSignature, ParamSignature, ReturnSignature},
//! };
//!
//! let options = HttpApiOptions::builder()
//!     .http_host("http://localhost:3000/api/")
//!     .build()?;
//! let executor = ApiExecutor::new(options, HyperTransport::new()?);
//! let registry = DescriptorRegistry::new();
//!
//! let get_user = registry
//!     .get_or_build(
//!         &MethodSignature::new("UserApi", "get_user")
//!             .behavior(HttpMethod::get("users/{id}"))
//!             .param(ParamSignature::of::<u64>("id"))
//!             .returns(ReturnSignature::json::<User>()),
//!     )
//!     .await?;
//!
//! let user: User = executor.invoke_json(&get_user, vec![Argument::value(7u64)]).await?;
//! ```
//!
//! ## Cancellation
//!
//! A call fails with [`ApiError::Canceled`] as soon as the token passed to
//! [`ApiExecutor::invoke_with`], or any `CancellationToken` argument, is
//! canceled. The in-flight send is dropped.
//!
//! ```ignore
//! let token = CancellationToken::new();
//! let call = executor.invoke_with(&get_user, vec![Argument::value(7u64)], token.clone());
//! token.cancel();
//! assert!(call.await.unwrap_err().is_canceled());
//! ```
//!
//! ## Feature Flags
//!
//! - `tls` (default): rustls with the ring provider and native roots
//! - `tracing`: spans per call and debug events for descriptor builds,
//!   token requests and short-circuited filters, plus [`filter::TraceFilter`]

pub mod behavior;
pub mod context;
pub mod descriptor;
mod executor;
pub mod filter;
pub mod oauth;
mod options;
pub mod request;
pub mod transport;

#[cfg(test)]
mod test_util;

pub use context::{ApiResult, Argument, RequestContext, ResponseContext};
pub use descriptor::{
    ActionDescriptor, ActionId, DescriptorRegistry, MethodSignature, ParamSignature, ReturnSignature,
};
pub use executor::ApiExecutor;
pub use filter::{Filter, FilterPipeline};
pub use options::{DEFAULT_USER_AGENT, HttpApiOptions, HttpApiOptionsBuilder};
pub use request::{HttpApiRequest, MultipartPart};

// Re-export transport types at the top level for convenience
pub use transport::{HttpResponse, HyperTransport, HyperTransportBuilder, Transport};

// Re-export core types that users need
pub use httpapi_core::{
    ApiError, DefaultJsonFormatter, DefaultXmlFormatter, FormatOptions, JsonFormatter, KeyValue,
    KeyValueFormatter, KeyValueSerializer, SimpleKind, ToValue, Value, XmlFormatter,
};

pub use tokio_util::sync::CancellationToken;
