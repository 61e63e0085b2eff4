//! Error types shared by every httpapi crate.
//!
//! This module provides [`ApiError`], the single error type surfaced to the
//! caller of an API action, from descriptor building through to decoding the
//! response.

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;

/// Error variants produced while describing, executing or decoding an API call.
///
/// The type is `Clone` so that a single failed computation inside a
/// single-flight cache can be handed to every waiter unchanged.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    /// Required configuration is missing or invalid (host, endpoint, registration).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The method shape cannot be turned into an action descriptor.
    #[error("unsupported signature for `{action}`: {reason}")]
    UnsupportedSignature { action: String, reason: String },

    /// The key-value converter chain was exhausted for a value's type.
    #[error("unsupported type `{0}`")]
    UnsupportedType(String),

    /// The credential source returned no usable token.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// A response that had to be successful carried a non-success status.
    #[error("response status {status} does not indicate success")]
    ResponseStatus { status: StatusCode, body: Bytes },

    /// Transport-level error (connection failed, invalid response, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// The arguments supplied do not match the action's parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller canceled the call.
    #[error("the call was canceled")]
    Canceled,

    /// The call did not complete within its timeout.
    #[error("the call timed out after {0:?}")]
    Timeout(Duration),

    /// Recursive key-value conversion went deeper than allowed.
    #[error("conversion of `{name}` exceeded the maximum depth of {depth}")]
    DepthLimitExceeded { name: String, depth: usize },
}

impl ApiError {
    // Convenience constructors

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        ApiError::Configuration(message.into())
    }

    /// Create an unsupported signature error for the named action.
    pub fn unsupported_signature<A: Into<String>, R: Into<String>>(action: A, reason: R) -> Self {
        ApiError::UnsupportedSignature {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type<S: Into<String>>(type_name: S) -> Self {
        ApiError::UnsupportedType(type_name.into())
    }

    /// Create a token acquisition error.
    pub fn token_acquisition<S: Into<String>>(message: S) -> Self {
        ApiError::TokenAcquisition(message.into())
    }

    /// Create a transport error.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        ApiError::Transport(message.into())
    }

    /// Create an encode error.
    pub fn encode<S: Into<String>>(message: S) -> Self {
        ApiError::Encode(message.into())
    }

    /// Create a decode error.
    pub fn decode<S: Into<String>>(message: S) -> Self {
        ApiError::Decode(message.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        ApiError::InvalidArgument(message.into())
    }

    /// The response status, for [`ApiError::ResponseStatus`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::ResponseStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The response body that accompanied a non-success status.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            ApiError::ResponseStatus { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ApiError::Configuration(_))
    }

    pub fn is_unsupported_signature(&self) -> bool {
        matches!(self, ApiError::UnsupportedSignature { .. })
    }

    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, ApiError::UnsupportedType(_))
    }

    pub fn is_token_acquisition(&self) -> bool {
        matches!(self, ApiError::TokenAcquisition(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ApiError::Canceled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout(_))
    }

    /// Returns whether this error comes from the shape of the interface
    /// rather than from a particular call.
    ///
    /// Such errors are deterministic and will not go away on retry.
    ///
    /// ```
    /// use httpapi_core::ApiError;
    ///
    /// assert!(ApiError::unsupported_signature("Api::get", "generic").is_permanent());
    /// assert!(!ApiError::transport("connection reset").is_permanent());
    /// ```
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ApiError::Configuration(_)
                | ApiError::UnsupportedSignature { .. }
                | ApiError::UnsupportedType(_)
        )
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            ApiError::Encode(err.to_string())
        } else {
            ApiError::Decode(err.to_string())
        }
    }
}

impl From<http::Error> for ApiError {
    fn from(err: http::Error) -> Self {
        ApiError::InvalidArgument(err.to_string())
    }
}
