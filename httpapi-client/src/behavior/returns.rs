use async_trait::async_trait;
use httpapi_core::ApiError;

use super::ReturnBinding;
use crate::context::{ApiResult, ResponseContext};
use crate::descriptor::ReturnKind;
use crate::transport::HttpResponse;

/// The response of `ctx`, checked for a 2xx status when `ensure_success` is set.
fn checked_response(
    ctx: &ResponseContext,
    ensure_success: bool,
) -> Result<&HttpResponse, ApiError> {
    let response = ctx
        .response
        .as_ref()
        .ok_or_else(|| ApiError::decode(format!("`{}` received no response", ctx.action().name())))?;
    if ensure_success && !response.status().is_success() {
        return Err(ApiError::ResponseStatus {
            status: response.status(),
            body: response.body().clone(),
        });
    }
    Ok(response)
}

/// Decodes a JSON response body. An empty body decodes as JSON `null`.
#[derive(Clone, Debug)]
pub struct JsonReturn {
    ensure_success: bool,
}

impl Default for JsonReturn {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonReturn {
    pub fn new() -> Self {
        Self {
            ensure_success: true,
        }
    }

    /// Whether a non-2xx status fails the call. Defaults to `true`.
    pub fn ensure_success_status(mut self, enabled: bool) -> Self {
        self.ensure_success = enabled;
        self
    }
}

#[async_trait]
impl ReturnBinding for JsonReturn {
    fn name(&self) -> &'static str {
        "json_return"
    }

    async fn on_response(&self, ctx: &mut ResponseContext) -> Result<ApiResult, ApiError> {
        let response = checked_response(ctx, self.ensure_success)?;
        if response.body().is_empty() {
            return Ok(ApiResult::Json(serde_json::Value::Null));
        }
        let json = ctx.request.options().json.deserialize(response.body())?;
        Ok(ApiResult::Json(json))
    }
}

/// Validates and returns an XML response body.
#[derive(Clone, Debug)]
pub struct XmlReturn {
    ensure_success: bool,
}

impl Default for XmlReturn {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlReturn {
    pub fn new() -> Self {
        Self {
            ensure_success: true,
        }
    }

    /// Whether a non-2xx status fails the call. Defaults to `true`.
    pub fn ensure_success_status(mut self, enabled: bool) -> Self {
        self.ensure_success = enabled;
        self
    }
}

#[async_trait]
impl ReturnBinding for XmlReturn {
    fn name(&self) -> &'static str {
        "xml_return"
    }

    async fn on_response(&self, ctx: &mut ResponseContext) -> Result<ApiResult, ApiError> {
        let response = checked_response(ctx, self.ensure_success)?;
        let xml = ctx.request.options().xml.deserialize(response.body())?;
        Ok(ApiResult::Xml(xml))
    }
}

/// Returns the body as text or bytes, the whole response, or nothing,
/// following the action's return kind.
///
/// A [`ReturnKind::Raw`] action receives the response whatever its status.
#[derive(Clone, Debug)]
pub struct RawReturn {
    ensure_success: bool,
}

impl Default for RawReturn {
    fn default() -> Self {
        Self::new()
    }
}

impl RawReturn {
    pub fn new() -> Self {
        Self {
            ensure_success: true,
        }
    }

    /// Whether a non-2xx status fails the call. Defaults to `true`.
    pub fn ensure_success_status(mut self, enabled: bool) -> Self {
        self.ensure_success = enabled;
        self
    }
}

#[async_trait]
impl ReturnBinding for RawReturn {
    fn name(&self) -> &'static str {
        "raw_return"
    }

    async fn on_response(&self, ctx: &mut ResponseContext) -> Result<ApiResult, ApiError> {
        let kind = ctx.action().returns().kind;
        if kind == ReturnKind::Raw {
            return ctx
                .response
                .take()
                .map(ApiResult::Response)
                .ok_or_else(|| ApiError::decode(format!("`{}` received no response", ctx.action().name())));
        }
        if kind == ReturnKind::Unit && ctx.response.is_none() {
            return Ok(ApiResult::Unit);
        }

        let body = checked_response(ctx, self.ensure_success)?.body().clone();
        Ok(match kind {
            ReturnKind::Unit => ApiResult::Unit,
            ReturnKind::Text => ApiResult::Text(
                String::from_utf8(body.to_vec())
                    .map_err(|e| ApiError::decode(format!("response is not UTF-8: {}", e)))?,
            ),
            _ => ApiResult::Bytes(body),
        })
    }
}
