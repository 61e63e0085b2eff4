use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use httpapi_core::{ApiError, FormatOptions, Simple, SimpleKind, Value, to_header_name};
use url::Url;

use super::ParameterBinding;
use crate::context::RequestContext;
use crate::descriptor::{ParameterDescriptor, TypeKind};
use crate::request::{APPLICATION_JSON, APPLICATION_XML, MultipartPart};

/// Format options for one parameter, with its date-time override applied.
fn format_options(ctx: &RequestContext, date_time_format: Option<&str>) -> FormatOptions {
    match date_time_format {
        Some(format) => ctx.format_options().with_date_time_format(format),
        None => ctx.format_options().clone(),
    }
}

/// Flattens the argument into key-value pairs; pairs whose key names a
/// `{key}` path template fill it, the rest become query parameters.
#[derive(Clone, Debug, Default)]
pub struct PathQuery {
    date_time_format: Option<String>,
}

impl PathQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_time_format(format: impl Into<String>) -> Self {
        Self {
            date_time_format: Some(format.into()),
        }
    }
}

#[async_trait]
impl ParameterBinding for PathQuery {
    fn name(&self) -> &'static str {
        "path_query"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let options = format_options(ctx, self.date_time_format.as_deref());
        let pairs = ctx.options().key_value.serialize(&param.name, value, &options)?;
        ctx.request.bind_path_query(&pairs)
    }
}

/// Sends a simple argument (or a list of them) as a header.
///
/// The header name defaults to the parameter name with `_` mapped to `-`.
/// A null argument adds nothing.
#[derive(Clone, Debug, Default)]
pub struct Header {
    name: Option<String>,
    date_time_format: Option<String>,
}

impl Header {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            date_time_format: None,
        }
    }

    /// Use the parameter name as the header name.
    pub fn from_param() -> Self {
        Self::default()
    }

    pub fn date_time_format(mut self, format: impl Into<String>) -> Self {
        self.date_time_format = Some(format.into());
        self
    }
}

#[async_trait]
impl ParameterBinding for Header {
    fn name(&self) -> &'static str {
        "header"
    }

    fn validate(&self, param: &ParameterDescriptor) -> Result<(), String> {
        match param.kind {
            TypeKind::Cancellation => Err(format!(
                "parameter `{}` cannot be sent as a header",
                param.name
            )),
            _ => Ok(()),
        }
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => to_header_name(&param.name),
        };
        let options = format_options(ctx, self.date_time_format.as_deref());
        let values = match value {
            Value::Null => Vec::new(),
            Value::Simple(simple) => vec![simple.render(&options)?],
            Value::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Null => {}
                        Value::Simple(simple) => values.push(simple.render(&options)?),
                        other => return Err(ApiError::unsupported_type(other.type_name())),
                    }
                }
                values
            }
            other => return Err(ApiError::unsupported_type(other.type_name())),
        };
        for value in values {
            ctx.request.add_header(&name, &value)?;
        }
        Ok(())
    }
}

/// Sends every member of an object or map argument as a header.
///
/// Member names map `_` to `-`, so `User_Agent` becomes `User-Agent`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headers;

#[async_trait]
impl ParameterBinding for Headers {
    fn name(&self) -> &'static str {
        "headers"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let pairs = ctx
            .options()
            .key_value
            .serialize(&param.name, value, ctx.format_options())?;
        for pair in pairs {
            ctx.request.add_header(&to_header_name(&pair.key), &pair.value)?;
        }
        Ok(())
    }
}

/// Serializes the argument as the JSON request body.
#[derive(Clone, Debug, Default)]
pub struct JsonContent {
    date_time_format: Option<String>,
}

impl JsonContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_time_format(format: impl Into<String>) -> Self {
        Self {
            date_time_format: Some(format.into()),
        }
    }
}

#[async_trait]
impl ParameterBinding for JsonContent {
    fn name(&self) -> &'static str {
        "json_content"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        _param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let options = format_options(ctx, self.date_time_format.as_deref());
        let body = ctx.options().json.serialize(value, &options)?;
        ctx.request.set_body(APPLICATION_JSON, body);
        Ok(())
    }
}

/// Flattens the argument into url-encoded form fields.
#[derive(Clone, Debug, Default)]
pub struct FormContent {
    date_time_format: Option<String>,
}

impl FormContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_time_format(format: impl Into<String>) -> Self {
        Self {
            date_time_format: Some(format.into()),
        }
    }
}

#[async_trait]
impl ParameterBinding for FormContent {
    fn name(&self) -> &'static str {
        "form_content"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let options = format_options(ctx, self.date_time_format.as_deref());
        let pairs = ctx.options().key_value.serialize(&param.name, value, &options)?;
        ctx.request.add_form_fields(pairs);
        Ok(())
    }
}

/// Flattens the argument into `multipart/form-data` text parts.
#[derive(Clone, Debug, Default)]
pub struct FormDataText {
    date_time_format: Option<String>,
}

impl FormDataText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_time_format(format: impl Into<String>) -> Self {
        Self {
            date_time_format: Some(format.into()),
        }
    }
}

#[async_trait]
impl ParameterBinding for FormDataText {
    fn name(&self) -> &'static str {
        "form_data_text"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let options = format_options(ctx, self.date_time_format.as_deref());
        let pairs = ctx.options().key_value.serialize(&param.name, value, &options)?;
        for pair in pairs {
            ctx.request
                .add_multipart_part(MultipartPart::text(pair.key, pair.value));
        }
        Ok(())
    }
}

/// Sends a bytes argument as a `multipart/form-data` file part named after
/// the parameter.
///
/// The argument is either the file content, or a pair of a file name and
/// the content; a list of those sends several files under the same name.
/// A null argument adds nothing.
#[derive(Clone, Debug, Default)]
pub struct MultipartFile {
    file_name: Option<String>,
    content_type: Option<String>,
}

impl MultipartFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// File name for content passed without one. Defaults to the parameter
    /// name.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn part(
        &self,
        param: &ParameterDescriptor,
        value: &Value,
        options: &FormatOptions,
    ) -> Result<Option<MultipartPart>, ApiError> {
        let (file_name, data) = match value {
            Value::Null => return Ok(None),
            Value::Bytes(data) => (
                self.file_name.clone().unwrap_or_else(|| param.name.clone()),
                data.clone(),
            ),
            Value::Pair(name, content) => match (name.as_ref(), content.as_ref()) {
                (Value::Simple(name), Value::Bytes(data)) => (name.render(options)?, data.clone()),
                (_, other) => return Err(ApiError::unsupported_type(other.type_name())),
            },
            other => return Err(ApiError::unsupported_type(other.type_name())),
        };
        let mut part = MultipartPart::file(param.name.clone(), file_name, data);
        part.content_type = self.content_type.clone();
        Ok(Some(part))
    }
}

#[async_trait]
impl ParameterBinding for MultipartFile {
    fn name(&self) -> &'static str {
        "multipart_file"
    }

    fn validate(&self, param: &ParameterDescriptor) -> Result<(), String> {
        match param.kind {
            TypeKind::Complex => Ok(()),
            _ => Err(format!(
                "multipart file parameter `{}` must carry bytes",
                param.name
            )),
        }
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let items = match value {
            Value::List(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };
        for item in items {
            if let Some(part) = self.part(param, item, ctx.format_options())? {
                ctx.request.add_multipart_part(part);
            }
        }
        Ok(())
    }
}

/// Serializes the argument as the XML request body.
///
/// The root element is named after the parameter's type, without its
/// module path or generic arguments.
#[derive(Clone, Debug, Default)]
pub struct XmlContent;

impl XmlContent {
    pub fn new() -> Self {
        Self
    }
}

fn root_element(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

#[async_trait]
impl ParameterBinding for XmlContent {
    fn name(&self) -> &'static str {
        "xml_content"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let xml = ctx.options().xml.serialize(
            root_element(&param.type_name),
            value,
            ctx.format_options(),
        )?;
        ctx.request.set_body(APPLICATION_XML, Bytes::from(xml));
        Ok(())
    }
}

/// Uses the argument as the request URI.
///
/// Must be the first parameter. An absolute value replaces the URI; a
/// relative one is resolved against the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uri;

impl Uri {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ParameterBinding for Uri {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn validate(&self, param: &ParameterDescriptor) -> Result<(), String> {
        if param.index != 0 {
            return Err(format!(
                "uri parameter `{}` must be the first parameter",
                param.name
            ));
        }
        match param.kind {
            TypeKind::Simple(SimpleKind::Uri | SimpleKind::Text) => Ok(()),
            _ => Err(format!("uri parameter `{}` must be a uri or text", param.name)),
        }
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        _param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let text = match value {
            Value::Null => return Ok(()),
            Value::Simple(simple) => simple.render(ctx.format_options())?,
            other => return Err(ApiError::unsupported_type(other.type_name())),
        };
        match Url::parse(&text) {
            Ok(absolute) => {
                ctx.request.set_uri(absolute);
                Ok(())
            }
            Err(_) => ctx.request.join_path(&text),
        }
    }
}

/// Uses a numeric argument as the call timeout, in milliseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeoutParam;

#[async_trait]
impl ParameterBinding for TimeoutParam {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn validate(&self, param: &ParameterDescriptor) -> Result<(), String> {
        match param.kind {
            TypeKind::Simple(SimpleKind::Int | SimpleKind::UInt | SimpleKind::Float) => Ok(()),
            _ => Err(format!(
                "timeout parameter `{}` must be a number of milliseconds",
                param.name
            )),
        }
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let millis = match value.as_simple() {
            None if value.is_null() => return Ok(()),
            Some(Simple::Int(v)) if *v >= 0 => *v as f64,
            Some(Simple::UInt(v)) => *v as f64,
            Some(Simple::Float(v)) if v.is_finite() && *v >= 0.0 => *v,
            _ => {
                return Err(ApiError::invalid_argument(format!(
                    "`{}` is not a valid timeout",
                    param.name
                )));
            }
        };
        ctx.set_timeout(Duration::from_secs_f64(millis / 1000.0));
        Ok(())
    }
}

/// Sends a text argument as `Authorization: Bearer <token>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerToken;

#[async_trait]
impl ParameterBinding for BearerToken {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    async fn on_request(
        &self,
        ctx: &mut RequestContext,
        _param: &ParameterDescriptor,
        value: &Value,
    ) -> Result<(), ApiError> {
        let token = match value {
            Value::Null => return Ok(()),
            Value::Simple(simple) => simple.render(ctx.format_options())?,
            other => return Err(ApiError::unsupported_type(other.type_name())),
        };
        ctx.request
            .set_header(AUTHORIZATION.as_str(), &format!("Bearer {}", token))
    }
}

/// Links a cancellation argument to the call. Adds nothing to the request.
#[derive(Clone, Copy, Debug, Default)]
pub struct CancellationBinding;

#[async_trait]
impl ParameterBinding for CancellationBinding {
    fn name(&self) -> &'static str {
        "cancellation"
    }

    fn validate(&self, param: &ParameterDescriptor) -> Result<(), String> {
        match param.kind {
            TypeKind::Cancellation => Ok(()),
            _ => Err(format!("parameter `{}` is not a cancellation token", param.name)),
        }
    }

    async fn on_request(
        &self,
        _ctx: &mut RequestContext,
        _param: &ParameterDescriptor,
        _value: &Value,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::HttpMethod;
    use crate::descriptor::{MethodSignature, ParamSignature};
    use crate::test_util::context_for;
    use chrono::NaiveDate;
    use httpapi_core::ToValue;

    async fn bind(
        signature: MethodSignature,
        arguments: Vec<Value>,
    ) -> Result<RequestContext, ApiError> {
        let mut ctx = context_for(signature, Some("http://localhost/"));
        let action = ctx.action().clone();
        for behavior in action.behaviors() {
            behavior.on_request(&mut ctx).await?;
        }
        for (param, value) in action.parameters().iter().zip(&arguments) {
            param.binding.on_request(&mut ctx, param, value).await?;
        }
        Ok(ctx)
    }

    fn birthday() -> Value {
        NaiveDate::from_ymd_opt(2010, 10, 10).unwrap().to_value()
    }

    #[tokio::test]
    async fn test_path_query_fills_template_then_query() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users/{id}"))
            .param(ParamSignature::of::<u64>("id"))
            .param(ParamSignature::of::<String>("name"));
        let ctx = bind(signature, vec![7u64.to_value(), "laojiu".to_value()])
            .await
            .unwrap();
        assert_eq!(
            ctx.request.uri().unwrap().as_str(),
            "http://localhost/users/7?name=laojiu"
        );
    }

    #[tokio::test]
    async fn test_form_content_uses_date_format() {
        let user = Value::object([("name", "laojiu".to_value()), ("birthDay", birthday())]);
        let signature = MethodSignature::new("IUserApi", "post_form")
            .behavior(HttpMethod::post("users"))
            .param(ParamSignature::complex::<()>("user").bind(FormContent::new()));
        let ctx = bind(signature, vec![user]).await.unwrap();

        let http = ctx.request.to_http().unwrap();
        assert_eq!(
            http.body().as_ref(),
            b"name=laojiu&birthDay=2010-10-10+00%3A00%3A00"
        );
    }

    #[tokio::test]
    async fn test_form_data_text_and_files() {
        let user = Value::object([("name", "laojiu".to_value()), ("birthDay", birthday())]);
        let signature = MethodSignature::new("IUserApi", "upload")
            .behavior(HttpMethod::post("users/avatar"))
            .param(ParamSignature::complex::<()>("user").bind(FormDataText::new()))
            .param(
                ParamSignature::complex::<Bytes>("avatar")
                    .bind(MultipartFile::new().content_type("image/png")),
            )
            .param(ParamSignature::complex::<Bytes>("files").bind(MultipartFile::new()))
            .param(ParamSignature::complex::<Bytes>("skipped").bind(MultipartFile::new()));
        let files = Value::List(vec![
            Value::pair("a.txt", Bytes::from_static(b"A")),
            Value::pair("b.txt", Bytes::from_static(b"B")),
        ]);
        let ctx = bind(
            signature,
            vec![user, Bytes::from_static(b"PNG").to_value(), files, Value::Null],
        )
        .await
        .unwrap();

        let parts = ctx.request.multipart_parts();
        assert_eq!(
            parts,
            &[
                MultipartPart::text("name", "laojiu"),
                MultipartPart::text("birthDay", "2010-10-10 00:00:00"),
                MultipartPart::file("avatar", "avatar", Bytes::from_static(b"PNG"))
                    .content_type("image/png"),
                MultipartPart::file("files", "a.txt", Bytes::from_static(b"A")),
                MultipartPart::file("files", "b.txt", Bytes::from_static(b"B")),
            ]
        );

        let boundary = ctx.request.multipart_boundary().unwrap().to_string();
        let http = ctx.request.to_http().unwrap();
        assert_eq!(
            http.headers()[http::header::CONTENT_TYPE],
            format!("multipart/form-data; boundary={}", boundary).as_str()
        );
        let body = std::str::from_utf8(http.body()).unwrap();
        assert!(body.contains("name=\"avatar\"; filename=\"avatar\"\r\nContent-Type: image/png"));
        assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[tokio::test]
    async fn test_multipart_rejects_other_bodies() {
        let signature = MethodSignature::new("IUserApi", "upload")
            .behavior(HttpMethod::post("users"))
            .param(ParamSignature::complex::<()>("user").bind(FormContent::new()))
            .param(ParamSignature::complex::<Bytes>("avatar").bind(MultipartFile::new()));
        let user = Value::object([("name", "laojiu".to_value())]);
        let ctx = bind(signature, vec![user, Bytes::from_static(b"x").to_value()])
            .await
            .unwrap();
        assert!(matches!(ctx.request.to_http(), Err(ApiError::InvalidArgument(_))));

        let signature = MethodSignature::new("IUserApi", "upload")
            .behavior(HttpMethod::post("users"))
            .param(ParamSignature::complex::<Bytes>("avatar").bind(MultipartFile::new()));
        let err = bind(signature, vec!["not bytes".to_value()]).await.unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_headers_map_underscores() {
        let headers = Value::object([
            ("class", 123.to_value()),
            ("User_Agent", "laojiu".to_value()),
        ]);
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users"))
            .param(ParamSignature::complex::<()>("headers").bind(Headers));
        let ctx = bind(signature, vec![headers]).await.unwrap();

        assert_eq!(ctx.request.headers["class"], "123");
        assert_eq!(ctx.request.headers["user-agent"], "laojiu");
    }

    #[tokio::test]
    async fn test_header_from_param_name_and_null() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users"))
            .param(ParamSignature::of::<Option<String>>("x_trace").bind(Header::from_param()))
            .param(ParamSignature::of::<Option<String>>("x_skip").bind(Header::from_param()));
        let ctx = bind(signature, vec!["abc".to_value(), Value::Null])
            .await
            .unwrap();

        assert_eq!(ctx.request.headers["x-trace"], "abc");
        assert!(ctx.request.headers.get("x-skip").is_none());
    }

    #[tokio::test]
    async fn test_json_content_body() {
        let user = Value::object([("Name", "laojiu".to_value())]);
        let signature = MethodSignature::new("IUserApi", "post")
            .behavior(HttpMethod::post("users"))
            .param(ParamSignature::complex::<()>("user"));
        let ctx = bind(signature, vec![user]).await.unwrap();

        assert_eq!(ctx.request.body().unwrap().as_ref(), br#"{"Name":"laojiu"}"#);
        assert_eq!(ctx.request.headers[http::header::CONTENT_TYPE], APPLICATION_JSON);
    }

    #[tokio::test]
    async fn test_uri_argument() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get(""))
            .param(ParamSignature::of::<String>("uri").bind(Uri::new()))
            .param(ParamSignature::of::<u32>("page"));
        let ctx = bind(
            signature.clone(),
            vec!["http://other.example/list".to_value(), 2u32.to_value()],
        )
        .await
        .unwrap();
        assert_eq!(
            ctx.request.uri().unwrap().as_str(),
            "http://other.example/list?page=2"
        );

        let ctx = bind(signature, vec!["relative/list".to_value(), 3u32.to_value()])
            .await
            .unwrap();
        assert_eq!(
            ctx.request.uri().unwrap().as_str(),
            "http://localhost/relative/list?page=3"
        );
    }

    #[tokio::test]
    async fn test_timeout_and_bearer() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users"))
            .param(ParamSignature::of::<u64>("timeout").bind(TimeoutParam))
            .param(ParamSignature::of::<String>("token").bind(BearerToken));
        let ctx = bind(signature, vec![1500u64.to_value(), "abc".to_value()])
            .await
            .unwrap();

        assert_eq!(ctx.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(ctx.request.headers[AUTHORIZATION], "Bearer abc");
    }

    #[tokio::test]
    async fn test_negative_timeout_is_rejected() {
        let signature = MethodSignature::new("IUserApi", "get")
            .behavior(HttpMethod::get("users"))
            .param(ParamSignature::of::<i32>("timeout").bind(TimeoutParam));
        let err = bind(signature, vec![(-1i32).to_value()]).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[test]
    fn test_root_element() {
        assert_eq!(root_element("demo::models::User"), "User");
        assert_eq!(root_element("alloc::vec::Vec<demo::User>"), "Vec");
        assert_eq!(root_element("User"), "User");
    }
}
