//! The outbound request being assembled for one call.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use httpapi_core::{ApiError, KeyValue};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;
use uuid::Uuid;

/// Characters escaped when a value is substituted into a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Characters escaped when a value is substituted into a query template.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'{')
    .add(b'}');

/// Escaped inside the quoted `name` and `filename` of a form-data part.
const DISPOSITION_VALUE: &AsciiSet = &CONTROLS.add(b'"');

pub const APPLICATION_JSON: &str = "application/json; charset=utf-8";
pub const APPLICATION_XML: &str = "application/xml; charset=utf-8";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// One part of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartPart {
    pub name: String,
    /// Set for file parts.
    pub file_name: Option<String>,
    /// Written only for file parts; defaults to `application/octet-stream`.
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: Bytes::from(value.into()),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: None,
            data,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn write_to(&self, boundary: &str, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        let mut disposition = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            utf8_percent_encode(&self.name, DISPOSITION_VALUE)
        );
        if let Some(file_name) = &self.file_name {
            disposition.push_str(&format!(
                "; filename=\"{}\"",
                utf8_percent_encode(file_name, DISPOSITION_VALUE)
            ));
        }
        out.extend_from_slice(disposition.as_bytes());
        out.extend_from_slice(b"\r\n");
        if self.file_name.is_some() {
            let content_type = self.content_type.as_deref().unwrap_or(APPLICATION_OCTET_STREAM);
            out.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.data);
        out.extend_from_slice(b"\r\n");
    }
}

/// Mutable request state filled in by behaviors and bindings.
///
/// Turned into an `http::Request<Bytes>` by [`HttpApiRequest::to_http`]
/// right before it is sent.
#[derive(Clone, Debug)]
pub struct HttpApiRequest {
    pub method: Method,
    uri: Option<Url>,
    pub headers: HeaderMap,
    body: Option<Bytes>,
    form: Vec<KeyValue>,
    multipart: Vec<MultipartPart>,
    boundary: Option<String>,
}

impl Default for HttpApiRequest {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl HttpApiRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            uri: None,
            headers: HeaderMap::new(),
            body: None,
            form: Vec::new(),
            multipart: Vec::new(),
            boundary: None,
        }
    }

    pub fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    pub fn set_uri(&mut self, uri: Url) {
        self.uri = Some(uri);
    }

    /// The request URI, which must have been set by a host or method behavior.
    pub fn uri_mut(&mut self) -> Result<&mut Url, ApiError> {
        self.uri.as_mut().ok_or_else(|| {
            ApiError::configuration(
                "the request has no URI: configure `http_host` or use an absolute path",
            )
        })
    }

    /// Resolve `path` against the current URI (or use it as is when absolute).
    pub fn join_path(&mut self, path: &str) -> Result<(), ApiError> {
        if let Ok(absolute) = Url::parse(path) {
            self.uri = Some(absolute);
            return Ok(());
        }
        let base = self.uri_mut()?;
        let joined = base
            .join(path)
            .map_err(|e| ApiError::configuration(format!("invalid path `{}`: {}", path, e)))?;
        *base = joined;
        Ok(())
    }

    /// Substitute a `{key}` template in the path, or failing that in the
    /// query, matching the key without regard to case. Returns `false` when
    /// the URI has no such template.
    pub fn replace_path_template(&mut self, key: &str, value: &str) -> Result<bool, ApiError> {
        let url = self.uri_mut()?;
        let path = url.path().to_string();
        // Url keeps braces percent-encoded in the path.
        let template = format!("%7B{}%7D", utf8_percent_encode(key, PATH_SEGMENT)).to_ascii_lowercase();
        if let Some(start) = path.to_ascii_lowercase().find(&template) {
            let replaced = format!(
                "{}{}{}",
                &path[..start],
                utf8_percent_encode(value, PATH_SEGMENT),
                &path[start + template.len()..]
            );
            url.set_path(&replaced);
            return Ok(true);
        }

        // Braces in the query are kept as typed.
        let Some(query) = url.query().map(str::to_string) else {
            return Ok(false);
        };
        let template = format!("{{{}}}", key).to_ascii_lowercase();
        let Some(start) = query.to_ascii_lowercase().find(&template) else {
            return Ok(false);
        };
        let replaced = format!(
            "{}{}{}",
            &query[..start],
            utf8_percent_encode(value, QUERY_VALUE),
            &query[start + template.len()..]
        );
        url.set_query(Some(&replaced));
        Ok(true)
    }

    /// Apply pairs to the URI: `{key}` templates first, the rest as query
    /// parameters.
    pub fn bind_path_query(&mut self, pairs: &[KeyValue]) -> Result<(), ApiError> {
        let mut query = Vec::new();
        for pair in pairs {
            if !self.replace_path_template(&pair.key, &pair.value)? {
                query.push(pair);
            }
        }
        if !query.is_empty() {
            let url = self.uri_mut()?;
            let mut serializer = url.query_pairs_mut();
            for pair in query {
                serializer.append_pair(&pair.key, &pair.value);
            }
        }
        Ok(())
    }

    pub fn add_query(&mut self, key: &str, value: &str) -> Result<(), ApiError> {
        self.uri_mut()?.query_pairs_mut().append_pair(key, value);
        Ok(())
    }

    /// Append a header, keeping existing values of the same name.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), ApiError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Set a header, replacing existing values of the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ApiError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Set the body and its content type.
    pub fn set_body(&mut self, content_type: &'static str, body: Bytes) {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = Some(body);
    }

    /// Queue url-encoded form fields. They are encoded when the request is sent.
    pub fn add_form_fields<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.form.extend(fields);
    }

    pub fn form_fields(&self) -> &[KeyValue] {
        &self.form
    }

    /// Queue a `multipart/form-data` part. The boundary is chosen when the
    /// first part is added.
    pub fn add_multipart_part(&mut self, part: MultipartPart) {
        if self.boundary.is_none() {
            self.boundary = Some(Uuid::new_v4().simple().to_string());
        }
        self.multipart.push(part);
    }

    pub fn multipart_parts(&self) -> &[MultipartPart] {
        &self.multipart
    }

    pub fn multipart_boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Build the `http::Request` to hand to the transport.
    pub fn to_http(&self) -> Result<http::Request<Bytes>, ApiError> {
        let uri = self.uri.as_ref().ok_or_else(|| {
            ApiError::configuration(
                "the request has no URI: configure `http_host` or use an absolute path",
            )
        })?;
        let uri: http::Uri = uri
            .as_str()
            .parse()
            .map_err(|e| ApiError::invalid_argument(format!("invalid URI `{}`: {}", uri, e)))?;

        let sources = [self.body.is_some(), !self.form.is_empty(), !self.multipart.is_empty()];
        if sources.iter().filter(|set| **set).count() > 1 {
            return Err(ApiError::invalid_argument(
                "a request can carry only one of a body, form fields or multipart parts",
            ));
        }

        let mut headers = self.headers.clone();
        let body = if let Some(body) = &self.body {
            body.clone()
        } else if !self.form.is_empty() {
            let mut encoder = url::form_urlencoded::Serializer::new(String::new());
            for field in &self.form {
                encoder.append_pair(&field.key, &field.value);
            }
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(FORM_URLENCODED));
            Bytes::from(encoder.finish())
        } else if let Some(boundary) = self.boundary.as_deref().filter(|_| !self.multipart.is_empty()) {
            let mut out = Vec::new();
            for part in &self.multipart {
                part.write_to(boundary, &mut out);
            }
            out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
            let content_type = format!("{}; boundary={}", MULTIPART_FORM_DATA, boundary);
            let content_type = HeaderValue::from_str(&content_type)
                .map_err(|_| ApiError::invalid_argument("invalid multipart boundary"))?;
            headers.insert(CONTENT_TYPE, content_type);
            Bytes::from(out)
        } else {
            Bytes::new()
        };

        let mut request = http::Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(body)?;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ApiError::invalid_argument(format!("invalid header name `{}`", name)))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| ApiError::invalid_argument(format!("invalid value for header `{}`", name)))?;
    Ok((header_name, header_value))
}
