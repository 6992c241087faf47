//! Request and response types flowing through the middleware pipeline.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

pub const JS: &str = "application/javascript";
pub const CSS: &str = "text/css";
pub const HTML: &str = "text/html; charset=utf-8";
pub const JSON: &str = "application/json";

/// A request as seen by pipeline middlewares.
#[derive(Debug, Clone)]
pub struct DevRequest {
    pub method: Method,
    /// URL path as received, always starting with `/`.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DevRequest {
    pub fn get(path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };
        Self {
            method: Method::GET,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Value of a query parameter. Flags without `=` yield `Some("")`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }

    pub fn has_query(&self, key: &str) -> bool {
        self.query_param(key).is_some()
    }

    /// Whether the request was made by a module import rather than a
    /// document or stylesheet load.
    pub fn is_import(&self) -> bool {
        self.has_query("import")
            || self
                .headers
                .get("sec-fetch-dest")
                .is_some_and(|dest| dest == "script")
    }

    /// Path plus query, as it appeared on the wire.
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Lower-cased file extension of the request path.
    pub fn extension(&self) -> Option<&str> {
        let name = self.path.rsplit('/').next()?;
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext)
    }
}

/// Response body variants. Text bodies stay inspectable so outer stages can
/// post-process them.
#[derive(Debug, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Binary(Bytes),
    /// Opaque streaming body, passed through untouched.
    Stream(Body),
}

#[derive(Debug)]
pub struct DevResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl DevResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn text(content_type: &str, body: impl Into<String>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.set_content_type(content_type);
        response.body = ResponseBody::Text(body.into());
        response
    }

    pub fn js(body: impl Into<String>) -> Self {
        Self::text(JS, body)
    }

    pub fn binary(content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.set_content_type(content_type);
        response.body = ResponseBody::Binary(body.into());
        response
    }

    pub fn not_found(path: &str) -> Self {
        let mut response = Self::text("text/plain", format!("File not found: {path}"));
        response.status = StatusCode::NOT_FOUND;
        response
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        let mut response = Self::text("text/plain", message);
        response.status = status;
        response
    }

    /// Adopt a fully built axum response, keeping its body opaque.
    pub fn from_response(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body: ResponseBody::Stream(body),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
    }

    pub fn is_js(&self) -> bool {
        self.content_type().is_some_and(|ct| ct.starts_with(JS))
    }

    pub fn is_html(&self) -> bool {
        self.content_type().is_some_and(|ct| ct.starts_with("text/html"))
    }

    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, text: String) {
        self.body = ResponseBody::Text(text);
    }
}

impl IntoResponse for DevResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Text(text) => Body::from(text),
            ResponseBody::Binary(bytes) => Body::from(bytes),
            ResponseBody::Stream(body) => body,
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if !response.headers().contains_key(header::CACHE_CONTROL) {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
        response
    }
}

/// Determine content type from file extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "wasm" => "application/wasm",
        "js" | "mjs" | "cjs" => JS,
        "json" | "map" => JSON,
        "html" => HTML,
        "css" => CSS,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" | "md" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Whether files with `extension` are served as text through the content
/// store rather than as raw bytes.
pub fn is_text_extension(extension: &str) -> bool {
    matches!(
        extension,
        "js" | "mjs"
            | "cjs"
            | "ts"
            | "mts"
            | "cts"
            | "tsx"
            | "jsx"
            | "vue"
            | "css"
            | "json"
            | "html"
            | "svg"
            | "txt"
            | "md"
            | "map"
    )
}
