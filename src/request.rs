use anyhow::{Context, Result};
use http::{HeaderMap, Method, StatusCode, Uri};

/// What kind of resource the host believes the request is for, mirroring the
/// destination hint a fetch-intercepting environment supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Other,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Image => "image",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Font => "font",
            Destination::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// An intercepted request as handed over by the host environment.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub uri: Uri,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl FetchRequest {
    pub fn get(uri: Uri, destination: Destination, mode: RequestMode) -> Self {
        Self {
            method: Method::GET,
            uri,
            destination,
            mode,
        }
    }

    /// A top-level document navigation.
    pub fn navigation(uri: Uri) -> Self {
        Self::get(uri, Destination::Document, RequestMode::Navigate)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// An immutable response snapshot: status, headers, and the full body.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Locally fabricated plain-text response, used when both network and
    /// cache have failed but the request must still be answered.
    pub fn synthetic(status: StatusCode, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain"),
        );
        Self {
            status,
            headers,
            body: body.as_bytes().to_vec(),
        }
    }
}

/// Builds an absolute URI for a site-relative path against the configured
/// origin, e.g. `/offline.html` against `https://hub.example`.
pub fn uri_for_path(origin: &Uri, path: &str) -> Result<Uri> {
    let scheme = origin
        .scheme()
        .context("origin is missing a scheme")?
        .clone();
    let authority = origin
        .authority()
        .context("origin is missing an authority")?
        .clone();
    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path)
        .build()
        .with_context(|| format!("failed to build uri for path {path}"))
}
