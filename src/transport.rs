//! The boundary to the network. The audit core only ever talks to a [`Transport`]; the
//! reqwest-backed [`ReqwestTransport`] is the implementation used by the binary.

use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use reqwest::{
    StatusCode,
    header::{HeaderName, HeaderValue},
};

use crate::input::FuzzableRequest;

/// The Response object provided by Reqwest is unwieldy, since its body contents
/// can only be obtained once by consuming the object. This prevents later reading
/// the status or obtaining the body contents again in another form.
///
/// This Response owns its body, and carries the identifier the transport assigned to
/// it. Identifiers increase monotonically over a scan and serve as finding evidence.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    id: u64,
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(id: u64, status: StatusCode, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            id,
            status,
            headers,
            body,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text. Bytes that are not valid UTF-8 are replaced, so this never
    /// fails on binary content.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the response declares a textual content type (`text/*`, or anything
    /// mentioning html or xml).
    pub fn is_text_or_html(&self) -> bool {
        self.content_type().is_some_and(|content_type| {
            let content_type = content_type.to_ascii_lowercase();
            content_type.starts_with("text/")
                || content_type.contains("html")
                || content_type.contains("xml")
        })
    }
}

/// Failure to obtain a response for a request. Each variant carries the message of the
/// underlying transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Timeout(String),
    Connection(String),
    /// The request could not be built (bad header, bad URL, ...).
    Build(String),
    Other(String),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Timeout(msg) => write!(f, "request timed out: {msg}"),
            DispatchError::Connection(msg) => write!(f, "connection failed: {msg}"),
            DispatchError::Build(msg) => write!(f, "could not build request: {msg}"),
            DispatchError::Other(msg) => write!(f, "request failed: {msg}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout(err.to_string())
        } else if err.is_connect() {
            DispatchError::Connection(err.to_string())
        } else if err.is_builder() {
            DispatchError::Build(err.to_string())
        } else {
            DispatchError::Other(err.to_string())
        }
    }
}

/// Sends requests. Implementations own all connection handling: pooling, TLS, retries
/// and rate limiting. They may be called from several threads at once.
pub trait Transport: Send + Sync {
    fn send(&self, request: &FuzzableRequest) -> Result<Response, DispatchError>;
}

/// A [`Transport`] backed by a blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    next_id: AtomicU64,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
        }
    }

    /// Build the reqwest request for a (possibly mutated) request. Headers whose name
    /// or value the HTTP library refuses are dropped.
    pub fn build_request(
        &self,
        request: &FuzzableRequest,
    ) -> Result<reqwest::blocking::Request, DispatchError> {
        let mut builder = self
            .client
            .request(request.method().into(), request.url_with_query());
        for (name, value) in request.wire_headers() {
            match (HeaderName::from_str(&name), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => log::debug!("Dropping header {name:?} that cannot be sent: {value:?}"),
            }
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_bytes());
        }
        Ok(builder.build()?)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &FuzzableRequest) -> Result<Response, DispatchError> {
        let built = self.build_request(request)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::trace!("Sending request {id}: {request}");
        let response = self.client.execute(built)?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            log::warn!("Target is rate limiting requests (HTTP 429) at {}", request.url());
        }
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.bytes()?.to_vec();
        log::trace!("Response {id}: {status}, {} bytes", body.len());
        Ok(Response::new(id, status, headers, body))
    }
}
