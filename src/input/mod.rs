//! This module contains the representation of the baseline HTTP requests that are
//! audited. A request exposes its mutable parts as data containers: the query string,
//! the body (if its content type is understood), the cookie header and the remaining
//! headers.
//!
//! # Serialized representation
//!
//! Baseline requests are read from YAML files with the following structure.
//!
//! ```yaml
//! requests:
//!   - method: GET
//!     url: http://localhost:8080/search?q=shoes&page=1
//!     cookie: "session=abc; theme=dark"
//!   - method: POST
//!     url: http://localhost:8080/api/users
//!     headers:
//!       Content-Type: application/json
//!       Referer: http://localhost:8080/
//!     # The body is given as text. Bodies that are not valid UTF-8 can be
//!     # given base64-encoded in `body_b64` instead.
//!     body: '{"name": "bob", "age": 3}'
//! ```

use std::{
    fmt::{Display, Formatter},
    path::Path,
};

use anyhow::Context;
use url::Url;

pub use self::method::Method;
use crate::container::{
    CookieContainer, DataContainer, FormContainer, HeadersContainer,
    KeyValueContainer, Token,
};

pub mod method;
mod serde_helpers;

/// The part of a request a token lives in.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenLocation {
    Query,
    Body,
    Cookie,
    Headers,
}

/// The body of a baseline request. Bodies in a format none of the container variants
/// understands are kept verbatim and sent along unchanged, but not fuzzed.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Data(DataContainer),
    Raw(Vec<u8>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Data(_) => false,
            Body::Raw(bytes) => bytes.is_empty(),
        }
    }

    /// Picks the body representation for the given bytes. A body whose content type
    /// claims a known format but that fails to parse as such is kept raw.
    fn build(content_type: Option<&str>, raw: &[u8]) -> Self {
        if raw.is_empty() {
            return Body::Empty;
        }
        match DataContainer::from_postdata(content_type, raw) {
            Ok(Some(container)) => Body::Data(container),
            Ok(None) => Body::Raw(raw.to_vec()),
            Err(err) => {
                log::debug!("Keeping request body unparsed: {err}");
                Body::Raw(raw.to_vec())
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Data(container) => container.to_string().into_bytes(),
            Body::Raw(bytes) => bytes.clone(),
        }
    }
}

/// The main representation of an HTTP request in the audit engine.
///
/// `url` never contains a query string: query parameters live in the `query` container
/// and are put back by [`FuzzableRequest::url_with_query`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(
    try_from = "serde_helpers::SerializableRequest",
    into = "serde_helpers::SerializableRequest"
)]
pub struct FuzzableRequest {
    method: Method,
    url: Url,
    query: DataContainer,
    headers: DataContainer,
    cookie: DataContainer,
    body: Body,
}

impl FuzzableRequest {
    /// Builds a request, splitting the query string and the cookie header off into their
    /// own containers and matching the body to a container by its content type.
    pub fn new(method: Method, url: Url, headers: HeadersContainer, body: &[u8]) -> Self {
        let mut url = url;
        let query = match url.query().map(|query| FormContainer::parse(query.as_bytes())) {
            Some(Ok(form)) => {
                url.set_query(None);
                form
            }
            Some(Err(err)) => {
                log::debug!("Leaving query string of {url} in place: {err}");
                FormContainer::default()
            }
            None => FormContainer::default(),
        };
        let cookie = match headers.fields().get_ignore_case("cookie") {
            Some(raw) => CookieContainer::parse(raw.as_bytes()).unwrap_or_else(|err| {
                log::debug!("Sending cookie header of {url} unparsed: {err}");
                CookieContainer::default()
            }),
            None => CookieContainer::default(),
        };
        let body = Body::build(headers.content_type(), body);
        Self {
            method,
            url,
            query: DataContainer::Form(query),
            headers: DataContainer::Headers(headers),
            cookie: DataContainer::Cookie(cookie),
            body,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// The request URL without query string. This is the resource identity used to
    /// deduplicate findings.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn headers(&self) -> Option<&HeadersContainer> {
        match &self.headers {
            DataContainer::Headers(headers) => Some(headers),
            _ => None,
        }
    }

    /// The full URL, query string included.
    pub fn url_with_query(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.set_query(Some(&self.query.to_string()));
        }
        url
    }

    /// Points the request at a different origin, keeping its path and query.
    pub fn rebase(&mut self, target: &Url) {
        let mut rebased = target.clone();
        rebased.set_path(self.url.path());
        self.url = rebased;
    }

    pub fn container(&self, location: TokenLocation) -> Option<&DataContainer> {
        match location {
            TokenLocation::Query => Some(&self.query),
            TokenLocation::Body => match &self.body {
                Body::Data(container) => Some(container),
                Body::Empty | Body::Raw(_) => None,
            },
            TokenLocation::Cookie => Some(&self.cookie),
            TokenLocation::Headers => Some(&self.headers),
        }
    }

    /// Returns a copy of this request in which the container at `location` is replaced.
    pub fn with_container(&self, location: TokenLocation, container: DataContainer) -> Self {
        let mut copy = self.clone();
        match location {
            TokenLocation::Query => copy.query = container,
            TokenLocation::Body => copy.body = Body::Data(container),
            TokenLocation::Cookie => copy.cookie = container,
            TokenLocation::Headers => copy.headers = container,
        }
        copy
    }

    /// Enumerates every token of the request: query string, body, cookie and headers,
    /// in that order. Each call starts a fresh walk.
    pub fn tokens(&self) -> impl Iterator<Item = (TokenLocation, Token<'_>)> + '_ {
        [
            TokenLocation::Query,
            TokenLocation::Body,
            TokenLocation::Cookie,
            TokenLocation::Headers,
        ]
        .into_iter()
        .filter_map(|location| self.container(location).map(|c| (location, c)))
        .flat_map(|(location, container)| container.tokens().map(move |token| (location, token)))
    }

    /// The content type the request is sent with: the body container's own type if
    /// the body is parsed, otherwise whatever the baseline declared.
    pub fn content_type(&self) -> Option<&str> {
        match &self.body {
            Body::Data(container) => container.content_type().map(|(_, value)| value),
            Body::Empty | Body::Raw(_) => self.headers().and_then(HeadersContainer::content_type),
        }
    }

    /// The headers to put on the wire. The cookie container replaces the baseline's
    /// cookie header and a parsed body dictates the content type.
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let cookie = self.cookie.to_string();
        let content_type = self.content_type().map(str::to_owned);
        let mut wire: Vec<(String, String)> = self
            .headers()
            .into_iter()
            .flat_map(|headers| headers.fields().pairs())
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case("content-type")
                    && !(name.eq_ignore_ascii_case("cookie") && !self.cookie.is_empty())
            })
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        if !self.cookie.is_empty() {
            wire.push(("Cookie".to_owned(), cookie));
        }
        if let Some(content_type) = content_type {
            wire.push(("Content-Type".to_owned(), content_type));
        }
        wire
    }
}

impl Display for FuzzableRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url_with_query())
    }
}

/// The top-level structure of a request file.
#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct RequestFile {
    pub requests: Vec<FuzzableRequest>,
}

/// Loads baseline requests from a YAML file, or from every `*.yaml`/`*.yml` file in a
/// directory tree.
pub fn load_requests(path: &Path) -> anyhow::Result<Vec<FuzzableRequest>> {
    if path.is_file() {
        return load_request_file(path);
    }
    let mut requests = vec![];
    for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Error reading request directory {path:?}"))?;
        let is_yaml = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if entry.file_type().is_file() && is_yaml {
            requests.extend(load_request_file(entry.path())?);
        }
    }
    Ok(requests)
}

fn load_request_file(path: &Path) -> anyhow::Result<Vec<FuzzableRequest>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Error opening request file {path:?}"))?;
    let request_file: RequestFile = serde_yaml::from_reader(file)
        .with_context(|| format!("Error parsing request file {path:?}"))?;
    log::debug!(
        "Loaded {} request(s) from {path:?}",
        request_file.requests.len()
    );
    Ok(request_file.requests)
}

/// Builds a headers container from a list of pairs.
pub fn headers_from_pairs<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> HeadersContainer {
    HeadersContainer::new(KeyValueContainer::from_pairs(pairs))
}

impl TryFrom<(&str, &str)> for FuzzableRequest {
    type Error = anyhow::Error;

    /// Builds a body-less request from a method and a URL.
    fn try_from((method, url): (&str, &str)) -> Result<Self, Self::Error> {
        let method = Method::try_from(method)?;
        let url = Url::parse(url).with_context(|| format!("Invalid request URL {url}"))?;
        Ok(Self::new(method, url, HeadersContainer::default(), &[]))
    }
}
