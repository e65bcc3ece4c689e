//! Data containers hold the mutable parts of an HTTP request: the query string, a form or
//! JSON body, the cookie header and the remaining headers. Every container can be parsed
//! from its wire format, written back to it, and walked to enumerate its tokens.
//!
//! A [`Token`] is one addressable value inside a container. Writing a new value through a
//! token never touches the container it was enumerated from; it always yields a copy.
//! For JSON documents that copy shares every subtree that was not on the path to the
//! written leaf (see [`json::JsonNode`]).

use std::fmt::{Display, Formatter};

use crate::token_path::TokenPath;

pub mod cookie;
pub mod form;
pub mod headers;
pub mod json;
mod key_value;
pub mod printable;

pub use self::{
    cookie::CookieContainer, form::FormContainer, headers::HeadersContainer,
    json::JsonContainer, key_value::KeyValueContainer,
};

/// Construction failures of a container. These are fatal to building that one container,
/// but never to any other container of the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// The raw input was not text (not valid UTF-8).
    NotText { variant: &'static str },
    /// The raw input is text, but does not parse as the container's format. The excerpt
    /// holds the first characters of the offending input.
    Malformed {
        variant: &'static str,
        excerpt: String,
    },
    /// The declared content type of the request does not match the container.
    MissingContentType { variant: &'static str },
}

impl ContainerError {
    pub(crate) fn malformed(variant: &'static str, raw: &str) -> Self {
        Self::Malformed {
            variant,
            excerpt: raw.chars().take(50).collect(),
        }
    }
}

impl Display for ContainerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::NotText { variant } => {
                write!(f, "unsupported non-textual data for {variant} container")
            }
            ContainerError::Malformed { variant, excerpt } => {
                write!(f, "unsupported data \"{excerpt}\" for {variant} container")
            }
            ContainerError::MissingContentType { variant } => {
                write!(f, "missing {variant} content type")
            }
        }
    }
}

impl std::error::Error for ContainerError {}

/// Decodes raw bytes as text, the common first step of every container parser.
pub(crate) fn decode_text<'a>(
    variant: &'static str,
    raw: &'a [u8],
) -> Result<&'a str, ContainerError> {
    std::str::from_utf8(raw).map_err(|_| ContainerError::NotText { variant })
}

/// The closed set of container variants. Adding a wire format means adding a case here.
#[derive(Clone, Debug, PartialEq)]
pub enum DataContainer {
    Form(FormContainer),
    Json(JsonContainer),
    Headers(HeadersContainer),
    Cookie(CookieContainer),
}

impl DataContainer {
    /// Picks the body container matching the declared content type and parses the body with
    /// it. Returns `Ok(None)` if no container variant handles this content type.
    pub fn from_postdata(
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Option<Self>, ContainerError> {
        if JsonContainer::is_json_content_type(content_type) {
            JsonContainer::from_postdata(content_type, body).map(|c| Some(Self::Json(c)))
        } else if FormContainer::is_form_content_type(content_type) {
            FormContainer::from_postdata(content_type, body).map(|c| Some(Self::Form(c)))
        } else {
            Ok(None)
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            DataContainer::Form(_) => form::VARIANT,
            DataContainer::Json(_) => json::VARIANT,
            DataContainer::Headers(_) => headers::VARIANT,
            DataContainer::Cookie(_) => cookie::VARIANT,
        }
    }

    /// The `Content-Type` header pair to send along when this container is a request body.
    pub fn content_type(&self) -> Option<(&'static str, &'static str)> {
        match self {
            DataContainer::Form(_) => Some(("Content-Type", form::CONTENT_TYPE)),
            DataContainer::Json(_) => Some(("Content-Type", json::CONTENT_TYPE)),
            DataContainer::Headers(_) | DataContainer::Cookie(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DataContainer::Form(c) => c.fields().is_empty(),
            DataContainer::Json(c) => c.is_empty(),
            DataContainer::Headers(c) => c.fields().is_empty(),
            DataContainer::Cookie(c) => c.fields().is_empty(),
        }
    }

    /// Walks the container and yields every token eligible for mutation. Each call starts
    /// a fresh walk.
    pub fn tokens(&self) -> Tokens<'_> {
        let walk: Box<dyn Iterator<Item = (TokenPath, &str)> + '_> = match self {
            DataContainer::Form(c) => Box::new(c.fields().field_tokens(|_| true)),
            DataContainer::Json(c) => Box::new(c.walk()),
            DataContainer::Headers(c) => {
                Box::new(c.fields().field_tokens(HeadersContainer::is_fuzzable))
            }
            DataContainer::Cookie(c) => Box::new(c.fields().field_tokens(|_| true)),
        };
        Tokens { owner: self, walk }
    }

    /// Returns the value stored at `path`, if the path addresses a textual value.
    pub fn value_at(&self, path: &TokenPath) -> Option<&str> {
        match (self, path) {
            (DataContainer::Form(c), TokenPath::Field { name, index }) => {
                c.fields().get_nth(name, *index)
            }
            (DataContainer::Headers(c), TokenPath::Field { name, index }) => {
                c.fields().get_nth(name, *index)
            }
            (DataContainer::Cookie(c), TokenPath::Field { name, index }) => {
                c.fields().get_nth(name, *index)
            }
            (DataContainer::Json(c), TokenPath::Json(path)) => {
                c.root().resolve(path).and_then(json::JsonNode::as_str)
            }
            _ => None,
        }
    }

    /// Returns a copy of this container in which the value at `path` is replaced.
    /// The original container is left untouched.
    pub fn with_value(&self, path: &TokenPath, value: &str) -> DataContainer {
        let mut copy = self.clone();
        let written = match (&mut copy, path) {
            (DataContainer::Form(c), TokenPath::Field { name, index }) => {
                c.fields_mut().set(name, *index, value)
            }
            (DataContainer::Headers(c), TokenPath::Field { name, index }) => {
                c.fields_mut().set(name, *index, value)
            }
            (DataContainer::Cookie(c), TokenPath::Field { name, index }) => {
                c.fields_mut().set(name, *index, value)
            }
            (DataContainer::Json(c), TokenPath::Json(path)) => c.set(path, value),
            _ => false,
        };
        if !written {
            log::debug!(
                "Token path {path} does not address a value in this {} container",
                self.variant_name()
            );
        }
        copy
    }

    /// A bounded, printable summary for logs and reports. If `active` is given, the summary
    /// focuses on that token; otherwise it shows the start of the wire form.
    pub fn short_printable_repr(&self, active: Option<&TokenPath>) -> String {
        match active.and_then(|path| self.value_at(path).map(|value| (path, value))) {
            Some((path, value)) => {
                let pair = format!(
                    "{}={}",
                    printable::filter_non_printable(&path.to_string()),
                    printable::filter_non_printable(value)
                );
                format!(
                    "...{}...",
                    printable::truncate(&pair, printable::MAX_PRINTABLE - 6)
                )
            }
            None => printable::truncate(
                &printable::filter_non_printable(&self.to_string()),
                printable::MAX_PRINTABLE,
            ),
        }
    }
}

impl Display for DataContainer {
    /// Writes the wire form of the container.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataContainer::Form(c) => c.fmt(f),
            DataContainer::Json(c) => c.fmt(f),
            DataContainer::Headers(c) => c.fmt(f),
            DataContainer::Cookie(c) => c.fmt(f),
        }
    }
}

/// One mutable value inside a container, as produced by [`DataContainer::tokens`].
#[derive(Clone, Debug)]
pub struct Token<'a> {
    owner: &'a DataContainer,
    path: TokenPath,
    original_value: &'a str,
}

impl<'a> Token<'a> {
    pub fn name(&self) -> String {
        self.path.token_name()
    }

    pub fn path(&self) -> &TokenPath {
        &self.path
    }

    pub fn original_value(&self) -> &'a str {
        self.original_value
    }

    /// Returns a full copy of the owning container with only this token's value replaced.
    pub fn write(&self, value: &str) -> DataContainer {
        self.owner.with_value(&self.path, value)
    }
}

/// Lazy, finite iterator over the tokens of one container.
pub struct Tokens<'a> {
    owner: &'a DataContainer,
    walk: Box<dyn Iterator<Item = (TokenPath, &'a str)> + 'a>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.next().map(|(path, original_value)| Token {
            owner: self.owner,
            path,
            original_value,
        })
    }
}
