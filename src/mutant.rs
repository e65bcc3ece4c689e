//! Mutants are requests derived from a baseline by changing exactly one token.

use url::Url;

use crate::{
    container::{
        Token,
        printable::{MAX_PRINTABLE, filter_non_printable, truncate},
    },
    input::{FuzzableRequest, Method, TokenLocation},
    token_path::TokenPath,
};

/// A baseline request with one token set to a probe value.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutant {
    request: FuzzableRequest,
    location: TokenLocation,
    path: TokenPath,
    original_value: String,
    value: String,
}

impl Mutant {
    /// Derives a mutant from `base` by writing `value` through `token`, which must have
    /// been enumerated from `base` at `location`.
    pub fn from_token(
        base: &FuzzableRequest,
        location: TokenLocation,
        token: &Token<'_>,
        value: &str,
    ) -> Self {
        Self {
            request: base.with_container(location, token.write(value)),
            location,
            path: token.path().clone(),
            original_value: token.original_value().to_owned(),
            value: value.to_owned(),
        }
    }

    /// Returns a sibling mutant: same request and token, different value.
    pub fn with_value(&self, value: &str) -> Self {
        let request = match self.request.container(self.location) {
            Some(container) => self
                .request
                .with_container(self.location, container.with_value(&self.path, value)),
            None => self.request.clone(),
        };
        Self {
            request,
            location: self.location,
            path: self.path.clone(),
            original_value: self.original_value.clone(),
            value: value.to_owned(),
        }
    }

    pub fn request(&self) -> &FuzzableRequest {
        &self.request
    }

    pub fn method(&self) -> Method {
        self.request.method()
    }

    /// The mutated request's URL, without query string.
    pub fn url(&self) -> &Url {
        self.request.url()
    }

    pub fn location(&self) -> TokenLocation {
        self.location
    }

    pub fn path(&self) -> &TokenPath {
        &self.path
    }

    pub fn token_name(&self) -> String {
        self.path.token_name()
    }

    pub fn original_value(&self) -> &str {
        &self.original_value
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// A one-line description of where the mutant's token is, for finding descriptions.
    pub fn found_at(&self) -> String {
        format!(
            "{} {}, using {} parameter \"{}\" with value: \"{}\"",
            self.method(),
            self.request.url_with_query(),
            self.location,
            self.token_name(),
            truncate(&filter_non_printable(&self.value), MAX_PRINTABLE)
        )
    }

    /// The parts of the mutant that outlive a scan, for findings and reports.
    pub fn to_record(&self) -> MutantRecord {
        MutantRecord {
            method: self.method(),
            url: self.url().to_string(),
            full_url: self.request.url_with_query().to_string(),
            location: self.location,
            token_name: self.token_name(),
            token_path: self.path.clone(),
            original_value: self.original_value.clone(),
            value: self.value.clone(),
            found_at: self.found_at(),
            container_summary: self
                .request
                .container(self.location)
                .map(|container| container.short_printable_repr(Some(&self.path)))
                .unwrap_or_default(),
        }
    }
}

/// Serializable summary of a [`Mutant`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MutantRecord {
    pub method: Method,
    /// Resource identity: the URL without query string.
    pub url: String,
    pub full_url: String,
    pub location: TokenLocation,
    pub token_name: String,
    pub token_path: TokenPath,
    pub original_value: String,
    pub value: String,
    pub found_at: String,
    pub container_summary: String,
}

/// Creates one mutant per (token, payload) pair. Tokens are visited in enumeration order
/// and, per token, payloads in the given order, so the output is deterministic.
pub fn create_mutants<S: AsRef<str>>(request: &FuzzableRequest, payloads: &[S]) -> Vec<Mutant> {
    request
        .tokens()
        .flat_map(|(location, token)| {
            payloads
                .iter()
                .map(|payload| Mutant::from_token(request, location, &token, payload.as_ref()))
                .collect::<Vec<_>>()
        })
        .collect()
}
