//! Helper functions for (de)serializing requests.
//!
//! In YAML files a request is written the way a person would: a URL with its query
//! string, a map of headers, a cookie string and a textual body. Internally these are
//! split into containers, which requires a conversion to an intermediate type. That
//! conversion happens in this module.

use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::STANDARD as base64};
use indexmap::IndexMap;
use serde::{
    de::{self, Deserialize, Deserializer},
    ser::{Serialize, Serializer},
};
use url::Url;

use super::{FuzzableRequest, Method, headers_from_pairs};

pub(crate) fn serialize_optional_b64<S>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    bytes
        .as_ref()
        .map(|bytes| base64.encode(bytes))
        .serialize(serializer)
}

pub(crate) fn deserialize_optional_b64<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| base64.decode(s.as_bytes()).map_err(de::Error::custom))
        .transpose()
}

/// A helper struct to serialize `FuzzableRequest`s.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SerializableRequest {
    method: Method,
    url: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_b64",
        deserialize_with = "deserialize_optional_b64"
    )]
    body_b64: Option<Vec<u8>>,
}

impl TryFrom<SerializableRequest> for FuzzableRequest {
    type Error = anyhow::Error;

    fn try_from(request: SerializableRequest) -> Result<Self, Self::Error> {
        let url = Url::parse(&request.url)
            .with_context(|| format!("Invalid request URL {}", request.url))?;
        if request.body.is_some() && request.body_b64.is_some() {
            anyhow::bail!(
                "Request to {} has both a body and a body_b64, give only one",
                request.url
            );
        }
        let cookie = request.cookie.as_deref().map(|cookie| ("Cookie", cookie));
        let headers = headers_from_pairs(
            request
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .chain(cookie),
        );
        let body: &[u8] = match (&request.body, &request.body_b64) {
            (Some(text), _) => text.as_bytes(),
            (None, Some(bytes)) => bytes.as_slice(),
            (None, None) => &[],
        };
        Ok(FuzzableRequest::new(request.method, url, headers, body))
    }
}

impl From<FuzzableRequest> for SerializableRequest {
    fn from(request: FuzzableRequest) -> Self {
        let cookie = request
            .container(super::TokenLocation::Cookie)
            .filter(|cookie| !cookie.is_empty())
            .map(ToString::to_string);
        let headers = request
            .headers()
            .into_iter()
            .flat_map(|headers| headers.fields().pairs())
            .filter(|(name, _)| !(cookie.is_some() && name.eq_ignore_ascii_case("cookie")))
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        let (body, body_b64) = match request.body().to_bytes() {
            bytes if bytes.is_empty() => (None, None),
            bytes => match String::from_utf8(bytes) {
                Ok(text) => (Some(text), None),
                Err(err) => (None, Some(err.into_bytes())),
            },
        };
        Self {
            method: request.method(),
            url: request.url_with_query().to_string(),
            headers,
            cookie,
            body,
            body_b64,
        }
    }
}
