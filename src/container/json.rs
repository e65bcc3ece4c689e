//! JSON request bodies.
//!
//! The document is held as a tree of [`JsonNode`]s whose objects and arrays sit behind an
//! `Arc`. Copying a container is therefore cheap, and writing a leaf through
//! [`JsonContainer::set`] only copies the objects and arrays on the path to that leaf
//! (`Arc::make_mut`); every other subtree stays shared with the original document.
//!
//! Only string leaves are tokens. Numbers, booleans and null are never mutated: putting a
//! string where the application expects a number mostly triggers the framework's type
//! checks instead of the application's own error handling.

use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{ContainerError, decode_text};
use crate::token_path::{JsonPath, PathElement, TokenPath};

pub(crate) const VARIANT: &str = "JSON";
pub const CONTENT_TYPE: &str = "application/json";

/// One node of a JSON document.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonNode {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Arc<Vec<JsonNode>>),
    Object(Arc<IndexMap<String, JsonNode>>),
}

impl JsonNode {
    pub fn to_value(&self) -> Value {
        match self {
            JsonNode::Null => Value::Null,
            JsonNode::Bool(val) => Value::Bool(*val),
            JsonNode::Number(val) => Value::Number(val.clone()),
            JsonNode::String(val) => Value::String(val.clone()),
            JsonNode::Array(items) => items.iter().map(JsonNode::to_value).collect(),
            JsonNode::Object(fields) => {
                let mut json_map = Map::new();
                for (key, val) in fields.iter() {
                    json_map.insert(key.clone(), val.to_value());
                }
                Value::Object(json_map)
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonNode::String(val) => Some(val),
            _ => None,
        }
    }

    /// Returns a nested node of this document, as addressed by `path`. If the path does
    /// not identify a node (bad field names, out-of-bound indexes, or too many elements),
    /// None is returned.
    pub fn resolve(&self, path: &JsonPath) -> Option<&Self> {
        let mut result = self;
        for path_element in &path.0 {
            match (result, path_element) {
                (JsonNode::Object(mapping), PathElement::Name(name)) => {
                    result = mapping.get(name)?
                }
                (JsonNode::Array(vector), PathElement::Offset(index)) => {
                    result = vector.get(*index)?
                }
                _ => return None,
            }
        }
        Some(result)
    }

    /// Like `resolve`, but un-shares every object and array on the way down, so the
    /// returned node can be written without affecting other copies of the document.
    fn resolve_mut(&mut self, path: &JsonPath) -> Option<&mut Self> {
        let mut result = self;
        for path_element in &path.0 {
            match (result, path_element) {
                (JsonNode::Object(mapping), PathElement::Name(name)) => {
                    result = Arc::make_mut(mapping).get_mut(name)?
                }
                (JsonNode::Array(vector), PathElement::Offset(index)) => {
                    result = Arc::make_mut(vector).get_mut(*index)?
                }
                _ => return None,
            }
        }
        Some(result)
    }
}

impl From<Value> for JsonNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(val) => Self::Bool(val),
            Value::Number(val) => Self::Number(val),
            Value::String(val) => Self::String(val),
            Value::Array(arr) => Self::Array(Arc::new(arr.into_iter().map(Self::from).collect())),
            Value::Object(content) => Self::Object(Arc::new(
                content
                    .into_iter()
                    .map(|(key, val)| (key, Self::from(val)))
                    .collect(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JsonContainer {
    root: JsonNode,
}

impl JsonContainer {
    /// Parses a JSON document. Text that is not JSON is refused, as is non-textual input.
    pub fn parse(raw: &[u8]) -> Result<Self, ContainerError> {
        let text = decode_text(VARIANT, raw)?;
        let value: Value =
            serde_json::from_str(text).map_err(|_| ContainerError::malformed(VARIANT, text))?;
        Ok(Self {
            root: value.into(),
        })
    }

    /// Parses a body, but only if the declared content type says it is JSON.
    pub fn from_postdata(content_type: Option<&str>, body: &[u8]) -> Result<Self, ContainerError> {
        if !Self::is_json_content_type(content_type) {
            return Err(ContainerError::MissingContentType { variant: VARIANT });
        }
        Self::parse(body)
    }

    pub fn is_json_content_type(content_type: Option<&str>) -> bool {
        content_type.is_some_and(|value| value.to_ascii_lowercase().contains("json"))
    }

    pub fn root(&self) -> &JsonNode {
        &self.root
    }

    /// True for an empty object or array at the root, and for a bare `null`.
    pub fn is_empty(&self) -> bool {
        match &self.root {
            JsonNode::Object(fields) => fields.is_empty(),
            JsonNode::Array(items) => items.is_empty(),
            JsonNode::Null => true,
            _ => false,
        }
    }

    /// Replaces the string leaf at `path`. Returns false, leaving the document unchanged,
    /// if `path` does not address a string.
    pub(crate) fn set(&mut self, path: &JsonPath, value: &str) -> bool {
        if self.root.resolve(path).and_then(JsonNode::as_str).is_none() {
            return false;
        }
        match self.root.resolve_mut(path) {
            Some(node) => {
                *node = JsonNode::String(value.to_owned());
                true
            }
            None => false,
        }
    }

    /// Walks the document depth-first in document order, yielding the string leaves.
    pub(crate) fn walk(&self) -> JsonWalk<'_> {
        JsonWalk {
            stack: vec![(JsonPath::new(), &self.root)],
        }
    }
}

impl Display for JsonContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root.to_value())
    }
}

pub(crate) struct JsonWalk<'a> {
    stack: Vec<(JsonPath, &'a JsonNode)>,
}

impl<'a> Iterator for JsonWalk<'a> {
    type Item = (TokenPath, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            match node {
                JsonNode::String(val) => return Some((TokenPath::Json(path), val.as_str())),
                JsonNode::Object(fields) => {
                    self.stack.extend(fields.iter().rev().map(|(name, child)| {
                        (path.with_new_element(PathElement::Name(name.clone())), child)
                    }))
                }
                JsonNode::Array(items) => {
                    self.stack
                        .extend(items.iter().enumerate().rev().map(|(index, child)| {
                            (path.with_new_element(PathElement::Offset(index)), child)
                        }))
                }
                JsonNode::Null | JsonNode::Bool(_) | JsonNode::Number(_) => (),
            }
        }
        None
    }
}
