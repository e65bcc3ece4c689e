//! TokenPath identifies one mutable value inside a container: a field of a form, a header,
//! a cookie, or a (possibly deeply nested) leaf of a JSON document.
//!
//! For key/value containers the identifier is the field name plus the position of the value
//! among values sharing that name, since forms and cookies may repeat a name.
//! For JSON documents values can be nested in objects and arrays, in which case we use
//! [a list](JsonPath) with elements of type [`PathElement`] which are used to "descend"
//! into the document to identify a leaf.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

#[derive(
    Clone, Debug, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum PathElement {
    /// Identifies a field in an object
    Name(String),
    /// Identifies an item in an array
    Offset(usize),
}

impl Display for PathElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PathElement::Name(name) => write!(f, "{name}"),
            PathElement::Offset(offset) => write!(f, "{offset}"),
        }
    }
}

impl From<&str> for PathElement {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl From<usize> for PathElement {
    fn from(value: usize) -> Self {
        Self::Offset(value)
    }
}

#[derive(
    Default,
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub struct JsonPath(pub Vec<PathElement>);

impl JsonPath {
    pub fn new() -> Self {
        Self(vec![])
    }

    pub fn from_elements(elements: &[PathElement]) -> Self {
        Self(elements.to_vec())
    }

    pub fn with_new_element(&self, new_element: PathElement) -> Self {
        let mut elements = self.0.clone();
        elements.push(new_element);
        Self(elements)
    }
}

impl Display for JsonPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("/"))
    }
}

/// See [module level documentation](crate::token_path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TokenPath {
    /// The `index`th value stored under `name` in a key/value container.
    Field { name: String, index: usize },
    /// A leaf inside a JSON document.
    Json(JsonPath),
}

impl TokenPath {
    pub fn field(name: impl Into<String>, index: usize) -> Self {
        Self::Field {
            name: name.into(),
            index,
        }
    }

    pub fn json(elements: &[PathElement]) -> Self {
        Self::Json(JsonPath::from_elements(elements))
    }

    /// The human readable name of the token, as used in dedup keys and reports.
    pub fn token_name(&self) -> String {
        match self {
            TokenPath::Field { name, .. } => name.clone(),
            TokenPath::Json(path) => path.to_string(),
        }
    }
}

impl Display for TokenPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPath::Field { name, index: 0 } => write!(f, "{name}"),
            TokenPath::Field { name, index } => write!(f, "{name}[{index}]"),
            TokenPath::Json(path) => path.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonPath, PathElement, TokenPath};

    #[test]
    fn test_json_path_display() {
        let path = JsonPath::new()
            .with_new_element("user".into())
            .with_new_element("emails".into())
            .with_new_element(1.into());
        assert_eq!(path.to_string(), "user/emails/1");
        assert_eq!(TokenPath::Json(path).token_name(), "user/emails/1");
    }

    #[test]
    fn test_field_display_shows_repeated_index() {
        assert_eq!(TokenPath::field("id", 0).to_string(), "id");
        assert_eq!(TokenPath::field("id", 2).to_string(), "id[2]");
        assert_eq!(TokenPath::field("id", 2).token_name(), "id");
    }

    #[test]
    fn test_root_path() {
        assert_eq!(JsonPath::new().to_string(), "");
        assert_eq!(
            JsonPath::from_elements(&[PathElement::Offset(0)]).to_string(),
            "0"
        );
    }
}
