use std::{convert::TryFrom, fmt::Display, str::FromStr};

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
/// This enum represents the valid methods of a baseline request or mutant,
/// and supports conversions from and to strings.
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Trace,
    Options,
    Connect,
}

impl Method {
    /// Returns a static str reference naming the current method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Trace => "TRACE",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Trace => reqwest::Method::TRACE,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Connect => reqwest::Method::CONNECT,
        }
    }
}

/// Converts an owned string to a Method, if possible. The comparison is case
/// insensitive, but superfluous whitespace will always result in an error.
/// Conversion from `&str` comes with the `EnumString` derive.
impl TryFrom<String> for Method {
    type Error = InvalidMethodError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Method::from_str(&s).map_err(|_| InvalidMethodError(s))
    }
}

/// Error type returned from `Method::try_from(_: String)` if the given string
/// does not name a valid method.
#[derive(Debug, Clone)]
pub struct InvalidMethodError(String);

impl Display for InvalidMethodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid method: {}", self.0)
    }
}

impl std::error::Error for InvalidMethodError {}

#[cfg(test)]
mod tests {
    use super::Method;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Method::try_from("get").unwrap(), Method::Get);
        assert_eq!(Method::try_from("PaTcH").unwrap(), Method::Patch);
        assert!(Method::try_from(" GET").is_err());
        assert!(Method::try_from("FETCH").is_err());
    }

    #[test]
    fn test_display_is_uppercase() {
        assert_eq!(Method::Options.to_string(), "OPTIONS");
        assert_eq!(Method::Delete.as_ref(), "DELETE");
        assert_eq!(Method::Post.as_str(), "POST");
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let method: Method = serde_yaml::from_str("post").unwrap();
        assert_eq!(method, Method::Post);
        let err = serde_yaml::from_str::<Method>("fetch").unwrap_err();
        assert!(err.to_string().contains("invalid method: fetch"));
    }

    #[test]
    fn test_owned_and_borrowed_conversions_agree() {
        for name in ["get", "POST", "Options"] {
            assert_eq!(
                Method::try_from(name).unwrap(),
                Method::try_from(name.to_owned()).unwrap()
            );
        }
        assert!(Method::try_from(String::from("GET ")).is_err());
    }
}
