use std::fmt::{Display, Formatter};

use super::{ContainerError, KeyValueContainer, decode_text};

pub(crate) const VARIANT: &str = "Cookie";

/// The value of a `Cookie` request header: `name=value` pairs separated by `;`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieContainer {
    fields: KeyValueContainer,
}

impl CookieContainer {
    pub fn new(fields: KeyValueContainer) -> Self {
        Self { fields }
    }

    pub fn parse(raw: &[u8]) -> Result<Self, ContainerError> {
        let text = decode_text(VARIANT, raw)?;
        let mut fields = KeyValueContainer::new();
        for pair in text.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| ContainerError::malformed(VARIANT, pair))?;
            fields.push(name.trim(), value.trim());
        }
        Ok(Self::new(fields))
    }

    pub fn fields(&self) -> &KeyValueContainer {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut KeyValueContainer {
        &mut self.fields
    }
}

impl Display for CookieContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, (name, value)) in self.fields.pairs().enumerate() {
            if position > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CookieContainer;
    use crate::container::ContainerError;

    #[test]
    fn test_round_trip() {
        let cookie = CookieContainer::parse(b"session=abc123; theme=dark;").unwrap();
        assert_eq!(cookie.fields().get("theme"), Some("dark"));
        assert_eq!(cookie.to_string(), "session=abc123; theme=dark");
        assert_eq!(
            CookieContainer::parse(cookie.to_string().as_bytes()).unwrap(),
            cookie
        );
    }

    #[test]
    fn test_value_may_contain_equals() {
        let cookie = CookieContainer::parse(b"token=a=b==").unwrap();
        assert_eq!(cookie.fields().get("token"), Some("a=b=="));
    }

    #[test]
    fn test_rejects_pair_without_value() {
        assert!(matches!(
            CookieContainer::parse(b"session"),
            Err(ContainerError::Malformed { variant: "Cookie", .. })
        ));
    }
}
