//! URL-encoded forms, used both for `application/x-www-form-urlencoded` bodies and for the
//! query string of a URL.

use std::fmt::{Display, Formatter};

use super::{ContainerError, KeyValueContainer, decode_text};

pub(crate) const VARIANT: &str = "Form";
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormContainer {
    fields: KeyValueContainer,
}

impl FormContainer {
    pub fn new(fields: KeyValueContainer) -> Self {
        Self { fields }
    }

    /// Parses URL-encoded `name=value&...` text. Percent-escapes and `+` are decoded.
    pub fn parse(raw: &[u8]) -> Result<Self, ContainerError> {
        let text = decode_text(VARIANT, raw)?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(text)
            .map_err(|_| ContainerError::malformed(VARIANT, text))?;
        Ok(Self::new(KeyValueContainer::from_pairs(pairs)))
    }

    /// Parses a body, but only if the declared content type says it is a form.
    pub fn from_postdata(content_type: Option<&str>, body: &[u8]) -> Result<Self, ContainerError> {
        if !Self::is_form_content_type(content_type) {
            return Err(ContainerError::MissingContentType { variant: VARIANT });
        }
        Self::parse(body)
    }

    pub fn is_form_content_type(content_type: Option<&str>) -> bool {
        content_type.is_some_and(|value| {
            value
                .to_ascii_lowercase()
                .contains("application/x-www-form-urlencoded")
        })
    }

    pub fn fields(&self) -> &KeyValueContainer {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut KeyValueContainer {
        &mut self.fields
    }
}

impl Display for FormContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut encoded = url::form_urlencoded::Serializer::new(String::new());
        encoded.extend_pairs(self.fields.pairs());
        f.write_str(&encoded.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::FormContainer;
    use crate::container::ContainerError;

    #[test]
    fn test_round_trip() {
        let raw = "user=alice&tags=a&tags=b&note=hello+world%21";
        let form = FormContainer::parse(raw.as_bytes()).unwrap();
        assert_eq!(form.fields().get("note"), Some("hello world!"));
        let reparsed = FormContainer::parse(form.to_string().as_bytes()).unwrap();
        assert_eq!(reparsed, form);
    }

    #[test]
    fn test_interleaved_fields_keep_wire_order() {
        let form = FormContainer::parse(b"a=1&b=2&a=3").unwrap();
        assert_eq!(form.to_string(), "a=1&b=2&a=3");
    }

    #[test]
    fn test_empty_is_not_an_error() {
        let form = FormContainer::parse(b"").unwrap();
        assert!(form.fields().is_empty());
        assert_eq!(form.to_string(), "");
    }

    #[test]
    fn test_rejects_binary() {
        assert_eq!(
            FormContainer::parse(&[0x61, 0x3d, 0xff, 0xfe]),
            Err(ContainerError::NotText { variant: "Form" })
        );
    }

    #[test]
    fn test_from_postdata_requires_content_type() {
        assert_eq!(
            FormContainer::from_postdata(Some("application/json"), b"a=1"),
            Err(ContainerError::MissingContentType { variant: "Form" })
        );
        assert!(FormContainer::from_postdata(None, b"a=1").is_err());
        assert!(
            FormContainer::from_postdata(Some("Application/X-WWW-Form-Urlencoded"), b"a=1").is_ok()
        );
    }
}
