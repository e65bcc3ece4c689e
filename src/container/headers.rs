use std::fmt::{Display, Formatter};

use super::{ContainerError, KeyValueContainer, decode_text};

pub(crate) const VARIANT: &str = "Headers";

/// Headers whose values are owned by the transport or by another container, so
/// mutating them would only break the request framing.
const TRANSPORT_HEADERS: [&str; 4] = ["host", "content-length", "content-type", "cookie"];

/// The header set of a request, in the `Name: value` block format.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadersContainer {
    fields: KeyValueContainer,
}

impl HeadersContainer {
    pub fn new(fields: KeyValueContainer) -> Self {
        Self { fields }
    }

    /// Parses a raw header block: one `Name: value` per line, blank lines ignored.
    pub fn parse(raw: &[u8]) -> Result<Self, ContainerError> {
        let text = decode_text(VARIANT, raw)?;
        let mut fields = KeyValueContainer::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    fields.push(name.trim(), value.trim())
                }
                _ => return Err(ContainerError::malformed(VARIANT, line)),
            }
        }
        Ok(Self::new(fields))
    }

    pub fn fields(&self) -> &KeyValueContainer {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut KeyValueContainer {
        &mut self.fields
    }

    pub fn content_type(&self) -> Option<&str> {
        self.fields.get_ignore_case("content-type")
    }

    pub(crate) fn is_fuzzable(name: &str) -> bool {
        !TRANSPORT_HEADERS
            .iter()
            .any(|header| header.eq_ignore_ascii_case(name))
    }
}

impl Display for HeadersContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (name, value) in self.fields.pairs() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}
