use std::collections::HashMap;

use crate::token_path::TokenPath;

/// Ordered multimap shared by the form, cookie and header containers. A name may occur
/// several times, possibly interleaved with other names; fields keep the order in which
/// they were parsed. The `index` of a field is its position among the fields sharing
/// its name.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyValueContainer {
    fields: Vec<(String, String)>,
}

impl KeyValueContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut container = Self::new();
        for (name, value) in pairs {
            container.push(name, value);
        }
        container
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the first value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_nth(name, 0)
    }

    pub fn get_nth(&self, name: &str, index: usize) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(key, _)| key == name)
            .nth(index)
            .map(|(_, value)| value.as_str())
    }

    /// Like `get`, but compares names case-insensitively, as HTTP does for header names.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of fields, counting repeated names once per value.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// All (name, value) pairs in their original order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub(crate) fn set(&mut self, name: &str, index: usize, value: &str) -> bool {
        match self
            .fields
            .iter_mut()
            .filter(|(key, _)| key == name)
            .nth(index)
        {
            Some((_, slot)) => {
                *slot = value.to_owned();
                true
            }
            None => false,
        }
    }

    /// Yields one token path per field whose name passes `eligible`, in field order.
    pub(crate) fn field_tokens(
        &self,
        eligible: fn(&str) -> bool,
    ) -> impl Iterator<Item = (TokenPath, &str)> + '_ {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        self.fields.iter().filter_map(move |(name, value)| {
            let occurrence = seen.entry(name.as_str()).or_insert(0);
            let index = *occurrence;
            *occurrence += 1;
            eligible(name).then(|| (TokenPath::field(name.clone(), index), value.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::KeyValueContainer;
    use crate::token_path::TokenPath;

    #[test]
    fn test_repeated_names_keep_order() {
        let container = KeyValueContainer::from_pairs([("a", "1"), ("b", "2"), ("a", "3")]);
        assert_eq!(container.len(), 3);
        assert_eq!(container.get("a"), Some("1"));
        assert_eq!(container.get_nth("a", 1), Some("3"));
        let pairs: Vec<_> = container.pairs().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("a", "3")]);
    }

    #[test]
    fn test_interleaved_tokens_address_occurrences() {
        let mut container = KeyValueContainer::from_pairs([("a", "1"), ("b", "2"), ("a", "3")]);
        let tokens: Vec<_> = container.field_tokens(|_| true).collect();
        assert_eq!(
            tokens,
            vec![
                (TokenPath::field("a", 0), "1"),
                (TokenPath::field("b", 0), "2"),
                (TokenPath::field("a", 1), "3"),
            ]
        );

        assert!(container.set("a", 1, "x"));
        let pairs: Vec<_> = container.pairs().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("a", "x")]);
    }

    #[test]
    fn test_field_tokens_respect_filter() {
        let container = KeyValueContainer::from_pairs([("Host", "x"), ("X-Id", "7")]);
        let tokens: Vec<_> = container
            .field_tokens(|name| name != "Host")
            .map(|(path, _)| path)
            .collect();
        assert_eq!(tokens, vec![TokenPath::field("X-Id", 0)]);
    }

    #[test]
    fn test_set_out_of_range_is_refused() {
        let mut container = KeyValueContainer::from_pairs([("a", "1")]);
        assert!(!container.set("a", 1, "x"));
        assert!(!container.set("missing", 0, "x"));
        assert!(container.set("a", 0, "x"));
        assert_eq!(container.get("a"), Some("x"));
    }

    #[test]
    fn test_get_ignore_case() {
        let container = KeyValueContainer::from_pairs([("Content-Type", "application/json")]);
        assert_eq!(
            container.get_ignore_case("content-type"),
            Some("application/json")
        );
        assert_eq!(container.get_ignore_case("cookie"), None);
    }
}
