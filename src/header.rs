//! This module loads and prepares default headers. Users can optionally
//! specify headers that should be sent with every probe, and this module
//! parses those into a Reqwest HeaderMap. Default headers are never mutated.

use std::{fs::File, path::Path, str::FromStr};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

const USER_AGENT_VALUE: &str = concat!("wuppieaudit/", env!("CARGO_PKG_VERSION"));

/// Load default headers from the given YAML file, if any, on top of the user agent.
/// Headers from the file take precedence, so users can override the user agent.
pub fn get_default_headers(header_path: Option<&Path>) -> Result<HeaderMap> {
    // Add custom default headers from file
    let custom_header: IndexMap<String, String> = match header_path {
        Some(header_path) => {
            serde_yaml::from_reader(File::open(header_path).with_context(|| {
                format!(
                    "Failed to open default header file {}",
                    header_path.to_string_lossy()
                )
            })?)
            .with_context(|| "Failed to parse default header file as YAML")?
        }
        None => IndexMap::new(),
    };

    // Create the actual map of HeaderKeys and Values
    let mut default_headers = HeaderMap::new();

    // Insert default headers
    default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    // Insert custom headers from file
    for (key, value) in custom_header {
        default_headers.insert(
            HeaderName::from_str(&key)
                .with_context(|| format!("Can't parse {key} as header name"))?,
            HeaderValue::from_str(&value)
                .with_context(|| format!("Can't parse {value} as header value"))?,
        );
    }

    Ok(default_headers)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::get_default_headers;

    #[test]
    fn test_user_agent_only() {
        let headers = get_default_headers(None).unwrap();
        assert_eq!(headers.len(), 1);
        assert!(
            headers["user-agent"]
                .to_str()
                .unwrap()
                .starts_with("wuppieaudit/")
        );
    }

    #[test]
    fn test_headers_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "X-Api-Key: secret\nUser-Agent: scanner").unwrap();
        let headers = get_default_headers(Some(file.path())).unwrap();
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers["user-agent"], "scanner");
    }

    #[test]
    fn test_missing_file() {
        let err = get_default_headers(Some("/nonexistent/headers.yaml".as_ref())).unwrap_err();
        assert!(err.to_string().starts_with("Failed to open default header file"));
    }
}
