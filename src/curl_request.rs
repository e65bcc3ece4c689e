use base64::{display::Base64Display, engine::general_purpose::STANDARD};

use crate::input::FuzzableRequest;

/// Renders a request as a shell command that replays it with curl. Bodies are passed
/// through base64 so that binary payloads and quotes survive the shell.
pub struct CurlRequest<'a>(pub &'a FuzzableRequest);

impl<'a> std::fmt::Display for CurlRequest<'a> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let body = self.0.body().to_bytes();
        if !body.is_empty() {
            writeln!(fmt, "echo {} | \\", Base64Display::new(&body, &STANDARD))?;
            writeln!(fmt, "base64 --decode | \\")?;
        }

        write!(fmt, "curl '{}'", self.0.url_with_query())?;
        write!(fmt, " \\\n    --request {}", self.0.method())?;
        for (key, value) in self.0.wire_headers() {
            if value.contains('\'') || value.chars().any(char::is_control) {
                write!(
                    fmt,
                    " \\\n    --header \"{}: $(echo -n {} | base64 --decode)\"",
                    key,
                    Base64Display::new(value.as_bytes(), &STANDARD)
                )?
            } else {
                write!(fmt, " \\\n    --header '{}: {}'", key, value)?
            }
        }
        if !body.is_empty() {
            write!(fmt, " \\\n    --data-binary @-")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CurlRequest;
    use crate::input::{FuzzableRequest, Method, headers_from_pairs};

    #[test]
    fn test_render_with_body() {
        let request = FuzzableRequest::new(
            Method::Post,
            url::Url::parse("http://localhost/login?next=%2Fhome").unwrap(),
            headers_from_pairs([
                ("Content-Type", "application/x-www-form-urlencoded"),
                ("X-Note", "it's"),
            ]),
            b"user=a",
        );
        let rendered = CurlRequest(&request).to_string();
        assert_eq!(
            rendered,
            "echo dXNlcj1h | \\\n\
             base64 --decode | \\\n\
             curl 'http://localhost/login?next=%2Fhome' \\\n    \
             --request POST \\\n    \
             --header \"X-Note: $(echo -n aXQncw== | base64 --decode)\" \\\n    \
             --header 'Content-Type: application/x-www-form-urlencoded' \\\n    \
             --data-binary @-"
        );
    }

    #[test]
    fn test_render_without_body() {
        let request = FuzzableRequest::try_from(("GET", "http://localhost/")).unwrap();
        assert_eq!(
            CurlRequest(&request).to_string(),
            "curl 'http://localhost/' \\\n    --request GET"
        );
    }
}
