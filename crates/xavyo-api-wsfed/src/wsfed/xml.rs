//! XML text helpers shared by token and metadata serialization.

use crate::error::{WsFedError, WsFedResult};
use chrono::{DateTime, Utc};
use xml_canonicalization::Canonicalizer;

/// XML escape special characters
#[must_use]
pub fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}

/// `xs:dateTime` in UTC with second precision.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Apply Exclusive XML Canonicalization (without comments).
pub fn canonicalize(xml: &str) -> WsFedResult<String> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| {
            WsFedError::TokenSerializationFailed(format!("XML canonicalization failed: {e}"))
        })?;

    String::from_utf8(output).map_err(|e| {
        WsFedError::TokenSerializationFailed(format!("Canonicalized XML is not valid UTF-8: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_xml_escape_basic() {
        assert_eq!(xml_escape("<>"), "&lt;&gt;");
        assert_eq!(xml_escape("a&b"), "a&amp;b");
        assert_eq!(xml_escape(r#"say "hi" 'x'"#), "say &quot;hi&quot; &apos;x&apos;");
    }

    #[test]
    fn test_format_instant() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(format_instant(t), "2024-03-05T07:08:09Z");
    }

    #[test]
    fn test_canonicalize_preserves_namespaces() {
        let input = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="test"><saml:Issuer>https://idp.example.com</saml:Issuer></saml:Assertion>"#;
        let result = canonicalize(input).expect("canonicalization should succeed");
        assert!(result.contains("xmlns:saml"));
        assert!(result.contains("<saml:Issuer>https://idp.example.com</saml:Issuer>"));
    }
}
