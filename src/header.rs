//! Header names, media types and content-type presets.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};

/// Correlation header sent with every outbound call.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// JSON media type, the default request content type.
pub const APPLICATION_JSON: &str = "application/json";

/// XML media type.
pub const APPLICATION_XML: &str = "application/xml";

/// Legacy XML media type, decoded the same way as [`APPLICATION_XML`].
pub const TEXT_XML: &str = "text/xml";

/// Headers declaring a JSON body.
pub fn json() -> HeaderMap {
    content_type(APPLICATION_JSON)
}

/// Headers declaring an `application/xml` body.
pub fn xml() -> HeaderMap {
    content_type(APPLICATION_XML)
}

/// Headers declaring a `text/xml` body.
pub fn text_xml() -> HeaderMap {
    content_type(TEXT_XML)
}

fn content_type(media_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(media_type));
    headers
}

/// Parses a header pair, reporting bad input as a configuration error.
pub(crate) fn parse_pair(
    name: impl AsRef<str>,
    value: impl AsRef<str>,
) -> crate::Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name.as_ref())
        .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value.as_ref())
        .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Marshaller;

    #[test]
    fn test_presets_select_expected_marshaller() {
        assert_eq!(Marshaller::from_header(json().get(CONTENT_TYPE)), Marshaller::Json);
        assert_eq!(Marshaller::from_header(xml().get(CONTENT_TYPE)), Marshaller::Xml);
        assert_eq!(Marshaller::from_header(text_xml().get(CONTENT_TYPE)), Marshaller::Xml);
    }

    #[test]
    fn test_parse_pair_rejects_bad_name() {
        let err = parse_pair("bad header", "v").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigurationError(msg) if msg.contains("name")));

        let (name, value) = parse_pair("X-Trace", "abc").unwrap();
        assert_eq!(name.as_str(), "x-trace");
        assert_eq!(value, "abc");
    }
}
