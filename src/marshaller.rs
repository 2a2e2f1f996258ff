//! Content-type driven body encoding.
//!
//! A [`Marshaller`] is picked once per request from its `Content-Type` header
//! and is reused to decode the matching [`Response`](crate::Response).

use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Cow;
use std::fmt;

/// The wire format used to encode a request body and decode its response.
///
/// # Examples
///
/// ```
/// use breakwater::Marshaller;
///
/// assert_eq!(Marshaller::from_content_type("text/xml; charset=utf-8"), Marshaller::Xml);
/// assert_eq!(Marshaller::from_content_type("application/json"), Marshaller::Json);
/// assert_eq!(Marshaller::from_content_type("text/plain"), Marshaller::Json);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Marshaller {
    /// `application/json`, also the fallback for unknown content types.
    #[default]
    Json,
    /// `application/xml` and `text/xml`.
    Xml,
}

/// An encode or decode failure reported by a [`Marshaller`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{format} codec error: {message}")]
pub struct CodecError {
    /// The marshaller that failed
    pub format: Marshaller,
    /// The underlying serde error message
    pub message: String,
}

impl Marshaller {
    /// Selects a marshaller from a `Content-Type` value.
    ///
    /// Matching is case-insensitive and ignores media-type parameters.
    /// Anything that is not an XML media type decodes as JSON.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/xml" | "text/xml" => Marshaller::Xml,
            _ => Marshaller::Json,
        }
    }

    /// Selects a marshaller from an optional header value.
    pub fn from_header(value: Option<&http::HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .map(Self::from_content_type)
            .unwrap_or_default()
    }

    /// The canonical media type for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Marshaller::Json => crate::header::APPLICATION_JSON,
            Marshaller::Xml => crate::header::APPLICATION_XML,
        }
    }

    /// Encodes `value` into a byte payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the value cannot be represented in this
    /// format.
    pub fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Marshaller::Json => serde_json::to_vec(value).map_err(|e| self.error(e)),
            Marshaller::Xml => quick_xml::se::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| self.error(e)),
        }
    }

    /// Decodes a byte payload into `T`.
    ///
    /// Invalid UTF-8 sequences are dropped before decoding so a single
    /// corrupted byte does not sink the whole document.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the cleaned payload does not decode.
    pub fn unmarshal<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let text = strip_invalid_utf8(bytes);
        match self {
            Marshaller::Json => serde_json::from_str(&text).map_err(|e| self.error(e)),
            Marshaller::Xml => quick_xml::de::from_str(&text).map_err(|e| self.error(e)),
        }
    }

    fn error(&self, err: impl fmt::Display) -> CodecError {
        CodecError {
            format: *self,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Marshaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marshaller::Json => f.write_str("json"),
            Marshaller::Xml => f.write_str("xml"),
        }
    }
}

/// Returns `bytes` as text with every invalid UTF-8 sequence removed.
pub(crate) fn strip_invalid_utf8(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let mut cleaned = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                cleaned.push_str(chunk.valid());
            }
            Cow::Owned(cleaned)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        id: u32,
        name: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn item() -> Item {
        Item {
            id: 7,
            name: "widget".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn test_content_type_selection() {
        let cases = [
            ("application/json", Marshaller::Json),
            ("application/json; charset=utf-8", Marshaller::Json),
            ("application/xml", Marshaller::Xml),
            ("APPLICATION/XML; charset=utf-8", Marshaller::Xml),
            ("text/xml", Marshaller::Xml),
            (" text/xml ;charset=utf-8", Marshaller::Xml),
            ("text/plain", Marshaller::Json),
            ("application/x-www-form-urlencoded", Marshaller::Json),
            ("application/xml+atom", Marshaller::Json),
            ("", Marshaller::Json),
        ];

        for (content_type, expected) in cases {
            assert_eq!(
                Marshaller::from_content_type(content_type),
                expected,
                "content type {:?}",
                content_type
            );
        }
    }

    #[test]
    fn test_missing_header_defaults_to_json() {
        assert_eq!(Marshaller::from_header(None), Marshaller::Json);

        let opaque = http::HeaderValue::from_bytes(b"text/\xffxml").unwrap();
        assert_eq!(Marshaller::from_header(Some(&opaque)), Marshaller::Json);
    }

    #[test]
    fn test_json_round_trip() {
        let bytes = Marshaller::Json.marshal(&item()).unwrap();
        let decoded: Item = Marshaller::Json.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, item());
    }

    #[test]
    fn test_xml_round_trip() {
        let bytes = Marshaller::Xml.marshal(&item()).unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("<Item>"));

        let decoded: Item = Marshaller::Xml.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, item());
    }

    #[test]
    fn test_unmarshal_strips_invalid_utf8() {
        let mut payload = br#"{"id":7,"name":"wid"#.to_vec();
        payload.push(0xff);
        payload.extend_from_slice(br#"get","tags":[]}"#);

        let decoded: Item = Marshaller::Json.unmarshal(&payload).unwrap();
        assert_eq!(decoded.name, "widget");

        let mut xml = b"<Item><id>7</id><name>wid".to_vec();
        xml.extend_from_slice(&[0xc3, 0x28]);
        xml.extend_from_slice(b"get</name></Item>");

        let decoded: Item = Marshaller::Xml.unmarshal(&xml).unwrap();
        assert_eq!(decoded.name, "wid(get");
    }

    #[test]
    fn test_unmarshal_error_names_format() {
        let err = Marshaller::Json.unmarshal::<Item>(b"not json").unwrap_err();
        assert_eq!(err.format, Marshaller::Json);
        assert!(err.to_string().starts_with("json codec error"));
    }

    #[test]
    fn test_strip_invalid_utf8_borrows_clean_input() {
        assert!(matches!(strip_invalid_utf8(b"clean"), Cow::Borrowed("clean")));
        assert_eq!(strip_invalid_utf8(b"a\xffb\xfe"), "ab");
    }
}
