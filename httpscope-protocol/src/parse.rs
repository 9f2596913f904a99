//! Consumer-side decoding of `HttpTrace` records.

use std::fmt;

use serde::{Serialize, Serializer};
use zerocopy::FromBytes;

use crate::error::{ProtocolError, Result};
use crate::status::reason_phrase;
use crate::trace::{
    HttpTrace, CONTENT_LENGTH_OVERFLOW, CONTENT_LENGTH_UNKNOWN, HTTP_TRACE_BUF, HTTP_TRACE_SIZE,
};

/// HTTP version as reported by the response (`Response.ProtoMajor/ProtoMinor`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub fn from_packed(protocol: u8) -> Self {
        Self {
            major: protocol >> 4,
            minor: protocol & 0x0f,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

impl Serialize for HttpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decoded `content_length` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    Exact(u32),
    /// The response did not know its length (Go reported -1)
    Unknown,
    /// The length was too large for the record
    Overflow,
}

impl From<u32> for ContentLength {
    fn from(raw: u32) -> Self {
        match raw {
            CONTENT_LENGTH_UNKNOWN => ContentLength::Unknown,
            CONTENT_LENGTH_OVERFLOW => ContentLength::Overflow,
            n => ContentLength::Exact(n),
        }
    }
}

impl fmt::Display for ContentLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentLength::Exact(n) => write!(f, "{n}"),
            ContentLength::Unknown => f.write_str("<unk>"),
            ContentLength::Overflow => write!(f, "{CONTENT_LENGTH_OVERFLOW}+"),
        }
    }
}

impl Serialize for ContentLength {
    // Exact lengths stay numeric in JSON; the sentinels become null and a string.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ContentLength::Exact(n) => serializer.serialize_u32(*n),
            ContentLength::Unknown => serializer.serialize_none(),
            ContentLength::Overflow => serializer.collect_str(self),
        }
    }
}

/// Response status with its standard reason phrase, if one exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u16);

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match reason_phrase(self.0) {
            Some(reason) => write!(f, "{} {}", self.0, reason),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A validated trace with its text fields decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTrace {
    pub partial: bool,
    pub protocol: HttpVersion,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub content_length: ContentLength,
    pub pid: u32,
}

impl ParsedTrace {
    pub fn status(&self) -> Status {
        Status(self.status_code)
    }
}

impl HttpTrace {
    /// Decode one ring buffer record.
    ///
    /// The slice must be exactly one record long. Text is decoded lossily since
    /// truncation may split a multi-byte character.
    pub fn parse(bytes: &[u8]) -> Result<ParsedTrace> {
        if bytes.len() != HTTP_TRACE_SIZE {
            return Err(ProtocolError::Length {
                expected: HTTP_TRACE_SIZE,
                actual: bytes.len(),
            });
        }
        let trace = HttpTrace::read_from_bytes(bytes).map_err(|_| ProtocolError::Length {
            expected: HTTP_TRACE_SIZE,
            actual: bytes.len(),
        })?;
        trace.decode()
    }

    /// Validate the text offsets and decode the record.
    pub fn decode(&self) -> Result<ParsedTrace> {
        let head = &self.head;
        if head.method_end as u16 > head.url_end || head.url_end as usize > HTTP_TRACE_BUF {
            return Err(ProtocolError::Offsets {
                method_end: head.method_end,
                url_end: head.url_end,
                capacity: HTTP_TRACE_BUF,
            });
        }
        let method_end = head.method_end as usize;
        let url_end = head.url_end as usize;

        Ok(ParsedTrace {
            partial: head.partial != 0,
            protocol: HttpVersion::from_packed(head.protocol),
            method: String::from_utf8_lossy(&self.buf[..method_end]).into_owned(),
            url: String::from_utf8_lossy(&self.buf[method_end..url_end]).into_owned(),
            status_code: head.status_code,
            content_length: ContentLength::from(head.content_length),
            pid: head.pid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{encode_content_length, encode_protocol};
    use zerocopy::{FromZeros, IntoBytes};

    fn sample() -> HttpTrace {
        let mut trace = HttpTrace::new_zeroed();
        let text = b"GEThttps://example.com/x?a=1";
        trace.buf[..text.len()].copy_from_slice(text);
        trace.head.method_end = 3;
        trace.head.url_end = text.len() as u16;
        trace.head.protocol = encode_protocol(1, 1);
        trace.head.status_code = 200;
        trace.head.content_length = encode_content_length(15);
        trace.head.pid = 4242;
        trace
    }

    #[test]
    fn test_parse_complete_record() {
        let parsed = HttpTrace::parse(sample().as_bytes()).unwrap();
        assert!(!parsed.partial);
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.url, "https://example.com/x?a=1");
        assert_eq!(parsed.protocol.to_string(), "HTTP/1.1");
        assert_eq!(parsed.status().to_string(), "200 OK");
        assert_eq!(parsed.content_length, ContentLength::Exact(15));
        assert_eq!(parsed.pid, 4242);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let trace = sample();
        let bytes = trace.as_bytes();
        assert_eq!(
            HttpTrace::parse(&bytes[..100]),
            Err(ProtocolError::Length {
                expected: 504,
                actual: 100
            })
        );
        let mut long = bytes.to_vec();
        long.push(0);
        assert!(matches!(
            HttpTrace::parse(&long),
            Err(ProtocolError::Length { actual: 505, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_offsets() {
        let mut trace = sample();
        trace.head.method_end = 10;
        trace.head.url_end = 5;
        assert!(matches!(
            HttpTrace::parse(trace.as_bytes()),
            Err(ProtocolError::Offsets { .. })
        ));

        let mut trace = sample();
        trace.head.url_end = 489;
        assert!(matches!(
            HttpTrace::parse(trace.as_bytes()),
            Err(ProtocolError::Offsets { .. })
        ));

        // Full buffer is fine
        trace.head.url_end = 488;
        assert!(HttpTrace::parse(trace.as_bytes()).is_ok());
    }

    #[test]
    fn test_partial_record_with_no_text() {
        let mut trace = HttpTrace::new_zeroed();
        trace.head.partial = 1;
        trace.head.status_code = 502;
        trace.head.content_length = encode_content_length(-1);
        let parsed = trace.decode().unwrap();
        assert!(parsed.partial);
        assert!(parsed.method.is_empty());
        assert!(parsed.url.is_empty());
        assert_eq!(parsed.status().to_string(), "502 Bad Gateway");
        assert_eq!(parsed.content_length.to_string(), "<unk>");
    }

    #[test]
    fn test_content_length_display() {
        assert_eq!(ContentLength::from(15u32).to_string(), "15");
        assert_eq!(ContentLength::from(u32::MAX).to_string(), "<unk>");
        assert_eq!(
            ContentLength::from(u32::MAX - 1).to_string(),
            "4294967294+"
        );
    }

    #[test]
    fn test_unknown_status_shows_bare_code() {
        assert_eq!(Status(299).to_string(), "299");
    }

    #[test]
    fn test_http_version_from_packed() {
        assert_eq!(
            HttpVersion::from_packed(0x20),
            HttpVersion { major: 2, minor: 0 }
        );
    }

    #[test]
    fn test_json_serialization() {
        let parsed = sample().decode().unwrap();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["protocol"], "HTTP/1.1");
        assert_eq!(json["content_length"], 15);
        assert_eq!(json["url"], "https://example.com/x?a=1");
        assert_eq!(json["partial"], false);

        let unknown = serde_json::to_value(ContentLength::Unknown).unwrap();
        assert!(unknown.is_null());
        let overflow = serde_json::to_value(ContentLength::Overflow).unwrap();
        assert_eq!(overflow, "4294967294+");
    }

    #[test]
    fn test_lossy_text_decoding() {
        let mut trace = sample();
        trace.buf[3] = 0xff;
        let parsed = trace.decode().unwrap();
        assert!(parsed.url.starts_with('\u{fffd}'));
    }
}
