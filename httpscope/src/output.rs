//! One line per trace, as text or JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use httpscope_protocol::ParsedTrace;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `<app> -[<METHOD> HTTP/x.y]-> <url> [<status>, <length> bytes]`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    time: String,
    app: &'a str,
    #[serde(flatten)]
    trace: &'a ParsedTrace,
}

/// Human readable trace line. Partial records are marked since their method
/// or URL may be missing.
pub fn format_text(app: &str, trace: &ParsedTrace) -> String {
    let mut line = format!(
        "{} -[{} {}]-> {} [{}, {} bytes]",
        app,
        trace.method,
        trace.protocol,
        trace.url,
        trace.status(),
        trace.content_length
    );
    if trace.partial {
        line.push_str(" (partial)");
    }
    line
}

pub fn format_json(app: &str, trace: &ParsedTrace, time: DateTime<Utc>) -> serde_json::Result<String> {
    serde_json::to_string(&JsonLine {
        time: time.to_rfc3339_opts(SecondsFormat::Millis, true),
        app,
        trace,
    })
}

/// Render `trace` in `format`, stamped with the current time for JSON.
pub fn format_line(format: OutputFormat, app: &str, trace: &ParsedTrace) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(format_text(app, trace)),
        OutputFormat::Json => format_json(app, trace, Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpscope_protocol::{ContentLength, HttpVersion};

    fn trace() -> ParsedTrace {
        ParsedTrace {
            partial: false,
            protocol: HttpVersion { major: 1, minor: 1 },
            method: "GET".into(),
            url: "https://example.com/x?a=1".into(),
            status_code: 200,
            content_length: ContentLength::Exact(15),
            pid: 4242,
        }
    }

    #[test]
    fn test_text_line() {
        assert_eq!(
            format_text("api@prod", &trace()),
            "api@prod -[GET HTTP/1.1]-> https://example.com/x?a=1 [200 OK, 15 bytes]"
        );
    }

    #[test]
    fn test_text_line_sentinels_and_partial() {
        let t = ParsedTrace {
            partial: true,
            method: String::new(),
            url: String::new(),
            status_code: 599,
            content_length: ContentLength::Unknown,
            protocol: HttpVersion { major: 2, minor: 0 },
            ..trace()
        };
        assert_eq!(
            format_text("P-77", &t),
            "P-77 -[ HTTP/2.0]->  [599, <unk> bytes] (partial)"
        );

        let big = ParsedTrace {
            content_length: ContentLength::Overflow,
            status_code: 404,
            ..trace()
        };
        assert!(format_text("a", &big).ends_with("[404 Not Found, 4294967294+ bytes]"));
    }

    #[test]
    fn test_json_line() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let line = format_json("api", &trace(), time).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["time"], "2024-05-01T12:30:00.000Z");
        assert_eq!(value["app"], "api");
        assert_eq!(value["method"], "GET");
        assert_eq!(value["url"], "https://example.com/x?a=1");
        assert_eq!(value["protocol"], "HTTP/1.1");
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["content_length"], 15);
        assert_eq!(value["pid"], 4242);
        assert_eq!(value["partial"], false);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_json_unknown_length_is_null() {
        let t = ParsedTrace {
            content_length: ContentLength::Unknown,
            ..trace()
        };
        let line = format_line(OutputFormat::Json, "api", &t).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(value["content_length"].is_null());
    }
}
