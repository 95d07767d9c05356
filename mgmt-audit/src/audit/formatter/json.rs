//! JSON record formatter
//!
//! Serializes a record as one JSON object, optionally preceded by a
//! human-readable date and separator. Escaping replaces control characters
//! with `#` plus their three-digit octal code (`\n` becomes `#012`) so that
//! line-oriented transports can still find message boundaries. With escaping
//! on, `#` itself is written as `#043` so that escaped output decodes
//! unambiguously.

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::{Deserialize, Serialize};

use super::AuditFormatter;
use crate::audit::record::AuditRecord;
use crate::error::{Error, Result};

/// JSON formatter options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFormatterOptions {
    /// Single-line output instead of pretty-printed
    pub compact: bool,
    /// Prefix each record with a formatted date
    pub include_date: bool,
    /// strftime pattern for the date prefix
    pub date_format: String,
    /// Text between the date prefix and the JSON object
    pub date_separator: String,
    /// Escape embedded newlines as `#012`
    pub escape_new_line: bool,
    /// Escape every ASCII control character as `#` + octal code
    pub escape_control_characters: bool,
}

impl Default for JsonFormatterOptions {
    fn default() -> Self {
        Self {
            compact: false,
            include_date: true,
            date_format: default_date_format(),
            date_separator: default_date_separator(),
            escape_new_line: false,
            escape_control_characters: false,
        }
    }
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_date_separator() -> String {
    " - ".to_string()
}

impl JsonFormatterOptions {
    /// Reject date patterns chrono cannot render, and date prefixes that
    /// would be mistaken for the start of the JSON object
    pub fn validate(&self) -> Result<()> {
        if self.date_format.contains('{') || self.date_separator.contains('{') {
            return Err(Error::ValidationError(
                "date-format and date-separator must not contain '{'".into(),
            ));
        }
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(Error::ValidationError(format!(
                "invalid date-format '{}'",
                self.date_format
            )));
        }
        Ok(())
    }
}

/// Built-in JSON formatter
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    options: JsonFormatterOptions,
}

impl JsonFormatter {
    /// Create a formatter, validating the date pattern
    pub fn new(options: JsonFormatterOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Current options
    pub fn options(&self) -> &JsonFormatterOptions {
        &self.options
    }
}

impl AuditFormatter for JsonFormatter {
    fn format(&self, record: &AuditRecord) -> Result<String> {
        let json = if self.options.compact {
            serde_json::to_string(record)?
        } else {
            serde_json::to_string_pretty(record)?
        };

        let body = if self.options.escape_control_characters {
            escape(&json, |c| c == '#' || c.is_ascii_control())
        } else if self.options.escape_new_line {
            escape(&json, |c| c == '#' || c == '\n')
        } else {
            json
        };

        if !self.options.include_date {
            return Ok(body);
        }

        let date = record
            .timestamp
            .with_timezone(&Local)
            .format(&self.options.date_format);
        Ok(format!("{}{}{}", date, self.options.date_separator, body))
    }
}

fn escape(input: &str, should_escape: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if should_escape(c) {
            out.push_str(&format!("#{:03o}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse the `#` + octal escaping applied by the formatter
///
/// Only sequences that encode an ASCII control character or `#` itself are
/// decoded; any other `#` is left untouched.
pub fn unescape_control_characters(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('#') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos + 1..];
        let decoded = candidate
            .get(..3)
            .filter(|digits| digits.bytes().all(|b| (b'0'..=b'7').contains(&b)))
            .and_then(|digits| u32::from_str_radix(digits, 8).ok())
            .and_then(char::from_u32)
            .filter(|c| *c == '#' || c.is_ascii_control());
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &candidate[3..];
            }
            None => {
                out.push('#');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Drop everything before the JSON object (the optional date prefix)
pub fn strip_date_prefix(formatted: &str) -> &str {
    match formatted.find('{') {
        Some(pos) => &formatted[pos..],
        None => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> AuditRecord {
        AuditRecord::core(
            vec![
                json!({"operation": "add", "address": [{"json-formatter": "f"}], "note": "line1\nline2\ttab"}),
                json!({"operation": "write-attribute", "name": "enabled", "value": false}),
                json!({"operation": "write-attribute", "name": "tag", "value": "tag#012x #011 #043 #"}),
            ],
            false,
            true,
        )
        .with_version("1.0.0")
    }

    fn all_options() -> Vec<JsonFormatterOptions> {
        let mut all = Vec::new();
        for compact in [false, true] {
            for include_date in [false, true] {
                for (escape_new_line, escape_control_characters) in
                    [(false, false), (true, false), (false, true)]
                {
                    all.push(JsonFormatterOptions {
                        compact,
                        include_date,
                        date_format: "%Y/%m/%d %H-%M-%S".to_string(),
                        date_separator: " xxx ".to_string(),
                        escape_new_line,
                        escape_control_characters,
                    });
                }
            }
        }
        all
    }

    #[test]
    fn test_every_configuration_parses_back() {
        let record = record();
        for options in all_options() {
            let formatted = JsonFormatter::new(options.clone())
                .unwrap()
                .format(&record)
                .unwrap();
            let stripped = strip_date_prefix(&formatted);
            let json = if options.escape_new_line || options.escape_control_characters {
                unescape_control_characters(stripped)
            } else {
                stripped.to_string()
            };
            let parsed: AuditRecord = serde_json::from_str(&json)
                .unwrap_or_else(|e| panic!("{:?} produced unparseable output: {}", options, e));
            assert_eq!(parsed, record, "options: {:?}", options);
        }
    }

    #[test]
    fn test_default_layout_has_date_prefix_and_newlines() {
        let formatted = JsonFormatter::new(JsonFormatterOptions::default())
            .unwrap()
            .format(&record())
            .unwrap();

        let (date, rest) = formatted.split_once(" - ").unwrap();
        // yyyy-mm-dd hh:mm:ss
        assert_eq!(date.len(), 19);
        assert_eq!(&date[4..5], "-");
        assert!(rest.starts_with('{'));
        assert!(rest.contains('\n'));
    }

    #[test]
    fn test_compact_is_single_line() {
        let options = JsonFormatterOptions {
            compact: true,
            date_format: "%Y/%m/%d %H-%M-%S".into(),
            date_separator: " xxx ".into(),
            ..Default::default()
        };
        let formatted = JsonFormatter::new(options).unwrap().format(&record()).unwrap();
        assert!(!formatted.contains('\n'));
        assert!(formatted.contains(" xxx {"));
    }

    #[test]
    fn test_escaped_newlines_use_octal_token() {
        let options = JsonFormatterOptions {
            include_date: false,
            escape_new_line: true,
            ..Default::default()
        };
        let formatted = JsonFormatter::new(options).unwrap().format(&record()).unwrap();
        assert!(formatted.starts_with('{'));
        assert!(!formatted.contains('\n'));
        assert!(formatted.contains("#012"));
    }

    #[test]
    fn test_compact_escaped_has_nothing_to_escape() {
        let options = JsonFormatterOptions {
            compact: true,
            include_date: false,
            escape_new_line: true,
            ..Default::default()
        };
        let formatted = JsonFormatter::new(options).unwrap().format(&record()).unwrap();
        // Newlines inside strings are already \n escapes in JSON
        assert!(!formatted.contains("#012"));
    }

    #[test]
    fn test_invalid_date_format_rejected() {
        let options = JsonFormatterOptions {
            date_format: "%Y %!".into(),
            ..Default::default()
        };
        assert!(matches!(
            JsonFormatter::new(options),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_literal_escape_tokens_survive() {
        let options = JsonFormatterOptions {
            include_date: false,
            escape_new_line: true,
            ..Default::default()
        };
        let formatted = JsonFormatter::new(options).unwrap().format(&record()).unwrap();
        assert!(formatted.contains("tag#043012x"));

        let parsed: AuditRecord =
            serde_json::from_str(&unescape_control_characters(&formatted)).unwrap();
        assert_eq!(parsed.operations()[2]["value"], "tag#012x #011 #043 #");
    }

    #[test]
    fn test_brace_in_date_prefix_rejected() {
        let options = JsonFormatterOptions {
            date_separator: " { ".into(),
            ..Default::default()
        };
        assert!(matches!(
            JsonFormatter::new(options),
            Err(Error::ValidationError(_))
        ));

        let options = JsonFormatterOptions {
            date_format: "{%Y}".into(),
            ..Default::default()
        };
        assert!(JsonFormatter::new(options).is_err());
    }

    #[test]
    fn test_unescape_leaves_plain_hashes() {
        assert_eq!(unescape_control_characters("a#012b"), "a\nb");
        assert_eq!(unescape_control_characters("#011"), "\t");
        assert_eq!(unescape_control_characters("#abc #1"), "#abc #1");
        // 0o101 is 'A', not a control character
        assert_eq!(unescape_control_characters("#101"), "#101");
        assert_eq!(unescape_control_characters("#043012"), "#012");
    }
}
