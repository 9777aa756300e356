// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session date/time output formats.
//!
//! Temporal leaves inside structured JSON are rendered by the server with the
//! session's `*_OUTPUT_FORMAT` parameters rather than as epoch numbers. The
//! formats are translated once per response into chrono patterns:
//!
//! | Snowflake | chrono |
//! |-----------|--------|
//! | `YYYY` / `YY` | `%Y` / `%y` |
//! | `MM` / `MON` / `MMMM` | `%m` / `%b` / `%B` |
//! | `DD` / `DY` | `%d` / `%a` |
//! | `HH24` / `HH12` / `AM` | `%H` / `%I` / `%p` |
//! | `MI` / `SS` | `%M` / `%S` |
//! | `.FF[0-9]` | `%.f` |
//! | `TZH:TZM` / `TZHTZM` / `TZH` | `%:z` / `%z` / `%#z` |
//! | `"literal"` | literal |

use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::response::SessionParameter;
use crate::types::schema::TypeKind;
use tracing::{debug, warn};

const DATE_OUTPUT_FORMAT: &str = "DATE_OUTPUT_FORMAT";
const TIME_OUTPUT_FORMAT: &str = "TIME_OUTPUT_FORMAT";
const TIMESTAMP_OUTPUT_FORMAT: &str = "TIMESTAMP_OUTPUT_FORMAT";
const TIMESTAMP_NTZ_OUTPUT_FORMAT: &str = "TIMESTAMP_NTZ_OUTPUT_FORMAT";
const TIMESTAMP_LTZ_OUTPUT_FORMAT: &str = "TIMESTAMP_LTZ_OUTPUT_FORMAT";
const TIMESTAMP_TZ_OUTPUT_FORMAT: &str = "TIMESTAMP_TZ_OUTPUT_FORMAT";

/// Tokens in match order; longer tokens sharing a prefix come first.
const TOKENS: &[(&str, &str)] = &[
    ("TZH:TZM", "%:z"),
    ("TZHTZM", "%z"),
    ("TZH", "%#z"),
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MMMM", "%B"),
    ("MON", "%b"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("DY", "%a"),
    ("HH24", "%H"),
    ("HH12", "%I"),
    ("HH", "%H"),
    ("AM", "%p"),
    ("PM", "%p"),
    ("MI", "%M"),
    ("SS", "%S"),
];

/// chrono patterns for the temporal types, from the session parameters.
///
/// A type without a usable format keeps the built-in ISO layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFormats {
    date: Option<String>,
    time: Option<String>,
    timestamp_ntz: Option<String>,
    timestamp_ltz: Option<String>,
    timestamp_tz: Option<String>,
}

impl OutputFormats {
    /// Resolve the formats echoed in a response.
    ///
    /// `TIMESTAMP_{NTZ,LTZ,TZ}_OUTPUT_FORMAT` fall back to
    /// `TIMESTAMP_OUTPUT_FORMAT` when unset or empty. Formats that cannot be
    /// translated are logged and skipped.
    pub fn from_parameters(parameters: &[SessionParameter]) -> Self {
        let raw = |name: &str| {
            parameters
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .map(SessionParameter::value_text)
                .filter(|v| !v.trim().is_empty())
        };
        let translate = |name: &str, value: Option<String>| {
            let value = value?;
            match snowflake_to_chrono(&value) {
                Ok(pattern) => {
                    debug!("Using {}='{}' as '{}'", name, value, pattern);
                    Some(pattern)
                }
                Err(e) => {
                    warn!("Ignoring {}='{}': {}", name, value, e.message());
                    None
                }
            }
        };
        let timestamp = |name: &str| {
            let value = raw(name).or_else(|| raw(TIMESTAMP_OUTPUT_FORMAT));
            translate(name, value)
        };

        Self {
            date: translate(DATE_OUTPUT_FORMAT, raw(DATE_OUTPUT_FORMAT)),
            time: translate(TIME_OUTPUT_FORMAT, raw(TIME_OUTPUT_FORMAT)),
            timestamp_ntz: timestamp(TIMESTAMP_NTZ_OUTPUT_FORMAT),
            timestamp_ltz: timestamp(TIMESTAMP_LTZ_OUTPUT_FORMAT),
            timestamp_tz: timestamp(TIMESTAMP_TZ_OUTPUT_FORMAT),
        }
    }

    /// chrono pattern for `kind`, if the session set one.
    pub fn pattern(&self, kind: TypeKind) -> Option<&str> {
        match kind {
            TypeKind::Date => self.date.as_deref(),
            TypeKind::Time => self.time.as_deref(),
            TypeKind::TimestampNtz => self.timestamp_ntz.as_deref(),
            TypeKind::TimestampLtz => self.timestamp_ltz.as_deref(),
            TypeKind::TimestampTz => self.timestamp_tz.as_deref(),
            _ => None,
        }
    }
}

/// Translate a Snowflake date/time format into a chrono pattern.
///
/// Tokens match case-insensitively. Fractional seconds must follow a `.`.
pub fn snowflake_to_chrono(format: &str) -> Result<String> {
    let invalid = |reason: &str| {
        SnowflakeErrorHelper::invalid_argument()
            .message(format!("unsupported date/time format '{}': {}", format, reason))
    };

    let upper = format.to_ascii_uppercase();
    let mut out = String::with_capacity(format.len() * 2);
    let mut pos = 0;

    while pos < format.len() {
        let rest = &upper[pos..];

        if let Some((token, pattern)) = TOKENS.iter().find(|(token, _)| rest.starts_with(token)) {
            out.push_str(pattern);
            pos += token.len();
            continue;
        }

        if rest.starts_with("FF") {
            if !out.ends_with('.') {
                return Err(invalid("fractional seconds must follow '.'"));
            }
            out.pop();
            out.push_str("%.f");
            pos += 2;
            if upper[pos..].starts_with(|c: char| c.is_ascii_digit()) {
                pos += 1;
            }
            continue;
        }

        let Some(c) = format[pos..].chars().next() else {
            break;
        };
        match c {
            '"' => {
                let literal_start = pos + 1;
                let literal_len = format[literal_start..]
                    .find('"')
                    .ok_or_else(|| invalid("unterminated literal"))?;
                for ch in format[literal_start..literal_start + literal_len].chars() {
                    push_literal(&mut out, ch);
                }
                pos = literal_start + literal_len + 1;
            }
            _ => {
                push_literal(&mut out, c);
                pos += c.len_utf8();
            }
        }
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn param(name: &str, value: &str) -> SessionParameter {
        SessionParameter {
            name: name.to_string(),
            value: serde_json::Value::String(value.to_string()),
        }
    }

    #[test]
    fn test_default_formats_translate() {
        assert_eq!(snowflake_to_chrono("YYYY-MM-DD").unwrap(), "%Y-%m-%d");
        assert_eq!(snowflake_to_chrono("HH24:MI:SS").unwrap(), "%H:%M:%S");
        assert_eq!(
            snowflake_to_chrono("YYYY-MM-DD HH24:MI:SS.FF3 TZHTZM").unwrap(),
            "%Y-%m-%d %H:%M:%S%.f %z"
        );
    }

    #[test]
    fn test_tokens_are_case_insensitive_and_literals_kept() {
        assert_eq!(
            snowflake_to_chrono("dd/mon/yyyy hh12:mi am").unwrap(),
            "%d/%b/%Y %I:%M %p"
        );
        assert_eq!(
            snowflake_to_chrono("YYYY-MM-DD\"T\"HH24:MI:SS.FF9TZH:TZM").unwrap(),
            "%Y-%m-%dT%H:%M:%S%.f%:z"
        );
        assert_eq!(snowflake_to_chrono("DD%MM").unwrap(), "%d%%%m");
    }

    #[test]
    fn test_fraction_without_dot_is_rejected() {
        let err = snowflake_to_chrono("HH24:MI:SSFF3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(snowflake_to_chrono("YYYY\"T").is_err());
    }

    #[test]
    fn test_timestamp_formats_fall_back_to_generic() {
        let formats = OutputFormats::from_parameters(&[
            param("TIMESTAMP_OUTPUT_FORMAT", "YYYY-MM-DD HH24:MI:SS.FF3 TZHTZM"),
            param("TIMESTAMP_NTZ_OUTPUT_FORMAT", "DD.MM.YYYY HH24:MI:SS"),
            param("TIMESTAMP_LTZ_OUTPUT_FORMAT", ""),
            param("DATE_OUTPUT_FORMAT", "MM/DD/YYYY"),
        ]);
        assert_eq!(formats.pattern(TypeKind::TimestampNtz), Some("%d.%m.%Y %H:%M:%S"));
        assert_eq!(
            formats.pattern(TypeKind::TimestampLtz),
            Some("%Y-%m-%d %H:%M:%S%.f %z")
        );
        assert_eq!(
            formats.pattern(TypeKind::TimestampTz),
            Some("%Y-%m-%d %H:%M:%S%.f %z")
        );
        assert_eq!(formats.pattern(TypeKind::Date), Some("%m/%d/%Y"));
        assert_eq!(formats.pattern(TypeKind::Time), None);
        assert_eq!(formats.pattern(TypeKind::Fixed), None);
    }

    #[test]
    fn test_untranslatable_format_is_skipped() {
        let formats = OutputFormats::from_parameters(&[param("TIME_OUTPUT_FORMAT", "HH24MISSFF")]);
        assert_eq!(formats, OutputFormats::default());
    }
}
