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

//! Scalar conversion rules shared by the JSON and Arrow decoders.
//!
//! Text forms (JSON rowsets and leaves of structured JSON payloads):
//!
//! | Type | Accepted text |
//! |------|---------------|
//! | FIXED | decimal literal, optional exponent |
//! | REAL | float literal, `inf`, `-inf`, `NaN` |
//! | BOOLEAN | `1`, `0`, `true`, `false` |
//! | DATE | days since epoch, or `YYYY-MM-DD` |
//! | TIME | `seconds.fraction`, or `HH:MM:SS[.f]` |
//! | TIMESTAMP_NTZ / LTZ | `seconds.fraction`, or `YYYY-MM-DD[ T]HH:MM:SS[.f]` |
//! | TIMESTAMP_TZ | `seconds.fraction offset` (offset = minutes + 1440), or ISO with `±HH:MM` |
//! | BINARY | hex |
//!
//! FIXED values always go through the unscaled integer first so both wire
//! formats land on the same [`Value`]: scale 0 within `i64` is `Int`;
//! anything else is `Float` unless higher precision is on, in which case it
//! is `BigInt` or `Decimal`.

use crate::decode::datetime::OutputFormats;
use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::schema::{ColumnType, TypeKind};
use crate::value::Value;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_bigint::BigInt;
use std::sync::Arc;

const NANOS_PER_SEC: i64 = 1_000_000_000;
/// TIMESTAMP_TZ offsets are encoded as minutes east of UTC plus this bias.
pub(crate) const TZ_OFFSET_BIAS_MINUTES: i64 = 1440;

/// Options threaded through every leaf decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decode FIXED values exactly (`BigInt` / `Decimal`) instead of as `f64`.
    pub higher_precision: bool,
    /// Session output formats for formatted temporal text.
    pub formats: Arc<OutputFormats>,
}

impl DecodeOptions {
    fn pattern(&self, kind: TypeKind) -> Option<&str> {
        self.formats.pattern(kind)
    }
}

fn decode_error(kind: TypeKind, text: &str) -> crate::error::Error {
    SnowflakeErrorHelper::decode().message(format!("cannot decode '{}' as {}", text, kind))
}

/// Decode the textual form of a scalar column.
pub fn decode_text(column_type: &ColumnType, text: &str, options: &DecodeOptions) -> Result<Value> {
    let kind = column_type.kind;
    match kind {
        TypeKind::Fixed => {
            let unscaled = parse_fixed(text, column_type.scale)?;
            Ok(fixed_value(unscaled, column_type.scale, options))
        }
        TypeKind::Real => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| decode_error(kind, text)),
        TypeKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(decode_error(kind, text)),
        },
        TypeKind::Date => parse_date(text, options.pattern(kind)).map(Value::Date),
        TypeKind::Time => parse_time(text, options.pattern(kind)).map(Value::Time),
        TypeKind::TimestampNtz => parse_ntz(text, options.pattern(kind)).map(Value::TimestampNtz),
        TypeKind::TimestampLtz => parse_ltz(text, options.pattern(kind)).map(Value::TimestampLtz),
        TypeKind::TimestampTz => parse_tz(text, options.pattern(kind)).map(Value::TimestampTz),
        TypeKind::Binary => hex::decode(text.trim())
            .map(Value::Binary)
            .map_err(|_| decode_error(kind, text)),
        TypeKind::Text | TypeKind::Variant | TypeKind::Object | TypeKind::Array | TypeKind::Map => {
            Ok(Value::Text(text.to_string()))
        }
    }
}

/// Map an unscaled FIXED integer to its value.
pub(crate) fn fixed_value(unscaled: BigInt, scale: u32, options: &DecodeOptions) -> Value {
    if scale == 0 {
        if let Ok(v) = i64::try_from(&unscaled) {
            return Value::Int(v);
        }
        if options.higher_precision {
            return Value::BigInt(unscaled);
        }
    } else if options.higher_precision {
        return Value::Decimal { unscaled, scale };
    }

    // Lossy path: go through the canonical decimal text so both formats round identically.
    let text = format_decimal(&unscaled, scale);
    Value::Float(text.parse::<f64>().unwrap_or(f64::NAN))
}

/// Render `unscaled * 10^-scale` with exactly `scale` fraction digits.
pub fn format_decimal(unscaled: &BigInt, scale: u32) -> String {
    let digits = unscaled.magnitude().to_string();
    let negative = unscaled.sign() == num_bigint::Sign::Minus;
    let scale = scale as usize;

    let mut out = String::with_capacity(digits.len() + scale + 2);
    if negative {
        out.push('-');
    }
    if scale == 0 {
        out.push_str(&digits);
        return out;
    }
    if digits.len() <= scale {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take(scale - digits.len()));
        out.push_str(&digits);
    } else {
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Parse a decimal literal into its unscaled integer at `scale`.
///
/// Fails when the literal carries non-zero digits beyond `scale`.
pub(crate) fn parse_fixed(text: &str, scale: u32) -> Result<BigInt> {
    let err = || decode_error(TypeKind::Fixed, text);
    let trimmed = text.trim();
    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => {
            let exp: i64 = body[pos + 1..].parse().map_err(|_| err())?;
            (&body[..pos], exp)
        }
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(err());
    }
    if !int_part
        .bytes()
        .chain(frac_part.bytes())
        .all(|b| b.is_ascii_digit())
    {
        return Err(err());
    }

    let mut digits = format!("{}{}", int_part, frac_part);
    // Number of digits after the decimal point once the exponent is applied.
    let frac_len = i64::try_from(frac_part.len())
        .ok()
        .and_then(|len| len.checked_sub(exponent))
        .ok_or_else(err)?;
    let scale = i64::from(scale);
    if frac_len <= scale {
        let pad = scale
            .checked_sub(frac_len)
            .and_then(|pad| usize::try_from(pad).ok())
            .ok_or_else(err)?;
        if pad > 4096 {
            return Err(err());
        }
        digits.extend(std::iter::repeat('0').take(pad));
    } else {
        let excess = frac_len
            .checked_sub(scale)
            .and_then(|excess| usize::try_from(excess).ok())
            .ok_or_else(err)?;
        if excess > digits.len() {
            if digits.bytes().any(|b| b != b'0') {
                return Err(err());
            }
            digits = "0".to_string();
        } else {
            let (kept, dropped) = digits.split_at(digits.len() - excess);
            if dropped.bytes().any(|b| b != b'0') {
                return Err(err());
            }
            digits = if kept.is_empty() { "0".to_string() } else { kept.to_string() };
        }
    }

    let magnitude = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(err)?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// True for `[-]digits[.digits]`, the epoch encodings of temporal types.
fn is_epoch_form(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// Parse `[-]seconds[.fraction]` into whole seconds and non-negative nanos.
pub(crate) fn parse_epoch(text: &str) -> Option<(i64, u32)> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let secs: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    if frac_part.len() > 9 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos: i64 = if frac_part.is_empty() {
        0
    } else {
        format!("{:0<9}", frac_part).parse().ok()?
    };

    if !negative {
        return Some((secs, nanos as u32));
    }
    if nanos == 0 {
        Some((-secs, 0))
    } else {
        Some((-secs - 1, (NANOS_PER_SEC - nanos) as u32))
    }
}

/// Split a value scaled by `10^scale` into seconds and nanos.
pub(crate) fn split_scaled(value: i64, scale: u32) -> Result<(i64, u32)> {
    if scale > 9 {
        return Err(SnowflakeErrorHelper::decode()
            .message(format!("unsupported fractional scale {}", scale)));
    }
    let divisor = 10i64.pow(scale);
    let secs = value.div_euclid(divisor);
    let frac = value.rem_euclid(divisor);
    Ok((secs, (frac * 10i64.pow(9 - scale)) as u32))
}

pub(crate) fn date_from_days(days: i64) -> Result<NaiveDate> {
    days.checked_mul(86_400)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.date_naive())
        .ok_or_else(|| {
            SnowflakeErrorHelper::decode().message(format!("date out of range: {} days", days))
        })
}

pub(crate) fn time_from_parts(secs: i64, nanos: u32) -> Result<NaiveTime> {
    u32::try_from(secs)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos))
        .ok_or_else(|| {
            SnowflakeErrorHelper::decode().message(format!("time out of range: {}s", secs))
        })
}

pub(crate) fn instant_from_parts(secs: i64, nanos: u32) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        SnowflakeErrorHelper::decode().message(format!("timestamp out of range: {}s", secs))
    })
}

pub(crate) fn offset_from_encoded(encoded: i64) -> Result<FixedOffset> {
    encoded
        .checked_sub(TZ_OFFSET_BIAS_MINUTES)
        .and_then(|minutes| minutes.checked_mul(60))
        .and_then(|secs| i32::try_from(secs).ok())
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            SnowflakeErrorHelper::decode().message(format!("invalid timezone offset {}", encoded))
        })
}

pub(crate) fn tz_from_parts(secs: i64, nanos: u32, encoded_offset: i64) -> Result<DateTime<FixedOffset>> {
    let offset = offset_from_encoded(encoded_offset)?;
    Ok(instant_from_parts(secs, nanos)?.with_timezone(&offset))
}

fn parse_date(text: &str, pattern: Option<&str>) -> Result<NaiveDate> {
    let t = text.trim();
    if is_epoch_form(t) && !t.contains('.') {
        let days: i64 = t.parse().map_err(|_| decode_error(TypeKind::Date, text))?;
        return date_from_days(days);
    }
    pattern
        .and_then(|p| NaiveDate::parse_from_str(t, p).ok())
        .or_else(|| NaiveDate::parse_from_str(t, "%Y-%m-%d").ok())
        .ok_or_else(|| decode_error(TypeKind::Date, text))
}

fn parse_time(text: &str, pattern: Option<&str>) -> Result<NaiveTime> {
    let t = text.trim();
    if is_epoch_form(t) {
        let (secs, nanos) = parse_epoch(t).ok_or_else(|| decode_error(TypeKind::Time, text))?;
        return time_from_parts(secs, nanos);
    }
    pattern
        .and_then(|p| NaiveTime::parse_from_str(t, p).ok())
        .or_else(|| NaiveTime::parse_from_str(t, "%H:%M:%S%.f").ok())
        .ok_or_else(|| decode_error(TypeKind::Time, text))
}

fn parse_naive(t: &str, pattern: Option<&str>) -> Option<NaiveDateTime> {
    pattern
        .into_iter()
        .chain(["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"])
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
}

fn parse_ntz(text: &str, pattern: Option<&str>) -> Result<NaiveDateTime> {
    let t = text.trim();
    if is_epoch_form(t) {
        let (secs, nanos) =
            parse_epoch(t).ok_or_else(|| decode_error(TypeKind::TimestampNtz, text))?;
        return Ok(instant_from_parts(secs, nanos)?.naive_utc());
    }
    parse_naive(t, pattern).ok_or_else(|| decode_error(TypeKind::TimestampNtz, text))
}

fn parse_ltz(text: &str, pattern: Option<&str>) -> Result<DateTime<Utc>> {
    let t = text.trim();
    if is_epoch_form(t) {
        let (secs, nanos) =
            parse_epoch(t).ok_or_else(|| decode_error(TypeKind::TimestampLtz, text))?;
        return instant_from_parts(secs, nanos);
    }
    // An explicit offset wins; wall-clock text is taken as UTC.
    pattern
        .and_then(|p| DateTime::parse_from_str(t, p).ok())
        .or_else(|| parse_iso_tz(t))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_naive(t, pattern).map(|naive| naive.and_utc()))
        .ok_or_else(|| decode_error(TypeKind::TimestampLtz, text))
}

fn parse_tz(text: &str, pattern: Option<&str>) -> Result<DateTime<FixedOffset>> {
    let t = text.trim();
    if let Some((epoch, offset)) = t.split_once(' ') {
        if is_epoch_form(epoch) && offset.bytes().all(|b| b.is_ascii_digit()) {
            let (secs, nanos) =
                parse_epoch(epoch).ok_or_else(|| decode_error(TypeKind::TimestampTz, text))?;
            let encoded: i64 = offset
                .parse()
                .map_err(|_| decode_error(TypeKind::TimestampTz, text))?;
            return tz_from_parts(secs, nanos, encoded);
        }
    }
    pattern
        .and_then(|p| DateTime::parse_from_str(t, p).ok())
        .or_else(|| parse_iso_tz(t))
        .ok_or_else(|| decode_error(TypeKind::TimestampTz, text))
}

fn parse_iso_tz(text: &str) -> Option<DateTime<FixedOffset>> {
    [
        "%Y-%m-%d %H:%M:%S%.f %:z",
        "%Y-%m-%d %H:%M:%S%.f %z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ]
    .iter()
    .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
    .or_else(|| DateTime::parse_from_rfc3339(text).ok())
}
