//! Literal parsing for the string-encoded well-known types:
//! `google.protobuf.Duration`, `google.protobuf.Timestamp`, and the
//! base64 payload of `bytes` fields.

use crate::Error;

/// Durations span at most ±10,000 years.
pub(crate) const DURATION_MAX_SECONDS: i64 = 315_576_000_000;

/// 0001-01-01T00:00:00Z.
pub(crate) const TIMESTAMP_MIN_SECONDS: i64 = -62_135_596_800;

/// 9999-12-31T23:59:59Z.
pub(crate) const TIMESTAMP_MAX_SECONDS: i64 = 253_402_300_799;

/// Broken-down civil time, accumulated while scanning an RFC-3339
/// timestamp and converted to POSIX seconds in UTC.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tm {
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl Tm {
    fn unix_seconds(&self, err: impl Fn() -> Error) -> Result<i64, Error> {
        let month = time::Month::try_from(self.month).map_err(|_| err())?;
        let date = time::Date::from_calendar_date(self.year, month, self.day)
            .map_err(|_| err())?;
        let time = time::Time::from_hms(self.hour, self.minute, self.second)
            .map_err(|_| err())?;

        Ok(time::PrimitiveDateTime::new(date, time)
            .assume_utc()
            .unix_timestamp())
    }
}

/// Parse `<int>[.<frac>]s` into (seconds, nanos). The fractional part
/// inherits the literal's sign.
pub(crate) fn parse_duration(text: &[u8]) -> Result<(i64, i32), Error> {
    let err = || Error::Duration(String::from_utf8_lossy(text).into_owned());

    let s = std::str::from_utf8(text).map_err(|_| err())?;
    let s = s.strip_suffix('s').ok_or_else(err)?;
    let negative = s.starts_with('-');

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };

    let seconds = int_part.parse::<i64>().map_err(|_| err())?;
    if seconds.unsigned_abs() > DURATION_MAX_SECONDS as u64 {
        return Err(err());
    }

    let nanos = match frac_part {
        None => 0,
        Some(frac) => {
            let nanos = parse_nanos(frac).ok_or_else(err)?;
            if negative {
                -nanos
            } else {
                nanos
            }
        }
    };

    Ok((seconds, nanos))
}

/// Parse an RFC-3339 timestamp,
/// `YYYY-MM-DDTHH:MM:SS[.frac](Z|±HH:MM)`, into (seconds, nanos).
/// The UTC offset is subtracted before normalizing to POSIX seconds.
pub(crate) fn parse_timestamp(text: &[u8]) -> Result<(i64, i32), Error> {
    let err = || Error::Timestamp(String::from_utf8_lossy(text).into_owned());

    let s = std::str::from_utf8(text).map_err(|_| err())?;
    let b = s.as_bytes();
    if b.len() < 20 {
        return Err(err());
    }
    if b[4] != b'-' || b[7] != b'-' || b[10] != b'T' || b[13] != b':' || b[16] != b':' {
        return Err(err());
    }

    let tm = Tm {
        year: digits(&b[0..4]).ok_or_else(err)? as i32,
        month: digits(&b[5..7]).ok_or_else(err)? as u8,
        day: digits(&b[8..10]).ok_or_else(err)? as u8,
        hour: digits(&b[11..13]).ok_or_else(err)? as u8,
        minute: digits(&b[14..16]).ok_or_else(err)? as u8,
        second: digits(&b[17..19]).ok_or_else(err)? as u8,
    };

    // Optional fraction, then a mandatory zone.
    let mut rest = &b[19..];
    let mut nanos = 0;
    if rest[0] == b'.' {
        let end = rest[1..]
            .iter()
            .position(|c| !c.is_ascii_digit())
            .ok_or_else(err)?;
        nanos = parse_nanos(&s[20..20 + end]).ok_or_else(err)?;
        rest = &rest[1 + end..];
    }

    let offset = match rest {
        [b'Z'] => 0,
        [sign @ (b'+' | b'-'), h1, h0, b':', m1, m0] => {
            let hours = digits(&[*h1, *h0]).ok_or_else(err)? as i64;
            let minutes = digits(&[*m1, *m0]).ok_or_else(err)? as i64;
            if hours > 23 || minutes > 59 {
                return Err(err());
            }
            let seconds = hours * 3600 + minutes * 60;
            if *sign == b'-' {
                -seconds
            } else {
                seconds
            }
        }
        _ => return Err(err()),
    };

    let seconds = tm.unix_seconds(err)? - offset;
    if !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds) {
        return Err(err());
    }
    Ok((seconds, nanos))
}

// At most 9 fractional digits, right-padded to nanoseconds.
fn parse_nanos(frac: &str) -> Option<i32> {
    if frac.is_empty() || frac.len() > 9 {
        return None;
    }
    let mut nanos = 0i32;
    for c in frac.bytes() {
        if !c.is_ascii_digit() {
            return None;
        }
        nanos = nanos * 10 + (c - b'0') as i32;
    }
    Some(nanos * 10i32.pow(9 - frac.len() as u32))
}

fn digits(b: &[u8]) -> Option<u32> {
    let mut v = 0u32;
    for &c in b {
        if !c.is_ascii_digit() {
            return None;
        }
        v = v * 10 + (c - b'0') as u32;
    }
    Some(v)
}

/// Strict base64: standard alphabet, padding required, length a
/// multiple of four.
pub(crate) fn decode_base64(text: &[u8], field: &str) -> Result<Vec<u8>, Error> {
    let err = |detail: String| Error::Base64 {
        field: field.to_string(),
        detail,
    };

    let s = std::str::from_utf8(text).map_err(|_| err("not valid UTF-8".to_string()))?;
    if s.len() % 4 != 0 {
        return Err(err("length is not a multiple of 4".to_string()));
    }
    base64::decode(s).map_err(|e| err(e.to_string()))
}
