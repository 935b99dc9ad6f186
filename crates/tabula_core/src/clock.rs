use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{TabulaError, TabulaResult};

/// Microseconds since the Unix epoch, UTC.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(pub i64);

static LAST_TIMESTAMP: Lazy<Mutex<i64>> = Lazy::new(|| Mutex::new(0));

impl Timestamp {
    /// Strictly increasing within the process, so creation order is never a tie.
    pub fn now() -> Self {
        let physical = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64;
        let mut guard = LAST_TIMESTAMP
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = if physical > *guard {
            physical
        } else {
            *guard + 1
        };
        *guard = next;
        Timestamp(next)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn from_micros(value: i64) -> Self {
        Timestamp(value)
    }

    pub fn to_rfc3339(self) -> String {
        format_timestamp(self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        parse_timestamp(&value)
            .map(Timestamp)
            .map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

/// Parses `YYYY-MM-DD` (or an RFC 3339 timestamp, keeping its UTC date) to midnight UTC.
pub fn parse_date(value: &str) -> TabulaResult<i64> {
    let value = value.trim();
    let format = format_description!("[year]-[month]-[day]");
    let date = match Date::parse(value, &format) {
        Ok(date) => date,
        Err(_) => OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TabulaError::validation(format!("invalid date '{value}': {err}")))?
            .to_offset(UtcOffset::UTC)
            .date(),
    };
    Ok(to_micros(date.midnight().assume_utc()))
}

/// Parses an RFC 3339 timestamp; a bare date is taken as midnight UTC.
pub fn parse_timestamp(value: &str) -> TabulaResult<i64> {
    let value = value.trim();
    match OffsetDateTime::parse(value, &Rfc3339) {
        Ok(parsed) => Ok(to_micros(parsed)),
        Err(err) => {
            let format = format_description!("[year]-[month]-[day]");
            Date::parse(value, &format)
                .map(|date| to_micros(date.midnight().assume_utc()))
                .map_err(|_| TabulaError::validation(format!("invalid timestamp '{value}': {err}")))
        }
    }
}

pub fn format_date(micros: i64) -> TabulaResult<String> {
    let format = format_description!("[year]-[month]-[day]");
    from_micros(micros)?
        .date()
        .format(&format)
        .map_err(|err| TabulaError::storage(format!("format date: {err}")))
}

pub fn format_timestamp(micros: i64) -> TabulaResult<String> {
    from_micros(micros)?
        .format(&Rfc3339)
        .map_err(|err| TabulaError::storage(format!("format timestamp: {err}")))
}

fn to_micros(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000) as i64
}

fn from_micros(micros: i64) -> TabulaResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|err| TabulaError::storage(format!("timestamp out of range: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_strictly_monotonic() {
        let first = Timestamp::now();
        let second = Timestamp::now();
        assert!(second > first);
    }

    #[test]
    fn dates_roundtrip_through_midnight_utc() {
        let micros = parse_date("2024-02-29").expect("date");
        assert_eq!(micros % 86_400_000_000, 0);
        assert_eq!(format_date(micros).expect("format"), "2024-02-29");
        let from_timestamp = parse_date("2024-02-29T23:30:00-02:00").expect("date");
        assert_eq!(format_date(from_timestamp).expect("format"), "2024-03-01");
    }

    #[test]
    fn timestamps_normalize_to_utc() {
        let micros = parse_timestamp("2024-03-01T12:00:00+02:00").expect("timestamp");
        assert_eq!(
            format_timestamp(micros).expect("format"),
            "2024-03-01T10:00:00Z"
        );
        assert!(parse_timestamp("yesterday").is_err());
    }
}
