//! Timestamp column parsing

use crate::error::{CrashRiskError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Layouts carrying a UTC offset, besides RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a timestamp string in one of the common crash export layouts.
///
/// Offset-aware values (RFC 3339, `Z` or `+hh:mm` suffixes) are converted
/// to UTC; naive values are taken as they are.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|t| t.naive_utc()))
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
                .map(|t| t.naive_utc())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Epoch milliseconds for every row of a timestamp column.
///
/// String columns are parsed, temporal columns converted, numeric columns
/// read as epoch seconds. Nulls stay `None`; unparseable strings are an error.
pub fn column_timestamps(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df
        .column(name)
        .map_err(|_| CrashRiskError::FeatureNotFound(name.to_string()))?;

    match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| match v {
                None => Ok(None),
                Some(s) if s.trim().is_empty() => Ok(None),
                Some(s) => parse_timestamp(s)
                    .map(|t| Some(t.and_utc().timestamp_millis()))
                    .ok_or_else(|| {
                        CrashRiskError::ValidationError(format!(
                            "column '{}': cannot parse '{}' as a timestamp",
                            name, s
                        ))
                    }),
            })
            .collect(),
        DataType::Date | DataType::Datetime(_, _) => Ok(column
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .collect()),
        dt if dt.is_integer() || dt.is_float() => Ok(column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(|secs| (secs * 1000.0) as i64))
            .collect()),
        other => Err(CrashRiskError::ValidationError(format!(
            "column '{}' has type {} and cannot be read as timestamps",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_layouts() {
        assert!(parse_timestamp("2016-01-05 10:30:00").is_some());
        assert!(parse_timestamp("2016-01-05T10:30:00").is_some());
        assert!(parse_timestamp("01/05/2016 10:30").is_some());
        assert!(parse_timestamp("2016-01-05").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_offset_timestamps_convert_to_utc() {
        let expected = NaiveDate::from_ymd_opt(2017, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2017-01-01T08:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2017-01-01T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2017-01-01 03:00:00-0500"), Some(expected));

        let millis = parse_timestamp("2017-01-01T08:00:00.250Z").map(|t| t.and_utc().timestamp_millis());
        assert_eq!(millis, Some(expected.and_utc().timestamp_millis() + 250));
    }

    #[test]
    fn test_string_column_ordering() {
        let df = df!(
            "DATE_TIME" => &[Some("2016-03-01 00:00:00"), None, Some("2015-12-31 23:59:59")]
        )
        .unwrap();
        let ts = column_timestamps(&df, "DATE_TIME").unwrap();
        assert!(ts[0].unwrap() > ts[2].unwrap());
        assert!(ts[1].is_none());
    }

    #[test]
    fn test_bad_timestamp_is_error() {
        let df = df!("DATE_TIME" => &["2016-03-01", "soon"]).unwrap();
        assert!(column_timestamps(&df, "DATE_TIME").is_err());
    }
}
