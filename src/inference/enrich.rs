//! Predict-time preparation of a road-segment table
//!
//! Sparse columns are dropped and remaining nulls filled, the scoring time
//! is stamped onto every row, and recent crash counts per segment are joined
//! from a crash history table.

use crate::error::{CrashRiskError, Result};
use crate::utils::datetime::column_timestamps;
use chrono::{Datelike, NaiveDateTime, Timelike};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

/// Null fraction at or above which a column is dropped
pub const DEFAULT_NULL_THRESHOLD: f64 = 0.95;

/// Trailing windows, in days, for the recent crash count columns
pub const CRASH_WINDOWS: [i64; 5] = [7, 30, 365, 1825, 3650];

const MS_PER_DAY: i64 = 86_400_000;

pub fn crash_window_column(days: i64) -> String {
    format!("LAST_{}_DAYS", days)
}

/// Drop every column whose null fraction is at least `threshold`
pub fn drop_sparse_columns(df: DataFrame, threshold: f64) -> Result<DataFrame> {
    let height = df.height();
    if height == 0 {
        return Ok(df);
    }

    let sparse: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| c.null_count() as f64 / height as f64 >= threshold)
        .map(|c| c.name().to_string())
        .collect();

    if sparse.is_empty() {
        return Ok(df);
    }
    info!(columns = ?sparse, "Dropping mostly-null columns");
    Ok(df.drop_many(sparse))
}

/// Fill string nulls with `""` and numeric nulls with zero
pub fn fill_nulls(df: DataFrame) -> Result<DataFrame> {
    let columns = df
        .get_columns()
        .iter()
        .map(|c| {
            if c.null_count() == 0 {
                return Ok(c.clone());
            }
            let dtype = c.dtype().clone();
            let filled = if dtype == DataType::String {
                let values: Vec<&str> = c.str()?.into_iter().map(|v| v.unwrap_or("")).collect();
                Series::new(c.name().clone(), values)
            } else if dtype.is_integer() || dtype.is_float() {
                c.as_materialized_series().fill_null(FillNullStrategy::Zero)?
            } else {
                c.as_materialized_series().clone()
            };
            Ok(filled.into_column())
        })
        .collect::<Result<Vec<Column>>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Set `MONTH` (1-12), `DAY_OF_WEEK` (0 = Monday) and `HOUR` from `now`
pub fn stamp_clock(mut df: DataFrame, now: NaiveDateTime) -> Result<DataFrame> {
    let height = df.height();
    let fields = [
        ("MONTH", now.month() as i32),
        ("DAY_OF_WEEK", now.weekday().num_days_from_monday() as i32),
        ("HOUR", now.hour() as i32),
    ];
    for (name, value) in fields {
        df.with_column(Series::new(name.into(), vec![value; height]))?;
    }
    Ok(df)
}

/// Attach `LAST_<n>_DAYS` crash counts per `segment_column`.
///
/// A crash counts toward a window when its timestamp is strictly after
/// `now - window`. Segments without crashes get zero.
pub fn attach_recent_crash_counts(
    mut segments: DataFrame,
    crashes: &DataFrame,
    segment_column: &str,
    date_column: &str,
    now: NaiveDateTime,
) -> Result<DataFrame> {
    let crash_segments = segment_keys(crashes, segment_column)?;
    let crash_times = column_timestamps(crashes, date_column)?;
    let now_ms = now.and_utc().timestamp_millis();

    let mut counts: HashMap<&str, [i64; CRASH_WINDOWS.len()]> = HashMap::new();
    for (segment, time) in crash_segments.iter().zip(crash_times.iter()) {
        let (Some(segment), Some(time)) = (segment.as_deref(), time) else {
            continue;
        };
        let entry = counts.entry(segment).or_insert([0; CRASH_WINDOWS.len()]);
        for (slot, days) in entry.iter_mut().zip(CRASH_WINDOWS) {
            if *time > now_ms - days * MS_PER_DAY {
                *slot += 1;
            }
        }
    }
    debug!(segments_with_crashes = counts.len(), "Counted recent crashes");

    let keys = segment_keys(&segments, segment_column)?;
    for (w, days) in CRASH_WINDOWS.iter().enumerate() {
        let values: Vec<i64> = keys
            .iter()
            .map(|k| {
                k.as_deref()
                    .and_then(|k| counts.get(k))
                    .map_or(0, |c| c[w])
            })
            .collect();
        segments.with_column(Series::new(crash_window_column(*days).as_str().into(), values))?;
    }
    Ok(segments)
}

/// Segment ids as strings so integer and string id columns join
fn segment_keys(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(column)
        .map_err(|_| CrashRiskError::FeatureNotFound(column.to_string()))?;
    let keys = if column.dtype().is_float() {
        // whole-number float ids print without a fraction
        column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(|f| f.to_string()))
            .collect()
    } else {
        column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    };
    Ok(keys)
}
