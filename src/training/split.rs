//! Train/test partitioning of a labeled table
//!
//! Three strategies are supported: independent random assignment,
//! chronological holdout on a timestamp column, and group-aware assignment
//! where every row of a group lands on the same side. When both a group
//! column and a date column are configured the group strategy is used.

use crate::error::{CrashRiskError, Result};
use crate::utils::{column_timestamps, column_to_f64, columns_to_array2};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// A table with a binary target column holding at least two distinct values
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    frame: DataFrame,
    target: String,
}

impl LabeledDataset {
    /// Wrap `frame`, failing fast when `target` is missing or constant
    pub fn new(frame: DataFrame, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        let column = frame.column(&target).map_err(|_| {
            CrashRiskError::ConfigError(format!("target column '{}' not found", target))
        })?;

        let distinct: HashSet<u64> = column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .flatten()
            .map(f64::to_bits)
            .collect();
        if distinct.len() < 2 {
            return Err(CrashRiskError::DegenerateTarget {
                column: target,
                distinct: distinct.len(),
            });
        }

        Ok(Self { frame, target })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Target as `f64`, nulls as 0.0
    pub fn target_values(&self) -> Result<Array1<f64>> {
        column_to_f64(&self.frame, &self.target)
    }

    /// Feature matrix for the named columns, in the given order
    pub fn feature_matrix(&self, features: &[String]) -> Result<Array2<f64>> {
        columns_to_array2(&self.frame, features)
    }
}

/// How rows are assigned to the training partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Each row goes to train independently with probability `pct`
    Random,
    /// The earliest `pct` fraction of rows by timestamp goes to train
    Date { column: String },
    /// Whole groups go to train until roughly `pct` of rows are covered
    Group { column: String },
}

impl SplitStrategy {
    /// Pick the strategy for the configured columns: group, then date, then random
    pub fn from_columns(date_column: Option<&str>, group_column: Option<&str>) -> Self {
        match (group_column, date_column) {
            (Some(group), Some(date)) => {
                info!(group, date, "group and date columns both set, splitting by group");
                SplitStrategy::Group { column: group.to_string() }
            }
            (Some(group), None) => SplitStrategy::Group { column: group.to_string() },
            (None, Some(date)) => SplitStrategy::Date { column: date.to_string() },
            (None, None) => SplitStrategy::Random,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SplitStrategy::Random => "random",
            SplitStrategy::Date { .. } => "date",
            SplitStrategy::Group { .. } => "group",
        }
    }
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Random
    }
}

/// Disjoint row index sets, each ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl Split {
    fn from_mask(mask: &[bool]) -> Self {
        let (train, test): (Vec<usize>, Vec<usize>) = (0..mask.len()).partition(|&i| mask[i]);
        Self {
            train_indices: train,
            test_indices: test,
        }
    }

    pub fn n_train(&self) -> usize {
        self.train_indices.len()
    }

    pub fn n_test(&self) -> usize {
        self.test_indices.len()
    }

    /// Materialize the train and test frames
    pub fn partition(&self, df: &DataFrame) -> Result<(DataFrame, DataFrame)> {
        Ok((take_rows(df, &self.train_indices)?, take_rows(df, &self.test_indices)?))
    }
}

/// Select rows of `df` by position
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        indices.iter().map(|&i| i as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

/// Feature matrices and targets for both partitions
#[derive(Debug, Clone)]
pub struct SplitData {
    pub train_x: Array2<f64>,
    pub train_y: Array1<f64>,
    pub test_x: Array2<f64>,
    pub test_y: Array1<f64>,
    pub split: Split,
}

impl SplitData {
    /// Materialize `features` and the target on both sides of an existing split
    pub fn extract(data: &LabeledDataset, split: Split, features: &[String]) -> Result<Self> {
        let x = data.feature_matrix(features)?;
        let y = data.target_values()?;

        Ok(Self {
            train_x: x.select(ndarray::Axis(0), &split.train_indices),
            train_y: y.select(ndarray::Axis(0), &split.train_indices),
            test_x: x.select(ndarray::Axis(0), &split.test_indices),
            test_y: y.select(ndarray::Axis(0), &split.test_indices),
            split,
        })
    }
}

/// Dataset splitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplitter {
    pct: f64,
    strategy: SplitStrategy,
    random_state: Option<u64>,
}

impl DatasetSplitter {
    /// Create a random splitter sending `pct` of rows to train
    pub fn new(pct: f64) -> Result<Self> {
        if !(pct > 0.0 && pct < 1.0) {
            return Err(CrashRiskError::InvalidParameter {
                name: "pct".to_string(),
                value: pct.to_string(),
                reason: "must lie strictly between 0 and 1".to_string(),
            });
        }
        Ok(Self {
            pct,
            strategy: SplitStrategy::Random,
            random_state: None,
        })
    }

    pub fn with_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &SplitStrategy {
        &self.strategy
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        match self.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }

    /// Compute the train/test row partition
    pub fn split_indices(&self, data: &LabeledDataset) -> Result<Split> {
        let df = data.frame();
        let split = match &self.strategy {
            SplitStrategy::Random => self.random_split(df.height()),
            SplitStrategy::Date { column } => self.date_split(df, column)?,
            SplitStrategy::Group { column } => self.group_split(df, column)?,
        };

        info!(
            strategy = self.strategy.name(),
            train = split.n_train(),
            test = split.n_test(),
            "split dataset"
        );
        Ok(split)
    }

    /// Split and extract `features` plus the target for both partitions
    pub fn split(&self, data: &LabeledDataset, features: &[String]) -> Result<SplitData> {
        let split = self.split_indices(data)?;
        SplitData::extract(data, split, features)
    }

    fn random_split(&self, n: usize) -> Split {
        let mut rng = self.rng();
        let mask: Vec<bool> = (0..n).map(|_| rng.gen::<f64>() < self.pct).collect();
        Split::from_mask(&mask)
    }

    fn date_split(&self, df: &DataFrame, column: &str) -> Result<Split> {
        let timestamps = column_timestamps(df, column)?;
        let n = timestamps.len();

        // Stable sort, nulls last
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| (timestamps[i].is_none(), timestamps[i]));

        let mut mask = vec![false; n];
        for (position, &row) in order.iter().enumerate() {
            mask[row] = (position as f64) / (n as f64) < self.pct;
        }
        Ok(Split::from_mask(&mask))
    }

    fn group_split(&self, df: &DataFrame, column: &str) -> Result<Split> {
        let keys = df
            .column(column)
            .map_err(|_| CrashRiskError::FeatureNotFound(column.to_string()))?
            .cast(&DataType::String)?;

        let mut members: HashMap<Option<String>, Vec<usize>> = HashMap::new();
        let mut first_seen: Vec<Option<String>> = Vec::new();
        for (row, key) in keys.str()?.into_iter().enumerate() {
            let key = key.map(str::to_string);
            members
                .entry(key.clone())
                .or_insert_with(|| {
                    first_seen.push(key);
                    Vec::new()
                })
                .push(row);
        }

        if first_seen.len() < 2 {
            return Err(CrashRiskError::ValidationError(format!(
                "group split on '{}' needs at least 2 groups, found {}",
                column,
                first_seen.len()
            )));
        }

        let mut groups = first_seen;
        groups.shuffle(&mut self.rng());

        let n = df.height();
        let target = self.pct * n as f64;
        let mut in_train: Vec<bool> = Vec::with_capacity(groups.len());
        let mut train_rows = 0usize;
        for key in &groups {
            let size = members[key].len();
            let with = (train_rows + size) as f64;
            let take = with <= target || (target - train_rows as f64) > (with - target);
            if take {
                train_rows += size;
            }
            in_train.push(take);
        }

        // Keep both sides non-empty
        if in_train.iter().all(|&t| t) {
            if let Some(last) = in_train.last_mut() {
                *last = false;
            }
        } else if in_train.iter().all(|&t| !t) {
            in_train[0] = true;
        }

        let mut mask = vec![false; n];
        for (key, &train) in groups.iter().zip(in_train.iter()) {
            for &row in &members[key] {
                mask[row] = train;
            }
        }
        Ok(Split::from_mask(&mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(n: usize) -> LabeledDataset {
        let target: Vec<i64> = (0..n).map(|i| (i % 4 == 0) as i64).collect();
        let segment: Vec<String> = (0..n).map(|i| format!("seg{}", i % 17)).collect();
        let dates: Vec<String> = (0..n)
            .map(|i| format!("2016-{:02}-{:02} 08:00:00", 1 + (i * 7) % 12, 1 + (i * 13) % 28))
            .collect();
        let df = df!(
            "TARGET" => target,
            "segment_id" => segment,
            "DATE_TIME" => dates,
            "width" => (0..n).map(|i| i as f64).collect::<Vec<_>>()
        )
        .unwrap();
        LabeledDataset::new(df, "TARGET").unwrap()
    }

    fn assert_complete(split: &Split, n: usize) {
        assert_eq!(split.n_train() + split.n_test(), n);
        let train: HashSet<_> = split.train_indices.iter().collect();
        assert!(split.test_indices.iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn test_constant_target_rejected() {
        let df = df!("TARGET" => &[1i64, 1, 1]).unwrap();
        let err = LabeledDataset::new(df, "TARGET").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, CrashRiskError::DegenerateTarget { distinct: 1, .. }));
    }

    #[test]
    fn test_missing_target_rejected() {
        let df = df!("y" => &[1i64, 0]).unwrap();
        assert!(LabeledDataset::new(df, "TARGET").unwrap_err().is_configuration());
    }

    #[test]
    fn test_pct_bounds() {
        assert!(DatasetSplitter::new(0.0).is_err());
        assert!(DatasetSplitter::new(1.0).is_err());
        assert!(DatasetSplitter::new(0.7).is_ok());
    }

    #[test]
    fn test_random_split_reproducible() {
        let data = labeled(200);
        let splitter = DatasetSplitter::new(0.7).unwrap().with_random_state(7);
        let a = splitter.split_indices(&data).unwrap();
        let b = splitter.split_indices(&data).unwrap();
        assert_eq!(a, b);
        assert_complete(&a, 200);
    }

    #[test]
    fn test_date_split_fraction() {
        let data = labeled(10);
        let splitter = DatasetSplitter::new(0.7)
            .unwrap()
            .with_strategy(SplitStrategy::Date { column: "DATE_TIME".into() });
        let split = splitter.split_indices(&data).unwrap();
        assert_eq!(split.n_train(), 7);
        assert_complete(&split, 10);
    }

    #[test]
    fn test_group_split_keeps_groups_whole() {
        let data = labeled(300);
        let splitter = DatasetSplitter::new(0.7)
            .unwrap()
            .with_strategy(SplitStrategy::Group { column: "segment_id".into() })
            .with_random_state(3);
        let split = splitter.split_indices(&data).unwrap();
        assert_complete(&split, 300);

        let seg = data.frame().column("segment_id").unwrap().str().unwrap().clone();
        let train: HashSet<_> = split.train_indices.iter().map(|&i| seg.get(i)).collect();
        assert!(split.test_indices.iter().all(|&i| !train.contains(&seg.get(i))));
        assert!(split.n_train() > 0 && split.n_test() > 0);
    }

    #[test]
    fn test_group_precedes_date() {
        let strategy = SplitStrategy::from_columns(Some("DATE_TIME"), Some("segment_id"));
        assert_eq!(strategy, SplitStrategy::Group { column: "segment_id".into() });
        assert_eq!(
            SplitStrategy::from_columns(Some("DATE_TIME"), None),
            SplitStrategy::Date { column: "DATE_TIME".into() }
        );
        assert_eq!(SplitStrategy::from_columns(None, None), SplitStrategy::Random);
    }

    #[test]
    fn test_split_matrices_align() {
        let data = labeled(50);
        let splitter = DatasetSplitter::new(0.6).unwrap().with_random_state(11);
        let parts = splitter.split(&data, &["width".to_string()]).unwrap();
        assert_eq!(parts.train_x.nrows(), parts.train_y.len());
        assert_eq!(parts.test_x.nrows(), parts.split.n_test());
        for (row, &i) in parts.split.train_indices.iter().enumerate() {
            assert_eq!(parts.train_x[[row, 0]], i as f64);
        }
    }
}
