//! End-to-end training run tests

use chrono::{Duration, NaiveDate};
use crash_risk::inference::{ScoringEngine, ScoringModelArtifact};
use crash_risk::pipeline::{outputs, PipelineConfig, TrainingRun};
use crash_risk::training::{take_rows, DatasetSplitter, LabeledDataset};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tempfile::tempdir;

const HWY_TYPES: [&str; 4] = ["motorway", "primary", "residential", "trunk"];

/// Road segments with a risk driven by traffic, width and road type.
/// The riskiest `positives` rows are labeled 1. Timestamps increase with
/// the row index so date sorting keeps the original order.
fn synthetic_roads(n: usize, positives: usize, seed: u64) -> DataFrame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2015, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    let mut segment = Vec::with_capacity(n);
    let mut dates = Vec::with_capacity(n);
    let mut hwy = Vec::with_capacity(n);
    let mut lanes = Vec::with_capacity(n);
    let mut width = Vec::with_capacity(n);
    let mut aadt = Vec::with_capacity(n);
    let mut risk = Vec::with_capacity(n);

    for i in 0..n {
        let kind = rng.gen_range(0..HWY_TYPES.len());
        let lane_count = rng.gen_range(1..=4i64);
        let w = rng.gen_range(3.0..15.0f64);
        let traffic = rng.gen_range(100.0..40_000.0f64);

        segment.push(i as i64);
        dates.push((start + Duration::hours(7 * i as i64)).format("%Y-%m-%d %H:%M:%S").to_string());
        hwy.push(HWY_TYPES[kind]);
        lanes.push(lane_count);
        width.push(w);
        aadt.push(traffic);
        risk.push(
            (traffic + 1.0).ln() - 0.15 * w + if kind == 1 { 1.0 } else { 0.0 }
                + rng.gen_range(-0.5..0.5),
        );
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| risk[b].total_cmp(&risk[a]));
    let mut target = vec![0i64; n];
    for &row in order.iter().take(positives) {
        target[row] = 1;
    }

    df!(
        "segment_id" => segment,
        "DATE_TIME" => dates,
        "hwy_type" => hwy,
        "lanes" => lanes,
        "width" => width,
        "AADT" => aadt,
        "TARGET" => target
    )
    .unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig::from_yaml_str(
        r#"
name: synthetic
cont_feat: [width, AADT]
cat_feat: [hwy_type, lanes]
models: [logistic_regression, xgboost]
cv:
  folds: 3
  iterations: 2
seed: 42
"#,
    )
    .unwrap()
}

#[test]
fn test_training_run_end_to_end() {
    let roads = synthetic_roads(1000, 150, 7);
    let dir = tempdir().unwrap();

    let run = TrainingRun::new(config()).unwrap();
    let report = run.run_frame(roads.clone(), dir.path()).unwrap();

    assert_eq!(report.rows, 1000);
    assert_eq!(report.n_train + report.n_test, 1000);
    assert!(report.n_train > 640 && report.n_train < 760);
    assert_eq!(report.evaluations.len(), 2);
    assert_eq!(report.tuning.len(), 2);
    assert!(["logistic_regression", "xgboost"].contains(&report.selection.family.as_str()));
    assert!(!report.selection.features.is_empty());
    for evaluation in &report.evaluations {
        assert!(evaluation.calibrated.is_some());
        let auc = evaluation.raw.metrics.roc_auc.unwrap();
        assert!((0.0..=1.0).contains(&auc));
    }

    for file in [
        outputs::DATA_MODEL,
        outputs::FEATURES,
        outputs::MODEL,
        outputs::FEATURE_IMPORTANCES,
        outputs::METRICS,
    ] {
        assert!(dir.path().join(file).exists(), "{} missing", file);
    }

    let artifact = ScoringModelArtifact::load(dir.path().join(outputs::MODEL)).unwrap();
    assert_eq!(artifact.family, report.selection.family);
    assert_eq!(artifact.required_features, report.selection.features);

    // same partition the run used
    let dataset = LabeledDataset::new(roads.clone(), "TARGET").unwrap();
    let split = DatasetSplitter::new(0.7)
        .unwrap()
        .with_random_state(42)
        .split_indices(&dataset)
        .unwrap();
    assert_eq!(split.n_test(), report.n_test);

    let test_rows = take_rows(&roads, &split.test_indices).unwrap();
    let probabilities = ScoringEngine::new(artifact)
        .predict_probability(&test_rows)
        .unwrap();
    assert_eq!(probabilities.len(), report.n_test);
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_single_positive_is_insufficient() {
    let roads = synthetic_roads(40, 1, 3);
    let dir = tempdir().unwrap();

    let err = TrainingRun::new(config())
        .unwrap()
        .run_frame(roads, dir.path())
        .unwrap_err();
    assert!(err.is_insufficient_data(), "unexpected error: {}", err);
}

#[test]
fn test_constant_target_is_configuration_error() {
    let roads = synthetic_roads(60, 0, 5);
    let dir = tempdir().unwrap();

    let err = TrainingRun::new(config())
        .unwrap()
        .run_frame(roads, dir.path())
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_unknown_family_rejected_before_training() {
    let mut config = config();
    config.models.push("random_forest".to_string());
    let err = TrainingRun::new(config).unwrap_err();
    assert!(err.is_configuration());
}

fn with_dates(mut roads: DataFrame, dates: Vec<String>) -> DataFrame {
    roads
        .with_column(Series::new("DATE_TIME".into(), dates))
        .unwrap();
    roads
}

fn small_config(split_by_date: bool) -> PipelineConfig {
    let mut config = config();
    config.models = vec!["logistic_regression".to_string()];
    config.split_by_date = split_by_date;
    config
}

#[test]
fn test_offset_timestamps_train_with_either_split() {
    let dates: Vec<String> = (0..200)
        .map(|i| format!("2017-01-{:02}T{:02}:00:00Z", 1 + i / 24, i % 24))
        .collect();
    let roads = with_dates(synthetic_roads(200, 40, 13), dates);

    for split_by_date in [false, true] {
        let dir = tempdir().unwrap();
        let report = TrainingRun::new(small_config(split_by_date))
            .unwrap()
            .run_frame(roads.clone(), dir.path())
            .unwrap();
        assert_eq!(report.n_train + report.n_test, 200);
    }
}

#[test]
fn test_unparseable_dates_only_fail_a_date_split() {
    let dates: Vec<String> = (0..200)
        .map(|i| if i % 2 == 0 { "unknown".to_string() } else { "2017-01-01".to_string() })
        .collect();
    let roads = with_dates(synthetic_roads(200, 40, 17), dates);

    // random split keeps the input order and trains
    let dir = tempdir().unwrap();
    let report = TrainingRun::new(small_config(false))
        .unwrap()
        .run_frame(roads.clone(), dir.path())
        .unwrap();
    assert_eq!(report.rows, 200);

    let dir = tempdir().unwrap();
    let err = TrainingRun::new(small_config(true))
        .unwrap()
        .run_frame(roads, dir.path())
        .unwrap_err();
    assert!(err.to_string().contains("unknown"));
}
