//! Prediction path tests: reconciliation, scoring and written outputs

use chrono::NaiveDate;
use crash_risk::inference::{reconcile, ScoringEngine, ScoringModelArtifact, PREDICTION_COLUMN};
use crash_risk::optimizer::TrialParams;
use crash_risk::pipeline::{PredictOptions, PredictionRun};
use crash_risk::preprocessing::{FeatureProcessor, FeatureSpec};
use crash_risk::training::{Classifier, ModelRegistry};
use crash_risk::utils::{columns_to_array2, column_to_f64, DataSaver};
use polars::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn training_roads() -> DataFrame {
    df!(
        "hwy_type" => &["primary", "residential", "trunk", "primary", "residential", "trunk",
                        "primary", "trunk", "residential", "primary", "trunk", "residential"],
        "width" => &[6.0, 4.0, 12.0, 7.5, 3.5, 11.0, 5.0, 13.0, 4.5, 8.0, 10.0, 3.0],
        "TARGET" => &[1i64, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 0]
    )
    .unwrap()
}

fn trained_engine() -> ScoringEngine {
    let spec = FeatureSpec::new(vec!["width"], vec!["hwy_type"]);
    let processed = FeatureProcessor::new().process(training_roads(), &spec).unwrap();
    let x = columns_to_array2(&processed.frame, &processed.features).unwrap();
    let y = column_to_f64(&processed.frame, "TARGET").unwrap();

    let params = TrialParams::new();
    let mut model = ModelRegistry::standard()
        .get("logistic_regression")
        .unwrap()
        .build(&params, Some(1))
        .unwrap();
    model.fit(&x, &y).unwrap();

    ScoringEngine::new(ScoringModelArtifact::new(
        "logistic_regression",
        model,
        processed.features,
        spec,
        "TARGET",
        params,
    ))
}

fn now() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 3, 15)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap()
}

#[test]
fn test_reconcile_adds_missing_feature_as_zero() {
    let df = df!("a" => &[1.0, 2.0, 3.0], "c" => &[4.0, 5.0, 6.0]).unwrap();
    let required = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let out = reconcile(df, &required).unwrap();
    assert_eq!(out.width(), 3);
    assert_eq!(column_to_f64(&out, "b").unwrap().to_vec(), vec![0.0, 0.0, 0.0]);
    assert_eq!(column_to_f64(&out, "c").unwrap().to_vec(), vec![4.0, 5.0, 6.0]);
}

#[test]
fn test_batch_missing_a_level_scores_every_row() {
    let engine = trained_engine();
    assert!(engine
        .artifact()
        .required_features
        .contains(&"hwy_type_trunk".to_string()));

    let batch = df!(
        "segment_id" => &[10i64, 11, 12, 13],
        "hwy_type" => &["primary", "residential", "primary", "residential"],
        "width" => &[6.0, 3.0, 9.0, 4.0]
    )
    .unwrap();

    let scored = engine.score(&batch).unwrap();
    assert_eq!(scored.height(), 4);
    let probabilities = column_to_f64(&scored, PREDICTION_COLUMN).unwrap();
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_prediction_run_writes_indexed_outputs() {
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("model.json");
    trained_engine().artifact().save(&model_path).unwrap();

    let mut roads = df!(
        "segment_id" => &[1i64, 2, 3],
        "hwy_type" => &["trunk", "primary", "residential"],
        "width" => &[12.0, 6.0, 3.5]
    )
    .unwrap();
    let mut crashes = df!(
        "segment_id" => &[1i64, 1, 3],
        "DATE_TIME" => &["2017-03-10 08:00:00", "2016-01-02 17:45:00", "2009-06-30 12:00:00"]
    )
    .unwrap();
    let roads_path = dir.path().join("roads.csv");
    let crashes_path = dir.path().join("crashes.csv");
    DataSaver::save_csv(&mut roads, &roads_path).unwrap();
    DataSaver::save_csv(&mut crashes, &crashes_path).unwrap();

    let out_dir = dir.path().join("out");
    let run = PredictionRun::load(&model_path, PredictOptions::new(now())).unwrap();
    let scored = run.run(&roads_path, Some(crashes_path.as_path()), &out_dir).unwrap();
    assert_eq!(scored.height(), 3);

    assert!(out_dir.join("predictions.csv").exists());
    let text = std::fs::read_to_string(out_dir.join("predictions.json")).unwrap();
    let json: Value = serde_json::from_str(&text).unwrap();
    let records = json.as_object().unwrap();
    assert_eq!(records.len(), 3);

    for key in ["0", "1", "2"] {
        let record = records[key].as_object().unwrap();
        let p = record[PREDICTION_COLUMN].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
        assert!(record.contains_key("LAST_7_DAYS"));
        assert!(record.contains_key("LAST_3650_DAYS"));
    }

    // segment 1: one crash within 7 days, both within 5 years
    assert_eq!(records["0"]["LAST_7_DAYS"].as_i64(), Some(1));
    assert_eq!(records["0"]["LAST_1825_DAYS"].as_i64(), Some(2));
    // segment 3: only a crash older than 5 years
    assert_eq!(records["2"]["LAST_1825_DAYS"].as_i64(), Some(0));
    assert_eq!(records["2"]["LAST_3650_DAYS"].as_i64(), Some(1));
}
