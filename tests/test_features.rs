//! Integration tests for feature expansion

use crash_risk::preprocessing::{log_transform, FeatureProcessor, FeatureSpec};
use crash_risk::utils::column_to_f64;
use polars::prelude::*;

fn roads() -> DataFrame {
    df!(
        "segment_id" => &[1i64, 2, 3, 4, 5, 6],
        "hwy_type" => &["primary", "residential", "primary", "trunk", "residential", "primary"],
        "lanes" => &[1i64, 2, 2, 4, 1, 2],
        "width" => &[6.0, 4.5, 0.0, 12.0, 3.0, 7.5],
        "TARGET" => &[1i64, 0, 0, 1, 0, 1]
    )
    .unwrap()
}

#[test]
fn test_one_hot_counts_and_row_sums() {
    let spec = FeatureSpec::new(Vec::<&str>::new(), vec!["hwy_type"]);
    let processed = FeatureProcessor::new().process(roads(), &spec).unwrap();

    // three distinct levels
    assert_eq!(processed.features.len(), 3);
    assert_eq!(processed.linear_features.len(), 2);

    let columns: Vec<_> = processed
        .features
        .iter()
        .map(|name| column_to_f64(&processed.frame, name).unwrap())
        .collect();
    for row in 0..processed.frame.height() {
        let total: f64 = columns.iter().map(|c| c[row]).sum();
        assert_eq!(total, 1.0);
    }
}

#[test]
fn test_linear_list_drops_first_sorted_level() {
    let spec = FeatureSpec::new(Vec::<&str>::new(), vec!["lanes", "hwy_type"]);
    let processed = FeatureProcessor::new().process(roads(), &spec).unwrap();

    assert!(processed.features.contains(&"lanes_1".to_string()));
    assert!(!processed.linear_features.contains(&"lanes_1".to_string()));
    assert!(processed.features.contains(&"hwy_type_primary".to_string()));
    assert!(!processed.linear_features.contains(&"hwy_type_primary".to_string()));
    assert!(processed.linear_features.contains(&"lanes_4".to_string()));
}

#[test]
fn test_log_columns_and_raw_columns_kept() {
    let spec = FeatureSpec::new(vec!["width"], vec!["lanes"]);
    let processed = FeatureProcessor::new().process(roads(), &spec).unwrap();

    let logs = column_to_f64(&processed.frame, "log_width").unwrap();
    assert_eq!(logs[2], 0.0);
    assert!((logs[0] - 7.0f64.ln()).abs() < 1e-12);

    assert!(processed.frame.column("width").is_ok());
    assert!(processed.frame.column("lanes").is_ok());
    assert!(!processed.features.contains(&"width".to_string()));
}

#[test]
fn test_log_transform_domain() {
    assert_eq!(log_transform(0.0).unwrap(), 0.0);
    for x in [0.5, 3.0, 250.0] {
        assert!((log_transform(x).unwrap() - (x + 1.0).ln()).abs() < 1e-12);
    }
    assert!(log_transform(-1.5).is_err());
    assert!(log_transform(f64::NAN).is_err());
}

#[test]
fn test_missing_configured_features_are_skipped() {
    let spec = FeatureSpec::new(vec!["width", "AADT"], vec!["hwy_type", "intersection"]);
    let resolved = spec.resolve(&roads());
    assert_eq!(resolved.continuous, vec!["width"]);
    assert_eq!(resolved.categorical, vec!["hwy_type"]);

    let processed = FeatureProcessor::new().process(roads(), &resolved).unwrap();
    assert!(processed.features.iter().all(|f| !f.contains("AADT")));
}
