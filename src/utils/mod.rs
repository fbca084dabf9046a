//! Utility functions and types

pub mod data_loader;
pub mod datetime;

pub use data_loader::{columns_to_array2, column_to_f64, index_records, DataLoader, DataSaver};
pub use datetime::{column_timestamps, parse_timestamp};
