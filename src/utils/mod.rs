//! Utility functions and types

pub mod data_loader;

pub use data_loader::{split_target, ClassMap, DataLoader, LabeledData};
