//! Encoders: raw frame to dense numeric matrix

use super::{ensure_fitted, snapshot_of, Encoder, FromParams, StageComponent};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Learned encoding of one input column
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ColumnCoding {
    Numeric { name: String },
    Categorical { name: String, categories: Vec<String> },
}

impl ColumnCoding {
    fn name(&self) -> &str {
        match self {
            ColumnCoding::Numeric { name } | ColumnCoding::Categorical { name, .. } => name,
        }
    }
}

/// `DataEncoding`: ordinal or dummy coding of string columns,
/// numeric columns cast to `f64` with nulls as NaN.
///
/// At `refit`, a category unseen during `fit` maps to the next free
/// ordinal code (all zeros under dummy coding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEncoding {
    /// One-hot encode categorical columns instead of ordinal codes
    dummy_coding: bool,
    /// Learned column codings, in frame order
    columns: Vec<ColumnCoding>,
    is_fitted: bool,
}

impl DataEncoding {
    pub fn new() -> Self {
        Self {
            dummy_coding: false,
            columns: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_dummy_coding(mut self, dummy_coding: bool) -> Self {
        self.dummy_coding = dummy_coding;
        self
    }

    /// Width of the encoded matrix
    pub fn n_outputs(&self) -> usize {
        self.columns
            .iter()
            .map(|c| match c {
                ColumnCoding::Categorical { categories, .. } if self.dummy_coding => {
                    categories.len()
                }
                _ => 1,
            })
            .sum()
    }

    fn encode(&self, x: &DataFrame) -> Result<Array2<f64>> {
        let n_rows = x.height();
        let mut outputs: Vec<Vec<f64>> = Vec::with_capacity(self.n_outputs());

        for coding in &self.columns {
            let column = x.column(coding.name()).map_err(|_| {
                AutoMLError::DataError(format!("column '{}' missing from input", coding.name()))
            })?;
            match coding {
                ColumnCoding::Numeric { .. } => outputs.push(numeric_values(column)?),
                ColumnCoding::Categorical { categories, .. } => {
                    let lookup: HashMap<&str, usize> = categories
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.as_str(), i))
                        .collect();
                    let values = string_values(column)?;
                    if self.dummy_coding {
                        for (code, _) in categories.iter().enumerate() {
                            outputs.push(
                                values
                                    .iter()
                                    .map(|v| match v {
                                        None => f64::NAN,
                                        Some(s) if lookup.get(s.as_str()) == Some(&code) => 1.0,
                                        Some(_) => 0.0,
                                    })
                                    .collect(),
                            );
                        }
                    } else {
                        let unseen = categories.len() as f64;
                        outputs.push(
                            values
                                .iter()
                                .map(|v| match v {
                                    None => f64::NAN,
                                    Some(s) => lookup
                                        .get(s.as_str())
                                        .map(|&code| code as f64)
                                        .unwrap_or(unseen),
                                })
                                .collect(),
                        );
                    }
                }
            }
        }

        let col_refs: Vec<&[f64]> = outputs.iter().map(|c| c.as_slice()).collect();
        Ok(Array2::from_shape_fn((n_rows, col_refs.len()), |(r, c)| {
            col_refs[c][r]
        }))
    }
}

impl Default for DataEncoding {
    fn default() -> Self {
        Self::new()
    }
}

impl FromParams for DataEncoding {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new().with_dummy_coding(params.bool("dummy_coding", false)?))
    }
}

impl StageComponent for DataEncoding {
    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Encoder for DataEncoding {
    fn fit(&mut self, x: &DataFrame) -> Result<Array2<f64>> {
        if x.width() == 0 {
            return Err(AutoMLError::DataError("input frame has no columns".to_string()));
        }
        self.columns = x
            .get_columns()
            .iter()
            .map(|column| {
                let name = column.name().to_string();
                if is_textual(column.dtype()) {
                    let categories: BTreeSet<String> =
                        string_values(column)?.into_iter().flatten().collect();
                    Ok(ColumnCoding::Categorical {
                        name,
                        categories: categories.into_iter().collect(),
                    })
                } else {
                    Ok(ColumnCoding::Numeric { name })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        self.is_fitted = true;
        self.encode(x)
    }

    fn refit(&self, x: &DataFrame) -> Result<Array2<f64>> {
        ensure_fitted(self.is_fitted, "DataEncoding")?;
        self.encode(x)
    }
}

fn is_textual(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String | DataType::Categorical(_, _))
}

fn numeric_values(column: &Column) -> Result<Vec<f64>> {
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|e| AutoMLError::DataError(e.to_string()))?;
    Ok(casted
        .f64()
        .map_err(|e| AutoMLError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn string_values(column: &Column) -> Result<Vec<Option<String>>> {
    let casted = column
        .cast(&DataType::String)
        .map_err(|e| AutoMLError::DataError(e.to_string()))?;
    Ok(casted
        .str()
        .map_err(|e| AutoMLError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Cast every column to `f64` for pipelines without an encoder.
/// String columns are rejected.
pub fn frame_to_array(x: &DataFrame) -> Result<Array2<f64>> {
    let col_data = x
        .get_columns()
        .iter()
        .map(|column| {
            if is_textual(column.dtype()) {
                return Err(AutoMLError::DataError(format!(
                    "column '{}' is not numeric and no encoder is configured",
                    column.name()
                )));
            }
            numeric_values(column)
        })
        .collect::<Result<Vec<_>>>()?;
    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((x.height(), col_refs.len()), |(r, c)| {
        col_refs[c][r]
    }))
}

/// Count of missing cells (nulls and float NaN) across the frame
pub fn missing_cells(x: &DataFrame) -> usize {
    x.get_columns()
        .iter()
        .map(|column| {
            if matches!(column.dtype(), DataType::Float32 | DataType::Float64) {
                // nulls come back as NaN
                numeric_values(column)
                    .map(|v| v.iter().filter(|x| x.is_nan()).count())
                    .unwrap_or_else(|_| column.null_count())
            } else {
                column.null_count()
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("color".into(), &["red", "blue", "red", "green"]),
            Column::new("size".into(), &[Some(1.0), None, Some(3.0), Some(4.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_ordinal_encoding() {
        let mut enc = DataEncoding::new();
        let x = enc.fit(&frame()).unwrap();
        assert_eq!(x.dim(), (4, 2));
        // sorted categories: blue, green, red
        assert_eq!(x[[0, 0]], 2.0);
        assert_eq!(x[[1, 0]], 0.0);
        assert!(x[[1, 1]].is_nan());
        assert!(enc.is_fitted());
    }

    #[test]
    fn test_dummy_encoding_width() {
        let mut enc = DataEncoding::new().with_dummy_coding(true);
        let x = enc.fit(&frame()).unwrap();
        assert_eq!(x.ncols(), 4);
        assert_eq!(x.row(0).to_vec()[..3], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_refit_maps_unseen_category_to_fresh_code() {
        let mut enc = DataEncoding::new();
        enc.fit(&frame()).unwrap();
        let new = DataFrame::new(vec![
            Column::new("color".into(), &["purple"]),
            Column::new("size".into(), &[2.0]),
        ])
        .unwrap();
        let x = enc.refit(&new).unwrap();
        assert_eq!(x[[0, 0]], 3.0);
        assert_eq!(x[[0, 1]], 2.0);
    }

    #[test]
    fn test_refit_before_fit_fails() {
        let enc = DataEncoding::new();
        assert!(matches!(enc.refit(&frame()), Err(AutoMLError::NotFitted(_))));
    }

    #[test]
    fn test_frame_to_array_rejects_strings() {
        assert!(frame_to_array(&frame()).is_err());
        let numeric = DataFrame::new(vec![Column::new("a".into(), &[1i32, 2, 3])]).unwrap();
        assert_eq!(frame_to_array(&numeric).unwrap().dim(), (3, 1));
    }

    #[test]
    fn test_missing_cells_counts_nulls() {
        assert_eq!(missing_cells(&frame()), 1);
    }
}
