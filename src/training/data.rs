//! Dataset access and feature preparation

use ndarray::{Array1, Array2};
use polars::prelude::*;

use crate::error::{Result, StewardError};

/// Dense feature matrix with aligned labels
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Row-major feature matrix, one row per race entry
    pub matrix: Array2<f64>,
    /// Target label per row
    pub labels: Array1<f64>,
    /// Column name per matrix column
    pub feature_names: Vec<String>,
}

impl FeatureSet {
    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Source of training data.
///
/// Implementations typically query race-history storage; they may either
/// return fewer rows than requested (the orchestrator rejects short frames)
/// or fail with [`StewardError::InsufficientData`] themselves.
pub trait DatasetProvider: Send + Sync {
    /// Fetch at least `min_rows` rows of training data
    fn fetch(&self, min_rows: usize) -> Result<DataFrame>;
}

/// Turns a raw dataset into a dense feature matrix and labels
pub trait FeatureBuilder: Send + Sync {
    /// Prepare features from the fetched frame
    fn prepare(&self, df: &DataFrame) -> Result<FeatureSet>;
}

/// Default feature builder: casts the configured columns to `f64` and
/// assembles a row-major matrix, with nulls mapped to 0.
#[derive(Debug, Clone)]
pub struct ColumnarFeatureBuilder {
    target_column: String,
    feature_columns: Option<Vec<String>>,
}

impl ColumnarFeatureBuilder {
    /// Build features from every non-target column
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            feature_columns: None,
        }
    }

    /// Restrict feature extraction to the named columns
    pub fn with_feature_columns(mut self, columns: Vec<String>) -> Self {
        self.feature_columns = Some(columns);
        self
    }

    fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
        let series = df
            .column(name)
            .map_err(|_| StewardError::FeatureNotFound(name.to_string()))?;
        let casted = series
            .cast(&DataType::Float64)
            .map_err(|e| StewardError::DataError(e.to_string()))?;
        let values: Vec<f64> = casted
            .f64()
            .map_err(|e| StewardError::DataError(e.to_string()))?
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        Ok(values)
    }
}

impl FeatureBuilder for ColumnarFeatureBuilder {
    fn prepare(&self, df: &DataFrame) -> Result<FeatureSet> {
        let feature_names: Vec<String> = match &self.feature_columns {
            Some(cols) => cols.clone(),
            None => df
                .get_column_names()
                .into_iter()
                .filter(|name| name.as_str() != self.target_column)
                .map(|s| s.to_string())
                .collect(),
        };

        if feature_names.is_empty() {
            return Err(StewardError::DataError(
                "no feature columns left after excluding the target".to_string(),
            ));
        }

        let labels: Array1<f64> = Self::column_as_f64(df, &self.target_column)?.into();

        let columns: Vec<Vec<f64>> = feature_names
            .iter()
            .map(|name| Self::column_as_f64(df, name))
            .collect::<Result<_>>()?;

        let n_rows = df.height();
        let n_cols = feature_names.len();
        let matrix = Array2::from_shape_fn((n_rows, n_cols), |(r, c)| columns[c][r]);

        Ok(FeatureSet {
            matrix,
            labels,
            feature_names,
        })
    }
}
