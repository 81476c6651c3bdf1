//! Exogenous variables: an ordered table of named numeric columns.

use crate::core::SeriesIndex;
use crate::error::{ForecastError, Result};

/// Ordered table of exogenous columns of equal length.
///
/// Column order is the feature order used when building training matrices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Exog {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: Option<SeriesIndex>,
}

impl Exog {
    /// Build from `(name, values)` pairs.
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let mut exog = Exog::default();
        for (name, values) in columns {
            exog.push_column(name, values)?;
        }
        Ok(exog)
    }

    /// Single-column table.
    pub fn from_column(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            names: vec![name.into()],
            columns: vec![values],
            index: None,
        }
    }

    /// Attach an index; its length must match the number of rows.
    pub fn with_index(mut self, index: SeriesIndex) -> Result<Self> {
        if !self.columns.is_empty() && index.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: index.len(),
            });
        }
        self.index = Some(index);
        Ok(self)
    }

    /// Append a column.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(ForecastError::InvalidParameter(format!(
                "duplicated exogenous column '{}'",
                name
            )));
        }
        if !self.columns.is_empty() && values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns
            .first()
            .map(|c| c.len())
            .or_else(|| self.index.as_ref().map(|i| i.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn index(&self) -> Option<&SeriesIndex> {
        self.index.as_ref()
    }

    /// Values of a named column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Row `i` in column order.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }

    /// Rows `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Exog> {
        if start > end || end > self.len() {
            return Err(ForecastError::InsufficientData {
                needed: end,
                got: self.len(),
            });
        }
        let index = match &self.index {
            Some(index) => Some(index.slice(start, end)?),
            None => None,
        };
        Ok(Exog {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[start..end].to_vec()).collect(),
            index,
        })
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Result<Exog> {
        self.slice(0, n.min(self.len()))
    }

    /// Keep the named columns in the requested order.
    pub fn select(&self, names: &[String]) -> Result<Exog> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = self.column(name).ok_or_else(|| {
                ForecastError::InvalidParameter(format!(
                    "Missing columns in `exog`. Expected {:?}. Got {:?}.",
                    names, self.names
                ))
            })?;
            columns.push(values.to_vec());
        }
        Ok(Exog {
            names: names.to_vec(),
            columns,
            index: self.index.clone(),
        })
    }

    /// Add the columns of `other` to the right of this table.
    pub fn hstack(&self, other: &Exog) -> Result<Exog> {
        let mut out = self.clone();
        for (name, values) in other.names.iter().zip(&other.columns) {
            out.push_column(name.clone(), values.clone())?;
        }
        if out.index.is_none() {
            out.index = other.index.clone();
        }
        Ok(out)
    }

    /// Check for NaN or infinite values.
    pub fn has_missing_values(&self) -> bool {
        self.columns.iter().flatten().any(|v| !v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Exog {
        Exog::new(vec![
            ("a".to_string(), vec![1.0, 2.0, 3.0]),
            ("b".to_string(), vec![10.0, 20.0, 30.0]),
        ])
        .unwrap()
    }

    #[test]
    fn rows_follow_column_order() {
        let exog = table();
        assert_eq!(exog.row(1), vec![2.0, 20.0]);
        assert_eq!(exog.n_columns(), 2);
        assert_eq!(exog.len(), 3);
    }

    #[test]
    fn unequal_columns_rejected() {
        let result = Exog::new(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn select_reorders_and_checks_names() {
        let exog = table();
        let selected = exog.select(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(selected.row(0), vec![10.0, 1.0]);
        assert!(exog.select(&["c".to_string()]).is_err());
    }

    #[test]
    fn slice_and_head() {
        let exog = table().with_index(SeriesIndex::positions(3)).unwrap();
        let s = exog.slice(1, 3).unwrap();
        assert_eq!(s.column("a"), Some(&[2.0, 3.0][..]));
        assert_eq!(s.index().and_then(|i| i.first_label()).map(|l| l.to_string()), Some("1".to_string()));
        assert_eq!(exog.head(10).unwrap().len(), 3);
        assert!(exog.slice(2, 5).is_err());
    }
}
