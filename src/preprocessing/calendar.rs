//! Calendar features extracted from a datetime index.

use crate::core::{Exog, SeriesIndex};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

/// Features that can be extracted, in the order they are listed to users.
pub const SUPPORTED_FEATURES: [&str; 10] = [
    "year",
    "month",
    "week",
    "day_of_week",
    "day_of_year",
    "day_of_month",
    "weekend",
    "hour",
    "minute",
    "second",
];

/// Order in which features are laid out as columns.
const COLUMN_ORDER: [&str; 10] = [
    "year",
    "month",
    "week",
    "day_of_week",
    "day_of_month",
    "day_of_year",
    "weekend",
    "hour",
    "minute",
    "second",
];

/// Features that are never cyclically encoded.
const RAW_FEATURES: [&str; 2] = ["year", "weekend"];

/// How calendar features are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateTimeEncoding {
    /// Raw integer values.
    None,
    /// `sin` / `cos` pairs scaled by the feature's period.
    #[default]
    Cyclical,
    /// One indicator column per observed value.
    OneHot,
}

impl DateTimeEncoding {
    /// Parse `"cyclical"`, `"onehot"` or no encoding.
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(DateTimeEncoding::None),
            Some("cyclical") => Ok(DateTimeEncoding::Cyclical),
            Some("onehot") => Ok(DateTimeEncoding::OneHot),
            Some(_) => Err(ForecastError::InvalidParameter(
                "Encoding must be one of 'cyclical', 'onehot' or None".to_string(),
            )),
        }
    }
}

fn default_max_value(feature: &str) -> Option<f64> {
    match feature {
        "month" => Some(12.0),
        "week" => Some(52.0),
        "day_of_week" => Some(7.0),
        "day_of_year" => Some(365.0),
        "day_of_month" => Some(31.0),
        "hour" => Some(24.0),
        "minute" | "second" => Some(60.0),
        _ => None,
    }
}

fn extract(feature: &str, ts: &DateTime<Utc>) -> f64 {
    let v = match feature {
        "year" => ts.year() as i64,
        "month" => ts.month() as i64,
        "week" => ts.iso_week().week() as i64,
        "day_of_week" => ts.weekday().num_days_from_monday() as i64,
        "day_of_year" => ts.ordinal() as i64,
        "day_of_month" => ts.day() as i64,
        "weekend" => (ts.weekday().num_days_from_monday() >= 5) as i64,
        "hour" => ts.hour() as i64,
        "minute" => ts.minute() as i64,
        "second" => ts.second() as i64,
        _ => 0,
    };
    v as f64
}

/// Build calendar features (year, month, weekday, ...) from a datetime index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeFeatureTransformer {
    features: Vec<String>,
    encoding: DateTimeEncoding,
    max_values: BTreeMap<String, f64>,
}

impl Default for DateTimeFeatureTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl DateTimeFeatureTransformer {
    /// All supported features with cyclical encoding.
    pub fn new() -> Self {
        Self {
            features: SUPPORTED_FEATURES.iter().map(|s| s.to_string()).collect(),
            encoding: DateTimeEncoding::Cyclical,
            max_values: BTreeMap::new(),
        }
    }

    pub fn with_features<S: AsRef<str>>(mut self, features: &[S]) -> Self {
        self.features = features.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn with_encoding(mut self, encoding: DateTimeEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Override the period used by the cyclical encoding of some features.
    pub fn with_max_values(mut self, max_values: BTreeMap<String, f64>) -> Self {
        self.max_values = max_values;
        self
    }

    fn validate(&self) -> Result<()> {
        let unsupported: BTreeSet<&String> = self
            .features
            .iter()
            .filter(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
            .collect();
        if !unsupported.is_empty() {
            let names: Vec<String> = unsupported.iter().map(|f| format!("'{}'", f)).collect();
            let supported: Vec<String> =
                SUPPORTED_FEATURES.iter().map(|f| format!("'{}'", f)).collect();
            return Err(ForecastError::InvalidParameter(format!(
                "Features {{{}}} are not supported. Supported features are [{}].",
                names.join(", "),
                supported.join(", ")
            )));
        }
        for (name, value) in &self.max_values {
            if !(*value > 0.0) {
                return Err(ForecastError::InvalidParameter(format!(
                    "max value of '{}' must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    fn max_value(&self, feature: &str) -> f64 {
        self.max_values
            .get(feature)
            .copied()
            .or_else(|| default_max_value(feature))
            .unwrap_or(1.0)
    }

    /// Requested features in column order.
    fn ordered_features(&self) -> Vec<&'static str> {
        COLUMN_ORDER
            .iter()
            .copied()
            .filter(|f| self.features.iter().any(|g| g == f))
            .collect()
    }

    /// Compute the features for every label of `index`.
    pub fn transform(&self, index: &SeriesIndex) -> Result<Exog> {
        self.validate()?;
        let timestamps = index.timestamps().ok_or_else(|| {
            ForecastError::InvalidParameter("Input `X` must have a datetime index".to_string())
        })?;

        let features = self.ordered_features();
        let raw: Vec<(&str, Vec<f64>)> = features
            .iter()
            .map(|&f| (f, timestamps.iter().map(|ts| extract(f, ts)).collect()))
            .collect();

        let mut exog = Exog::default();
        match self.encoding {
            DateTimeEncoding::None => {
                for (name, values) in raw {
                    exog.push_column(name, values)?;
                }
            }
            DateTimeEncoding::Cyclical => {
                for (name, values) in raw.iter().filter(|(n, _)| RAW_FEATURES.contains(n)) {
                    exog.push_column(*name, values.clone())?;
                }
                for (name, values) in raw.iter().filter(|(n, _)| !RAW_FEATURES.contains(n)) {
                    let max = self.max_value(name);
                    let sin = values.iter().map(|v| (2.0 * PI * v / max).sin()).collect();
                    let cos = values.iter().map(|v| (2.0 * PI * v / max).cos()).collect();
                    exog.push_column(format!("{}_sin", name), sin)?;
                    exog.push_column(format!("{}_cos", name), cos)?;
                }
            }
            DateTimeEncoding::OneHot => {
                for (name, values) in raw {
                    let categories: BTreeSet<i64> = values.iter().map(|v| *v as i64).collect();
                    for category in categories {
                        let column = values
                            .iter()
                            .map(|v| if *v as i64 == category { 1.0 } else { 0.0 })
                            .collect();
                        exog.push_column(format!("{}_{}", name, category), column)?;
                    }
                }
            }
        }
        tracing::debug!(
            n_columns = exog.n_columns(),
            n_rows = timestamps.len(),
            "built calendar features"
        );
        exog.with_index(index.clone())
    }

    /// The transformer is stateless; fitting only validates the configuration.
    pub fn fit_transform(&self, index: &SeriesIndex) -> Result<Exog> {
        self.transform(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn five_days() -> SeriesIndex {
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        SeriesIndex::date_range(start, Duration::days(1), 5).unwrap()
    }

    #[test]
    fn cyclical_puts_raw_features_first() {
        let exog = DateTimeFeatureTransformer::new()
            .with_features(&["year", "month", "weekend"])
            .transform(&five_days())
            .unwrap();
        assert_eq!(
            exog.column_names(),
            &["year", "weekend", "month_sin", "month_cos"]
        );
        assert_eq!(exog.column("year").unwrap(), &[2022.0; 5]);
        assert_eq!(exog.column("weekend").unwrap(), &[1.0, 1.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(exog.column("month_sin").unwrap()[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(
            exog.column("month_cos").unwrap()[0],
            0.8660254037844387,
            epsilon = 1e-12
        );
    }

    #[test]
    fn all_features_without_encoding_follow_column_order() {
        let exog = DateTimeFeatureTransformer::new()
            .with_encoding(DateTimeEncoding::None)
            .transform(&five_days())
            .unwrap();
        assert_eq!(
            exog.column_names(),
            &[
                "year",
                "month",
                "week",
                "day_of_week",
                "day_of_month",
                "day_of_year",
                "weekend",
                "hour",
                "minute",
                "second"
            ]
        );
        // 2022-01-01 is a Saturday in ISO week 52 of 2021.
        assert_eq!(exog.row(0)[2], 52.0);
        assert_eq!(exog.row(0)[3], 5.0);
        assert_eq!(exog.row(2)[3], 0.0);
    }

    #[test]
    fn onehot_creates_sorted_indicator_columns() {
        let exog = DateTimeFeatureTransformer::new()
            .with_features(&["year", "month", "weekend"])
            .with_encoding(DateTimeEncoding::OneHot)
            .transform(&five_days())
            .unwrap();
        assert_eq!(
            exog.column_names(),
            &["year_2022", "month_1", "weekend_0", "weekend_1"]
        );
        assert_eq!(exog.column("weekend_0").unwrap(), &[0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn custom_max_values_change_period() {
        let ts: Vec<_> = [(1, 31), (2, 28), (3, 31), (4, 30), (5, 31)]
            .iter()
            .map(|&(m, d)| Utc.with_ymd_and_hms(2022, m, d, 0, 0, 0).unwrap())
            .collect();
        let index = SeriesIndex::datetime(ts).unwrap();
        let mut max_values = BTreeMap::new();
        max_values.insert("month".to_string(), 6.0);
        let exog = DateTimeFeatureTransformer::new()
            .with_features(&["year", "month", "weekend"])
            .with_max_values(max_values)
            .transform(&index)
            .unwrap();
        let cos = exog.column("month_cos").unwrap();
        assert_relative_eq!(cos[2], -1.0, epsilon = 1e-12);
        assert_eq!(exog.column("weekend").unwrap(), &[0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn unsupported_feature_message() {
        let err = DateTimeFeatureTransformer::new()
            .with_features(&["invalid_feature"])
            .transform(&five_days())
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::InvalidParameter(
                "Features {'invalid_feature'} are not supported. Supported features are \
                 ['year', 'month', 'week', 'day_of_week', 'day_of_year', 'day_of_month', \
                 'weekend', 'hour', 'minute', 'second']."
                    .to_string()
            )
        );
    }

    #[test]
    fn range_index_is_rejected() {
        let result = DateTimeFeatureTransformer::new().transform(&SeriesIndex::positions(3));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_encoding_string() {
        assert!(DateTimeEncoding::parse(Some("invalid encoding")).is_err());
        assert_eq!(DateTimeEncoding::parse(None).unwrap(), DateTimeEncoding::None);
    }
}
