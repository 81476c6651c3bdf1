//! TimeSeries and index structures for representing temporal data.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

/// A single label of a series index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexLabel {
    /// Integer position of a range index.
    Position(i64),
    /// Timestamp of a datetime index.
    Timestamp(DateTime<Utc>),
}

impl PartialOrd for IndexLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (IndexLabel::Position(a), IndexLabel::Position(b)) => Some(a.cmp(b)),
            (IndexLabel::Timestamp(a), IndexLabel::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexLabel::Position(p) => write!(f, "{}", p),
            IndexLabel::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Spacing of a regular datetime index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Constant duration: seconds, hours, days, weeks.
    Fixed(Duration),
    /// Every `n` calendar months on the same day of the month, e.g. month
    /// starts (`1`), quarter starts (`3`) or year starts (`12`).
    Months(u32),
    /// Every `n` calendar months on the last day of the month.
    MonthEnds(u32),
}

impl From<Duration> for Frequency {
    fn from(duration: Duration) -> Self {
        Frequency::Fixed(duration)
    }
}

impl Frequency {
    fn is_valid(&self) -> bool {
        match self {
            Frequency::Fixed(d) => *d > Duration::zero(),
            Frequency::Months(n) | Frequency::MonthEnds(n) => *n > 0,
        }
    }

    /// The timestamp `k` steps after `from`. `None` on overflow.
    pub fn advance(&self, from: DateTime<Utc>, k: usize) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Fixed(d) => {
                let k = i32::try_from(k).ok()?;
                from.checked_add_signed(d.checked_mul(k)?)
            }
            Frequency::Months(n) => {
                let months = n.checked_mul(u32::try_from(k).ok()?)?;
                from.checked_add_months(Months::new(months))
            }
            Frequency::MonthEnds(n) => {
                let months = n.checked_mul(u32::try_from(k).ok()?)?.checked_add(1)?;
                let date = from.date_naive();
                let next_first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?
                    .checked_add_months(Months::new(months))?;
                let last_day = next_first.pred_opt()?;
                Some(Utc.from_utc_datetime(&last_day.and_time(from.time())))
            }
        }
    }
}

/// Frequency of an index: the step of a range index or the spacing of a
/// regular datetime index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFreq {
    Step(i64),
    Datetime(Frequency),
    Irregular,
}

/// Index of a series: integer labels or timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesIndex {
    /// `start, start + step, ...` with `len` labels.
    Range { start: i64, step: i64, len: usize },
    /// Strictly increasing integer labels without a common step.
    Positions(Vec<i64>),
    /// Strictly increasing timestamps with an optional regular frequency.
    Datetime {
        timestamps: Vec<DateTime<Utc>>,
        freq: Option<Frequency>,
    },
}

impl Default for SeriesIndex {
    fn default() -> Self {
        SeriesIndex::positions(0)
    }
}

impl SeriesIndex {
    /// Range index `0..len`.
    pub fn positions(len: usize) -> Self {
        SeriesIndex::Range {
            start: 0,
            step: 1,
            len,
        }
    }

    /// Range index with explicit start and step.
    pub fn range(start: i64, step: i64, len: usize) -> Result<Self> {
        if step <= 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "range index step must be positive, got {}",
                step
            )));
        }
        Ok(SeriesIndex::Range { start, step, len })
    }

    /// Datetime index. The frequency is inferred when all spacings are equal
    /// or every step covers the same number of calendar months.
    pub fn datetime(timestamps: Vec<DateTime<Utc>>) -> Result<Self> {
        validate_increasing(&timestamps)?;
        let freq = infer_frequency(&timestamps);
        Ok(SeriesIndex::Datetime { timestamps, freq })
    }

    /// Datetime index with an explicit frequency.
    pub fn datetime_with_freq(
        timestamps: Vec<DateTime<Utc>>,
        freq: impl Into<Frequency>,
    ) -> Result<Self> {
        validate_increasing(&timestamps)?;
        let freq = freq.into();
        if !freq.is_valid() {
            return Err(ForecastError::InvalidParameter(
                "frequency must be a positive duration or number of months".to_string(),
            ));
        }
        Ok(SeriesIndex::Datetime {
            timestamps,
            freq: Some(freq),
        })
    }

    /// Regular datetime index of `len` timestamps starting at `start`.
    pub fn date_range(
        start: DateTime<Utc>,
        freq: impl Into<Frequency>,
        len: usize,
    ) -> Result<Self> {
        let freq = freq.into();
        let timestamps = (0..len)
            .map(|i| freq.advance(start, i).ok_or_else(timestamp_overflow))
            .collect::<Result<Vec<_>>>()?;
        Self::datetime_with_freq(timestamps, freq)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        match self {
            SeriesIndex::Range { len, .. } => *len,
            SeriesIndex::Positions(labels) => labels.len(),
            SeriesIndex::Datetime { timestamps, .. } => timestamps.len(),
        }
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a datetime index.
    pub fn is_datetime(&self) -> bool {
        matches!(self, SeriesIndex::Datetime { .. })
    }

    /// Timestamps of a datetime index.
    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        match self {
            SeriesIndex::Datetime { timestamps, .. } => Some(timestamps),
            _ => None,
        }
    }

    /// Label at position `i`.
    pub fn label(&self, i: usize) -> Option<IndexLabel> {
        if i >= self.len() {
            return None;
        }
        Some(match self {
            SeriesIndex::Range { start, step, .. } => IndexLabel::Position(start + step * i as i64),
            SeriesIndex::Positions(labels) => IndexLabel::Position(labels[i]),
            SeriesIndex::Datetime { timestamps, .. } => IndexLabel::Timestamp(timestamps[i]),
        })
    }

    /// All labels in order.
    pub fn labels(&self) -> Vec<IndexLabel> {
        (0..self.len()).filter_map(|i| self.label(i)).collect()
    }

    /// First label.
    pub fn first_label(&self) -> Option<IndexLabel> {
        self.label(0)
    }

    /// Last label.
    pub fn last_label(&self) -> Option<IndexLabel> {
        self.len().checked_sub(1).and_then(|i| self.label(i))
    }

    /// Frequency of the index.
    pub fn freq(&self) -> IndexFreq {
        match self {
            SeriesIndex::Range { step, .. } => IndexFreq::Step(*step),
            SeriesIndex::Positions(_) => IndexFreq::Irregular,
            SeriesIndex::Datetime { freq: Some(f), .. } => IndexFreq::Datetime(*f),
            SeriesIndex::Datetime { freq: None, .. } => IndexFreq::Irregular,
        }
    }

    /// Sub-index `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<SeriesIndex> {
        if start > end {
            return Err(ForecastError::InvalidParameter(
                "start must be <= end".to_string(),
            ));
        }
        if end > self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: end,
            });
        }
        Ok(match self {
            SeriesIndex::Range {
                start: s, step, ..
            } => SeriesIndex::Range {
                start: s + step * start as i64,
                step: *step,
                len: end - start,
            },
            SeriesIndex::Positions(labels) => SeriesIndex::Positions(labels[start..end].to_vec()),
            SeriesIndex::Datetime { timestamps, freq } => SeriesIndex::Datetime {
                timestamps: timestamps[start..end].to_vec(),
                freq: *freq,
            },
        })
    }

    /// The `steps` labels that follow the last label of this index.
    pub fn future(&self, steps: usize) -> Result<SeriesIndex> {
        match self {
            SeriesIndex::Range { start, step, len } => Ok(SeriesIndex::Range {
                start: start + step * *len as i64,
                step: *step,
                len: steps,
            }),
            SeriesIndex::Positions(_) => Err(ForecastError::TimestampError(
                "cannot extend an index without a regular step".to_string(),
            )),
            SeriesIndex::Datetime { timestamps, freq } => {
                let freq = freq.ok_or_else(|| {
                    ForecastError::TimestampError(
                        "cannot extend a datetime index without a regular frequency".to_string(),
                    )
                })?;
                let last = timestamps.last().ok_or(ForecastError::EmptyData)?;
                let future = (1..=steps)
                    .map(|k| freq.advance(*last, k).ok_or_else(timestamp_overflow))
                    .collect::<Result<Vec<_>>>()?;
                Ok(SeriesIndex::Datetime {
                    timestamps: future,
                    freq: Some(freq),
                })
            }
        }
    }

    /// Whether [`future`](Self::future) can extend this index.
    pub fn is_extendable(&self) -> bool {
        !matches!(self.freq(), IndexFreq::Irregular)
    }

    /// Keep only the labels at the given positions.
    pub fn select(&self, positions: &[usize]) -> Result<SeriesIndex> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: bad + 1,
            });
        }
        match self {
            SeriesIndex::Range { .. } | SeriesIndex::Positions(_) => {
                let labels: Vec<i64> = positions
                    .iter()
                    .filter_map(|&p| match self.label(p) {
                        Some(IndexLabel::Position(v)) => Some(v),
                        _ => None,
                    })
                    .collect();
                Ok(positions_to_index(labels))
            }
            SeriesIndex::Datetime { timestamps, freq } => {
                let selected: Vec<DateTime<Utc>> =
                    positions.iter().map(|&p| timestamps[p]).collect();
                let freq = if selected.len() < 2 {
                    *freq
                } else {
                    infer_frequency(&selected)
                };
                Ok(SeriesIndex::Datetime {
                    timestamps: selected,
                    freq,
                })
            }
        }
    }
}

/// Range index when the labels share a positive step, explicit labels otherwise.
fn positions_to_index(labels: Vec<i64>) -> SeriesIndex {
    let step = match labels.as_slice() {
        [a, b, ..] => b - a,
        _ => 1,
    };
    let regular = step > 0 && labels.windows(2).all(|w| w[1] - w[0] == step);
    match labels.first() {
        Some(&start) if regular => SeriesIndex::Range {
            start,
            step,
            len: labels.len(),
        },
        None => SeriesIndex::positions(0),
        _ => SeriesIndex::Positions(labels),
    }
}

fn validate_increasing(timestamps: &[DateTime<Utc>]) -> Result<()> {
    if timestamps.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ForecastError::TimestampError(
            "timestamps must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

fn timestamp_overflow() -> ForecastError {
    ForecastError::TimestampError("timestamp out of range".to_string())
}

/// Calendar months when every label falls on them, otherwise the spacing
/// shared by every pair of consecutive timestamps, if any.
fn infer_frequency(timestamps: &[DateTime<Utc>]) -> Option<Frequency> {
    if let Some(freq) = infer_monthly(timestamps) {
        return Some(freq);
    }
    let first = timestamps.windows(2).next().map(|w| w[1] - w[0])?;
    timestamps
        .windows(2)
        .all(|w| w[1] - w[0] == first)
        .then_some(Frequency::Fixed(first))
}

fn month_number(t: &DateTime<Utc>) -> i64 {
    i64::from(t.year()) * 12 + i64::from(t.month0())
}

/// Calendar month frequency matching every label counted from the first one.
/// Month ends are tried first since day-of-month clamping also lands on them.
fn infer_monthly(timestamps: &[DateTime<Utc>]) -> Option<Frequency> {
    let (first, second) = (timestamps.first()?, timestamps.get(1)?);
    let n = u32::try_from(month_number(second) - month_number(first)).ok()?;
    if n == 0 {
        return None;
    }
    [Frequency::MonthEnds(n), Frequency::Months(n)]
        .into_iter()
        .find(|freq| {
            timestamps
                .iter()
                .enumerate()
                .all(|(k, t)| freq.advance(*first, k) == Some(*t))
        })
}

/// A named univariate time series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    name: String,
    index: SeriesIndex,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Create a series, validating that index and values have equal length.
    pub fn new(name: impl Into<String>, index: SeriesIndex, values: Vec<f64>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: index.len(),
                got: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            index,
            values,
        })
    }

    /// Series indexed by positions `0..n`.
    pub fn from_values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            index: SeriesIndex::positions(values.len()),
            values,
        }
    }

    /// Series with a range index starting at `start`.
    pub fn with_range(
        name: impl Into<String>,
        start: i64,
        step: i64,
        values: Vec<f64>,
    ) -> Result<Self> {
        let index = SeriesIndex::range(start, step, values.len())?;
        Self::new(name, index, values)
    }

    /// Series with a datetime index.
    pub fn with_timestamps(
        name: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
    ) -> Result<Self> {
        Self::new(name, SeriesIndex::datetime(timestamps)?, values)
    }

    /// Name of the series.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the series.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the series is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observed values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Index of the series.
    pub fn index(&self) -> &SeriesIndex {
        &self.index
    }

    /// Last index label.
    pub fn last_label(&self) -> Option<IndexLabel> {
        self.index.last_label()
    }

    /// Extract `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        let index = self.index.slice(start, end)?;
        Ok(TimeSeries {
            name: self.name.clone(),
            index,
            values: self.values[start..end].to_vec(),
        })
    }

    /// Last `n` observations (the whole series when shorter).
    pub fn tail(&self, n: usize) -> TimeSeries {
        let start = self.len().saturating_sub(n);
        TimeSeries {
            name: self.name.clone(),
            index: self
                .index
                .slice(start, self.len())
                .unwrap_or_else(|_| self.index.clone()),
            values: self.values[start..].to_vec(),
        }
    }

    /// Check if series has missing values (NaN or Inf).
    pub fn has_missing_values(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    /// Drop leading and trailing NaN values.
    pub fn trim_missing(&self) -> Result<TimeSeries> {
        let start = self.values.iter().position(|v| !v.is_nan());
        let end = self.values.iter().rposition(|v| !v.is_nan());
        match (start, end) {
            (Some(s), Some(e)) => self.slice(s, e + 1),
            _ => Err(ForecastError::MissingValues(format!(
                "series '{}' contains only missing values",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn daily(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    #[test]
    fn range_index_future_continues_after_last_label() {
        let index = SeriesIndex::positions(10);
        let future = index.future(3).unwrap();
        assert_eq!(future.first_label(), Some(IndexLabel::Position(10)));
        assert_eq!(future.last_label(), Some(IndexLabel::Position(12)));
    }

    #[test]
    fn datetime_index_infers_frequency() {
        let index = SeriesIndex::datetime(daily(5)).unwrap();
        assert_eq!(
            index.freq(),
            IndexFreq::Datetime(Frequency::Fixed(Duration::days(1)))
        );

        let future = index.future(2).unwrap();
        let expected = Utc.with_ymd_and_hms(2022, 1, 6, 0, 0, 0).unwrap();
        assert_eq!(future.first_label(), Some(IndexLabel::Timestamp(expected)));
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn month_start_index_is_extended_by_calendar_months() {
        let ts: Vec<DateTime<Utc>> = (0..36)
            .map(|i| utc(2020 + i / 12, (i % 12) as u32 + 1, 1))
            .collect();
        let index = SeriesIndex::datetime(ts).unwrap();
        assert_eq!(index.freq(), IndexFreq::Datetime(Frequency::Months(1)));
        assert!(index.is_extendable());

        let future = index.future(3).unwrap();
        assert_eq!(
            future.timestamps().unwrap(),
            &[utc(2023, 1, 1), utc(2023, 2, 1), utc(2023, 3, 1)]
        );
    }

    #[test]
    fn month_end_index_keeps_the_last_day() {
        let ts = vec![utc(2022, 1, 31), utc(2022, 2, 28), utc(2022, 3, 31)];
        let index = SeriesIndex::datetime(ts).unwrap();
        assert_eq!(index.freq(), IndexFreq::Datetime(Frequency::MonthEnds(1)));
        let future = index.future(2).unwrap();
        assert_eq!(
            future.timestamps().unwrap(),
            &[utc(2022, 4, 30), utc(2022, 5, 31)]
        );

        let spaced_31_days = vec![utc(2021, 11, 30), utc(2021, 12, 31), utc(2022, 1, 31)];
        let index = SeriesIndex::datetime(spaced_31_days).unwrap();
        assert_eq!(index.freq(), IndexFreq::Datetime(Frequency::MonthEnds(1)));
    }

    #[test]
    fn quarterly_and_yearly_indexes() {
        let quarters = SeriesIndex::date_range(utc(2020, 1, 1), Frequency::Months(3), 4).unwrap();
        assert_eq!(quarters.last_label(), Some(IndexLabel::Timestamp(utc(2020, 10, 1))));
        let inferred = SeriesIndex::datetime(quarters.timestamps().unwrap().to_vec()).unwrap();
        assert_eq!(inferred.freq(), IndexFreq::Datetime(Frequency::Months(3)));

        let years = SeriesIndex::datetime(vec![utc(2019, 6, 15), utc(2020, 6, 15), utc(2021, 6, 15)])
            .unwrap();
        assert_eq!(years.freq(), IndexFreq::Datetime(Frequency::Months(12)));
        assert_eq!(
            years.future(1).unwrap().first_label(),
            Some(IndexLabel::Timestamp(utc(2022, 6, 15)))
        );
    }

    #[test]
    fn invalid_frequency_rejected() {
        assert!(SeriesIndex::date_range(utc(2020, 1, 1), Frequency::Months(0), 3).is_err());
        assert!(SeriesIndex::date_range(utc(2020, 1, 1), Duration::zero(), 3).is_err());
    }

    #[test]
    fn irregular_datetime_index_cannot_be_extended() {
        let mut ts = daily(4);
        ts[3] += Duration::hours(5);
        let index = SeriesIndex::datetime(ts).unwrap();
        assert_eq!(index.freq(), IndexFreq::Irregular);
        assert!(!index.is_extendable());
        assert!(index.future(1).is_err());

        let months_and_a_day = vec![utc(2020, 1, 1), utc(2020, 2, 1), utc(2020, 3, 2)];
        assert!(!SeriesIndex::datetime(months_and_a_day).unwrap().is_extendable());
    }

    #[test]
    fn non_increasing_timestamps_rejected() {
        let mut ts = daily(3);
        ts.swap(0, 1);
        assert!(matches!(
            SeriesIndex::datetime(ts),
            Err(ForecastError::TimestampError(_))
        ));
    }

    #[test]
    fn slice_keeps_labels() {
        let series = TimeSeries::from_values("y", (0..10).map(|v| v as f64).collect());
        let sliced = series.slice(3, 6).unwrap();
        assert_eq!(sliced.values(), &[3.0, 4.0, 5.0]);
        assert_eq!(sliced.index().first_label(), Some(IndexLabel::Position(3)));
    }

    #[test]
    fn tail_returns_last_values() {
        let series = TimeSeries::from_values("y", (0..20).map(|v| v as f64).collect());
        let tail = series.tail(3);
        assert_eq!(tail.values(), &[17.0, 18.0, 19.0]);
        assert_eq!(tail.last_label(), Some(IndexLabel::Position(19)));
    }

    #[test]
    fn trim_missing_drops_edges() {
        let series = TimeSeries::from_values("y", vec![f64::NAN, 1.0, 2.0, f64::NAN]);
        let trimmed = series.trim_missing().unwrap();
        assert_eq!(trimmed.values(), &[1.0, 2.0]);
        assert_eq!(trimmed.index().first_label(), Some(IndexLabel::Position(1)));
    }

    #[test]
    fn label_display_formats_timestamp() {
        let label = IndexLabel::Timestamp(Utc.with_ymd_and_hms(2020, 2, 19, 0, 0, 0).unwrap());
        assert_eq!(label.to_string(), "2020-02-19 00:00:00");
    }

    #[test]
    fn select_keeps_range_when_evenly_spaced() {
        let index = SeriesIndex::positions(10).future(5).unwrap();
        let even = index.select(&[0, 2, 4]).unwrap();
        assert_eq!(even, SeriesIndex::Range { start: 10, step: 2, len: 3 });

        let uneven = index.select(&[0, 2, 3]).unwrap();
        assert_eq!(uneven, SeriesIndex::Positions(vec![10, 12, 13]));
        assert!(uneven.future(1).is_err());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let result = TimeSeries::new("y", SeriesIndex::positions(3), vec![1.0, 2.0]);
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { .. })
        ));
    }
}
