use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Sub};

use serde::Deserialize;

use super::Violation;
use crate::lnrpc::ChannelEdge;

/// Numeric types a range bound can be applied to.
pub trait Number:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Div<Output = Self>
    + fmt::Display
{
    const ZERO: Self;

    /// Conversion used when dividing by element counts.
    fn from_count(count: usize) -> Self;
}

macro_rules! impl_number {
    ($($t:ty),* $(,)?) => {$(
        impl Number for $t {
            const ZERO: Self = 0 as $t;

            fn from_count(count: usize) -> Self {
                count as $t
            }
        }
    )*};
}

impl_number!(u32, u64, i32, i64, f64);

/// Inclusive limits a value must fall within. An unset bound does not
/// constrain, so a range with neither bound always passes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Range<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: Number> Range<T> {
    /// Returns whether the value is within the range.
    pub fn contains(&self, value: T) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }

    /// Clause describing why a value was not in the range.
    pub fn reason(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("is not between {min} and {max}"),
            (Some(min), None) => format!("is lower than {min}"),
            (None, Some(max)) => format!("is higher than {max}"),
            (None, None) => String::new(),
        }
    }
}

/// Aggregation applied to a list of samples before bounds checking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Average of the samples.
    #[default]
    Mean,
    /// Middle value of the ordered samples.
    Median,
    /// Most frequent sample.
    Mode,
    /// Difference between the largest and smallest sample.
    Range,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Mean => "mean",
            Operation::Median => "median",
            Operation::Mode => "mode",
            Operation::Range => "range",
        };
        f.write_str(name)
    }
}

/// Like [`Range`] but applied to the aggregate of multiple samples,
/// one per channel edge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatRange<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    #[serde(default)]
    pub operation: Operation,
}

impl<T: Number> StatRange<T> {
    fn bounds(&self) -> Range<T> {
        Range {
            min: self.min,
            max: self.max,
        }
    }

    /// Returns whether the aggregated value is within the range.
    pub fn contains(&self, values: Vec<T>) -> bool {
        let value = match self.operation {
            Operation::Mean => mean(&values),
            Operation::Median => median(values),
            Operation::Mode => mode(values),
            Operation::Range => range_op(values),
        };
        self.bounds().contains(value)
    }

    /// Clause describing why the aggregate was not in the range.
    pub fn reason(&self) -> String {
        format!("{} value {}", self.operation, self.bounds().reason())
    }
}

/// An unset rule is a pass.
pub fn check<T: Number>(range: &Option<Range<T>>, value: T) -> bool {
    range.as_ref().map_or(true, |r| r.contains(value))
}

/// Samples one value per channel edge and checks the aggregate. An
/// unset rule is a pass.
pub fn check_stat<T, F>(range: &Option<StatRange<T>>, channels: &[ChannelEdge], f: F) -> bool
where
    T: Number,
    F: Fn(&ChannelEdge) -> T,
{
    let Some(range) = range else {
        return true;
    };

    range.contains(channels.iter().map(f).collect())
}

/// Builds the field-prefixed violation for a failed scalar check.
pub(crate) fn ensure<T: Number>(
    range: &Option<Range<T>>,
    value: T,
    field: &str,
) -> Result<(), Violation> {
    if check(range, value) {
        return Ok(());
    }

    let reason = range.as_ref().map(Range::reason).unwrap_or_default();
    Err(Violation::new(format!("{field} {reason}")))
}

/// Builds the field-prefixed violation for a failed aggregate check.
pub(crate) fn ensure_stat<T, F>(
    range: &Option<StatRange<T>>,
    channels: &[ChannelEdge],
    field: &str,
    f: F,
) -> Result<(), Violation>
where
    T: Number,
    F: Fn(&ChannelEdge) -> T,
{
    if check_stat(range, channels, f) {
        return Ok(());
    }

    let reason = range.as_ref().map(StatRange::reason).unwrap_or_default();
    Err(Violation::new(format!("{field} {reason}")))
}

fn sort_samples<T: Number>(values: &mut [T]) {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

fn mean<T: Number>(values: &[T]) -> T {
    if values.is_empty() {
        return T::ZERO;
    }

    let mut sum = T::ZERO;
    for &v in values {
        sum = sum + v;
    }

    sum / T::from_count(values.len())
}

fn median<T: Number>(mut values: Vec<T>) -> T {
    if values.is_empty() {
        return T::ZERO;
    }
    sort_samples(&mut values);

    let len = values.len();
    if len % 2 == 0 {
        return (values[len / 2 - 1] + values[len / 2]) / T::from_count(2);
    }

    values[len / 2]
}

/// Most frequent sample. Ties resolve to the smallest tied value so
/// the outcome does not depend on input order.
fn mode<T: Number>(mut values: Vec<T>) -> T {
    if values.is_empty() {
        return T::ZERO;
    }
    sort_samples(&mut values);

    let mut best = values[0];
    let mut best_count = 0;
    let mut current = values[0];
    let mut count = 0;

    for &v in &values {
        if v == current {
            count += 1;
        } else {
            current = v;
            count = 1;
        }
        if count > best_count {
            best = current;
            best_count = count;
        }
    }

    best
}

fn range_op<T: Number>(mut values: Vec<T>) -> T {
    if values.len() < 2 {
        return T::ZERO;
    }
    sort_samples(&mut values);

    values[values.len() - 1] - values[0]
}
