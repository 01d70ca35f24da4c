use core::fmt;

/// An interval on the virtual scroll axis.
///
/// All coordinates are relative to the top of the first laid-out item; the lead-in spacer
/// occupies `[-spacer_size, 0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    pub start: f64,
    pub end: f64,
}

impl Range {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn size(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns `true` when the two ranges share a non-empty interval.
    pub fn intersects(&self, other: &Range) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn moved(self, delta: f64) -> Self {
        Self::new(self.start + delta, self.end + delta)
    }

    /// Grows the range by `amount` on both sides.
    pub fn expanded(self, amount: f64) -> Self {
        Self::new(self.start - amount, self.end + amount)
    }

    pub fn approx_eq(&self, other: &Range, epsilon: f64) -> bool {
        (self.start - other.start).abs() <= epsilon && (self.end - other.end).abs() <= epsilon
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.1}, {:.1})", self.start, self.end)
    }
}

/// An inclusive range of item keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyRange {
    pub start: String,
    pub end: String,
}

impl KeyRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.start.as_str() <= key && key <= self.end.as_str()
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} ..= {}]", self.start, self.end)
    }
}

/// One end of the dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Edge {
    Start,
    #[default]
    End,
}
