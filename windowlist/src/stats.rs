use crate::ListOptions;

/// A weighted running average that periodically rescales itself.
///
/// Once `count` exceeds `reset_threshold`, both `sum` and `count` are scaled down so that
/// `count == reset_count`. The average is preserved exactly, but new samples weigh more,
/// which lets the estimate follow drift without unbounded history.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunningAverage {
    sum: f64,
    count: f64,
    reset_threshold: f64,
    reset_count: f64,
}

impl RunningAverage {
    pub fn new(reset_threshold: u64, reset_count: u64) -> Self {
        let reset_threshold = reset_threshold.max(1) as f64;
        Self {
            sum: 0.0,
            count: 0.0,
            reset_threshold,
            reset_count: (reset_count.max(1) as f64).min(reset_threshold),
        }
    }

    pub fn add(&mut self, value: f64, weight: f64) {
        self.sum += value;
        self.count += weight;
        if self.count > self.reset_threshold {
            let scale = self.reset_count / self.count;
            self.sum *= scale;
            self.count = self.reset_count;
        }
    }

    pub fn remove(&mut self, value: f64, weight: f64) {
        if self.count <= weight {
            self.sum = 0.0;
            self.count = 0.0;
            return;
        }
        self.sum -= value;
        self.count -= weight;
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    /// Returns `None` until at least one sample was recorded.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0.0).then(|| self.sum / self.count)
    }
}

/// Feedback used to size fetch requests.
///
/// Tracks the average item size (to convert pixel gaps into item counts) and the ratio of
/// requested vs. delivered items (to compensate for data sources that return less than asked).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    item_size: RunningAverage,
    response: RunningAverage,
    default_item_size: f64,
    min_fulfillment_ratio: f64,
}

impl Statistics {
    pub fn new(options: &ListOptions) -> Self {
        Self {
            item_size: RunningAverage::new(
                options.item_size_reset_threshold,
                options.item_size_reset_count,
            ),
            response: RunningAverage::new(
                options.response_reset_threshold,
                options.response_reset_count,
            ),
            default_item_size: options.default_item_size.max(f64::MIN_POSITIVE),
            min_fulfillment_ratio: options.min_fulfillment_ratio.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    pub fn add_item_size(&mut self, size: f64) {
        self.add_weighted_item_size(size, 1);
    }

    pub fn remove_item_size(&mut self, size: f64) {
        self.remove_weighted_item_size(size, 1);
    }

    /// Records an item that stands for `count_as` dataset entries.
    pub fn add_weighted_item_size(&mut self, size: f64, count_as: u32) {
        if !size.is_finite() || size < 0.0 {
            vwarn!(stats, size, "ignoring invalid item size");
            return;
        }
        self.item_size.add(size, f64::from(count_as.max(1)));
    }

    pub fn remove_weighted_item_size(&mut self, size: f64, count_as: u32) {
        if !size.is_finite() || size < 0.0 {
            return;
        }
        self.item_size.remove(size, f64::from(count_as.max(1)));
    }

    /// Records that a request for `requested` items delivered `fulfilled` of them.
    pub fn add_response(&mut self, fulfilled: u64, requested: u64) {
        if requested == 0 {
            return;
        }
        vtrace!(stats, fulfilled, requested, "response recorded");
        self.response.add(fulfilled as f64, requested as f64);
    }

    /// Average item size; falls back to the configured default without samples.
    pub fn item_size_estimate(&self) -> f64 {
        match self.item_size.value() {
            Some(size) if size > 0.0 => size,
            _ => self.default_item_size,
        }
    }

    /// Delivered / requested, clamped to `[min_fulfillment_ratio, 1]`; `1` without samples.
    pub fn fulfillment_ratio(&self) -> f64 {
        self.response
            .value()
            .map_or(1.0, |r| r.clamp(self.min_fulfillment_ratio, 1.0))
    }

    pub fn item_size_samples(&self) -> f64 {
        self.item_size.count()
    }

    pub fn response_samples(&self) -> f64 {
        self.response.count()
    }
}
