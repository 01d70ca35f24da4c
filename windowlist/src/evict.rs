use std::collections::HashMap;

use crate::{KeyRange, ListOptions, Query, Range, RenderPlan};

/// Tracks how long each laid-out item has been fully outside the buffer zone.
///
/// Time is passed in explicitly (milliseconds on any monotonic clock) so the tracker stays
/// independent of the runtime.
#[derive(Clone, Debug, Default)]
pub struct EvictionTracker {
    outside_since: HashMap<String, u64>,
}

impl EvictionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates candidates from `plan`.
    ///
    /// Items back inside the buffer zone (or no longer laid out) lose their candidacy; items
    /// that stayed outside keep their original timestamp.
    pub fn observe(&mut self, plan: &RenderPlan, options: &ListOptions, now_ms: u64) {
        let zone = plan.buffer_zone(options);
        let mut outside = HashMap::new();
        for item in plan.items() {
            if zone.intersects(&item.range()) {
                continue;
            }
            let since = self.outside_since.get(&item.key).copied().unwrap_or(now_ms);
            outside.insert(item.key.clone(), since);
        }
        self.outside_since = outside;
    }

    /// Number of items currently outside the buffer zone, ripe or not.
    pub fn len(&self) -> usize {
        self.outside_since.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outside_since.is_empty()
    }

    pub fn clear(&mut self) {
        self.outside_since.clear();
    }

    pub fn is_evictable(&self, key: &str, options: &ListOptions, now_ms: u64) -> bool {
        self.outside_since
            .get(key)
            .is_some_and(|&since| now_ms.saturating_sub(since) >= options.eviction_delay_ms)
    }

    pub fn evictable_count(&self, options: &ListOptions, now_ms: u64) -> usize {
        self.outside_since
            .values()
            .filter(|&&since| now_ms.saturating_sub(since) >= options.eviction_delay_ms)
            .count()
    }

    /// When the earliest candidate becomes evictable.
    pub fn next_ripe_ms(&self, options: &ListOptions) -> Option<u64> {
        self.outside_since
            .values()
            .min()
            .map(|&since| since.saturating_add(options.eviction_delay_ms))
    }

    /// Builds a query that shrinks the window to the retained span, if enough items are ripe.
    ///
    /// The retained span runs from the first to the last non-evictable item, widened by one
    /// item on each side. Items at a sticky edge are never evicted.
    pub fn eviction_query(
        &self,
        plan: &RenderPlan,
        options: &ListOptions,
        now_ms: u64,
    ) -> Option<Query> {
        if plan.has_unmeasured_items() {
            return None;
        }
        let items = plan.items();
        let last_index = items.len().checked_sub(1)?;
        let mut keep: Vec<bool> = items
            .iter()
            .map(|item| !self.is_evictable(&item.key, options, now_ms))
            .collect();
        if plan.is_start_aligned() {
            keep[0] = true;
        }
        if plan.is_end_aligned() {
            keep[last_index] = true;
        }

        let first = keep.iter().position(|&k| k)?.saturating_sub(1);
        let last = (keep.iter().rposition(|&k| k)? + 1).min(last_index);
        let retained = last - first + 1;
        let evicted = items.len() - retained;
        if evicted < options.eviction_threshold.max(1) {
            return None;
        }

        vdebug!(evict, evicted, retained, "shrinking window");
        let key_range = KeyRange::new(items[first].key.as_str(), items[last].key.as_str());
        let retained_weight = plan
            .window()
            .items()
            .filter(|item| key_range.contains(item.key()))
            .map(|item| u64::from(item.count_as()))
            .sum();
        Some(Query {
            key_range: Some(key_range),
            coordinate_range: Range::new(items[first].start, items[last].end),
            expand_start: 0,
            expand_end: 0,
            expected_count: Some(retained_weight),
            evict: true,
        })
    }
}
