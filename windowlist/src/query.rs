use crate::{Edge, KeyRange, ListOptions, Range, RenderPlan, Statistics, Window};

/// A request to grow (or, with `evict`, shrink) the loaded window.
///
/// `coordinate_range` is the loaded span in plan coordinates at the time the query was built;
/// `key_range` is the same span in key space. Expansions are item counts beyond each end.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Query {
    /// `None` for the initial query of an empty window.
    pub key_range: Option<KeyRange>,
    pub coordinate_range: Range,
    pub expand_start: u64,
    pub expand_end: u64,
    /// Dataset entries (see [`Item::count_as`](crate::Item::count_as)) the window should hold
    /// once the query is fulfilled.
    pub expected_count: Option<u64>,
    /// Items outside `key_range` should be dropped from the window.
    pub evict: bool,
}

impl Query {
    /// The first query of an empty window: `count` items from `edge`.
    pub fn initial(edge: Edge, count: u64) -> Self {
        let (expand_start, expand_end) = match edge {
            Edge::Start => (0, count),
            Edge::End => (count, 0),
        };
        Self {
            key_range: None,
            coordinate_range: Range::default(),
            expand_start,
            expand_end,
            expected_count: Some(count),
            evict: false,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.key_range.is_none()
    }

    /// Total number of items requested beyond the current key range.
    pub fn expansion(&self) -> u64 {
        self.expand_start.saturating_add(self.expand_end)
    }
}

/// Decides whether the current plan needs more data and remembers the last issued query.
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    last: Option<Query>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the next query for `plan`, or `None` when nothing should be fetched.
    ///
    /// A query structurally equal to the previously issued one is suppressed.
    pub fn build(
        &mut self,
        plan: &RenderPlan,
        statistics: &Statistics,
        options: &ListOptions,
    ) -> Option<Query> {
        let query = Self::compute(plan, statistics, options)?;
        self.issue(query)
    }

    /// Records `query` as issued unless it repeats the last one.
    pub fn issue(&mut self, query: Query) -> Option<Query> {
        if self.last.as_ref() == Some(&query) {
            vtrace!(query, "suppressing repeated query");
            return None;
        }
        self.last = Some(query.clone());
        Some(query)
    }

    /// Computes the query `plan` calls for, ignoring what was issued before.
    pub fn compute(
        plan: &RenderPlan,
        statistics: &Statistics,
        options: &ListOptions,
    ) -> Option<Query> {
        let window = plan.window();
        if window.has_all() {
            return None;
        }
        if window.is_empty() {
            let count = expansion_for(options.spacer_size, statistics, options).max(1);
            return Some(Query::initial(options.preferred_edge, count));
        }
        // Unmeasured items have no coordinates yet; wait for their sizes.
        if plan.has_unmeasured_items() {
            return None;
        }

        let loaded = plan.loaded_range()?;
        let zone = plan.trimmed_load_zone(plan.viewport(), options)?;
        let mut expand_start = expansion_for(loaded.start - zone.start, statistics, options);
        let mut expand_end = expansion_for(zone.end - loaded.end, statistics, options);
        // While following the edge new items arrive at, keep asking for them.
        match plan.sticky_edge() {
            Some(Edge::Start) if options.preferred_edge == Edge::Start => {
                expand_start = options.max_expansion;
            }
            Some(Edge::End) if options.preferred_edge == Edge::End => {
                expand_end = options.max_expansion;
            }
            _ => {}
        }
        if expand_start == 0 && expand_end == 0 {
            return None;
        }

        let query = Query {
            key_range: window.key_range(),
            coordinate_range: loaded,
            expand_start,
            expand_end,
            expected_count: Some(
                window
                    .weight()
                    .saturating_add(expand_start)
                    .saturating_add(expand_end),
            ),
            evict: false,
        };
        vdebug!(
            query,
            expand_start,
            expand_end,
            zone_start = zone.start,
            zone_end = zone.end,
            "expansion needed"
        );
        Some(query)
    }

    pub fn last_query(&self) -> Option<&Query> {
        self.last.as_ref()
    }

    /// Lets the next identical query through (e.g. after a failed fetch).
    pub fn forget_last(&mut self) {
        self.last = None;
    }
}

/// Converts a coordinate gap into an item count, corrected for under-delivery.
fn expansion_for(gap: f64, statistics: &Statistics, options: &ListOptions) -> u64 {
    if gap.is_nan() || gap <= 0.0 {
        return 0;
    }
    let items = (gap / statistics.item_size_estimate()).ceil();
    let inflated = (items / statistics.fulfillment_ratio()).ceil();
    inflated.min(options.max_expansion as f64) as u64
}

/// Feeds the fulfillment ratio with what a fetch for `query` actually delivered.
///
/// Delivered items are weighed by [`Item::count_as`](crate::Item::count_as). Sides where the dataset boundary was reached are skipped: a short answer there says nothing
/// about the data source.
pub fn record_response(query: &Query, window: &Window, statistics: &mut Statistics) {
    if query.evict {
        return;
    }
    let (fulfilled_start, fulfilled_end) = match &query.key_range {
        None => {
            let total = window.weight();
            if query.expand_start > 0 {
                (total, 0)
            } else {
                (0, total)
            }
        }
        Some(range) => {
            let before = window
                .items()
                .take_while(|item| item.key() < range.start.as_str())
                .map(|item| u64::from(item.count_as()))
                .sum::<u64>();
            let after = window
                .items_rev()
                .take_while(|item| item.key() > range.end.as_str())
                .map(|item| u64::from(item.count_as()))
                .sum::<u64>();
            (before, after)
        }
    };
    if !window.has_start() {
        statistics.add_response(fulfilled_start.min(query.expand_start), query.expand_start);
    }
    if !window.has_end() {
        statistics.add_response(fulfilled_end.min(query.expand_end), query.expand_end);
    }
}
