use crate::{Edge, Range};

/// Configuration shared by the render-plan engine, the query builder and eviction tracking.
///
/// All sizes are in the same unit the renderer reports item sizes in (usually CSS pixels or
/// terminal rows).
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`, so it can be
/// loaded from whatever configuration format the host application uses.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ListOptions {
    /// Virtual space reserved before the first loaded item while the dataset start is not
    /// loaded (and after the last one while the dataset end is not loaded).
    pub spacer_size: f64,

    /// The load zone is the viewport grown by `viewport_size * load_zone_multiplier` on each
    /// side. Values below `1` are treated as `1`.
    pub load_zone_multiplier: f64,

    /// Items entirely outside the viewport grown by `viewport_size * buffer_zone_multiplier`
    /// become eviction candidates. Never smaller than the load zone multiplier.
    pub buffer_zone_multiplier: f64,

    /// Upper bound on `expand_start`/`expand_end` of a single query.
    pub max_expansion: u64,

    /// The edge a short list sticks to, and the edge the first load starts from.
    pub preferred_edge: Edge,

    /// Viewport changes smaller than this are not treated as user scrolls.
    pub scroll_epsilon: f64,

    /// Distance to a dataset edge within which the viewport counts as aligned to it.
    pub sticky_edge_epsilon: f64,

    /// Item size estimate used before any item was measured.
    pub default_item_size: f64,
    pub item_size_reset_threshold: u64,
    pub item_size_reset_count: u64,
    pub response_reset_threshold: u64,
    pub response_reset_count: u64,
    /// Lower clamp for the fulfillment ratio, bounding how much requests get inflated.
    pub min_fulfillment_ratio: f64,

    /// Minimum number of evictable items before an eviction query is issued.
    pub eviction_threshold: usize,
    /// How long an item must stay outside the buffer zone before it may be evicted.
    pub eviction_delay_ms: u64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            spacer_size: 8640.0,
            load_zone_multiplier: 3.0,
            buffer_zone_multiplier: 6.0,
            max_expansion: 200,
            preferred_edge: Edge::End,
            scroll_epsilon: 0.01,
            sticky_edge_epsilon: 8.0,
            default_item_size: 50.0,
            item_size_reset_threshold: 1000,
            item_size_reset_count: 100,
            response_reset_threshold: 1000,
            response_reset_count: 100,
            min_fulfillment_ratio: 0.05,
            eviction_threshold: 50,
            eviction_delay_ms: 2000,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spacer_size(mut self, spacer_size: f64) -> Self {
        self.spacer_size = spacer_size.max(0.0);
        self
    }

    pub fn with_load_zone_multiplier(mut self, multiplier: f64) -> Self {
        self.load_zone_multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_buffer_zone_multiplier(mut self, multiplier: f64) -> Self {
        self.buffer_zone_multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_expansion(mut self, max_expansion: u64) -> Self {
        self.max_expansion = max_expansion;
        self
    }

    pub fn with_preferred_edge(mut self, edge: Edge) -> Self {
        self.preferred_edge = edge;
        self
    }

    pub fn with_scroll_epsilon(mut self, epsilon: f64) -> Self {
        self.scroll_epsilon = epsilon.max(0.0);
        self
    }

    pub fn with_sticky_edge_epsilon(mut self, epsilon: f64) -> Self {
        self.sticky_edge_epsilon = epsilon.max(0.0);
        self
    }

    pub fn with_default_item_size(mut self, size: f64) -> Self {
        self.default_item_size = size;
        self
    }

    pub fn with_item_size_reset(mut self, threshold: u64, reset_count: u64) -> Self {
        self.item_size_reset_threshold = threshold;
        self.item_size_reset_count = reset_count;
        self
    }

    pub fn with_response_reset(mut self, threshold: u64, reset_count: u64) -> Self {
        self.response_reset_threshold = threshold;
        self.response_reset_count = reset_count;
        self
    }

    pub fn with_min_fulfillment_ratio(mut self, ratio: f64) -> Self {
        self.min_fulfillment_ratio = ratio;
        self
    }

    pub fn with_eviction(mut self, threshold: usize, delay_ms: u64) -> Self {
        self.eviction_threshold = threshold;
        self.eviction_delay_ms = delay_ms;
        self
    }

    pub(crate) fn load_zone(&self, viewport: Range) -> Range {
        viewport.expanded(viewport.size().max(0.0) * self.load_zone_multiplier.max(1.0))
    }

    pub(crate) fn buffer_zone(&self, viewport: Range) -> Range {
        let multiplier = self
            .buffer_zone_multiplier
            .max(self.load_zone_multiplier)
            .max(1.0);
        viewport.expanded(viewport.size().max(0.0) * multiplier)
    }
}
