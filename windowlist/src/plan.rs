use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{Edge, ListOptions, Range, Statistics, Window};

/// The laid-out position of one measured item.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemRange {
    pub key: String,
    pub start: f64,
    pub end: f64,
}

impl ItemRange {
    pub fn size(&self) -> f64 {
        self.end - self.start
    }

    pub fn range(&self) -> Range {
        Range::new(self.start, self.end)
    }
}

/// What the renderer observed after painting a plan.
///
/// `render_index` is the index of the plan the state was measured against; states for any
/// other plan are stale.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientState {
    pub render_index: u64,
    pub scroll_top: Option<f64>,
    pub viewport_height: Option<f64>,
    /// Freshly measured sizes, keyed by item key.
    pub measured_sizes: HashMap<String, f64>,
    /// The renderer can reposition the scroll offset right now without a visible glitch
    /// (e.g. no scroll gesture or inertia in progress).
    pub is_safe_to_scroll: bool,
}

impl ClientState {
    pub fn new(render_index: u64) -> Self {
        Self {
            render_index,
            ..Self::default()
        }
    }

    pub fn with_scroll(mut self, scroll_top: f64, viewport_height: f64) -> Self {
        self.scroll_top = Some(scroll_top);
        self.viewport_height = Some(viewport_height);
        self
    }

    pub fn with_size(mut self, key: impl Into<String>, size: f64) -> Self {
        self.measured_sizes.insert(key.into(), size);
        self
    }

    pub fn with_sizes<I, K>(mut self, sizes: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.measured_sizes
            .extend(sizes.into_iter().map(|(k, s)| (k.into(), s)));
        self
    }

    pub fn with_safe_to_scroll(mut self, is_safe_to_scroll: bool) -> Self {
        self.is_safe_to_scroll = is_safe_to_scroll;
        self
    }

    /// The viewport in plan coordinates, given the spacer size the renderer painted with.
    pub fn viewport(&self, spacer_size: f64) -> Option<Range> {
        let scroll_top = self.scroll_top?;
        let height = self.viewport_height?.max(0.0);
        let start = scroll_top - spacer_size;
        Some(Range::new(start, start + height))
    }

    /// Folds a newer report for the same plan into this one.
    ///
    /// Scroll values and the safety flag are replaced; measured sizes are unioned.
    pub fn merge(&mut self, newer: ClientState) {
        self.render_index = newer.render_index;
        if newer.scroll_top.is_some() {
            self.scroll_top = newer.scroll_top;
        }
        if newer.viewport_height.is_some() {
            self.viewport_height = newer.viewport_height;
        }
        self.measured_sizes.extend(newer.measured_sizes);
        self.is_safe_to_scroll = newer.is_safe_to_scroll;
    }
}

/// One immutable, fully laid-out snapshot ready to be painted.
///
/// A plan is derived from exactly one [`Window`] and at most one [`ClientState`]. It is never
/// updated in place: [`RenderPlan::next`] produces its successor.
///
/// Coordinates:
/// - measured items are laid out gap-free starting at `0` (the top of the first laid-out item);
/// - the lead-in spacer occupies `[-spacer_size, 0)`;
/// - the renderer's scroll offset is `viewport.start + spacer_size`.
///
/// Unmeasured items have no range. The renderer is expected to paint them somewhere it can
/// measure them (outside the visible list) and report their sizes back.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPlan {
    pub(crate) render_index: u64,
    pub(crate) window: Arc<Window>,
    pub(crate) items: Vec<ItemRange>,
    pub(crate) index_by_key: HashMap<String, usize>,
    pub(crate) unmeasured_keys: Vec<String>,
    /// Keys whose current size was measured by the client and fed into [`Statistics`].
    pub(crate) recorded_sizes: HashSet<String>,
    pub(crate) viewport: Range,
    pub(crate) spacer_size: f64,
    pub(crate) end_spacer_size: f64,
    pub(crate) is_start_aligned: bool,
    pub(crate) is_end_aligned: bool,
    pub(crate) is_user_scroll_detected: bool,
    pub(crate) must_scroll: bool,
    pub(crate) notify_when_safe_to_scroll: bool,
    pub(crate) applied_scroll_to_key: Option<String>,
}

impl RenderPlan {
    /// Builds the first plan (`render_index == 1`).
    pub fn new(
        window: Arc<Window>,
        client: Option<&ClientState>,
        statistics: &mut Statistics,
        options: &ListOptions,
    ) -> Self {
        Self::build(None, 1, window, client, statistics, options)
    }

    /// Builds the successor of this plan for `window` and the latest client report.
    ///
    /// Freshly measured sizes are fed into `statistics`.
    pub fn next(
        &self,
        window: Arc<Window>,
        client: Option<&ClientState>,
        statistics: &mut Statistics,
        options: &ListOptions,
    ) -> Self {
        Self::build(
            Some(self),
            self.render_index.saturating_add(1),
            window,
            client,
            statistics,
            options,
        )
    }

    fn build(
        prev: Option<&RenderPlan>,
        render_index: u64,
        window: Arc<Window>,
        client: Option<&ClientState>,
        statistics: &mut Statistics,
        options: &ListOptions,
    ) -> Self {
        let Layout {
            items,
            unmeasured_keys,
            recorded_sizes,
            anchor,
        } = lay_out(prev, &window, client, statistics);
        let index_by_key = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.key.clone(), i))
            .collect();
        let ideal_spacer = ideal_spacer_size(&window, options);
        let end_spacer_size = if window.has_end() {
            0.0
        } else {
            options.spacer_size
        };

        let mut plan = RenderPlan {
            render_index,
            items,
            index_by_key,
            unmeasured_keys,
            recorded_sizes,
            viewport: prev.map_or_else(Range::default, |p| p.viewport),
            spacer_size: prev.map_or(ideal_spacer, |p| p.spacer_size),
            end_spacer_size,
            is_start_aligned: false,
            is_end_aligned: false,
            is_user_scroll_detected: false,
            must_scroll: false,
            notify_when_safe_to_scroll: false,
            applied_scroll_to_key: prev.and_then(|p| p.applied_scroll_to_key.clone()),
            window,
        };

        if plan.window.is_empty() {
            plan.viewport = Range::default();
            plan.spacer_size = ideal_spacer;
            vtrace!(plan, render_index, "empty window");
            return plan;
        }

        plan.update_viewport(prev, client, anchor, options);
        if plan.items.is_empty() {
            // Everything is still being measured; there is nothing to align to.
            return plan;
        }
        plan.update_alignment(prev, options);
        plan.update_spacer(client, options);

        vtrace!(
            plan,
            render_index,
            viewport_start = plan.viewport.start,
            viewport_end = plan.viewport.end,
            spacer_size = plan.spacer_size,
            must_scroll = plan.must_scroll,
            "plan built"
        );
        plan
    }

    fn update_viewport(
        &mut self,
        prev: Option<&RenderPlan>,
        client: Option<&ClientState>,
        anchor: Option<Anchor>,
        options: &ListOptions,
    ) {
        self.is_user_scroll_detected = prev.is_none_or(|p| p.items.is_empty());
        let painted_spacer = prev.map_or(self.spacer_size, |p| p.spacer_size);
        if let Some(viewport) = client.and_then(|c| c.viewport(painted_spacer)) {
            if !self.viewport.approx_eq(&viewport, options.scroll_epsilon) {
                self.is_user_scroll_detected = true;
            }
            self.viewport = viewport;
        }

        let Some(prev) = prev else {
            return;
        };
        let expansion = anchor.map(|a| self.items[a.index].start - a.old_start);
        match expansion {
            Some(delta) => {
                self.viewport = self.viewport.moved(delta);
                if delta <= self.spacer_size {
                    self.spacer_size -= delta;
                } else {
                    vdebug!(
                        plan,
                        delta,
                        spacer_size = self.spacer_size,
                        "expansion exceeds spacer"
                    );
                    self.must_scroll = true;
                }
            }
            None if !prev.items.is_empty() && !self.items.is_empty() => {
                vdebug!(plan, "no common items, resetting viewport");
                self.viewport = Range::new(0.0, self.viewport.size());
                self.must_scroll = true;
            }
            None => {}
        }
    }

    fn update_alignment(&mut self, prev: Option<&RenderPlan>, options: &ListOptions) {
        let has_start = self.window.has_start();
        let has_end = self.window.has_end();
        let items_end = self.items_end();
        let first_layout = prev.is_none_or(|p| p.items.is_empty());

        if let Some(prev) = prev {
            self.is_start_aligned = prev.is_start_aligned;
            self.is_end_aligned = prev.is_end_aligned;
        }
        if self.is_user_scroll_detected {
            let eps = options.sticky_edge_epsilon;
            let prefers_start = first_layout && options.preferred_edge == Edge::Start;
            let prefers_end = first_layout && options.preferred_edge == Edge::End;
            self.is_start_aligned = self.viewport.start <= eps || prefers_start;
            self.is_end_aligned = self.viewport.end >= items_end - eps || prefers_end;
        }
        self.is_start_aligned &= has_start;
        self.is_end_aligned &= has_end;
        if self.is_start_aligned && self.is_end_aligned {
            match options.preferred_edge {
                Edge::Start => self.is_end_aligned = false,
                Edge::End => self.is_start_aligned = false,
            }
        }

        if let Some(key) = self.window.scroll_to_key().map(str::to_owned) {
            let already_applied = self.applied_scroll_to_key.as_deref() == Some(key.as_str());
            let start = self.item(&key).map(|item| item.start);
            if let Some(start) = start.filter(|_| !already_applied) {
                vdebug!(plan, key = key.as_str(), start, "scrolling to key");
                self.viewport = Range::new(start, start + self.viewport.size());
                self.is_start_aligned = false;
                self.is_end_aligned = false;
                self.must_scroll = true;
                self.applied_scroll_to_key = Some(key);
            }
        }

        let just_got_first_item = has_start && prev.is_some_and(|p| !p.window.has_start());
        self.must_scroll |= just_got_first_item || self.is_start_aligned || self.is_end_aligned;

        let size = self.viewport.size();
        if self.is_start_aligned {
            self.viewport = Range::new(0.0, size);
        } else if self.is_end_aligned {
            self.viewport = Range::new(items_end - size, items_end);
        }
    }

    fn update_spacer(&mut self, client: Option<&ClientState>, options: &ListOptions) {
        let ideal = ideal_spacer_size(&self.window, options);
        if self.must_scroll {
            self.spacer_size = ideal;
            return;
        }
        if (self.spacer_size - ideal).abs() <= options.spacer_size / 2.0 {
            return;
        }
        if client.is_some_and(|c| c.is_safe_to_scroll) {
            self.spacer_size = ideal;
            self.must_scroll = true;
        } else {
            self.notify_when_safe_to_scroll = true;
        }
    }

    pub fn render_index(&self) -> u64 {
        self.render_index
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Laid-out (measured) items in key order.
    pub fn items(&self) -> &[ItemRange] {
        &self.items
    }

    pub fn item(&self, key: &str) -> Option<&ItemRange> {
        self.index_by_key.get(key).map(|&i| &self.items[i])
    }

    /// Keys of loaded items that still wait for their first measurement, in key order.
    pub fn unmeasured_keys(&self) -> &[String] {
        &self.unmeasured_keys
    }

    pub fn has_unmeasured_items(&self) -> bool {
        !self.unmeasured_keys.is_empty()
    }

    pub fn viewport(&self) -> Range {
        self.viewport
    }

    pub fn spacer_size(&self) -> f64 {
        self.spacer_size
    }

    pub fn end_spacer_size(&self) -> f64 {
        self.end_spacer_size
    }

    /// The scroll offset the renderer must apply when [`Self::must_scroll`] is set.
    pub fn scroll_top(&self) -> f64 {
        self.viewport.start + self.spacer_size
    }

    pub fn is_start_aligned(&self) -> bool {
        self.is_start_aligned
    }

    pub fn is_end_aligned(&self) -> bool {
        self.is_end_aligned
    }

    pub fn sticky_edge(&self) -> Option<Edge> {
        if self.is_start_aligned {
            Some(Edge::Start)
        } else if self.is_end_aligned {
            Some(Edge::End)
        } else {
            None
        }
    }

    pub fn is_user_scroll_detected(&self) -> bool {
        self.is_user_scroll_detected
    }

    /// The renderer must reposition its scroll offset to [`Self::scroll_top`] before painting.
    pub fn must_scroll(&self) -> bool {
        self.must_scroll
    }

    /// A spacer resize is pending; the renderer should report back once scrolling is safe.
    pub fn notify_when_safe_to_scroll(&self) -> bool {
        self.notify_when_safe_to_scroll
    }

    pub fn items_end(&self) -> f64 {
        self.items.last().map_or(0.0, |item| item.end)
    }

    /// The coordinate span covered by laid-out items.
    pub fn loaded_range(&self) -> Option<Range> {
        let first = self.items.first()?;
        Some(Range::new(first.start, self.items_end()))
    }

    /// Spacer + items + end spacer.
    pub fn full_range(&self) -> Range {
        Range::new(-self.spacer_size, self.items_end() + self.end_spacer_size)
    }

    /// The load zone around `viewport`, clamped to the loaded range on sides where the dataset
    /// boundary is already loaded.
    pub fn trimmed_load_zone(&self, viewport: Range, options: &ListOptions) -> Option<Range> {
        let loaded = self.loaded_range()?;
        let mut zone = options.load_zone(viewport);
        if self.window.has_start() {
            zone.start = zone.start.max(loaded.start);
        }
        if self.window.has_end() {
            zone.end = zone.end.min(loaded.end);
        }
        Some(zone)
    }

    pub fn buffer_zone(&self, options: &ListOptions) -> Range {
        options.buffer_zone(self.viewport)
    }

    /// Whether everything the load zone around `viewport` needs is already loaded.
    pub fn is_fully_loaded(&self, viewport: Range, options: &ListOptions) -> bool {
        if self.window.has_all() {
            return true;
        }
        match (self.loaded_range(), self.trimmed_load_zone(viewport, options)) {
            (Some(loaded), Some(zone)) => loaded.contains(&zone),
            _ => false,
        }
    }
}

fn ideal_spacer_size(window: &Window, options: &ListOptions) -> f64 {
    if window.has_start() {
        0.0
    } else {
        options.spacer_size
    }
}

struct Layout {
    items: Vec<ItemRange>,
    unmeasured_keys: Vec<String>,
    recorded_sizes: HashSet<String>,
    anchor: Option<Anchor>,
}

/// An item laid out in both plans; its move is the expansion above the viewport.
///
/// This is the first carried-over item that was visible before the update, or the cornerstone
/// when none of them was.
#[derive(Clone, Copy)]
struct Anchor {
    index: usize,
    old_start: f64,
}

struct Slot<'a> {
    key: &'a str,
    size: f64,
    /// Range carried over from the previous plan, if the item was laid out there.
    old: Option<Range>,
}

/// Instantiates items and lays them out gap-free.
///
/// The walk starts from a cornerstone (the carried-over item with the smallest end, the later
/// one on ties) and proceeds forward and backward from it. The result is rebased so that the
/// first laid-out item starts at `0`.
fn lay_out(
    prev: Option<&RenderPlan>,
    window: &Window,
    client: Option<&ClientState>,
    statistics: &mut Statistics,
) -> Layout {
    // What the client was looking at, in the previous plan's coordinates.
    let visible = prev.map(|p| {
        client
            .and_then(|c| c.viewport(p.spacer_size))
            .unwrap_or(p.viewport)
    });
    let reported = client.map(|c| &c.measured_sizes);
    if let Some(reported) = reported {
        for key in reported.keys() {
            if !window.contains_key(key) {
                vwarn!(plan, key = key.as_str(), "size reported for an unknown key");
            }
        }
    }

    let mut slots: Vec<Slot<'_>> = Vec::with_capacity(window.len());
    let mut unmeasured = Vec::new();
    let mut recorded_sizes = HashSet::new();
    for item in window.items() {
        let key = item.key();
        let old = prev.and_then(|p| p.item(key));
        let was_recorded = prev.is_some_and(|p| p.recorded_sizes.contains(key));
        let size = match reported.and_then(|r| r.get(key)).copied() {
            Some(size) if size.is_finite() && size >= 0.0 => {
                if let Some(old) = old.filter(|_| was_recorded) {
                    statistics.remove_weighted_item_size(old.size(), item.count_as());
                }
                statistics.add_weighted_item_size(size, item.count_as());
                recorded_sizes.insert(key.to_owned());
                Some(size)
            }
            _ => {
                if was_recorded && old.is_some() {
                    recorded_sizes.insert(key.to_owned());
                }
                old.map(ItemRange::size).or(item.size())
            }
        };
        match size {
            Some(size) => slots.push(Slot {
                key,
                size,
                old: old.map(ItemRange::range),
            }),
            None => unmeasured.push(key.to_owned()),
        }
    }
    if slots.is_empty() {
        return Layout {
            items: Vec::new(),
            unmeasured_keys: unmeasured,
            recorded_sizes,
            anchor: None,
        };
    }

    let cornerstone = slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.old.map(|old| (i, old.start, old.start + slot.size)))
        .fold(None, |best: Option<(usize, f64, f64)>, candidate| match best {
            Some(b) if b.2 < candidate.2 => best,
            _ => Some(candidate),
        });
    // Nothing carried over: lay out from the first measured item.
    let (seed, seed_start) = cornerstone.map_or((0, 0.0), |(i, start, _)| (i, start));

    let mut starts = vec![0.0; slots.len()];
    let mut pos = seed_start;
    for (i, slot) in slots.iter().enumerate().skip(seed) {
        starts[i] = pos;
        pos += slot.size;
    }
    let mut pos = seed_start;
    for i in (0..seed).rev() {
        pos -= slots[i].size;
        starts[i] = pos;
    }

    let anchor = slots
        .iter()
        .enumerate()
        .find_map(|(index, slot)| {
            let old = slot.old?;
            visible
                .is_some_and(|v| old.intersects(&v))
                .then_some(Anchor {
                    index,
                    old_start: old.start,
                })
        })
        .or_else(|| cornerstone.map(|(index, old_start, _)| Anchor { index, old_start }));

    let origin = starts[0];
    let count = slots.len();
    let items = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let start = starts[i] - origin;
            let end = if i + 1 < count {
                starts[i + 1] - origin
            } else {
                start + slot.size
            };
            ItemRange {
                key: slot.key.to_owned(),
                start,
                end,
            }
        })
        .collect();
    Layout {
        items,
        unmeasured_keys: unmeasured,
        recorded_sizes,
        anchor,
    }
}
