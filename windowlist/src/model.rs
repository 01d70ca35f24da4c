use core::iter::Flatten;
use core::mem;
use core::slice;

use crate::{KeyRange, WindowError};

/// A single entry of the list.
///
/// `size` stays `None` until the item has been painted once and its size reported back.
/// `count_as` is the number of dataset entries the item stands for (a collapsed group of
/// messages, say); statistics and response accounting weigh the item by it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Item {
    key: String,
    size: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default = "one"))]
    count_as: u32,
}

#[cfg(feature = "serde")]
fn one() -> u32 {
    1
}

impl Item {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            count_as: 1,
        }
    }

    /// Clamped to at least `1`.
    pub fn with_count_as(mut self, count_as: u32) -> Self {
        self.count_as = count_as.max(1);
        self
    }

    /// Attaches a known size (e.g. from a cache that outlives the window).
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn size(&self) -> Option<f64> {
        self.size
    }

    pub fn is_measured(&self) -> bool {
        self.size.is_some()
    }

    pub fn count_as(&self) -> u32 {
        self.count_as
    }
}

/// A contiguous, ordered, non-empty batch of items: the unit of fetching and merging.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Tile {
    items: Vec<Item>,
}

impl Tile {
    /// Validates that `items` is non-empty and that keys strictly increase.
    pub fn new(items: Vec<Item>) -> Result<Self, WindowError> {
        if items.is_empty() {
            return Err(WindowError::EmptyTile);
        }
        for pair in items.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(WindowError::UnorderedKeys {
                    prev: pair[0].key.clone(),
                    next: pair[1].key.clone(),
                });
            }
        }
        Ok(Self { items })
    }

    /// Builds a tile of unmeasured items.
    pub fn from_keys<I, K>(keys: I) -> Result<Self, WindowError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::new(keys.into_iter().map(Item::new).collect())
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first_key(&self) -> &str {
        // Non-empty by construction.
        self.items.first().map_or("", Item::key)
    }

    pub fn last_key(&self) -> &str {
        self.items.last().map_or("", Item::key)
    }

    pub fn key_range(&self) -> KeyRange {
        KeyRange::new(self.first_key(), self.last_key())
    }

    fn contains_key(&self, key: &str) -> bool {
        self.first_key() <= key && key <= self.last_key()
    }
}

impl<'a> IntoIterator for &'a Tile {
    type Item = &'a Item;
    type IntoIter = slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The loaded slice of the dataset: sorted, non-overlapping tiles plus boundary flags.
///
/// A window is never mutated after publication. Fetching produces a brand new window
/// (see [`Window::merge`] / [`Window::retain`]).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Window {
    tiles: Vec<Tile>,
    has_start: bool,
    has_end: bool,
    scroll_to_key: Option<String>,
    version: u64,
}

impl Window {
    /// An empty window that knows nothing about the dataset boundaries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates that tiles are sorted and do not overlap in key space.
    pub fn new(tiles: Vec<Tile>, has_start: bool, has_end: bool) -> Result<Self, WindowError> {
        for pair in tiles.windows(2) {
            if pair[0].last_key() >= pair[1].first_key() {
                return Err(WindowError::OverlappingTiles {
                    prev_last: pair[0].last_key().to_owned(),
                    first: pair[1].first_key().to_owned(),
                });
            }
        }
        Ok(Self {
            tiles,
            has_start,
            has_end,
            scroll_to_key: None,
            version: 0,
        })
    }

    pub fn with_scroll_to_key(mut self, key: impl Into<String>) -> Self {
        self.scroll_to_key = Some(key.into());
        self
    }

    /// Stamps the window with the version it is published under.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// The very first item of the whole dataset is loaded.
    pub fn has_start(&self) -> bool {
        self.has_start
    }

    /// The very last item of the whole dataset is loaded.
    pub fn has_end(&self) -> bool {
        self.has_end
    }

    pub fn has_all(&self) -> bool {
        self.has_start && self.has_end
    }

    pub fn scroll_to_key(&self) -> Option<&str> {
        self.scroll_to_key.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tiles.iter().map(Tile::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Number of dataset entries the loaded items stand for (see [`Item::count_as`]).
    pub fn weight(&self) -> u64 {
        self.items().map(|item| u64::from(item.count_as)).sum()
    }

    /// Iterates all items in key order.
    ///
    /// The iterator is lazy and cheap to clone, so it can be restarted at any point.
    pub fn items(&self) -> Items<'_> {
        Items {
            inner: self.tiles.iter().flatten(),
            reverse: false,
        }
    }

    /// Iterates all items in reverse key order.
    pub fn items_rev(&self) -> Items<'_> {
        Items {
            inner: self.tiles.iter().flatten(),
            reverse: true,
        }
    }

    pub fn first_key(&self) -> Option<&str> {
        self.tiles.first().map(Tile::first_key)
    }

    pub fn last_key(&self) -> Option<&str> {
        self.tiles.last().map(Tile::last_key)
    }

    pub fn key_range(&self) -> Option<KeyRange> {
        Some(KeyRange::new(self.first_key()?, self.last_key()?))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let Some(tile) = self.tile_for(key) else {
            return false;
        };
        tile.items
            .binary_search_by(|item| item.key.as_str().cmp(key))
            .is_ok()
    }

    /// Number of tiles whose first key is `<= key`.
    fn slot(&self, key: &str) -> usize {
        self.tiles.partition_point(|t| t.first_key() <= key)
    }

    /// The tile whose key range covers `key`, if any.
    fn tile_for(&self, key: &str) -> Option<&Tile> {
        let slot = self.slot(key);
        let tile = self.tiles.get(slot.checked_sub(1)?)?;
        tile.contains_key(key).then_some(tile)
    }

    /// Combines this window with a newer one.
    ///
    /// Tiles of `newer` are taken as-is; items of `self` that fall inside any of them are
    /// dropped (newer entries win). Old tiles are split where a newer tile cuts through them,
    /// so the result stays sorted and non-overlapping.
    pub fn merge(&self, newer: &Window) -> Window {
        let mut tiles = Vec::with_capacity(self.tiles.len() + newer.tiles.len());
        for tile in &self.tiles {
            let mut run: Vec<Item> = Vec::new();
            let mut run_slot = None;
            for item in tile {
                if newer.tile_for(item.key()).is_some() {
                    flush(&mut tiles, &mut run);
                    run_slot = None;
                    continue;
                }
                let slot = newer.slot(item.key());
                if run_slot.is_some_and(|s| s != slot) {
                    flush(&mut tiles, &mut run);
                }
                run_slot = Some(slot);
                run.push(item.clone());
            }
            flush(&mut tiles, &mut run);
        }
        tiles.extend(newer.tiles.iter().cloned());
        tiles.sort_by(|a, b| a.first_key().cmp(b.first_key()));

        Window {
            tiles,
            has_start: self.has_start || newer.has_start,
            has_end: self.has_end || newer.has_end,
            scroll_to_key: newer.scroll_to_key.clone(),
            version: self.version.max(newer.version),
        }
    }

    /// Keeps only items inside `range`.
    ///
    /// Boundary flags survive only if the boundary item itself is kept.
    pub fn retain(&self, range: &KeyRange) -> Window {
        let mut tiles = Vec::with_capacity(self.tiles.len());
        for tile in &self.tiles {
            let mut run: Vec<Item> = tile
                .items
                .iter()
                .filter(|item| range.contains(item.key()))
                .cloned()
                .collect();
            flush(&mut tiles, &mut run);
        }
        let has_start = self.has_start && self.first_key().is_some_and(|k| range.contains(k));
        let has_end = self.has_end && self.last_key().is_some_and(|k| range.contains(k));
        let scroll_to_key = self
            .scroll_to_key
            .clone()
            .filter(|k| range.contains(k));

        Window {
            tiles,
            has_start,
            has_end,
            scroll_to_key,
            version: self.version,
        }
    }
}

fn flush(tiles: &mut Vec<Tile>, run: &mut Vec<Item>) {
    if !run.is_empty() {
        tiles.push(Tile {
            items: mem::take(run),
        });
    }
}

/// Iterator over the items of a [`Window`], see [`Window::items`].
#[derive(Clone, Debug)]
pub struct Items<'a> {
    inner: Flatten<slice::Iter<'a, Tile>>,
    reverse: bool,
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reverse {
            self.inner.next_back()
        } else {
            self.inner.next()
        }
    }
}

impl DoubleEndedIterator for Items<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.reverse {
            self.inner.next()
        } else {
            self.inner.next_back()
        }
    }
}
