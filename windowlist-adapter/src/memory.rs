use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use windowlist::{Item, Query, Tile, Window};

use crate::{DataSource, FetchError};

/// A [`DataSource`] over a sorted in-memory dataset, served in fixed-size tiles.
///
/// Handy for demos and tests; `latency` simulates a slow backend.
#[derive(Debug)]
pub struct MemorySource {
    items: RwLock<Vec<Item>>,
    tile_size: usize,
    latency: Option<Duration>,
}

impl MemorySource {
    /// Keys are sorted and deduplicated.
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut items: Vec<Item> = keys.into_iter().map(Item::new).collect();
        normalize(&mut items);
        Self {
            items: RwLock::new(items),
            tile_size: 32,
            latency: None,
        }
    }

    pub fn with_tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds items; existing keys are kept.
    pub fn append<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.extend(keys.into_iter().map(Item::new));
        normalize(&mut items);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Item>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn serve(&self, query: &Query, previous: &Window) -> Result<Window, FetchError> {
        if query.evict {
            return Ok(match &query.key_range {
                Some(range) => previous.retain(range),
                None => previous.clone(),
            });
        }

        let items = self.read();
        let total = items.len();
        let expand_start = usize::try_from(query.expand_start).unwrap_or(usize::MAX);
        let expand_end = usize::try_from(query.expand_end).unwrap_or(usize::MAX);
        let (lo, hi) = match &query.key_range {
            None if expand_start > 0 => (total.saturating_sub(expand_start), total),
            None => (0, expand_end.min(total)),
            Some(range) => {
                let first = items.partition_point(|item| item.key() < range.start.as_str());
                let last = items.partition_point(|item| item.key() <= range.end.as_str());
                (
                    first.saturating_sub(expand_start),
                    last.saturating_add(expand_end).min(total),
                )
            }
        };

        let tiles = items[lo..hi]
            .chunks(self.tile_size)
            .map(|chunk| Tile::new(chunk.to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Window::new(tiles, lo == 0, hi == total)?)
    }
}

fn normalize(items: &mut Vec<Item>) {
    items.sort_by(|a, b| a.key().cmp(b.key()));
    items.dedup_by(|a, b| a.key() == b.key());
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&self, query: &Query, previous: &Window) -> Result<Window, FetchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.serve(query, previous)
    }
}
