//! A headless windowing and render-planning engine for unbounded, incrementally fetched lists.
//!
//! For the event-driven controller (throttling, fetching, retries), see the
//! `windowlist-adapter` crate.
//!
//! The crate keeps only a window of a potentially huge, key-ordered dataset in memory and turns
//! it into immutable [`RenderPlan`]s: laid-out item ranges, a viewport, and the spacer that
//! stands in for everything not loaded yet. Each plan is reconciled against its predecessor so
//! the content under the viewport stays put when items are prepended, appended, or re-measured.
//!
//! It is UI-agnostic. A renderer is expected to:
//! - paint a plan (and honor [`RenderPlan::must_scroll`]);
//! - report back a [`ClientState`]: scroll offset, viewport height, and freshly measured sizes.
//!
//! The [`QueryBuilder`] decides when more data is needed; the [`EvictionTracker`] decides when
//! far-offscreen items can be dropped.
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod error;
mod evict;
mod model;
mod options;
mod plan;
mod query;
mod stats;
mod types;

#[cfg(test)]
mod tests;

pub use error::WindowError;
pub use evict::EvictionTracker;
pub use model::{Item, Items, Tile, Window};
pub use options::ListOptions;
pub use plan::{ClientState, ItemRange, RenderPlan};
pub use query::{Query, QueryBuilder, record_response};
pub use stats::{RunningAverage, Statistics};
pub use types::{Edge, KeyRange, Range};
