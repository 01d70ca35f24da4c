//! Event-driven viewport controller for the `windowlist` crate.
//!
//! The `windowlist` crate is runtime-agnostic and only knows how to plan. This crate wires it
//! to the outside world:
//!
//! - [`DataSource`] (async fetch of windows) and [`Renderer`] (paints plans) collaborators
//! - [`ViewportController`]: throttled scroll handling, fetch timeouts with a single retry,
//!   stale-result discarding, and eviction housekeeping once scrolling stops
//! - [`MemorySource`]: an in-memory data source for demos and tests
//!
//! Timers use `tokio::time`, so tests can run on a paused clock.
#![forbid(unsafe_code)]

mod controller;
mod error;
mod memory;
mod options;
mod source;
mod timing;


pub use controller::{
    ControllerEvent, ControllerHandle, ControllerState, PassOutcome, ViewportController,
    event_channel,
};
pub use error::{BoxError, ControllerError, FetchError};
pub use memory::MemorySource;
pub use options::ControllerOptions;
pub use source::{DataSource, Renderer};
