use thiserror::Error;

/// A structural problem with a [`crate::Tile`] or [`crate::Window`].
///
/// These are contract violations by whoever assembled the data (usually a data source), never
/// something the layout engine can recover from on its own.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("tile has no items")]
    EmptyTile,

    /// Keys inside a tile must strictly increase; duplicates land here too.
    #[error("keys must strictly increase: {prev:?} is followed by {next:?}")]
    UnorderedKeys { prev: String, next: String },

    #[error("tile starting at {first:?} does not follow the previous tile ending at {prev_last:?}")]
    OverlappingTiles { prev_last: String, first: String },
}
