use async_trait::async_trait;
use windowlist::{Query, RenderPlan, Window};

use crate::FetchError;

/// Where windows come from.
///
/// Implementations must return a window whose `has_start`/`has_end` flags are authoritative for
/// the dataset. `previous` is the window the query was computed from; sources typically build
/// the result around it (or shrink it when `query.evict` is set).
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    async fn fetch(&self, query: &Query, previous: &Window) -> Result<Window, FetchError>;
}

/// The UI side: paints plans and reports back through
/// [`crate::ViewportController::report_client_state`].
pub trait Renderer {
    fn commit(&mut self, plan: &RenderPlan);

    /// Informational; the fetch itself goes through the [`DataSource`].
    fn request_data(&mut self, _query: &Query) {}
}
