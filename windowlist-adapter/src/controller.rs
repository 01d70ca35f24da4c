use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use windowlist::{
    ClientState, EvictionTracker, ListOptions, Query, QueryBuilder, RenderPlan, Statistics,
    Window, record_response,
};

use crate::timing::{Debounce, Throttle};
use crate::{ControllerError, ControllerOptions, DataSource, FetchError, Renderer};

const TARGET: &str = "windowlist::controller";

/// Whether a layout pass is in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Idle,
    /// A pass committed a plan and is waiting for its fetch.
    Rendering,
}

/// How a pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// A plan was committed and no data was needed.
    Committed,
    /// A fetch completed and the new window was committed.
    Loaded { version: u64 },
    TimedOut,
    FetchFailed,
    Cancelled,
    /// The fetch result was older than the current window.
    Stale,
}

/// Inputs the controller reacts to; see [`ViewportController::run`].
#[derive(Clone, Debug, PartialEq)]
pub enum ControllerEvent {
    ClientState(ClientState),
    Scroll,
    Resize,
    RenderComplete,
    /// The data source has new or changed items.
    DataChanged,
}

/// Sending half of the controller's event channel.
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

/// Creates the channel [`ViewportController::run`] consumes.
pub fn event_channel() -> (ControllerHandle, mpsc::UnboundedReceiver<ControllerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControllerHandle { tx }, rx)
}

impl ControllerHandle {
    pub fn send(&self, event: ControllerEvent) -> Result<(), ControllerError> {
        self.tx.send(event).map_err(|_| ControllerError::Closed)
    }

    pub fn report_client_state(&self, state: ClientState) -> Result<(), ControllerError> {
        self.send(ControllerEvent::ClientState(state))
    }

    pub fn scroll(&self) -> Result<(), ControllerError> {
        self.send(ControllerEvent::Scroll)
    }

    pub fn resize(&self) -> Result<(), ControllerError> {
        self.send(ControllerEvent::Resize)
    }

    pub fn render_complete(&self) -> Result<(), ControllerError> {
        self.send(ControllerEvent::RenderComplete)
    }

    pub fn data_changed(&self) -> Result<(), ControllerError> {
        self.send(ControllerEvent::DataChanged)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    Pass,
    Housekeeping,
}

pub(crate) enum FetchOutcome {
    Loaded(Window),
    Failed(FetchError),
    TimedOut,
}

pub(crate) struct FetchResult {
    pub(crate) query: Query,
    pub(crate) version: u64,
    pub(crate) outcome: FetchOutcome,
}

/// A fetch started by a pass; await [`PendingFetch::wait`] and hand the result back to
/// [`ViewportController::finish_fetch`].
pub(crate) struct PendingFetch {
    query: Query,
    version: u64,
    timeout: Duration,
    future: BoxFuture<'static, Result<Window, FetchError>>,
}

impl PendingFetch {
    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    pub(crate) async fn wait(self) -> FetchResult {
        let outcome = match tokio::time::timeout(self.timeout, self.future).await {
            Ok(Ok(window)) => FetchOutcome::Loaded(window),
            Ok(Err(err)) => FetchOutcome::Failed(err),
            Err(_) => FetchOutcome::TimedOut,
        };
        FetchResult {
            query: self.query,
            version: self.version,
            outcome,
        }
    }
}

/// The event-driven shell around the core engine.
///
/// Owns the single current [`Window`] and [`RenderPlan`], replacing (never mutating) them.
/// Passes are strictly sequential: while a fetch is in flight, new triggers are coalesced and
/// run right after it completes.
///
/// Drive it either with [`Self::run`] (an event loop over a channel) or manually with
/// [`Self::render_pass`] / [`Self::housekeeping`].
pub struct ViewportController<D, R> {
    list_options: ListOptions,
    options: ControllerOptions,
    source: Arc<D>,
    renderer: R,
    window: Arc<Window>,
    plan: Arc<RenderPlan>,
    statistics: Statistics,
    queries: QueryBuilder,
    evictions: EvictionTracker,
    state: ControllerState,
    pending_client: Option<ClientState>,
    must_render: bool,
    refresh: Throttle,
    scroll_stopped: Debounce,
    retry_at: Option<Instant>,
    awaiting_paint: bool,
    epoch: Instant,
    last_version: u64,
}

impl<D: DataSource, R: Renderer> ViewportController<D, R> {
    pub fn new(source: D, renderer: R) -> Self {
        let list_options = ListOptions::default();
        let options = ControllerOptions::default();
        let mut statistics = Statistics::new(&list_options);
        let window = Arc::new(Window::empty());
        let plan = RenderPlan::new(Arc::clone(&window), None, &mut statistics, &list_options);
        Self {
            refresh: Throttle::new(options.throttle()),
            scroll_stopped: Debounce::new(options.scroll_stopped()),
            list_options,
            options,
            source: Arc::new(source),
            renderer,
            window,
            plan: Arc::new(plan),
            statistics,
            queries: QueryBuilder::new(),
            evictions: EvictionTracker::new(),
            state: ControllerState::Idle,
            pending_client: None,
            must_render: true,
            retry_at: None,
            awaiting_paint: false,
            epoch: Instant::now(),
            last_version: 0,
        }
    }

    /// Replaces the list options; statistics start over.
    pub fn with_list_options(mut self, list_options: ListOptions) -> Self {
        self.statistics = Statistics::new(&list_options);
        self.plan = Arc::new(RenderPlan::new(
            Arc::clone(&self.window),
            None,
            &mut self.statistics,
            &list_options,
        ));
        self.list_options = list_options;
        self
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.refresh = Throttle::new(options.throttle());
        self.scroll_stopped = Debounce::new(options.scroll_stopped());
        self.options = options;
        self
    }

    pub fn list_options(&self) -> &ListOptions {
        &self.list_options
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn plan(&self) -> &Arc<RenderPlan> {
        &self.plan
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// `1` while a retry is scheduled.
    pub fn pending_retries(&self) -> usize {
        usize::from(self.retry_at.is_some())
    }

    /// Items currently outside the buffer zone.
    pub fn eviction_candidates(&self) -> usize {
        self.evictions.len()
    }

    /// Accepts what the renderer observed after painting the current plan.
    ///
    /// States measured against any other plan are dropped. Size changes (or the confirmation
    /// that scrolling is safe while the plan waits for it) force a pass; scrolling goes through
    /// the throttle.
    pub fn report_client_state(&mut self, state: ClientState) {
        if state.render_index != self.plan.render_index() {
            debug!(
                target: TARGET,
                reported = state.render_index,
                current = self.plan.render_index(),
                "dropping stale client state"
            );
            return;
        }
        self.awaiting_paint = false;

        let has_sizes = !state.measured_sizes.is_empty();
        let safe_now = state.is_safe_to_scroll && self.plan.notify_when_safe_to_scroll();
        let viewport = state.viewport(self.plan.spacer_size());
        let scrolled = viewport.is_some_and(|v| {
            !v.approx_eq(&self.plan.viewport(), self.list_options.scroll_epsilon)
        });
        let fully_loaded = self.plan.is_fully_loaded(
            viewport.unwrap_or_else(|| self.plan.viewport()),
            &self.list_options,
        );

        match &mut self.pending_client {
            Some(pending) => pending.merge(state),
            None => self.pending_client = Some(state),
        }
        if has_sizes || safe_now {
            self.must_render = true;
        }
        if scrolled || !fully_loaded {
            self.refresh.signal();
        }
    }

    pub fn on_scroll(&mut self) {
        let now = Instant::now();
        self.scroll_stopped.signal(now);
        self.refresh.signal();
    }

    pub fn on_resize(&mut self) {
        self.on_scroll();
    }

    /// The renderer finished painting the last committed plan.
    pub fn notify_render_complete(&mut self) {
        self.awaiting_paint = false;
    }

    /// The data source changed: the last query may now return more, so it is allowed again.
    ///
    /// A plan following an edge picks up whatever arrived there on the next pass.
    pub fn notify_data_changed(&mut self) {
        debug!(target: TARGET, "data changed");
        self.queries.forget_last();
        self.must_render = true;
    }

    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::ClientState(state) => self.report_client_state(state),
            ControllerEvent::Scroll => self.on_scroll(),
            ControllerEvent::Resize => self.on_resize(),
            ControllerEvent::RenderComplete => self.notify_render_complete(),
            ControllerEvent::DataChanged => self.notify_data_changed(),
        }
    }

    /// Runs a pass now: re-plan, commit, and fetch (awaiting the result) if data is needed.
    pub async fn render_pass(&mut self) -> Result<PassOutcome, ControllerError> {
        match self.begin_pass(Instant::now()) {
            Some(fetch) => {
                let result = fetch.wait().await;
                self.finish_fetch(result, Instant::now())
            }
            None => Ok(PassOutcome::Committed),
        }
    }

    /// Runs eviction housekeeping now; `None` when nothing was evicted.
    pub async fn housekeeping(&mut self) -> Result<Option<PassOutcome>, ControllerError> {
        match self.begin_housekeeping(Instant::now()) {
            Some(fetch) => {
                let result = fetch.wait().await;
                self.finish_fetch(result, Instant::now()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Processes events until the channel closes and no fetch is in flight.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ControllerEvent>) -> Self {
        let mut in_flight: Option<BoxFuture<'static, FetchResult>> = None;
        let mut events_open = true;
        loop {
            if in_flight.is_none() {
                let now = Instant::now();
                while let Some(trigger) = self.poll_due(now) {
                    let fetch = match trigger {
                        Trigger::Pass => self.begin_pass(now),
                        Trigger::Housekeeping => self.begin_housekeeping(now),
                    };
                    if let Some(fetch) = fetch {
                        trace!(target: TARGET, evict = fetch.query().evict, "fetch in flight");
                        in_flight = Some(fetch.wait().boxed());
                        break;
                    }
                }
            }
            if !events_open && in_flight.is_none() {
                break;
            }

            let now = Instant::now();
            let deadline = if in_flight.is_none() {
                self.next_deadline(now)
            } else {
                None
            };
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!(target: TARGET, "event channel closed");
                        events_open = false;
                    }
                },
                result = next_result(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    if let Err(err) = self.finish_fetch(result, Instant::now()) {
                        error!(target: TARGET, error = %err, "pass failed");
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or(now)), if deadline.is_some() => {}
            }
        }
        self
    }

    pub(crate) fn poll_due(&mut self, now: Instant) -> Option<Trigger> {
        if self.state == ControllerState::Rendering {
            return None;
        }
        if self.retry_at.is_some_and(|at| now >= at) {
            self.retry_at = None;
            self.queries.forget_last();
            debug!(target: TARGET, "retrying");
            return Some(Trigger::Pass);
        }
        if self.must_render {
            return Some(Trigger::Pass);
        }
        if !self.awaiting_paint && self.refresh.is_ready(now) {
            return Some(Trigger::Pass);
        }
        if self.scroll_stopped.take_due(now) {
            return Some(Trigger::Housekeeping);
        }
        None
    }

    pub(crate) fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if self.state == ControllerState::Rendering {
            return None;
        }
        let refresh = if self.awaiting_paint {
            None
        } else {
            self.refresh.deadline(now)
        };
        [
            self.retry_at,
            self.must_render.then_some(now),
            refresh,
            self.scroll_stopped.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub(crate) fn begin_pass(&mut self, now: Instant) -> Option<PendingFetch> {
        self.must_render = false;
        self.refresh.fire(now);
        let client = self.pending_client.take();
        let plan = self.plan.next(
            Arc::clone(&self.window),
            client.as_ref(),
            &mut self.statistics,
            &self.list_options,
        );
        self.commit(plan);
        let now_ms = self.elapsed_ms(now);
        self.evictions.observe(&self.plan, &self.list_options, now_ms);

        let query = self
            .queries
            .build(&self.plan, &self.statistics, &self.list_options)?;
        Some(self.start_fetch(query))
    }

    pub(crate) fn begin_housekeeping(&mut self, now: Instant) -> Option<PendingFetch> {
        let now_ms = self.elapsed_ms(now);
        self.evictions
            .observe(&self.plan, &self.list_options, now_ms);
        match self
            .evictions
            .eviction_query(&self.plan, &self.list_options, now_ms)
        {
            Some(query) => {
                let query = self.queries.issue(query)?;
                info!(
                    target: TARGET,
                    retained = ?query.expected_count,
                    candidates = self.evictions.len(),
                    "evicting far items"
                );
                Some(self.start_fetch(query))
            }
            None => {
                if let Some(ripe_ms) = self.evictions.next_ripe_ms(&self.list_options) {
                    if ripe_ms > now_ms {
                        self.scroll_stopped
                            .rearm_at(self.epoch + Duration::from_millis(ripe_ms));
                    }
                }
                None
            }
        }
    }

    pub(crate) fn finish_fetch(
        &mut self,
        result: FetchResult,
        now: Instant,
    ) -> Result<PassOutcome, ControllerError> {
        self.state = ControllerState::Idle;
        let outcome = match result.outcome {
            FetchOutcome::TimedOut => {
                warn!(
                    target: TARGET,
                    timeout_ms = self.options.fetch_timeout_ms,
                    "fetch timed out"
                );
                self.schedule_retry(now);
                PassOutcome::TimedOut
            }
            FetchOutcome::Failed(FetchError::InvalidWindow(err)) => {
                error!(target: TARGET, error = %err, "data source returned an invalid window");
                self.queries.forget_last();
                return Err(ControllerError::InvalidWindow(err));
            }
            FetchOutcome::Failed(FetchError::Cancelled) => {
                debug!(target: TARGET, "fetch cancelled");
                self.queries.forget_last();
                PassOutcome::Cancelled
            }
            FetchOutcome::Failed(err) => {
                warn!(target: TARGET, error = %err, "fetch failed");
                self.schedule_retry(now);
                PassOutcome::FetchFailed
            }
            FetchOutcome::Loaded(_) if result.version <= self.window.version() => {
                debug!(
                    target: TARGET,
                    version = result.version,
                    current = self.window.version(),
                    "discarding stale window"
                );
                PassOutcome::Stale
            }
            FetchOutcome::Loaded(window) => {
                record_response(&result.query, &window, &mut self.statistics);
                self.window = Arc::new(window.with_version(result.version));
                let client = self.pending_client.take();
                let plan = self.plan.next(
                    Arc::clone(&self.window),
                    client.as_ref(),
                    &mut self.statistics,
                    &self.list_options,
                );
                self.commit(plan);
                let now_ms = self.elapsed_ms(now);
                self.evictions.observe(&self.plan, &self.list_options, now_ms);
                debug!(
                    target: TARGET,
                    version = result.version,
                    items = self.window.len(),
                    has_start = self.window.has_start(),
                    has_end = self.window.has_end(),
                    "window loaded"
                );
                PassOutcome::Loaded {
                    version: result.version,
                }
            }
        };
        if self.refresh.is_pending() || self.pending_client.is_some() {
            self.must_render = true;
        }
        Ok(outcome)
    }

    fn commit(&mut self, plan: RenderPlan) {
        self.plan = Arc::new(plan);
        trace!(
            target: TARGET,
            render_index = self.plan.render_index(),
            items = self.plan.items().len(),
            must_scroll = self.plan.must_scroll(),
            "commit"
        );
        self.renderer.commit(&self.plan);
        self.awaiting_paint = true;
    }

    fn start_fetch(&mut self, query: Query) -> PendingFetch {
        self.state = ControllerState::Rendering;
        self.last_version += 1;
        self.renderer.request_data(&query);
        info!(
            target: TARGET,
            version = self.last_version,
            expand_start = query.expand_start,
            expand_end = query.expand_end,
            evict = query.evict,
            "issuing query"
        );

        let source = Arc::clone(&self.source);
        let previous = Arc::clone(&self.window);
        let request = query.clone();
        let future = async move { source.fetch(&request, &previous).await }.boxed();
        PendingFetch {
            query,
            version: self.last_version,
            timeout: self.options.fetch_timeout(),
            future,
        }
    }

    fn schedule_retry(&mut self, now: Instant) {
        self.queries.forget_last();
        self.retry_at = Some(now + self.options.retry_delay());
        debug!(
            target: TARGET,
            delay_ms = self.options.retry_delay_ms,
            "retry scheduled"
        );
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.epoch).as_millis()).unwrap_or(u64::MAX)
    }
}

async fn next_result(in_flight: &mut Option<BoxFuture<'static, FetchResult>>) -> FetchResult {
    match in_flight {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}
