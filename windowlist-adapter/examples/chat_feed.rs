use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use windowlist::{ClientState, Query, RenderPlan};
use windowlist_adapter::{MemorySource, Renderer, ViewportController};

/// Pretends to be a UI: every row is 24px tall.
#[derive(Default)]
struct FakeTerminal {
    commits: usize,
}

impl Renderer for FakeTerminal {
    fn commit(&mut self, plan: &RenderPlan) {
        self.commits += 1;
        println!(
            "commit #{:<3} items={:<4} unmeasured={:<4} viewport={} spacer={}",
            plan.render_index(),
            plan.items().len(),
            plan.unmeasured_keys().len(),
            plan.viewport(),
            plan.spacer_size()
        );
    }

    fn request_data(&mut self, query: &Query) {
        println!(
            "  query keys={:?} expand_start={} expand_end={} evict={}",
            query.key_range, query.expand_start, query.expand_end, query.evict
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let source = MemorySource::new((0..5000).map(|i| format!("msg-{i:05}")))
        .with_latency(Duration::from_millis(20));
    let mut controller = ViewportController::new(source, FakeTerminal::default());

    // Open the feed at the bottom, then scroll up one screen per step.
    for step in 0..12 {
        let outcome = controller.render_pass().await?;
        let plan = Arc::clone(controller.plan());
        let scroll_top = if step == 0 {
            plan.scroll_top()
        } else {
            (plan.scroll_top() - 600.0).max(0.0)
        };
        let sizes = plan.unmeasured_keys().iter().map(|k| (k.clone(), 24.0));
        controller.report_client_state(
            ClientState::new(plan.render_index())
                .with_scroll(scroll_top, 600.0)
                .with_sizes(sizes),
        );
        println!(
            "step {step:>2}: {outcome:?}, window={} items, has_start={}",
            controller.window().len(),
            controller.window().has_start()
        );
    }
    println!("renderer saw {} commits", controller.renderer().commits);
    Ok(())
}
