use std::sync::Arc;

use windowlist::{ClientState, ListOptions, QueryBuilder, RenderPlan, Statistics, Tile, Window};

fn main() {
    // A chat-like list: the newest 26 messages are loaded, older ones are not.
    let keys: Vec<String> = ('a'..='z').map(String::from).collect();
    let tile = Tile::from_keys(keys.iter().cloned()).expect("keys are sorted");
    let window = Arc::new(Window::new(vec![tile], false, true).expect("single tile"));

    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);

    // First paint: nothing is measured yet.
    let plan = RenderPlan::new(Arc::clone(&window), None, &mut stats, &options);
    println!(
        "plan #{}: unmeasured={} laid_out={}",
        plan.render_index(),
        plan.unmeasured_keys().len(),
        plan.items().len()
    );

    // The renderer measured everything and reports a 400px viewport.
    let client = ClientState::new(plan.render_index())
        .with_scroll(options.spacer_size, 400.0)
        .with_sizes(keys.iter().map(|k| (k.clone(), 48.0)));
    let plan = plan.next(window, Some(&client), &mut stats, &options);
    println!(
        "plan #{}: viewport={} spacer={} sticky={:?} must_scroll={} scroll_top={}",
        plan.render_index(),
        plan.viewport(),
        plan.spacer_size(),
        plan.sticky_edge(),
        plan.must_scroll(),
        plan.scroll_top()
    );

    let mut queries = QueryBuilder::new();
    match queries.build(&plan, &stats, &options) {
        Some(q) => println!(
            "query: keys={:?} expand_start={} expand_end={}",
            q.key_range, q.expand_start, q.expand_end
        ),
        None => println!("query: nothing to load"),
    }
}
