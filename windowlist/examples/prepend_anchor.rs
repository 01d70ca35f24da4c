use std::sync::Arc;

use windowlist::{ClientState, ListOptions, RenderPlan, Statistics, Tile, Window};

fn main() {
    // Loading older items above the viewport must not move the visible content.
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);

    let recent: Vec<String> = (100..120).map(|i| format!("msg-{i:04}")).collect();
    let window = Window::new(
        vec![Tile::from_keys(recent.iter().cloned()).expect("sorted")],
        false,
        false,
    )
    .expect("single tile");
    let client = ClientState::new(0)
        .with_scroll(options.spacer_size + 300.0, 400.0)
        .with_sizes(recent.iter().map(|k| (k.clone(), 50.0)));
    let before = RenderPlan::new(Arc::new(window.clone()), Some(&client), &mut stats, &options);
    println!(
        "before: viewport={} spacer={} scroll_top={}",
        before.viewport(),
        before.spacer_size(),
        before.scroll_top()
    );

    let older: Vec<String> = (92..100).map(|i| format!("msg-{i:04}")).collect();
    let page = Window::new(
        vec![Tile::from_keys(older.iter().cloned()).expect("sorted")],
        false,
        false,
    )
    .expect("single tile");
    let client = ClientState::new(before.render_index())
        .with_sizes(older.iter().map(|k| (k.clone(), 50.0)));
    let after = before.next(Arc::new(window.merge(&page)), Some(&client), &mut stats, &options);

    // The spacer absorbs the growth, so the scroll offset stays the same.
    println!(
        "after: viewport={} spacer={} scroll_top={} must_scroll={}",
        after.viewport(),
        after.spacer_size(),
        after.scroll_top(),
        after.must_scroll()
    );
}
