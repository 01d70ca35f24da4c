use crate::*;

use std::sync::Arc;

use proptest::prelude::*;

fn letters(range: std::ops::RangeInclusive<char>) -> Vec<String> {
    range.map(String::from).collect()
}

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i:02}")).collect()
}

fn tile(keys: &[String]) -> Tile {
    Tile::from_keys(keys.iter().cloned()).unwrap()
}

fn window(tiles: Vec<Tile>, has_start: bool, has_end: bool) -> Arc<Window> {
    Arc::new(Window::new(tiles, has_start, has_end).unwrap())
}

fn sizes(keys: &[String], size: f64) -> Vec<(String, f64)> {
    keys.iter().map(|k| (k.clone(), size)).collect()
}

fn keys_of(plan: &RenderPlan) -> Vec<&str> {
    plan.items().iter().map(|item| item.key.as_str()).collect()
}

fn assert_gap_free(plan: &RenderPlan) {
    let items = plan.items();
    if let Some(first) = items.first() {
        assert_eq!(first.start, 0.0);
    }
    for pair in items.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "{} / {}", pair[0].key, pair[1].key);
    }
}

#[test]
fn tile_rejects_empty_and_unordered_items() {
    assert_eq!(Tile::new(Vec::new()), Err(WindowError::EmptyTile));
    assert_eq!(
        Tile::from_keys(["b", "a"]),
        Err(WindowError::UnorderedKeys {
            prev: "b".into(),
            next: "a".into()
        })
    );
    assert!(matches!(
        Tile::from_keys(["a", "a"]),
        Err(WindowError::UnorderedKeys { .. })
    ));
}

#[test]
fn window_rejects_overlapping_tiles() {
    let err = Window::new(
        vec![tile(&letters('a'..='d')), tile(&letters('c'..='f'))],
        false,
        false,
    )
    .unwrap_err();
    assert_eq!(
        err,
        WindowError::OverlappingTiles {
            prev_last: "d".into(),
            first: "c".into()
        }
    );
}

#[test]
fn window_iterates_items_in_both_directions() {
    let w = window(
        vec![tile(&letters('a'..='c')), tile(&letters('x'..='z'))],
        true,
        false,
    );
    let forward: Vec<&str> = w.items().map(Item::key).collect();
    let backward: Vec<&str> = w.items_rev().map(Item::key).collect();
    assert_eq!(forward, ["a", "b", "c", "x", "y", "z"]);
    assert_eq!(backward, ["z", "y", "x", "c", "b", "a"]);
    assert_eq!(w.len(), 6);
    assert_eq!(w.key_range(), Some(KeyRange::new("a", "z")));
    assert!(w.contains_key("y"));
    assert!(!w.contains_key("d"));
}

#[test]
fn merge_prefers_newer_items_and_splits_old_tiles() {
    let old = Window::new(vec![tile(&letters('a'..='e'))], false, false).unwrap();
    let newer = Window::new(
        vec![Tile::new(vec![Item::new("c").with_size(10.0)]).unwrap()],
        false,
        true,
    )
    .unwrap();
    let merged = old.merge(&newer);

    let tiles: Vec<(String, String)> = merged
        .tiles()
        .iter()
        .map(|t| (t.first_key().to_owned(), t.last_key().to_owned()))
        .collect();
    assert_eq!(
        tiles,
        [
            ("a".to_owned(), "b".to_owned()),
            ("c".to_owned(), "c".to_owned()),
            ("d".to_owned(), "e".to_owned())
        ]
    );
    let c = merged.items().find(|item| item.key() == "c").unwrap();
    assert_eq!(c.size(), Some(10.0));
    assert!(!merged.has_start());
    assert!(merged.has_end());
}

#[test]
fn retain_keeps_boundary_flags_only_with_their_items() {
    let w = Window::new(vec![tile(&letters('a'..='j'))], true, true).unwrap();
    let kept = w.retain(&KeyRange::new("c", "j"));
    assert_eq!(kept.len(), 8);
    assert!(!kept.has_start());
    assert!(kept.has_end());
}

#[test]
fn running_average_rescales_without_changing_the_mean() {
    let mut avg = RunningAverage::new(10, 5);
    assert_eq!(avg.value(), None);
    for _ in 0..11 {
        avg.add(2.0, 1.0);
    }
    assert_eq!(avg.count(), 5.0);
    assert!((avg.value().unwrap() - 2.0).abs() < 1e-9);

    avg.add(8.0, 1.0);
    assert!((avg.value().unwrap() - 3.0).abs() < 1e-9);
}

#[test]
fn item_size_estimate_holds_through_rebalancing() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    for _ in 0..1000 {
        stats.add_item_size(50.0);
    }
    assert_eq!(stats.item_size_samples(), 1000.0);
    assert_eq!(stats.item_size_estimate(), 50.0);

    // Crosses the 1000-sample threshold twice; each time the count drops back to 100.
    for _ in 0..1001 {
        stats.add_item_size(50.0);
    }
    assert_eq!(stats.item_size_samples(), 199.0);
    assert!((stats.item_size_estimate() - 50.0).abs() < 1e-9);
}

#[test]
fn weighted_items_count_as_several_entries() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    stats.add_weighted_item_size(120.0, 3);
    stats.add_item_size(40.0);
    assert_eq!(stats.item_size_samples(), 4.0);
    assert_eq!(stats.item_size_estimate(), 40.0);

    let items = vec![
        Item::new("a").with_count_as(3),
        Item::new("b"),
        Item::new("c"),
        Item::new("d"),
        Item::new("e").with_count_as(2),
    ];
    let w = Window::new(vec![Tile::new(items).unwrap()], false, false).unwrap();
    assert_eq!(w.weight(), 8);

    let query = Query {
        key_range: Some(KeyRange::new("c", "d")),
        coordinate_range: Range::default(),
        expand_start: 5,
        expand_end: 5,
        expected_count: Some(12),
        evict: false,
    };
    let mut stats = Statistics::new(&options);
    record_response(&query, &w, &mut stats);
    assert!((stats.fulfillment_ratio() - 0.6).abs() < 1e-9);
}

#[test]
fn fulfillment_ratio_defaults_to_one_and_is_clamped() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    assert_eq!(stats.fulfillment_ratio(), 1.0);
    assert_eq!(stats.item_size_estimate(), 50.0);

    stats.add_response(0, 0);
    assert_eq!(stats.response_samples(), 0.0);

    stats.add_response(1, 4);
    assert!((stats.fulfillment_ratio() - 0.25).abs() < 1e-9);

    stats.add_response(0, 100);
    assert_eq!(stats.fulfillment_ratio(), options.min_fulfillment_ratio);
}

#[test]
fn statistics_ignore_invalid_sizes() {
    let mut stats = Statistics::new(&ListOptions::default());
    stats.add_item_size(f64::NAN);
    stats.add_item_size(-3.0);
    assert_eq!(stats.item_size_samples(), 0.0);
    stats.add_item_size(20.0);
    assert_eq!(stats.item_size_estimate(), 20.0);
}

#[test]
fn client_state_merge_unions_sizes_and_keeps_latest_scroll() {
    let mut state = ClientState::new(3)
        .with_scroll(100.0, 400.0)
        .with_size("a", 10.0)
        .with_size("b", 20.0);
    state.merge(
        ClientState::new(3)
            .with_scroll(150.0, 400.0)
            .with_size("b", 25.0)
            .with_safe_to_scroll(true),
    );
    assert_eq!(state.scroll_top, Some(150.0));
    assert_eq!(state.measured_sizes.len(), 2);
    assert_eq!(state.measured_sizes["b"], 25.0);
    assert!(state.is_safe_to_scroll);

    state.merge(ClientState::new(3).with_size("c", 5.0));
    assert_eq!(state.scroll_top, Some(150.0));
    assert!(!state.is_safe_to_scroll);
}

#[test]
fn empty_window_produces_empty_plan() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let plan = RenderPlan::new(Arc::new(Window::empty()), None, &mut stats, &options);

    assert!(plan.items().is_empty());
    assert_eq!(plan.viewport(), Range::default());
    assert_eq!(plan.spacer_size(), options.spacer_size);
    assert_eq!(plan.sticky_edge(), None);
    assert_eq!(plan.render_index(), 1);
}

#[test]
fn first_plan_lays_out_measured_items_from_zero() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='z');
    let w = window(
        vec![
            tile(&letters('a'..='h')),
            tile(&letters('i'..='p')),
            tile(&letters('q'..='z')),
        ],
        true,
        false,
    );
    let client = ClientState::new(0)
        .with_scroll(0.0, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);

    assert_gap_free(&plan);
    assert_eq!(plan.items().len(), 26);
    assert_eq!(plan.item("z").map(ItemRange::range), Some(Range::new(1250.0, 1300.0)));
    assert_eq!(plan.spacer_size(), 0.0);
    assert_eq!(plan.end_spacer_size(), options.spacer_size);
    assert_eq!(plan.full_range(), Range::new(0.0, 1300.0 + options.spacer_size));
    assert!(plan.is_start_aligned());
    assert_eq!(plan.viewport(), Range::new(0.0, 400.0));
    assert_eq!(stats.item_size_samples(), 26.0);
    assert!(!plan.is_fully_loaded(plan.viewport(), &options));
}

#[test]
fn query_expands_towards_the_missing_end() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='z');
    let w = window(
        vec![
            tile(&letters('a'..='h')),
            tile(&letters('i'..='p')),
            tile(&letters('q'..='z')),
        ],
        true,
        false,
    );
    let client = ClientState::new(0)
        .with_scroll(0.0, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);
    // Start-aligned, but the list grows at the preferred (end) edge.
    assert_eq!(plan.sticky_edge(), Some(Edge::Start));

    let query = QueryBuilder::compute(&plan, &stats, &options).unwrap();
    assert_eq!(query.expand_start, 0);
    assert_eq!(query.expand_end, 6);
    assert_eq!(query.key_range, Some(KeyRange::new("a", "z")));
    assert_eq!(query.coordinate_range, Range::new(0.0, 1300.0));
    assert_eq!(query.expected_count, Some(32));
    assert!(!query.evict);

    stats.add_response(1, 2);
    let query = QueryBuilder::compute(&plan, &stats, &options).unwrap();
    assert_eq!(query.expand_end, 12);

    let capped = options.clone().with_max_expansion(4);
    let query = QueryBuilder::compute(&plan, &stats, &capped).unwrap();
    assert_eq!(query.expand_end, 4);
}

#[test]
fn followed_end_keeps_asking_for_new_items() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='t');
    let w = window(vec![tile(&keys)], false, true);
    let client = ClientState::new(0)
        .with_scroll(600.0 + options.spacer_size, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);
    assert_eq!(plan.sticky_edge(), Some(Edge::End));
    assert_eq!(plan.viewport(), Range::new(600.0, 1000.0));

    // The trimmed load zone ends at the loaded end, yet the followed edge is still queried.
    let query = QueryBuilder::compute(&plan, &stats, &options).unwrap();
    assert_eq!(query.expand_start, 12);
    assert_eq!(query.expand_end, options.max_expansion);
    assert_eq!(query.expected_count, Some(20 + 12 + options.max_expansion));

    let mut builder = QueryBuilder::new();
    assert_eq!(builder.build(&plan, &stats, &options), Some(query));
    assert_eq!(builder.build(&plan, &stats, &options), None);
}

#[test]
fn repeated_query_is_suppressed_until_forgotten() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='j');
    let w = window(vec![tile(&keys)], true, false);
    let client = ClientState::new(0)
        .with_scroll(0.0, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);

    let mut builder = QueryBuilder::new();
    let first = builder.build(&plan, &stats, &options);
    assert!(first.is_some());
    assert_eq!(builder.build(&plan, &stats, &options), None);
    assert_eq!(builder.last_query(), first.as_ref());

    builder.forget_last();
    assert_eq!(builder.build(&plan, &stats, &options), first);
}

#[test]
fn empty_window_issues_initial_query_from_preferred_edge() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let plan = RenderPlan::new(Arc::new(Window::empty()), None, &mut stats, &options);

    let query = QueryBuilder::compute(&plan, &stats, &options).unwrap();
    assert!(query.is_initial());
    assert_eq!(query.expand_start, 173);
    assert_eq!(query.expand_end, 0);

    let options = options.with_preferred_edge(Edge::Start);
    let query = QueryBuilder::compute(&plan, &stats, &options).unwrap();
    assert_eq!((query.expand_start, query.expand_end), (0, 173));

    let complete = window(Vec::new(), true, true);
    let plan = RenderPlan::new(complete, None, &mut stats, &options);
    assert_eq!(QueryBuilder::compute(&plan, &stats, &options), None);
}

#[test]
fn unmeasured_items_are_listed_and_block_queries() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let w = window(vec![tile(&letters('a'..='c'))], false, false);
    let client = ClientState::new(0).with_scroll(8640.0, 400.0).with_size("a", 40.0);
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);

    assert_eq!(keys_of(&plan), ["a"]);
    assert_eq!(plan.unmeasured_keys(), ["b".to_owned(), "c".to_owned()]);
    assert!(plan.has_unmeasured_items());
    assert_eq!(QueryBuilder::compute(&plan, &stats, &options), None);
}

#[test]
fn sizes_for_unknown_keys_are_ignored() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='c');
    let w = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_sizes(sizes(&keys, 30.0))
        .with_size("zzz", 500.0);
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);

    assert_eq!(keys_of(&plan), ["a", "b", "c"]);
    assert_eq!(stats.item_size_samples(), 3.0);
    assert_eq!(stats.item_size_estimate(), 30.0);
}

#[test]
fn prepending_keeps_content_under_the_viewport() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let lower = letters('a'..='t');
    let upper = letters('A'..='H');
    let w1 = window(vec![tile(&lower)], false, false);
    let client = ClientState::new(0)
        .with_scroll(300.0 + options.spacer_size, 400.0)
        .with_sizes(sizes(&lower, 50.0));
    let plan1 = RenderPlan::new(w1.clone(), Some(&client), &mut stats, &options);
    assert_eq!(plan1.viewport(), Range::new(300.0, 700.0));
    assert_eq!(plan1.spacer_size(), 8640.0);

    let prepended = Window::new(vec![tile(&upper)], false, false).unwrap();
    let w2 = Arc::new(w1.merge(&prepended));
    let client = ClientState::new(1).with_sizes(sizes(&upper, 50.0));
    let plan2 = plan1.next(w2, Some(&client), &mut stats, &options);

    assert_gap_free(&plan2);
    assert_eq!(plan2.render_index(), 2);
    assert_eq!(plan2.item("a").map(|item| item.start), Some(400.0));
    assert_eq!(plan2.viewport(), Range::new(700.0, 1100.0));
    assert_eq!(plan2.spacer_size(), 8240.0);
    assert!(!plan2.must_scroll());
    assert_eq!(plan2.scroll_top(), plan1.scroll_top());
}

#[test]
fn growing_item_above_viewport_moves_viewport_with_content() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='d');
    let w = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_scroll(50.0 + options.spacer_size, 100.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan1 = RenderPlan::new(w.clone(), Some(&client), &mut stats, &options);

    let client = ClientState::new(1).with_size("a", 150.0);
    let plan2 = plan1.next(w, Some(&client), &mut stats, &options);

    assert_gap_free(&plan2);
    assert_eq!(plan2.item("b").map(|item| item.start), Some(150.0));
    assert_eq!(plan2.viewport(), Range::new(150.0, 250.0));
    assert_eq!(plan2.spacer_size(), options.spacer_size - 100.0);
    assert_eq!(stats.item_size_samples(), 4.0);
    assert_eq!(stats.item_size_estimate(), 75.0);
}

#[test]
fn remeasured_item_above_viewport_keeps_visible_item_in_place() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='t');
    let w = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_scroll(500.0 + options.spacer_size, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan1 = RenderPlan::new(w.clone(), Some(&client), &mut stats, &options);
    assert_eq!(plan1.viewport(), Range::new(500.0, 900.0));
    assert_eq!(plan1.item("k").map(|item| item.start), Some(500.0));

    let client = ClientState::new(1).with_size("c", 150.0);
    let plan2 = plan1.next(w, Some(&client), &mut stats, &options);

    assert_gap_free(&plan2);
    assert_eq!(plan2.item("a").map(|item| item.start), Some(0.0));
    assert_eq!(plan2.item("k").map(|item| item.start), Some(600.0));
    assert_eq!(plan2.viewport(), Range::new(600.0, 1000.0));
    assert_eq!(plan2.spacer_size(), options.spacer_size - 100.0);
    assert!(!plan2.must_scroll());
    assert_eq!(plan2.scroll_top(), plan1.scroll_top());
    assert_eq!(stats.item_size_samples(), 20.0);
    assert_eq!(stats.item_size_estimate(), 55.0);
}

#[test]
fn preset_sizes_are_not_withdrawn_from_statistics() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    for _ in 0..3 {
        stats.add_item_size(50.0);
    }
    let items = vec![Item::new("a").with_size(40.0), Item::new("b").with_size(40.0)];
    let w = Arc::new(Window::new(vec![Tile::new(items).unwrap()], true, true).unwrap());
    let plan1 = RenderPlan::new(w.clone(), None, &mut stats, &options);
    assert_eq!(plan1.items().len(), 2);
    assert_eq!(stats.item_size_samples(), 3.0);

    let client = ClientState::new(1).with_size("a", 60.0);
    let plan2 = plan1.next(w.clone(), Some(&client), &mut stats, &options);
    assert_eq!(stats.item_size_samples(), 4.0);
    assert!((stats.item_size_estimate() - 52.5).abs() < 1e-9);

    // Once measured, a new size replaces the recorded one.
    let client = ClientState::new(2).with_size("a", 80.0);
    plan2.next(w, Some(&client), &mut stats, &options);
    assert_eq!(stats.item_size_samples(), 4.0);
    assert!((stats.item_size_estimate() - 57.5).abs() < 1e-9);
}

#[test]
fn spacer_resize_waits_until_safe_to_scroll() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let big = letters('a'..='j');
    let small = letters('k'..='t');
    let w1 = window(vec![tile(&big), tile(&small)], false, false);
    let client = ClientState::new(0)
        .with_scroll(5000.0 + options.spacer_size, 400.0)
        .with_sizes(sizes(&big, 500.0))
        .with_sizes(sizes(&small, 50.0));
    let plan1 = RenderPlan::new(w1.clone(), Some(&client), &mut stats, &options);
    assert_eq!(plan1.viewport(), Range::new(5000.0, 5400.0));

    let w2 = Arc::new(w1.retain(&KeyRange::new("k", "t")));
    let plan2 = plan1.next(w2.clone(), None, &mut stats, &options);
    assert_eq!(plan2.viewport(), Range::new(0.0, 400.0));
    assert_eq!(plan2.spacer_size(), 13640.0);
    assert!(!plan2.must_scroll());
    assert!(plan2.notify_when_safe_to_scroll());
    assert_eq!(plan2.scroll_top(), plan1.scroll_top());

    let client = ClientState::new(2).with_safe_to_scroll(true);
    let plan3 = plan2.next(w2, Some(&client), &mut stats, &options);
    assert_eq!(plan3.spacer_size(), 8640.0);
    assert!(plan3.must_scroll());
    assert!(!plan3.notify_when_safe_to_scroll());
    assert_eq!(plan3.scroll_top(), 8640.0);
}

#[test]
fn end_aligned_list_follows_appended_items() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='j');
    let w1 = window(vec![tile(&keys)], false, true);
    let client = ClientState::new(0)
        .with_scroll(options.spacer_size, 200.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan1 = RenderPlan::new(w1.clone(), Some(&client), &mut stats, &options);
    assert!(plan1.is_end_aligned());
    assert_eq!(plan1.sticky_edge(), Some(Edge::End));
    assert!(plan1.must_scroll());
    assert_eq!(plan1.viewport(), Range::new(300.0, 500.0));

    let appended = letters('k'..='l');
    let tail = Window::new(vec![tile(&appended)], false, true).unwrap();
    let w2 = Arc::new(w1.merge(&tail));
    let client = ClientState::new(1).with_sizes(sizes(&appended, 50.0));
    let plan2 = plan1.next(w2.clone(), Some(&client), &mut stats, &options);
    assert!(plan2.is_end_aligned());
    assert!(plan2.must_scroll());
    assert_eq!(plan2.viewport(), Range::new(400.0, 600.0));

    // Scrolling away from the end releases the edge.
    let client = ClientState::new(2).with_scroll(options.spacer_size, 200.0);
    let plan3 = plan2.next(w2, Some(&client), &mut stats, &options);
    assert!(plan3.is_user_scroll_detected());
    assert!(!plan3.is_end_aligned());
    assert!(!plan3.must_scroll());
    assert_eq!(plan3.viewport(), Range::new(0.0, 200.0));
}

#[test]
fn short_complete_list_sticks_to_preferred_edge_only() {
    let keys = letters('a'..='d');
    let w = window(vec![tile(&keys)], true, true);
    let client = ClientState::new(0)
        .with_scroll(0.0, 400.0)
        .with_sizes(sizes(&keys, 50.0));

    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let plan = RenderPlan::new(w.clone(), Some(&client), &mut stats, &options);
    assert!(plan.is_end_aligned());
    assert!(!plan.is_start_aligned());
    assert_eq!(plan.viewport(), Range::new(-200.0, 200.0));
    assert!(plan.is_fully_loaded(plan.viewport(), &options));

    let options = ListOptions::default().with_preferred_edge(Edge::Start);
    let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);
    assert_eq!(plan.sticky_edge(), Some(Edge::Start));
    assert_eq!(plan.viewport(), Range::new(0.0, 400.0));
}

#[test]
fn reaching_dataset_start_collapses_spacer() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('c'..='f');
    let w1 = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_scroll(options.spacer_size, 200.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan1 = RenderPlan::new(w1.clone(), Some(&client), &mut stats, &options);

    let head = letters('a'..='b');
    let w2 = Arc::new(w1.merge(&Window::new(vec![tile(&head)], true, false).unwrap()));
    let client = ClientState::new(1).with_sizes(sizes(&head, 50.0));
    let plan2 = plan1.next(w2, Some(&client), &mut stats, &options);

    assert!(plan2.must_scroll());
    assert_eq!(plan2.spacer_size(), 0.0);
    assert_eq!(plan2.viewport(), Range::new(100.0, 300.0));
    assert_eq!(plan2.scroll_top(), 100.0);
}

#[test]
fn disjoint_window_resets_viewport() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let old = letters('a'..='d');
    let new = letters('w'..='z');
    let client = ClientState::new(0)
        .with_scroll(100.0 + options.spacer_size, 150.0)
        .with_sizes(sizes(&old, 50.0));
    let plan1 = RenderPlan::new(
        window(vec![tile(&old)], false, false),
        Some(&client),
        &mut stats,
        &options,
    );

    let client = ClientState::new(1).with_sizes(sizes(&new, 50.0));
    let plan2 = plan1.next(
        window(vec![tile(&new)], false, false),
        Some(&client),
        &mut stats,
        &options,
    );
    assert!(plan2.must_scroll());
    assert_eq!(plan2.viewport(), Range::new(0.0, 150.0));
}

#[test]
fn scroll_to_key_is_applied_once() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='t');
    let w1 = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_scroll(options.spacer_size, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan1 = RenderPlan::new(w1.clone(), Some(&client), &mut stats, &options);

    let w2 = Arc::new(w1.as_ref().clone().with_scroll_to_key("k"));
    let plan2 = plan1.next(w2.clone(), None, &mut stats, &options);
    assert!(plan2.must_scroll());
    assert_eq!(plan2.viewport(), Range::new(500.0, 900.0));

    let plan3 = plan2.next(w2, None, &mut stats, &options);
    assert!(!plan3.must_scroll());
    assert_eq!(plan3.viewport(), Range::new(500.0, 900.0));
}

#[test]
fn replanning_same_inputs_is_idempotent() {
    let options = ListOptions::default();
    let mut stats = Statistics::new(&options);
    let keys = letters('a'..='t');
    let w = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_scroll(250.0 + options.spacer_size, 400.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan1 = RenderPlan::new(w.clone(), Some(&client), &mut stats, &options);

    let a = plan1.next(w.clone(), None, &mut stats, &options);
    let b = plan1.next(w, None, &mut stats, &options);
    assert_eq!(a, b);
    assert_eq!(a.items(), plan1.items());
    assert_eq!(a.viewport(), plan1.viewport());
    assert_eq!(a.spacer_size(), plan1.spacer_size());
    assert!(!a.must_scroll());
}

#[test]
fn record_response_skips_reached_boundaries() {
    let options = ListOptions::default();
    let query = Query {
        key_range: Some(KeyRange::new("c", "d")),
        coordinate_range: Range::new(0.0, 100.0),
        expand_start: 5,
        expand_end: 5,
        expected_count: Some(12),
        evict: false,
    };

    let mut stats = Statistics::new(&options);
    let open = Window::new(vec![tile(&letters('a'..='e'))], false, false).unwrap();
    record_response(&query, &open, &mut stats);
    assert!((stats.fulfillment_ratio() - 0.3).abs() < 1e-9);

    let mut stats = Statistics::new(&options);
    let headed = Window::new(vec![tile(&letters('a'..='e'))], true, false).unwrap();
    record_response(&query, &headed, &mut stats);
    assert!((stats.fulfillment_ratio() - 0.2).abs() < 1e-9);
}

fn eviction_fixture(options: &ListOptions) -> (RenderPlan, Statistics) {
    let mut stats = Statistics::new(options);
    let keys = numbered("k", 40);
    let w = window(vec![tile(&keys)], false, false);
    let client = ClientState::new(0)
        .with_scroll(1800.0 + options.spacer_size, 100.0)
        .with_sizes(sizes(&keys, 50.0));
    let plan = RenderPlan::new(w, Some(&client), &mut stats, options);
    (plan, stats)
}

#[test]
fn eviction_query_drops_far_items_after_delay() {
    let options = ListOptions::default()
        .with_buffer_zone_multiplier(6.0)
        .with_eviction(5, 1000);
    let (plan, _) = eviction_fixture(&options);
    assert_eq!(plan.viewport(), Range::new(1800.0, 1900.0));

    let mut tracker = EvictionTracker::new();
    tracker.observe(&plan, &options, 0);
    assert_eq!(tracker.len(), 24);
    assert_eq!(tracker.next_ripe_ms(&options), Some(1000));
    assert_eq!(tracker.eviction_query(&plan, &options, 999), None);

    let query = tracker.eviction_query(&plan, &options, 1000).unwrap();
    assert!(query.evict);
    assert_eq!(query.key_range, Some(KeyRange::new("k23", "k39")));
    assert_eq!(query.coordinate_range, Range::new(1150.0, 2000.0));
    assert_eq!(query.expected_count, Some(17));
    assert_eq!((query.expand_start, query.expand_end), (0, 0));

    let kept = plan.window().retain(query.key_range.as_ref().unwrap());
    assert_eq!(kept.len(), 17);
}

#[test]
fn eviction_respects_threshold_and_timestamps() {
    let options = ListOptions::default()
        .with_buffer_zone_multiplier(6.0)
        .with_eviction(30, 1000);
    let (plan, _) = eviction_fixture(&options);

    let mut tracker = EvictionTracker::new();
    tracker.observe(&plan, &options, 0);
    // Observing again keeps the original timestamps.
    tracker.observe(&plan, &options, 500);
    assert_eq!(tracker.evictable_count(&options, 1000), 24);
    assert_eq!(tracker.eviction_query(&plan, &options, 5000), None);

    tracker.clear();
    assert!(tracker.is_empty());
}

proptest! {
    #[test]
    fn layout_is_gap_free_after_prepend_and_remeasure(
        sizes_1 in prop::collection::vec(1.0f64..200.0, 1..40),
        prepended in prop::collection::vec(1.0f64..200.0, 0..20),
        remeasured in prop::collection::vec(prop::option::of(1.0f64..200.0), 1..40),
        scroll in 0.0f64..4000.0,
    ) {
        let options = ListOptions::default();
        let mut stats = Statistics::new(&options);
        let keys = numbered("m", sizes_1.len());
        let w1 = window(vec![tile(&keys)], false, false);
        let client = ClientState::new(0)
            .with_scroll(scroll + options.spacer_size, 300.0)
            .with_sizes(keys.iter().cloned().zip(sizes_1.iter().copied()));
        let plan1 = RenderPlan::new(w1.clone(), Some(&client), &mut stats, &options);
        assert_gap_free(&plan1);
        prop_assert_eq!(plan1.items().len(), keys.len());

        let head = numbered("a", prepended.len());
        let w2 = if head.is_empty() {
            w1
        } else {
            Arc::new(w1.merge(&Window::new(vec![tile(&head)], false, false).unwrap()))
        };
        let mut client = ClientState::new(1)
            .with_sizes(head.iter().cloned().zip(prepended.iter().copied()));
        for (key, size) in keys.iter().zip(&remeasured) {
            if let Some(size) = size {
                client = client.with_size(key.clone(), *size);
            }
        }
        let plan2 = plan1.next(w2, Some(&client), &mut stats, &options);
        assert_gap_free(&plan2);
        prop_assert_eq!(plan2.items().len(), keys.len() + head.len());
        prop_assert!(plan2.items().iter().all(|item| item.size() > 0.0));
    }

    #[test]
    fn complete_window_never_queries(
        count in 1usize..60,
        size in 1.0f64..300.0,
        scroll in -5000.0f64..20000.0,
        height in 0.0f64..2000.0,
    ) {
        let options = ListOptions::default();
        let mut stats = Statistics::new(&options);
        let keys = numbered("q", count);
        let w = window(vec![tile(&keys)], true, true);
        let client = ClientState::new(0)
            .with_scroll(scroll, height)
            .with_sizes(sizes(&keys, size));
        let plan = RenderPlan::new(w, Some(&client), &mut stats, &options);
        prop_assert_eq!(QueryBuilder::compute(&plan, &stats, &options), None);
        prop_assert!(plan.is_fully_loaded(plan.viewport(), &options));
    }
}
