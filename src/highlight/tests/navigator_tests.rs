//! Navigation between matches: modes, select mode and wraparound

use super::*;
use crate::highlight::navigator::{Direction, NavMode, ScrollBehavior};

fn navigable() -> (Highlighter, Vec<NodeId>) {
    let (doc, paragraphs) = page(&["cat one", "cat two cat"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("one")], &[], &[])
        .unwrap();
    (engine, paragraphs)
}

fn step(engine: &mut Highlighter, direction: Direction) -> Option<(NodeId, usize, usize)> {
    engine
        .focus_next_term(direction, NavMode::Step, None)
        .map(|o| (o.node, o.start, o.passes))
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn test_forward_visits_matches_in_document_order() {
    let (mut engine, paragraphs) = navigable();
    let first = engine.document().first_child(paragraphs[0]).unwrap();
    let second = engine.document().first_child(paragraphs[1]).unwrap();

    assert_eq!(step(&mut engine, Direction::Forward), Some((first, 0, 1)));
    assert_eq!(step(&mut engine, Direction::Forward), Some((first, 4, 1)));
    assert_eq!(step(&mut engine, Direction::Forward), Some((second, 0, 1)));
    assert_eq!(step(&mut engine, Direction::Forward), Some((second, 8, 1)));
}

#[test]
fn test_forward_past_last_wraps_exactly_once() {
    let (mut engine, paragraphs) = navigable();
    let first = engine.document().first_child(paragraphs[0]).unwrap();

    let mut wraps = 0;
    for _ in 0..12 {
        let outcome = engine
            .focus_next_term(Direction::Forward, NavMode::Step, None)
            .unwrap();
        // iteration guard: one restart at most per command
        assert!(outcome.passes <= 2);
        if outcome.wrapped() {
            wraps += 1;
            assert_eq!((outcome.node, outcome.start), (first, 0));
        }
    }
    // four matches, twelve steps: the first visit is not a wrap
    assert_eq!(wraps, 2);
}

#[test]
fn test_backward_starts_from_the_end() {
    let (mut engine, paragraphs) = navigable();
    let second = engine.document().first_child(paragraphs[1]).unwrap();
    assert_eq!(step(&mut engine, Direction::Backward), Some((second, 8, 1)));
    assert_eq!(step(&mut engine, Direction::Backward), Some((second, 0, 1)));
}

#[test]
fn test_wraparound_can_be_disabled() {
    let (doc, _) = page(&["one cat"]);
    let config = EngineConfig {
        max_wraps: 0,
        ..EngineConfig::eager()
    };
    let mut engine = engine_with(
        doc,
        config,
        Capabilities {
            highlight_api: true,
            ..Capabilities::default()
        },
    );
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();

    assert!(step(&mut engine, Direction::Forward).is_some());
    assert!(step(&mut engine, Direction::Forward).is_none());
}

#[test]
fn test_no_matches_yields_nothing() {
    let (doc, _) = page(&["nothing here"]);
    let mut engine = range_engine(doc);
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();
    assert!(step(&mut engine, Direction::Forward).is_none());
}

// ============================================================================
// Select mode
// ============================================================================

#[test]
fn test_select_mode_filters_to_one_term() {
    let (mut engine, paragraphs) = navigable();
    let first = engine.document().first_child(paragraphs[0]).unwrap();
    let one = token(&engine, 1);

    let outcome = engine
        .focus_next_term(Direction::Forward, NavMode::Step, Some(&one))
        .unwrap();
    assert_eq!((outcome.node, outcome.start, outcome.token.clone()), (first, 4, one.clone()));
    assert!(engine.navigator().select_mode());

    // the only match wraps onto itself
    let again = engine
        .focus_next_term(Direction::Forward, NavMode::Step, Some(&one))
        .unwrap();
    assert!(again.wrapped());

    engine.focus_next_term(Direction::Forward, NavMode::Step, None);
    assert!(!engine.navigator().select_mode());
}

#[test]
fn test_unknown_term_is_refused() {
    let (mut engine, _) = navigable();
    let stranger = TermToken("stranger".to_string());
    assert!(engine
        .focus_next_term(Direction::Forward, NavMode::Step, Some(&stranger))
        .is_none());
}

// ============================================================================
// Focus targets
// ============================================================================

#[test]
fn test_jump_selects_block_holding_a_single_match() {
    let (doc, paragraphs) = page(&["cat and cat", "one cat"]);
    let mut engine = element_engine(doc);
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();

    let outcome = engine
        .focus_next_term(Direction::Forward, NavMode::Jump, None)
        .unwrap();
    assert_eq!(outcome.scroll, ScrollBehavior::Smooth);
    assert_eq!(engine.document().tag(outcome.target), Some(MARKER_TAG));

    engine.focus_next_term(Direction::Forward, NavMode::Jump, None);
    let outcome = engine
        .focus_next_term(Direction::Forward, NavMode::Jump, None)
        .unwrap();
    assert_eq!(outcome.target, paragraphs[1]);

    let outcome = engine
        .focus_next_term(Direction::Backward, NavMode::Step, None)
        .unwrap();
    assert_eq!(outcome.scroll, ScrollBehavior::Instant);
    assert_eq!(engine.document().tag(outcome.target), Some(MARKER_TAG));
}

#[test]
fn test_unfocusable_targets_are_reverted() {
    let (mut engine, paragraphs) = navigable();
    let focus = engine.config().focus_class();
    let revert = engine.config().focus_revert_class();

    engine.focus_next_term(Direction::Forward, NavMode::Jump, None);
    let doc = engine.document();
    assert!(doc.has_class(paragraphs[0], &focus));
    assert!(doc.has_class(paragraphs[0], &revert));
    assert_eq!(doc.attribute(paragraphs[0], "tabindex"), Some("-1"));
    assert_eq!(engine.navigator().focused_element(), Some(paragraphs[0]));

    engine.focus_next_term(Direction::Backward, NavMode::Step, None);
    let doc = engine.document();
    assert!(!doc.has_class(paragraphs[0], &focus));
    assert!(!doc.has_class(paragraphs[0], &revert));
    assert_eq!(doc.attribute(paragraphs[0], "tabindex"), None);
    assert!(doc.has_class(paragraphs[1], &focus));
}

#[test]
fn test_natively_focusable_target_is_left_alone() {
    let mut doc = Document::new();
    let root = doc.root();
    let p = doc.append_element(root, "p").unwrap();
    let link = doc.append_element(p, "a").unwrap();
    doc.set_attribute(link, "href", "#cat").unwrap();
    doc.append_text(link, "cat link").unwrap();

    let mut engine = range_engine(doc);
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();
    let outcome = engine
        .focus_next_term(Direction::Forward, NavMode::Step, None)
        .unwrap();

    assert_eq!(outcome.target, link);
    assert!(engine.document().has_class(link, &engine.config().focus_class()));
    assert_eq!(engine.document().attribute(link, "tabindex"), None);
}

#[test]
fn test_undo_releases_focus() {
    let (mut engine, paragraphs) = navigable();
    engine.focus_next_term(Direction::Forward, NavMode::Jump, None);
    engine.undo_highlights(None).unwrap();

    let doc = engine.document();
    assert!(!doc.has_class(paragraphs[0], &engine.config().focus_class()));
    assert_eq!(doc.attribute(paragraphs[0], "tabindex"), None);
    assert_eq!(engine.navigator().focused_element(), None);
    assert!(step(&mut engine, Direction::Forward).is_none());
}

#[test]
fn test_focus_survives_release_of_focused_marker() {
    let (doc, paragraphs) = page(&["a cat", "a cat too"]);
    let mut engine = element_engine(doc);
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();
    engine.process_mutations(0.0);
    let focus = engine.config().focus_class();

    let first = engine
        .focus_next_term(Direction::Forward, NavMode::Step, None)
        .unwrap();
    assert_eq!(engine.document().parent(first.target), Some(paragraphs[0]));

    // rewrapping the paragraph releases the focused marker
    engine.document_mut().append_text(paragraphs[0], " here").unwrap();
    engine.process_mutations(1.0);
    assert!(!engine.document().exists(first.target));

    let next = engine
        .focus_next_term(Direction::Forward, NavMode::Step, None)
        .unwrap();
    let doc = engine.document();
    assert_ne!(next.target, first.target);
    assert_eq!(doc.parent(next.target), Some(paragraphs[0]));
    assert_eq!(doc.attribute(next.target, "tabindex"), Some("-1"));
    let focused: Vec<NodeId> = doc
        .descendants(doc.root())
        .filter(|n| doc.has_class(*n, &focus))
        .collect();
    assert_eq!(focused, vec![next.target]);
}
