//! Engine lifecycle, queries and host output

use super::*;
use crate::highlight::backend::{BackendKind, HighlightRange, PaintMode};
use crate::highlight::engine::EngineEvent;

fn count_event(token: &TermToken, count: usize) -> EngineEvent {
    EngineEvent::OccurrenceCount {
        token: token.clone(),
        count,
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_backend_follows_capability_preference() {
    let (doc, _) = page(&["x"]);
    let all = Capabilities {
        highlight_api: true,
        paint_worklet: true,
        element_capture: true,
    };
    assert_eq!(
        engine_with(doc, EngineConfig::eager(), all).backend_kind(),
        BackendKind::RangeHighlight
    );

    let (doc, _) = page(&["x"]);
    let capture = Capabilities {
        element_capture: true,
        ..Capabilities::default()
    };
    assert_eq!(
        engine_with(doc, EngineConfig::eager(), capture).backend_kind(),
        BackendKind::Paint(PaintMode::Capture)
    );
}

#[test]
fn test_initial_pass_waits_for_tick() {
    let (doc, paragraphs) = page(&["a cat and a cat"]);
    let mut engine = engine_with(doc, EngineConfig::default(), Capabilities::default());
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();

    assert!(engine.is_active());
    assert!(engine.is_initial_pending());
    assert!(markers(engine.document()).is_empty());

    // edits before the first pass are covered by it
    let unit = engine.document().first_child(paragraphs[0]).unwrap();
    engine.document_mut().set_text(unit, "cat cat cat").unwrap();
    engine.process_mutations(0.0);
    assert_eq!(engine.stats().recomputes, 0);

    assert!(engine.tick(0.0).unwrap());
    assert!(!engine.is_initial_pending());
    assert_eq!(markers(engine.document()).len(), 3);
    assert!(!engine.tick(1.0).unwrap());
}

#[test]
fn test_unchanged_term_list_does_not_rescan() {
    let (doc, _) = page(&["a cat"]);
    let mut engine = range_engine(doc);
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();
    assert_eq!(engine.stats().recomputes, 1);
}

#[test]
fn test_end_highlighting_discards_everything() {
    let (doc, paragraphs) = page(&["a cat"]);
    let mut engine = element_engine(doc);
    engine.start_highlighting(vec![literal("cat")], &[], &[]).unwrap();
    engine.take_render_updates();
    engine.end_highlighting().unwrap();

    assert!(!engine.is_active());
    assert!(markers(engine.document()).is_empty());
    assert!(engine.terms().is_empty());
    assert!(engine.cache().is_empty());
    let updates = engine.take_render_updates();
    assert!(updates.contains(&RenderUpdate::ScrollGutter {
        markup: String::new()
    }));

    // no longer observing
    let unit = engine.document().first_child(paragraphs[0]).unwrap();
    engine.document_mut().set_text(unit, "cat cat").unwrap();
    engine.process_mutations(0.0);
    assert_eq!(engine.stats().recomputes, 0);
    assert!(markers(engine.document()).is_empty());
}

// ============================================================================
// Counts & Events
// ============================================================================

#[test]
fn test_counts_are_reported_on_change_only() {
    let (doc, _) = page(&["cat and dog"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("dog"), literal("owl")], &[], &[])
        .unwrap();
    let (cat, dog) = (token(&engine, 0), token(&engine, 1));

    let events = engine.take_events();
    assert_eq!(events.len(), 2);
    assert!(events.contains(&count_event(&cat, 1)));
    assert!(events.contains(&count_event(&dog, 1)));

    engine.undo_highlights(Some(std::slice::from_ref(&dog))).unwrap();
    assert_eq!(engine.take_events(), vec![count_event(&dog, 0)]);
    assert_eq!(engine.terms().len(), 2);
}

#[test]
fn test_occurrence_count_and_existence() {
    let (doc, _) = page(&["cat cat", "no match"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("owl")], &[], &[])
        .unwrap();
    let (cat, owl) = (token(&engine, 0), token(&engine, 1));

    assert_eq!(engine.term_occurrence_count(&cat, false), 2);
    assert_eq!(engine.term_occurrence_count(&cat, true), 1);
    assert_eq!(engine.term_occurrence_count(&owl, true), 0);
    assert_eq!(
        engine.term_occurrence_count(&TermToken("stranger".to_string()), false),
        0
    );
}

// ============================================================================
// Range Output
// ============================================================================

#[test]
fn test_ranges_published_per_term() {
    let (doc, paragraphs) = page(&["cat and dog"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("dog")], &[], &[])
        .unwrap();
    let (cat, dog) = (token(&engine, 0), token(&engine, 1));
    let unit = engine.document().first_child(paragraphs[0]).unwrap();

    let updates = engine.take_render_updates();
    assert!(updates.contains(&RenderUpdate::HighlightRanges {
        token: cat.clone(),
        ranges: vec![HighlightRange {
            node: unit,
            start: 0,
            end: 3
        }],
    }));
    assert!(updates.contains(&RenderUpdate::HighlightRanges {
        token: dog.clone(),
        ranges: vec![HighlightRange {
            node: unit,
            start: 8,
            end: 11
        }],
    }));
    // the tree is left untouched
    assert_eq!(engine.document().children(paragraphs[0]), &[unit]);

    engine.undo_highlights(None).unwrap();
    let updates = engine.take_render_updates();
    assert!(updates.contains(&RenderUpdate::ClearHighlight { token: cat }));
    assert!(updates.contains(&RenderUpdate::ClearHighlight { token: dog }));
}

// ============================================================================
// Scroll Markers & Styles
// ============================================================================

#[test]
fn test_scroll_markers_stack_terms_sharing_a_container() {
    let (doc, paragraphs) = page(&["cat and dog", "filler", "dog"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("dog")], &[], &[])
        .unwrap();
    let (cat, dog) = (token(&engine, 0), token(&engine, 1));
    engine.take_render_updates();

    let placed = engine.insert_scroll_markers(&[cat.clone(), dog.clone()], &[300, 60]);
    let summary: Vec<(NodeId, TermToken, u16, f64)> = placed
        .iter()
        .map(|m| (m.container, m.token.clone(), m.hue, m.offset_px))
        .collect();
    assert_eq!(
        summary,
        vec![
            (paragraphs[0], cat.clone(), 300, 0.0),
            (paragraphs[0], dog.clone(), 60, 3.0),
            (paragraphs[2], dog.clone(), 60, 0.0),
        ]
    );
    assert_eq!(placed[0].top, 0.0);
    // third line of a document shorter than the 600px viewport
    assert_eq!(placed[2].top, 32.0 / 600.0);

    let gutter = engine
        .take_render_updates()
        .into_iter()
        .find_map(|u| match u {
            RenderUpdate::ScrollGutter { markup } => Some(markup),
            _ => None,
        })
        .unwrap();
    assert!(gutter.starts_with("<div class=\"termlight-markers\">"));
    assert!(gutter.contains("right: 3px"));
    assert_eq!(gutter.matches("termlight-term-").count(), 3);
}

#[test]
fn test_scroll_markers_limited_to_hue_count() {
    let (doc, _) = page(&["cat and dog"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("dog")], &[], &[])
        .unwrap();
    let (cat, dog) = (token(&engine, 0), token(&engine, 1));

    let placed = engine.insert_scroll_markers(&[dog.clone(), cat], &[110]);
    assert_eq!(placed.len(), 1);
    assert_eq!((placed[0].token.clone(), placed[0].hue), (dog, 110));
}

#[test]
fn test_style_fragments_follow_term_list() {
    let (doc, _) = page(&["cat"]);
    let mut engine = range_engine(doc);
    engine
        .start_highlighting(vec![literal("cat"), literal("dog"), literal("owl")], &[], &[])
        .unwrap();
    engine.set_hues(vec![200, 20]);

    let fragments = engine.style_fragments();
    assert_eq!(fragments.len(), 4);
    assert!(fragments[0].css.starts_with("::highlight(termlight-term-"));
    assert_eq!(fragments[2].hue, Some(200));
    assert!(fragments[2].css.contains("dashed"));
    assert_eq!(fragments[3].term_index, None);
}
