//! Scenario suites for the highlight engine
//!
//! Every suite runs on the deterministic `GridLayout` (8px cells, 16px lines,
//! 800x600 viewport) with an eager configuration unless it says otherwise.

mod engine_tests;
mod navigator_tests;

use crate::dom::{Document, NodeId};
use crate::highlight::backend::{Capabilities, RenderUpdate};
use crate::highlight::classify::HighlightTagClassification;
use crate::highlight::config::EngineConfig;
use crate::highlight::engine::Highlighter;
use crate::highlight::terms::{MatchMode, Term, TermToken};
use crate::layout::GridLayout;

const MARKER_TAG: &str = "termlight-h";

/// `<body>` with one `<p>` per text. Returns the paragraphs.
fn page(texts: &[&str]) -> (Document, Vec<NodeId>) {
    let mut doc = Document::new();
    let root = doc.root();
    let mut paragraphs = Vec::new();
    for text in texts {
        let p = doc.append_element(root, "p").unwrap();
        doc.append_text(p, text).unwrap();
        paragraphs.push(p);
    }
    (doc, paragraphs)
}

fn layout() -> GridLayout {
    GridLayout::default().with_inline_tag(MARKER_TAG)
}

fn engine_with(doc: Document, config: EngineConfig, caps: Capabilities) -> Highlighter {
    Highlighter::new(doc, layout(), config, HighlightTagClassification::default(), caps).unwrap()
}

fn element_engine(doc: Document) -> Highlighter {
    engine_with(doc, EngineConfig::eager(), Capabilities::default())
}

fn range_engine(doc: Document) -> Highlighter {
    engine_with(
        doc,
        EngineConfig::eager(),
        Capabilities {
            highlight_api: true,
            ..Capabilities::default()
        },
    )
}

fn paint_engine(doc: Document) -> Highlighter {
    engine_with(
        doc,
        EngineConfig::eager(),
        Capabilities {
            paint_worklet: true,
            ..Capabilities::default()
        },
    )
}

fn literal(phrase: &str) -> Term {
    Term::literal(phrase).unwrap()
}

fn whole(phrase: &str) -> Term {
    Term::new(
        phrase,
        MatchMode {
            whole: true,
            ..MatchMode::default()
        },
    )
    .unwrap()
}

fn token(engine: &Highlighter, index: usize) -> TermToken {
    engine.terms()[index].token().clone()
}

/// Marker elements currently in the document, in document order
fn markers(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .filter(|n| doc.tag(*n) == Some(MARKER_TAG))
        .collect()
}

/// Style rules emitted for a slot, in emission order
fn rules_for(updates: &[RenderUpdate], slot: usize) -> Vec<String> {
    updates
        .iter()
        .filter_map(|u| match u {
            RenderUpdate::StyleRule { slot: s, css } if *s == slot => Some(css.clone()),
            _ => None,
        })
        .collect()
}
