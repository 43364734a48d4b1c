//! Rendering backends
//!
//! One interface, three strategies, chosen once by capability probe:
//! - **RangeHighlight**: native highlight ranges, no tree edits
//! - **Paint**: per-owner geometry painted by a compositing hook
//! - **Element**: destructive marker-element wrapping
//!
//! # Recompute protocol
//! For a scope the engine calls, in order: `clear_scope` (undo anything the
//! backend wrote into the scope), scan + match, `write_scope` (tree edits; a
//! `true` return makes the engine rescan), the cache swap, then
//! `refresh_scope` with the holders that changed.
//!
//! Host-facing output is queued as `RenderUpdate`s and drained once per
//! callback, so style updates are batched per observer turn.

mod element;
mod geometry;
mod paint;
mod range;

pub use element::ElementBackend;
pub use geometry::{GeometryResolver, OwnerGeometry, PaintBox};
pub use paint::{PaintBackend, PaintablePredicate};
pub use range::{HighlightRange, RangeBackend};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::cache::TreeCache;
use super::classify::HighlightTagClassification;
use super::config::EngineConfig;
use super::flow::Flow;
use super::terms::{Term, TermToken};
use crate::dom::{Document, NodeId};
use crate::error::EngineError;
use crate::layout::{LayoutProvider, Rect};

// =============================================================================
// Capabilities & Selection
// =============================================================================

/// How the Paint backend gets its geometry on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaintMode {
    /// `paint()` worklet reading a boxes custom property
    CustomPaint,
    /// Background image captured from an SVG drawable element
    Capture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "mode", rename_all = "camelCase")]
pub enum BackendKind {
    Element,
    Paint(PaintMode),
    RangeHighlight,
}

/// Platform primitives probed once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Capabilities {
    pub highlight_api: bool,
    pub paint_worklet: bool,
    pub element_capture: bool,
}

/// RangeHighlight, then Paint (custom paint, then capture), then Element
pub fn select_backend(caps: Capabilities) -> BackendKind {
    if caps.highlight_api {
        BackendKind::RangeHighlight
    } else if caps.paint_worklet {
        BackendKind::Paint(PaintMode::CustomPaint)
    } else if caps.element_capture {
        BackendKind::Paint(PaintMode::Capture)
    } else {
        BackendKind::Element
    }
}

pub fn create_backend(kind: BackendKind) -> Box<dyn RenderBackend> {
    match kind {
        BackendKind::Element => Box::new(ElementBackend::new()),
        BackendKind::Paint(mode) => Box::new(PaintBackend::new(mode)),
        BackendKind::RangeHighlight => Box::new(RangeBackend::new()),
    }
}

// =============================================================================
// Host Output
// =============================================================================

/// Instruction for the host renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderUpdate {
    /// Replace the rule in `slot`; empty `css` clears it
    StyleRule { slot: usize, css: String },
    /// Replace a capture drawable; empty `svg` removes it
    Drawable { id: String, svg: String },
    /// Replace a term's native highlight ranges
    HighlightRanges {
        token: TermToken,
        ranges: Vec<HighlightRange>,
    },
    ClearHighlight { token: TermToken },
    /// Start intersection tracking of a Paint owner
    Observe { node: NodeId },
    Unobserve { node: NodeId },
    /// Replace the scroll-marker gutter markup
    ScrollGutter { markup: String },
}

/// Host-reported intersection change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChange {
    pub node: NodeId,
    pub visible: bool,
}

/// Holders whose flows were swapped for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChange {
    pub scope: NodeId,
    pub old_holders: Vec<NodeId>,
    pub new_holders: Vec<NodeId>,
}

// =============================================================================
// Backend Interface
// =============================================================================

/// Engine state lent to a backend for one call
pub struct BackendContext<'a> {
    pub doc: &'a mut Document,
    pub cache: &'a mut TreeCache,
    pub layout: &'a dyn LayoutProvider,
    pub classes: &'a HighlightTagClassification,
    pub config: &'a EngineConfig,
    pub terms: &'a [Term],
    pub hues: &'a [u16],
    /// Nodes about to be edited by the engine itself
    pub edits: &'a mut HashSet<NodeId>,
}

impl BackendContext<'_> {
    pub fn hue_of(&self, token: &TermToken) -> u16 {
        self.terms
            .iter()
            .find(|t| t.token() == token)
            .and_then(|t| self.hues.get(t.hue()).copied())
            .unwrap_or(0)
    }

    /// Viewport grown by the visibility margin
    pub fn watch_area(&self) -> Rect {
        self.layout.viewport().expand(self.config.viewport_margin_px)
    }
}

pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    /// Remove this backend's own output from a scope before rescanning
    fn clear_scope(&mut self, _ctx: &mut BackendContext<'_>, _scope: NodeId) -> Result<(), EngineError> {
        Ok(())
    }

    /// Apply fresh matches by editing the tree. Returns true when the tree
    /// changed and the scope must be rescanned before caching.
    fn write_scope(
        &mut self,
        _ctx: &mut BackendContext<'_>,
        _scope: NodeId,
        _flows: &[Flow],
    ) -> Result<bool, EngineError> {
        Ok(false)
    }

    /// Make the cached matches of a scope visible
    fn refresh_scope(&mut self, _ctx: &mut BackendContext<'_>, _change: &ScopeChange) {}

    /// Holders dropped with a detached subtree
    fn forget(&mut self, _ctx: &mut BackendContext<'_>, _holders: &[NodeId]) {}

    /// Remove highlighting for `terms`, or for everything
    fn undo(&mut self, ctx: &mut BackendContext<'_>, terms: Option<&[TermToken]>) -> Result<(), EngineError>;

    fn on_scroll(&mut self, _ctx: &mut BackendContext<'_>) {}

    fn on_visibility(&mut self, _ctx: &mut BackendContext<'_>, _changes: &[VisibilityChange]) {}

    fn on_resize(&mut self, _ctx: &mut BackendContext<'_>) {}

    /// Element a navigation step should focus for a match in text unit `node`
    fn match_element(&self, doc: &Document, _config: &EngineConfig, node: NodeId) -> Option<NodeId> {
        doc.parent(node)
    }

    fn take_updates(&mut self) -> Vec<RenderUpdate>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_preference_order() {
        let all = Capabilities {
            highlight_api: true,
            paint_worklet: true,
            element_capture: true,
        };
        assert_eq!(select_backend(all), BackendKind::RangeHighlight);
        assert_eq!(
            select_backend(Capabilities { highlight_api: false, ..all }),
            BackendKind::Paint(PaintMode::CustomPaint)
        );
        assert_eq!(
            select_backend(Capabilities {
                element_capture: true,
                ..Capabilities::default()
            }),
            BackendKind::Paint(PaintMode::Capture)
        );
        assert_eq!(select_backend(Capabilities::default()), BackendKind::Element);
    }

    #[test]
    fn test_created_backend_reports_kind() {
        for kind in [
            BackendKind::Element,
            BackendKind::Paint(PaintMode::Capture),
            BackendKind::RangeHighlight,
        ] {
            assert_eq!(create_backend(kind).kind(), kind);
        }
    }

    #[test]
    fn test_render_update_wire_format() {
        let json = serde_json::to_value(RenderUpdate::StyleRule {
            slot: 2,
            css: "x".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "styleRule");
        assert_eq!(json["slot"], 2);
    }
}
