//! GeometryResolver: matched ranges to owner-relative pixel boxes
//!
//! An owner is the nearest ancestor a paint predicate accepts. Interactive
//! containers the platform refuses to paint behind are skipped, walking
//! further up. Boxes are expressed relative to the owner's border box so a
//! style rule on the owner can draw them.

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::highlight::cache::TreeCache;
use crate::highlight::matcher::MatchBox;
use crate::highlight::terms::TermToken;
use crate::layout::{LayoutProvider, Rect};

/// Elements whose background cannot carry highlight paint
pub const NON_PAINTABLE_TAGS: &[&str] = &[
    "button", "select", "option", "input", "textarea", "iframe", "img", "svg",
];

/// Default paint predicate
pub fn default_paintable(doc: &Document, node: NodeId) -> bool {
    match doc.tag(node) {
        Some(tag) => !NON_PAINTABLE_TAGS.contains(&tag),
        None => false,
    }
}

/// One highlight rectangle, relative to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub hue: u16,
    pub token: TermToken,
}

/// Resolved geometry of one owner
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerGeometry {
    pub owner: NodeId,
    pub rect: Rect,
    pub boxes: Vec<PaintBox>,
}

pub struct GeometryResolver<'a> {
    doc: &'a Document,
    layout: &'a dyn LayoutProvider,
}

impl<'a> GeometryResolver<'a> {
    pub fn new(doc: &'a Document, layout: &'a dyn LayoutProvider) -> Self {
        Self { doc, layout }
    }

    /// Nearest paintable ancestor of a text unit. Verdicts are memoized in
    /// the cache's backend metadata.
    pub fn owner_of(
        &self,
        cache: &mut TreeCache,
        paintable: &dyn Fn(&Document, NodeId) -> bool,
        node: NodeId,
    ) -> NodeId {
        for candidate in self.doc.ancestors(node) {
            let meta = cache.meta_mut(candidate);
            let verdict = match meta.paintable {
                Some(v) => v,
                None => {
                    let v = paintable(self.doc, candidate);
                    meta.paintable = Some(v);
                    v
                }
            };
            if verdict {
                return candidate;
            }
        }
        self.doc.root()
    }

    /// Owner-relative boxes for `boxes`. `None` when the owner is not rendered.
    pub fn resolve(&self, owner: NodeId, boxes: &[(MatchBox, u16)]) -> Option<OwnerGeometry> {
        let rect = self.layout.element_rect(self.doc, owner)?;
        let boxes = boxes
            .iter()
            .flat_map(|(b, hue)| {
                self.layout
                    .text_rects(self.doc, b.node, b.start, b.end)
                    .into_iter()
                    .filter(|r| !r.is_empty())
                    .map(move |r| {
                        let r = r.translate(-rect.x, -rect.y);
                        PaintBox {
                            x: r.x,
                            y: r.y,
                            width: r.width,
                            height: r.height,
                            hue: *hue,
                            token: b.token.clone(),
                        }
                    })
            })
            .collect();
        Some(OwnerGeometry { owner, rect, boxes })
    }

    /// Whether an owner intersects the watched area
    pub fn is_visible(&self, owner: NodeId, area: &Rect) -> bool {
        self.layout
            .element_rect(self.doc, owner)
            .map_or(false, |r| r.intersects(area))
    }
}
