//! Paint backend: geometry painted behind untouched text
//!
//! Every element owning matched text gets a stable id attribute and exactly
//! one style-rule slot. Its boxes are serialized into that rule, either as a
//! custom property read by a `paint()` worklet or as a background captured
//! from an SVG drawable.
//!
//! # Visibility gating
//! Owners outside the viewport (plus margin) are tracked but not measured.
//! They are painted when they scroll into view or the host reports them
//! visible. A resize re-measures visible owners only.
//!
//! # Stale owners
//! Owners that lost their last match or left the document have their rule
//! slot cleared and returned to the free list.

use std::collections::{BTreeSet, HashMap};

use super::geometry::{default_paintable, GeometryResolver, OwnerGeometry};
use super::{BackendContext, BackendKind, PaintMode, RenderBackend, RenderUpdate, ScopeChange, VisibilityChange};
use crate::dom::{Document, NodeId};
use crate::error::EngineError;
use crate::highlight::matcher::MatchBox;
use crate::highlight::terms::TermToken;

/// Decides whether an element can carry highlight paint
pub type PaintablePredicate = Box<dyn Fn(&Document, NodeId) -> bool>;

#[derive(Debug, Clone)]
struct OwnerState {
    id: u32,
    slot: usize,
    holders: BTreeSet<NodeId>,
    visible: bool,
    /// Geometry changed while invisible
    dirty: bool,
}

pub struct PaintBackend {
    mode: PaintMode,
    paintable: PaintablePredicate,
    owners: HashMap<NodeId, OwnerState>,
    /// Reverse index: flow holder to the owners its boxes paint on
    holder_owners: HashMap<NodeId, Vec<NodeId>>,
    next_id: u32,
    next_slot: usize,
    free_slots: Vec<usize>,
    updates: Vec<RenderUpdate>,
}

impl PaintBackend {
    pub fn new(mode: PaintMode) -> Self {
        Self::with_predicate(mode, Box::new(default_paintable))
    }

    pub fn with_predicate(mode: PaintMode, paintable: PaintablePredicate) -> Self {
        Self {
            mode,
            paintable,
            owners: HashMap::new(),
            holder_owners: HashMap::new(),
            next_id: 0,
            next_slot: 0,
            free_slots: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn mode(&self) -> PaintMode {
        self.mode
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn is_owner(&self, node: NodeId) -> bool {
        self.owners.contains_key(&node)
    }

    fn owner_of(&self, ctx: &mut BackendContext<'_>, node: NodeId) -> NodeId {
        GeometryResolver::new(ctx.doc, ctx.layout).owner_of(ctx.cache, self.paintable.as_ref(), node)
    }

    /// Register an owner, allocating its id, attribute and rule slot
    fn acquire(&mut self, ctx: &mut BackendContext<'_>, owner: NodeId) {
        if self.owners.contains_key(&owner) {
            return;
        }
        let meta = ctx.cache.meta_mut(owner);
        let id = match meta.paint_id {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        let slot = self.free_slots.pop().unwrap_or_else(|| {
            let slot = self.next_slot;
            self.next_slot += 1;
            slot
        });
        meta.paint_id = Some(id);
        meta.rule_slot = Some(slot);

        if let Err(err) = ctx
            .doc
            .set_attribute(owner, &ctx.config.id_attribute(), &id.to_string())
        {
            tracing::warn!(%owner, %err, "could not tag paint owner");
        }
        let visible = GeometryResolver::new(ctx.doc, ctx.layout).is_visible(owner, &ctx.watch_area());
        self.owners.insert(
            owner,
            OwnerState {
                id,
                slot,
                holders: BTreeSet::new(),
                visible,
                dirty: true,
            },
        );
        self.updates.push(RenderUpdate::Observe { node: owner });
    }

    /// Clear an owner's rule and forget it
    fn release(&mut self, ctx: &mut BackendContext<'_>, owner: NodeId) {
        let Some(state) = self.owners.remove(&owner) else {
            return;
        };
        for holder in &state.holders {
            if let Some(owners) = self.holder_owners.get_mut(holder) {
                owners.retain(|o| *o != owner);
            }
        }
        self.updates.push(RenderUpdate::StyleRule {
            slot: state.slot,
            css: String::new(),
        });
        if self.mode == PaintMode::Capture {
            self.updates.push(RenderUpdate::Drawable {
                id: ctx.config.drawable_id(state.id),
                svg: String::new(),
            });
        }
        self.updates.push(RenderUpdate::Unobserve { node: owner });
        self.free_slots.push(state.slot);
        ctx.cache.meta_mut(owner).rule_slot = None;
        // detached owners may come back; keep the id, drop the tag
        let _ = ctx.doc.remove_attribute(owner, &ctx.config.id_attribute());
        tracing::trace!(%owner, slot = state.slot, "paint owner released");
    }

    /// Release owners that left the document
    fn sweep_stale(&mut self, ctx: &mut BackendContext<'_>) {
        let stale: Vec<NodeId> = self
            .owners
            .keys()
            .copied()
            .filter(|o| !ctx.doc.is_connected(*o))
            .collect();
        for owner in stale {
            self.release(ctx, owner);
        }
    }

    /// Boxes painted on `owner`, with their hues
    fn owner_boxes(&self, ctx: &mut BackendContext<'_>, owner: NodeId) -> Vec<(MatchBox, u16)> {
        let Some(state) = self.owners.get(&owner) else {
            return Vec::new();
        };
        let boxes: Vec<MatchBox> = state
            .holders
            .iter()
            .flat_map(|h| ctx.cache.flows(*h).iter())
            .flat_map(|f| f.boxes.iter().cloned())
            .collect();
        let mut painted = Vec::new();
        for b in boxes {
            if self.owner_of(ctx, b.node) == owner {
                let hue = ctx.hue_of(&b.token);
                painted.push((b, hue));
            }
        }
        painted
    }

    /// Re-measure and re-emit one owner, or release it when nothing is left
    fn update_owner(&mut self, ctx: &mut BackendContext<'_>, owner: NodeId) {
        let boxes = self.owner_boxes(ctx, owner);
        if boxes.is_empty() || !ctx.doc.is_connected(owner) {
            self.release(ctx, owner);
            return;
        }
        let Some(state) = self.owners.get_mut(&owner) else {
            return;
        };
        if !state.visible {
            state.dirty = true;
            return;
        }
        state.dirty = false;
        let (id, slot) = (state.id, state.slot);

        let geometry = GeometryResolver::new(ctx.doc, ctx.layout).resolve(owner, &boxes);
        match geometry {
            Some(geometry) => self.emit(ctx, id, slot, &geometry),
            None => self.updates.push(RenderUpdate::StyleRule {
                slot,
                css: String::new(),
            }),
        }
    }

    fn emit(&mut self, ctx: &BackendContext<'_>, id: u32, slot: usize, geometry: &OwnerGeometry) {
        let selector = format!("[{}=\"{}\"]", ctx.config.id_attribute(), id);
        match self.mode {
            PaintMode::CustomPaint => {
                let boxes = match serde_json::to_string(&geometry.boxes) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(%err, "could not serialize paint boxes");
                        return;
                    }
                };
                let css = format!(
                    "{} {{ --{}boxes: {}; background-image: paint({}) !important; }}",
                    selector,
                    ctx.config.class_prefix,
                    boxes,
                    ctx.config.paint_name()
                );
                self.updates.push(RenderUpdate::StyleRule { slot, css });
            }
            PaintMode::Capture => {
                let drawable = ctx.config.drawable_id(id);
                let css = format!(
                    "{} {{ background-image: -moz-element(#{}) !important; background-repeat: no-repeat !important; }}",
                    selector, drawable
                );
                self.updates.push(RenderUpdate::Drawable {
                    id: drawable,
                    svg: capture_svg(geometry),
                });
                self.updates.push(RenderUpdate::StyleRule { slot, css });
            }
        }
    }

    /// Recompute visibility of every owner, painting those that came into view
    fn revisit_visibility(&mut self, ctx: &mut BackendContext<'_>) {
        let area = ctx.watch_area();
        let owners: Vec<NodeId> = self.owners.keys().copied().collect();
        for owner in owners {
            let visible = GeometryResolver::new(ctx.doc, ctx.layout).is_visible(owner, &area);
            self.set_visible(ctx, owner, visible);
        }
    }

    fn set_visible(&mut self, ctx: &mut BackendContext<'_>, owner: NodeId, visible: bool) {
        let Some(state) = self.owners.get_mut(&owner) else {
            return;
        };
        let entering = visible && !state.visible;
        state.visible = visible;
        if entering && state.dirty {
            self.update_owner(ctx, owner);
        }
    }
}

/// SVG drawable for the capture fallback
fn capture_svg(geometry: &OwnerGeometry) -> String {
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">",
        geometry.rect.width, geometry.rect.height
    );
    for b in &geometry.boxes {
        svg.push_str(&format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"hsl({} 100% 60% / 0.4)\"/>",
            b.x, b.y, b.width, b.height, b.hue
        ));
    }
    svg.push_str("</svg>");
    svg
}

impl RenderBackend for PaintBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Paint(self.mode)
    }

    fn refresh_scope(&mut self, ctx: &mut BackendContext<'_>, change: &ScopeChange) {
        let mut affected: BTreeSet<NodeId> = BTreeSet::new();

        for holder in &change.old_holders {
            for owner in self.holder_owners.remove(holder).unwrap_or_default() {
                if let Some(state) = self.owners.get_mut(&owner) {
                    state.holders.remove(holder);
                }
                affected.insert(owner);
            }
        }

        for &holder in &change.new_holders {
            let nodes: BTreeSet<NodeId> = ctx
                .cache
                .flows(holder)
                .iter()
                .flat_map(|f| f.boxes.iter().map(|b| b.node))
                .collect();
            let mut owners: Vec<NodeId> = nodes.into_iter().map(|n| self.owner_of(ctx, n)).collect();
            owners.sort();
            owners.dedup();
            for &owner in &owners {
                self.acquire(ctx, owner);
                if let Some(state) = self.owners.get_mut(&owner) {
                    state.holders.insert(holder);
                }
                affected.insert(owner);
            }
            if !owners.is_empty() {
                self.holder_owners.insert(holder, owners);
            }
        }

        self.sweep_stale(ctx);
        for owner in affected {
            if self.owners.contains_key(&owner) {
                self.update_owner(ctx, owner);
            }
        }
    }

    fn forget(&mut self, ctx: &mut BackendContext<'_>, holders: &[NodeId]) {
        let change = ScopeChange {
            scope: ctx.doc.root(),
            old_holders: holders.to_vec(),
            new_holders: Vec::new(),
        };
        self.refresh_scope(ctx, &change);
    }

    fn undo(&mut self, ctx: &mut BackendContext<'_>, terms: Option<&[TermToken]>) -> Result<(), EngineError> {
        let owners: Vec<NodeId> = self.owners.keys().copied().collect();
        match terms {
            None => {
                for owner in owners {
                    self.release(ctx, owner);
                }
                self.holder_owners.clear();
            }
            // the engine has already dropped these terms' boxes from the cache
            Some(_) => {
                for owner in owners {
                    self.update_owner(ctx, owner);
                }
            }
        }
        Ok(())
    }

    fn on_scroll(&mut self, ctx: &mut BackendContext<'_>) {
        self.revisit_visibility(ctx);
    }

    fn on_visibility(&mut self, ctx: &mut BackendContext<'_>, changes: &[VisibilityChange]) {
        for change in changes {
            self.set_visible(ctx, change.node, change.visible);
        }
    }

    fn on_resize(&mut self, ctx: &mut BackendContext<'_>) {
        self.revisit_visibility(ctx);
        let visible: Vec<NodeId> = self
            .owners
            .iter()
            .filter(|(_, s)| s.visible)
            .map(|(o, _)| *o)
            .collect();
        for owner in visible {
            self.update_owner(ctx, owner);
        }
        for state in self.owners.values_mut().filter(|s| !s.visible) {
            state.dirty = true;
        }
    }

    fn take_updates(&mut self) -> Vec<RenderUpdate> {
        std::mem::take(&mut self.updates)
    }
}
