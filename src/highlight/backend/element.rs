//! Element backend: wraps every match in a marker element
//!
//! Text units are split into before / matched / after parts and the matched
//! part is moved into a marker element carrying the term class. Terms are
//! applied in list order against a `UnitList` mirroring the flow's current
//! units, so a later term resolves against the boundaries earlier terms
//! created.
//!
//! Every node touched is added to the self-edit set before the edit.
//! Markers and text units discarded by an unwrap are released from the
//! document, so repeated recomputes do not accumulate dead nodes.

use super::{BackendContext, BackendKind, RenderBackend, RenderUpdate};
use crate::dom::{Document, NodeId};
use crate::error::{invariant, EngineError};
use crate::highlight::config::EngineConfig;
use crate::highlight::flow::Flow;
use crate::highlight::terms::TermToken;

// =============================================================================
// UnitList
// =============================================================================

/// A flow unit inside the list; offsets are flow-text bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnitSlot {
    node: NodeId,
    start: usize,
    end: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked unit list over an arena. Slots are never moved, so an
/// index stays valid while neighbours are split or unlinked.
#[derive(Debug, Default)]
struct UnitList {
    slots: Vec<UnitSlot>,
    head: Option<usize>,
}

impl UnitList {
    fn from_flow(flow: &Flow) -> Self {
        let count = flow.units.len();
        let slots = flow
            .units
            .iter()
            .enumerate()
            .map(|(i, u)| UnitSlot {
                node: u.node,
                start: u.start,
                end: u.end,
                prev: i.checked_sub(1),
                next: (i + 1 < count).then_some(i + 1),
            })
            .collect();
        Self {
            slots,
            head: (count > 0).then_some(0),
        }
    }

    /// Cut slot `index` at flow offset `at`; the new slot covers `[at, end)`
    /// and is backed by `node`
    fn split_after(&mut self, index: usize, at: usize, node: NodeId) -> usize {
        let new_index = self.slots.len();
        let slot = self.slots[index];
        self.slots.push(UnitSlot {
            node,
            start: at,
            end: slot.end,
            prev: Some(index),
            next: slot.next,
        });
        if let Some(next) = slot.next {
            self.slots[next].prev = Some(new_index);
        }
        self.slots[index].end = at;
        self.slots[index].next = Some(new_index);
        new_index
    }

    fn unlink(&mut self, index: usize) {
        let slot = self.slots[index];
        match slot.prev {
            Some(prev) => self.slots[prev].next = slot.next,
            None => self.head = slot.next,
        }
        if let Some(next) = slot.next {
            self.slots[next].prev = slot.prev;
        }
    }

    #[cfg(test)]
    fn spans(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut at = self.head;
        while let Some(i) = at {
            out.push((self.slots[i].start, self.slots[i].end));
            at = self.slots[i].next;
        }
        out
    }
}

// =============================================================================
// ElementBackend
// =============================================================================

#[derive(Debug, Default)]
pub struct ElementBackend {
    updates: Vec<RenderUpdate>,
}

impl ElementBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn wrap_flow(&mut self, ctx: &mut BackendContext<'_>, flow: &Flow) -> Result<usize, EngineError> {
        let mut units = UnitList::from_flow(flow);
        let mut wrapped = 0;

        for term in ctx.terms {
            let class = ctx.config.term_class(term.token().as_str());
            let mut cursor = units.head;

            for range in term.find_ranges(&flow.text) {
                while let Some(i) = cursor {
                    if units.slots[i].end <= range.start {
                        cursor = units.slots[i].next;
                    } else {
                        break;
                    }
                }

                let mut at = cursor;
                while let Some(mut i) = at {
                    let slot = units.slots[i];
                    if slot.start >= range.end {
                        break;
                    }
                    if slot.start == slot.end {
                        // empty unit inside a match: delete rather than keep
                        if slot.start > range.start {
                            self.remove_empty(ctx, slot.node)?;
                            units.unlink(i);
                        }
                        at = slot.next;
                        continue;
                    }

                    if slot.start < range.start {
                        let tail = self.split(ctx, slot.node, range.start - slot.start)?;
                        i = units.split_after(i, range.start, tail);
                    }
                    let slot = units.slots[i];
                    if slot.end > range.end {
                        let after = self.split(ctx, slot.node, range.end - slot.start)?;
                        units.split_after(i, range.end, after);
                    }

                    if self.wrap_unit(ctx, units.slots[i].node, &class)? {
                        wrapped += 1;
                    }
                    at = units.slots[i].next;
                }
            }
        }
        Ok(wrapped)
    }

    fn split(&mut self, ctx: &mut BackendContext<'_>, node: NodeId, offset: usize) -> Result<NodeId, EngineError> {
        ctx.edits.insert(node);
        if let Some(parent) = ctx.doc.parent(node) {
            ctx.edits.insert(parent);
        }
        // the split node's id is known before it exists
        ctx.edits.insert(ctx.doc.next_id());
        Ok(ctx.doc.split_text(node, offset)?)
    }

    fn remove_empty(&mut self, ctx: &mut BackendContext<'_>, node: NodeId) -> Result<(), EngineError> {
        ctx.edits.insert(node);
        if let Some(parent) = ctx.doc.parent(node) {
            ctx.edits.insert(parent);
        }
        ctx.doc.remove(node)?;
        Ok(())
    }

    fn wrap_unit(&mut self, ctx: &mut BackendContext<'_>, node: NodeId, class: &str) -> Result<bool, EngineError> {
        let parent = match ctx.doc.parent(node) {
            Some(p) => p,
            None => {
                invariant(false, "matched text unit is attached");
                return Ok(false);
            }
        };
        ctx.edits.extend([parent, node]);
        // detached until inserted, so nothing is observed before this
        let marker = ctx.doc.create_element(&ctx.config.marker_tag);
        ctx.edits.insert(marker);
        ctx.doc.add_class(marker, class)?;
        ctx.doc.insert_before(parent, marker, Some(node))?;
        ctx.doc.append_child(marker, node)?;
        Ok(true)
    }

    /// Replace markers under `root` with their children, innermost and last
    /// first, re-merging the text they split
    fn unwrap_markers(
        &mut self,
        ctx: &mut BackendContext<'_>,
        root: NodeId,
        tokens: Option<&[TermToken]>,
    ) -> Result<usize, EngineError> {
        let classes: Option<Vec<String>> =
            tokens.map(|ts| ts.iter().map(|t| ctx.config.term_class(t.as_str())).collect());
        let marker_tag = ctx.config.marker_tag.as_str();
        let markers: Vec<NodeId> = ctx
            .doc
            .descendants(root)
            .filter(|n| ctx.doc.tag(*n) == Some(marker_tag))
            .filter(|n| match &classes {
                Some(wanted) => wanted.iter().any(|c| ctx.doc.has_class(*n, c)),
                None => true,
            })
            .collect();

        let count = markers.len();
        for marker in markers.into_iter().rev() {
            let Some(parent) = ctx.doc.parent(marker) else {
                continue;
            };
            let children = ctx.doc.children(marker).to_vec();
            ctx.edits.insert(marker);
            ctx.edits.insert(parent);
            ctx.edits.extend(children.iter().copied());
            ctx.doc.replace_with_children(marker)?;
            ctx.doc.release(marker)?;

            let siblings = ctx.doc.children(parent).to_vec();
            ctx.edits.extend(siblings.iter().copied());
            for child in children {
                if ctx.doc.is_text(child) && ctx.doc.parent(child) == Some(parent) {
                    ctx.doc.merge_adjacent_text(child)?;
                }
            }
            for absorbed in siblings {
                if ctx.doc.is_text(absorbed) && ctx.doc.parent(absorbed).is_none() {
                    ctx.doc.release(absorbed)?;
                }
            }
        }
        Ok(count)
    }
}

impl RenderBackend for ElementBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Element
    }

    fn clear_scope(&mut self, ctx: &mut BackendContext<'_>, scope: NodeId) -> Result<(), EngineError> {
        let removed = self.unwrap_markers(ctx, scope, None)?;
        if removed > 0 {
            tracing::trace!(%scope, removed, "unwrapped markers before rescan");
        }
        Ok(())
    }

    fn write_scope(
        &mut self,
        ctx: &mut BackendContext<'_>,
        scope: NodeId,
        flows: &[Flow],
    ) -> Result<bool, EngineError> {
        let mut wrapped = 0;
        for flow in flows.iter().filter(|f| !f.boxes.is_empty()) {
            wrapped += self.wrap_flow(ctx, flow)?;
        }
        tracing::debug!(%scope, wrapped, "wrapped matches");
        Ok(wrapped > 0)
    }

    fn undo(&mut self, ctx: &mut BackendContext<'_>, terms: Option<&[TermToken]>) -> Result<(), EngineError> {
        let root = ctx.doc.root();
        let removed = self.unwrap_markers(ctx, root, terms)?;
        tracing::debug!(removed, "element highlights undone");
        Ok(())
    }

    fn match_element(&self, doc: &Document, config: &EngineConfig, node: NodeId) -> Option<NodeId> {
        let parent = doc.parent(node)?;
        let marker = std::iter::once(parent)
            .chain(doc.ancestors(parent))
            .take_while(|n| doc.tag(*n) == Some(config.marker_tag.as_str()))
            .last();
        Some(marker.unwrap_or(parent))
    }

    fn take_updates(&mut self) -> Vec<RenderUpdate> {
        std::mem::take(&mut self.updates)
    }
}

// =============================================================================
// Tests
// =============================================================================
