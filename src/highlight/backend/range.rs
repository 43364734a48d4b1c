//! RangeHighlight backend: one native highlight per term
//!
//! No tree edits. Ranges are kept per holder so a scope swap only replaces
//! the ranges of the holders it touched; the host receives the full range
//! set of every term that changed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{BackendContext, BackendKind, RenderBackend, RenderUpdate, ScopeChange};
use crate::dom::NodeId;
use crate::error::EngineError;
use crate::highlight::terms::TermToken;

/// A native range inside one text unit (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HighlightRange {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Default)]
pub struct RangeBackend {
    /// term -> holder -> ranges
    ranges: HashMap<TermToken, BTreeMap<NodeId, Vec<HighlightRange>>>,
    updates: Vec<RenderUpdate>,
}

impl RangeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every range currently registered for a term
    pub fn ranges(&self, token: &TermToken) -> Vec<HighlightRange> {
        self.ranges
            .get(token)
            .map(|by_holder| by_holder.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    fn remove_holders(&mut self, holders: &[NodeId], touched: &mut BTreeSet<TermToken>) {
        for (token, by_holder) in self.ranges.iter_mut() {
            for holder in holders {
                if by_holder.remove(holder).is_some() {
                    touched.insert(token.clone());
                }
            }
        }
    }

    fn publish(&mut self, touched: BTreeSet<TermToken>) {
        for token in touched {
            let ranges = self.ranges(&token);
            if ranges.is_empty() {
                self.ranges.remove(&token);
                self.updates.push(RenderUpdate::ClearHighlight { token });
            } else {
                self.updates.push(RenderUpdate::HighlightRanges { token, ranges });
            }
        }
    }
}

impl RenderBackend for RangeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RangeHighlight
    }

    fn refresh_scope(&mut self, ctx: &mut BackendContext<'_>, change: &ScopeChange) {
        let mut touched = BTreeSet::new();
        self.remove_holders(&change.old_holders, &mut touched);

        for &holder in &change.new_holders {
            for b in ctx.cache.flows(holder).iter().flat_map(|f| f.boxes.iter()) {
                self.ranges
                    .entry(b.token.clone())
                    .or_default()
                    .entry(holder)
                    .or_default()
                    .push(HighlightRange {
                        node: b.node,
                        start: b.start,
                        end: b.end,
                    });
                touched.insert(b.token.clone());
            }
        }
        self.publish(touched);
    }

    fn forget(&mut self, _ctx: &mut BackendContext<'_>, holders: &[NodeId]) {
        let mut touched = BTreeSet::new();
        self.remove_holders(holders, &mut touched);
        self.publish(touched);
    }

    fn undo(&mut self, _ctx: &mut BackendContext<'_>, terms: Option<&[TermToken]>) -> Result<(), EngineError> {
        let mut tokens: Vec<TermToken> = match terms {
            Some(ts) => ts.to_vec(),
            None => self.ranges.keys().cloned().collect(),
        };
        tokens.sort();
        for token in tokens {
            self.ranges.remove(&token);
            self.updates.push(RenderUpdate::ClearHighlight { token });
        }
        Ok(())
    }

    fn take_updates(&mut self) -> Vec<RenderUpdate> {
        std::mem::take(&mut self.updates)
    }
}
