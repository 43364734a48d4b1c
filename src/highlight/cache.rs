//! TreeCache: identity-keyed side index of flows and backend metadata
//!
//! Entries are keyed by `NodeId`, which the document never reuses, so
//! the cache never attaches state to the tree itself.
//!
//! # Attachment
//! A flow is stored once, on the lowest node containing both its first and
//! last text unit. A flow scattered across sibling subtrees therefore has a
//! single owner entry.
//!
//! # Replacement
//! Recomputing a scope is a two-step swap: `holders_within` snapshots which
//! nodes held flows before the tree is touched, then `replace` drops exactly
//! those flows and attaches the new ones in one call. Occurrence counts are
//! kept incrementally across swaps.

use std::collections::{HashMap, HashSet};

use super::classify::{HighlightTagClassification, TagKind};
use super::flow::Flow;
use super::matcher::MatchBox;
use super::terms::TermToken;
use crate::dom::{Document, NodeId};

// =============================================================================
// Types
// =============================================================================

/// Per-node metadata owned by the rendering backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendMeta {
    /// Stable id of a Paint owner
    pub paint_id: Option<u32>,
    /// Style-rule slot of a Paint owner
    pub rule_slot: Option<usize>,
    /// Memoized paintability verdict
    pub paintable: Option<bool>,
}

/// Cache record of one node
#[derive(Debug, Clone, Default)]
pub struct NodeCache {
    pub flows: Vec<Flow>,
    pub meta: BackendMeta,
}

impl NodeCache {
    pub fn boxes(&self) -> impl Iterator<Item = &MatchBox> {
        self.flows.iter().flat_map(|f| f.boxes.iter())
    }
}

/// Tokens whose occurrence count moved during a swap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountDelta {
    pub changed: Vec<TermToken>,
}

// =============================================================================
// TreeCache
// =============================================================================

#[derive(Debug, Default)]
pub struct TreeCache {
    entries: HashMap<NodeId, NodeCache>,
    counts: HashMap<TermToken, usize>,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `node`, created on first sight
    pub fn entry(&mut self, node: NodeId) -> &mut NodeCache {
        self.entries.entry(node).or_default()
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeCache> {
        self.entries.get(&node)
    }

    pub fn flows(&self, node: NodeId) -> &[Flow] {
        self.entries
            .get(&node)
            .map(|e| e.flows.as_slice())
            .unwrap_or(&[])
    }

    pub fn meta(&self, node: NodeId) -> BackendMeta {
        self.entries.get(&node).map(|e| e.meta).unwrap_or_default()
    }

    pub fn meta_mut(&mut self, node: NodeId) -> &mut BackendMeta {
        &mut self.entry(node).meta
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every node currently holding at least one flow
    pub fn holders(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| !e.flows.is_empty())
            .map(|(n, _)| *n)
    }

    /// Occurrences of a term (match heads, not boxes)
    pub fn count(&self, token: &TermToken) -> usize {
        self.counts.get(token).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &HashMap<TermToken, usize> {
        &self.counts
    }

    /// Nodes under `root` (inclusive) holding flows. Rejected subtrees are
    /// not entered since they can hold no cache.
    pub fn holders_within(
        &self,
        doc: &Document,
        classes: &HighlightTagClassification,
        root: NodeId,
    ) -> Vec<NodeId> {
        let mut holders = Vec::new();
        if classes.is_rejected(doc, root) {
            return holders;
        }
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if self.entries.get(&node).map_or(false, |e| !e.flows.is_empty()) {
                holders.push(node);
            }
            for &child in doc.children(node).iter().rev() {
                if classes.kind(doc, child) != TagKind::Reject {
                    stack.push(child);
                }
            }
        }
        holders
    }

    /// Holders no longer attached to the document. A full pass swaps these
    /// out with the root's holders.
    pub fn detached_holders(&self, doc: &Document) -> Vec<NodeId> {
        let mut orphans: Vec<NodeId> = self
            .holders()
            .filter(|n| !doc.is_connected(*n))
            .collect();
        orphans.sort();
        orphans
    }

    /// Drop every flow under `root`
    pub fn clear_subtree(
        &mut self,
        doc: &Document,
        classes: &HighlightTagClassification,
        root: NodeId,
    ) -> CountDelta {
        let holders = self.holders_within(doc, classes, root);
        self.replace(doc, &holders, Vec::new())
    }

    /// Register a flow on the lowest common ancestor of its end units
    pub fn attach_flow(&mut self, doc: &Document, flow: Flow) -> Option<NodeId> {
        let (first, last) = (flow.first_node()?, flow.last_node()?);
        let owner = doc.common_ancestor(first, last)?;
        for b in flow.boxes.iter().filter(|b| b.head) {
            *self.counts.entry(b.token.clone()).or_insert(0) += 1;
        }
        self.entry(owner).flows.push(flow);
        Some(owner)
    }

    /// Swap the flows of `old_holders` for `flows`. Counts are adjusted
    /// incrementally; the tokens whose count moved are returned.
    pub fn replace(&mut self, doc: &Document, old_holders: &[NodeId], flows: Vec<Flow>) -> CountDelta {
        let before = self.counts.clone();
        let mut touched: HashSet<TermToken> = HashSet::new();

        for holder in old_holders {
            let Some(entry) = self.entries.get_mut(holder) else {
                continue;
            };
            for flow in entry.flows.drain(..) {
                for b in flow.boxes.iter().filter(|b| b.head) {
                    if let Some(count) = self.counts.get_mut(&b.token) {
                        *count = count.saturating_sub(1);
                    }
                    touched.insert(b.token.clone());
                }
            }
        }
        for flow in flows {
            touched.extend(flow.boxes.iter().map(|b| b.token.clone()));
            self.attach_flow(doc, flow);
        }
        for holder in old_holders {
            let vacant = self
                .entries
                .get(holder)
                .map_or(false, |e| e.flows.is_empty() && e.meta == BackendMeta::default());
            if vacant {
                self.entries.remove(holder);
            }
        }

        let mut changed: Vec<TermToken> = touched
            .into_iter()
            .filter(|t| before.get(t).copied().unwrap_or(0) != self.count(t))
            .collect();
        changed.sort();
        self.counts.retain(|_, c| *c > 0);
        CountDelta { changed }
    }

    /// Remove entries for a detached subtree. Returns the nodes that held
    /// flows, for backends to release.
    pub fn forget_subtree(&mut self, doc: &Document, root: NodeId) -> (Vec<NodeId>, CountDelta) {
        let holders: Vec<NodeId> = doc
            .descendants(root)
            .filter(|n| self.entries.get(n).map_or(false, |e| !e.flows.is_empty()))
            .collect();
        let delta = self.replace(doc, &holders, Vec::new());
        for node in doc.descendants(root) {
            self.entries.remove(&node);
        }
        (holders, delta)
    }

    /// Remove a term's boxes everywhere, keeping the flows
    pub fn drop_token(&mut self, token: &TermToken) {
        for entry in self.entries.values_mut() {
            for flow in entry.flows.iter_mut() {
                flow.boxes.retain(|b| &b.token != token);
            }
        }
        self.counts.remove(token);
    }

    /// All match heads with their holding flow, unordered
    pub fn heads(&self) -> impl Iterator<Item = &MatchBox> {
        self.entries
            .values()
            .flat_map(|e| e.boxes())
            .filter(|b| b.head)
    }

    /// All boxes, unordered
    pub fn boxes(&self) -> impl Iterator<Item = &MatchBox> {
        self.entries.values().flat_map(|e| e.boxes())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.counts.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
