//! MutationTracker: mutation batches to recompute scopes
//!
//! # Per batch
//! 1. Records caused by the engine's own edits are dropped (self-edit set).
//! 2. Each affected node is classified: a newly inserted block needs a full
//!    rescan of its subtree, anything else a localized rescan from its
//!    nearest block boundary (flows may have merged or split above it).
//! 3. Pending scopes are coalesced: a scope inside another pending scope is
//!    already covered by the ancestor's rescan.
//! 4. The rate limiter decides between recomputing now and folding the batch
//!    into one delayed recompute.

use std::collections::{BTreeSet, HashSet, VecDeque};

use super::classify::{HighlightTagClassification, TagKind};
use super::config::ThrottleConfig;
use crate::dom::{Document, MutationKind, MutationRecord, NodeId};

// =============================================================================
// Types
// =============================================================================

/// Why a node needs rescanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Newly inserted block: rescan its subtree
    Subtree,
    /// Modified in place: rescan from the enclosing block boundary
    Localized,
}

/// A node to rescan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub root: NodeId,
    pub kind: ScopeKind,
}

/// Work released by the tracker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Coalesced scope roots, outermost first
    pub scopes: Vec<NodeId>,
    /// Detached nodes whose cache entries must be forgotten
    pub removed: Vec<NodeId>,
    /// Released by the delayed path
    pub deferred: bool,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty() && self.removed.is_empty()
    }
}

/// What the tracker made of one observer batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Recompute now
    Run(Batch),
    /// Work was queued behind the delayed recompute
    Deferred,
    /// Nothing to do: every record was self-caused or irrelevant
    Idle,
}

impl BatchOutcome {
    pub fn into_batch(self) -> Option<Batch> {
        match self {
            BatchOutcome::Run(batch) => Some(batch),
            _ => None,
        }
    }
}

// =============================================================================
// RateLimiter
// =============================================================================

/// Rolling-window limiter switching to delayed, coalesced recomputes
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: ThrottleConfig,
    recent: VecDeque<f64>,
    deferred_at: Option<f64>,
}

impl RateLimiter {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            recent: VecDeque::new(),
            deferred_at: None,
        }
    }

    /// True if a recompute may run right now. Otherwise a delayed recompute
    /// is scheduled (once) and the caller should hold its work.
    pub fn admit(&mut self, now_ms: f64) -> bool {
        self.prune(now_ms);
        if self.deferred_at.is_none() && self.recent.len() < self.config.threshold {
            self.recent.push_back(now_ms);
            return true;
        }
        if self.deferred_at.is_none() {
            self.deferred_at = Some(now_ms + self.config.delay_ms);
        }
        false
    }

    /// True once the scheduled delayed recompute is due. Consumes the schedule.
    pub fn take_due(&mut self, now_ms: f64) -> bool {
        match self.deferred_at {
            Some(at) if now_ms >= at => {
                self.deferred_at = None;
                self.prune(now_ms);
                self.recent.push_back(now_ms);
                true
            }
            _ => false,
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.deferred_at.is_some()
    }

    pub fn deferred_at(&self) -> Option<f64> {
        self.deferred_at
    }

    fn prune(&mut self, now_ms: f64) {
        while let Some(&t) = self.recent.front() {
            if now_ms - t >= self.config.window_ms {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.deferred_at = None;
    }
}

// =============================================================================
// MutationTracker
// =============================================================================

#[derive(Debug, Clone)]
pub struct MutationTracker {
    self_edits: HashSet<NodeId>,
    pending: BTreeSet<NodeId>,
    removed: Vec<NodeId>,
    limiter: RateLimiter,
}

impl MutationTracker {
    pub fn new(throttle: ThrottleConfig) -> Self {
        Self {
            self_edits: HashSet::new(),
            pending: BTreeSet::new(),
            removed: Vec::new(),
            limiter: RateLimiter::new(throttle),
        }
    }

    /// Set the engine fills before editing the tree itself
    pub fn self_edits_mut(&mut self) -> &mut HashSet<NodeId> {
        &mut self.self_edits
    }

    pub fn is_throttled(&self) -> bool {
        self.limiter.is_throttled()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.removed.is_empty()
    }

    /// Feed one observer batch and say whether its work runs now, waits for
    /// the delayed recompute, or does not exist.
    pub fn observe_batch(
        &mut self,
        doc: &Document,
        classes: &HighlightTagClassification,
        root: NodeId,
        records: &[MutationRecord],
        now_ms: f64,
    ) -> BatchOutcome {
        // the set covers exactly the batch produced since it was filled
        let self_edits = std::mem::take(&mut self.self_edits);
        let (scopes, removed) = classify(doc, classes, root, records, &self_edits);
        if scopes.is_empty() && removed.is_empty() {
            return BatchOutcome::Idle;
        }
        self.pending.extend(scopes.iter().map(|s| s.root));
        self.removed.extend(removed);

        if self.limiter.admit(now_ms) {
            tracing::trace!(scopes = scopes.len(), "recomputing batch immediately");
            BatchOutcome::Run(self.release(doc, false))
        } else {
            tracing::debug!(
                pending = self.pending.len(),
                at = ?self.limiter.deferred_at(),
                "mutation rate over threshold, deferring"
            );
            BatchOutcome::Deferred
        }
    }

    /// Release the delayed recompute once due
    pub fn poll(&mut self, doc: &Document, now_ms: f64) -> Option<Batch> {
        if !self.limiter.take_due(now_ms) {
            return None;
        }
        Some(self.release(doc, true))
    }

    fn release(&mut self, doc: &Document, deferred: bool) -> Batch {
        let pending: Vec<NodeId> = std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|n| doc.is_connected(*n))
            .collect();
        let mut removed: Vec<NodeId> = std::mem::take(&mut self.removed)
            .into_iter()
            .filter(|n| !doc.is_connected(*n))
            .collect();
        removed.sort();
        removed.dedup();
        Batch {
            scopes: coalesce(doc, &pending),
            removed,
            deferred,
        }
    }

    /// Drop all queued work and the self-edit set
    pub fn reset(&mut self) {
        self.self_edits.clear();
        self.pending.clear();
        self.removed.clear();
        self.limiter.reset();
    }
}

/// True if every node the record touches was edited by the engine
fn is_self_caused(record: &MutationRecord, self_edits: &HashSet<NodeId>) -> bool {
    if !self_edits.contains(&record.target) {
        return false;
    }
    match &record.kind {
        MutationKind::CharacterData => true,
        MutationKind::ChildList { added, removed } => added
            .iter()
            .chain(removed.iter())
            .all(|n| self_edits.contains(n)),
    }
}

/// Whether a block inserted under `parent` sits among inline content, where
/// it splits the flow around it
fn splits_inline_run(doc: &Document, classes: &HighlightTagClassification, node: NodeId) -> bool {
    [doc.prev_sibling(node), doc.next_sibling(node)]
        .into_iter()
        .flatten()
        .any(|s| matches!(classes.kind(doc, s), TagKind::Text | TagKind::Flow))
}

fn has_inline_children(doc: &Document, classes: &HighlightTagClassification, node: NodeId) -> bool {
    doc.children(node)
        .iter()
        .any(|c| matches!(classes.kind(doc, *c), TagKind::Text | TagKind::Flow))
}

/// Scopes and detached nodes for one batch of records
pub fn classify(
    doc: &Document,
    classes: &HighlightTagClassification,
    root: NodeId,
    records: &[MutationRecord],
    self_edits: &HashSet<NodeId>,
) -> (Vec<Scope>, Vec<NodeId>) {
    let mut scopes = Vec::new();
    let mut removed_nodes = Vec::new();

    let localized = |node: NodeId| {
        if !doc.is_connected(node) {
            return None;
        }
        classes
            .boundary_ancestor(doc, node, root)
            .map(|root| Scope { root, kind: ScopeKind::Localized })
    };

    for record in records {
        if is_self_caused(record, self_edits) {
            continue;
        }
        match &record.kind {
            MutationKind::CharacterData => scopes.extend(localized(record.target)),
            MutationKind::ChildList { added, removed } => {
                for &node in added {
                    if !doc.is_connected(node) || classes.is_rejected(doc, node) {
                        continue;
                    }
                    let inserted_block = classes.kind(doc, node) == TagKind::Boundary
                        && !splits_inline_run(doc, classes, node);
                    if inserted_block {
                        scopes.push(Scope { root: node, kind: ScopeKind::Subtree });
                    } else {
                        scopes.extend(localized(record.target));
                    }
                }
                for &node in removed {
                    removed_nodes.push(node);
                    // a removed block between other blocks merges no flows
                    let was_block = classes.kind(doc, node) == TagKind::Boundary;
                    if !was_block || has_inline_children(doc, classes, record.target) {
                        scopes.extend(localized(record.target));
                    }
                }
            }
        }
    }
    (scopes, removed_nodes)
}

/// Drop every node that has another pending node among its ancestors
pub fn coalesce(doc: &Document, nodes: &[NodeId]) -> Vec<NodeId> {
    let set: HashSet<NodeId> = nodes.iter().copied().collect();
    let mut kept: Vec<NodeId> = set
        .iter()
        .copied()
        .filter(|n| !doc.ancestors(*n).any(|a| set.contains(&a)))
        .collect();
    kept.sort_by_key(|n| (doc.depth(*n), *n));
    kept
}

// =============================================================================
// Tests
// =============================================================================
