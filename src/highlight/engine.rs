//! Highlighter: the engine facade
//!
//! Owns the document model, the tree cache, the mutation tracker and the
//! backend chosen at construction. Every entry point is synchronous; work
//! that should not happen inline (the initial pass, throttled recomputes)
//! waits for `tick()`.
//!
//! # Lifecycle
//! ```text
//! start_highlighting ─► tick ─► (process_mutations | tick)* ─► end_highlighting
//! ```
//!
//! # Host output
//! Render updates, occurrence-count events and DOM patches are queued and
//! drained by the host once per callback.

use instant::Instant;
use serde::{Deserialize, Serialize};

use super::backend::{
    create_backend, select_backend, BackendContext, BackendKind, Capabilities, RenderBackend,
    RenderUpdate, ScopeChange, VisibilityChange,
};
use super::cache::{CountDelta, TreeCache};
use super::classify::HighlightTagClassification;
use super::config::EngineConfig;
use super::flow::{Flow, FlowScanner};
use super::markers::{ScrollMarker, ScrollMarkerIndex};
use super::matcher::TermMatcher;
use super::mutation::{Batch, BatchOutcome, MutationTracker};
use super::navigator::{Direction, NavCommand, NavContext, NavMode, NavOutcome, Navigator};
use super::style::{style_fragments, StyleFragment};
use super::terms::{assign_hues, Term, TermToken};
use crate::dom::{Document, NodeId};
use crate::error::{invariant, EngineError};
use crate::layout::{GridLayout, LayoutProvider};

/// Default hue list (degrees)
pub const DEFAULT_HUES: &[u16] = &[300, 60, 110, 220, 30, 190, 0];

// =============================================================================
// Output Types
// =============================================================================

/// Notification for collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A term's occurrence count changed
    OccurrenceCount { token: TermToken, count: usize },
}

/// Recompute counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeStats {
    pub recomputes: u64,
    pub scopes: u64,
    pub flows: u64,
    pub boxes: u64,
    pub throttled_batches: u64,
    pub deferred_flushes: u64,
    pub last_recompute_us: u64,
}

// =============================================================================
// Engine State
// =============================================================================

/// Everything a backend call may borrow, kept apart from the backend itself
struct EngineState<L> {
    doc: Document,
    layout: L,
    config: EngineConfig,
    classes: HighlightTagClassification,
    terms: Vec<Term>,
    hues: Vec<u16>,
    cache: TreeCache,
    tracker: MutationTracker,
}

impl<L: LayoutProvider> EngineState<L> {
    fn ctx(&mut self) -> BackendContext<'_> {
        BackendContext {
            doc: &mut self.doc,
            cache: &mut self.cache,
            layout: &self.layout,
            classes: &self.classes,
            config: &self.config,
            terms: &self.terms,
            hues: &self.hues,
            edits: self.tracker.self_edits_mut(),
        }
    }

    /// Scan and match one scope against the current tree
    fn scan(&self, scope: NodeId) -> Vec<Flow> {
        let mut flows = FlowScanner::new(&self.doc, &self.classes).scan(scope);
        TermMatcher::new(&self.terms).match_flows(&mut flows);
        flows
    }

    fn knows(&self, token: &TermToken) -> bool {
        self.terms.iter().any(|t| t.token() == token)
    }
}

// =============================================================================
// Highlighter
// =============================================================================

pub struct Highlighter<L: LayoutProvider = GridLayout> {
    state: EngineState<L>,
    backend: Box<dyn RenderBackend>,
    navigator: Navigator,
    markers: ScrollMarkerIndex,
    events: Vec<EngineEvent>,
    updates: Vec<RenderUpdate>,
    initial_pending: bool,
    active: bool,
    stats: RecomputeStats,
}

impl<L: LayoutProvider> Highlighter<L> {
    /// Build an engine, probing `capabilities` once for the backend
    pub fn new(
        doc: Document,
        layout: L,
        config: EngineConfig,
        classification: HighlightTagClassification,
        capabilities: Capabilities,
    ) -> Result<Self, EngineError> {
        let backend = create_backend(select_backend(capabilities));
        Self::with_backend(doc, layout, config, classification, backend)
    }

    /// Build an engine around an explicit backend
    pub fn with_backend(
        mut doc: Document,
        layout: L,
        config: EngineConfig,
        classification: HighlightTagClassification,
        backend: Box<dyn RenderBackend>,
    ) -> Result<Self, EngineError> {
        let classes = classification.with_flow_tag(&config.marker_tag)?;
        if config.patch_log {
            doc.enable_patch_log();
        }
        tracing::info!(backend = ?backend.kind(), "highlighter created");

        Ok(Self {
            navigator: Navigator::new(config.max_wraps),
            state: EngineState {
                doc,
                layout,
                tracker: MutationTracker::new(config.throttle),
                config,
                classes,
                terms: Vec::new(),
                hues: DEFAULT_HUES.to_vec(),
                cache: TreeCache::new(),
            },
            backend,
            markers: ScrollMarkerIndex::new(),
            events: Vec::new(),
            updates: Vec::new(),
            initial_pending: false,
            active: false,
            stats: RecomputeStats::default(),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn document(&self) -> &Document {
        &self.state.doc
    }

    /// Host edits go through here; they are observed while highlighting
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.state.doc
    }

    pub fn layout(&self) -> &L {
        &self.state.layout
    }

    pub fn layout_mut(&mut self) -> &mut L {
        &mut self.state.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn terms(&self) -> &[Term] {
        &self.state.terms
    }

    pub fn cache(&self) -> &TreeCache {
        &self.state.cache
    }

    pub fn hues(&self) -> &[u16] {
        &self.state.hues
    }

    pub fn set_hues(&mut self, hues: Vec<u16>) {
        if hues.is_empty() {
            tracing::warn!("ignoring empty hue list");
            return;
        }
        self.state.hues = hues;
        let count = self.state.hues.len();
        assign_hues(&mut self.state.terms, count);
    }

    pub fn stats(&self) -> &RecomputeStats {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Initial pass still waiting for `tick()`
    pub fn is_initial_pending(&self) -> bool {
        self.initial_pending
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Replace the term list, purge `terms_to_purge` and schedule a full pass.
    ///
    /// A pass is scheduled when the term list changed or `terms_to_highlight`
    /// is non-empty; it always covers the whole tree with the whole list so
    /// list order keeps deciding how overlapping terms nest.
    pub fn start_highlighting(
        &mut self,
        mut terms: Vec<Term>,
        terms_to_highlight: &[TermToken],
        terms_to_purge: &[TermToken],
    ) -> Result<(), EngineError> {
        if !terms_to_purge.is_empty() {
            self.purge(terms_to_purge, false)?;
        }

        assign_hues(&mut terms, self.state.hues.len());
        let changed = terms.len() != self.state.terms.len()
            || terms
                .iter()
                .zip(&self.state.terms)
                .any(|(a, b)| a.token() != b.token());
        self.state.terms = terms;

        if !self.active {
            self.state.doc.observe();
            self.active = true;
        }

        if changed || !terms_to_highlight.is_empty() || !terms_to_purge.is_empty() {
            if self.state.config.defer_initial {
                self.initial_pending = true;
                tracing::debug!(terms = self.state.terms.len(), "initial pass deferred to next tick");
            } else {
                self.run_full()?;
            }
        }
        Ok(())
    }

    /// Run the deferred initial pass and any throttled recompute that is due.
    /// Returns true when something ran.
    pub fn tick(&mut self, now_ms: f64) -> Result<bool, EngineError> {
        let mut ran = false;
        if self.initial_pending {
            self.run_full()?;
            ran = true;
        }
        if let Some(batch) = self.state.tracker.poll(&self.state.doc, now_ms) {
            self.run_batch(batch);
            ran = true;
        }
        Ok(ran)
    }

    /// Drain one observer batch from the document and react to it
    pub fn process_mutations(&mut self, now_ms: f64) {
        let records = self.state.doc.take_records();
        if !self.active || records.is_empty() {
            return;
        }
        if self.initial_pending {
            // the pending full pass covers everything
            self.state.tracker.self_edits_mut().clear();
            return;
        }

        let state = &mut self.state;
        let root = state.doc.root();
        match state
            .tracker
            .observe_batch(&state.doc, &state.classes, root, &records, now_ms)
        {
            BatchOutcome::Run(batch) => self.run_batch(batch),
            BatchOutcome::Deferred => self.stats.throttled_batches += 1,
            BatchOutcome::Idle => {}
        }
    }

    /// Remove highlighting for `terms` (or everything). Undone terms leave
    /// the term list.
    pub fn undo_highlights(&mut self, terms: Option<&[TermToken]>) -> Result<(), EngineError> {
        let state = &mut self.state;
        self.navigator.reset(&mut state.doc, &state.config);
        match terms {
            Some(tokens) => self.purge(tokens, true),
            None => {
                self.backend.undo(&mut self.state.ctx(), None)?;
                let tokens: Vec<TermToken> = self.state.terms.iter().map(|t| t.token().clone()).collect();
                self.state.cache.clear();
                self.state.terms.clear();
                self.initial_pending = false;
                for token in tokens {
                    self.events.push(EngineEvent::OccurrenceCount { token, count: 0 });
                }
                Ok(())
            }
        }
    }

    /// Undo everything, stop observing and discard all state
    pub fn end_highlighting(&mut self) -> Result<(), EngineError> {
        self.undo_highlights(None)?;
        self.state.doc.disconnect();
        self.state.tracker.reset();
        self.markers.clear();
        self.updates.push(RenderUpdate::ScrollGutter { markup: String::new() });
        self.active = false;
        self.stats = RecomputeStats::default();
        tracing::info!("highlighting ended");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries & Navigation
    // -------------------------------------------------------------------------

    pub fn focus_next_term(
        &mut self,
        direction: Direction,
        mode: NavMode,
        term: Option<&TermToken>,
    ) -> Option<NavOutcome> {
        if let Some(token) = term {
            if !invariant(self.state.knows(token), "navigation term is in the term list") {
                return None;
            }
        }
        let mut ctx = NavContext {
            doc: &mut self.state.doc,
            cache: &self.state.cache,
            classes: &self.state.classes,
            config: &self.state.config,
            backend: self.backend.as_ref(),
        };
        let command = NavCommand {
            direction,
            mode,
            term: term.cloned(),
        };
        self.navigator.handle(&mut ctx, &command)
    }

    /// Occurrences of a term; with `exists_only`, 0 or 1
    pub fn term_occurrence_count(&self, token: &TermToken, exists_only: bool) -> usize {
        if !invariant(self.state.knows(token), "counted term is in the term list") {
            return 0;
        }
        let count = self.state.cache.count(token);
        if exists_only {
            count.min(1)
        } else {
            count
        }
    }

    /// Rebuild the scroll-marker gutter for `terms` in the given order
    pub fn insert_scroll_markers(&mut self, terms: &[TermToken], hues: &[u16]) -> Vec<ScrollMarker> {
        let mut selected: Vec<Term> = terms
            .iter()
            .filter_map(|token| {
                let term = self.state.terms.iter().find(|t| t.token() == token);
                invariant(term.is_some(), "marker term is in the term list");
                term.cloned()
            })
            .collect();
        assign_hues(&mut selected, hues.len());

        let state = &self.state;
        let markers = self
            .markers
            .rebuild(
                &state.doc,
                &state.cache,
                &state.classes,
                &state.layout,
                &state.config,
                &selected,
                hues,
            )
            .to_vec();
        self.updates.push(RenderUpdate::ScrollGutter {
            markup: self.markers.markup(&self.state.config),
        });
        markers
    }

    pub fn style_fragments(&self) -> Vec<StyleFragment> {
        style_fragments(
            self.backend.kind(),
            &self.state.config,
            &self.state.terms,
            &self.state.hues,
        )
    }

    // -------------------------------------------------------------------------
    // Viewport
    // -------------------------------------------------------------------------

    pub fn on_scroll(&mut self) {
        self.backend.on_scroll(&mut self.state.ctx());
    }

    pub fn on_resize(&mut self) {
        self.backend.on_resize(&mut self.state.ctx());
    }

    pub fn on_visibility(&mut self, changes: &[VisibilityChange]) {
        self.backend.on_visibility(&mut self.state.ctx(), changes);
    }

    // -------------------------------------------------------------------------
    // Host output
    // -------------------------------------------------------------------------

    pub fn take_render_updates(&mut self) -> Vec<RenderUpdate> {
        let mut updates = self.backend.take_updates();
        updates.append(&mut self.updates);
        updates
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Recompute
    // -------------------------------------------------------------------------

    fn run_full(&mut self) -> Result<(), EngineError> {
        self.initial_pending = false;
        let root = self.state.doc.root();
        // an undo may have detached holders before this pass
        let orphans = self.state.cache.detached_holders(&self.state.doc);
        self.recompute_scope(root, orphans)
    }

    fn run_batch(&mut self, batch: Batch) {
        for node in &batch.removed {
            let (holders, delta) = self.state.cache.forget_subtree(&self.state.doc, *node);
            if !holders.is_empty() {
                self.backend.forget(&mut self.state.ctx(), &holders);
            }
            self.emit_counts(delta);
        }
        for &scope in &batch.scopes {
            if !self.state.doc.is_connected(scope) {
                continue;
            }
            // a failing scope must not stop tracking of the others
            if let Err(err) = self.recompute_scope(scope, Vec::new()) {
                tracing::error!(%scope, %err, "scope recompute failed");
            }
        }
        if batch.deferred {
            self.stats.deferred_flushes += 1;
        }
    }

    /// Clear, rescan, write and swap one scope. `orphans` are detached
    /// holders swapped out along with the scope's own.
    fn recompute_scope(&mut self, scope: NodeId, orphans: Vec<NodeId>) -> Result<(), EngineError> {
        let started = Instant::now();
        let state = &mut self.state;
        let mut old_holders = state.cache.holders_within(&state.doc, &state.classes, scope);
        old_holders.extend(orphans);

        self.backend.clear_scope(&mut self.state.ctx(), scope)?;
        let mut flows = self.state.scan(scope);
        if self.backend.write_scope(&mut self.state.ctx(), scope, &flows)? {
            flows = self.state.scan(scope);
        }
        let flow_count = flows.len() as u64;
        let box_count: u64 = flows.iter().map(|f| f.boxes.len() as u64).sum();

        let state = &mut self.state;
        let delta = state.cache.replace(&state.doc, &old_holders, flows);
        let new_holders = state.cache.holders_within(&state.doc, &state.classes, scope);
        let change = ScopeChange {
            scope,
            old_holders,
            new_holders,
        };
        self.backend.refresh_scope(&mut self.state.ctx(), &change);
        self.emit_counts(delta);

        self.stats.recomputes += 1;
        self.stats.scopes += 1;
        self.stats.flows += flow_count;
        self.stats.boxes += box_count;
        self.stats.last_recompute_us = started.elapsed().as_micros() as u64;
        tracing::debug!(
            %scope,
            flows = flow_count,
            boxes = box_count,
            us = self.stats.last_recompute_us,
            "scope recomputed"
        );
        Ok(())
    }

    /// Drop terms from the cache, the backend and the term list
    fn purge(&mut self, tokens: &[TermToken], rescan: bool) -> Result<(), EngineError> {
        for token in tokens {
            self.state.cache.drop_token(token);
            self.events.push(EngineEvent::OccurrenceCount {
                token: token.clone(),
                count: 0,
            });
        }
        self.state.terms.retain(|t| !tokens.contains(t.token()));
        let count = self.state.hues.len();
        assign_hues(&mut self.state.terms, count);
        self.backend.undo(&mut self.state.ctx(), Some(tokens))?;

        // unwrapping merged text the remaining terms' flows point into
        if rescan && self.backend.kind() == BackendKind::Element && !self.state.terms.is_empty() {
            self.run_full()?;
        }
        Ok(())
    }

    fn emit_counts(&mut self, delta: CountDelta) {
        for token in delta.changed {
            let count = self.state.cache.count(&token);
            self.events.push(EngineEvent::OccurrenceCount { token, count });
        }
    }
}
