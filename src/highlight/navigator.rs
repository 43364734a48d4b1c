//! Navigator: focus movement between matches
//!
//! Explicit state object driven by `handle(command)`. It holds the current
//! focus position and whether the last command targeted one term (select
//! mode) or any term.
//!
//! # Modes
//! - **Jump**: selects the enclosing block when that block holds no other
//!   match, otherwise the match element itself. Smooth scroll.
//! - **Step**: always the match element, instant scroll, for rapid paging.
//!
//! Running off either end restarts from the opposite extremity, at most
//! `max_wraps` times per command.

use serde::{Deserialize, Serialize};

use super::backend::RenderBackend;
use super::cache::TreeCache;
use super::classify::HighlightTagClassification;
use super::config::EngineConfig;
use super::matcher::MatchBox;
use super::terms::TermToken;
use crate::dom::{Document, DomError, NodeId};

// =============================================================================
// Commands & Outcomes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavMode {
    Jump,
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavCommand {
    pub direction: Direction,
    pub mode: NavMode,
    /// Restrict to one term (select mode)
    #[serde(default)]
    pub term: Option<TermToken>,
}

/// Where focus landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavOutcome {
    pub token: TermToken,
    /// Text unit and byte range of the match
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
    /// Element that received focus
    pub target: NodeId,
    pub scroll: ScrollBehavior,
    /// Search attempts used; more than one means it wrapped around
    pub passes: usize,
}

impl NavOutcome {
    pub fn wrapped(&self) -> bool {
        self.passes > 1
    }
}

/// Engine state lent to the navigator
pub struct NavContext<'a> {
    pub doc: &'a mut Document,
    pub cache: &'a TreeCache,
    pub classes: &'a HighlightTagClassification,
    pub config: &'a EngineConfig,
    pub backend: &'a dyn RenderBackend,
}

// =============================================================================
// Navigator
// =============================================================================

const NATIVELY_FOCUSABLE: &[&str] = &["button", "input", "select", "textarea", "summary"];

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    /// Text unit and start offset of the focused match
    focus: Option<(NodeId, usize)>,
    select_mode: bool,
    focused_element: Option<NodeId>,
    made_focusable: Vec<NodeId>,
    max_wraps: usize,
}

impl Navigator {
    pub fn new(max_wraps: usize) -> Self {
        Self {
            max_wraps,
            ..Self::default()
        }
    }

    pub fn select_mode(&self) -> bool {
        self.select_mode
    }

    pub fn focused_element(&self) -> Option<NodeId> {
        self.focused_element
    }

    pub fn handle(&mut self, ctx: &mut NavContext<'_>, command: &NavCommand) -> Option<NavOutcome> {
        self.select_mode = command.term.is_some();
        let root = ctx.doc.root();
        let order = ctx.doc.document_order(root);

        let mut heads: Vec<(usize, &MatchBox)> = ctx
            .cache
            .heads()
            .filter(|b| command.term.as_ref().map_or(true, |t| &b.token == t))
            .filter_map(|b| order.get(&b.node).map(|o| (*o, b)))
            .collect();
        heads.sort_by(|a, b| (a.0, a.1.start, &a.1.token).cmp(&(b.0, b.1.start, &b.1.token)));
        if heads.is_empty() {
            return None;
        }

        let current = self
            .focus
            .and_then(|(node, start)| order.get(&node).map(|o| (*o, start)));
        let mut from = current;
        let mut passes = 0;
        let picked = loop {
            passes += 1;
            let found = match command.direction {
                Direction::Forward => heads
                    .iter()
                    .find(|(o, b)| from.map_or(true, |f| (*o, b.start) > f)),
                Direction::Backward => heads
                    .iter()
                    .rev()
                    .find(|(o, b)| from.map_or(true, |f| (*o, b.start) < f)),
            };
            if let Some(found) = found {
                break Some(*found);
            }
            if passes > self.max_wraps {
                break None;
            }
            from = None;
        };
        let (_, hit) = picked?;
        let hit = hit.clone();

        let element = ctx.backend.match_element(ctx.doc, ctx.config, hit.node)?;
        let (target, scroll) = match command.mode {
            NavMode::Step => (element, ScrollBehavior::Instant),
            NavMode::Jump => {
                let block = ctx
                    .classes
                    .boundary_ancestor(ctx.doc, hit.node, root)
                    .filter(|block| {
                        heads
                            .iter()
                            .filter(|(_, b)| ctx.doc.contains(*block, b.node))
                            .count()
                            == 1
                    });
                (block.unwrap_or(element), ScrollBehavior::Smooth)
            }
        };

        self.move_focus(ctx.doc, ctx.config, target);
        self.focus = Some((hit.node, hit.start));
        tracing::debug!(%target, passes, select = self.select_mode, "focus moved");

        Some(NavOutcome {
            token: hit.token,
            node: hit.node,
            start: hit.start,
            end: hit.end,
            target,
            scroll,
            passes,
        })
    }

    fn is_focusable(doc: &Document, node: NodeId) -> bool {
        if doc.attribute(node, "tabindex").is_some() {
            return true;
        }
        match doc.tag(node) {
            Some("a") => doc.attribute(node, "href").is_some(),
            Some(tag) => NATIVELY_FOCUSABLE.contains(&tag),
            None => false,
        }
    }

    fn move_focus(&mut self, doc: &mut Document, config: &EngineConfig, target: NodeId) {
        self.release(doc, config);
        warn_on_error(doc.add_class(target, &config.focus_class()), target, "add focus class");
        if !Self::is_focusable(doc, target) {
            warn_on_error(doc.set_attribute(target, "tabindex", "-1"), target, "set tabindex");
            warn_on_error(
                doc.add_class(target, &config.focus_revert_class()),
                target,
                "flag temporary focusability",
            );
            self.made_focusable.push(target);
        }
        self.focused_element = Some(target);
    }

    /// Clear focus classes and revert temporarily focusable elements.
    /// Elements released by a recompute in the meantime are skipped.
    pub fn release(&mut self, doc: &mut Document, config: &EngineConfig) {
        if let Some(previous) = self.focused_element.take().filter(|n| doc.exists(*n)) {
            warn_on_error(
                doc.remove_class(previous, &config.focus_class()),
                previous,
                "remove focus class",
            );
        }
        for node in std::mem::take(&mut self.made_focusable) {
            if !doc.exists(node) {
                continue;
            }
            warn_on_error(doc.remove_attribute(node, "tabindex"), node, "remove tabindex");
            warn_on_error(
                doc.remove_class(node, &config.focus_revert_class()),
                node,
                "revert temporary focusability",
            );
        }
    }

    /// Forget the focus position as well
    pub fn reset(&mut self, doc: &mut Document, config: &EngineConfig) {
        self.release(doc, config);
        self.focus = None;
        self.select_mode = false;
    }
}

fn warn_on_error<T>(result: Result<T, DomError>, node: NodeId, action: &str) {
    if let Err(err) = result {
        tracing::warn!(%node, %err, action, "focus bookkeeping failed");
    }
}
