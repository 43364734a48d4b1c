//! ScrollMarkerIndex: proportional overview of match positions
//!
//! One marker per (container, term) pair, placed at the container's top as
//! a fraction of the total scroll height. Terms sharing a container are
//! stacked with a horizontal offset per extra term.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cache::TreeCache;
use super::classify::HighlightTagClassification;
use super::config::EngineConfig;
use super::terms::{Term, TermToken};
use crate::dom::{Document, NodeId};
use crate::layout::LayoutProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollMarker {
    pub token: TermToken,
    pub hue: u16,
    pub container: NodeId,
    /// Container top over scroll height, in `[0, 1]`
    pub top: f64,
    pub offset_px: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ScrollMarkerIndex {
    markers: Vec<ScrollMarker>,
}

impl ScrollMarkerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> &[ScrollMarker] {
        &self.markers
    }

    /// Rebuild markers for the first terms, as many as there are hues and
    /// at most `max_marker_terms`
    #[allow(clippy::too_many_arguments)]
    pub fn rebuild(
        &mut self,
        doc: &Document,
        cache: &TreeCache,
        classes: &HighlightTagClassification,
        layout: &dyn LayoutProvider,
        config: &EngineConfig,
        terms: &[Term],
        hues: &[u16],
    ) -> &[ScrollMarker] {
        self.markers.clear();
        let limit = config.max_marker_terms.min(hues.len());
        let root = doc.root();
        let scroll_height = layout.scroll_height(doc);
        if limit == 0 || scroll_height <= 0.0 {
            return &self.markers;
        }

        // container -> term positions present in it
        let mut containers: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for (index, term) in terms.iter().enumerate().take(limit) {
            for b in cache.heads().filter(|b| &b.token == term.token()) {
                let Some(container) = classes.boundary_ancestor(doc, b.node, root) else {
                    continue;
                };
                let present = containers.entry(container).or_default();
                if !present.contains(&index) {
                    present.push(index);
                }
            }
        }

        for (container, mut indices) in containers {
            let Some(rect) = layout.element_rect(doc, container) else {
                continue;
            };
            indices.sort_unstable();
            let top = (rect.y / scroll_height).clamp(0.0, 1.0);
            for (stack, index) in indices.into_iter().enumerate() {
                let term = &terms[index];
                self.markers.push(ScrollMarker {
                    token: term.token().clone(),
                    hue: hues[term.hue() % hues.len()],
                    container,
                    top,
                    offset_px: stack as f64 * config.marker_stack_offset_px,
                });
            }
        }
        self.markers
            .sort_by(|a, b| a.top.total_cmp(&b.top).then(a.offset_px.total_cmp(&b.offset_px)));
        &self.markers
    }

    /// Gutter markup for the host to insert
    pub fn markup(&self, config: &EngineConfig) -> String {
        let mut html = format!("<div class=\"{}\">", config.gutter_class());
        for m in &self.markers {
            html.push_str(&format!(
                "<div class=\"{}\" style=\"top: {:.3}%; right: {}px; --{}hue: {}\"></div>",
                config.term_class(m.token.as_str()),
                m.top * 100.0,
                m.offset_px,
                config.class_prefix,
                m.hue
            ));
        }
        html.push_str("</div>");
        html
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }
}
