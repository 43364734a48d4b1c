//! Tag classification for flow segmentation
//!
//! Three-way split of element kinds:
//! - **reject**: never entered (non-rendering, script-like content)
//! - **flow**: does not terminate a flow (inline emphasis)
//! - everything else is a **block boundary** and always terminates a flow

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::dom::{Document, NodeId};
use crate::error::EngineError;

const DEFAULT_REJECT: &[&str] = &[
    "meta", "style", "script", "noscript", "title", "textarea", "template", "svg", "iframe",
];

const DEFAULT_FLOW: &[&str] = &[
    "b", "i", "u", "s", "em", "strong", "small", "big", "sub", "sup", "mark", "span", "a",
    "code", "kbd", "samp", "var", "abbr", "cite", "dfn", "q", "time", "data", "label", "font",
    "wbr", "ins", "del",
];

/// How a node takes part in segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Text,
    Reject,
    Flow,
    Boundary,
}

/// Reject/flow tag sets as supplied by a collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationDefinition {
    #[serde(default)]
    pub reject: Vec<String>,
    #[serde(default)]
    pub flow: Vec<String>,
}

/// Disjoint reject and flow tag sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightTagClassification {
    reject: HashSet<String>,
    flow: HashSet<String>,
}

impl Default for HighlightTagClassification {
    fn default() -> Self {
        Self {
            reject: DEFAULT_REJECT.iter().map(|t| t.to_string()).collect(),
            flow: DEFAULT_FLOW.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl HighlightTagClassification {
    /// Build from tag lists. Fails if a tag is in both sets.
    pub fn new<R, F, S>(reject: R, flow: F) -> Result<Self, EngineError>
    where
        R: IntoIterator<Item = S>,
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reject: HashSet<String> = reject
            .into_iter()
            .map(|t| t.as_ref().to_ascii_lowercase())
            .collect();
        let flow: HashSet<String> = flow
            .into_iter()
            .map(|t| t.as_ref().to_ascii_lowercase())
            .collect();
        if let Some(tag) = reject.intersection(&flow).min() {
            return Err(EngineError::ClassificationOverlap(tag.clone()));
        }
        Ok(Self { reject, flow })
    }

    pub fn from_definition(def: &ClassificationDefinition) -> Result<Self, EngineError> {
        Self::new(&def.reject, &def.flow)
    }

    /// Add a flow-permitting tag (the marker tag must never split flows)
    pub fn with_flow_tag(mut self, tag: &str) -> Result<Self, EngineError> {
        let tag = tag.to_ascii_lowercase();
        if self.reject.contains(&tag) {
            return Err(EngineError::ClassificationOverlap(tag));
        }
        self.flow.insert(tag);
        Ok(self)
    }

    pub fn tag_kind(&self, tag: &str) -> TagKind {
        if self.reject.contains(tag) {
            TagKind::Reject
        } else if self.flow.contains(tag) {
            TagKind::Flow
        } else {
            TagKind::Boundary
        }
    }

    pub fn kind(&self, doc: &Document, node: NodeId) -> TagKind {
        match doc.tag(node) {
            Some(tag) => self.tag_kind(tag),
            None => TagKind::Text,
        }
    }

    /// True if `node` or any ancestor is rejected
    pub fn is_rejected(&self, doc: &Document, node: NodeId) -> bool {
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .any(|n| self.kind(doc, n) == TagKind::Reject)
    }

    /// Nearest block-boundary element containing `node` (inclusive), never
    /// climbing above `limit`. `None` when the node sits in rejected content
    /// or outside `limit`.
    pub fn boundary_ancestor(&self, doc: &Document, node: NodeId, limit: NodeId) -> Option<NodeId> {
        let mut found = None;
        for n in std::iter::once(node).chain(doc.ancestors(node)) {
            match self.kind(doc, n) {
                TagKind::Reject => return None,
                TagKind::Boundary if found.is_none() => found = Some(n),
                _ => {}
            }
            if n == limit {
                return Some(found.unwrap_or(limit));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_is_rejected() {
        let err = HighlightTagClassification::new(["b", "script"], ["B"]).unwrap_err();
        assert!(matches!(err, EngineError::ClassificationOverlap(tag) if tag == "b"));
    }

    #[test]
    fn test_marker_tag_cannot_be_rejected() {
        let classes = HighlightTagClassification::new(["x-mark"], Vec::<&str>::new()).unwrap();
        assert!(classes.with_flow_tag("x-mark").is_err());
    }

    #[test]
    fn test_tag_kinds() {
        let classes = HighlightTagClassification::default();
        assert_eq!(classes.tag_kind("script"), TagKind::Reject);
        assert_eq!(classes.tag_kind("b"), TagKind::Flow);
        assert_eq!(classes.tag_kind("p"), TagKind::Boundary);
    }

    #[test]
    fn test_boundary_ancestor() {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.append_element(root, "div").unwrap();
        let p = doc.append_element(div, "p").unwrap();
        let b = doc.append_element(p, "b").unwrap();
        let text = doc.append_text(b, "bold").unwrap();
        let script = doc.append_element(div, "script").unwrap();
        let code = doc.append_text(script, "var x").unwrap();

        let classes = HighlightTagClassification::default();
        assert_eq!(classes.boundary_ancestor(&doc, text, root), Some(p));
        assert_eq!(classes.boundary_ancestor(&doc, p, root), Some(p));
        assert_eq!(classes.boundary_ancestor(&doc, text, div), Some(p));
        assert_eq!(classes.boundary_ancestor(&doc, code, root), None);
        assert!(classes.is_rejected(&doc, code));
    }

    #[test]
    fn test_boundary_ancestor_stops_at_flow_limit() {
        let mut doc = Document::new();
        let root = doc.root();
        let span = doc.append_element(root, "span").unwrap();
        let text = doc.append_text(span, "inline").unwrap();

        let classes = HighlightTagClassification::default();
        assert_eq!(classes.boundary_ancestor(&doc, text, span), Some(span));
        assert_eq!(classes.boundary_ancestor(&doc, text, root), Some(root));
    }
}
