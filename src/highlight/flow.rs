//! FlowScanner: segmentation of a subtree into text flows
//!
//! A flow is a maximal run of text units that reads as contiguous text:
//! inline (flow-classified) elements are walked through, block boundaries
//! close the current flow, rejected elements are skipped wholesale.
//!
//! Flows are recomputed wholesale, never patched in place.

use serde::Serialize;

use super::classify::{HighlightTagClassification, TagKind};
use super::matcher::MatchBox;
use crate::dom::{Document, NodeId};

// =============================================================================
// Types
// =============================================================================

/// One text unit's slice of a flow's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowUnit {
    pub node: NodeId,
    /// Byte range inside `Flow::text`
    pub start: usize,
    pub end: usize,
}

impl FlowUnit {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Ordered text units plus their concatenated text
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Flow {
    pub text: String,
    pub units: Vec<FlowUnit>,
    /// Matches found in this flow, grouped by term in term-list order
    pub boxes: Vec<MatchBox>,
}

impl Flow {
    pub fn push_unit(&mut self, node: NodeId, text: &str) {
        let start = self.text.len();
        self.text.push_str(text);
        self.units.push(FlowUnit {
            node,
            start,
            end: self.text.len(),
        });
    }

    /// No text units at all
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn first_node(&self) -> Option<NodeId> {
        self.units.first().map(|u| u.node)
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.units.last().map(|u| u.node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.units.iter().map(|u| u.node)
    }
}

// =============================================================================
// FlowScanner
// =============================================================================

/// Depth-first flow segmentation
pub struct FlowScanner<'a> {
    doc: &'a Document,
    classes: &'a HighlightTagClassification,
}

#[derive(Default)]
struct ScanState {
    flows: Vec<Flow>,
    current: Flow,
}

impl ScanState {
    fn close(&mut self) {
        self.flows.push(std::mem::take(&mut self.current));
    }
}

impl<'a> FlowScanner<'a> {
    pub fn new(doc: &'a Document, classes: &'a HighlightTagClassification) -> Self {
        Self { doc, classes }
    }

    /// Flows under `root`, in document order, covering every non-rejected
    /// text unit exactly once.
    ///
    /// Empty leading/trailing flows are dropped unless `root` itself is
    /// flow-classified: those boundary flows may continue into a sibling's
    /// flow one level up, so they are kept for the caller.
    pub fn scan(&self, root: NodeId) -> Vec<Flow> {
        let root_kind = self.classes.kind(self.doc, root);
        match root_kind {
            TagKind::Reject => return Vec::new(),
            TagKind::Text => {
                let mut flow = Flow::default();
                flow.push_unit(root, self.doc.text(root).unwrap_or_default());
                return vec![flow];
            }
            TagKind::Flow | TagKind::Boundary => {}
        }

        let mut state = ScanState::default();
        self.walk(root, &mut state);
        state.close();

        let mut flows = state.flows;
        if root_kind != TagKind::Flow {
            flows.retain(|f| !f.is_empty());
        }
        flows
    }

    fn walk(&self, node: NodeId, state: &mut ScanState) {
        for &child in self.doc.children(node) {
            match self.classes.kind(self.doc, child) {
                TagKind::Text => {
                    state
                        .current
                        .push_unit(child, self.doc.text(child).unwrap_or_default());
                }
                TagKind::Reject => {}
                TagKind::Flow => self.walk(child, state),
                TagKind::Boundary => {
                    if !state.current.is_empty() || state.flows.is_empty() {
                        state.close();
                    }
                    self.walk(child, state);
                    if !state.current.is_empty() {
                        state.close();
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(flows: &[Flow]) -> Vec<&str> {
        flows.iter().map(|f| f.text.as_str()).collect()
    }

    #[test]
    fn test_inline_emphasis_keeps_one_flow() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, "p").unwrap();
        doc.append_text(p, "Hello ").unwrap();
        let b = doc.append_element(p, "b").unwrap();
        doc.append_text(b, "world").unwrap();
        doc.append_text(p, " wide web").unwrap();

        let classes = HighlightTagClassification::new(Vec::<&str>::new(), ["b"]).unwrap();
        let flows = FlowScanner::new(&doc, &classes).scan(p);

        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].text, "Hello world wide web");
        assert_eq!(flows[0].units.len(), 3);
        assert_eq!(flows[0].units[1].start, 6);
        assert_eq!(flows[0].units[1].end, 11);
    }

    #[test]
    fn test_block_boundaries_split_flows() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_text(root, "intro").unwrap();
        let div = doc.append_element(root, "div").unwrap();
        doc.append_text(div, "inside").unwrap();
        doc.append_text(root, "outro").unwrap();

        let classes = HighlightTagClassification::default();
        let flows = FlowScanner::new(&doc, &classes).scan(root);
        assert_eq!(texts(&flows), vec!["intro", "inside", "outro"]);
    }

    #[test]
    fn test_rejected_subtrees_are_skipped() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, "p").unwrap();
        doc.append_text(p, "visible ").unwrap();
        let script = doc.append_element(p, "script").unwrap();
        doc.append_text(script, "hidden()").unwrap();
        doc.append_text(p, "text").unwrap();

        let classes = HighlightTagClassification::default();
        let flows = FlowScanner::new(&doc, &classes).scan(root);
        assert_eq!(texts(&flows), vec!["visible text"]);
        assert!(FlowScanner::new(&doc, &classes).scan(script).is_empty());
    }

    #[test]
    fn test_empty_boundary_flows_kept_for_flow_root() {
        let mut doc = Document::new();
        let root = doc.root();
        let span = doc.append_element(root, "span").unwrap();
        let div = doc.append_element(span, "div").unwrap();
        doc.append_text(div, "block").unwrap();

        let classes = HighlightTagClassification::default();
        let scanner = FlowScanner::new(&doc, &classes);

        let from_span = scanner.scan(span);
        assert_eq!(from_span.len(), 3);
        assert!(from_span[0].is_empty());
        assert_eq!(from_span[1].text, "block");
        assert!(from_span[2].is_empty());

        let from_root = scanner.scan(root);
        assert_eq!(texts(&from_root), vec!["block"]);
    }

    #[test]
    fn test_text_root_is_its_own_flow() {
        let mut doc = Document::new();
        let root = doc.root();
        let t = doc.append_text(root, "alone").unwrap();
        let classes = HighlightTagClassification::default();
        let flows = FlowScanner::new(&doc, &classes).scan(t);
        assert_eq!(texts(&flows), vec!["alone"]);
    }

    #[test]
    fn test_segmentation_matches_depth_first_order() {
        let mut doc = Document::new();
        let root = doc.root();
        let article = doc.append_element(root, "article").unwrap();
        for i in 0..4 {
            let section = doc.append_element(article, if i % 2 == 0 { "section" } else { "span" }).unwrap();
            doc.append_text(section, &format!("s{} ", i)).unwrap();
            let em = doc.append_element(section, "em").unwrap();
            doc.append_text(em, "em ").unwrap();
            let style = doc.append_element(section, "style").unwrap();
            doc.append_text(style, "p{}").unwrap();
            let li = doc.append_element(section, "li").unwrap();
            doc.append_text(li, "item").unwrap();
        }

        let classes = HighlightTagClassification::default();
        let flows = FlowScanner::new(&doc, &classes).scan(root);
        let from_flows: Vec<NodeId> = flows.iter().flat_map(|f| f.nodes()).collect();
        let expected: Vec<NodeId> = doc
            .descendants(root)
            .filter(|n| doc.is_text(*n) && !classes.is_rejected(&doc, *n))
            .collect();

        assert_eq!(from_flows, expected);
        assert!(flows.iter().all(|f| !f.is_empty()));
    }
}
