//! Document: id-keyed text tree
//!
//! The highlighted region is modelled as an id-keyed table of element and
//! text nodes. Node ids are allocated sequentially and never reused, so they
//! double as identity keys for side tables such as the highlight `TreeCache`.
//!
//! # Storage
//! A detached subtree stays allocated until `release` frees it. Released ids
//! are retired, not recycled, so storage follows the live tree while ids
//! stay unique for the lifetime of the document.
//!
//! # Change notification
//! After `observe()`, every structural edit queues a `MutationRecord`. A
//! caller drains one observer batch at a time with `take_records()`.
//! Attribute and class edits are not observed.
//!
//! # Host mirroring
//! With the patch log enabled every edit is also written as a `DomPatch`, so
//! a JS host can replay engine edits on its real tree. `apply_patch` is the
//! inbound direction.

mod patch;

pub use patch::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// =============================================================================
// Types
// =============================================================================

/// Stable node identity. Never reused within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Element payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Node payload: an element or a text unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Tree editing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0} is not a text unit")]
    NotText(NodeId),
    #[error("inserting {child} under {parent} would create a cycle")]
    HierarchyCycle { parent: NodeId, child: NodeId },
    #[error("offset {offset} is out of bounds for text unit {node}")]
    OffsetOutOfBounds { node: NodeId, offset: usize },
    #[error("node {node} is not a child of {parent}")]
    NotAChild { parent: NodeId, node: NodeId },
    #[error("patch creates node {got} but the next free id is {expected}")]
    IdMismatch { expected: NodeId, got: NodeId },
    #[error("node {0} is still attached")]
    StillAttached(NodeId),
}

// =============================================================================
// Document
// =============================================================================

/// Node table rooted at a `body` element
#[derive(Debug, Clone)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    next: u32,
    root: NodeId,
    observing: bool,
    records: Vec<MutationRecord>,
    patch_log: Option<Vec<DomPatch>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Element(ElementData {
                tag: "body".to_string(),
                ..ElementData::default()
            }),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: HashMap::from([(NodeId(0), root)]),
            next: 1,
            root: NodeId(0),
            observing: false,
            records: Vec::new(),
            patch_log: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of allocated nodes, attached or not. Released nodes are
    /// not counted.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of ids handed out so far, released ones included
    pub fn allocated(&self) -> usize {
        self.next as usize
    }

    /// Id the next created node will receive
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next)
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(&id).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(&id).ok_or(DomError::UnknownNode(id))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = self.next_id();
        self.next += 1;
        self.nodes.insert(
            id,
            Node {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(el) => Ok(el),
            NodeData::Text(_) => Err(DomError::NotAnElement(id)),
        }
    }

    fn record(&mut self, record: MutationRecord) {
        if self.observing {
            self.records.push(record);
        }
    }

    fn log(&mut self, patch: DomPatch) {
        if let Some(log) = self.patch_log.as_mut() {
            log.push(patch);
        }
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        self.log(DomPatch::CreateElement {
            id: self.next_id(),
            tag: tag.clone(),
        });
        self.push(NodeData::Element(ElementData {
            tag,
            ..ElementData::default()
        }))
    }

    /// Create a detached text unit
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        let text = text.into();
        self.log(DomPatch::CreateText {
            id: self.next_id(),
            text: text.clone(),
        });
        self.push(NodeData::Text(text))
    }

    /// Create an element and append it to `parent`
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId, DomError> {
        let id = self.create_element(tag);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Create a text unit and append it to `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        let id = self.create_text(text);
        self.append_child(parent, id)?;
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Structural edits
    // -------------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `before` (or last when `None`).
    /// A child that already has a parent is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), DomError> {
        if !self.is_element(parent) {
            self.node(parent)?;
            return Err(DomError::NotAnElement(parent));
        }
        self.node(child)?;
        if self.contains(child, parent) {
            return Err(DomError::HierarchyCycle { parent, child });
        }
        if let Some(reference) = before {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild { parent, node: reference });
            }
        }

        self.detach(child)?;

        let index = match before {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|c| *c == reference)
                .ok_or(DomError::NotAChild { parent, node: reference })?,
            None => self.children(parent).len(),
        };
        self.node_mut(parent)?.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);

        self.record(MutationRecord::added(parent, child));
        self.log(DomPatch::InsertBefore { parent, child, before });
        Ok(())
    }

    /// Detach a node from its parent. The subtree stays allocated until
    /// released.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.node(node)?;
        if self.parent(node).is_some() {
            self.detach(node)?;
            self.log(DomPatch::Remove { node });
        }
        Ok(())
    }

    /// Free a detached subtree. Its ids stay retired, so later lookups
    /// report `UnknownNode`. Returns the number of nodes freed.
    pub fn release(&mut self, node: NodeId) -> Result<usize, DomError> {
        if node == self.root || self.node(node)?.parent.is_some() {
            return Err(DomError::StillAttached(node));
        }
        let doomed: Vec<NodeId> = self.descendants(node).collect();
        for id in &doomed {
            self.nodes.remove(id);
        }
        self.log(DomPatch::Release { node });
        Ok(doomed.len())
    }

    fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        if let Some(parent) = self.node(node)?.parent {
            self.node_mut(parent)?.children.retain(|c| *c != node);
            self.node_mut(node)?.parent = None;
            self.record(MutationRecord::removed(parent, node));
        }
        Ok(())
    }

    /// Replace a text unit's content
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) -> Result<(), DomError> {
        let text = text.into();
        match &mut self.node_mut(node)?.data {
            NodeData::Text(current) => *current = text.clone(),
            NodeData::Element(_) => return Err(DomError::NotText(node)),
        }
        self.record(MutationRecord::character_data(node));
        self.log(DomPatch::SetText { node, text });
        Ok(())
    }

    /// Split a text unit at a byte offset. The original keeps `[..offset]`;
    /// the returned new unit holds `[offset..]` and is inserted right after it.
    pub fn split_text(&mut self, node: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let text = self.text(node).ok_or(DomError::NotText(node))?;
        if offset > text.len() || !text.is_char_boundary(offset) {
            return Err(DomError::OffsetOutOfBounds { node, offset });
        }
        let head = text[..offset].to_string();
        let tail = text[offset..].to_string();

        self.set_text(node, head)?;
        let split = self.create_text(tail);
        if let Some(parent) = self.parent(node) {
            let next = self.next_sibling(node);
            self.insert_before(parent, split, next)?;
        }
        Ok(split)
    }

    /// Move an element's children into its place and detach the element
    pub fn replace_with_children(&mut self, element: NodeId) -> Result<(), DomError> {
        if !self.is_element(element) {
            self.node(element)?;
            return Err(DomError::NotAnElement(element));
        }
        let parent = match self.parent(element) {
            Some(p) => p,
            None => return Ok(()),
        };
        let children = self.children(element).to_vec();
        for child in children {
            self.insert_before(parent, child, Some(element))?;
        }
        self.remove(element)
    }

    /// Merge the run of text siblings around `node` into its first member.
    /// Returns the surviving unit.
    pub fn merge_adjacent_text(&mut self, node: NodeId) -> Result<NodeId, DomError> {
        if !self.is_text(node) {
            self.node(node)?;
            return Err(DomError::NotText(node));
        }
        let mut first = node;
        while let Some(prev) = self.prev_sibling(first) {
            if !self.is_text(prev) {
                break;
            }
            first = prev;
        }

        let mut merged = self.text(first).unwrap_or_default().to_string();
        let mut absorbed = Vec::new();
        let mut cursor = self.next_sibling(first);
        while let Some(next) = cursor {
            match self.text(next) {
                Some(text) => merged.push_str(text),
                None => break,
            }
            absorbed.push(next);
            cursor = self.next_sibling(next);
        }

        if !absorbed.is_empty() {
            self.set_text(first, merged)?;
            for n in absorbed {
                self.remove(n)?;
            }
        }
        Ok(first)
    }

    // -------------------------------------------------------------------------
    // Classes & attributes (not observed)
    // -------------------------------------------------------------------------

    /// Add a class. Returns false when already present.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<bool, DomError> {
        let el = self.element_mut(node)?;
        if el.classes.iter().any(|c| c == class) {
            return Ok(false);
        }
        el.classes.push(class.to_string());
        self.log(DomPatch::AddClass { node, class: class.to_string() });
        Ok(true)
    }

    /// Remove a class. Returns false when absent.
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<bool, DomError> {
        let el = self.element_mut(node)?;
        let before = el.classes.len();
        el.classes.retain(|c| c != class);
        if el.classes.len() == before {
            return Ok(false);
        }
        self.log(DomPatch::RemoveClass { node, class: class.to_string() });
        Ok(true)
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }

    pub fn classes(&self, node: NodeId) -> &[String] {
        match self.data(node) {
            Some(NodeData::Element(el)) => &el.classes,
            _ => &[],
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.element_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        self.log(DomPatch::SetAttribute {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<bool, DomError> {
        let removed = self.element_mut(node)?.attributes.remove(name).is_some();
        if removed {
            self.log(DomPatch::RemoveAttribute { node, name: name.to_string() });
        }
        Ok(removed)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.data(node) {
            Some(NodeData::Element(el)) => el.attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn exists(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(&node).map(|n| &n.data)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.data(node), Some(NodeData::Element(_)))
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.data(node), Some(NodeData::Text(_)))
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.data(node) {
            Some(NodeData::Element(el)) => Some(el.tag.as_str()),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.data(node) {
            Some(NodeData::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).last().copied()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let index = siblings.iter().position(|c| *c == node)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    /// Strict ancestors, nearest first
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(node),
        }
    }

    /// Preorder traversal of `node` and its descendants
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: if self.exists(node) { vec![node] } else { Vec::new() },
        }
    }

    /// Inclusive containment: a node contains itself
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return self.exists(node);
        }
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// Attached to the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.ancestors(node).count()
    }

    /// Lowest node containing both `a` and `b` (inclusive)
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        if !self.exists(a) || !self.exists(b) {
            return None;
        }
        let (mut a, mut b) = (a, b);
        let (mut da, mut db) = (self.depth(a), self.depth(b));
        while da > db {
            a = self.parent(a)?;
            da -= 1;
        }
        while db > da {
            b = self.parent(b)?;
            db -= 1;
        }
        while a != b {
            a = self.parent(a)?;
            b = self.parent(b)?;
        }
        Some(a)
    }

    /// Concatenated text of every text unit under `node`
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Preorder position of every node under `root`
    pub fn document_order(&self, root: NodeId) -> HashMap<NodeId, usize> {
        self.descendants(root)
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Observation & patch log
    // -------------------------------------------------------------------------

    /// Start queueing mutation records
    pub fn observe(&mut self) {
        self.observing = true;
    }

    /// Stop queueing mutation records and drop pending ones
    pub fn disconnect(&mut self) {
        self.observing = false;
        self.records.clear();
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Drain one observer batch
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn enable_patch_log(&mut self) {
        if self.patch_log.is_none() {
            self.patch_log = Some(Vec::new());
        }
    }

    pub fn take_patches(&mut self) -> Vec<DomPatch> {
        self.patch_log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Apply a patch coming from a host. Inbound patches are observed like
    /// any other edit but are not echoed into the patch log.
    pub fn apply_patch(&mut self, patch: &DomPatch) -> Result<(), DomError> {
        let log = self.patch_log.take();
        let result = self.apply_patch_inner(patch);
        self.patch_log = log;
        result
    }

    fn apply_patch_inner(&mut self, patch: &DomPatch) -> Result<(), DomError> {
        match patch {
            DomPatch::CreateElement { id, tag } => {
                self.expect_next(*id)?;
                self.create_element(tag);
            }
            DomPatch::CreateText { id, text } => {
                self.expect_next(*id)?;
                self.create_text(text.as_str());
            }
            DomPatch::InsertBefore { parent, child, before } => {
                self.insert_before(*parent, *child, *before)?
            }
            DomPatch::Remove { node } => self.remove(*node)?,
            DomPatch::SetText { node, text } => self.set_text(*node, text.as_str())?,
            DomPatch::SetAttribute { node, name, value } => {
                self.set_attribute(*node, name, value)?
            }
            DomPatch::RemoveAttribute { node, name } => {
                self.remove_attribute(*node, name)?;
            }
            DomPatch::AddClass { node, class } => {
                self.add_class(*node, class)?;
            }
            DomPatch::RemoveClass { node, class } => {
                self.remove_class(*node, class)?;
            }
            DomPatch::Release { node } => {
                self.release(*node)?;
            }
        }
        Ok(())
    }

    fn expect_next(&self, got: NodeId) -> Result<(), DomError> {
        let expected = self.next_id();
        if expected != got {
            return Err(DomError::IdMismatch { expected, got });
        }
        Ok(())
    }
}

// =============================================================================
// Iterators
// =============================================================================

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(current).iter().rev().copied());
        Some(current)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(doc: &mut Document) -> (NodeId, NodeId, NodeId) {
        let root = doc.root();
        let p = doc.append_element(root, "P").unwrap();
        let hello = doc.append_text(p, "Hello ").unwrap();
        let b = doc.append_element(p, "b").unwrap();
        doc.append_text(b, "world").unwrap();
        (p, hello, b)
    }

    #[test]
    fn test_tags_are_lowercased() {
        let mut doc = Document::new();
        let (p, _, _) = paragraph(&mut doc);
        assert_eq!(doc.tag(p), Some("p"));
        assert_eq!(doc.tag(doc.root()), Some("body"));
    }

    #[test]
    fn test_text_content_and_order() {
        let mut doc = Document::new();
        let (p, hello, b) = paragraph(&mut doc);
        assert_eq!(doc.text_content(doc.root()), "Hello world");

        let order = doc.document_order(doc.root());
        assert!(order[&p] < order[&hello]);
        assert!(order[&hello] < order[&b]);
    }

    #[test]
    fn test_split_text_inserts_after() {
        let mut doc = Document::new();
        let (p, hello, _) = paragraph(&mut doc);

        let tail = doc.split_text(hello, 2).unwrap();
        assert_eq!(doc.text(hello), Some("He"));
        assert_eq!(doc.text(tail), Some("llo "));
        assert_eq!(doc.children(p)[1], tail);
        assert_eq!(doc.text_content(p), "Hello world");
    }

    #[test]
    fn test_split_text_rejects_non_boundary() {
        let mut doc = Document::new();
        let root = doc.root();
        let t = doc.append_text(root, "café").unwrap();
        let err = doc.split_text(t, 4).unwrap_err();
        assert_eq!(err, DomError::OffsetOutOfBounds { node: t, offset: 4 });
    }

    #[test]
    fn test_replace_with_children_keeps_text() {
        let mut doc = Document::new();
        let (p, _, b) = paragraph(&mut doc);

        doc.replace_with_children(b).unwrap();
        assert!(!doc.is_connected(b));
        assert_eq!(doc.children(p).len(), 2);
        assert_eq!(doc.text_content(p), "Hello world");
    }

    #[test]
    fn test_merge_adjacent_text() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.append_text(root, "con").unwrap();
        let b = doc.append_text(root, "cat").unwrap();
        let c = doc.append_text(root, "enate").unwrap();

        let survivor = doc.merge_adjacent_text(b).unwrap();
        assert_eq!(survivor, a);
        assert_eq!(doc.text(a), Some("concatenate"));
        assert!(!doc.is_connected(c));
        assert_eq!(doc.children(root), &[a]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut doc = Document::new();
        let (p, _, b) = paragraph(&mut doc);
        let err = doc.append_child(b, p).unwrap_err();
        assert_eq!(err, DomError::HierarchyCycle { parent: b, child: p });
    }

    #[test]
    fn test_common_ancestor() {
        let mut doc = Document::new();
        let (p, hello, b) = paragraph(&mut doc);
        let world = doc.first_child(b).unwrap();
        assert_eq!(doc.common_ancestor(hello, world), Some(p));
        assert_eq!(doc.common_ancestor(world, world), Some(world));
        assert_eq!(doc.common_ancestor(b, world), Some(b));
    }

    #[test]
    fn test_records_only_while_observing() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_text(root, "before").unwrap();
        assert!(doc.take_records().is_empty());

        doc.observe();
        let t = doc.append_text(root, "after").unwrap();
        doc.set_text(t, "changed").unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], MutationRecord::added(root, t));
        assert_eq!(records[1], MutationRecord::character_data(t));
    }

    #[test]
    fn test_moving_a_node_records_removal_and_insertion() {
        let mut doc = Document::new();
        let (p, hello, b) = paragraph(&mut doc);
        doc.observe();
        doc.append_child(b, hello).unwrap();
        let records = doc.take_records();
        assert_eq!(records[0], MutationRecord::removed(p, hello));
        assert_eq!(records[1], MutationRecord::added(b, hello));
    }

    #[test]
    fn test_patch_log_replays_on_mirror() {
        let mut engine_side = Document::new();
        let mut host_side = Document::new();
        engine_side.enable_patch_log();

        let (p, hello, _) = paragraph(&mut engine_side);
        engine_side.split_text(hello, 3).unwrap();
        engine_side.add_class(p, "lead").unwrap();

        for patch in engine_side.take_patches() {
            host_side.apply_patch(&patch).unwrap();
        }
        assert_eq!(host_side.text_content(host_side.root()), "Hello world");
        assert!(host_side.has_class(p, "lead"));
        assert_eq!(host_side.children(p).len(), 3);
    }

    #[test]
    fn test_apply_patch_checks_lockstep_ids() {
        let mut doc = Document::new();
        let err = doc
            .apply_patch(&DomPatch::CreateText { id: NodeId(7), text: "x".into() })
            .unwrap_err();
        assert_eq!(err, DomError::IdMismatch { expected: NodeId(1), got: NodeId(7) });
    }

    #[test]
    fn test_release_frees_detached_subtree() {
        let mut doc = Document::new();
        let (p, hello, b) = paragraph(&mut doc);
        let world = doc.first_child(b).unwrap();
        let live = doc.len();

        assert_eq!(doc.release(b), Err(DomError::StillAttached(b)));
        assert_eq!(doc.release(doc.root()), Err(DomError::StillAttached(doc.root())));

        doc.remove(b).unwrap();
        assert_eq!(doc.release(b), Ok(2));
        assert_eq!(doc.len(), live - 2);
        assert!(!doc.exists(world));
        assert!(!doc.is_connected(b));
        assert_eq!(doc.children(p), &[hello]);
        assert_eq!(doc.set_text(world, "x"), Err(DomError::UnknownNode(world)));
    }

    #[test]
    fn test_released_ids_are_not_reused() {
        let mut doc = Document::new();
        let root = doc.root();
        let t = doc.append_text(root, "gone").unwrap();
        doc.remove(t).unwrap();
        doc.release(t).unwrap();

        let fresh = doc.create_text("new");
        assert_ne!(fresh, t);
        assert_eq!(fresh, NodeId(2));
        assert_eq!(doc.allocated(), 3);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_release_replays_on_mirror() {
        let mut engine_side = Document::new();
        let mut host_side = Document::new();
        engine_side.enable_patch_log();

        let (_, hello, _) = paragraph(&mut engine_side);
        engine_side.remove(hello).unwrap();
        engine_side.release(hello).unwrap();

        for patch in engine_side.take_patches() {
            host_side.apply_patch(&patch).unwrap();
        }
        assert!(!host_side.exists(hello));
        assert_eq!(host_side.len(), engine_side.len());
        assert_eq!(host_side.next_id(), engine_side.next_id());
    }

    #[test]
    fn test_inbound_patches_are_not_echoed() {
        let mut doc = Document::new();
        doc.enable_patch_log();
        doc.apply_patch(&DomPatch::CreateText { id: NodeId(1), text: "x".into() })
            .unwrap();
        assert!(doc.take_patches().is_empty());
    }
}
