//! Mutation records and DOM patches
//!
//! `MutationRecord` is what an observer sees after the fact (one record per
//! structural edit, targeted at the node whose child list or text changed).
//! `DomPatch` is the replayable form of the same edit, used to mirror the
//! tree between the engine and a JS host.

use serde::{Deserialize, Serialize};

use super::NodeId;

// =============================================================================
// Mutation Records
// =============================================================================

/// What changed on a record's target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationKind {
    /// Children were inserted into and/or removed from the target
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    /// The target text unit's content changed
    CharacterData,
}

/// A single observed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn added(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList {
                added: vec![node],
                removed: Vec::new(),
            },
        }
    }

    pub fn removed(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![node],
            },
        }
    }

    pub fn character_data(target: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::CharacterData,
        }
    }
}

// =============================================================================
// Patches
// =============================================================================

/// Replayable tree edit.
///
/// Creation patches carry the id the document allocates for the new node. Both
/// sides allocate ids in lockstep, so an inbound creation patch must name the
/// next free id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DomPatch {
    CreateElement { id: NodeId, tag: String },
    CreateText { id: NodeId, text: String },
    InsertBefore {
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    },
    Remove { node: NodeId },
    SetText { node: NodeId, text: String },
    SetAttribute {
        node: NodeId,
        name: String,
        value: String,
    },
    RemoveAttribute { node: NodeId, name: String },
    AddClass { node: NodeId, class: String },
    RemoveClass { node: NodeId, class: String },
    /// Free a detached subtree; its ids are retired
    Release { node: NodeId },
}

impl DomPatch {
    /// Node the patch edits (or creates)
    pub fn subject(&self) -> NodeId {
        match self {
            DomPatch::CreateElement { id, .. } | DomPatch::CreateText { id, .. } => *id,
            DomPatch::InsertBefore { child, .. } => *child,
            DomPatch::Remove { node }
            | DomPatch::SetText { node, .. }
            | DomPatch::SetAttribute { node, .. }
            | DomPatch::RemoveAttribute { node, .. }
            | DomPatch::AddClass { node, .. }
            | DomPatch::RemoveClass { node, .. }
            | DomPatch::Release { node } => *node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_serializes_with_op_tag() {
        let patch = DomPatch::SetText {
            node: NodeId(4),
            text: "cat".to_string(),
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert!(json.contains("\"op\":\"setText\""), "got {}", json);

        let back: DomPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, patch);
        assert_eq!(back.subject(), NodeId(4));
    }

    #[test]
    fn test_record_constructors() {
        let rec = MutationRecord::added(NodeId(1), NodeId(2));
        match rec.kind {
            MutationKind::ChildList { added, removed } => {
                assert_eq!(added, vec![NodeId(2)]);
                assert!(removed.is_empty());
            }
            _ => panic!("expected child list record"),
        }
    }
}
