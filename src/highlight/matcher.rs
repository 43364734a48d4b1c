//! TermMatcher: term patterns over flow text
//!
//! Each term's pattern runs over the flow's concatenated text. Every match is
//! then mapped back onto the text units it overlaps, producing one
//! `MatchBox` per unit touched, clipped to that unit's bounds.
//!
//! Terms are processed in term-list order, not match-position order.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::flow::{Flow, FlowUnit};
use super::terms::{Term, TermToken};
use crate::dom::NodeId;

// =============================================================================
// Types
// =============================================================================

/// One matched sub-range of a term inside a single text unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchBox {
    pub token: TermToken,
    pub node: NodeId,
    /// Byte offsets inside the unit's text
    pub start: usize,
    pub end: usize,
    /// First box of its match; occurrences are counted by heads
    pub head: bool,
}

// =============================================================================
// TermMatcher
// =============================================================================

/// Runs an ordered term list over flows
pub struct TermMatcher<'t> {
    terms: &'t [Term],
}

impl<'t> TermMatcher<'t> {
    pub fn new(terms: &'t [Term]) -> Self {
        Self { terms }
    }

    /// Replace `flow.boxes` with fresh matches of every term
    pub fn match_flow(&self, flow: &mut Flow) {
        flow.boxes.clear();
        for term in self.terms {
            let boxes = match_term(flow, term);
            flow.boxes.extend(boxes);
        }
    }

    pub fn match_flows(&self, flows: &mut [Flow]) {
        for flow in flows {
            self.match_flow(flow);
        }
    }
}

/// Boxes for one term in one flow
pub fn match_term(flow: &Flow, term: &Term) -> Vec<MatchBox> {
    let mut boxes = Vec::new();
    let mut first_unit = 0;
    for range in term.find_ranges(&flow.text) {
        // Matches arrive in text order, so the unit cursor only moves forward
        while first_unit < flow.units.len() && flow.units[first_unit].end <= range.start {
            first_unit += 1;
        }
        map_range(&flow.units[first_unit..], &range, term.token(), &mut boxes);
    }
    boxes
}

/// Clip a flow-text range to every unit it overlaps
pub fn map_range(units: &[FlowUnit], range: &Range<usize>, token: &TermToken, out: &mut Vec<MatchBox>) {
    let mut head = true;
    for unit in units {
        if unit.start >= range.end {
            break;
        }
        let start = range.start.max(unit.start) - unit.start;
        let end = range.end.min(unit.end).saturating_sub(unit.start);
        if end > start {
            out.push(MatchBox {
                token: token.clone(),
                node: unit.node,
                start,
                end,
                head,
            });
            head = false;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
