//! Layout: geometry source for painting and scroll markers
//!
//! The engine never measures text itself. A `LayoutProvider` answers the
//! three questions the Paint backend and the scroll-marker gutter ask:
//! where a text range is, where an element is, and what the viewport is.
//!
//! `GridLayout` is a deterministic monospace layout for hosts without a
//! measurement API (and for tests): block elements start new lines, every
//! character occupies one cell.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::dom::{Document, NodeId};

// =============================================================================
// Rect
// =============================================================================

/// Axis-aligned rectangle in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Grow on every side by `margin`
    pub fn expand(&self, margin: f64) -> Rect {
        Rect {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + margin * 2.0,
            height: self.height + margin * 2.0,
        }
    }
}

// =============================================================================
// LayoutProvider
// =============================================================================

/// Host-supplied measurement
pub trait LayoutProvider {
    /// Client rects of a byte range inside a text unit, in document coordinates
    fn text_rects(&self, doc: &Document, node: NodeId, start: usize, end: usize) -> Vec<Rect>;

    /// Border box of an element in document coordinates. `None` when not rendered.
    fn element_rect(&self, doc: &Document, node: NodeId) -> Option<Rect>;

    /// Visible part of the document
    fn viewport(&self) -> Rect;

    /// Total scrollable height of the document
    fn scroll_height(&self, doc: &Document) -> f64;
}

// =============================================================================
// GridLayout
// =============================================================================

const DEFAULT_INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "big", "cite", "code", "data", "del", "dfn", "em", "font", "i", "ins",
    "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time",
    "u", "var", "wbr",
];

/// Where a text unit starts on the grid
#[derive(Debug, Clone, Copy)]
struct Placement {
    line: usize,
    column: usize,
}

/// Deterministic monospace layout
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub cell_width: f64,
    pub line_height: f64,
    /// Wrap lines after this many columns
    pub wrap_columns: Option<usize>,
    viewport: Rect,
    inline_tags: HashSet<String>,
    hidden: HashSet<NodeId>,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self::new(8.0, 16.0, Rect::new(0.0, 0.0, 800.0, 600.0))
    }
}

impl GridLayout {
    pub fn new(cell_width: f64, line_height: f64, viewport: Rect) -> Self {
        Self {
            cell_width,
            line_height,
            wrap_columns: None,
            viewport,
            inline_tags: DEFAULT_INLINE_TAGS.iter().map(|t| t.to_string()).collect(),
            hidden: HashSet::new(),
        }
    }

    /// Treat an additional tag as inline (e.g. a highlight marker tag)
    pub fn with_inline_tag(mut self, tag: &str) -> Self {
        self.inline_tags.insert(tag.to_ascii_lowercase());
        self
    }

    pub fn with_wrap(mut self, columns: usize) -> Self {
        self.wrap_columns = Some(columns.max(1));
        self
    }

    /// Hide an element subtree (`display: none`)
    pub fn hide(&mut self, node: NodeId) {
        self.hidden.insert(node);
    }

    pub fn show(&mut self, node: NodeId) {
        self.hidden.remove(&node);
    }

    /// Scroll the viewport to a vertical offset
    pub fn scroll_to(&mut self, y: f64) {
        self.viewport.y = y.max(0.0);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    fn is_inline(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node)
            .map(|t| self.inline_tags.contains(t))
            .unwrap_or(true)
    }

    /// Walk the document once, placing every visible text unit.
    /// Returns placements plus the number of lines used.
    fn place(&self, doc: &Document) -> (HashMap<NodeId, Placement>, usize) {
        let mut placements = HashMap::new();
        let mut line = 0usize;
        let mut column = 0usize;
        self.place_node(doc, doc.root(), &mut placements, &mut line, &mut column);
        let lines = if column > 0 { line + 1 } else { line };
        (placements, lines)
    }

    fn place_node(
        &self,
        doc: &Document,
        node: NodeId,
        placements: &mut HashMap<NodeId, Placement>,
        line: &mut usize,
        column: &mut usize,
    ) {
        if self.hidden.contains(&node) {
            return;
        }
        if let Some(text) = doc.text(node) {
            placements.insert(node, Placement { line: *line, column: *column });
            let (l, c) = self.advance(*line, *column, text.chars().count());
            *line = l;
            *column = c;
            return;
        }

        let block = !self.is_inline(doc, node);
        if block && *column > 0 {
            *line += 1;
            *column = 0;
        }
        for &child in doc.children(node) {
            self.place_node(doc, child, placements, line, column);
        }
        if block && *column > 0 {
            *line += 1;
            *column = 0;
        }
    }

    fn advance(&self, line: usize, column: usize, chars: usize) -> (usize, usize) {
        match self.wrap_columns {
            Some(width) => {
                let linear = column + chars;
                (line + linear / width, linear % width)
            }
            None => (line, column + chars),
        }
    }

    fn rects_for(&self, start: Placement, first_char: usize, count: usize) -> Vec<Rect> {
        let mut rects: Vec<Rect> = Vec::new();
        let mut current: Option<(usize, usize, usize)> = None; // (line, col, len)
        for i in first_char..first_char + count {
            let (line, col) = self.advance(start.line, start.column, i);
            current = match current {
                Some((l, c, len)) if l == line && c + len == col => Some((l, c, len + 1)),
                Some(run) => {
                    rects.push(self.run_rect(run));
                    Some((line, col, 1))
                }
                None => Some((line, col, 1)),
            };
        }
        if let Some(run) = current {
            rects.push(self.run_rect(run));
        }
        rects
    }

    fn run_rect(&self, (line, column, len): (usize, usize, usize)) -> Rect {
        Rect::new(
            column as f64 * self.cell_width,
            line as f64 * self.line_height,
            len as f64 * self.cell_width,
            self.line_height,
        )
    }
}

impl LayoutProvider for GridLayout {
    fn text_rects(&self, doc: &Document, node: NodeId, start: usize, end: usize) -> Vec<Rect> {
        let text = match doc.text(node) {
            Some(t) => t,
            None => return Vec::new(),
        };
        if start >= end
            || end > text.len()
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            return Vec::new();
        }
        let (placements, _) = self.place(doc);
        let placement = match placements.get(&node) {
            Some(p) => *p,
            None => return Vec::new(),
        };
        let first_char = text[..start].chars().count();
        let count = text[start..end].chars().count();
        self.rects_for(placement, first_char, count)
    }

    fn element_rect(&self, doc: &Document, node: NodeId) -> Option<Rect> {
        let hidden = std::iter::once(node)
            .chain(doc.ancestors(node))
            .any(|n| self.hidden.contains(&n));
        if hidden || !doc.is_connected(node) {
            return None;
        }
        let (placements, _) = self.place(doc);
        doc.descendants(node)
            .filter_map(|n| {
                let text = doc.text(n)?;
                let placement = placements.get(&n)?;
                let rects = self.rects_for(*placement, 0, text.chars().count());
                rects.into_iter().reduce(|a, b| a.union(&b))
            })
            .reduce(|a, b| a.union(&b))
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Height of the laid-out document, never less than the viewport
    fn scroll_height(&self, doc: &Document) -> f64 {
        let (_, lines) = self.place(doc);
        (lines as f64 * self.line_height).max(self.viewport.height)
    }
}

// =============================================================================
// Tests
// =============================================================================
