//! Termlight: incremental search-term highlighting engine
//!
//! A Rust/WASM engine that keeps search terms highlighted inside a live,
//! mutating text tree, with the least possible work per mutation.
//!
//! # Architecture
//!
//! ## Tree
//! - `dom` - Document: id-keyed text tree with mutation records and DOM patches
//! - `layout` - LayoutProvider: host geometry, plus the deterministic GridLayout
//!
//! ## Highlighting
//! - `highlight::flow` - FlowScanner: segmentation into flows of text units
//! - `highlight::matcher` - TermMatcher: match ranges mapped onto units
//! - `highlight::cache` - TreeCache: identity-keyed flows and backend metadata
//! - `highlight::mutation` - MutationTracker: scope classification + rate limiter
//! - `highlight::backend` - RangeHighlight, Paint and Element renderers
//! - `highlight::navigator` - Navigator: jump/step focus between matches
//! - `highlight::markers` - ScrollMarkerIndex: proportional gutter markers
//! - `highlight::engine` - Highlighter: the facade tying it together
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { HighlightEngine } from 'termlight';
//!
//! await init();
//!
//! const engine = new HighlightEngine(
//!   { highlightApi: 'highlights' in CSS },
//!   {},
//!   { textRects, elementRect, viewport, scrollHeight },
//! );
//!
//! // Mirror the page into the engine, then start
//! engine.applyPatches(initialPatches);
//! engine.startHighlighting([{ phrase: 'cat', mode: { whole: true } }], [], []);
//! engine.tick(performance.now());
//!
//! // Every render callback
//! for (const update of engine.takeRenderUpdates()) render(update);
//! ```

pub mod dom;
pub mod error;
pub mod highlight;
pub mod layout;
pub mod wasm;

// Public exports
pub use dom::{Document, DomPatch, MutationRecord, NodeId};
pub use error::EngineError;
pub use highlight::*;
pub use layout::{GridLayout, LayoutProvider, Rect};
pub use wasm::HighlightEngine;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("termlight v{}", env!("CARGO_PKG_VERSION"))
}
