//! Highlight engine
//!
//! Term matching over flows of text, incremental recomputation driven by
//! tree mutations, and three rendering backends behind one interface.

pub mod backend;
pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod flow;
pub mod markers;
pub mod matcher;
pub mod mutation;
pub mod navigator;
pub mod style;
pub mod terms;

#[cfg(test)]
mod tests;

pub use backend::{BackendKind, Capabilities, PaintMode, RenderBackend, RenderUpdate, VisibilityChange};
pub use cache::TreeCache;
pub use classify::{ClassificationDefinition, HighlightTagClassification, TagKind};
pub use config::{EngineConfig, ThrottleConfig};
pub use engine::{EngineEvent, Highlighter, RecomputeStats, DEFAULT_HUES};
pub use flow::{Flow, FlowScanner, FlowUnit};
pub use markers::ScrollMarker;
pub use matcher::{MatchBox, TermMatcher};
pub use navigator::{Direction, NavMode, NavOutcome, ScrollBehavior};
pub use style::StyleFragment;
pub use terms::{MatchMode, Term, TermDefinition, TermToken};
