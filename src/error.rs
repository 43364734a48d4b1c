//! Engine errors and invariant checks
//!
//! Nothing here is surfaced to the end user. Recoverable failures come back
//! as `EngineError`; structural-invariant violations are logged through
//! `invariant` and the caller degrades to "no highlight".

use crate::dom::DomError;

/// Highlighting engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid pattern for term \"{phrase}\": {source}")]
    InvalidPattern {
        phrase: String,
        #[source]
        source: regex::Error,
    },
    #[error("tag \"{0}\" is classified as both reject and flow")]
    ClassificationOverlap(String),
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Check a structural invariant. Logs and returns false instead of panicking
/// so the caller can skip the offending work.
pub fn invariant(holds: bool, what: &str) -> bool {
    if !holds {
        tracing::error!(invariant = what, "structural invariant violated");
    }
    holds
}
