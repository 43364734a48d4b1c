//! Configuration types and defaults for the highlighting engine

use serde::{Deserialize, Serialize};

// =============================================================================
// Throttle Parameters
// =============================================================================

/// Mutation-rate limiter for recomputation.
///
/// While fewer than `threshold` recomputes happened in the last `window_ms`,
/// every observer batch is recomputed immediately. Past that, batches are
/// coalesced into one recompute `delay_ms` later.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Rolling window length. Default: 1000 ms
    pub window_ms: f64,
    /// Recomputes per window before switching to delayed mode. Default: 10
    pub threshold: usize,
    /// Delay of the coalesced recompute. Default: 200 ms
    pub delay_ms: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000.0,
            threshold: 10,
            delay_ms: 200.0,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix for every class, attribute and highlight name. Default: "termlight-"
    pub class_prefix: String,
    /// Tag of the Element backend's marker elements. Default: "termlight-h"
    pub marker_tag: String,
    pub throttle: ThrottleConfig,
    /// Margin around the viewport inside which Paint owners count as visible. Default: 200
    pub viewport_margin_px: f64,
    /// Terms beyond this get no scroll markers. Default: 10
    pub max_marker_terms: usize,
    /// Horizontal offset per additional term sharing a container. Default: 3
    pub marker_stack_offset_px: f64,
    /// Wait for the next `tick()` before the initial highlight pass. Default: true
    pub defer_initial: bool,
    /// Wraparound restarts allowed per navigation. Default: 1
    pub max_wraps: usize,
    /// Log engine edits as DOM patches for a mirroring host. Default: false
    pub patch_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            class_prefix: "termlight-".to_string(),
            marker_tag: "termlight-h".to_string(),
            throttle: ThrottleConfig::default(),
            viewport_margin_px: 200.0,
            max_marker_terms: 10,
            marker_stack_offset_px: 3.0,
            defer_initial: true,
            max_wraps: 1,
            patch_log: false,
        }
    }
}

impl EngineConfig {
    /// Infinite-scroll pages: throttle earlier and coalesce longer
    pub fn bursty() -> Self {
        Self {
            throttle: ThrottleConfig {
                window_ms: 1000.0,
                threshold: 4,
                delay_ms: 500.0,
            },
            ..Self::default()
        }
    }

    /// Everything immediate (tests, static documents)
    pub fn eager() -> Self {
        Self {
            throttle: ThrottleConfig {
                window_ms: 1000.0,
                threshold: usize::MAX,
                delay_ms: 0.0,
            },
            defer_initial: false,
            ..Self::default()
        }
    }

    /// Class carried by everything highlighted for a term
    pub fn term_class(&self, token: &str) -> String {
        format!("{}term-{}", self.class_prefix, token)
    }

    /// Class of the currently focused match
    pub fn focus_class(&self) -> String {
        format!("{}focus", self.class_prefix)
    }

    /// Flag class on elements made focusable temporarily
    pub fn focus_revert_class(&self) -> String {
        format!("{}focus-revert", self.class_prefix)
    }

    /// Attribute carrying a Paint owner's stable id
    pub fn id_attribute(&self) -> String {
        format!("data-{}id", self.class_prefix)
    }

    /// Name of a term's native highlight
    pub fn highlight_name(&self, token: &str) -> String {
        self.term_class(token)
    }

    /// Element id of a Paint owner's capture drawable
    pub fn drawable_id(&self, owner_id: u32) -> String {
        format!("{}drawable-{}", self.class_prefix, owner_id)
    }

    /// Custom-paint hook name
    pub fn paint_name(&self) -> String {
        format!("{}highlights", self.class_prefix)
    }

    /// Class of the scroll-marker gutter
    pub fn gutter_class(&self) -> String {
        format!("{}markers", self.class_prefix)
    }
}
