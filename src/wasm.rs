//! WASM bindings for the highlight engine
//!
//! The JS host mirrors its tree into the engine with `applyPatches`, then
//! drives the engine from its own observer and animation callbacks. Engine
//! offsets are UTF-8 byte offsets; everything crossing this boundary is
//! converted to UTF-16 code units.

use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::dom::{Document, DomPatch, NodeId};
use crate::error::EngineError;
use crate::highlight::backend::{Capabilities, HighlightRange, RenderUpdate, VisibilityChange};
use crate::highlight::classify::{ClassificationDefinition, HighlightTagClassification};
use crate::highlight::config::EngineConfig;
use crate::highlight::engine::Highlighter;
use crate::highlight::navigator::NavCommand;
use crate::highlight::terms::{Term, TermDefinition, TermToken};
use crate::layout::{LayoutProvider, Rect};

// =============================================================================
// Helpers
// =============================================================================

fn parse<T: DeserializeOwned>(value: JsValue, what: &str) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse {}: {}", what, e)))
}

/// Like `parse`, but `undefined`/`null` fall back to the default
fn parse_or_default<T: DeserializeOwned + Default>(value: JsValue, what: &str) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    parse(value, what)
}

fn to_js<T: serde::Serialize + ?Sized>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or_else(|e| {
        web_sys::console::error_1(&JsValue::from_str(&format!("termlight: serialization failed: {}", e)));
        JsValue::NULL
    })
}

fn engine_error(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// UTF-8 byte offset inside a text unit -> UTF-16 code units
fn utf16_offset(doc: &Document, node: NodeId, offset: usize) -> usize {
    doc.text(node)
        .and_then(|t| t.get(..offset))
        .map_or(offset, |prefix| prefix.encode_utf16().count())
}

fn ranges_to_utf16(doc: &Document, ranges: Vec<HighlightRange>) -> Vec<HighlightRange> {
    ranges
        .into_iter()
        .map(|r| HighlightRange {
            node: r.node,
            start: utf16_offset(doc, r.node, r.start),
            end: utf16_offset(doc, r.node, r.end),
        })
        .collect()
}

// =============================================================================
// JsLayout
// =============================================================================

/// LayoutProvider backed by host callbacks:
/// `textRects(node, start, end)`, `elementRect(node)`, `viewport()`,
/// `scrollHeight()`
pub struct JsLayout {
    text_rects: js_sys::Function,
    element_rect: js_sys::Function,
    viewport: js_sys::Function,
    scroll_height: js_sys::Function,
}

impl JsLayout {
    pub fn from_object(callbacks: &JsValue) -> Result<Self, JsValue> {
        let get = |name: &str| -> Result<js_sys::Function, JsValue> {
            js_sys::Reflect::get(callbacks, &JsValue::from_str(name))?
                .dyn_into::<js_sys::Function>()
                .map_err(|_| JsValue::from_str(&format!("layout callback `{}` is not a function", name)))
        };
        Ok(Self {
            text_rects: get("textRects")?,
            element_rect: get("elementRect")?,
            viewport: get("viewport")?,
            scroll_height: get("scrollHeight")?,
        })
    }

    fn report(what: &str, err: &JsValue) {
        web_sys::console::warn_2(&JsValue::from_str(&format!("termlight: {} callback failed", what)), err);
    }
}

impl LayoutProvider for JsLayout {
    fn text_rects(&self, doc: &Document, node: NodeId, start: usize, end: usize) -> Vec<Rect> {
        let result = self.text_rects.call3(
            &JsValue::NULL,
            &JsValue::from(node.0),
            &JsValue::from(utf16_offset(doc, node, start) as u32),
            &JsValue::from(utf16_offset(doc, node, end) as u32),
        );
        match result {
            Ok(value) => serde_wasm_bindgen::from_value(value).unwrap_or_default(),
            Err(err) => {
                Self::report("textRects", &err);
                Vec::new()
            }
        }
    }

    fn element_rect(&self, _doc: &Document, node: NodeId) -> Option<Rect> {
        match self.element_rect.call1(&JsValue::NULL, &JsValue::from(node.0)) {
            Ok(value) => serde_wasm_bindgen::from_value(value).ok().flatten(),
            Err(err) => {
                Self::report("elementRect", &err);
                None
            }
        }
    }

    fn viewport(&self) -> Rect {
        match self.viewport.call0(&JsValue::NULL) {
            Ok(value) => serde_wasm_bindgen::from_value(value).unwrap_or_default(),
            Err(err) => {
                Self::report("viewport", &err);
                Rect::default()
            }
        }
    }

    fn scroll_height(&self, _doc: &Document) -> f64 {
        match self.scroll_height.call0(&JsValue::NULL) {
            Ok(value) => value.as_f64().unwrap_or(0.0),
            Err(err) => {
                Self::report("scrollHeight", &err);
                0.0
            }
        }
    }
}

// =============================================================================
// HighlightEngine
// =============================================================================

#[wasm_bindgen]
pub struct HighlightEngine {
    inner: Highlighter<JsLayout>,
}

#[wasm_bindgen]
impl HighlightEngine {
    /// `capabilities`, `config` and `classification` may be `undefined`
    #[wasm_bindgen(constructor)]
    pub fn js_new(
        capabilities: JsValue,
        config: JsValue,
        layout: JsValue,
        classification: JsValue,
    ) -> Result<HighlightEngine, JsValue> {
        let capabilities: Capabilities = parse_or_default(capabilities, "capabilities")?;
        let mut config: EngineConfig = parse_or_default(config, "config")?;
        // the host replays engine edits on its real tree
        config.patch_log = true;
        let definition: Option<ClassificationDefinition> = if classification.is_undefined() || classification.is_null() {
            None
        } else {
            Some(parse(classification, "classification")?)
        };
        let classes = match definition {
            Some(def) => HighlightTagClassification::from_definition(&def).map_err(engine_error)?,
            None => HighlightTagClassification::default(),
        };
        let layout = JsLayout::from_object(&layout)?;
        let inner = Highlighter::new(Document::new(), layout, config, classes, capabilities)
            .map_err(engine_error)?;
        Ok(Self { inner })
    }

    /// Selected backend as `{ kind, mode? }`
    #[wasm_bindgen(js_name = "backendKind")]
    pub fn js_backend_kind(&self) -> JsValue {
        to_js(&self.inner.backend_kind())
    }

    /// Mirror host edits into the engine's document
    #[wasm_bindgen(js_name = "applyPatches")]
    pub fn js_apply_patches(&mut self, patches: JsValue) -> Result<(), JsValue> {
        let patches: Vec<DomPatch> = parse(patches, "patches")?;
        let doc = self.inner.document_mut();
        for patch in &patches {
            doc.apply_patch(patch)
                .map_err(|e| JsValue::from_str(&format!("Failed to apply patch: {}", e)))?;
        }
        Ok(())
    }

    /// Returns the compiled term tokens, in list order
    #[wasm_bindgen(js_name = "startHighlighting")]
    pub fn js_start_highlighting(
        &mut self,
        terms: JsValue,
        terms_to_highlight: JsValue,
        terms_to_purge: JsValue,
    ) -> Result<JsValue, JsValue> {
        let definitions: Vec<TermDefinition> = parse(terms, "terms")?;
        let to_highlight: Vec<TermToken> = parse_or_default(terms_to_highlight, "terms to highlight")?;
        let to_purge: Vec<TermToken> = parse_or_default(terms_to_purge, "terms to purge")?;

        let terms = definitions
            .iter()
            .map(Term::from_definition)
            .collect::<Result<Vec<_>, _>>()
            .map_err(engine_error)?;
        let tokens: Vec<TermToken> = terms.iter().map(|t| t.token().clone()).collect();
        self.inner
            .start_highlighting(terms, &to_highlight, &to_purge)
            .map_err(engine_error)?;
        Ok(to_js(&tokens))
    }

    #[wasm_bindgen(js_name = "tick")]
    pub fn js_tick(&mut self, now_ms: f64) -> Result<bool, JsValue> {
        self.inner.tick(now_ms).map_err(engine_error)
    }

    /// Call once per host observer callback, after `applyPatches`
    #[wasm_bindgen(js_name = "processMutations")]
    pub fn js_process_mutations(&mut self, now_ms: f64) {
        self.inner.process_mutations(now_ms);
    }

    /// `terms` undefined undoes everything
    #[wasm_bindgen(js_name = "undoHighlights")]
    pub fn js_undo_highlights(&mut self, terms: JsValue) -> Result<(), JsValue> {
        let tokens: Option<Vec<TermToken>> = if terms.is_undefined() || terms.is_null() {
            None
        } else {
            Some(parse(terms, "terms")?)
        };
        self.inner
            .undo_highlights(tokens.as_deref())
            .map_err(engine_error)
    }

    #[wasm_bindgen(js_name = "endHighlighting")]
    pub fn js_end_highlighting(&mut self) -> Result<(), JsValue> {
        self.inner.end_highlighting().map_err(engine_error)
    }

    /// `{ direction, mode, term? }`; returns the outcome or null
    #[wasm_bindgen(js_name = "focusNextTerm")]
    pub fn js_focus_next_term(&mut self, command: JsValue) -> Result<JsValue, JsValue> {
        let command: NavCommand = parse(command, "navigation command")?;
        let outcome = self
            .inner
            .focus_next_term(command.direction, command.mode, command.term.as_ref());
        Ok(match outcome {
            Some(mut outcome) => {
                let doc = self.inner.document();
                let end = utf16_offset(doc, outcome.node, outcome.end);
                outcome.start = utf16_offset(doc, outcome.node, outcome.start);
                outcome.end = end;
                to_js(&outcome)
            }
            None => JsValue::NULL,
        })
    }

    #[wasm_bindgen(js_name = "termOccurrenceCount")]
    pub fn js_term_occurrence_count(&self, token: &str, exists_only: bool) -> u32 {
        self.inner
            .term_occurrence_count(&TermToken(token.to_string()), exists_only) as u32
    }

    #[wasm_bindgen(js_name = "insertScrollMarkers")]
    pub fn js_insert_scroll_markers(&mut self, terms: JsValue, hues: JsValue) -> Result<JsValue, JsValue> {
        let terms: Vec<TermToken> = parse(terms, "terms")?;
        let hues: Vec<u16> = parse(hues, "hues")?;
        let markers = self.inner.insert_scroll_markers(&terms, &hues);
        Ok(to_js(&markers))
    }

    #[wasm_bindgen(js_name = "setHues")]
    pub fn js_set_hues(&mut self, hues: JsValue) -> Result<(), JsValue> {
        let hues: Vec<u16> = parse(hues, "hues")?;
        self.inner.set_hues(hues);
        Ok(())
    }

    #[wasm_bindgen(js_name = "styleFragments")]
    pub fn js_style_fragments(&self) -> JsValue {
        to_js(&self.inner.style_fragments())
    }

    // -------------------------------------------------------------------------
    // Viewport
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = "onScroll")]
    pub fn js_on_scroll(&mut self) {
        self.inner.on_scroll();
    }

    #[wasm_bindgen(js_name = "onResize")]
    pub fn js_on_resize(&mut self) {
        self.inner.on_resize();
    }

    /// `[{ node, visible }]` from the host's intersection observer
    #[wasm_bindgen(js_name = "onVisibility")]
    pub fn js_on_visibility(&mut self, changes: JsValue) -> Result<(), JsValue> {
        let changes: Vec<VisibilityChange> = parse(changes, "visibility changes")?;
        self.inner.on_visibility(&changes);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Host output
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = "takeRenderUpdates")]
    pub fn js_take_render_updates(&mut self) -> JsValue {
        let updates: Vec<RenderUpdate> = self
            .inner
            .take_render_updates()
            .into_iter()
            .map(|update| match update {
                RenderUpdate::HighlightRanges { token, ranges } => RenderUpdate::HighlightRanges {
                    token,
                    ranges: ranges_to_utf16(self.inner.document(), ranges),
                },
                other => other,
            })
            .collect();
        to_js(&updates)
    }

    /// Engine edits for the host to replay (Element backend, focus changes).
    /// A `release` patch means the host may drop its handle for that id.
    #[wasm_bindgen(js_name = "takeDomPatches")]
    pub fn js_take_dom_patches(&mut self) -> JsValue {
        to_js(&self.inner.document_mut().take_patches())
    }

    #[wasm_bindgen(js_name = "takeEvents")]
    pub fn js_take_events(&mut self) -> JsValue {
        to_js(&self.inner.take_events())
    }

    #[wasm_bindgen(js_name = "stats")]
    pub fn js_stats(&self) -> JsValue {
        to_js(self.inner.stats())
    }
}
