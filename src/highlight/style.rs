//! Style fragments for the host stylesheet
//!
//! One fragment per term, shaped for the active backend, plus a shared
//! fragment for focus and gutter styling. Terms past the first hue cycle get
//! a dashed outline so they stay distinguishable from earlier terms sharing
//! the hue.

use serde::{Deserialize, Serialize};

use super::backend::BackendKind;
use super::config::EngineConfig;
use super::terms::Term;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFragment {
    /// `None` for the shared fragment
    pub term_index: Option<usize>,
    pub hue: Option<u16>,
    pub css: String,
}

fn highlight_color(hue: u16) -> String {
    format!("hsl({} 100% 60% / 0.4)", hue)
}

fn term_css(kind: BackendKind, config: &EngineConfig, term: &Term, hue: u16) -> String {
    let class = config.term_class(term.token().as_str());
    let color = highlight_color(hue);
    let decoration = if term.cycle() > 0 {
        format!(" outline: 1px dashed hsl({} 100% 35%);", hue)
    } else {
        String::new()
    };
    match kind {
        BackendKind::Element => format!(
            "{}.{} {{ background-color: {} !important; border-radius: 2px;{} }}",
            config.marker_tag, class, color, decoration
        ),
        BackendKind::Paint(_) => format!(
            ":root {{ --{}-hue: {}; --{}-cycle: {}; }}",
            class,
            hue,
            class,
            term.cycle()
        ),
        BackendKind::RangeHighlight => {
            let underline = if term.cycle() > 0 {
                " text-decoration: underline dashed;"
            } else {
                ""
            };
            format!(
                "::highlight({}) {{ background-color: {};{} }}",
                config.highlight_name(term.token().as_str()),
                color,
                underline
            )
        }
    }
}

fn shared_css(config: &EngineConfig) -> String {
    format!(
        ".{focus} {{ outline: 2px solid currentColor !important; outline-offset: 1px; }}\n\
         .{revert}:focus {{ outline: none; }}\n\
         .{gutter} {{ position: fixed; top: 0; right: 0; width: 12px; height: 100%; pointer-events: none; z-index: 2147483647; }}\n\
         .{gutter} > div {{ position: absolute; width: 8px; height: 3px; background-color: hsl(var(--{prefix}hue) 100% 45%); }}",
        focus = config.focus_class(),
        revert = config.focus_revert_class(),
        gutter = config.gutter_class(),
        prefix = config.class_prefix,
    )
}

/// Fragments for every term in list order, followed by the shared one
pub fn style_fragments(kind: BackendKind, config: &EngineConfig, terms: &[Term], hues: &[u16]) -> Vec<StyleFragment> {
    let mut fragments: Vec<StyleFragment> = terms
        .iter()
        .enumerate()
        .map(|(index, term)| {
            let hue = hues.get(term.hue()).copied().unwrap_or(0);
            StyleFragment {
                term_index: Some(index),
                hue: Some(hue),
                css: term_css(kind, config, term, hue),
            }
        })
        .collect();
    fragments.push(StyleFragment {
        term_index: None,
        hue: None,
        css: shared_css(config),
    });
    fragments
}
