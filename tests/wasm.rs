//! Browser-side smoke tests for the JS bindings
//!
//! Run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use termlight::{version, HighlightEngine};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn json(text: &str) -> JsValue {
    js_sys::JSON::parse(text).unwrap()
}

fn layout_callbacks() -> JsValue {
    let callbacks = js_sys::Object::new();
    let set = |name: &str, f: js_sys::Function| {
        js_sys::Reflect::set(&callbacks, &JsValue::from_str(name), &f).unwrap();
    };
    set("textRects", js_sys::Function::new_with_args("node, start, end", "return [];"));
    set("elementRect", js_sys::Function::new_with_args("node", "return null;"));
    set(
        "viewport",
        js_sys::Function::new_no_args("return { x: 0, y: 0, width: 800, height: 600 };"),
    );
    set("scrollHeight", js_sys::Function::new_no_args("return 600;"));
    callbacks.into()
}

#[wasm_bindgen_test]
fn test_version_names_the_crate() {
    assert!(version().starts_with("termlight v"));
}

#[wasm_bindgen_test]
fn test_layout_object_must_provide_callbacks() {
    let result = HighlightEngine::js_new(
        JsValue::UNDEFINED,
        JsValue::UNDEFINED,
        js_sys::Object::new().into(),
        JsValue::UNDEFINED,
    );
    assert!(result.is_err());
}

#[wasm_bindgen_test]
fn test_mirrored_tree_is_highlighted() {
    let mut engine = HighlightEngine::js_new(
        JsValue::UNDEFINED,
        JsValue::UNDEFINED,
        layout_callbacks(),
        JsValue::UNDEFINED,
    )
    .unwrap();

    engine
        .js_apply_patches(json(
            r#"[
                { "op": "createElement", "id": 1, "tag": "p" },
                { "op": "createText", "id": 2, "text": "a cat" },
                { "op": "insertBefore", "parent": 1, "child": 2, "before": null },
                { "op": "insertBefore", "parent": 0, "child": 1, "before": null }
            ]"#,
        ))
        .unwrap();

    let tokens = engine
        .js_start_highlighting(json(r#"[{ "phrase": "cat" }]"#), JsValue::UNDEFINED, JsValue::UNDEFINED)
        .unwrap();
    let tokens: Vec<String> = serde_wasm_bindgen::from_value(tokens).unwrap();
    assert_eq!(tokens.len(), 1);

    // the first pass waits for the host's frame callback
    assert_eq!(engine.js_term_occurrence_count(&tokens[0], false), 0);
    assert!(engine.js_tick(0.0).unwrap());
    assert_eq!(engine.js_term_occurrence_count(&tokens[0], false), 1);

    let patches = js_sys::Array::from(&engine.js_take_dom_patches());
    assert!(patches.length() > 0);
}
