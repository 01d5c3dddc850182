//! WASM API for score sessions
//!
//! Every open score lives in a registry keyed by a numeric handle handed to
//! JavaScript. Sessions are independent: each owns its own command state and
//! undo history.

use super::dispatch::{ActionDispatcher, ScoreDispatcher, ACTIONS};
use super::helpers::{deserialize, js_error, serialize, validate_meter, validate_score_shape};
use super::types::{RenderResult, SessionInfo};
use crate::diagnostics::{analyze_score, ElementsModel};
use crate::master_score::MasterScore;
use crate::models::ScoreBuilder;
use crate::renderers::LayoutConfig;
use crate::{wasm_error, wasm_info, wasm_log, wasm_warn};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use wasm_bindgen::prelude::*;

struct Session {
    dispatcher: ScoreDispatcher,
    elements: ElementsModel,
}

lazy_static! {
    static ref SESSIONS: Mutex<HashMap<u32, Session>> = Mutex::new(HashMap::new());
    static ref NEXT_HANDLE: Mutex<u32> = Mutex::new(1);
}

/// Register a session and return its handle
pub fn open_session(master: MasterScore) -> u32 {
    let mut next = NEXT_HANDLE.lock().unwrap_or_else(|e| e.into_inner());
    let handle = *next;
    *next += 1;
    let session = Session { dispatcher: ScoreDispatcher::new(master), elements: ElementsModel::new() };
    SESSIONS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(handle, session);
    handle
}

pub fn close_session(handle: u32) -> bool {
    SESSIONS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&handle)
        .is_some()
}

fn with_session<T>(handle: u32, f: impl FnOnce(&mut Session) -> Result<T, String>) -> Result<T, String> {
    let mut sessions = SESSIONS.lock().unwrap_or_else(|e| e.into_inner());
    let session = sessions
        .get_mut(&handle)
        .ok_or_else(|| format!("No score session {}", handle))?;
    f(session)
}

/// Run a named action against a session (native entry point of `dispatch`)
pub fn dispatch_action(handle: u32, action: &str, params: serde_json::Value) -> Result<serde_json::Value, String> {
    with_session(handle, |s| s.dispatcher.dispatch(action, params).map_err(|e| e.to_string()))
}

pub fn session_info(handle: u32) -> Result<SessionInfo, String> {
    with_session(handle, |s| Ok(SessionInfo::new(handle, s.dispatcher.master())))
}

pub fn session_mscx(handle: u32) -> Result<String, String> {
    with_session(handle, |s| s.dispatcher.master().to_mscx().map_err(|e| e.to_string()))
}

/// Layout and diagnostics; only between commands
pub fn session_render(handle: u32) -> Result<RenderResult, String> {
    with_session(handle, |s| {
        let master = s.dispatcher.master();
        master.ensure_idle("render").map_err(|e| e.to_string())?;
        Ok(RenderResult { layout: master.layout().clone(), diagnostics: analyze_score(master.score()) })
    })
}

/// Reload the tree model and return its summary and root rows
pub fn session_tree(handle: u32, use_tree_parent: bool) -> Result<serde_json::Value, String> {
    with_session(handle, |s| {
        let master = s.dispatcher.master();
        master.ensure_idle("inspect elements").map_err(|e| e.to_string())?;
        let score = master.score();
        s.elements.set_is_use_tree_parent(score, use_tree_parent);
        s.elements.load(score);
        let rows: Vec<serde_json::Value> = (0..s.elements.row_count(None))
            .filter_map(|row| s.elements.index(row, 0, None))
            .filter_map(|index| s.elements.data(index).cloned())
            .collect();
        Ok(serde_json::json!({ "summary": s.elements.summary(), "rows": rows }))
    })
}

// ============================================================================
// Exports
// ============================================================================

/// Create a score of `nstaves` staves and `measures` empty measures
#[wasm_bindgen(js_name = newScore)]
pub fn new_score(nstaves: usize, measures: usize, numerator: u32, denominator: u32) -> Result<u32, JsValue> {
    wasm_info!("newScore called: {} staves, {} x {}/{}", nstaves, measures, numerator, denominator);
    validate_score_shape(nstaves, measures).map_err(js_error)?;
    validate_meter(numerator, denominator).map_err(js_error)?;
    let score = ScoreBuilder::new(nstaves).measures(measures, numerator, denominator).build();
    Ok(open_session(MasterScore::new(score)))
}

/// Open a score from `.mscx` text, optionally with a layout config (JSON object)
#[wasm_bindgen(js_name = loadScore)]
pub fn load_score(xml: &str, config: JsValue) -> Result<u32, JsValue> {
    wasm_info!("loadScore called: {} bytes", xml.len());
    let mut master = MasterScore::from_mscx(xml).map_err(|e| {
        wasm_error!("loadScore failed: {}", e);
        JsValue::from_str(&e.to_string())
    })?;
    if !config.is_undefined() && !config.is_null() {
        let config: LayoutConfig = deserialize(config, "Layout config deserialization error")?;
        master.set_layout_config(config);
    }
    Ok(open_session(master))
}

#[wasm_bindgen(js_name = saveScore)]
pub fn save_score(handle: u32) -> Result<String, JsValue> {
    session_mscx(handle).map_err(js_error)
}

#[wasm_bindgen(js_name = closeScore)]
pub fn close_score(handle: u32) -> bool {
    wasm_info!("closeScore called: {}", handle);
    let closed = close_session(handle);
    if !closed {
        wasm_warn!("closeScore: no session {}", handle);
    }
    closed
}

/// Run a named action; `params` is a plain JS object
#[wasm_bindgen(js_name = dispatch)]
pub fn dispatch(handle: u32, action: &str, params: JsValue) -> Result<JsValue, JsValue> {
    wasm_info!("dispatch called: {} on {}", action, handle);
    let params: serde_json::Value = if params.is_undefined() || params.is_null() {
        serde_json::Value::Null
    } else {
        deserialize(params, "Action parameters deserialization error")?
    };
    wasm_log!("dispatch params: {}", params);
    let result = dispatch_action(handle, action, params).map_err(|e| {
        wasm_error!("{} failed: {}", action, e);
        JsValue::from_str(&e)
    })?;
    serialize(&result, "Action result serialization error")
}

/// Names accepted by `dispatch`
#[wasm_bindgen(js_name = listActions)]
pub fn list_actions() -> js_sys::Array {
    let names = js_sys::Array::new();
    for action in ACTIONS {
        names.push(&JsValue::from_str(action));
    }
    names
}

#[wasm_bindgen(js_name = getSessionInfo)]
pub fn get_session_info(handle: u32) -> Result<JsValue, JsValue> {
    let info = session_info(handle).map_err(js_error)?;
    serialize(&info, "Session info serialization error")
}

/// Current layout together with diagnostics marks
#[wasm_bindgen(js_name = getRenderData)]
pub fn get_render_data(handle: u32) -> Result<JsValue, JsValue> {
    let result = session_render(handle).map_err(js_error)?;
    serialize(&result, "Render data serialization error")
}

/// Element inspector rows
#[wasm_bindgen(js_name = getElementsTree)]
pub fn get_elements_tree(handle: u32, use_tree_parent: bool) -> Result<JsValue, JsValue> {
    let result = session_tree(handle, use_tree_parent).map_err(js_error)?;
    serialize(&result, "Elements tree serialization error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open() -> u32 {
        let score = ScoreBuilder::new(2).measures(4, 4, 4).build();
        open_session(MasterScore::new(score))
    }

    #[test]
    fn test_sessions_are_independent() {
        let a = open();
        let b = open();
        assert_ne!(a, b);
        dispatch_action(a, "toggle-layout-break", json!({ "measure": 0, "kind": "page" })).unwrap();
        assert!(session_info(a).unwrap().can_undo);
        assert!(!session_info(b).unwrap().can_undo);
        assert_eq!(session_info(a).unwrap().pages, 2);
        assert!(close_session(a));
        assert!(close_session(b));
    }

    #[test]
    fn test_unknown_session() {
        assert!(dispatch_action(u32::MAX, "undo", json!({})).is_err());
        assert!(!close_session(u32::MAX));
    }

    #[test]
    fn test_save_after_edit() {
        let h = open();
        let before = session_mscx(h).unwrap();
        dispatch_action(h, "add-time-signature", json!({ "measure": 2, "sig": "2/4" })).unwrap();
        assert_ne!(session_mscx(h).unwrap(), before);
        dispatch_action(h, "undo", json!({})).unwrap();
        assert_eq!(session_mscx(h).unwrap(), before);
        close_session(h);
    }
}
