//! Helpers shared by the WASM exports
//!
//! Prefixed console output, JS value conversion that logs its failures, and
//! argument checks for the score constructors.

use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// ============================================================================
// Console
// ============================================================================

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    fn info(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    fn warn(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    fn error(s: &str);
}

// no console outside the browser: native tests go through the log facade
#[cfg(not(target_arch = "wasm32"))]
fn log(s: &str) {
    log::debug!("{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
fn info(s: &str) {
    log::info!("{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
fn warn(s: &str) {
    log::warn!("{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
fn error(s: &str) {
    log::error!("{}", s);
}

#[macro_export]
macro_rules! wasm_log {
    ($($arg:tt)*) => {
        $crate::api::helpers::console_debug(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! wasm_info {
    ($($arg:tt)*) => {
        $crate::api::helpers::console_info(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! wasm_warn {
    ($($arg:tt)*) => {
        $crate::api::helpers::console_warn(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! wasm_error {
    ($($arg:tt)*) => {
        $crate::api::helpers::console_error(&format!($($arg)*))
    };
}

pub fn console_debug(msg: &str) {
    log(&format!("[engraving] {}", msg));
}

pub fn console_info(msg: &str) {
    info(&format!("[engraving] {}", msg));
}

pub fn console_warn(msg: &str) {
    warn(&format!("[engraving] ⚠️ {}", msg));
}

pub fn console_error(msg: &str) {
    error(&format!("[engraving] ❌ {}", msg));
}

// ============================================================================
// JS values
// ============================================================================

/// Read a plain JS object into `T`; `context` prefixes the error
pub fn deserialize<T: DeserializeOwned>(value: JsValue, context: &str) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| js_error(format!("{}: {}", context, e)))
}

pub fn serialize<T: Serialize>(value: &T, context: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| js_error(format!("{}: {}", context, e)))
}

/// Log `msg` as an error and hand it back as a JS string
pub fn js_error(msg: impl Into<String>) -> JsValue {
    let msg = msg.into();
    console_error(&msg);
    JsValue::from_str(&msg)
}

// ============================================================================
// Argument checks
// ============================================================================

/// A new score needs at least one staff and one measure
pub fn validate_score_shape(nstaves: usize, measures: usize) -> Result<(), String> {
    if nstaves == 0 || measures == 0 {
        return Err(format!(
            "a score needs at least one staff and one measure (got {} staves, {} measures)",
            nstaves, measures
        ));
    }
    Ok(())
}

/// Time signature of a new score: positive numerator, power-of-two denominator
pub fn validate_meter(numerator: u32, denominator: u32) -> Result<(), String> {
    if numerator == 0 || denominator == 0 || !denominator.is_power_of_two() {
        return Err(format!("{}/{} is not a usable time signature", numerator, denominator));
    }
    Ok(())
}
