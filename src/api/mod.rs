//! Engraving WASM API
//!
//! JavaScript-facing surface of the engine.
//!
//! # Module Structure
//!
//! - `helpers`: console logging, JS value conversion and validation
//! - `dispatch`: named actions with JSON parameters over one score session
//! - `types`: result structures returned to JavaScript
//! - `core`: the session registry and the `#[wasm_bindgen]` exports

pub mod helpers;
pub mod types;
pub mod dispatch;
pub mod core;

pub use core::*;
pub use dispatch::{ActionDispatcher, DispatchError, ScoreDispatcher, ACTIONS};
