//! Score engraving WASM module
//!
//! Element graph with exact tick arithmetic, time-signature rewriting,
//! system and page layout with courtesy signatures, undoable commands and
//! the `.mscx` file format.

pub mod errors;
pub mod models;
pub mod undo;
pub mod rewrite;
pub mod renderers;
pub mod master_score;
pub mod converters;
pub mod diagnostics;
pub mod plugin;
pub mod api;

// Re-export commonly used types
pub use errors::{EngravingError, Result};
pub use master_score::{CommandState, MasterScore};
pub use models::core::*;
pub use models::elements::*;

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(feature = "console_log")]
    {
        if console_log::init_with_level(log::Level::Debug).is_err() {
            // a logger was already installed by the host
            return;
        }
    }

    log::info!("Engraving WASM module initialized");
}
