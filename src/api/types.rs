//! Shared types for the WASM API

use crate::diagnostics::Diagnostics;
use crate::master_score::{CommandState, MasterScore};
use crate::renderers::ScoreLayout;

/// Snapshot of a score session returned after every call that changes it
#[derive(serde::Serialize, Clone, Debug)]
pub struct SessionInfo {
    pub handle: u32,
    pub staves: usize,
    pub measures: usize,
    pub state: CommandState,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_name: Option<String>,
    pub pages: usize,
    pub systems: usize,
}

impl SessionInfo {
    pub fn new(handle: u32, master: &MasterScore) -> Self {
        let undo = master.undo_stack();
        Self {
            handle,
            staves: master.score().nstaves(),
            measures: master.score().measures().len(),
            state: master.state(),
            can_undo: undo.can_undo(),
            can_redo: undo.can_redo(),
            undo_name: undo.undo_name().map(str::to_string),
            pages: master.layout().page_count(),
            systems: master.layout().system_count(),
        }
    }
}

/// Layout plus diagnostics, for the renderer
#[derive(serde::Serialize, Clone, Debug)]
pub struct RenderResult {
    pub layout: ScoreLayout,
    pub diagnostics: Diagnostics,
}
