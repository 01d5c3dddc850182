//! Editable score session
//!
//! `MasterScore` owns one score graph, its undo history and its current
//! layout. Every mutation runs inside a command: either one opened with
//! [`MasterScore::start_cmd`] or an implicit one wrapped around a single call.
//! Layout-generated nodes are discarded before a command starts and before
//! history replay, and rebuilt afterwards, so recorded child positions always
//! refer to authored content only.

use crate::converters::mscx::{self, MscxError};
use crate::errors::{EngravingError, Result};
use crate::models::{ElementId, LayoutBreakKind, Score, TimeSig};
use crate::renderers::{LayoutConfig, LayoutEngine, LayoutRegion, ScoreLayout};
use crate::rewrite::{self, RewriteOutcome};
use crate::undo::{Command, EditContext, UndoStack};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    Idle,
    Open,
    /// A failure rolled the open command back; `end_cmd` reports it
    Discarded,
}

pub struct MasterScore {
    score: Score,
    undo: UndoStack,
    open: Option<Command>,
    state: CommandState,
    engine: LayoutEngine,
    layout: ScoreLayout,
}

impl MasterScore {
    pub fn new(score: Score) -> Self {
        Self::with_config(score, LayoutConfig::default(), UndoStack::default())
    }

    pub fn with_config(score: Score, config: LayoutConfig, undo: UndoStack) -> Self {
        let mut master = Self {
            score,
            undo,
            open: None,
            state: CommandState::Idle,
            engine: LayoutEngine::new(config),
            layout: ScoreLayout::default(),
        };
        master.relayout();
        master
    }

    pub fn from_mscx(xml: &str) -> std::result::Result<Self, MscxError> {
        mscx::read_score(xml).map(Self::new)
    }

    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, MscxError> {
        mscx::load_file(path).map(Self::new)
    }

    /// Canonical `.mscx` text; refused while a command is open
    pub fn to_mscx(&self) -> Result<String> {
        self.ensure_idle("save")?;
        Ok(mscx::write_score(&self.score))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_idle("save")?;
        mscx::save_file(&self.score, path)?;
        Ok(())
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn layout(&self) -> &ScoreLayout {
        &self.layout
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.engine.config
    }

    pub fn set_layout_config(&mut self, config: LayoutConfig) {
        self.engine = LayoutEngine::new(config);
        self.relayout();
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn relayout(&mut self) {
        self.relayout_region(LayoutRegion::Whole);
    }

    /// Recompute layout, respacing only measures inside `region`
    pub fn relayout_region(&mut self, region: LayoutRegion) {
        self.layout = self.engine.layout(&mut self.score, region);
    }

    // ------------------------------------------------------------------
    // Command lifecycle
    // ------------------------------------------------------------------

    pub fn start_cmd(&mut self, name: &str) -> Result<()> {
        if self.state != CommandState::Idle {
            return Err(EngravingError::InvalidCommandState(format!(
                "cannot start '{}' while a command is {:?}",
                name, self.state
            )));
        }
        self.score.clear_generated();
        self.open = Some(Command::new(name, &self.score));
        self.state = CommandState::Open;
        log::info!("start command '{}'", name);
        Ok(())
    }

    /// Commit the open command; `Ok(false)` when it had been discarded
    pub fn end_cmd(&mut self) -> Result<bool> {
        match self.state {
            CommandState::Idle => Err(EngravingError::InvalidCommandState("no command is open".to_string())),
            CommandState::Discarded => {
                self.state = CommandState::Idle;
                self.open = None;
                log::info!("end command: discarded");
                Ok(false)
            }
            CommandState::Open => {
                self.state = CommandState::Idle;
                if let Some(command) = self.open.take() {
                    log::info!("end command '{}' ({} sub-edit(s))", command.name, command.len());
                    self.undo.push(command);
                }
                self.relayout();
                Ok(true)
            }
        }
    }

    /// Revert every sub-edit of the open command and mark it discarded
    pub fn rollback(&mut self) -> Result<()> {
        if self.state != CommandState::Open {
            return Err(EngravingError::InvalidCommandState("no command to roll back".to_string()));
        }
        self.state = CommandState::Discarded;
        let reverted = match self.open.take() {
            Some(command) => {
                log::warn!("rolling back '{}' ({} sub-edit(s))", command.name, command.len());
                command.undo(&mut self.score)
            }
            None => Ok(()),
        };
        self.relayout();
        reverted
    }

    /// Run `f` inside the open command, or inside an implicit one named `name`
    pub fn edit<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut EditContext<'_>) -> Result<T>,
    {
        let implicit = match self.state {
            CommandState::Open => false,
            CommandState::Idle => {
                self.start_cmd(name)?;
                true
            }
            CommandState::Discarded => {
                return Err(EngravingError::InvalidCommandState(
                    "the open command was discarded; end it first".to_string(),
                ))
            }
        };

        let result = match self.open.as_mut() {
            Some(command) => f(&mut EditContext::new(&mut self.score, command)),
            None => Err(EngravingError::InvalidCommandState("no command is open".to_string())),
        };

        match result {
            Ok(value) => {
                if implicit {
                    self.end_cmd()?;
                }
                Ok(value)
            }
            Err(e) => {
                log::warn!("'{}' failed: {}", name, e);
                self.rollback()?;
                if implicit {
                    self.end_cmd()?;
                }
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Undo up to `n` commands; returns how many were reverted
    pub fn undo(&mut self, n: usize) -> Result<usize> {
        self.ensure_idle("undo")?;
        if n > 0 && !self.undo.can_undo() {
            return Err(EngravingError::NothingToUndo);
        }
        self.score.clear_generated();
        let mut count = 0;
        let mut outcome = Ok(());
        while count < n && self.undo.can_undo() {
            match self.undo.undo(&mut self.score) {
                Ok(command) => log::info!("undo '{}'", command.name),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
            count += 1;
        }
        self.relayout();
        outcome.map(|_| count)
    }

    /// Redo up to `n` commands; returns how many were replayed
    pub fn redo(&mut self, n: usize) -> Result<usize> {
        self.ensure_idle("redo")?;
        if n > 0 && !self.undo.can_redo() {
            return Err(EngravingError::NothingToRedo);
        }
        self.score.clear_generated();
        let mut count = 0;
        let mut outcome = Ok(());
        while count < n && self.undo.can_redo() {
            match self.undo.redo(&mut self.score) {
                Ok(command) => log::info!("redo '{}'", command.name),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
            count += 1;
        }
        self.relayout();
        outcome.map(|_| count)
    }

    /// Saving, history replay and score traversal need a closed command
    pub fn ensure_idle(&self, what: &str) -> Result<()> {
        if self.state == CommandState::Idle {
            Ok(())
        } else {
            Err(EngravingError::InvalidCommandState(format!("cannot {} while a command is open", what)))
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    pub fn add_time_sig(&mut self, measure: ElementId, staff_idx: usize, timesig: TimeSig, local: bool) -> Result<RewriteOutcome> {
        self.edit("Add time signature", |ctx| rewrite::add_time_sig(ctx, measure, staff_idx, timesig, local))
    }

    pub fn remove_time_sig(&mut self, measure: ElementId) -> Result<RewriteOutcome> {
        self.edit("Remove time signature", |ctx| rewrite::remove_time_sig(ctx, measure))
    }

    pub fn toggle_layout_break(&mut self, measure_base: ElementId, kind: LayoutBreakKind) -> Result<bool> {
        self.edit("Toggle layout break", |ctx| rewrite::toggle_layout_break(ctx, measure_base, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn four_four(measures: usize) -> MasterScore {
        MasterScore::new(
            ScoreBuilder::new(1)
                .measures(measures, 4, 4)
                .voice(0, 0, &[Event::note(60, DurationType::Half), Event::note(62, DurationType::Half)])
                .build(),
        )
    }

    #[test]
    fn test_implicit_command_commits() {
        let mut master = four_four(2);
        let m = master.score().first_measure().unwrap();
        assert!(master.toggle_layout_break(m, LayoutBreakKind::Line).unwrap());
        assert_eq!(master.state(), CommandState::Idle);
        assert_eq!(master.undo_stack().undo_count(), 1);
        assert_eq!(master.undo_stack().undo_name(), Some("Toggle layout break"));
    }

    #[test]
    fn test_explicit_command_groups_edits() {
        let mut master = four_four(3);
        let measures = master.score().measures();
        master.start_cmd("two breaks").unwrap();
        master.toggle_layout_break(measures[0], LayoutBreakKind::Line).unwrap();
        master.toggle_layout_break(measures[1], LayoutBreakKind::Line).unwrap();
        assert!(master.end_cmd().unwrap());
        assert_eq!(master.undo_stack().undo_count(), 1);
        assert_eq!(master.layout().system_count(), 3);
    }

    #[test]
    fn test_start_while_open_is_refused() {
        let mut master = four_four(1);
        master.start_cmd("a").unwrap();
        assert!(matches!(master.start_cmd("b"), Err(EngravingError::InvalidCommandState(_))));
        assert!(matches!(master.undo(1), Err(EngravingError::InvalidCommandState(_))));
    }

    #[test]
    fn test_end_without_start_is_refused() {
        let mut master = four_four(1);
        assert!(matches!(master.end_cmd(), Err(EngravingError::InvalidCommandState(_))));
    }

    #[test]
    fn test_failure_discards_open_command() {
        let mut master = four_four(2);
        let before = master.score().clone();
        let measures = master.score().measures();
        master.start_cmd("break then bad edit").unwrap();
        master.toggle_layout_break(measures[0], LayoutBreakKind::Line).unwrap();
        let root = master.score().root();
        let err = master.toggle_layout_break(root, LayoutBreakKind::Line);
        assert!(matches!(err, Err(EngravingError::InvalidReference(_))));
        assert_eq!(master.state(), CommandState::Discarded);
        assert_eq!(master.score(), &before);
        assert!(!master.end_cmd().unwrap());
        assert_eq!(master.state(), CommandState::Idle);
        assert_eq!(master.undo_stack().undo_count(), 0);
    }

    #[test]
    fn test_implicit_failure_returns_to_idle() {
        let mut master = four_four(1);
        let before = master.score().clone();
        let m = master.score().first_measure().unwrap();
        assert!(master.remove_time_sig(m).is_err());
        assert_eq!(master.state(), CommandState::Idle);
        assert_eq!(master.score(), &before);
    }

    #[test]
    fn test_undo_redo_restore_graph() {
        let mut master = four_four(4);
        let original = master.score().clone();
        let second = master.score().measures()[1];
        master.add_time_sig(second, 0, TimeSig::normal(3, 4).unwrap(), false).unwrap();
        let edited = master.score().clone();
        assert_ne!(edited, original);

        assert_eq!(master.undo(1).unwrap(), 1);
        assert_eq!(master.score(), &original);
        assert_eq!(master.redo(1).unwrap(), 1);
        assert_eq!(master.score(), &edited);
    }

    #[test]
    fn test_undo_empty_history() {
        let mut master = four_four(1);
        assert_eq!(master.undo(1), Err(EngravingError::NothingToUndo));
        assert_eq!(master.redo(1), Err(EngravingError::NothingToRedo));
        assert_eq!(master.undo(0), Ok(0));
    }

    #[test]
    fn test_undo_many_stops_at_start() {
        let mut master = four_four(2);
        let m = master.score().first_measure().unwrap();
        master.toggle_layout_break(m, LayoutBreakKind::Line).unwrap();
        master.toggle_layout_break(m, LayoutBreakKind::Page).unwrap();
        assert_eq!(master.undo(5).unwrap(), 2);
        assert!(!master.undo_stack().can_undo());
    }

    #[test]
    fn test_mscx_round_trip_through_session() {
        let master = four_four(2);
        let xml = master.to_mscx().unwrap();
        let reloaded = MasterScore::from_mscx(&xml).unwrap();
        assert_eq!(reloaded.to_mscx().unwrap(), xml);
    }

    #[test]
    fn test_save_refused_inside_command() {
        let mut master = four_four(2);
        let m = master.score().first_measure().unwrap();
        master.start_cmd("Break").unwrap();
        master.toggle_layout_break(m, LayoutBreakKind::Line).unwrap();
        assert!(matches!(master.to_mscx(), Err(EngravingError::InvalidCommandState(_))));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open.mscx");
        assert!(master.save(&path).is_err());
        assert!(!path.exists());
        assert!(master.end_cmd().unwrap());
        assert!(master.to_mscx().unwrap().contains("LayoutBreak"));
    }
}
