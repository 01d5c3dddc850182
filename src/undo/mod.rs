//! Reversible edits and the undo history
//!
//! Every change to the score graph made inside a command is recorded as an
//! [`UndoAction`] holding enough state to replay it in both directions. A
//! [`Command`] groups the actions of one user operation; the [`UndoStack`]
//! keeps committed commands with a pointer separating undo from redo history.

pub mod edit;

pub use edit::EditContext;

use crate::errors::{EngravingError, Result};
use crate::models::{Element, ElementId, Node, Score};
use std::collections::VecDeque;

/// One primitive, reversible change to the arena
#[derive(Clone, Debug, PartialEq)]
pub enum UndoAction {
    /// A subtree was attached under `parent` at child position `index`
    AddSubtree {
        parent: ElementId,
        index: usize,
        /// Preorder snapshot, first node is the subtree root
        nodes: Vec<Node>,
    },
    /// A subtree was detached (kept for restoration)
    RemoveSubtree {
        parent: ElementId,
        index: usize,
        nodes: Vec<Node>,
    },
    /// A payload was replaced in place
    ChangeElement {
        id: ElementId,
        before: Element,
        after: Element,
    },
}

impl UndoAction {
    /// Apply the action forwards
    pub fn execute(&self, score: &mut Score) -> Result<()> {
        match self {
            UndoAction::AddSubtree { parent, index, nodes } => attach(score, *parent, *index, nodes),
            UndoAction::RemoveSubtree { nodes, .. } => detach(score, nodes),
            UndoAction::ChangeElement { id, after, .. } => change(score, *id, after),
        }
    }

    /// Apply the inverse
    pub fn undo(&self, score: &mut Score) -> Result<()> {
        match self {
            UndoAction::AddSubtree { nodes, .. } => detach(score, nodes),
            UndoAction::RemoveSubtree { parent, index, nodes } => attach(score, *parent, *index, nodes),
            UndoAction::ChangeElement { id, before, .. } => change(score, *id, before),
        }
    }
}

fn attach(score: &mut Score, parent: ElementId, index: usize, nodes: &[Node]) -> Result<()> {
    if !score.contains(parent) {
        return Err(EngravingError::InvalidReference(parent));
    }
    score.attach_subtree(nodes.to_vec(), parent, index);
    Ok(())
}

fn detach(score: &mut Score, nodes: &[Node]) -> Result<()> {
    let top = nodes.first().map(|n| n.id);
    match top {
        Some(id) => score
            .detach_subtree(id)
            .map(|_| ())
            .ok_or(EngravingError::InvalidReference(id)),
        None => Ok(()),
    }
}

fn change(score: &mut Score, id: ElementId, element: &Element) -> Result<()> {
    score
        .replace_element(id, element.clone())
        .map(|_| ())
        .ok_or(EngravingError::InvalidReference(id))
}

/// A named group of actions forming one user-visible operation
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub name: String,
    pub actions: Vec<UndoAction>,
    /// Id counter before the first action and after the last one
    ids_before: u32,
    ids_after: u32,
}

impl Command {
    pub fn new(name: impl Into<String>, score: &Score) -> Self {
        let watermark = score.id_watermark();
        Self { name: name.into(), actions: Vec::new(), ids_before: watermark, ids_after: watermark }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn record(&mut self, action: UndoAction, score: &Score) {
        self.actions.push(action);
        self.ids_after = score.id_watermark();
    }

    /// Replay forwards (redo)
    pub fn execute(&self, score: &mut Score) -> Result<()> {
        for action in &self.actions {
            action.execute(score)?;
        }
        score.restore_id_watermark(self.ids_after);
        Ok(())
    }

    /// Replay inverses in reverse order (undo, rollback)
    pub fn undo(&self, score: &mut Score) -> Result<()> {
        for action in self.actions.iter().rev() {
            action.undo(score)?;
        }
        score.restore_id_watermark(self.ids_before);
        Ok(())
    }
}

/// Bounded history of committed commands
#[derive(Clone, Debug, PartialEq)]
pub struct UndoStack {
    commands: VecDeque<Command>,
    /// Commands before this index can be undone, the rest redone
    current_index: usize,
    max_size: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoStack {
    pub fn new(max_size: usize) -> Self {
        Self { commands: VecDeque::new(), current_index: 0, max_size: max_size.max(1) }
    }

    /// Append a committed command, dropping any redo history
    pub fn push(&mut self, command: Command) {
        if command.is_empty() {
            return;
        }
        self.commands.truncate(self.current_index);
        self.commands.push_back(command);
        self.current_index = self.commands.len();

        if self.commands.len() > self.max_size {
            self.commands.pop_front();
            self.current_index = self.current_index.saturating_sub(1);
        }
    }

    pub fn undo(&mut self, score: &mut Score) -> Result<&Command> {
        if !self.can_undo() {
            return Err(EngravingError::NothingToUndo);
        }
        let command = &self.commands[self.current_index - 1];
        command.undo(score)?;
        self.current_index -= 1;
        Ok(command)
    }

    pub fn redo(&mut self, score: &mut Score) -> Result<&Command> {
        if !self.can_redo() {
            return Err(EngravingError::NothingToRedo);
        }
        let command = &self.commands[self.current_index];
        command.execute(score)?;
        self.current_index += 1;
        Ok(command)
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index < self.commands.len()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.current_index = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.current_index
    }

    pub fn redo_count(&self) -> usize {
        self.commands.len() - self.current_index
    }

    /// Name of the command the next undo would revert
    pub fn undo_name(&self) -> Option<&str> {
        self.current_index
            .checked_sub(1)
            .and_then(|i| self.commands.get(i))
            .map(|c| c.name.as_str())
    }
}
