//! Score diagnostics
//!
//! Consistency checks over the element graph, reported as marks the UI can
//! highlight, plus the item model used by the element inspector.

pub mod elements;
pub mod spanners;

pub use elements::{ElementsModel, ModelIndex};

use crate::models::{ElementId, Fraction, Score};
use serde::{Deserialize, Serialize};

/// How serious a mark is; errors mean the graph breaks an invariant
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// One finding, anchored at an element and a tick range
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiagnosticMark {
    pub element: ElementId,
    pub tick: Fraction,
    pub track: usize,
    pub end_tick: Option<Fraction>,
    pub severity: DiagnosticSeverity,
    /// Machine-readable check name, e.g. `spanner_inverted`
    pub kind: String,
    pub message: String,
}

impl DiagnosticMark {
    pub fn new(
        element: ElementId,
        tick: Fraction,
        track: usize,
        severity: DiagnosticSeverity,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { element, tick, track, end_tick: None, severity, kind: kind.into(), message: message.into() }
    }

    pub fn with_end(self, end_tick: Fraction) -> Self {
        Self { end_tick: Some(end_tick), ..self }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Diagnostics {
    pub marks: Vec<DiagnosticMark>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mark: DiagnosticMark) {
        self.marks.push(mark);
    }

    pub fn extend(&mut self, marks: impl IntoIterator<Item = DiagnosticMark>) {
        self.marks.extend(marks);
    }

    pub fn has_errors(&self) -> bool {
        self.marks.iter().any(|m| m.severity == DiagnosticSeverity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Marks attached to `element`
    pub fn for_element(&self, element: ElementId) -> impl Iterator<Item = &DiagnosticMark> + '_ {
        self.marks.iter().filter(move |m| m.element == element)
    }
}

/// Run every check over `score`
pub fn analyze_score(score: &Score) -> Diagnostics {
    let mut diags = Diagnostics::new();
    diags.extend(spanners::analyze_spanners(score));
    if !diags.is_empty() {
        log::debug!("diagnostics: {} mark(s)", diags.marks.len());
    }
    diags
}
