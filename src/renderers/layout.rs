//! Layout results
//!
//! Output of [`super::layout_engine::LayoutEngine`]: pages made of systems,
//! systems made of measures and frames. Positions are in staff spaces.

use crate::models::ElementId;
use serde::Serialize;

/// Complete layout of a score
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ScoreLayout {
    pub pages: Vec<PageLayout>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct PageLayout {
    pub systems: Vec<SystemLayout>,
}

/// One line of music, or a vertical/text frame occupying its own slot
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct SystemLayout {
    pub y: f64,
    pub height: f64,
    pub width: f64,
    /// Stand-alone frame instead of a row of measures
    pub is_frame: bool,
    /// Measures were stretched to the full width
    pub justified: bool,
    pub items: Vec<PlacedItem>,
}

/// A measure or horizontal frame inside a system
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PlacedItem {
    pub id: ElementId,
    pub x: f64,
    pub width: f64,
}

impl ScoreLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn systems(&self) -> impl Iterator<Item = &SystemLayout> {
        self.pages.iter().flat_map(|p| p.systems.iter())
    }

    pub fn system_count(&self) -> usize {
        self.systems().count()
    }

    /// (page, system within page) holding `id`
    pub fn locate(&self, id: ElementId) -> Option<(usize, usize)> {
        self.pages.iter().enumerate().find_map(|(p, page)| {
            page.systems
                .iter()
                .position(|s| s.items.iter().any(|i| i.id == id))
                .map(|s| (p, s))
        })
    }

    /// Whether `id` is the last item of its system
    pub fn ends_system(&self, id: ElementId) -> bool {
        self.systems().any(|s| !s.is_frame && s.items.last().map(|i| i.id) == Some(id))
    }
}
