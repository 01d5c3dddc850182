//! Renderers module for the engraving core
//!
//! Layout of the score graph into systems and pages, including the
//! courtesy signatures that depend on system breaks.

pub mod courtesy;
pub mod layout;
pub mod layout_engine;

// Re-export commonly used types
pub use layout::{PageLayout, PlacedItem, ScoreLayout, SystemLayout};
pub use layout_engine::{LayoutConfig, LayoutEngine, LayoutRegion};
