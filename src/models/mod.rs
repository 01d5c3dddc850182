//! Score data model
//!
//! Exact time arithmetic, the closed set of element payloads and the arena
//! graph that owns them.

pub mod builder;
pub mod core;
pub mod duration;
pub mod elements;
pub mod fraction;
pub mod timesig;

// Re-export commonly used types
pub use self::core::{DepthFirst, ElementId, Node, Score};
pub use builder::{Event, ScoreBuilder};
pub use duration::{to_duration_list, DurationType, TDuration};
pub use elements::*;
pub use fraction::{Fraction, FractionError, DIVISION};
pub use timesig::{TimeSig, TimeSigError, TimeSigType, TimeSigValue};
