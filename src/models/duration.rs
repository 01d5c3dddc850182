//! Notated durations
//!
//! A [`TDuration`] is what gets printed (a note value plus augmentation dots);
//! its [`Fraction`] is the exact length it occupies outside of a tuplet.

use super::fraction::Fraction;
use serde::{Deserialize, Serialize};

/// Note value without dots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationType {
    /// Whole-measure rest; its length is the measure's actual length
    Measure,
    Breve,
    Whole,
    Half,
    Quarter,
    Eighth,
    #[serde(rename = "16th")]
    D16,
    #[serde(rename = "32nd")]
    D32,
    #[serde(rename = "64th")]
    D64,
    #[serde(rename = "128th")]
    D128,
}

impl DurationType {
    /// Note values from longest to shortest, excluding `Measure`
    pub const NOTE_VALUES: [DurationType; 9] = [
        DurationType::Breve,
        DurationType::Whole,
        DurationType::Half,
        DurationType::Quarter,
        DurationType::Eighth,
        DurationType::D16,
        DurationType::D32,
        DurationType::D64,
        DurationType::D128,
    ];

    /// Undotted length; `None` for `Measure`, whose length depends on context
    pub fn fraction(&self) -> Option<Fraction> {
        let f = match self {
            DurationType::Measure => return None,
            DurationType::Breve => Fraction::new(2, 1),
            DurationType::Whole => Fraction::new(1, 1),
            DurationType::Half => Fraction::new(1, 2),
            DurationType::Quarter => Fraction::new(1, 4),
            DurationType::Eighth => Fraction::new(1, 8),
            DurationType::D16 => Fraction::new(1, 16),
            DurationType::D32 => Fraction::new(1, 32),
            DurationType::D64 => Fraction::new(1, 64),
            DurationType::D128 => Fraction::new(1, 128),
        };
        Some(f)
    }

    /// Name used in the score file (`quarter`, `16th`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            DurationType::Measure => "measure",
            DurationType::Breve => "breve",
            DurationType::Whole => "whole",
            DurationType::Half => "half",
            DurationType::Quarter => "quarter",
            DurationType::Eighth => "eighth",
            DurationType::D16 => "16th",
            DurationType::D32 => "32nd",
            DurationType::D64 => "64th",
            DurationType::D128 => "128th",
        }
    }

    pub fn from_name(name: &str) -> Option<DurationType> {
        let t = match name {
            "measure" => DurationType::Measure,
            "breve" => DurationType::Breve,
            "whole" => DurationType::Whole,
            "half" => DurationType::Half,
            "quarter" => DurationType::Quarter,
            "eighth" => DurationType::Eighth,
            "16th" => DurationType::D16,
            "32nd" => DurationType::D32,
            "64th" => DurationType::D64,
            "128th" => DurationType::D128,
            _ => return None,
        };
        Some(t)
    }
}

/// Printed duration: note value and number of augmentation dots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TDuration {
    pub duration_type: DurationType,
    pub dots: u8,
}

impl TDuration {
    pub const MAX_DOTS: u8 = 3;

    pub fn new(duration_type: DurationType, dots: u8) -> Self {
        Self { duration_type, dots: dots.min(Self::MAX_DOTS) }
    }

    pub fn measure() -> Self {
        Self::new(DurationType::Measure, 0)
    }

    pub fn is_measure(&self) -> bool {
        self.duration_type == DurationType::Measure
    }

    /// Exact length; each dot adds half of the previous increment
    pub fn fraction(&self) -> Option<Fraction> {
        let base = self.duration_type.fraction()?;
        let mut total = base;
        let mut add = base;
        for _ in 0..self.dots {
            add = add / 2;
            total += add;
        }
        Some(total)
    }

    /// The single notated duration with exactly this length, if one exists
    pub fn from_fraction(len: Fraction, max_dots: u8) -> Option<TDuration> {
        for t in DurationType::NOTE_VALUES {
            for dots in 0..=max_dots.min(Self::MAX_DOTS) {
                let d = TDuration::new(t, dots);
                if d.fraction() == Some(len) {
                    return Some(d);
                }
            }
        }
        None
    }
}

/// Split a length into notated durations, longest first.
///
/// Each step takes the longest value (with up to `max_dots` dots) that still
/// fits in the remainder. Returns `None` when the length cannot be written
/// with plain note values down to the 128th, e.g. a third of a quarter.
pub fn to_duration_list(len: Fraction, max_dots: u8) -> Option<Vec<TDuration>> {
    if len.is_negative() {
        return None;
    }
    let mut result = Vec::new();
    let mut remaining = len;
    while !remaining.is_zero() {
        let next = DurationType::NOTE_VALUES.iter().find_map(|t| {
            (0..=max_dots.min(TDuration::MAX_DOTS))
                .rev()
                .map(|dots| TDuration::new(*t, dots))
                .find(|d| d.fraction().map_or(false, |f| f <= remaining))
        })?;
        remaining -= next.fraction()?;
        result.push(next);
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_fractions() {
        assert_eq!(TDuration::new(DurationType::Half, 1).fraction(), Some(Fraction::new(3, 4)));
        assert_eq!(TDuration::new(DurationType::Quarter, 2).fraction(), Some(Fraction::new(7, 16)));
        assert_eq!(TDuration::measure().fraction(), None);
    }

    #[test]
    fn test_duration_list_dotted_half() {
        let list = to_duration_list(Fraction::new(3, 4), 1).unwrap();
        assert_eq!(list, vec![TDuration::new(DurationType::Half, 1)]);
    }

    #[test]
    fn test_duration_list_split_remainder() {
        let list = to_duration_list(Fraction::new(5, 8), 1).unwrap();
        assert_eq!(
            list,
            vec![
                TDuration::new(DurationType::Half, 0),
                TDuration::new(DurationType::Eighth, 0),
            ]
        );
    }

    #[test]
    fn test_duration_list_rejects_tuplet_lengths() {
        assert!(to_duration_list(Fraction::new(1, 12), 1).is_none());
    }

    #[test]
    fn test_from_fraction() {
        assert_eq!(
            TDuration::from_fraction(Fraction::new(3, 8), 1),
            Some(TDuration::new(DurationType::Quarter, 1))
        );
        assert_eq!(TDuration::from_fraction(Fraction::new(5, 8), 1), None);
    }

    #[test]
    fn test_names_round_trip() {
        for t in DurationType::NOTE_VALUES {
            assert_eq!(DurationType::from_name(t.name()), Some(t));
        }
        assert_eq!(DurationType::from_name("measure"), Some(DurationType::Measure));
    }
}
