//! Time signatures

use super::fraction::Fraction;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSigError {
    #[error("time signature {0} has a zero component")]
    Zero(TimeSigValue),

    #[error("time signature {0}: the denominator must be a power of two")]
    Denominator(TimeSigValue),

    #[error("display type {ts_type:?} cannot show {value}")]
    TypeMismatch { value: TimeSigValue, ts_type: TimeSigType },

    #[error("invalid time signature literal: '{0}'")]
    InvalidLiteral(String),
}

/// Signature as written: 6/8 and 3/4 are different signatures of equal length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSigValue {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSigValue {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// Length of one bar in whole notes
    pub fn duration(&self) -> Fraction {
        Fraction::new(self.numerator as i64, self.denominator.max(1) as i64)
    }

    /// Same written numbers, not merely the same length
    pub fn identical(&self, other: &TimeSigValue) -> bool {
        self.numerator == other.numerator && self.denominator == other.denominator
    }

    /// Both parts nonzero and a denominator that names a note value
    pub fn validate(&self) -> Result<(), TimeSigError> {
        if self.numerator == 0 || self.denominator == 0 {
            return Err(TimeSigError::Zero(*self));
        }
        if !self.denominator.is_power_of_two() {
            return Err(TimeSigError::Denominator(*self));
        }
        Ok(())
    }

    pub fn parse(s: &str) -> Result<Self, TimeSigError> {
        let invalid = || TimeSigError::InvalidLiteral(s.to_string());
        let (n, d) = s.trim().split_once('/').ok_or_else(invalid)?;
        let value = TimeSigValue::new(
            n.trim().parse().map_err(|_| invalid())?,
            d.trim().parse().map_err(|_| invalid())?,
        );
        value.validate()?;
        Ok(value)
    }
}

impl Default for TimeSigValue {
    fn default() -> Self {
        TimeSigValue::new(4, 4)
    }
}

impl fmt::Display for TimeSigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// How the signature is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSigType {
    #[default]
    Normal,
    /// Common time glyph, only for 4/4
    FourFour,
    /// Cut time glyph, only for 2/2
    AllaBreve,
}

impl TimeSigType {
    pub fn name(&self) -> &'static str {
        match self {
            TimeSigType::Normal => "normal",
            TimeSigType::FourFour => "four-four",
            TimeSigType::AllaBreve => "alla-breve",
        }
    }

    pub fn from_name(name: &str) -> Option<TimeSigType> {
        match name {
            "normal" => Some(TimeSigType::Normal),
            "four-four" | "common" => Some(TimeSigType::FourFour),
            "alla-breve" | "cut" => Some(TimeSigType::AllaBreve),
            _ => None,
        }
    }

    fn accepts(&self, value: &TimeSigValue) -> bool {
        match self {
            TimeSigType::Normal => true,
            TimeSigType::FourFour => value.identical(&TimeSigValue::new(4, 4)),
            TimeSigType::AllaBreve => value.identical(&TimeSigValue::new(2, 2)),
        }
    }
}

/// Time-signature element payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSig {
    pub track: usize,
    pub sig: TimeSigValue,
    pub ts_type: TimeSigType,
    /// Applies to this staff only
    #[serde(default)]
    pub local: bool,
    /// Measure length divided by the signature length (local signatures)
    #[serde(default = "unit_stretch")]
    pub stretch: Fraction,
    /// Announce copy placed by layout at the end of a system
    #[serde(default)]
    pub courtesy: bool,
}

fn unit_stretch() -> Fraction {
    Fraction::from_integer(1)
}

impl TimeSig {
    pub fn new(sig: TimeSigValue, ts_type: TimeSigType) -> Result<Self, TimeSigError> {
        sig.validate()?;
        if !ts_type.accepts(&sig) {
            return Err(TimeSigError::TypeMismatch { value: sig, ts_type });
        }
        Ok(Self {
            track: 0,
            sig,
            ts_type,
            local: false,
            stretch: unit_stretch(),
            courtesy: false,
        })
    }

    pub fn normal(numerator: u32, denominator: u32) -> Result<Self, TimeSigError> {
        Self::new(TimeSigValue::new(numerator, denominator), TimeSigType::Normal)
    }

    pub fn with_track(mut self, track: usize) -> Self {
        self.track = track;
        self
    }

    /// Same value and same glyph
    pub fn same_as(&self, other: &TimeSig) -> bool {
        self.sig.identical(&other.sig) && self.ts_type == other.ts_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alla_breve_requires_two_two() {
        assert!(TimeSig::new(TimeSigValue::new(2, 2), TimeSigType::AllaBreve).is_ok());
        let err = TimeSig::new(TimeSigValue::new(4, 4), TimeSigType::AllaBreve).unwrap_err();
        assert!(matches!(err, TimeSigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_four_four_requires_four_four() {
        assert!(TimeSig::new(TimeSigValue::new(4, 4), TimeSigType::FourFour).is_ok());
        assert!(TimeSig::new(TimeSigValue::new(2, 2), TimeSigType::FourFour).is_err());
    }

    #[test]
    fn test_equal_length_not_identical() {
        let six_eight = TimeSigValue::new(6, 8);
        let three_four = TimeSigValue::new(3, 4);
        assert_eq!(six_eight.duration(), three_four.duration());
        assert!(!six_eight.identical(&three_four));
    }

    #[test]
    fn test_parse() {
        assert_eq!(TimeSigValue::parse("9/8").unwrap(), TimeSigValue::new(9, 8));
        assert!(matches!(TimeSigValue::parse("0/4"), Err(TimeSigError::Zero(_))));
        assert!(TimeSigValue::parse("nine").is_err());
    }

    #[test]
    fn test_denominator_must_be_power_of_two() {
        assert!(matches!(TimeSigValue::parse("3/3"), Err(TimeSigError::Denominator(_))));
        assert!(matches!(TimeSig::normal(6, 3), Err(TimeSigError::Denominator(_))));
        assert!(TimeSig::normal(7, 16).is_ok());
        assert!(TimeSig::normal(3, 1).is_ok());
    }
}
