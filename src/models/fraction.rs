//! Exact rational time values
//!
//! Every position and duration in the score is a `Fraction` of a whole note.
//! Values are always kept in lowest terms so equality is structural, and
//! nothing on the layout-independent path ever goes through floating point.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Ticks per quarter note used when converting to integer ticks
pub const DIVISION: i64 = 480;

/// Errors produced when building a fraction from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FractionError {
    #[error("fraction denominator must not be zero")]
    ZeroDenominator,

    #[error("invalid fraction literal: '{0}'")]
    InvalidLiteral(String),
}

/// Exact rational time offset or duration, measured in whole notes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction(Ratio<i64>);

impl Fraction {
    /// Create a reduced fraction.
    ///
    /// Panics on a zero denominator; use [`Fraction::try_new`] for input
    /// that has not been validated.
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Fraction(Ratio::new(numerator, denominator))
    }

    /// Create a reduced fraction, rejecting a zero denominator
    pub fn try_new(numerator: i64, denominator: i64) -> Result<Self, FractionError> {
        if denominator == 0 {
            return Err(FractionError::ZeroDenominator);
        }
        Ok(Fraction::new(numerator, denominator))
    }

    pub const fn zero() -> Self {
        Fraction(Ratio::new_raw(0, 1))
    }

    pub fn from_integer(value: i64) -> Self {
        Fraction(Ratio::from_integer(value))
    }

    pub fn numerator(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denominator(&self) -> i64 {
        *self.0.denom()
    }

    pub fn is_zero(&self) -> bool {
        self.numerator() == 0
    }

    pub fn is_negative(&self) -> bool {
        self.numerator() < 0
    }

    /// Integer ticks at [`DIVISION`] ticks per quarter (truncating)
    pub fn ticks(&self) -> i64 {
        self.numerator() * DIVISION * 4 / self.denominator()
    }

    pub fn from_ticks(ticks: i64) -> Self {
        Fraction::new(ticks, DIVISION * 4)
    }

    /// True when the denominator is a power of two, i.e. the value can be
    /// written with plain (non-tuplet) note values
    pub fn is_dyadic(&self) -> bool {
        let d = self.denominator();
        d > 0 && (d & (d - 1)) == 0
    }

    /// Largest integer `n` with `n * unit <= self`
    pub fn div_floor(&self, unit: Fraction) -> i64 {
        (self.0 / unit.0).floor().to_integer()
    }

    /// Smallest integer `n` with `n * unit >= self`
    pub fn div_ceil(&self, unit: Fraction) -> i64 {
        (self.0 / unit.0).ceil().to_integer()
    }

    pub fn to_f64(&self) -> f64 {
        self.numerator() as f64 / self.denominator() as f64
    }

    pub fn min(self, other: Fraction) -> Fraction {
        if other < self { other } else { self }
    }

    pub fn max(self, other: Fraction) -> Fraction {
        if other > self { other } else { self }
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::zero()
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fraction({}/{})", self.numerator(), self.denominator())
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator(), self.denominator())
    }
}

impl FromStr for Fraction {
    type Err = FractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || FractionError::InvalidLiteral(s.to_string());
        match s.split_once('/') {
            Some((n, d)) => {
                let n: i64 = n.trim().parse().map_err(|_| invalid())?;
                let d: i64 = d.trim().parse().map_err(|_| invalid())?;
                Fraction::try_new(n, d)
            }
            None => s.parse::<i64>().map(Fraction::from_integer).map_err(|_| invalid()),
        }
    }
}

impl Serialize for Fraction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fraction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Fraction {
    type Output = Fraction;
    fn add(self, rhs: Fraction) -> Fraction {
        Fraction(self.0 + rhs.0)
    }
}

impl Sub for Fraction {
    type Output = Fraction;
    fn sub(self, rhs: Fraction) -> Fraction {
        Fraction(self.0 - rhs.0)
    }
}

impl Mul for Fraction {
    type Output = Fraction;
    fn mul(self, rhs: Fraction) -> Fraction {
        Fraction(self.0 * rhs.0)
    }
}

impl Mul<i64> for Fraction {
    type Output = Fraction;
    fn mul(self, rhs: i64) -> Fraction {
        Fraction(self.0 * rhs)
    }
}

/// Division by a zero fraction panics, like integer division
impl Div for Fraction {
    type Output = Fraction;
    fn div(self, rhs: Fraction) -> Fraction {
        Fraction(self.0 / rhs.0)
    }
}

impl Div<i64> for Fraction {
    type Output = Fraction;
    fn div(self, rhs: i64) -> Fraction {
        Fraction(self.0 / rhs)
    }
}

impl Neg for Fraction {
    type Output = Fraction;
    fn neg(self) -> Fraction {
        Fraction(-self.0)
    }
}

impl AddAssign for Fraction {
    fn add_assign(&mut self, rhs: Fraction) {
        self.0 = self.0 + rhs.0;
    }
}

impl SubAssign for Fraction {
    fn sub_assign(&mut self, rhs: Fraction) {
        self.0 = self.0 - rhs.0;
    }
}

impl std::iter::Sum for Fraction {
    fn sum<I: Iterator<Item = Fraction>>(iter: I) -> Fraction {
        iter.fold(Fraction::zero(), |acc, f| acc + f)
    }
}
