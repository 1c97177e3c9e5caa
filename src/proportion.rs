//! Exact rational numbers for musical time.
//!
//! Durations are measured in minims and tempo relationships are ratios such
//! as 3:2, so every time computation in the crate runs on `Proportion`.
//! Floating point only appears when a time is finally turned into a pixel
//! coordinate; ticks are rounded once, at the very end.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Sub};

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use crate::error::ArithmeticError;

/// A reduced fraction with a positive denominator.
///
/// `Proportion` is a plain `Copy` value: arithmetic always returns a new
/// value, so a running cursor is advanced by rebinding
/// (`cur = cur + len`), never by mutating a shared instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(i64, i64)", into = "(i64, i64)")]
pub struct Proportion(Ratio<i64>);

impl Proportion {
    pub const ZERO: Proportion = Proportion(Ratio::new_raw(0, 1));
    pub const ONE: Proportion = Proportion(Ratio::new_raw(1, 1));

    /// Literal already in lowest terms with a positive denominator.
    pub(crate) const fn raw(numerator: i64, denominator: i64) -> Self {
        Proportion(Ratio::new_raw(numerator, denominator))
    }

    /// Build `numerator/denominator` in lowest terms.
    pub fn new(numerator: i64, denominator: i64) -> Result<Self, ArithmeticError> {
        if denominator == 0 {
            return Err(ArithmeticError::ZeroDenominator);
        }
        Ok(Proportion(Ratio::new(numerator, denominator)))
    }

    pub fn from_integer(n: i64) -> Self {
        Proportion(Ratio::from_integer(n))
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

    pub fn sum(self, other: Proportion) -> Proportion {
        Proportion(self.0 + other.0)
    }

    pub fn difference(self, other: Proportion) -> Proportion {
        Proportion(self.0 - other.0)
    }

    pub fn product(self, other: Proportion) -> Proportion {
        Proportion(self.0 * other.0)
    }

    /// `self ÷ other`; fails when `other` is zero.
    pub fn quotient(self, other: Proportion) -> Result<Proportion, ArithmeticError> {
        if other.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        Ok(Proportion(self.0 / other.0))
    }

    pub fn greater_than(&self, other: &Proportion) -> bool {
        self.0 > other.0
    }

    pub fn less_than(&self, other: &Proportion) -> bool {
        self.0 < other.0
    }

    /// Approximate value, for pixel math only.
    pub fn to_f64(&self) -> f64 {
        self.numerator() as f64 / self.denominator() as f64
    }

    /// Convert a time in minims to MIDI ticks, rounding half away from zero.
    /// Negative times clamp to 0.
    pub fn to_ticks(&self, ticks_per_minim: Proportion) -> u64 {
        let ticks = (self.0 * ticks_per_minim.0).round();
        (*ticks.numer()).max(0) as u64
    }
}

impl Default for Proportion {
    fn default() -> Self {
        Proportion::ZERO
    }
}

impl Add for Proportion {
    type Output = Proportion;
    fn add(self, rhs: Proportion) -> Proportion {
        self.sum(rhs)
    }
}

impl Sub for Proportion {
    type Output = Proportion;
    fn sub(self, rhs: Proportion) -> Proportion {
        self.difference(rhs)
    }
}

impl Mul for Proportion {
    type Output = Proportion;
    fn mul(self, rhs: Proportion) -> Proportion {
        self.product(rhs)
    }
}

impl Ord for Proportion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Proportion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u32> for Proportion {
    fn from(n: u32) -> Self {
        Proportion::from_integer(n as i64)
    }
}

impl TryFrom<(i64, i64)> for Proportion {
    type Error = ArithmeticError;
    fn try_from((n, d): (i64, i64)) -> Result<Self, Self::Error> {
        Proportion::new(n, d)
    }
}

impl From<Proportion> for (i64, i64) {
    fn from(p: Proportion) -> Self {
        (p.numerator(), p.denominator())
    }
}

impl fmt::Display for Proportion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator() == 1 {
            write!(f, "{}", self.numerator())
        } else {
            write!(f, "{}/{}", self.numerator(), self.denominator())
        }
    }
}

impl fmt::Debug for Proportion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proportion({}/{})", self.numerator(), self.denominator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: i64, d: i64) -> Proportion {
        Proportion::new(n, d).unwrap()
    }

    #[test]
    fn reduces_to_lowest_terms() {
        let half = p(2, 4);
        assert_eq!(half, p(1, 2));
        assert_eq!((half.numerator(), half.denominator()), (1, 2));

        let neg = p(6, -9);
        assert_eq!((neg.numerator(), neg.denominator()), (-2, 3));
    }

    #[test]
    fn zero_denominator_fails() {
        assert_eq!(Proportion::new(3, 0), Err(ArithmeticError::ZeroDenominator));
    }

    #[test]
    fn quotient_by_zero_fails() {
        assert_eq!(
            p(3, 2).quotient(Proportion::ZERO),
            Err(ArithmeticError::DivisionByZero)
        );
        assert_eq!(p(3, 2).quotient(p(3, 4)).unwrap(), Proportion::from_integer(2));
    }

    #[test]
    fn sum_and_product_commute_and_associate() {
        let samples = [p(3, 2), p(-5, 7), p(2, 3), p(11, 4), Proportion::ZERO];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(a.sum(b), b.sum(a));
                assert_eq!(a.product(b), b.product(a));
                for &c in &samples {
                    assert_eq!(a.sum(b).sum(c), a.sum(b.sum(c)));
                    assert_eq!(a.product(b).product(c), a.product(b.product(c)));
                }
            }
        }
    }

    #[test]
    fn repeated_sesquialtera_stays_exact() {
        // 300 minims in 3:2 proportion, one at a time, must land exactly on 200.
        let step = Proportion::ONE.quotient(p(3, 2)).unwrap();
        let mut t = Proportion::ZERO;
        for _ in 0..300 {
            t = t + step;
        }
        assert_eq!(t, Proportion::from_integer(200));
    }

    #[test]
    fn ordering_is_exact() {
        assert!(p(2, 3).greater_than(&p(3, 5)));
        assert!(p(3, 5).less_than(&p(2, 3)));
        assert!(!p(4, 6).greater_than(&p(2, 3)));
        assert_eq!(p(4, 6).cmp(&p(2, 3)), Ordering::Equal);
    }

    #[test]
    fn ticks_round_once() {
        let tpm = Proportion::from_integer(48);
        assert_eq!(p(2, 3).to_ticks(tpm), 32);
        assert_eq!(p(1, 96).to_ticks(tpm), 1);
        assert_eq!(p(1, 100).to_ticks(tpm), 0);
    }

    #[test]
    fn serde_round_trip_validates() {
        let json = serde_json::to_string(&p(3, 2)).unwrap();
        assert_eq!(json, "[3,2]");
        let back: Proportion = serde_json::from_str("[6,4]").unwrap();
        assert_eq!(back, p(3, 2));
        assert!(serde_json::from_str::<Proportion>("[1,0]").is_err());
    }
}
