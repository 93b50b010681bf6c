//! The appraisal triple — minimum / average / maximum value of a piece
//! or garment.
//!
//! Values are immutable. Every arithmetic helper returns a new triple and is
//! `#[must_use]`: accumulating means reassigning, e.g.
//! `total = total.add(&piece)`.

use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppraisalTriple {
    pub minimum: Money,
    pub average: Money,
    pub maximum: Money,
}

impl AppraisalTriple {
    pub const ZERO: AppraisalTriple = AppraisalTriple {
        minimum: Money::ZERO,
        average: Money::ZERO,
        maximum: Money::ZERO,
    };

    pub fn new(minimum: Money, average: Money, maximum: Money) -> Self {
        Self { minimum, average, maximum }
    }

    /// A triple with no spread: `{v, v, v}`.
    pub fn flat(value: Money) -> Self {
        Self::new(value, value, value)
    }

    /// Component-wise sum.
    #[must_use]
    pub fn add(&self, other: &AppraisalTriple) -> Self {
        Self::new(
            self.minimum + other.minimum,
            self.average + other.average,
            self.maximum + other.maximum,
        )
    }

    /// Every component multiplied by `factor`.
    #[must_use]
    pub fn multiply(&self, factor: Money) -> Self {
        Self::new(
            self.minimum * factor,
            self.average * factor,
            self.maximum * factor,
        )
    }

    /// Additive percentage increment applied to each bound independently:
    /// `b + b × pct`.
    #[must_use]
    pub fn increase_by_percentage(&self, pct: Money) -> Self {
        Self::new(
            self.minimum + self.minimum * pct,
            self.average + self.average * pct,
            self.maximum + self.maximum * pct,
        )
    }

    /// `minimum ≤ average ≤ maximum`.
    pub fn is_ordered(&self) -> bool {
        self.minimum <= self.average && self.average <= self.maximum
    }

    /// Drop trailing zeros so persisted and compared values are canonical.
    #[must_use]
    pub fn normalize(&self) -> Self {
        Self::new(
            self.minimum.normalize(),
            self.average.normalize(),
            self.maximum.normalize(),
        )
    }
}

impl Default for AppraisalTriple {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::ops::Add for AppraisalTriple {
    type Output = AppraisalTriple;

    fn add(self, rhs: AppraisalTriple) -> AppraisalTriple {
        AppraisalTriple::add(&self, &rhs)
    }
}

impl std::iter::Sum for AppraisalTriple {
    fn sum<I: Iterator<Item = AppraisalTriple>>(iter: I) -> Self {
        iter.fold(AppraisalTriple::ZERO, |acc, t| acc + t)
    }
}

impl fmt::Display for AppraisalTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "min={} avg={} max={}", self.minimum, self.average, self.maximum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[test]
    fn increase_by_percentage_is_additive_per_bound() {
        let t = AppraisalTriple::new(d("400"), d("500"), d("600"));
        let up = t.increase_by_percentage(d("0.10"));
        assert_eq!(up.normalize(), AppraisalTriple::new(d("440"), d("550"), d("660")));
    }

    #[test]
    fn sum_folds_component_wise() {
        let total: AppraisalTriple = vec![
            AppraisalTriple::new(d("1"), d("2"), d("3")),
            AppraisalTriple::new(d("10"), d("20"), d("30")),
        ]
        .into_iter()
        .sum();
        assert_eq!(total, AppraisalTriple::new(d("11"), d("22"), d("33")));
    }

    #[test]
    fn multiply_scales_every_component() {
        let t = AppraisalTriple::flat(d("120")).multiply(d("1.2"));
        assert_eq!(t.normalize(), AppraisalTriple::flat(d("144")));
        assert!(t.is_ordered());
    }
}
