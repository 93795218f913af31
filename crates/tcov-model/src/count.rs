//! Coverage counters
//!
//! Provides [`Count`], an instruction-level `covered/total` pair, and the
//! per-method [`CoverageRate`] derived from it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Covered/total instruction counter
///
/// # Invariants
/// `covered <= total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Count {
    /// Covered instructions
    pub covered: u32,
    /// Total instructions
    pub total: u32,
}

impl Count {
    /// Zero counter
    pub const ZERO: Self = Self {
        covered: 0,
        total: 0,
    };

    /// Create counter, clamping `covered` to `total`
    #[inline]
    #[must_use]
    pub fn new(covered: u32, total: u32) -> Self {
        Self {
            covered: covered.min(total),
            total,
        }
    }

    /// Uncovered instructions
    #[inline]
    #[must_use]
    pub const fn missed(&self) -> u32 {
        self.total.saturating_sub(self.covered)
    }

    /// Whether anything is covered
    #[inline]
    #[must_use]
    pub const fn is_covered(&self) -> bool {
        self.covered > 0
    }

    /// Coverage percentage, `0.0` for an empty counter
    #[inline]
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.covered) * 100.0 / f64::from(self.total)
        }
    }

    /// Classification of a method counter
    #[inline]
    #[must_use]
    pub const fn rate(&self) -> CoverageRate {
        CoverageRate::of(self.covered, self.total)
    }
}

impl Add for Count {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            covered: self.covered + rhs.covered,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for Count {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Count {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Count> for Count {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl PartialOrd for Count {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by coverage ratio; equal ratios fall back to `(covered, total)`.
/// An empty counter has ratio zero.
impl Ord for Count {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.covered) * u64::from(other.total.max(1));
        let rhs = u64::from(other.covered) * u64::from(self.total.max(1));
        lhs.cmp(&rhs)
            .then_with(|| self.covered.cmp(&other.covered))
            .then_with(|| self.total.cmp(&other.total))
    }
}

/// Coverage classification of a single method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageRate {
    /// Nothing missed
    Full,
    /// Nothing covered
    Missed,
    /// Some instructions covered
    Partly,
}

impl CoverageRate {
    /// Classify a `covered/total` pair by its missed instructions
    #[inline]
    #[must_use]
    pub const fn of(covered: u32, total: u32) -> Self {
        let missed = total.saturating_sub(covered);
        if missed == 0 {
            Self::Full
        } else if missed == total {
            Self::Missed
        } else {
            Self::Partly
        }
    }
}
