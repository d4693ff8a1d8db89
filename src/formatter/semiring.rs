//! The timing-weight product semiring that lets composition/shortest-path
//! machinery carry per-word time intervals through a rewrite.
//!
//! Grounded on `original_source/src/itn/timing-weight.h` (`TimingWeight =
//! ProductWeight<MaxMinWeight, MinMaxWeight>`) and `maxmin-weight.h`
//! (`Zero = -inf, One = +inf, Plus = max, Times = min`). `TimingWeight`
//! here fuses the two component semirings into one `{start, end}` pair
//! directly, since nothing else in this crate needs the component
//! semirings standalone.

/// `(start_ms, end_ms)` under:
/// - `⊕` ("sum"): componentwise `(max, min)` — widening union of possible
///   intervals.
/// - `⊗` ("product"): componentwise `(min, max)` — span of concatenation.
/// - zero = `(-inf, +inf)`, one = `(+inf, -inf)`.
///
/// This is idempotent (`x ⊕ x == x`) and forms a commutative semiring with
/// the path property, per the design notes' instruction to verify the
/// semiring axioms before relying on shortest-path machinery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingWeight {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl TimingWeight {
    pub fn zero() -> Self {
        TimingWeight {
            start_ms: f64::NEG_INFINITY,
            end_ms: f64::INFINITY,
        }
    }

    pub fn one() -> Self {
        TimingWeight {
            start_ms: f64::INFINITY,
            end_ms: f64::NEG_INFINITY,
        }
    }

    pub fn from_interval(start_ms: i64, end_ms: i64) -> Self {
        TimingWeight {
            start_ms: start_ms as f64,
            end_ms: end_ms as f64,
        }
    }

    /// `⊕`: widening union.
    pub fn plus(self, other: Self) -> Self {
        TimingWeight {
            start_ms: self.start_ms.max(other.start_ms),
            end_ms: self.end_ms.min(other.end_ms),
        }
    }

    /// `⊗`: span of concatenation.
    pub fn times(self, other: Self) -> Self {
        TimingWeight {
            start_ms: self.start_ms.min(other.start_ms),
            end_ms: self.end_ms.max(other.end_ms),
        }
    }

    pub fn is_zero(self) -> bool {
        self.start_ms == f64::NEG_INFINITY && self.end_ms == f64::INFINITY
    }

    pub fn is_one(self) -> bool {
        self.start_ms == f64::INFINITY && self.end_ms == f64::NEG_INFINITY
    }

    /// `None` when the weight is still `zero`/`one` (no concrete interval
    /// was ever combined into it).
    pub fn to_interval(self) -> Option<(i64, i64)> {
        if self.start_ms.is_finite() && self.end_ms.is_finite() {
            Some((self.start_ms as i64, self.end_ms as i64))
        } else {
            None
        }
    }
}

/// Folds a sequence of per-word intervals under `⊗`, i.e. the span covered
/// by concatenating them — this is what collapsing several input words
/// into one output word computes (§4.5).
pub fn times_fold(weights: impl IntoIterator<Item = TimingWeight>) -> TimingWeight {
    weights.into_iter().fold(TimingWeight::one(), TimingWeight::times)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(a: i64, b: i64) -> TimingWeight {
        TimingWeight::from_interval(a, b)
    }

    #[test]
    fn zero_is_times_annihilator_and_plus_identity() {
        let x = w(10, 20);
        assert_eq!(x.plus(TimingWeight::zero()), x);
        // zero times anything should yield zero under this semiring's
        // times (min start, max end) since zero's components are already
        // the extreme values.
        assert_eq!(x.times(TimingWeight::zero()), TimingWeight::zero());
    }

    #[test]
    fn one_is_times_identity() {
        let x = w(10, 20);
        assert_eq!(x.times(TimingWeight::one()), x);
        assert_eq!(TimingWeight::one().times(x), x);
    }

    #[test]
    fn plus_is_idempotent() {
        let x = w(5, 15);
        assert_eq!(x.plus(x), x);
    }

    #[test]
    fn plus_is_commutative_and_associative() {
        let a = w(0, 10);
        let b = w(5, 8);
        let c = w(2, 20);
        assert_eq!(a.plus(b), b.plus(a));
        assert_eq!(a.plus(b).plus(c), a.plus(b.plus(c)));
    }

    #[test]
    fn times_is_commutative_and_associative() {
        let a = w(0, 10);
        let b = w(5, 8);
        let c = w(2, 20);
        assert_eq!(a.times(b), b.times(a));
        assert_eq!(a.times(b).times(c), a.times(b.times(c)));
    }

    #[test]
    fn times_fold_yields_span_of_concatenation() {
        let folded = times_fold([w(100, 200), w(150, 300), w(50, 180)]);
        assert_eq!(folded, w(50, 300));
    }

    #[test]
    fn times_fold_of_empty_is_one() {
        assert!(times_fold(std::iter::empty()).is_one());
    }
}
