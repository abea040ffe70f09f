//! Inequality constraints on solver variables.
//!
//! A [`Constraint`] restricts the admissible values of one variable. Solvers
//! enforce constraints after each corrector or iteration step by cutting the
//! step back, so a constrained variable never leaves its admissible region.
//!
//! Each constraint also has a numeric flag form (`0`, `1`, `-1`, `2`, `-2`)
//! used when constraints are packed into a dense vector.

/// An inequality restricting the values a variable may take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constraint {
    /// No restriction.
    #[default]
    None,
    /// Zero or greater.
    NonNegative,
    /// Zero or less.
    NonPositive,
    /// Strictly greater than zero.
    Positive,
    /// Strictly less than zero.
    Negative,
}

impl Constraint {
    /// Returns the numeric flag for this constraint.
    ///
    /// `0.0` none, `1.0` non-negative, `-1.0` non-positive,
    /// `2.0` positive, `-2.0` negative.
    #[must_use]
    pub fn flag(self) -> f64 {
        match self {
            Constraint::None => 0.0,
            Constraint::NonNegative => 1.0,
            Constraint::NonPositive => -1.0,
            Constraint::Positive => 2.0,
            Constraint::Negative => -2.0,
        }
    }

    /// Parses a numeric flag, returning `None` for unknown values.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn from_flag(flag: f64) -> Option<Self> {
        [
            Constraint::None,
            Constraint::NonNegative,
            Constraint::NonPositive,
            Constraint::Positive,
            Constraint::Negative,
        ]
        .into_iter()
        .find(|constraint| constraint.flag() == flag)
    }

    /// Returns true if this is anything other than [`Constraint::None`].
    #[must_use]
    pub fn is_defined(self) -> bool {
        self != Constraint::None
    }

    /// Returns true if `value` satisfies the constraint.
    #[must_use]
    pub fn is_satisfied(self, value: f64) -> bool {
        match self {
            Constraint::None => true,
            Constraint::NonNegative => value >= 0.0,
            Constraint::NonPositive => value <= 0.0,
            Constraint::Positive => value > 0.0,
            Constraint::Negative => value < 0.0,
        }
    }

    /// Returns the largest fraction `λ ∈ (0, 1]` of `step` that keeps
    /// `value + λ·step` admissible, or `1.0` if the full step is admissible.
    ///
    /// Strict constraints keep a margin so the bound itself is never hit.
    #[must_use]
    pub fn admissible_fraction(self, value: f64, step: f64) -> f64 {
        if self.is_satisfied(value + step) {
            return 1.0;
        }
        let distance = -value / step;
        match self {
            Constraint::None => 1.0,
            Constraint::NonNegative | Constraint::NonPositive => distance.clamp(0.0, 1.0),
            Constraint::Positive | Constraint::Negative => (0.9 * distance).clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn flags_round_trip_for_every_kind() {
        for constraint in [
            Constraint::None,
            Constraint::NonNegative,
            Constraint::NonPositive,
            Constraint::Positive,
            Constraint::Negative,
        ] {
            assert_eq!(Constraint::from_flag(constraint.flag()), Some(constraint));
        }
        assert_eq!(Constraint::from_flag(3.0), None);
    }

    #[test]
    fn default_is_unconstrained() {
        assert_eq!(Constraint::default(), Constraint::None);
        assert!(!Constraint::default().is_defined());
        assert!(Constraint::Positive.is_defined());
    }

    #[test]
    fn strict_and_loose_bounds_differ_at_zero() {
        assert!(Constraint::NonNegative.is_satisfied(0.0));
        assert!(!Constraint::Positive.is_satisfied(0.0));
        assert!(Constraint::NonPositive.is_satisfied(0.0));
        assert!(!Constraint::Negative.is_satisfied(0.0));
    }

    #[test]
    fn admissible_fraction_stops_at_the_bound() {
        assert_relative_eq!(Constraint::None.admissible_fraction(1.0, -5.0), 1.0);
        assert_relative_eq!(Constraint::NonNegative.admissible_fraction(1.0, -0.5), 1.0);
        assert_relative_eq!(Constraint::NonNegative.admissible_fraction(1.0, -4.0), 0.25);
        assert_relative_eq!(Constraint::Positive.admissible_fraction(1.0, -4.0), 0.225);
        assert_relative_eq!(Constraint::Negative.admissible_fraction(-2.0, 4.0), 0.45);
    }
}
