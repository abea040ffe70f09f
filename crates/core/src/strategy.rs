/// Solution strategy of the nonlinear solver.
///
/// The set is closed. Strategies fall into two families that expose
/// different tuning parameters, see [`Strategy::family`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Strategy {
    /// Modified Newton iteration with full steps.
    #[default]
    Newton,
    /// Modified Newton iteration with a backtracking line search.
    Linesearch,
    /// Fixed-point iteration `u = G(u)`; the system returns `G(u)`.
    FixedPoint,
    /// Picard iteration `u ← u − L⁻¹F(u)` with a frozen linear part `L`.
    Picard,
}

/// Parameter family of a [`Strategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyFamily {
    /// Newton and Linesearch: Jacobian setup-call limits apply.
    Newton,
    /// FixedPoint and Picard: Anderson acceleration and damping apply.
    FixedPoint,
}

impl Strategy {
    /// Returns the parameter family of this strategy.
    #[must_use]
    pub fn family(self) -> StrategyFamily {
        match self {
            Strategy::Newton | Strategy::Linesearch => StrategyFamily::Newton,
            Strategy::FixedPoint | Strategy::Picard => StrategyFamily::FixedPoint,
        }
    }
}
