/// Default absolute tolerance assigned to newly registered variables.
pub const DEFAULT_ATOL: f64 = 1.0e-6;

/// Default relative tolerance.
pub const DEFAULT_RTOL: f64 = 1.0e-4;

/// Relative and per-variable absolute tolerances of a DAE model.
///
/// The absolute tolerance vector grows with the variable registry: each
/// registration appends the *current* default absolute tolerance. Changing
/// the default later only affects variables registered afterwards, unless
/// [`Tolerances::set`] overwrites all entries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    relative: f64,
    default_absolute: f64,
    absolute: Vec<f64>,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            relative: DEFAULT_RTOL,
            default_absolute: DEFAULT_ATOL,
            absolute: Vec::new(),
        }
    }
}

impl Tolerances {
    /// Returns the relative tolerance.
    #[must_use]
    pub fn relative(&self) -> f64 {
        self.relative
    }

    /// Returns the absolute tolerance appended for new variables.
    #[must_use]
    pub fn default_absolute(&self) -> f64 {
        self.default_absolute
    }

    /// Returns the absolute tolerance of one variable.
    ///
    /// Falls back to [`DEFAULT_ATOL`] for an unknown index.
    #[must_use]
    pub fn absolute(&self, index: usize) -> f64 {
        self.absolute.get(index).copied().unwrap_or(DEFAULT_ATOL)
    }

    /// Returns the absolute tolerances of all registered variables.
    #[must_use]
    pub fn absolute_all(&self) -> &[f64] {
        &self.absolute
    }

    /// Sets both tolerances, overwriting every registered absolute tolerance.
    pub fn set(&mut self, relative: f64, absolute: f64) {
        self.relative = relative;
        self.default_absolute = absolute;
        self.absolute.fill(absolute);
    }

    /// Sets the relative tolerance and per-variable absolute tolerances.
    ///
    /// The relative tolerance is always updated. The absolute tolerances are
    /// copied only if `absolute` has at least one entry per registered
    /// variable; a shorter slice leaves them untouched and returns `false`.
    pub fn set_each(&mut self, relative: f64, absolute: &[f64]) -> bool {
        self.relative = relative;
        let count = self.absolute.len();
        if absolute.len() < count {
            return false;
        }
        self.absolute.copy_from_slice(&absolute[..count]);
        true
    }

    pub(crate) fn push_default(&mut self) {
        self.absolute.push(self.default_absolute);
    }

    pub(crate) fn clear_variables(&mut self) {
        self.absolute.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn new_variables_take_the_current_default() {
        let mut tolerances = Tolerances::default();
        tolerances.push_default();
        tolerances.set(1e-3, 1e-8);
        tolerances.push_default();

        assert_relative_eq!(tolerances.absolute(0), 1e-8);
        assert_relative_eq!(tolerances.absolute(1), 1e-8);
        assert_relative_eq!(tolerances.relative(), 1e-3);
    }

    #[test]
    fn short_vector_only_updates_relative() {
        let mut tolerances = Tolerances::default();
        tolerances.push_default();
        tolerances.push_default();

        assert!(!tolerances.set_each(0.5, &[1.0]));
        assert_relative_eq!(tolerances.relative(), 0.5);
        assert_eq!(tolerances.absolute_all(), &[DEFAULT_ATOL, DEFAULT_ATOL]);
    }

    #[test]
    fn long_vector_is_truncated_to_registry() {
        let mut tolerances = Tolerances::default();
        tolerances.push_default();

        assert!(tolerances.set_each(1e-2, &[1e-4, 7.0]));
        assert_eq!(tolerances.absolute_all(), &[1e-4]);
    }

    #[test]
    fn unknown_index_falls_back_to_default() {
        let tolerances = Tolerances::default();
        assert_relative_eq!(tolerances.absolute(3), DEFAULT_ATOL);
    }
}
