use thiserror::Error;

/// A failure reported by a solver.
///
/// Negative codes are failures; non-negative codes are informational
/// reports that never reach an [`ErrorSlot`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{module} ERROR] in {function}: {message}")]
pub struct SolverError {
    pub code: i32,
    pub module: &'static str,
    pub function: &'static str,
    pub message: String,
}

impl SolverError {
    pub fn new(
        code: i32,
        module: &'static str,
        function: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            module,
            function,
            message: message.into(),
        }
    }

    /// Returns true for failure (negative) codes.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.code < 0
    }
}

/// The per-solver slot holding the most recent failure.
///
/// Each failure overwrites the previous one. Success never clears the slot.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    last: Option<SolverError>,
}

impl ErrorSlot {
    /// Records a report, keeping it only if it is a failure.
    pub fn report(&mut self, error: &SolverError) {
        if error.is_failure() {
            self.last = Some(error.clone());
        } else {
            log::warn!("{} (code {})", error.message, error.code);
        }
    }

    /// Records a failure and returns it as an `Err`.
    pub(crate) fn fail<T>(&mut self, error: SolverError) -> Result<T, SolverError> {
        self.report(&error);
        Err(error)
    }

    #[must_use]
    pub fn last(&self) -> Option<&SolverError> {
        self.last.as_ref()
    }

    /// Returns the last failure as text, or an empty string.
    #[must_use]
    pub fn message(&self) -> String {
        self.last.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_has_module_and_function() {
        let error = SolverError::new(-4, "DAE", "step", "corrector did not converge");
        assert_eq!(
            error.to_string(),
            "[DAE ERROR] in step: corrector did not converge"
        );
    }

    #[test]
    fn informational_reports_do_not_overwrite() {
        let mut slot = ErrorSlot::default();
        slot.report(&SolverError::new(-3, "DAE", "step", "first"));
        slot.report(&SolverError::new(99, "DAE", "step", "just a warning"));

        assert_eq!(slot.message(), "[DAE ERROR] in step: first");
    }

    #[test]
    fn each_failure_overwrites_the_last() {
        let mut slot = ErrorSlot::default();
        assert_eq!(slot.message(), "");

        slot.report(&SolverError::new(-3, "DAE", "step", "first"));
        slot.report(&SolverError::new(-6, "NLS", "solve", "second"));

        assert_eq!(slot.last().map(|e| e.code), Some(-6));
        assert_eq!(slot.message(), "[NLS ERROR] in solve: second");
    }
}
