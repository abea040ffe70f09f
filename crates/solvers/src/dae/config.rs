use thiserror::Error;

use super::record::MAX_ORDER;

/// Configuration for the DAE solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    max_num_steps: usize,
    max_step: f64,
    max_order: usize,
}

/// Errors that can occur when validating a DAE solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_num_steps must be positive")]
    MaxNumSteps,

    #[error("max_step must be finite and non-negative")]
    MaxStep,

    #[error("max_order must be between 1 and {}", MAX_ORDER)]
    MaxOrder,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_num_steps: 500,
            max_step: 0.0,
            max_order: MAX_ORDER,
        }
    }
}

impl Config {
    /// Creates a validated config.
    ///
    /// A `max_step` of zero leaves the internal step unbounded.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_num_steps` is zero, if `max_step` is negative
    /// or non-finite, or if `max_order` is outside `1..=MAX_ORDER`.
    pub fn new(max_num_steps: usize, max_step: f64, max_order: usize) -> Result<Self, ConfigError> {
        if max_num_steps == 0 {
            return Err(ConfigError::MaxNumSteps);
        }
        if !max_step.is_finite() || max_step < 0.0 {
            return Err(ConfigError::MaxStep);
        }
        if !(1..=MAX_ORDER).contains(&max_order) {
            return Err(ConfigError::MaxOrder);
        }

        Ok(Self {
            max_num_steps,
            max_step,
            max_order,
        })
    }

    /// Returns the internal step limit for one stop-time leg.
    #[must_use]
    pub fn max_num_steps(&self) -> usize {
        self.max_num_steps
    }

    /// Returns the user step bound, `0.0` meaning unbounded.
    #[must_use]
    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    #[must_use]
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    pub(super) fn set_max_step(&mut self, max_step: f64) -> Result<(), ConfigError> {
        *self = Self::new(self.max_num_steps, max_step, self.max_order)?;
        Ok(())
    }

    pub(super) fn set_max_num_steps(&mut self, max_num_steps: usize) -> Result<(), ConfigError> {
        *self = Self::new(max_num_steps, self.max_step, self.max_order)?;
        Ok(())
    }
}
