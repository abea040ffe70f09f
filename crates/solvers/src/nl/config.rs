use spindle_core::{Strategy, StrategyFamily};
use thiserror::Error;

/// Jacobian refresh limits for [`Strategy::Newton`] and
/// [`Strategy::Linesearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewtonConfig {
    max_setup_calls: usize,
    max_sub_setup_calls: usize,
}

/// Acceleration and damping for [`Strategy::FixedPoint`] and
/// [`Strategy::Picard`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedPointConfig {
    anderson_depth: usize,
    anderson_damping: f64,
    damping: f64,
}

/// Configuration for the nonlinear solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    max_iter: usize,
    newton: NewtonConfig,
    fixed_point: FixedPointConfig,
}

/// Errors that can occur when validating a nonlinear solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iter must be positive")]
    MaxIter,

    #[error("max_setup_calls must be positive")]
    MaxSetupCalls,

    #[error("max_sub_setup_calls must be positive")]
    MaxSubSetupCalls,

    #[error("anderson_damping must be in (0, 1]")]
    AndersonDamping,

    #[error("damping must be in (0, 1]")]
    Damping,
}

/// Errors from the nonlinear solver's parameter setters.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParameterError {
    #[error("{strategy:?} does not take {family:?} parameters")]
    StrategyMismatch {
        strategy: Strategy,
        family: StrategyFamily,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

fn is_fraction(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_setup_calls: 10,
            max_sub_setup_calls: 5,
        }
    }
}

impl NewtonConfig {
    /// Creates validated Jacobian refresh limits.
    ///
    /// # Errors
    ///
    /// Returns an error if either limit is zero.
    pub fn new(max_setup_calls: usize, max_sub_setup_calls: usize) -> Result<Self, ConfigError> {
        if max_setup_calls == 0 {
            return Err(ConfigError::MaxSetupCalls);
        }
        if max_sub_setup_calls == 0 {
            return Err(ConfigError::MaxSubSetupCalls);
        }
        Ok(Self {
            max_setup_calls,
            max_sub_setup_calls,
        })
    }

    /// Iterations between forced Jacobian refreshes.
    #[must_use]
    pub fn max_setup_calls(&self) -> usize {
        self.max_setup_calls
    }

    /// Iterations between residual-monitoring checkpoints.
    #[must_use]
    pub fn max_sub_setup_calls(&self) -> usize {
        self.max_sub_setup_calls
    }
}

impl Default for FixedPointConfig {
    fn default() -> Self {
        Self {
            anderson_depth: 0,
            anderson_damping: 1.0,
            damping: 1.0,
        }
    }
}

impl FixedPointConfig {
    /// Creates validated acceleration settings.
    ///
    /// An `anderson_depth` of zero disables Anderson acceleration.
    ///
    /// # Errors
    ///
    /// Returns an error if either damping factor is outside `(0, 1]`.
    pub fn new(anderson_depth: usize, anderson_damping: f64, damping: f64) -> Result<Self, ConfigError> {
        if !is_fraction(anderson_damping) {
            return Err(ConfigError::AndersonDamping);
        }
        if !is_fraction(damping) {
            return Err(ConfigError::Damping);
        }
        Ok(Self {
            anderson_depth,
            anderson_damping,
            damping,
        })
    }

    #[must_use]
    pub fn anderson_depth(&self) -> usize {
        self.anderson_depth
    }

    #[must_use]
    pub fn anderson_damping(&self) -> f64 {
        self.anderson_damping
    }

    /// Damping of the plain fixed-point update.
    #[must_use]
    pub fn damping(&self) -> f64 {
        self.damping
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iter: 200,
            newton: NewtonConfig::default(),
            fixed_point: FixedPointConfig::default(),
        }
    }
}

impl Config {
    /// Creates a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iter` is zero.
    pub fn new(
        max_iter: usize,
        newton: NewtonConfig,
        fixed_point: FixedPointConfig,
    ) -> Result<Self, ConfigError> {
        if max_iter == 0 {
            return Err(ConfigError::MaxIter);
        }
        Ok(Self {
            max_iter,
            newton,
            fixed_point,
        })
    }

    #[must_use]
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    #[must_use]
    pub fn newton(&self) -> &NewtonConfig {
        &self.newton
    }

    #[must_use]
    pub fn fixed_point(&self) -> &FixedPointConfig {
        &self.fixed_point
    }

    pub(super) fn set_max_iter(&mut self, max_iter: usize) -> Result<(), ConfigError> {
        *self = Self::new(max_iter, self.newton, self.fixed_point)?;
        Ok(())
    }

    pub(super) fn set_newton(&mut self, newton: NewtonConfig) {
        self.newton = newton;
    }

    pub(super) fn set_fixed_point(&mut self, fixed_point: FixedPointConfig) {
        self.fixed_point = fixed_point;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_iter(), 200);
        assert_eq!(config.newton().max_setup_calls(), 10);
        assert_eq!(config.newton().max_sub_setup_calls(), 5);
        assert_eq!(config.fixed_point().anderson_depth(), 0);
        assert!((config.fixed_point().anderson_damping() - 1.0).abs() < f64::EPSILON);
        assert!((config.fixed_point().damping() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(NewtonConfig::new(0, 5), Err(ConfigError::MaxSetupCalls));
        assert_eq!(NewtonConfig::new(10, 0), Err(ConfigError::MaxSubSetupCalls));
        assert_eq!(
            FixedPointConfig::new(2, 0.0, 1.0),
            Err(ConfigError::AndersonDamping)
        );
        assert_eq!(FixedPointConfig::new(2, 1.0, 1.5), Err(ConfigError::Damping));
        assert_eq!(
            Config::new(0, NewtonConfig::default(), FixedPointConfig::default()),
            Err(ConfigError::MaxIter)
        );
    }
}
