//! Global configuration constants and parameter bundles for the engine.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default gravity vector applied in the world (Z-up).
pub const DEFAULT_GRAVITY: DVec3 = DVec3::new(0.0, 0.0, -9.81);

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f64 = 1.0e-3;

/// Penetration below which a pair is treated as not touching.
pub const DEFAULT_MINIMUM_PENETRATION: f64 = 5.0e-5;

/// Default Coulomb friction coefficient.
pub const DEFAULT_FRICTION: f64 = 0.7;

/// Default fraction of penetration corrected per second-normalized tick.
pub const DEFAULT_ERROR_REDUCTION: f64 = 0.1;

/// Diagonal term added to an ill-conditioned effective-mass matrix.
pub const DEFAULT_REGULARIZATION: f64 = 1.0e-9;

/// Iteration cap of the per-contact impulse solver.
pub const DEFAULT_SOLVER_ITERATIONS: usize = 100;

/// Convergence tolerance on impulse and velocity updates.
pub const DEFAULT_SOLVER_TOLERANCE: f64 = 1.0e-6;

/// Lower bound of the relaxation factor.
pub const DEFAULT_RELAXATION_MIN: f64 = 0.7;

/// Decay rate of the relaxation factor toward its lower bound.
pub const DEFAULT_RELAXATION_DECAY: f64 = 0.99;

/// Global contact behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactParameters {
    /// Pairs whose maximum penetration stays below this are discarded.
    pub minimum_penetration: f64,
    pub coefficient_of_friction: f64,
    pub coefficient_of_restitution: f64,
    /// Closing speed under which restitution is ignored.
    pub restitution_threshold: f64,
    /// Share of the excess penetration removed per tick.
    pub error_reduction: f64,
    pub regularization: f64,
}

impl Default for ContactParameters {
    fn default() -> Self {
        Self {
            minimum_penetration: DEFAULT_MINIMUM_PENETRATION,
            coefficient_of_friction: DEFAULT_FRICTION,
            coefficient_of_restitution: 0.0,
            restitution_threshold: 0.0,
            error_reduction: DEFAULT_ERROR_REDUCTION,
            regularization: DEFAULT_REGULARIZATION,
        }
    }
}

impl ContactParameters {
    pub fn with_friction(mut self, coefficient: f64) -> Self {
        self.coefficient_of_friction = coefficient;
        self
    }

    pub fn with_restitution(mut self, coefficient: f64) -> Self {
        self.coefficient_of_restitution = coefficient;
        self
    }

    pub fn with_minimum_penetration(mut self, depth: f64) -> Self {
        self.minimum_penetration = depth;
        self
    }

    pub fn with_error_reduction(mut self, erp: f64) -> Self {
        self.error_reduction = erp;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        non_negative("coefficient_of_friction", self.coefficient_of_friction)?;
        unit_interval("coefficient_of_restitution", self.coefficient_of_restitution)?;
        non_negative("minimum_penetration", self.minimum_penetration)?;
        non_negative("restitution_threshold", self.restitution_threshold)?;
        unit_interval("error_reduction", self.error_reduction)?;
        non_negative("regularization", self.regularization)
    }
}

/// Global joint-limit constraint behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintParameters {
    pub coefficient_of_restitution: f64,
    pub restitution_threshold: f64,
    /// Share of the limit violation removed per tick.
    pub error_reduction: f64,
}

impl Default for ConstraintParameters {
    fn default() -> Self {
        Self {
            coefficient_of_restitution: 0.0,
            restitution_threshold: 0.0,
            error_reduction: 0.0,
        }
    }
}

impl ConstraintParameters {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        unit_interval("coefficient_of_restitution", self.coefficient_of_restitution)?;
        non_negative("restitution_threshold", self.restitution_threshold)?;
        unit_interval("error_reduction", self.error_reduction)
    }
}

/// Iteration policy of the multi-contact impulse solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParameters {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Lower bound of the successive over-relaxation factor.
    pub relaxation_min: f64,
    /// Per-iteration decay of the relaxation factor toward `relaxation_min`.
    pub relaxation_decay: f64,
    /// When set, a group that fails to converge gets a second pass with ten
    /// times the iteration budget at `relaxation_min`.
    pub strict: bool,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_SOLVER_ITERATIONS,
            tolerance: DEFAULT_SOLVER_TOLERANCE,
            relaxation_min: DEFAULT_RELAXATION_MIN,
            relaxation_decay: DEFAULT_RELAXATION_DECAY,
            strict: false,
        }
    }
}

impl SolverParameters {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "max_iterations",
                value: 0.0,
                expected: ">= 1",
            });
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(ConfigurationError::InvalidParameter {
                name: "tolerance",
                value: self.tolerance,
                expected: "> 0",
            });
        }
        if !(self.relaxation_min > 0.0 && self.relaxation_min <= 1.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "relaxation_min",
                value: self.relaxation_min,
                expected: "in (0, 1]",
            });
        }
        unit_interval("relaxation_decay", self.relaxation_decay)
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter {
            name,
            value,
            expected: ">= 0",
        })
    }
}

fn unit_interval(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter {
            name,
            value,
            expected: "in [0, 1]",
        })
    }
}
