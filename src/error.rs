//! Error types for robot construction, configuration, and engine misuse.
//!
//! Configuration and misuse errors are returned as `Err`. Numerical trouble
//! during a tick is never an error; it is reported as a [`Degradation`] in
//! the tick report and counted in the diagnostics registry.

use thiserror::Error;

/// Invalid robot, terrain, or parameter input, detected before any state is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Two bodies or two joints share a name.
    #[error("duplicate {kind} name '{name}' in robot '{robot}'")]
    DuplicateName {
        /// Robot being built.
        robot: String,
        /// `"body"`, `"joint"` or `"sensor"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },

    /// A joint or the root refers to a body that is not defined.
    #[error("unknown body '{body}' referenced by '{referrer}'")]
    UnknownBody {
        /// The missing body.
        body: String,
        /// Joint (or robot root) that referenced it.
        referrer: String,
    },

    /// The joint graph is not a single rooted tree.
    #[error("robot '{robot}' is not a single tree: {reason}")]
    NotATree {
        /// Robot being built.
        robot: String,
        /// Which tree property is violated.
        reason: String,
    },

    /// The root body has no child joints.
    #[error("root body '{body}' of robot '{robot}' has no joints")]
    RootWithoutJoints {
        /// Robot being built.
        robot: String,
        /// The root body.
        body: String,
    },

    /// Mass is zero, negative, or not finite.
    #[error("body '{body}' has invalid mass {mass}")]
    InvalidMass {
        /// Offending body.
        body: String,
        /// The rejected mass.
        mass: f64,
    },

    /// Rotational inertia is not symmetric positive definite.
    #[error("body '{body}' has a non-positive-definite inertia tensor")]
    InvalidInertia {
        /// Offending body.
        body: String,
    },

    /// A joint definition is internally inconsistent.
    #[error("joint '{joint}' is invalid: {reason}")]
    InvalidJoint {
        /// Offending joint.
        joint: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A collision shape has degenerate dimensions.
    #[error("collision shape on '{owner}' is invalid: {reason}")]
    InvalidShape {
        /// Body or terrain object carrying the shape.
        owner: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A sensor definition is unusable.
    #[error("sensor '{sensor}' is invalid: {reason}")]
    InvalidSensor {
        /// Offending sensor.
        sensor: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A contact, constraint, or solver parameter is out of range.
    #[error("parameter '{name}' = {value} is out of range: {expected}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Human-readable accepted range.
        expected: &'static str,
    },

    /// A robot with this name already exists in the engine.
    #[error("robot '{0}' is already registered")]
    DuplicateRobot(String),
}

/// Programming errors in how the engine is driven.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MisuseError {
    /// `simulate` was called before `initialize`.
    #[error("simulate called before initialize")]
    NotInitialized,

    /// The time step was zero, negative, or not finite.
    #[error("invalid time step: {0} (must be positive and finite)")]
    InvalidTimeStep(f64),

    /// A robot handle does not belong to this engine.
    #[error("unknown robot handle {0}")]
    UnknownRobot(usize),
}

/// Top-level error returned by the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Invalid input at add or set time.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Invalid engine usage.
    #[error(transparent)]
    Misuse(#[from] MisuseError),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;

/// Tick-local quality loss that the engine recovered from.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    /// An effective-mass matrix was singular or ill-conditioned and was regularized.
    NumericalInstability {
        /// Index of the collision group in this tick, or `None` for a lone robot.
        group: Option<usize>,
        /// Smallest pivot seen before regularization.
        pivot: f64,
    },

    /// The iterative impulse solver hit its iteration cap.
    Nonconvergence {
        /// Index of the collision group in this tick.
        group: usize,
        /// Iterations performed.
        iterations: usize,
        /// Largest impulse update in the last iteration.
        residual: f64,
    },
}
