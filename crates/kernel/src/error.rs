//! Error types for the PBF kernel.

use thiserror::Error;

/// Errors raised by state-precondition violations.
///
/// Numerical edge cases inside the solver (zero neighbours, overlapping
/// particles) never surface here; they are absorbed by the formulas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A stepping or update call was made before `initialize`.
    #[error("simulation not initialized: call `initialize` first")]
    NotInitialized,

    /// A boundary update changed the number of polygons.
    #[error("boundary update must keep {expected} polygons, got {actual}")]
    InvalidBoundsChange {
        /// Polygon count fixed at initialization.
        expected: usize,
        /// Polygon count of the rejected update.
        actual: usize,
    },

    /// A stage domain does not factor into a layout with an even row count.
    #[error("domain of {len} elements lays out as {cols}x{rows}; row count must be even")]
    OddDomainRows {
        /// Requested domain length.
        len: usize,
        /// Layout width.
        cols: usize,
        /// Layout height (odd).
        rows: usize,
    },

    /// A stage buffer does not have the length its key requires.
    #[error("buffer {key} holds {actual} lanes, stage layout needs {expected}")]
    BufferSize {
        /// Buffer name.
        key: &'static str,
        /// Lanes required by the padded stage layout.
        expected: usize,
        /// Lanes allocated.
        actual: usize,
    },

    /// The initial position source produced the wrong number of positions.
    #[error("position source produced {actual} positions, expected {expected}")]
    PositionCount {
        /// Declared particle count.
        expected: usize,
        /// Positions actually produced.
        actual: usize,
    },

    /// A solver parameter or initialization argument is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Convenience alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, SimulationError>;
