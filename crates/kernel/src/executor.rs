//! Per-index kernel execution backends.
//!
//! Every pipeline stage is written as a pure function of an element index
//! that reads shared input buffers and returns one `f32`. A
//! [`KernelExecutor`] evaluates that function once for every index of a
//! [`DomainLayout`] and materialises the outputs before the next stage runs.

use rayon::prelude::*;

use crate::error::{Result, SimulationError};

/// 2D arrangement of a stage domain.
///
/// Backends address elements as a `cols x rows` grid. The layout is the
/// near-square factorisation of the domain length: `cols` is the largest
/// divisor not exceeding `sqrt(len)` and `rows = len / cols`. Execution
/// requires an even row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLayout {
    len: usize,
    cols: usize,
    rows: usize,
}

impl DomainLayout {
    /// Factor `len` into `(cols, rows)` without validating parity.
    pub fn factor(len: usize) -> (usize, usize) {
        if len == 0 {
            return (0, 0);
        }
        let mut cols = 1;
        let mut d = 1;
        while d * d <= len {
            if len % d == 0 {
                cols = d;
            }
            d += 1;
        }
        (cols, len / cols)
    }

    /// Layout for exactly `len` elements.
    ///
    /// Fails with [`SimulationError::OddDomainRows`] when the factorisation
    /// has an odd row count.
    pub fn new(len: usize) -> Result<Self> {
        let (cols, rows) = Self::factor(len);
        if rows % 2 != 0 {
            return Err(SimulationError::OddDomainRows { len, cols, rows });
        }
        Ok(Self { len, cols, rows })
    }

    /// Smallest valid layout holding at least `len` elements.
    ///
    /// Indices at or beyond `len` are padding lanes.
    pub fn padded(len: usize) -> Self {
        let mut candidate = len;
        loop {
            if let Ok(layout) = Self::new(candidate) {
                return layout;
            }
            candidate += 1;
        }
    }

    /// Total number of lanes (including padding).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return `true` for an empty domain.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grid width.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Grid height (always even).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// `(column, row)` of a flat index.
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.cols, index / self.cols)
    }
}

/// A backend that evaluates a pure per-index function over a domain.
///
/// Implementations must call `kernel` exactly once per index in
/// `0..layout.len()` and return the results in index order. No state may be
/// shared between indices beyond the read-only captures of `kernel`.
pub trait KernelExecutor: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Evaluate `kernel` for every index of `layout`.
    fn dispatch<F>(&self, layout: DomainLayout, kernel: F) -> Vec<f32>
    where
        F: Fn(usize) -> f32 + Sync + Send;
}

/// Single-threaded reference backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl KernelExecutor for SerialExecutor {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn dispatch<F>(&self, layout: DomainLayout, kernel: F) -> Vec<f32>
    where
        F: Fn(usize) -> f32 + Sync + Send,
    {
        (0..layout.len()).map(kernel).collect()
    }
}

/// Data-parallel backend on the global rayon thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor;

impl KernelExecutor for RayonExecutor {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn dispatch<F>(&self, layout: DomainLayout, kernel: F) -> Vec<f32>
    where
        F: Fn(usize) -> f32 + Sync + Send,
    {
        (0..layout.len()).into_par_iter().map(kernel).collect()
    }
}
