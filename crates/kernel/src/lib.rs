//! Position-Based Fluids simulation kernel
//!
//! This crate provides the per-frame core of a 2D Position-Based Fluids (PBF)
//! solver: neighbour discovery, fixed-capacity pair packing and the staged
//! constraint pipeline, evaluated through a pluggable per-index backend.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage and initial position sources.
//! - [`neighbor`] -- Uniform-grid spatial hash with forward (`j > i`) queries.
//! - [`packing`] -- Deduplicated pair table, extras and per-particle records.
//! - [`sph`] -- Poly6 / spiky kernels and the pairwise kernel stage.
//! - [`solver`] -- Density constraint multipliers and artificial pressure.
//! - [`corrector`] -- Position correction with obstacle clamping.
//! - [`velocity`] -- Velocity reconstruction with vorticity and viscosity.
//! - [`integrate`] -- Gravity and position prediction.
//! - [`boundary`] -- `ObstacleField` trait and polygon segment obstacles.
//! - [`executor`] -- Per-index execution backends (serial, rayon) and domain layout.
//! - [`buffers`] -- Typed stage buffers keyed by `BufferKey`.
//! - [`simulation`] -- Lifecycle and the solver loop.

#![warn(missing_docs)]

pub mod boundary;
pub mod buffers;
pub mod corrector;
pub mod error;
pub mod executor;
pub mod integrate;
pub mod neighbor;
pub mod packing;
pub mod params;
pub mod particle;
pub mod simulation;
pub mod solver;
pub mod sph;
pub mod velocity;

pub use boundary::{BoundaryPolygon, ObstacleField, SegmentObstacles};
pub use error::{Result, SimulationError};
pub use executor::{DomainLayout, KernelExecutor, RayonExecutor, SerialExecutor};
pub use neighbor::SpatialHash;
pub use packing::{NeighbourRecord, PackWarning, PackedNeighbours};
pub use params::SolverParams;
pub use particle::{GridSource, ParticleArrays, PositionSource};
pub use simulation::{Lifecycle, Simulation, SimulationPhase, SimulationState};
pub use sph::{poly6, spiky_derivative, spiky_gradient, spiky_second_derivative};
