//! lasmt LRA - linear arithmetic theory solver
//!
//! A general simplex over delta-rationals, coupled to the CDCL engine
//! through [`lasmt_core::TheorySolver`].
//!
//! ## Overview
//!
//! 1. Every atom `c <= Σ a_i x_i` becomes a pair of bounds on one simplex
//!    variable, one bound per literal polarity.
//! 2. Asserting a literal tightens one bound; bounds implied by the new one
//!    are reported as deductions.
//! 3. A check repairs the assignment with Bland's rule, or returns the
//!    bounds of an infeasible row as a Farkas explanation.
//! 4. Complete checks on integer variables request branch-and-bound
//!    splits on fresh atoms.
//! 5. Explanations can be turned into interpolants for an A/B partition.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::type_complexity)]

pub mod bounds;
pub mod delta;
pub mod interpolation;
pub mod simplex;
mod solver;

pub use bounds::{Bound, BoundKind, BoundRef, BoundStore};
pub use delta::DeltaRational;
pub use interpolation::{
    interpolate, FarkasTerm, Interpolant, InterpolationStrategy, LinearConstraint,
};
pub use simplex::Simplex;
pub use solver::{LaSolver, LaStats, LaStatus};
