//! lasmt DPLL(T) - SMT facade
//!
//! Couples the `lasmt-sat` CDCL engine with the `lasmt-lra` simplex solver
//! and exposes the incremental API:
//!
//! - `new_var` / `new_arith_var` / `declare_atom` / `add_clause`
//! - `push_backtrack_point` / `pop_backtrack_points`
//! - `solve(assumptions)` returning sat, unsat or unknown
//! - a [`Model`] on sat; a conflict clause and interpolants on unsat
//! - search-space splits for distributed continuation

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod model;
mod smt;

pub use error::{DpllError, DpllResult};
pub use model::Model;
pub use smt::{SmtConfig, SmtResult, SmtSolver};

pub use lasmt_core::{ArithVar, Inequality, LinearTerm, Literal, Sort, Variable};
pub use lasmt_lra::{Interpolant, InterpolationStrategy, LinearConstraint};
pub use lasmt_sat::{ResourceLimit, SatConfig, SplitConfig, SplitData, SplitType};
