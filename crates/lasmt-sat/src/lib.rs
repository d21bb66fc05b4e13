//! lasmt SAT - CDCL(T) search engine
//!
//! The Boolean half of the lasmt solver, generic over a [`TheorySolver`]:
//! - Generation-checked clause arena referenced by handle
//! - Two-watched-literal unit propagation
//! - First-UIP conflict analysis with non-chronological backjumping
//! - VSIDS decisions (ties broken by variable index) and phase saving
//! - Luby restarts and activity-based clause deletion that keeps locked clauses
//! - Assumptions with failed-assumption cores, push/pop scopes
//! - Polled resource budgets (conflicts, propagations, wall clock)
//! - Lookahead branching with round-stamped counts and upper bounds
//! - Scatter and lookahead splits with a DIMACS dump for hand-off
//!
//! [`TheorySolver`]: lasmt_core::TheorySolver

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clause_db;
mod conflict;
pub mod config;
pub mod dimacs;
pub mod lookahead;
pub mod solver;
pub mod split;
pub mod vsids;
pub mod watched;

pub use clause_db::{Clause, ClauseDB, ClauseRef};
pub use config::{luby, ResourceLimit, SatConfig};
pub use dimacs::{parse_str as parse_dimacs, DimacsFormula};
pub use lasmt_core::{CoreError, Literal, Variable};
pub use lookahead::LookaheadScore;
pub use solver::{SolveResult, Solver, SolverStats};
pub use split::{SplitConfig, SplitData, SplitType};
