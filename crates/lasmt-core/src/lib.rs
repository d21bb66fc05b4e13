//! lasmt core - shared types for the lasmt CDCL(T) solver
//!
//! This crate holds what every other lasmt component agrees on:
//! - Boolean variables and literals (dense indices, polarity bit)
//! - Arithmetic variables, linear terms and normalized inequalities (`c <= t`)
//! - The message contract between the CDCL engine and a theory solver
//! - The error type for caller-caused failures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod linear;
pub mod literal;
pub mod theory;

pub use error::{CoreError, CoreResult};
pub use linear::{ArithVar, Inequality, LinearTerm, Sort};
pub use literal::{Literal, Variable};
pub use theory::{NoTheory, TheoryPropagation, TheoryResult, TheorySolver};
