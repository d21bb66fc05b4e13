//! Engine/theory contract.
//!
//! The CDCL engine talks to a theory only through this trait: it asserts
//! literals, asks for a consistency check, and mirrors its decision levels
//! with backtrack points. The theory answers with explanations, deductions
//! and split clauses. Neither side inspects the other's internals.

use crate::literal::{Literal, Variable};

/// Outcome of asserting a literal or checking consistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TheoryResult {
    /// Consistent with everything asserted so far.
    Sat,
    /// Inconsistent. Carries the explanation: asserted literals that are
    /// jointly infeasible. The engine learns the negation of this set.
    Unsat(Vec<Literal>),
    /// Consistent over the reals, but the theory wants the engine to branch.
    /// Clauses are collected with [`TheorySolver::take_splits`].
    NewSplit,
}

impl TheoryResult {
    /// True for [`TheoryResult::Unsat`].
    pub fn is_unsat(&self) -> bool {
        matches!(self, TheoryResult::Unsat(_))
    }
}

/// A literal implied by the asserted literals in `reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheoryPropagation {
    /// The implied literal.
    pub literal: Literal,
    /// Asserted literals whose conjunction implies `literal`.
    pub reason: Vec<Literal>,
}

/// A theory solver pluggable into the CDCL(T) search.
///
/// Backtrack points pair 1:1 with engine decision levels: the engine calls
/// [`TheorySolver::push_backtrack_point`] whenever it opens a level and
/// [`TheorySolver::pop_backtrack_points`] with the number of levels it
/// removes.
pub trait TheorySolver {
    /// Whether `var` is a theory atom that must be asserted.
    fn is_theory_var(&self, var: Variable) -> bool;

    /// Assert one polarity of an atom. Asserting a literal the theory already
    /// holds must be a no-op.
    fn assert_literal(&mut self, lit: Literal) -> TheoryResult;

    /// Check consistency of the asserted literals. `complete` is set when the
    /// Boolean assignment is total and the theory must be fully decided.
    fn check(&mut self, complete: bool) -> TheoryResult;

    /// Drain literals deduced since the last call.
    fn take_deductions(&mut self) -> Vec<TheoryPropagation>;

    /// Drain pending split clauses, allocating fresh atom variables from `fresh`.
    fn take_splits(&mut self, fresh: &mut dyn FnMut() -> Variable) -> Vec<Vec<Literal>>;

    /// Open a backtrack point.
    fn push_backtrack_point(&mut self);

    /// Undo the last `n` backtrack points.
    fn pop_backtrack_points(&mut self, n: usize);

    /// Called once the engine reaches a satisfying total assignment,
    /// before it unwinds the trail.
    fn compute_model(&mut self) {}

    /// Preferred polarity for an undecided atom, if the theory has one.
    fn suggest_polarity(&self, _var: Variable) -> Option<bool> {
        None
    }
}

/// The empty theory: pure propositional solving.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTheory;

impl TheorySolver for NoTheory {
    fn is_theory_var(&self, _var: Variable) -> bool {
        false
    }

    fn assert_literal(&mut self, _lit: Literal) -> TheoryResult {
        TheoryResult::Sat
    }

    fn check(&mut self, _complete: bool) -> TheoryResult {
        TheoryResult::Sat
    }

    fn take_deductions(&mut self) -> Vec<TheoryPropagation> {
        Vec::new()
    }

    fn take_splits(&mut self, _fresh: &mut dyn FnMut() -> Variable) -> Vec<Vec<Literal>> {
        Vec::new()
    }

    fn push_backtrack_point(&mut self) {}

    fn pop_backtrack_points(&mut self, _n: usize) {}
}
