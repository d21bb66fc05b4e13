//! The linear arithmetic theory solver.
//!
//! Atoms `c <= Σ a_i x_i` are mapped onto bounds of one simplex variable:
//! either an original variable (single-variable atoms, after dividing by
//! the coefficient) or a slack variable shared by every atom over the same
//! sum up to sign. Each atom owns two bounds, one per literal polarity, so
//! asserting a literal is a single bound update.
//!
//! Integer variables are handled by branch and bound: a complete check
//! that finds a fractional integer variable asks the engine to split on a
//! fresh pair of atoms.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use lasmt_core::{
    ArithVar, CoreError, CoreResult, Inequality, LinearTerm, Literal, Sort, TheoryPropagation,
    TheoryResult, TheorySolver, Variable,
};

use crate::bounds::{Bound, BoundKind, BoundRef, BoundStore};
use crate::delta::DeltaRational;
use crate::interpolation::{
    interpolate, FarkasTerm, Interpolant, InterpolationStrategy, LinearConstraint,
};
use crate::simplex::{Explanation, Simplex};

/// Protocol state of the solver.
///
/// Transitions are functions returning the next state; calling one from a
/// state where the operation is illegal is a caller bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaStatus {
    /// Nothing asserted or checked yet.
    #[default]
    Init,
    /// Asserted bounds are feasible as far as known.
    Sat,
    /// Asserted bounds are infeasible; an explanation is available.
    Unsat,
    /// Feasible over the reals but a split was requested.
    NewSplit,
}

impl LaStatus {
    /// Leave [`LaStatus::Init`].
    pub fn initialized(self) -> Self {
        assert_eq!(self, LaStatus::Init, "solver initialised twice");
        LaStatus::Sat
    }

    /// State after asserting a bound.
    pub fn asserted(self, feasible: bool) -> Self {
        match self {
            LaStatus::Init => panic!("assertion before initialisation"),
            LaStatus::Unsat => panic!("assertion while infeasible; backtrack first"),
            LaStatus::Sat | LaStatus::NewSplit => {
                if feasible {
                    LaStatus::Sat
                } else {
                    LaStatus::Unsat
                }
            }
        }
    }

    /// State after a consistency check.
    pub fn checked(self, feasible: bool) -> Self {
        match self {
            LaStatus::Init => panic!("check before initialisation"),
            LaStatus::Unsat => LaStatus::Unsat,
            LaStatus::Sat | LaStatus::NewSplit => {
                if feasible {
                    LaStatus::Sat
                } else {
                    LaStatus::Unsat
                }
            }
        }
    }

    /// State after requesting a split.
    pub fn split(self) -> Self {
        assert_eq!(self, LaStatus::Sat, "split requested from {self:?}");
        LaStatus::NewSplit
    }

    /// State after popping backtrack points.
    pub fn backtracked(self) -> Self {
        match self {
            LaStatus::Init => LaStatus::Init,
            _ => LaStatus::Sat,
        }
    }
}

/// Counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaStats {
    /// Literals asserted
    pub assertions: u64,
    /// Consistency checks
    pub checks: u64,
    /// Literals deduced from bound ordering
    pub deductions: u64,
    /// Branch-and-bound splits requested
    pub splits: u64,
    /// Conflicts reported
    pub conflicts: u64,
}

#[derive(Debug, Clone)]
struct Column {
    /// Definition over arithmetic variables
    term: LinearTerm,
    is_int: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomKind {
    Trivial(bool),
    Bounds { pos: BoundRef, neg: BoundRef },
}

#[derive(Debug, Clone)]
struct Atom {
    ineq: Inequality,
    kind: AtomKind,
    partition: u64,
}

/// Bounds for the two polarities of an atom on a simplex variable.
///
/// `direction` says whether the atom reads `s >= d` ([`BoundKind::Lower`])
/// or `s <= d` ([`BoundKind::Upper`]).
fn bound_pair(
    direction: BoundKind,
    d: BigRational,
    is_int: bool,
) -> ((BoundKind, DeltaRational), (BoundKind, DeltaRational)) {
    let one = BigRational::one();
    match (direction, is_int) {
        (BoundKind::Lower, false) => (
            (BoundKind::Lower, DeltaRational::from_real(d.clone())),
            (BoundKind::Upper, DeltaRational::minus_delta(d)),
        ),
        (BoundKind::Lower, true) => {
            let c = d.ceil();
            (
                (BoundKind::Lower, DeltaRational::from_real(c.clone())),
                (BoundKind::Upper, DeltaRational::from_real(c - one)),
            )
        }
        (BoundKind::Upper, false) => (
            (BoundKind::Upper, DeltaRational::from_real(d.clone())),
            (BoundKind::Lower, DeltaRational::plus_delta(d)),
        ),
        (BoundKind::Upper, true) => {
            let f = d.floor();
            (
                (BoundKind::Upper, DeltaRational::from_real(f.clone())),
                (BoundKind::Lower, DeltaRational::from_real(f + one)),
            )
        }
    }
}

/// Incremental linear arithmetic solver over the rationals and integers.
#[derive(Debug, Default)]
pub struct LaSolver {
    status: LaStatus,
    simplex: Simplex,
    bounds: BoundStore,
    /// Indexed by simplex variable
    columns: Vec<Column>,
    /// Simplex variable of each arithmetic variable
    arith: Vec<usize>,
    sorts: Vec<Sort>,
    /// Slack variable per canonical sum
    slacks: FxHashMap<LinearTerm, usize>,
    atoms: FxHashMap<Variable, Atom>,
    /// Known truth value of atoms, asserted or deduced
    polarity: FxHashMap<Variable, bool>,
    polarity_trail: Vec<Variable>,
    polarity_limits: Vec<usize>,
    deductions: Vec<TheoryPropagation>,
    /// Last conflict with Farkas coefficients
    explanation: Vec<(Literal, BigRational)>,
    pending_splits: Vec<(ArithVar, BigInt)>,
    model: FxHashMap<ArithVar, BigRational>,
    stats: LaStats,
}

impl LaSolver {
    /// Empty solver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arithmetic variable.
    pub fn new_var(&mut self, sort: Sort) -> ArithVar {
        let av = ArithVar(self.arith.len() as u32);
        let s = self.simplex.new_var();
        debug_assert_eq!(s, self.columns.len());
        self.columns.push(Column {
            term: LinearTerm::var(av),
            is_int: sort == Sort::Int,
        });
        self.arith.push(s);
        self.sorts.push(sort);
        av
    }

    /// Number of arithmetic variables.
    pub fn num_arith_vars(&self) -> usize {
        self.arith.len()
    }

    /// Sort of `av`, if it exists.
    pub fn sort(&self, av: ArithVar) -> Option<Sort> {
        self.sorts.get(av.index()).copied()
    }

    /// Current protocol state.
    pub fn status(&self) -> LaStatus {
        self.status
    }

    /// Counters.
    pub fn stats(&self) -> &LaStats {
        &self.stats
    }

    /// Bind Boolean `var` to `ineq`. Atoms belong to no interpolation
    /// partition, i.e. they count as B.
    pub fn declare_atom(&mut self, var: Variable, ineq: Inequality) -> CoreResult<()> {
        self.declare_atom_in_partition(var, ineq, 0)
    }

    /// Bind Boolean `var` to `ineq`, tagging it with the partitions in
    /// `mask`. Redeclaring the same atom merges the masks.
    pub fn declare_atom_in_partition(
        &mut self,
        var: Variable,
        ineq: Inequality,
        mask: u64,
    ) -> CoreResult<()> {
        if let Some(atom) = self.atoms.get_mut(&var) {
            if atom.ineq != ineq {
                return Err(CoreError::ConflictingAtom(var));
            }
            atom.partition |= mask;
            return Ok(());
        }
        if let Some((av, _)) = ineq
            .term
            .coeffs()
            .iter()
            .find(|(av, _)| av.index() >= self.arith.len())
        {
            return Err(CoreError::UnknownArithVar(*av));
        }
        self.register_atom(var, ineq, mask);
        Ok(())
    }

    /// The inequality bound to `var`.
    pub fn atom(&self, var: Variable) -> Option<&Inequality> {
        self.atoms.get(&var).map(|a| &a.ineq)
    }

    /// Number of declared atoms.
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// Sorts of all arithmetic variables, by index.
    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    /// Every declared atom, ordered by Boolean variable.
    pub fn atom_definitions(&self) -> Vec<(Variable, Inequality)> {
        let mut atoms: Vec<_> = self
            .atoms
            .iter()
            .map(|(&var, atom)| (var, atom.ineq.clone()))
            .collect();
        atoms.sort_unstable_by_key(|(var, _)| *var);
        atoms
    }

    /// The bounds asserted by the positive and negative literal of `var`.
    pub fn bounds_of(&self, var: Variable) -> Option<(&Bound, &Bound)> {
        match self.atoms.get(&var)?.kind {
            AtomKind::Trivial(_) => None,
            AtomKind::Bounds { pos, neg } => Some((self.bounds.get(pos), self.bounds.get(neg))),
        }
    }

    /// Literals and Farkas coefficients of the last conflict.
    pub fn explanation(&self) -> &[(Literal, BigRational)] {
        &self.explanation
    }

    /// Value of `av` in the last computed model.
    pub fn model_value(&self, av: ArithVar) -> Option<&BigRational> {
        self.model.get(&av)
    }

    /// The last computed model.
    pub fn model(&self) -> &FxHashMap<ArithVar, BigRational> {
        &self.model
    }

    fn register_atom(&mut self, var: Variable, ineq: Inequality, partition: u64) {
        let kind = match ineq.trivial_value() {
            Some(value) => AtomKind::Trivial(value),
            None => {
                let (s, direction, d) = self.canonical(&ineq);
                let ((pk, pv), (nk, nv)) = bound_pair(direction, d, self.columns[s].is_int);
                let pos = self.bounds.add(s, pk, pv, Literal::positive(var));
                let neg = self.bounds.add(s, nk, nv, Literal::negative(var));
                AtomKind::Bounds { pos, neg }
            }
        };
        trace!(?var, %ineq, ?kind, "atom");
        self.atoms.insert(
            var,
            Atom {
                ineq,
                kind,
                partition,
            },
        );
    }

    /// Simplex variable, direction and constant equivalent to `ineq`.
    fn canonical(&mut self, ineq: &Inequality) -> (usize, BoundKind, BigRational) {
        if let [(av, k)] = ineq.term.coeffs() {
            let direction = if k.is_positive() {
                BoundKind::Lower
            } else {
                BoundKind::Upper
            };
            return (self.arith[av.index()], direction, &ineq.constant / k);
        }
        if ineq.term.leading_positive() {
            let s = self.slack_for(ineq.term.clone());
            (s, BoundKind::Lower, ineq.constant.clone())
        } else {
            let s = self.slack_for(ineq.term.negated());
            (s, BoundKind::Upper, -&ineq.constant)
        }
    }

    fn slack_for(&mut self, term: LinearTerm) -> usize {
        if let Some(&s) = self.slacks.get(&term) {
            return s;
        }
        let row: Vec<(usize, BigRational)> = term
            .coeffs()
            .iter()
            .map(|(av, c)| (self.arith[av.index()], c.clone()))
            .collect();
        let s = self.simplex.add_row(&row);
        debug_assert_eq!(s, self.columns.len());
        let is_int = term.has_integer_coeffs()
            && term
                .coeffs()
                .iter()
                .all(|(av, _)| self.sorts[av.index()] == Sort::Int);
        self.columns.push(Column {
            term: term.clone(),
            is_int,
        });
        self.slacks.insert(term, s);
        s
    }

    fn record_polarity(&mut self, var: Variable, value: bool) {
        self.polarity.insert(var, value);
        self.polarity_trail.push(var);
    }

    fn activate(&mut self, r: BoundRef) -> Result<(), Explanation> {
        let bound = self.bounds.get(r);
        let (var, value) = (bound.var, bound.value.clone());
        match bound.kind {
            BoundKind::Lower => self.simplex.assert_lower(var, value, r),
            BoundKind::Upper => self.simplex.assert_upper(var, value, r),
        }
    }

    /// Queue every unassigned atom literal implied by the bound `r`.
    fn deduce_from(&mut self, r: BoundRef) {
        let reason = self.bounds.get(r).literal;
        for implied in self.bounds.implied_by(r) {
            let lit = self.bounds.get(implied).literal;
            let var = lit.variable();
            if self.polarity.contains_key(&var) {
                continue;
            }
            self.record_polarity(var, lit.is_positive());
            self.stats.deductions += 1;
            self.deductions.push(TheoryPropagation {
                literal: lit,
                reason: vec![reason],
            });
        }
    }

    fn conflict(&mut self, explanation: Explanation) -> TheoryResult {
        self.stats.conflicts += 1;
        self.explanation = explanation
            .into_iter()
            .map(|(r, c)| (self.bounds.get(r).literal, c))
            .collect();
        trace!(explanation = ?self.explanation, "arithmetic conflict");
        TheoryResult::Unsat(self.explanation.iter().map(|(l, _)| *l).collect())
    }

    /// Complete check for integer variables: request a split on the integer
    /// variable whose value is farthest from an integer.
    fn check_integers_and_split(&mut self) -> TheoryResult {
        let delta = self.simplex.compute_delta();
        let one = BigRational::one();
        let mut max = BigRational::zero();
        let mut best: Option<(ArithVar, BigInt)> = None;
        for (i, &s) in self.arith.iter().enumerate() {
            if self.sorts[i] != Sort::Int {
                continue;
            }
            let value = self.simplex.value(s).value_at(&delta);
            if value.is_integer() {
                continue;
            }
            let floor = value.floor();
            let distance = (&value - &floor).min(&floor + &one - &value);
            if distance > max {
                max = distance;
                best = Some((ArithVar(i as u32), floor.to_integer()));
            }
        }
        match best {
            None => TheoryResult::Sat,
            Some((av, floor)) => {
                debug!(%av, %floor, "branch and bound split");
                self.stats.splits += 1;
                self.pending_splits.push((av, floor));
                self.status = self.status.split();
                TheoryResult::NewSplit
            }
        }
    }

    fn literal_constraint(&self, lit: Literal) -> Option<LinearConstraint> {
        let atom = self.atoms.get(&lit.variable())?;
        match atom.kind {
            AtomKind::Trivial(_) => {
                let c = &atom.ineq.constant;
                Some(if lit.is_positive() {
                    LinearConstraint::le(LinearTerm::default(), -c)
                } else {
                    LinearConstraint::lt(LinearTerm::default(), c.clone())
                })
            }
            AtomKind::Bounds { pos, neg } => {
                let bound = self.bounds.get(if lit.is_positive() { pos } else { neg });
                let term = &self.columns[bound.var].term;
                let value = &bound.value;
                Some(match bound.kind {
                    BoundKind::Upper => LinearConstraint {
                        term: term.clone(),
                        bound: value.real().clone(),
                        strict: value.delta().is_negative(),
                    },
                    BoundKind::Lower => LinearConstraint {
                        term: term.negated(),
                        bound: -value.real(),
                        strict: value.delta().is_positive(),
                    },
                })
            }
        }
    }

    /// Interpolant of the last conflict. Atoms whose partition mask meets
    /// `a_mask` form the A side, all others the B side.
    pub fn interpolant(&self, a_mask: u64, strategy: &InterpolationStrategy) -> Option<Interpolant> {
        if self.explanation.is_empty() {
            return None;
        }
        let terms = self
            .explanation
            .iter()
            .map(|(lit, coeff)| {
                let atom = self.atoms.get(&lit.variable())?;
                Some(FarkasTerm {
                    constraint: self.literal_constraint(*lit)?,
                    coeff: coeff.clone(),
                    in_a: atom.partition & a_mask != 0,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(interpolate(&terms, strategy))
    }

    /// [`LaSolver::interpolant`] tightened for integer variables.
    pub fn integer_interpolant(
        &self,
        a_mask: u64,
        strategy: &InterpolationStrategy,
    ) -> Option<Interpolant> {
        self.interpolant(a_mask, strategy)
            .map(|i| i.tightened_for_integers())
    }
}

impl TheorySolver for LaSolver {
    fn is_theory_var(&self, var: Variable) -> bool {
        self.atoms.contains_key(&var)
    }

    fn assert_literal(&mut self, lit: Literal) -> TheoryResult {
        let var = lit.variable();
        let Some(kind) = self.atoms.get(&var).map(|a| a.kind) else {
            panic!("literal {lit} is not an arithmetic atom");
        };
        if self.status == LaStatus::Init {
            self.status = self.status.initialized();
        }
        self.stats.assertions += 1;
        let r = match kind {
            AtomKind::Trivial(value) => {
                let feasible = value == lit.is_positive();
                self.status = self.status.asserted(feasible);
                if feasible {
                    return TheoryResult::Sat;
                }
                self.stats.conflicts += 1;
                self.explanation = vec![(lit, BigRational::one())];
                return TheoryResult::Unsat(vec![lit]);
            }
            AtomKind::Bounds { pos, neg } => {
                if lit.is_positive() {
                    pos
                } else {
                    neg
                }
            }
        };
        match self.polarity.get(&var) {
            Some(&known) if known == lit.is_positive() => {
                self.status = self.status.asserted(true);
                return TheoryResult::Sat;
            }
            Some(_) => {}
            None => self.record_polarity(var, lit.is_positive()),
        }
        match self.activate(r) {
            Ok(()) => {
                self.status = self.status.asserted(true);
                self.deduce_from(r);
                TheoryResult::Sat
            }
            Err(explanation) => {
                self.status = self.status.asserted(false);
                self.conflict(explanation)
            }
        }
    }

    fn check(&mut self, complete: bool) -> TheoryResult {
        if self.status == LaStatus::Init {
            self.status = self.status.initialized();
        }
        self.stats.checks += 1;
        if self.status == LaStatus::Unsat {
            return TheoryResult::Unsat(self.explanation.iter().map(|(l, _)| *l).collect());
        }
        match self.simplex.check() {
            Err(explanation) => {
                self.status = self.status.checked(false);
                self.conflict(explanation)
            }
            Ok(()) => {
                self.status = self.status.checked(true);
                if complete {
                    self.check_integers_and_split()
                } else {
                    TheoryResult::Sat
                }
            }
        }
    }

    fn take_deductions(&mut self) -> Vec<TheoryPropagation> {
        std::mem::take(&mut self.deductions)
    }

    fn take_splits(&mut self, fresh: &mut dyn FnMut() -> Variable) -> Vec<Vec<Literal>> {
        let pending = std::mem::take(&mut self.pending_splits);
        let mut clauses = Vec::with_capacity(pending.len());
        for (av, floor) in pending {
            let term = LinearTerm::var(av);
            let floor = BigRational::from(floor);
            let below = fresh();
            let above = fresh();
            self.register_atom(below, Inequality::le(term.clone(), floor.clone()), 0);
            self.register_atom(above, Inequality::ge(term, floor + BigRational::one()), 0);
            clauses.push(vec![Literal::positive(below), Literal::positive(above)]);
        }
        clauses
    }

    fn push_backtrack_point(&mut self) {
        self.simplex.push();
        self.polarity_limits.push(self.polarity_trail.len());
    }

    fn pop_backtrack_points(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.simplex.pop(n);
        let keep = self.polarity_limits.len() - n;
        let target = self.polarity_limits[keep];
        self.polarity_limits.truncate(keep);
        for var in self.polarity_trail.drain(target..) {
            self.polarity.remove(&var);
        }
        self.deductions.clear();
        self.pending_splits.clear();
        self.status = self.status.backtracked();
    }

    fn compute_model(&mut self) {
        debug_assert_eq!(self.status, LaStatus::Sat);
        let delta = self.simplex.compute_delta();
        self.model = self
            .arith
            .iter()
            .enumerate()
            .map(|(i, &s)| (ArithVar(i as u32), self.simplex.value(s).value_at(&delta)))
            .collect();
        debug!(vars = self.model.len(), %delta, "arithmetic model");
    }

    fn suggest_polarity(&self, var: Variable) -> Option<bool> {
        match self.atoms.get(&var)?.kind {
            AtomKind::Trivial(value) => Some(value),
            AtomKind::Bounds { pos, .. } => {
                let bound = self.bounds.get(pos);
                let value = self.simplex.value(bound.var);
                Some(match bound.kind {
                    BoundKind::Lower => *value >= bound.value,
                    BoundKind::Upper => *value <= bound.value,
                })
            }
        }
    }
}
