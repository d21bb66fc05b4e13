//! CDCL(T) over linear arithmetic.
//!
//! [`SmtSolver`] owns a CDCL engine coupled to an [`LaSolver`] and exposes
//! the incremental surface: variables, atoms, clauses, backtrack points and
//! solving under assumptions. After each solve it keeps either a [`Model`]
//! or a conflict clause. Splits taken from a solver carry the arithmetic
//! atoms, so [`SmtSolver::from_split`] rebuilds an equivalent instance.

use std::fmt;

use lasmt_core::{ArithVar, CoreError, Inequality, Literal, Sort, Variable};
use lasmt_lra::{Interpolant, InterpolationStrategy, LaSolver, LaStats};
use lasmt_sat::{
    parse_dimacs, ResourceLimit, SatConfig, SolveResult, Solver, SolverStats, SplitConfig,
    SplitData,
};
use tracing::{debug, info};

use crate::error::{DpllError, DpllResult};
use crate::model::Model;

/// Outcome of [`SmtSolver::solve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtResult {
    /// A model is available through [`SmtSolver::model`].
    Sat,
    /// A conflict clause is available through [`SmtSolver::conflict_clause`].
    Unsat,
    /// The resource budget ran out.
    Unknown,
}

impl fmt::Display for SmtResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtResult::Sat => write!(f, "sat"),
            SmtResult::Unsat => write!(f, "unsat"),
            SmtResult::Unknown => write!(f, "unknown"),
        }
    }
}

/// Facade configuration.
#[derive(Debug, Clone, Default)]
pub struct SmtConfig {
    /// Engine configuration
    pub sat: SatConfig,
    /// Strategy used by [`SmtSolver::interpolant`]
    pub interpolation: InterpolationStrategy,
}

/// Incremental SMT solver for quantifier-free linear arithmetic.
pub struct SmtSolver {
    engine: Solver<LaSolver>,
    config: SmtConfig,
    last: Option<SmtResult>,
    model: Option<Model>,
    /// Negated failed assumptions of the last unsat result
    conflict: Vec<Literal>,
}

impl Default for SmtSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver {
    /// Solver with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SmtConfig::default())
    }

    /// Solver with `config`.
    pub fn with_config(config: SmtConfig) -> Self {
        SmtSolver {
            engine: Solver::with_theory(0, LaSolver::new(), config.sat.clone()),
            config,
            last: None,
            model: None,
            conflict: Vec::new(),
        }
    }

    /// Solver holding the residual problem of `split`.
    pub fn from_split(split: &SplitData) -> DpllResult<Self> {
        Self::from_split_with_config(split, SmtConfig::default())
    }

    /// Solver holding the residual problem of `split`, with `config`.
    pub fn from_split_with_config(split: &SplitData, config: SmtConfig) -> DpllResult<Self> {
        let mut smt = Self::with_config(config);
        smt.load(split.num_vars, &split.sorts, &split.atoms, split.clauses())?;
        Ok(smt)
    }

    /// Solver for DIMACS text, including `c sort` and `c atom` lines as
    /// written by [`SplitData::write_dimacs`].
    pub fn from_dimacs(text: &str) -> DpllResult<Self> {
        let formula = parse_dimacs(text)?;
        let mut smt = Self::new();
        smt.load(
            formula.num_vars,
            &formula.sorts,
            &formula.atoms,
            formula.clauses,
        )?;
        Ok(smt)
    }

    fn load<I>(
        &mut self,
        num_vars: usize,
        sorts: &[Sort],
        atoms: &[(Variable, Inequality)],
        clauses: I,
    ) -> DpllResult<()>
    where
        I: IntoIterator<Item = Vec<Literal>>,
    {
        while self.num_vars() < num_vars {
            self.new_var();
        }
        for &sort in sorts {
            self.new_arith_var(sort);
        }
        for (var, ineq) in atoms {
            self.declare_atom(*var, ineq.clone())?;
        }
        for clause in clauses {
            if !self.add_clause(clause)? {
                break;
            }
        }
        debug!(
            vars = num_vars,
            arith = sorts.len(),
            atoms = atoms.len(),
            "loaded instance"
        );
        Ok(())
    }

    /// Fresh Boolean variable.
    pub fn new_var(&mut self) -> Variable {
        self.engine.new_var()
    }

    /// Number of Boolean variables, including internal ones.
    pub fn num_vars(&self) -> usize {
        self.engine.num_vars()
    }

    /// Fresh arithmetic variable of `sort`.
    pub fn new_arith_var(&mut self, sort: Sort) -> ArithVar {
        self.engine.theory_mut().new_var(sort)
    }

    fn check_var(&self, var: Variable) -> DpllResult<()> {
        if var.index() < self.engine.num_vars() {
            Ok(())
        } else {
            Err(CoreError::UnknownVariable(var).into())
        }
    }

    /// Bind `var` to the atom `ineq`.
    pub fn declare_atom(&mut self, var: Variable, ineq: Inequality) -> DpllResult<()> {
        self.declare_atom_in_partition(var, ineq, 0)
    }

    /// Bind `var` to the atom `ineq`, tagged with interpolation partitions.
    pub fn declare_atom_in_partition(
        &mut self,
        var: Variable,
        ineq: Inequality,
        mask: u64,
    ) -> DpllResult<()> {
        self.check_var(var)?;
        self.engine
            .theory_mut()
            .declare_atom_in_partition(var, ineq, mask)?;
        if self.engine.value(Literal::positive(var)).is_some() {
            self.engine.rewind_theory();
        }
        Ok(())
    }

    /// Add a clause. Returns false once the clause set is unsatisfiable.
    pub fn add_clause(&mut self, lits: Vec<Literal>) -> DpllResult<bool> {
        for lit in &lits {
            self.check_var(lit.variable())?;
        }
        Ok(self.engine.add_clause(lits))
    }

    /// Open a backtrack point; clauses added after it are retracted by the
    /// matching pop.
    pub fn push_backtrack_point(&mut self) {
        self.engine.push();
    }

    /// Close the `n` innermost backtrack points.
    pub fn pop_backtrack_points(&mut self, n: usize) -> DpllResult<()> {
        let open = self.engine.scope_depth();
        if n > open {
            return Err(DpllError::ScopeUnderflow { requested: n, open });
        }
        for _ in 0..n {
            self.engine.pop();
        }
        Ok(())
    }

    /// Number of open backtrack points.
    pub fn backtrack_depth(&self) -> usize {
        self.engine.scope_depth()
    }

    /// Limit the work of subsequent solves.
    pub fn set_limits(&mut self, limits: ResourceLimit) {
        self.engine.set_limits(limits);
    }

    /// Decide the clauses under temporary `assumptions`. Learned clauses and
    /// declared atoms persist across calls.
    pub fn solve(&mut self, assumptions: &[Literal]) -> DpllResult<SmtResult> {
        for lit in assumptions {
            self.check_var(lit.variable())?;
        }
        self.model = None;
        self.conflict.clear();
        let result = match self.engine.solve_with_assumptions(assumptions) {
            SolveResult::Sat(bools) => {
                let values = self.engine.theory().model().clone();
                self.model = Some(Model::new(bools, values));
                SmtResult::Sat
            }
            SolveResult::Unsat(failed) => {
                self.conflict = failed.iter().map(|l| l.negated()).collect();
                SmtResult::Unsat
            }
            SolveResult::Unknown => SmtResult::Unknown,
        };
        let theory = self.engine.theory().stats();
        info!(
            %result,
            assumptions = assumptions.len(),
            conflicts = self.engine.stats().conflicts,
            theory_conflicts = theory.conflicts,
            splits = theory.splits,
            "solve finished"
        );
        self.last = Some(result);
        Ok(result)
    }

    /// Result of the last solve.
    pub fn last_result(&self) -> Option<SmtResult> {
        self.last
    }

    /// Model of the last satisfiable solve.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Clause over the negated failed assumptions of the last unsatisfiable
    /// solve; empty when the clauses alone are unsatisfiable.
    pub fn conflict_clause(&self) -> Option<&[Literal]> {
        (self.last == Some(SmtResult::Unsat)).then_some(self.conflict.as_slice())
    }

    fn last_explanation(&self) -> DpllResult<()> {
        if self.last == Some(SmtResult::Unsat) && !self.engine.theory().explanation().is_empty() {
            Ok(())
        } else {
            Err(DpllError::NoConflict)
        }
    }

    /// Interpolant of the last arithmetic conflict with the configured
    /// strategy. `a_mask` selects the partitions forming the A side.
    pub fn interpolant(&self, a_mask: u64) -> DpllResult<Interpolant> {
        self.interpolant_with(a_mask, &self.config.interpolation)
    }

    /// Interpolant of the last arithmetic conflict with `strategy`.
    pub fn interpolant_with(
        &self,
        a_mask: u64,
        strategy: &InterpolationStrategy,
    ) -> DpllResult<Interpolant> {
        self.last_explanation()?;
        self.engine
            .theory()
            .interpolant(a_mask, strategy)
            .ok_or(DpllError::NoConflict)
    }

    /// Integer-tightened interpolant of the last arithmetic conflict.
    pub fn integer_interpolant(
        &self,
        a_mask: u64,
        strategy: &InterpolationStrategy,
    ) -> DpllResult<Interpolant> {
        self.last_explanation()?;
        self.engine
            .theory()
            .integer_interpolant(a_mask, strategy)
            .ok_or(DpllError::NoConflict)
    }

    /// Partition the search space. Every split carries the arithmetic
    /// sorts and atom definitions; load one with [`SmtSolver::from_split`].
    /// An instance refuted at the root, by clauses or by the arithmetic,
    /// yields a single unsatisfiable split.
    pub fn create_splits(&mut self, config: &SplitConfig) -> Vec<SplitData> {
        let mut splits = self.engine.create_splits(config);
        let num_vars = self.engine.num_vars();
        let sorts = self.engine.theory().sorts().to_vec();
        let atoms = self.engine.theory().atom_definitions();
        for split in &mut splits {
            split.num_vars = split.num_vars.max(num_vars);
            split.sorts = sorts.clone();
            split.atoms = atoms.clone();
        }
        debug!(splits = splits.len(), atoms = atoms.len(), "smt splits");
        splits
    }

    /// Engine counters.
    pub fn sat_stats(&self) -> &SolverStats {
        self.engine.stats()
    }

    /// Arithmetic counters.
    pub fn theory_stats(&self) -> &LaStats {
        self.engine.theory().stats()
    }

    /// The inequality bound to `var`, if it is an atom.
    pub fn atom(&self, var: Variable) -> Option<&Inequality> {
        self.engine.theory().atom(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasmt_core::LinearTerm;

    #[test]
    fn test_unknown_variable_rejected() {
        let mut smt = SmtSolver::new();
        let p = smt.new_var();
        assert!(smt.add_clause(vec![Literal::positive(p)]).unwrap());
        assert!(matches!(
            smt.add_clause(vec![Literal::positive(Variable(9))]),
            Err(DpllError::Core(CoreError::UnknownVariable(_)))
        ));
        assert!(smt.solve(&[Literal::negative(Variable(4))]).is_err());
    }

    #[test]
    fn test_pop_underflow() {
        let mut smt = SmtSolver::new();
        smt.push_backtrack_point();
        assert!(matches!(
            smt.pop_backtrack_points(2),
            Err(DpllError::ScopeUnderflow { requested: 2, open: 1 })
        ));
        smt.pop_backtrack_points(1).unwrap();
        assert_eq!(smt.backtrack_depth(), 0);
    }

    #[test]
    fn test_interpolant_requires_unsat() {
        let mut smt = SmtSolver::new();
        let x = smt.new_arith_var(Sort::Real);
        let a = smt.new_var();
        smt.declare_atom(a, Inequality::ge_int(LinearTerm::var(x), 0))
            .unwrap();
        assert!(matches!(smt.interpolant(1), Err(DpllError::NoConflict)));
        assert_eq!(smt.solve(&[]).unwrap(), SmtResult::Sat);
        assert!(matches!(smt.interpolant(1), Err(DpllError::NoConflict)));
        assert!(smt.conflict_clause().is_none());
    }

    #[test]
    fn test_atom_declared_after_root_assignment() {
        let mut smt = SmtSolver::new();
        let x = smt.new_arith_var(Sort::Real);
        let a = smt.new_var();
        let b = smt.new_var();
        smt.add_clause(vec![Literal::positive(a)]).unwrap();
        smt.add_clause(vec![Literal::positive(b)]).unwrap();
        smt.declare_atom(a, Inequality::ge_int(LinearTerm::var(x), 3))
            .unwrap();
        assert_eq!(smt.solve(&[]).unwrap(), SmtResult::Sat);
        smt.declare_atom(b, Inequality::le_int(LinearTerm::var(x), 2))
            .unwrap();
        assert_eq!(smt.solve(&[]).unwrap(), SmtResult::Unsat);
        assert_eq!(smt.conflict_clause(), Some(&[][..]));
    }

    #[test]
    fn test_from_dimacs_rejects_unknown_arith_var() {
        let text = "p cnf 1 1\nc sort 0 Real\nc atom 1 0 <= x3\n1 0\n";
        assert!(matches!(
            SmtSolver::from_dimacs(text),
            Err(DpllError::Core(CoreError::UnknownArithVar(_)))
        ));
        let text = "p cnf 1 1\nc sort 0 Real\nc atom 1 2 <= x0\n1 0\n";
        let mut smt = SmtSolver::from_dimacs(text).unwrap();
        assert_eq!(smt.solve(&[]).unwrap(), SmtResult::Sat);
        let x_ge_2 = Inequality::ge_int(LinearTerm::var(ArithVar(0)), 2);
        assert_eq!(smt.model().unwrap().satisfies(&x_ge_2), Some(true));
    }
}
