//! Lookahead branching.
//!
//! Each candidate variable is probed in both polarities: the literal is set
//! on a Boolean-only level, propagated, and the number of implied literals
//! counted. Counts are stamped with the probing round that produced them,
//! so values from an earlier round are never trusted.
//!
//! Probing `l` also yields an upper bound for every literal `x` that `l`
//! implies: whatever `x` propagates, `l` propagates as well. A variable
//! whose two upper bounds cannot beat the current best score is skipped
//! without probing.

use lasmt_core::{Literal, TheorySolver, Variable};
use tracing::trace;

use crate::solver::{Reason, Solver};

/// Exact propagation counts of both polarities of a variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ExVal {
    pprops: u32,
    nprops: u32,
    round: u32,
}

/// Upper bound on the propagation count of a literal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UpperBound {
    value: u32,
    round: u32,
}

/// Lookahead score: smaller count first, then larger count.
/// Balanced variables that propagate a lot in both branches rank highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LookaheadScore {
    /// Propagations of the weaker polarity
    pub min: u32,
    /// Propagations of the stronger polarity
    pub max: u32,
}

impl LookaheadScore {
    fn new(a: u32, b: u32) -> Self {
        LookaheadScore {
            min: a.min(b),
            max: a.max(b),
        }
    }
}

/// Round-stamped lookahead counters.
#[derive(Debug, Clone)]
pub(crate) struct LookaheadState {
    round: u32,
    exact: Vec<ExVal>,
    upper: Vec<UpperBound>,
}

impl LookaheadState {
    pub(crate) fn new(num_vars: usize) -> Self {
        LookaheadState {
            // round 0 is never current, so default entries are stale
            round: 0,
            exact: vec![ExVal::default(); num_vars],
            upper: vec![UpperBound::default(); num_vars * 2],
        }
    }

    pub(crate) fn ensure_num_vars(&mut self, num_vars: usize) {
        if self.exact.len() < num_vars {
            self.exact.resize(num_vars, ExVal::default());
            self.upper.resize(num_vars * 2, UpperBound::default());
        }
    }

    fn next_round(&mut self) {
        self.round += 1;
    }

    fn set_exact(&mut self, var: Variable, pprops: u32, nprops: u32) {
        self.exact[var.index()] = ExVal {
            pprops,
            nprops,
            round: self.round,
        };
    }

    /// Exact counts of `var`, if computed in the current round.
    fn exact(&self, var: Variable) -> Option<(u32, u32)> {
        let e = self.exact[var.index()];
        (e.round == self.round).then_some((e.pprops, e.nprops))
    }

    fn tighten_upper(&mut self, lit: Literal, value: u32) {
        let ub = &mut self.upper[lit.index()];
        if ub.round != self.round || value < ub.value {
            *ub = UpperBound {
                value,
                round: self.round,
            };
        }
    }

    fn upper(&self, lit: Literal) -> Option<u32> {
        let ub = self.upper[lit.index()];
        (ub.round == self.round).then_some(ub.value)
    }

    /// True if `var` provably cannot beat `best`.
    fn safe_to_skip(&self, var: Variable, best: LookaheadScore) -> bool {
        match (
            self.upper(Literal::positive(var)),
            self.upper(Literal::negative(var)),
        ) {
            (Some(p), Some(n)) => LookaheadScore::new(p, n) <= best,
            _ => false,
        }
    }
}

impl<T: TheorySolver> Solver<T> {
    /// Propagate `lit` on a probe level and undo. `None` if `lit` fails.
    fn probe(&mut self, lit: Literal) -> Option<u32> {
        let base = self.decision_level();
        let start = self.trail.len();
        self.stats.lookahead_probes += 1;
        self.new_probe_level();
        self.enqueue(lit, Reason::Decision);
        let conflict = self.propagate();
        let count = (self.trail.len() - start) as u32;
        if conflict.is_none() {
            for i in start + 1..self.trail.len() {
                let implied = self.trail[i];
                self.lookahead.tighten_upper(implied, count);
            }
        }
        self.undo_to(base, false);
        conflict.map_or(Some(count), |_| None)
    }

    /// Best branching literal by lookahead, or `None` if every variable is
    /// assigned. A failed literal yields its negation.
    pub fn lookahead_best(&mut self) -> Option<Literal> {
        self.lookahead.next_round();
        let mut best: Option<(LookaheadScore, Variable)> = None;

        for v in 0..self.num_vars as u32 {
            let var = Variable(v);
            if self.assignment[var.index()].is_some() {
                continue;
            }
            if let Some((score, _)) = best {
                if self.lookahead.safe_to_skip(var, score) {
                    self.stats.lookahead_skipped += 1;
                    continue;
                }
            }
            let Some(p) = self.probe(Literal::positive(var)) else {
                trace!(?var, "failed literal");
                return Some(Literal::negative(var));
            };
            let Some(n) = self.probe(Literal::negative(var)) else {
                trace!(?var, "failed literal");
                return Some(Literal::positive(var));
            };
            self.lookahead.set_exact(var, p, n);
            let score = LookaheadScore::new(p, n);
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, var));
            }
        }

        let (_, var) = best?;
        let (p, n) = self.lookahead.exact(var)?;
        // stronger branch first
        Some(Literal::new(var, p >= n))
    }

    /// Lookahead decision for the search loop. Equal counts fall back to
    /// the usual phase choice.
    pub(crate) fn lookahead_decision(&mut self) -> Option<Literal> {
        let lit = self.lookahead_best()?;
        let var = lit.variable();
        match self.lookahead.exact(var) {
            Some((p, n)) if p == n => Some(Literal::new(var, self.pick_phase(var))),
            _ => Some(lit),
        }
    }

    /// Partition the search space into cubes by recursive lookahead
    /// branching, `depth` literals deep. Refuted branches are dropped.
    pub fn lookahead_cubes(&mut self, depth: u32) -> Vec<Vec<Literal>> {
        self.backtrack(0);
        if !self.ok || self.propagate().is_some() {
            self.ok = false;
            return Vec::new();
        }
        let mut cubes = Vec::new();
        let mut prefix = Vec::new();
        self.cube_rec(depth, &mut prefix, &mut cubes);
        cubes
    }

    fn cube_rec(&mut self, depth: u32, prefix: &mut Vec<Literal>, cubes: &mut Vec<Vec<Literal>>) {
        let best = if depth == 0 {
            None
        } else {
            self.lookahead_best()
        };
        let Some(lit) = best else {
            cubes.push(prefix.clone());
            return;
        };
        for branch in [lit, lit.negated()] {
            let base = self.decision_level();
            self.new_probe_level();
            self.enqueue(branch, Reason::Decision);
            if self.propagate().is_none() {
                prefix.push(branch);
                self.cube_rec(depth - 1, prefix, cubes);
                prefix.pop();
            }
            self.undo_to(base, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveResult;

    fn pos(v: u32) -> Literal {
        Literal::positive(Variable(v))
    }

    fn neg(v: u32) -> Literal {
        Literal::negative(Variable(v))
    }

    #[test]
    fn test_stale_rounds_are_ignored() {
        let mut state = LookaheadState::new(2);
        state.next_round();
        state.set_exact(Variable(0), 3, 4);
        state.tighten_upper(pos(1), 2);
        assert_eq!(state.exact(Variable(0)), Some((3, 4)));
        assert_eq!(state.upper(pos(1)), Some(2));
        state.next_round();
        assert_eq!(state.exact(Variable(0)), None);
        assert_eq!(state.upper(pos(1)), None);
    }

    #[test]
    fn test_upper_bound_only_tightens_within_round() {
        let mut state = LookaheadState::new(1);
        state.next_round();
        state.tighten_upper(pos(0), 5);
        state.tighten_upper(pos(0), 7);
        assert_eq!(state.upper(pos(0)), Some(5));
        state.next_round();
        state.tighten_upper(pos(0), 7);
        assert_eq!(state.upper(pos(0)), Some(7));
    }

    #[test]
    fn test_failed_literal_negated() {
        // x0 -> x1, x0 -> !x1: x0 fails
        let mut solver = Solver::new(3);
        solver.add_clause(vec![neg(0), pos(1)]);
        solver.add_clause(vec![neg(0), neg(1)]);
        assert_eq!(solver.lookahead_best(), Some(neg(0)));
        assert_eq!(solver.decision_level(), 0);
    }

    #[test]
    fn test_prefers_propagating_variable() {
        // x2 implies x3 and x4 in both polarities through a chain
        let mut solver = Solver::new(5);
        solver.add_clause(vec![neg(2), pos(3)]);
        solver.add_clause(vec![pos(2), pos(4)]);
        solver.add_clause(vec![neg(3), pos(0)]);
        let best = solver.lookahead_best().expect("unassigned variables");
        assert_eq!(best.variable(), Variable(2));
    }

    #[test]
    fn test_cubes_partition_models() {
        let mut solver = Solver::new(4);
        solver.add_clause(vec![pos(0), pos(1)]);
        solver.add_clause(vec![neg(0), pos(2)]);
        solver.add_clause(vec![neg(1), pos(3)]);
        let cubes = solver.lookahead_cubes(2);
        assert!(!cubes.is_empty());
        let mut sat_cubes = 0;
        for cube in &cubes {
            if solver.solve_with_assumptions(cube).is_sat() {
                sat_cubes += 1;
            }
        }
        assert!(sat_cubes >= 1);
        assert!(solver.solve().is_sat());
    }

    #[test]
    fn test_lookahead_search_is_sound() {
        let clauses = vec![
            vec![pos(0), pos(1), pos(2)],
            vec![neg(0), neg(1)],
            vec![neg(1), neg(2)],
            vec![neg(0), neg(2)],
            vec![pos(3), pos(0)],
        ];
        let mut solver = Solver::new(4);
        solver.set_lookahead(true);
        for c in &clauses {
            solver.add_clause(c.clone());
        }
        match solver.solve() {
            SolveResult::Sat(model) => {
                for c in &clauses {
                    assert!(c.iter().any(|l| model[l.variable().index()] == l.is_positive()));
                }
            }
            other => panic!("expected SAT, got {other:?}"),
        }
    }
}
