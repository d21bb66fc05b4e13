//! Conflict analysis: first-UIP learning and final-conflict extraction.

use lasmt_core::{Literal, TheorySolver};

use crate::solver::{Reason, Solver};

/// A learned clause with its asserting level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConflictResult {
    /// Learned clause; position 0 is the asserting (UIP) literal and
    /// position 1 a literal of the backtrack level.
    pub learned: Vec<Literal>,
    /// Level to backjump to.
    pub backtrack_level: u32,
}

impl<T: TheorySolver> Solver<T> {
    /// Resolve `conflict` (a clause falsified by the trail) back to the first
    /// unique implication point of the current level.
    ///
    /// The trail is walked from its end, so among current-level literals the
    /// most recently assigned one is resolved first.
    pub(crate) fn analyze(&mut self, conflict: &[Literal]) -> ConflictResult {
        let current = self.decision_level();
        let mut learned = vec![Literal(0)];
        let mut path_count = 0usize;
        let mut index = self.trail.len();
        let mut antecedent = conflict.to_vec();

        let uip = loop {
            for &q in &antecedent {
                let var = q.variable();
                let v = var.index();
                if self.seen[v] || self.level[v] == 0 {
                    continue;
                }
                self.seen[v] = true;
                self.vsids.bump(var);
                if self.level[v] >= current {
                    path_count += 1;
                } else {
                    learned.push(q);
                }
            }

            let pivot = loop {
                index -= 1;
                let lit = self.trail[index];
                if self.seen[lit.variable().index()] {
                    break lit;
                }
            };
            self.seen[pivot.variable().index()] = false;
            path_count -= 1;
            if path_count == 0 {
                break pivot;
            }
            if let Reason::Clause(cref) = self.reason[pivot.variable().index()] {
                self.bump_clause_activity(cref);
            }
            antecedent = self.reason_literals(pivot.variable());
        };
        learned[0] = uip.negated();

        // Drop literals whose reason is subsumed by the rest of the clause.
        let marked: Vec<Literal> = learned[1..].to_vec();
        learned.retain(|&l| l == uip.negated() || !self.is_redundant(l));
        for l in marked {
            self.seen[l.variable().index()] = false;
        }

        let backtrack_level = if learned.len() == 1 {
            0
        } else {
            let mut max_i = 1;
            for i in 2..learned.len() {
                if self.level[learned[i].variable().index()]
                    > self.level[learned[max_i].variable().index()]
                {
                    max_i = i;
                }
            }
            learned.swap(1, max_i);
            self.level[learned[1].variable().index()]
        };

        ConflictResult {
            learned,
            backtrack_level,
        }
    }

    /// A learned literal is redundant if every other literal of its reason
    /// is already in the clause or fixed at level 0.
    fn is_redundant(&self, lit: Literal) -> bool {
        let var = lit.variable();
        if self.reason[var.index()] == Reason::Decision {
            return false;
        }
        self.reason_literals(var).iter().all(|q| {
            let v = q.variable().index();
            self.seen[v] || self.level[v] == 0
        })
    }

    /// Failed assumptions responsible for the assumption `p` being false.
    ///
    /// Walks the trail above level 0 and collects the decisions (which are
    /// all assumptions at this point) that `!p` depends on.
    pub(crate) fn analyze_final(&mut self, p: Literal) -> Vec<Literal> {
        let mut core = vec![p];
        if self.decision_level() == 0 {
            return core;
        }
        self.seen[p.variable().index()] = true;
        let start = self.trail_lim[0];
        for i in (start..self.trail.len()).rev() {
            let lit = self.trail[i];
            let v = lit.variable().index();
            if !self.seen[v] {
                continue;
            }
            if self.reason[v] == Reason::Decision {
                core.push(lit);
            } else {
                for q in self.reason_literals(lit.variable()) {
                    if self.level[q.variable().index()] > 0 {
                        self.seen[q.variable().index()] = true;
                    }
                }
            }
            self.seen[v] = false;
        }
        self.seen[p.variable().index()] = false;
        core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasmt_core::Variable;

    fn pos(v: u32) -> Literal {
        Literal::positive(Variable(v))
    }

    fn neg(v: u32) -> Literal {
        Literal::negative(Variable(v))
    }

    #[test]
    fn test_first_uip_learned_clause() {
        // x0@1, x1@2; x1 -> x2, (x0 & x2) -> x3, (x2 & x3) -> conflict
        let mut solver = Solver::new(4);
        solver.add_clause(vec![neg(1), pos(2)]);
        solver.add_clause(vec![neg(0), neg(2), pos(3)]);
        solver.add_clause(vec![neg(2), neg(3)]);

        solver.new_probe_level();
        solver.enqueue(pos(0), Reason::Decision);
        assert!(solver.propagate().is_none());
        solver.new_probe_level();
        solver.enqueue(pos(1), Reason::Decision);
        let conflict = solver.propagate().expect("conflict");
        let lits = solver.clause_db.literals(conflict).to_vec();
        let result = solver.analyze(&lits);

        assert_eq!(result.learned[0], neg(2));
        assert_eq!(result.learned[1..], [neg(0)]);
        assert_eq!(result.backtrack_level, 1);
        assert!(solver.seen.iter().all(|s| !s));
    }

    #[test]
    fn test_analyze_final_collects_assumptions() {
        let mut solver = Solver::new(3);
        solver.add_clause(vec![pos(0), pos(1)]);
        solver.new_probe_level();
        solver.enqueue(neg(0), Reason::Decision);
        assert!(solver.propagate().is_none());
        // the next assumption would be !1, already false
        let core = solver.analyze_final(neg(1));
        assert_eq!(core, vec![neg(1), neg(0)]);
    }
}
