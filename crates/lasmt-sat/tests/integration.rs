//! Integration tests for lasmt-sat
//!
//! DIMACS instances, brute-force cross-checks, and incremental use.

use lasmt_sat::{parse_dimacs, Literal, ResourceLimit, SolveResult, Solver, Variable};
use proptest::prelude::*;

fn satisfies(model: &[bool], clauses: &[Vec<Literal>]) -> bool {
    clauses
        .iter()
        .all(|c| c.iter().any(|l| model[l.variable().index()] == l.is_positive()))
}

fn brute_force_sat(num_vars: usize, clauses: &[Vec<Literal>]) -> bool {
    (0u32..1 << num_vars).any(|bits| {
        let model: Vec<bool> = (0..num_vars).map(|v| (bits >> v) & 1 == 1).collect();
        satisfies(&model, clauses)
    })
}

#[test]
fn test_simple_sat() {
    let dimacs = r"
c Simple SAT formula
p cnf 2 3
1 2 0
-1 2 0
1 -2 0
";
    let formula = parse_dimacs(dimacs).expect("Failed to parse DIMACS");
    let clauses = formula.clauses.clone();
    let mut solver = formula.into_solver();
    match solver.solve() {
        SolveResult::Sat(model) => {
            assert!(satisfies(&model, &clauses));
            assert!(model[0] && model[1]);
        }
        other => panic!("expected SAT, got {other:?}"),
    }
}

#[test]
fn test_simple_unsat() {
    let dimacs = r"
c x AND NOT x
p cnf 1 2
1 0
-1 0
";
    let mut solver = parse_dimacs(dimacs).expect("parse").into_solver();
    assert_eq!(solver.solve(), SolveResult::Unsat(vec![]));
}

#[test]
fn test_pigeonhole_5_4_unsat() {
    let pigeons = 5u32;
    let holes = 4u32;
    let var = |i: u32, h: u32| Variable(i * holes + h);
    let mut solver = Solver::new((pigeons * holes) as usize);
    for i in 0..pigeons {
        solver.add_clause((0..holes).map(|h| Literal::positive(var(i, h))).collect());
    }
    for h in 0..holes {
        for i in 0..pigeons {
            for k in (i + 1)..pigeons {
                solver.add_clause(vec![
                    Literal::negative(var(i, h)),
                    Literal::negative(var(k, h)),
                ]);
            }
        }
    }
    assert!(solver.solve().is_unsat());
    assert!(solver.stats().conflicts > 0);
}

#[test]
fn test_incremental_clauses_between_solves() {
    let mut solver = Solver::new(3);
    let x = |v: u32| Literal::positive(Variable(v));
    solver.add_clause(vec![x(0), x(1), x(2)]);
    assert!(solver.solve().is_sat());
    solver.add_clause(vec![!x(0)]);
    solver.add_clause(vec![!x(1)]);
    match solver.solve() {
        SolveResult::Sat(model) => assert!(model[2]),
        other => panic!("expected SAT, got {other:?}"),
    }
    solver.add_clause(vec![!x(2)]);
    assert!(solver.solve().is_unsat());
}

#[test]
fn test_unknown_then_resume() {
    let pigeons = 7u32;
    let holes = 6u32;
    let var = |i: u32, h: u32| Variable(i * holes + h);
    let mut solver = Solver::new((pigeons * holes) as usize);
    for i in 0..pigeons {
        solver.add_clause((0..holes).map(|h| Literal::positive(var(i, h))).collect());
    }
    for h in 0..holes {
        for i in 0..pigeons {
            for k in (i + 1)..pigeons {
                solver.add_clause(vec![
                    Literal::negative(var(i, h)),
                    Literal::negative(var(k, h)),
                ]);
            }
        }
    }
    solver.set_limits(ResourceLimit::conflicts(5));
    assert_eq!(solver.solve(), SolveResult::Unknown);
    assert_eq!(solver.decision_level(), 0);
}

fn arb_cnf() -> impl Strategy<Value = (usize, Vec<Vec<Literal>>)> {
    (1usize..=6).prop_flat_map(|n| {
        let lit = (0..n as u32, any::<bool>()).prop_map(|(v, p)| Literal::new(Variable(v), p));
        let clause = prop::collection::vec(lit, 1..=3);
        (Just(n), prop::collection::vec(clause, 0..20))
    })
}

proptest! {
    /// SAT answers come with a model; UNSAT agrees with exhaustive search.
    #[test]
    fn prop_agrees_with_brute_force((n, clauses) in arb_cnf()) {
        let mut solver = Solver::new(n);
        for c in &clauses {
            solver.add_clause(c.clone());
        }
        let expected = brute_force_sat(n, &clauses);
        match solver.solve() {
            SolveResult::Sat(model) => {
                prop_assert!(expected);
                prop_assert!(satisfies(&model, &clauses));
            }
            SolveResult::Unsat(core) => {
                prop_assert!(!expected);
                prop_assert!(core.is_empty());
            }
            SolveResult::Unknown => prop_assert!(false, "no budget was set"),
        }
    }

    /// Failed assumptions are a subset of the assumptions and are by
    /// themselves inconsistent with the clauses.
    #[test]
    fn prop_assumption_core_is_sound(
        (n, clauses) in arb_cnf(),
        picks in prop::collection::vec((0u32..6, any::<bool>()), 0..4),
    ) {
        let assumptions: Vec<Literal> = picks
            .into_iter()
            .filter(|(v, _)| (*v as usize) < n)
            .map(|(v, p)| Literal::new(Variable(v), p))
            .collect();
        let mut solver = Solver::new(n);
        for c in &clauses {
            solver.add_clause(c.clone());
        }
        if let SolveResult::Unsat(core) = solver.solve_with_assumptions(&assumptions) {
            for lit in &core {
                prop_assert!(assumptions.contains(lit));
            }
            let mut with_core = clauses.clone();
            with_core.extend(core.iter().map(|&l| vec![l]));
            prop_assert!(!brute_force_sat(n, &with_core));
        }
    }

    /// Solving under push/pop gives the same verdict as solving the
    /// clauses that remain in force from scratch.
    #[test]
    fn prop_push_pop_matches_scratch(
        (n, base) in arb_cnf(),
        (_, scoped) in arb_cnf(),
    ) {
        let scoped: Vec<Vec<Literal>> = scoped
            .into_iter()
            .map(|c| c.into_iter().filter(|l| l.variable().index() < n).collect::<Vec<_>>())
            .filter(|c| !c.is_empty())
            .collect();
        let mut solver = Solver::new(n);
        for c in &base {
            solver.add_clause(c.clone());
        }
        solver.push();
        for c in &scoped {
            solver.add_clause(c.clone());
        }
        let mut all = base.clone();
        all.extend(scoped.iter().cloned());
        prop_assert_eq!(solver.solve().is_sat(), brute_force_sat(n, &all));
        solver.pop();
        prop_assert_eq!(solver.solve().is_sat(), brute_force_sat(n, &base));
    }
}
