//! Models of satisfiable instances.

use std::fmt;

use num_rational::BigRational;
use rustc_hash::FxHashMap;

use lasmt_core::{ArithVar, Inequality, Literal, Variable};

/// A satisfying assignment: a value for every Boolean variable and every
/// arithmetic variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    bools: Vec<bool>,
    values: FxHashMap<ArithVar, BigRational>,
}

impl Model {
    /// Assemble a model from its two halves.
    pub fn new(bools: Vec<bool>, values: FxHashMap<ArithVar, BigRational>) -> Self {
        Model { bools, values }
    }

    /// Value of a Boolean variable.
    pub fn value(&self, var: Variable) -> Option<bool> {
        self.bools.get(var.index()).copied()
    }

    /// Truth value of a literal.
    pub fn lit_value(&self, lit: Literal) -> Option<bool> {
        self.value(lit.variable()).map(|v| v == lit.is_positive())
    }

    /// Value of an arithmetic variable.
    pub fn arith_value(&self, av: ArithVar) -> Option<&BigRational> {
        self.values.get(&av)
    }

    /// The Boolean half.
    pub fn bools(&self) -> &[bool] {
        &self.bools
    }

    /// Number of arithmetic variables with a value.
    pub fn num_arith(&self) -> usize {
        self.values.len()
    }

    /// True if some literal of `clause` is true.
    pub fn satisfies_clause(&self, clause: &[Literal]) -> bool {
        clause.iter().any(|&l| self.lit_value(l) == Some(true))
    }

    /// Truth value of `ineq` under the arithmetic half.
    pub fn satisfies(&self, ineq: &Inequality) -> Option<bool> {
        ineq.holds(|av| self.values.get(&av).cloned())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bools.iter().enumerate() {
            writeln!(f, "b{i} = {b}")?;
        }
        let mut arith: Vec<_> = self.values.iter().collect();
        arith.sort_by_key(|(av, _)| **av);
        for (av, v) in arith {
            writeln!(f, "{av} = {v}")?;
        }
        Ok(())
    }
}
