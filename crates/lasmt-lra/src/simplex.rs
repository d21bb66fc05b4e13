//! General simplex over delta-rationals.
//!
//! The tableau keeps one row per basic variable, `x_b = Σ a_j x_j` over
//! nonbasic variables, plus a column index from each nonbasic variable to
//! the rows that mention it. Bounds are asserted incrementally; tightening
//! a bound records an undo entry so that [`Simplex::pop`] can restore the
//! previous one. Variable values are never restored: any assignment is
//! consistent with the rows, and relaxing bounds keeps nonbasic variables
//! within their bounds.
//!
//! Pivot selection follows Bland's rule (smallest violating basic variable,
//! smallest eligible nonbasic variable), which guarantees termination.

use std::collections::{BTreeMap, BTreeSet};

use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use tracing::trace;

use crate::bounds::{BoundKind, BoundRef};
use crate::delta::DeltaRational;

/// Bounds whose weighted sum is contradictory, with non-negative weights.
pub type Explanation = Vec<(BoundRef, BigRational)>;

/// A bound currently in force on a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBound {
    /// Bound value
    pub value: DeltaRational,
    /// Bound that put it there
    pub origin: BoundRef,
}

#[derive(Debug, Clone)]
struct BoundUndo {
    var: usize,
    kind: BoundKind,
    previous: Option<ActiveBound>,
}

/// Incremental simplex tableau.
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    values: Vec<DeltaRational>,
    lower: Vec<Option<ActiveBound>>,
    upper: Vec<Option<ActiveBound>>,
    /// `rows[b]` is `Some` iff `b` is basic
    rows: Vec<Option<BTreeMap<usize, BigRational>>>,
    /// Basic variables whose row mentions each nonbasic variable
    cols: Vec<BTreeSet<usize>>,
    undo: Vec<BoundUndo>,
    limits: Vec<usize>,
    pivots: u64,
}

impl Simplex {
    /// Empty tableau.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unbounded nonbasic variable with value zero.
    pub fn new_var(&mut self) -> usize {
        let v = self.values.len();
        self.values.push(DeltaRational::zero());
        self.lower.push(None);
        self.upper.push(None);
        self.rows.push(None);
        self.cols.push(BTreeSet::new());
        v
    }

    /// Add a basic variable defined as `Σ c_i x_i`. Basic variables in the
    /// definition are substituted by their rows.
    pub fn add_row(&mut self, term: &[(usize, BigRational)]) -> usize {
        let slack = self.new_var();
        let mut row: BTreeMap<usize, BigRational> = BTreeMap::new();
        for (v, c) in term {
            match &self.rows[*v] {
                Some(def) => {
                    for (k, a) in def {
                        *row.entry(*k).or_insert_with(BigRational::zero) += c * a;
                    }
                }
                None => *row.entry(*v).or_insert_with(BigRational::zero) += c,
            }
        }
        row.retain(|_, a| !a.is_zero());
        let mut value = DeltaRational::zero();
        for (k, a) in &row {
            value += &(&self.values[*k] * a);
            self.cols[*k].insert(slack);
        }
        self.values[slack] = value;
        self.rows[slack] = Some(row);
        slack
    }

    /// Number of variables, basic and nonbasic.
    pub fn num_vars(&self) -> usize {
        self.values.len()
    }

    /// Current value of `var`.
    pub fn value(&self, var: usize) -> &DeltaRational {
        &self.values[var]
    }

    /// Active lower bound of `var`.
    pub fn lower(&self, var: usize) -> Option<&ActiveBound> {
        self.lower[var].as_ref()
    }

    /// Active upper bound of `var`.
    pub fn upper(&self, var: usize) -> Option<&ActiveBound> {
        self.upper[var].as_ref()
    }

    /// True if `var` is currently basic.
    pub fn is_basic(&self, var: usize) -> bool {
        self.rows[var].is_some()
    }

    /// Pivots performed so far.
    pub fn num_pivots(&self) -> u64 {
        self.pivots
    }

    /// Assert `var >= value`. Fails immediately if it crosses the active
    /// upper bound.
    pub fn assert_lower(
        &mut self,
        var: usize,
        value: DeltaRational,
        origin: BoundRef,
    ) -> Result<(), Explanation> {
        if let Some(l) = &self.lower[var] {
            if value <= l.value {
                return Ok(());
            }
        }
        if let Some(u) = &self.upper[var] {
            if value > u.value {
                return Err(vec![(u.origin, BigRational::one()), (origin, BigRational::one())]);
            }
        }
        let previous = self.lower[var].replace(ActiveBound {
            value: value.clone(),
            origin,
        });
        self.undo.push(BoundUndo {
            var,
            kind: BoundKind::Lower,
            previous,
        });
        if !self.is_basic(var) && self.values[var] < value {
            self.update(var, value);
        }
        Ok(())
    }

    /// Assert `var <= value`. Fails immediately if it crosses the active
    /// lower bound.
    pub fn assert_upper(
        &mut self,
        var: usize,
        value: DeltaRational,
        origin: BoundRef,
    ) -> Result<(), Explanation> {
        if let Some(u) = &self.upper[var] {
            if value >= u.value {
                return Ok(());
            }
        }
        if let Some(l) = &self.lower[var] {
            if value < l.value {
                return Err(vec![(l.origin, BigRational::one()), (origin, BigRational::one())]);
            }
        }
        let previous = self.upper[var].replace(ActiveBound {
            value: value.clone(),
            origin,
        });
        self.undo.push(BoundUndo {
            var,
            kind: BoundKind::Upper,
            previous,
        });
        if !self.is_basic(var) && self.values[var] > value {
            self.update(var, value);
        }
        Ok(())
    }

    /// Open a backtrack point.
    pub fn push(&mut self) {
        self.limits.push(self.undo.len());
    }

    /// Drop the last `n` backtrack points, restoring the bounds in force
    /// when they were opened.
    pub fn pop(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        assert!(n <= self.limits.len(), "pop past the first backtrack point");
        let keep = self.limits.len() - n;
        let target = self.limits[keep];
        self.limits.truncate(keep);
        while self.undo.len() > target {
            let Some(entry) = self.undo.pop() else { break };
            match entry.kind {
                BoundKind::Lower => self.lower[entry.var] = entry.previous,
                BoundKind::Upper => self.upper[entry.var] = entry.previous,
            }
        }
    }

    /// Number of open backtrack points.
    pub fn depth(&self) -> usize {
        self.limits.len()
    }

    fn below_lower(&self, var: usize) -> bool {
        self.lower[var]
            .as_ref()
            .is_some_and(|l| self.values[var] < l.value)
    }

    fn above_upper(&self, var: usize) -> bool {
        self.upper[var]
            .as_ref()
            .is_some_and(|u| self.values[var] > u.value)
    }

    fn can_increase(&self, var: usize) -> bool {
        self.upper[var]
            .as_ref()
            .map_or(true, |u| self.values[var] < u.value)
    }

    fn can_decrease(&self, var: usize) -> bool {
        self.lower[var]
            .as_ref()
            .map_or(true, |l| self.values[var] > l.value)
    }

    /// Repair the assignment until every bound holds, or return the bounds
    /// of an infeasible row.
    pub fn check(&mut self) -> Result<(), Explanation> {
        loop {
            let violated = (0..self.num_vars())
                .find(|&v| self.is_basic(v) && (self.below_lower(v) || self.above_upper(v)));
            let Some(basic) = violated else {
                return Ok(());
            };
            let Some(row) = &self.rows[basic] else {
                return Ok(());
            };
            let increase = self.below_lower(basic);
            let entering = row
                .iter()
                .find(|(j, a)| {
                    let up = if increase { a.is_positive() } else { a.is_negative() };
                    if up {
                        self.can_increase(**j)
                    } else {
                        self.can_decrease(**j)
                    }
                })
                .map(|(j, _)| *j);
            let target = if increase {
                self.lower[basic].as_ref().map(|b| b.value.clone())
            } else {
                self.upper[basic].as_ref().map(|b| b.value.clone())
            };
            match (entering, target) {
                (Some(j), Some(target)) => self.pivot_and_update(basic, j, target),
                _ => return Err(self.explain_row(basic, increase)),
            }
        }
    }

    /// Farkas explanation for a basic variable that cannot reach its violated
    /// bound. The basic variable's bound has weight one and every other bound
    /// on the row has the absolute value of its coefficient.
    fn explain_row(&self, basic: usize, below: bool) -> Explanation {
        let mut explanation = Vec::new();
        let own = if below {
            &self.lower[basic]
        } else {
            &self.upper[basic]
        };
        if let Some(b) = own {
            explanation.push((b.origin, BigRational::one()));
        }
        if let Some(row) = &self.rows[basic] {
            for (j, a) in row {
                let at_upper = a.is_positive() == below;
                let bound = if at_upper {
                    &self.upper[*j]
                } else {
                    &self.lower[*j]
                };
                debug_assert!(bound.is_some(), "blocked nonbasic without a bound");
                if let Some(b) = bound {
                    explanation.push((b.origin, a.abs()));
                }
            }
        }
        explanation
    }

    /// Set nonbasic `var` to `value`, moving every dependent basic variable.
    fn update(&mut self, var: usize, value: DeltaRational) {
        let theta = &value - &self.values[var];
        for &b in &self.cols[var] {
            if let Some(row) = &self.rows[b] {
                if let Some(a) = row.get(&var) {
                    let shift = &theta * a;
                    self.values[b] += &shift;
                }
            }
        }
        self.values[var] = value;
    }

    fn pivot_and_update(&mut self, basic: usize, entering: usize, target: DeltaRational) {
        let Some(a) = self.rows[basic].as_ref().and_then(|r| r.get(&entering)).cloned() else {
            return;
        };
        let theta = &(&target - &self.values[basic]) * &(BigRational::one() / a);
        self.values[basic] = target;
        self.values[entering] += &theta;
        for &b in &self.cols[entering] {
            if b == basic {
                continue;
            }
            if let Some(row) = &self.rows[b] {
                if let Some(c) = row.get(&entering) {
                    let shift = &theta * c;
                    self.values[b] += &shift;
                }
            }
        }
        self.pivot(basic, entering);
    }

    /// Swap `basic` out of the basis and `entering` in.
    fn pivot(&mut self, basic: usize, entering: usize) {
        self.pivots += 1;
        trace!(basic, entering, pivots = self.pivots, "pivot");
        let Some(mut old) = self.rows[basic].take() else {
            return;
        };
        for k in old.keys() {
            self.cols[*k].remove(&basic);
        }
        let Some(a) = old.remove(&entering) else {
            return;
        };
        let inv = BigRational::one() / a;
        let mut def: BTreeMap<usize, BigRational> =
            old.into_iter().map(|(k, c)| (k, -(c * &inv))).collect();
        def.insert(basic, inv);

        let dependents: Vec<usize> = std::mem::take(&mut self.cols[entering]).into_iter().collect();
        for r in dependents {
            let Some(row) = self.rows[r].as_mut() else {
                continue;
            };
            let Some(a_r) = row.remove(&entering) else {
                continue;
            };
            for (k, c) in &def {
                let entry = row.entry(*k).or_insert_with(BigRational::zero);
                *entry += &a_r * c;
                if entry.is_zero() {
                    row.remove(k);
                    self.cols[*k].remove(&r);
                } else {
                    self.cols[*k].insert(r);
                }
            }
        }
        for k in def.keys() {
            self.cols[*k].insert(entering);
        }
        self.rows[entering] = Some(def);
    }

    /// A concrete positive `δ` under which every active bound still holds
    /// when delta-rationals are evaluated. Starts at one and only shrinks.
    pub fn compute_delta(&self) -> BigRational {
        let mut delta = BigRational::one();
        for (v, x) in self.values.iter().enumerate() {
            if let Some(l) = &self.lower[v] {
                if l.value.real() < x.real() && l.value.delta() > x.delta() {
                    let limit =
                        (x.real() - l.value.real()) / (l.value.delta() - x.delta());
                    if limit < delta {
                        delta = limit;
                    }
                }
            }
            if let Some(u) = &self.upper[v] {
                if x.real() < u.value.real() && x.delta() > u.value.delta() {
                    let limit =
                        (u.value.real() - x.real()) / (x.delta() - u.value.delta());
                    if limit < delta {
                        delta = limit;
                    }
                }
            }
        }
        delta
    }

    /// Row of a basic variable, for inspection.
    pub fn row(&self, basic: usize) -> Option<&BTreeMap<usize, BigRational>> {
        self.rows[basic].as_ref()
    }
}
