//! Farkas interpolation.
//!
//! A theory conflict comes with non-negative coefficients `λ_i` such that
//! `Σ λ_i t_i = 0` while `Σ λ_i k_i` is negative (or zero with a strict
//! participant), where each participant reads `t_i <= k_i`. Splitting the
//! participants into the A side and the B side of a partition gives an
//! interpolant over the shared variables only.

use std::fmt;

use hashbrown::{HashMap, HashSet};
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use lasmt_core::{ArithVar, LinearTerm};

/// Which interpolant to extract from a Farkas combination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InterpolationStrategy {
    /// Sum of the A participants. Strongest single inequality.
    #[default]
    Strong,
    /// Negated sum of the B participants. Weakest single inequality.
    Weak,
    /// Bound interpolated between strong (`0`) and weak (`1`). Values
    /// outside `[0, 1]` are clamped.
    Factor(BigRational),
    /// Conjunction of the strong interpolants of independent A components.
    DecomposingStrong,
    /// Disjunction of the weak interpolants of independent B components.
    DecomposingWeak,
}

/// `term <= bound`, or `term < bound` when `strict`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinearConstraint {
    /// Left-hand side.
    pub term: LinearTerm,
    /// Right-hand constant.
    pub bound: BigRational,
    /// Strict comparison.
    pub strict: bool,
}

impl LinearConstraint {
    /// `term <= bound`
    pub fn le(term: LinearTerm, bound: BigRational) -> Self {
        LinearConstraint {
            term,
            bound,
            strict: false,
        }
    }

    /// `term < bound`
    pub fn lt(term: LinearTerm, bound: BigRational) -> Self {
        LinearConstraint {
            term,
            bound,
            strict: true,
        }
    }

    /// Truth value of a constraint without variables.
    pub fn trivial_value(&self) -> Option<bool> {
        if !self.term.is_empty() {
            return None;
        }
        let zero = BigRational::zero();
        Some(if self.strict {
            zero < self.bound
        } else {
            zero <= self.bound
        })
    }

    /// Logical negation: `¬(t <= k)` is `-t < -k`.
    pub fn negated(&self) -> Self {
        LinearConstraint {
            term: self.term.negated(),
            bound: -&self.bound,
            strict: !self.strict,
        }
    }

    /// Truth value under an assignment; `None` if a variable has no value.
    pub fn holds<F>(&self, value: F) -> Option<bool>
    where
        F: FnMut(ArithVar) -> Option<BigRational>,
    {
        let lhs = self.term.eval(value)?;
        Some(if self.strict {
            lhs < self.bound
        } else {
            lhs <= self.bound
        })
    }

    /// Integer tightening: scale to coprime integer coefficients and round
    /// the bound down, turning a strict bound into a non-strict one.
    pub fn tightened_for_integers(&self) -> Self {
        if self.term.is_empty() {
            return self.clone();
        }
        let lcm = self
            .term
            .coeffs()
            .iter()
            .fold(BigInt::one(), |acc, (_, c)| acc.lcm(c.denom()));
        let scale = BigRational::from(lcm);
        let scaled = self.term.scaled(&scale);
        let gcd = scaled
            .coeffs()
            .iter()
            .fold(BigInt::zero(), |acc, (_, c)| acc.gcd(c.numer()));
        let divisor = BigRational::from(gcd);
        let term = scaled.scaled(&(BigRational::one() / &divisor));
        let bound = &self.bound * &scale / &divisor;
        let bound = if self.strict {
            bound.ceil() - BigRational::one()
        } else {
            bound.floor()
        };
        LinearConstraint::le(term, bound)
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.strict { "<" } else { "<=" };
        write!(f, "{} {op} {}", self.term, self.bound)
    }
}

/// An interpolant in one of two shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpolant {
    /// All parts hold. Empty means true.
    Conjunction(Vec<LinearConstraint>),
    /// Some part holds. Empty means false.
    Disjunction(Vec<LinearConstraint>),
}

impl Interpolant {
    /// The constraints, regardless of shape.
    pub fn parts(&self) -> &[LinearConstraint] {
        match self {
            Interpolant::Conjunction(parts) | Interpolant::Disjunction(parts) => parts,
        }
    }

    /// Truth value under an assignment; `None` if a variable has no value.
    pub fn holds<F>(&self, mut value: F) -> Option<bool>
    where
        F: FnMut(ArithVar) -> Option<BigRational>,
    {
        match self {
            Interpolant::Conjunction(parts) => {
                for part in parts {
                    if !part.holds(&mut value)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            Interpolant::Disjunction(parts) => {
                for part in parts {
                    if part.holds(&mut value)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
        }
    }

    /// Apply [`LinearConstraint::tightened_for_integers`] to every part.
    pub fn tightened_for_integers(&self) -> Self {
        match self {
            Interpolant::Conjunction(parts) => Interpolant::Conjunction(
                parts.iter().map(|p| p.tightened_for_integers()).collect(),
            ),
            Interpolant::Disjunction(parts) => Interpolant::Disjunction(
                parts.iter().map(|p| p.tightened_for_integers()).collect(),
            ),
        }
    }
}

impl fmt::Display for Interpolant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sep, empty) = match self {
            Interpolant::Conjunction(_) => (" and ", "true"),
            Interpolant::Disjunction(_) => (" or ", "false"),
        };
        let parts = self.parts();
        if parts.is_empty() {
            return write!(f, "{empty}");
        }
        for (i, p) in parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{sep}")?;
            }
            write!(f, "({p})")?;
        }
        Ok(())
    }
}

/// One participant of a Farkas combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarkasTerm {
    /// The asserted constraint, over arithmetic variables.
    pub constraint: LinearConstraint,
    /// Its non-negative weight.
    pub coeff: BigRational,
    /// Whether it belongs to the A side.
    pub in_a: bool,
}

fn combine<'a>(terms: impl IntoIterator<Item = &'a FarkasTerm>) -> LinearConstraint {
    let mut term = LinearTerm::default();
    let mut bound = BigRational::zero();
    let mut strict = false;
    for t in terms {
        term = term.add(&t.constraint.term.scaled(&t.coeff));
        bound += &t.constraint.bound * &t.coeff;
        strict |= t.constraint.strict && t.coeff.is_positive();
    }
    LinearConstraint {
        term,
        bound,
        strict,
    }
}

/// Group `side` participants into components connected by variables that
/// never occur on the other side.
fn components<'a>(terms: &'a [FarkasTerm], side_a: bool) -> Vec<Vec<&'a FarkasTerm>> {
    let other: HashSet<ArithVar> = terms
        .iter()
        .filter(|t| t.in_a != side_a)
        .flat_map(|t| t.constraint.term.coeffs().iter().map(|(v, _)| *v))
        .collect();
    let side: Vec<&FarkasTerm> = terms.iter().filter(|t| t.in_a == side_a).collect();

    let mut parent: Vec<usize> = (0..side.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    let mut owner: HashMap<ArithVar, usize> = HashMap::new();
    for (i, t) in side.iter().enumerate() {
        for (v, _) in t.constraint.term.coeffs() {
            if other.contains(v) {
                continue;
            }
            match owner.get(v) {
                Some(&j) => {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[ri] = rj;
                    }
                }
                None => {
                    owner.insert(*v, i);
                }
            }
        }
    }

    let mut groups: Vec<Vec<&FarkasTerm>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for i in 0..side.len() {
        let root = find(&mut parent, i);
        let g = *slot.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(side[i]);
    }
    groups
}

/// Extract an interpolant from a Farkas combination.
pub fn interpolate(terms: &[FarkasTerm], strategy: &InterpolationStrategy) -> Interpolant {
    let sum_a = || combine(terms.iter().filter(|t| t.in_a));
    let sum_b = || combine(terms.iter().filter(|t| !t.in_a));
    match strategy {
        InterpolationStrategy::Strong => Interpolant::Conjunction(vec![sum_a()]),
        InterpolationStrategy::Weak => Interpolant::Conjunction(vec![sum_b().negated()]),
        InterpolationStrategy::Factor(f) => {
            let zero = BigRational::zero();
            let one = BigRational::one();
            let f = f.clone().max(zero.clone()).min(one.clone());
            let a = sum_a();
            let b = sum_b();
            // Farkas: a.bound + b.bound <= 0, and the weak bound is -b.bound.
            let gap = -&b.bound - &a.bound;
            let bound = &a.bound + &f * &gap;
            let strict = if gap.is_zero() || f == zero {
                a.strict
            } else if f == one {
                !b.strict
            } else {
                false
            };
            Interpolant::Conjunction(vec![LinearConstraint {
                term: a.term,
                bound,
                strict,
            }])
        }
        InterpolationStrategy::DecomposingStrong => {
            let parts: Vec<LinearConstraint> = components(terms, true)
                .into_iter()
                .map(|group| combine(group))
                .filter(|c| c.trivial_value() != Some(true))
                .collect();
            if parts.len() < 2 {
                return interpolate(terms, &InterpolationStrategy::Strong);
            }
            Interpolant::Conjunction(parts)
        }
        InterpolationStrategy::DecomposingWeak => {
            let parts: Vec<LinearConstraint> = components(terms, false)
                .into_iter()
                .map(|group| combine(group))
                .filter(|c| c.trivial_value() != Some(true))
                .map(|c| c.negated())
                .collect();
            if parts.len() < 2 {
                return interpolate(terms, &InterpolationStrategy::Weak);
            }
            Interpolant::Disjunction(parts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rat(n: i64) -> BigRational {
        BigRational::from(BigInt::from(n))
    }

    fn x(i: u32) -> ArithVar {
        ArithVar(i)
    }

    fn term(monomials: &[(u32, i64)]) -> LinearTerm {
        let m: Vec<(ArithVar, i64)> = monomials.iter().map(|&(v, c)| (x(v), c)).collect();
        LinearTerm::from_ints(&m)
    }

    fn participant(t: &[(u32, i64)], k: i64, strict: bool, in_a: bool) -> FarkasTerm {
        FarkasTerm {
            constraint: LinearConstraint {
                term: term(t),
                bound: rat(k),
                strict,
            },
            coeff: rat(1),
            in_a,
        }
    }

    /// A: x0 - x1 <= 0, x1 - x2 <= 0. B: x2 - x0 < 0 (shared x0, x2).
    fn chain() -> Vec<FarkasTerm> {
        vec![
            participant(&[(0, 1), (1, -1)], 0, false, true),
            participant(&[(1, 1), (2, -1)], 0, false, true),
            participant(&[(2, 1), (0, -1)], 0, true, false),
        ]
    }

    #[test]
    fn test_strong_sums_a_side() {
        let i = interpolate(&chain(), &InterpolationStrategy::Strong);
        assert_eq!(
            i,
            Interpolant::Conjunction(vec![LinearConstraint::le(term(&[(0, 1), (2, -1)]), rat(0))])
        );
    }

    #[test]
    fn test_weak_negates_b_side() {
        let i = interpolate(&chain(), &InterpolationStrategy::Weak);
        // not(x2 - x0 < 0) is x0 - x2 <= 0
        assert_eq!(
            i,
            Interpolant::Conjunction(vec![LinearConstraint::le(term(&[(0, 1), (2, -1)]), rat(0))])
        );
    }

    #[test]
    fn test_factor_interpolates_bound() {
        // A: x0 <= 1. B: -x0 <= -5 (x0 >= 5).
        let terms = vec![
            participant(&[(0, 1)], 1, false, true),
            participant(&[(0, -1)], -5, false, false),
        ];
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        let i = interpolate(&terms, &InterpolationStrategy::Factor(half));
        assert_eq!(
            i,
            Interpolant::Conjunction(vec![LinearConstraint::le(term(&[(0, 1)]), rat(3))])
        );
        let weak = interpolate(&terms, &InterpolationStrategy::Factor(rat(1)));
        assert_eq!(
            weak,
            Interpolant::Conjunction(vec![LinearConstraint::lt(term(&[(0, 1)]), rat(5))])
        );
    }

    #[test]
    fn test_decomposing_strong_splits_independent_parts() {
        // A: x0 - x1 <= 0, x1 <= 0, x2 <= 0 ; B: -x0 - x2 < 0 (x0 + x2 > 0).
        let terms = vec![
            participant(&[(0, 1), (1, -1)], 0, false, true),
            participant(&[(1, 1)], 0, false, true),
            participant(&[(2, 1)], 0, false, true),
            participant(&[(0, -1), (2, -1)], 0, true, false),
        ];
        let i = interpolate(&terms, &InterpolationStrategy::DecomposingStrong);
        assert_eq!(
            i,
            Interpolant::Conjunction(vec![
                LinearConstraint::le(term(&[(0, 1)]), rat(0)),
                LinearConstraint::le(term(&[(2, 1)]), rat(0)),
            ])
        );
    }

    #[test]
    fn test_decomposing_weak_is_disjunction() {
        // A: x0 + x2 <= 0 ; B: -x0 + x1 <= -1, -x1 <= 0, -x2 <= 0.
        let terms = vec![
            participant(&[(0, 1), (2, 1)], 0, false, true),
            participant(&[(0, -1), (1, 1)], -1, false, false),
            participant(&[(1, -1)], 0, false, false),
            participant(&[(2, -1)], 0, false, false),
        ];
        let i = interpolate(&terms, &InterpolationStrategy::DecomposingWeak);
        let Interpolant::Disjunction(parts) = &i else {
            panic!("expected a disjunction, got {i}");
        };
        assert_eq!(parts.len(), 2);
        // Every A model satisfies it.
        let a_model = |v: ArithVar| Some(if v == x(0) { rat(-1) } else { rat(1) });
        assert_eq!(i.holds(a_model), Some(true));
        // The B model x0 = 1, x1 = 0, x2 = 0 violates it.
        let b_model = |v: ArithVar| Some(if v == x(0) { rat(1) } else { rat(0) });
        assert_eq!(i.holds(b_model), Some(false));
    }

    #[test]
    fn test_integer_tightening() {
        // 2x0 + 4x1 < 7  ->  x0 + 2x1 <= 3
        let c = LinearConstraint::lt(term(&[(0, 2), (1, 4)]), rat(7));
        assert_eq!(
            c.tightened_for_integers(),
            LinearConstraint::le(term(&[(0, 1), (1, 2)]), rat(3))
        );
        // x0/2 <= 3/4  ->  x0 <= 1
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        let c = LinearConstraint::le(
            LinearTerm::new(vec![(x(0), half)]),
            BigRational::new(BigInt::from(3), BigInt::from(4)),
        );
        assert_eq!(
            c.tightened_for_integers(),
            LinearConstraint::le(term(&[(0, 1)]), rat(1))
        );
    }

    #[test]
    fn test_empty_sides() {
        // Only B participants: A alone is consistent, interpolant is true.
        let terms = vec![
            participant(&[(0, 1)], 1, false, false),
            participant(&[(0, -1)], -2, false, false),
        ];
        let i = interpolate(&terms, &InterpolationStrategy::Strong);
        assert_eq!(i.parts()[0].trivial_value(), Some(true));
        // Only A participants: interpolant is false.
        let terms: Vec<FarkasTerm> = terms.into_iter().map(|t| FarkasTerm { in_a: true, ..t }).collect();
        let i = interpolate(&terms, &InterpolationStrategy::Weak);
        assert_eq!(i.parts()[0].trivial_value(), Some(false));
    }
}
