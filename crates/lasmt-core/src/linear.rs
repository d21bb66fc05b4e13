//! Linear terms over arithmetic variables and the normalized inequality form.
//!
//! Every arithmetic atom reaching the theory solver has the shape
//! `constant <= sum(coeff_i * x_i)`. Front ends rewrite `<`, `>=` and `>`
//! into this form, using the negated literal for strict comparisons:
//! `t < c` is the negation of `c <= t`.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::error::{CoreError, CoreResult};

/// An arithmetic (theory) variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArithVar(pub u32);

impl ArithVar {
    /// Index for per-variable arrays.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArithVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Sort of an arithmetic variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    /// Integer sort
    Int,
    /// Real sort
    Real,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => write!(f, "Int"),
            Sort::Real => write!(f, "Real"),
        }
    }
}

impl FromStr for Sort {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "Int" => Ok(Sort::Int),
            "Real" => Ok(Sort::Real),
            _ => Err(CoreError::malformed("sort", s)),
        }
    }
}

/// A linear combination `sum(coeff_i * x_i)` without constant part.
///
/// Kept sorted by variable with merged, non-zero coefficients, so two equal
/// sums compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LinearTerm {
    coeffs: Vec<(ArithVar, BigRational)>,
}

impl LinearTerm {
    /// Build a term from arbitrary (possibly repeated) monomials.
    pub fn new(monomials: impl IntoIterator<Item = (ArithVar, BigRational)>) -> Self {
        let mut coeffs: Vec<(ArithVar, BigRational)> = monomials.into_iter().collect();
        coeffs.sort_by_key(|(v, _)| *v);
        let mut merged: Vec<(ArithVar, BigRational)> = Vec::with_capacity(coeffs.len());
        for (var, c) in coeffs {
            match merged.last_mut() {
                Some((last, acc)) if *last == var => *acc += c,
                _ => merged.push((var, c)),
            }
        }
        merged.retain(|(_, c)| !c.is_zero());
        LinearTerm { coeffs: merged }
    }

    /// The term `1 * var`.
    pub fn var(var: ArithVar) -> Self {
        LinearTerm {
            coeffs: vec![(var, BigRational::one())],
        }
    }

    /// Build from integer coefficients, a shorthand used heavily by callers and tests.
    pub fn from_ints(monomials: &[(ArithVar, i64)]) -> Self {
        Self::new(
            monomials
                .iter()
                .map(|&(v, c)| (v, BigRational::from(BigInt::from(c)))),
        )
    }

    /// Monomials in variable order.
    pub fn coeffs(&self) -> &[(ArithVar, BigRational)] {
        &self.coeffs
    }

    /// Number of monomials.
    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    /// True if the term has no monomials.
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Coefficient of `var`, zero if absent.
    pub fn coeff(&self, var: ArithVar) -> BigRational {
        self.coeffs
            .binary_search_by_key(&var, |(v, _)| *v)
            .map(|i| self.coeffs[i].1.clone())
            .unwrap_or_else(|_| BigRational::zero())
    }

    /// Multiply every coefficient by `factor`.
    pub fn scaled(&self, factor: &BigRational) -> Self {
        Self::new(self.coeffs.iter().map(|(v, c)| (*v, c * factor)))
    }

    /// The term with every coefficient negated.
    pub fn negated(&self) -> Self {
        LinearTerm {
            coeffs: self.coeffs.iter().map(|(v, c)| (*v, -c)).collect(),
        }
    }

    /// Sum of two terms.
    pub fn add(&self, other: &LinearTerm) -> Self {
        Self::new(self.coeffs.iter().chain(other.coeffs.iter()).cloned())
    }

    /// True if every coefficient is an integer.
    pub fn has_integer_coeffs(&self) -> bool {
        self.coeffs.iter().all(|(_, c)| c.is_integer())
    }

    /// Sign of the leading (lowest-variable) coefficient; `false` when negative.
    pub fn leading_positive(&self) -> bool {
        self.coeffs.first().map_or(true, |(_, c)| c.is_positive())
    }

    /// Evaluate under an assignment; `None` if a variable has no value.
    pub fn eval<F>(&self, mut value: F) -> Option<BigRational>
    where
        F: FnMut(ArithVar) -> Option<BigRational>,
    {
        let mut sum = BigRational::zero();
        for (var, c) in &self.coeffs {
            sum += c * value(*var)?;
        }
        Some(sum)
    }
}

impl fmt::Display for LinearTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coeffs.is_empty() {
            return write!(f, "0");
        }
        for (i, (var, c)) in self.coeffs.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            if c.is_one() {
                write!(f, "{var}")?;
            } else {
                write!(f, "{c}*{var}")?;
            }
        }
        Ok(())
    }
}

/// The normalized atom `constant <= term`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Inequality {
    /// Left-hand constant.
    pub constant: BigRational,
    /// Right-hand linear sum.
    pub term: LinearTerm,
}

impl Inequality {
    /// `constant <= term`
    pub fn new(constant: BigRational, term: LinearTerm) -> Self {
        Inequality { constant, term }
    }

    /// `term >= c`, already in normal form.
    pub fn ge(term: LinearTerm, c: BigRational) -> Self {
        Inequality::new(c, term)
    }

    /// `term <= c`, normalized to `-c <= -term`.
    pub fn le(term: LinearTerm, c: BigRational) -> Self {
        Inequality::new(-c, term.negated())
    }

    /// Integer-constant shorthand for [`Inequality::ge`].
    pub fn ge_int(term: LinearTerm, c: i64) -> Self {
        Self::ge(term, BigRational::from(BigInt::from(c)))
    }

    /// Integer-constant shorthand for [`Inequality::le`].
    pub fn le_int(term: LinearTerm, c: i64) -> Self {
        Self::le(term, BigRational::from(BigInt::from(c)))
    }

    /// Constant-only atoms are decided without the simplex.
    pub fn trivial_value(&self) -> Option<bool> {
        self.term
            .is_empty()
            .then(|| self.constant <= BigRational::zero())
    }

    /// Truth value under an assignment; `None` if a variable has no value.
    pub fn holds<F>(&self, value: F) -> Option<bool>
    where
        F: FnMut(ArithVar) -> Option<BigRational>,
    {
        Some(self.constant <= self.term.eval(value)?)
    }
}

impl fmt::Display for Inequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= {}", self.constant, self.term)
    }
}

/// Parses the [`Display`](fmt::Display) form, e.g. `-3 <= 2*x0 + -1/2*x1`.
impl FromStr for Inequality {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let bad = || CoreError::malformed("inequality", s);
        let (lhs, rhs) = s.split_once("<=").ok_or_else(bad)?;
        let constant: BigRational = lhs.trim().parse().map_err(|_| bad())?;
        let rhs = rhs.trim();
        if rhs == "0" {
            return Ok(Inequality::new(constant, LinearTerm::default()));
        }
        let mut monomials = Vec::new();
        for part in rhs.split(" + ") {
            let (coeff, var) = match part.trim().split_once('*') {
                Some((c, v)) => (c.parse().map_err(|_| bad())?, v),
                None => (BigRational::one(), part.trim()),
            };
            let index: u32 = var
                .strip_prefix('x')
                .and_then(|i| i.parse().ok())
                .ok_or_else(bad)?;
            monomials.push((ArithVar(index), coeff));
        }
        Ok(Inequality::new(constant, LinearTerm::new(monomials)))
    }
}
