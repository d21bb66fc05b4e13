//! Boolean variables and literals.

use std::fmt;
use std::ops::Not;

/// A Boolean variable, identified by a dense index starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(pub u32);

impl Variable {
    /// Largest variable a [`Literal`] can encode.
    pub const MAX: Variable = Variable(u32::MAX >> 1);

    /// Index of this variable for per-variable arrays.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A literal: a variable together with a polarity.
///
/// Encoded as `2 * var + sign`, where sign `1` means negated. This keeps
/// per-literal arrays (watch lists, lookahead counters) dense.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal(pub u32);

impl Literal {
    /// Build a literal from a variable and a polarity.
    ///
    /// `var` must not exceed [`Variable::MAX`].
    #[inline]
    pub fn new(var: Variable, positive: bool) -> Self {
        debug_assert!(var <= Variable::MAX, "variable {} out of range", var.0);
        Literal((var.0 << 1) | u32::from(!positive))
    }

    /// Like [`Literal::new`], but `None` when `var` exceeds [`Variable::MAX`].
    #[inline]
    pub fn checked_new(var: Variable, positive: bool) -> Option<Self> {
        (var <= Variable::MAX).then(|| Literal((var.0 << 1) | u32::from(!positive)))
    }

    /// The positive literal of `var`.
    #[inline]
    pub fn positive(var: Variable) -> Self {
        Self::new(var, true)
    }

    /// The negative literal of `var`.
    #[inline]
    pub fn negative(var: Variable) -> Self {
        Self::new(var, false)
    }

    /// The underlying variable.
    #[inline]
    pub fn variable(self) -> Variable {
        Variable(self.0 >> 1)
    }

    /// True if this literal is the positive polarity of its variable.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 & 1 == 0
    }

    /// The complementary literal.
    #[inline]
    pub fn negated(self) -> Self {
        Literal(self.0 ^ 1)
    }

    /// Index for per-literal arrays.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// DIMACS encoding: `var + 1`, negative when the literal is negated.
    pub fn to_dimacs(self) -> i64 {
        let v = i64::from(self.variable().0) + 1;
        if self.is_positive() {
            v
        } else {
            -v
        }
    }

    /// Inverse of [`Literal::to_dimacs`]. Returns `None` for `0` and for
    /// variables beyond [`Variable::MAX`]; callers reading clauses must
    /// treat `0` as the terminator before calling this.
    pub fn from_dimacs(value: i64) -> Option<Self> {
        if value == 0 {
            return None;
        }
        let var = u32::try_from(value.unsigned_abs() - 1).ok()?;
        Literal::checked_new(Variable(var), value > 0)
    }
}

impl Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        self.negated()
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dimacs())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dimacs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_literal_polarity() {
        let v = Variable(7);
        assert!(Literal::positive(v).is_positive());
        assert!(!Literal::negative(v).is_positive());
        assert_eq!(Literal::positive(v).variable(), v);
        assert_eq!(Literal::negative(v).variable(), v);
        assert_eq!(!Literal::positive(v), Literal::negative(v));
    }

    #[test]
    fn test_dimacs_encoding() {
        assert_eq!(Literal::positive(Variable(0)).to_dimacs(), 1);
        assert_eq!(Literal::negative(Variable(4)).to_dimacs(), -5);
        assert_eq!(Literal::from_dimacs(-5), Some(Literal::negative(Variable(4))));
        assert_eq!(Literal::from_dimacs(0), None);
    }

    #[test]
    fn test_encoding_range() {
        let top = Literal::negative(Variable::MAX);
        assert_eq!(top.variable(), Variable::MAX);
        assert_eq!(Literal::from_dimacs(top.to_dimacs()), Some(top));
        assert_eq!(Literal::checked_new(Variable(1 << 31), true), None);
        assert_eq!(Literal::from_dimacs(1 << 31), Some(Literal::positive(Variable::MAX)));
        assert_eq!(Literal::from_dimacs((1 << 31) + 1), None);
        assert_eq!(Literal::from_dimacs(99_999_999_999), None);
        assert_eq!(Literal::from_dimacs(-99_999_999_999), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn test_oversized_variable_rejected() {
        let _ = Literal::positive(Variable(u32::MAX));
    }

    proptest! {
        #[test]
        fn prop_negation_is_involution(var in 0u32..1_000_000, positive: bool) {
            let lit = Literal::new(Variable(var), positive);
            prop_assert_eq!(lit.negated().negated(), lit);
            prop_assert_eq!(lit.negated().variable(), lit.variable());
            prop_assert_ne!(lit.negated(), lit);
        }
    }
}
