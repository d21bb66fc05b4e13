//! Delta-rationals: `r + d*δ` for a symbolic positive infinitesimal `δ`.
//!
//! Strict bounds are stored exactly (`x < c` becomes `x <= c - δ`) and
//! compared lexicographically. A concrete `δ` is chosen only when a model
//! is built.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use num_rational::BigRational;
use num_traits::{One, Zero};

/// A value `real + delta * δ`. Ordered lexicographically.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeltaRational {
    real: BigRational,
    delta: BigRational,
}

impl DeltaRational {
    /// `real + delta * δ`
    pub fn new(real: BigRational, delta: BigRational) -> Self {
        DeltaRational { real, delta }
    }

    /// A plain rational.
    pub fn from_real(real: BigRational) -> Self {
        DeltaRational {
            real,
            delta: BigRational::zero(),
        }
    }

    /// `real + δ`
    pub fn plus_delta(real: BigRational) -> Self {
        DeltaRational {
            real,
            delta: BigRational::one(),
        }
    }

    /// `real - δ`
    pub fn minus_delta(real: BigRational) -> Self {
        DeltaRational {
            real,
            delta: -BigRational::one(),
        }
    }

    /// Rational part.
    pub fn real(&self) -> &BigRational {
        &self.real
    }

    /// Coefficient of `δ`.
    pub fn delta(&self) -> &BigRational {
        &self.delta
    }

    /// Zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Concrete value for a chosen `δ`.
    pub fn value_at(&self, delta: &BigRational) -> BigRational {
        &self.real + &self.delta * delta
    }
}

impl From<BigRational> for DeltaRational {
    fn from(real: BigRational) -> Self {
        DeltaRational::from_real(real)
    }
}

impl Add for &DeltaRational {
    type Output = DeltaRational;

    fn add(self, rhs: &DeltaRational) -> DeltaRational {
        DeltaRational {
            real: &self.real + &rhs.real,
            delta: &self.delta + &rhs.delta,
        }
    }
}

impl Sub for &DeltaRational {
    type Output = DeltaRational;

    fn sub(self, rhs: &DeltaRational) -> DeltaRational {
        DeltaRational {
            real: &self.real - &rhs.real,
            delta: &self.delta - &rhs.delta,
        }
    }
}

impl AddAssign<&DeltaRational> for DeltaRational {
    fn add_assign(&mut self, rhs: &DeltaRational) {
        self.real += &rhs.real;
        self.delta += &rhs.delta;
    }
}

impl Mul<&BigRational> for &DeltaRational {
    type Output = DeltaRational;

    fn mul(self, rhs: &BigRational) -> DeltaRational {
        DeltaRational {
            real: &self.real * rhs,
            delta: &self.delta * rhs,
        }
    }
}

impl Neg for &DeltaRational {
    type Output = DeltaRational;

    fn neg(self) -> DeltaRational {
        DeltaRational {
            real: -&self.real,
            delta: -&self.delta,
        }
    }
}

impl fmt::Display for DeltaRational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.delta.is_zero() {
            write!(f, "{}", self.real)
        } else {
            write!(f, "{} + {}δ", self.real, self.delta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn rat(n: i64) -> BigRational {
        BigRational::from(BigInt::from(n))
    }

    #[test]
    fn test_lexicographic_order() {
        let c = DeltaRational::from_real(rat(5));
        assert!(DeltaRational::minus_delta(rat(5)) < c);
        assert!(c < DeltaRational::plus_delta(rat(5)));
        assert!(DeltaRational::plus_delta(rat(4)) < DeltaRational::minus_delta(rat(5)));
    }

    #[test]
    fn test_arithmetic() {
        let a = DeltaRational::new(rat(2), rat(1));
        let b = DeltaRational::new(rat(3), rat(-2));
        assert_eq!(&a + &b, DeltaRational::new(rat(5), rat(-1)));
        assert_eq!(&a - &b, DeltaRational::new(rat(-1), rat(3)));
        assert_eq!(&a * &rat(3), DeltaRational::new(rat(6), rat(3)));
        assert_eq!(-&a, DeltaRational::new(rat(-2), rat(-1)));
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert_eq!(b.value_at(&half), rat(2));
    }
}
