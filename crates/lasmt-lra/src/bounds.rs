//! Bound store.
//!
//! Every atom contributes two bounds on one simplex variable: one for the
//! positive literal and one for the negated literal. Each variable keeps
//! its bounds sorted by value; a bound's `idx` is its position in that
//! list, which is what the implied-bound scan walks.

use std::fmt;

use lasmt_core::Literal;

use crate::delta::DeltaRational;

/// Direction of a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoundKind {
    /// `x >= value`
    Lower,
    /// `x <= value`
    Upper,
}

/// Handle to a bound in the [`BoundStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoundRef(pub u32);

impl BoundRef {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A bound on a simplex variable, activated by `literal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    /// Simplex variable
    pub var: usize,
    /// Lower or upper
    pub kind: BoundKind,
    /// Bound value
    pub value: DeltaRational,
    /// Literal whose assertion activates this bound
    pub literal: Literal,
    /// Position in the variable's sorted bound list
    pub idx: usize,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BoundKind::Lower => write!(f, "s{} >= {}", self.var, self.value),
            BoundKind::Upper => write!(f, "s{} <= {}", self.var, self.value),
        }
    }
}

/// All bounds, with per-variable sorted lists.
#[derive(Debug, Clone, Default)]
pub struct BoundStore {
    bounds: Vec<Bound>,
    per_var: Vec<Vec<BoundRef>>,
}

impl BoundStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bound and insert it into its variable's sorted list.
    pub fn add(
        &mut self,
        var: usize,
        kind: BoundKind,
        value: DeltaRational,
        literal: Literal,
    ) -> BoundRef {
        let r = BoundRef(self.bounds.len() as u32);
        self.bounds.push(Bound {
            var,
            kind,
            value,
            literal,
            idx: 0,
        });
        if self.per_var.len() <= var {
            self.per_var.resize_with(var + 1, Vec::new);
        }
        let bounds = &self.bounds;
        let list = &mut self.per_var[var];
        let key = |b: &Bound| (b.value.clone(), b.kind);
        let new_key = key(&bounds[r.index()]);
        let pos = list.partition_point(|&other| key(&bounds[other.index()]) <= new_key);
        list.insert(pos, r);
        for (i, &b) in list.iter().enumerate().skip(pos) {
            self.bounds[b.index()].idx = i;
        }
        r
    }

    /// The bound behind `r`.
    #[inline]
    pub fn get(&self, r: BoundRef) -> &Bound {
        &self.bounds[r.index()]
    }

    /// Bounds of `var` in ascending order.
    pub fn sorted(&self, var: usize) -> &[BoundRef] {
        self.per_var.get(var).map_or(&[][..], |l| l.as_slice())
    }

    /// Number of bounds.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// True if no bound exists.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Bounds of the same direction implied by `r`, in scan order.
    ///
    /// From a lower bound the scan walks down the sorted list (weaker lower
    /// bounds have smaller values); from an upper bound it walks up. Bounds
    /// with an equal value on the other side of `r` are reported first.
    pub fn implied_by(&self, r: BoundRef) -> Vec<BoundRef> {
        let bound = self.get(r);
        let list = self.sorted(bound.var);
        let same = |other: BoundRef| self.get(other).kind == bound.kind;
        let equal = |other: BoundRef| self.get(other).value == bound.value;
        let mut implied = Vec::new();
        match bound.kind {
            BoundKind::Lower => {
                implied.extend(
                    list[bound.idx + 1..]
                        .iter()
                        .copied()
                        .take_while(|&o| equal(o))
                        .filter(|&o| same(o)),
                );
                implied.extend(list[..bound.idx].iter().rev().copied().filter(|&o| same(o)));
            }
            BoundKind::Upper => {
                implied.extend(
                    list[..bound.idx]
                        .iter()
                        .rev()
                        .copied()
                        .take_while(|&o| equal(o))
                        .filter(|&o| same(o)),
                );
                implied.extend(list[bound.idx + 1..].iter().copied().filter(|&o| same(o)));
            }
        }
        implied
    }
}
