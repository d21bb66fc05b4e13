//! VSIDS decision heuristic over an indexed binary max-heap.
//!
//! Variables are ordered by activity; equal activities are ordered by
//! variable index (lower first), which keeps decisions deterministic.

use lasmt_core::Variable;

/// Heap position marker for variables not in the heap
const INVALID_POS: u32 = u32::MAX;
/// Activities are rescaled once any of them exceeds this value
const RESCALE_LIMIT: f64 = 1e100;

/// VSIDS activity-based variable selection.
#[derive(Debug, Clone)]
pub struct Vsids {
    activities: Vec<f64>,
    increment: f64,
    decay: f64,
    heap: Vec<u32>,
    heap_pos: Vec<u32>,
}

impl Vsids {
    /// Heap containing all `num_vars` variables with zero activity.
    pub fn new(num_vars: usize, decay: f64) -> Self {
        Vsids {
            activities: vec![0.0; num_vars],
            increment: 1.0,
            decay,
            heap: (0..num_vars as u32).collect(),
            heap_pos: (0..num_vars as u32).collect(),
        }
    }

    /// Grow to `num_vars` variables; new variables enter the heap.
    pub fn ensure_num_vars(&mut self, num_vars: usize) {
        let old = self.activities.len();
        if old < num_vars {
            self.activities.resize(num_vars, 0.0);
            self.heap_pos.resize(num_vars, INVALID_POS);
            for v in old..num_vars {
                self.insert(Variable(v as u32));
            }
        }
    }

    /// Activity of `var`.
    #[inline]
    pub fn activity(&self, var: Variable) -> f64 {
        self.activities[var.index()]
    }

    /// Increase the activity of `var`.
    pub fn bump(&mut self, var: Variable) {
        let idx = var.index();
        self.activities[idx] += self.increment;
        if self.activities[idx] > RESCALE_LIMIT {
            self.rescale();
        }
        if self.heap_pos[idx] != INVALID_POS {
            self.sift_up(self.heap_pos[idx] as usize);
        }
    }

    /// Decay all activities by growing the increment.
    #[inline]
    pub fn decay(&mut self) {
        self.increment /= self.decay;
    }

    fn rescale(&mut self) {
        for a in &mut self.activities {
            *a *= 1e-100;
        }
        self.increment *= 1e-100;
    }

    /// True if `var` is in the heap.
    #[inline]
    pub fn contains(&self, var: Variable) -> bool {
        self.heap_pos[var.index()] != INVALID_POS
    }

    /// Put `var` back in the heap (after unassignment).
    pub fn insert(&mut self, var: Variable) {
        if self.contains(var) {
            return;
        }
        let pos = self.heap.len();
        self.heap.push(var.0);
        self.heap_pos[var.index()] = pos as u32;
        self.sift_up(pos);
    }

    /// Remove and return the best variable.
    pub fn pop_max(&mut self) -> Option<Variable> {
        let top = *self.heap.first()?;
        let last = self.heap.pop()?;
        self.heap_pos[top as usize] = INVALID_POS;
        if !self.heap.is_empty() {
            self.heap[0] = last;
            self.heap_pos[last as usize] = 0;
            self.sift_down(0);
        }
        Some(Variable(top))
    }

    /// Is `a` preferred over `b`?
    #[inline]
    fn better(&self, a: u32, b: u32) -> bool {
        let (aa, ab) = (self.activities[a as usize], self.activities[b as usize]);
        aa > ab || (aa == ab && a < b)
    }

    fn sift_up(&mut self, mut pos: usize) {
        let var = self.heap[pos];
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.better(var, self.heap[parent]) {
                break;
            }
            self.heap[pos] = self.heap[parent];
            self.heap_pos[self.heap[pos] as usize] = pos as u32;
            pos = parent;
        }
        self.heap[pos] = var;
        self.heap_pos[var as usize] = pos as u32;
    }

    fn sift_down(&mut self, mut pos: usize) {
        let var = self.heap[pos];
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.better(self.heap[right], self.heap[left]) {
                right
            } else {
                left
            };
            if !self.better(self.heap[child], var) {
                break;
            }
            self.heap[pos] = self.heap[child];
            self.heap_pos[self.heap[pos] as usize] = pos as u32;
            pos = child;
        }
        self.heap[pos] = var;
        self.heap_pos[var as usize] = pos as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_break_by_index() {
        let mut vsids = Vsids::new(4, 0.95);
        assert_eq!(vsids.pop_max(), Some(Variable(0)));
        assert_eq!(vsids.pop_max(), Some(Variable(1)));
        vsids.insert(Variable(0));
        assert_eq!(vsids.pop_max(), Some(Variable(0)));
    }

    #[test]
    fn test_bump_reorders() {
        let mut vsids = Vsids::new(4, 0.95);
        vsids.bump(Variable(3));
        vsids.decay();
        vsids.bump(Variable(2));
        assert_eq!(vsids.pop_max(), Some(Variable(2)));
        assert_eq!(vsids.pop_max(), Some(Variable(3)));
        assert_eq!(vsids.pop_max(), Some(Variable(0)));
    }

    #[test]
    fn test_rescale_keeps_order() {
        let mut vsids = Vsids::new(2, 0.5);
        for _ in 0..400 {
            vsids.bump(Variable(1));
            vsids.decay();
        }
        assert!(vsids.activity(Variable(1)).is_finite());
        assert_eq!(vsids.pop_max(), Some(Variable(1)));
    }

    #[test]
    fn test_ensure_num_vars_adds_to_heap() {
        let mut vsids = Vsids::new(1, 0.95);
        vsids.ensure_num_vars(3);
        assert!(vsids.contains(Variable(2)));
        let order: Vec<_> = std::iter::from_fn(|| vsids.pop_max()).collect();
        assert_eq!(order, vec![Variable(0), Variable(1), Variable(2)]);
    }
}
