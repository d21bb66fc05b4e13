//! Search configuration and resource budgets.

use std::time::{Duration, Instant};

/// Tunables of the CDCL search.
#[derive(Debug, Clone)]
pub struct SatConfig {
    /// Conflicts in the first Luby restart interval
    pub restart_base: u64,
    /// VSIDS decay factor
    pub var_decay: f64,
    /// Learned clause activity decay factor
    pub clause_decay: f64,
    /// Conflicts before the first clause database reduction
    pub first_reduce: u64,
    /// Growth of the reduction interval after each reduction
    pub reduce_inc: u64,
    /// Phase for variables without a saved phase or theory suggestion
    pub default_phase: bool,
    /// Choose decisions with lookahead instead of VSIDS
    pub lookahead: bool,
    /// Probability of branching on a random variable instead of the VSIDS best
    pub random_var_freq: f64,
    /// Seed of the decision randomization
    pub seed: u64,
    /// Resource limits for a single `solve` call
    pub limits: ResourceLimit,
}

impl Default for SatConfig {
    fn default() -> Self {
        SatConfig {
            restart_base: 100,
            var_decay: 0.95,
            clause_decay: 0.999,
            first_reduce: 2000,
            reduce_inc: 300,
            default_phase: false,
            lookahead: false,
            random_var_freq: 0.0,
            seed: 91648253,
            limits: ResourceLimit::default(),
        }
    }
}

/// Budget for one search. `None` fields are unlimited.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimit {
    /// Maximum number of conflicts
    pub max_conflicts: Option<u64>,
    /// Maximum number of propagated literals
    pub max_propagations: Option<u64>,
    /// Wall-clock time limit
    pub time_limit: Option<Duration>,
}

impl ResourceLimit {
    /// No limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Only a conflict limit.
    pub fn conflicts(max: u64) -> Self {
        ResourceLimit {
            max_conflicts: Some(max),
            ..Self::default()
        }
    }
}

/// A started budget: counters are measured relative to the start of a search.
#[derive(Debug, Clone)]
pub(crate) struct Budget {
    limit: ResourceLimit,
    start_conflicts: u64,
    start_propagations: u64,
    started: Instant,
}

impl Budget {
    pub(crate) fn start(limit: &ResourceLimit, conflicts: u64, propagations: u64) -> Self {
        Budget {
            limit: limit.clone(),
            start_conflicts: conflicts,
            start_propagations: propagations,
            started: Instant::now(),
        }
    }

    pub(crate) fn exhausted(&self, conflicts: u64, propagations: u64) -> bool {
        if let Some(max) = self.limit.max_conflicts {
            if conflicts - self.start_conflicts >= max {
                return true;
            }
        }
        if let Some(max) = self.limit.max_propagations {
            if propagations - self.start_propagations >= max {
                return true;
            }
        }
        self.limit
            .time_limit
            .is_some_and(|t| self.started.elapsed() >= t)
    }
}

/// The i-th element (0-based) of the Luby sequence 1 1 2 1 1 2 4 ...
pub fn luby(mut i: u64) -> u64 {
    let mut size = 1u64;
    let mut seq = 0u32;
    while size < i + 1 {
        seq += 1;
        size = 2 * size + 1;
    }
    while size - 1 != i {
        size = (size - 1) >> 1;
        seq -= 1;
        i %= size;
    }
    1u64 << seq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luby_prefix() {
        let seq: Vec<u64> = (0..15).map(luby).collect();
        assert_eq!(seq, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
    }

    #[test]
    fn test_budget_conflicts() {
        let budget = Budget::start(&ResourceLimit::conflicts(10), 5, 0);
        assert!(!budget.exhausted(14, 1000));
        assert!(budget.exhausted(15, 1000));
    }

    #[test]
    fn test_unlimited_budget() {
        let budget = Budget::start(&ResourceLimit::unlimited(), 0, 0);
        assert!(!budget.exhausted(u32::MAX as u64, u32::MAX as u64));
    }
}
