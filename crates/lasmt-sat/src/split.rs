//! Search-space splits.
//!
//! A split is a self-contained residual problem: the level-0 units, the
//! constraints selecting one partition, a frozen copy of the instance, and
//! the learned clauses valid for the whole instance. Under a theory, a split
//! also carries the sorts of the arithmetic variables and the atom bound to
//! each theory variable. Splits share nothing mutable and can be solved by
//! independent solver instances, or written out in DIMACS form (atoms and
//! sorts as `c sort` / `c atom` lines) and read back for sequential
//! continuation.

use std::fmt;
use std::io::Write;

use lasmt_core::{CoreResult, Inequality, Literal, Sort, TheorySolver, Variable};
use tracing::debug;

use crate::solver::{Reason, Solver};

/// How [`Solver::create_splits`] partitions the search space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SplitType {
    /// One split holding the whole instance
    #[default]
    None,
    /// Scattering: split `i` takes a cube and excludes the cubes of splits `0..i`
    Scatter,
    /// Cubes from recursive lookahead branching
    Lookahead,
}

/// Split configuration.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Partitioning scheme
    pub split_type: SplitType,
    /// Requested number of splits
    pub num_splits: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            split_type: SplitType::Scatter,
            num_splits: 2,
        }
    }
}

/// One partition of the search space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitData {
    /// Variables of the instance
    pub num_vars: usize,
    /// Level-0 units
    pub units: Vec<Literal>,
    /// Partition constraints
    pub constraints: Vec<Vec<Literal>>,
    /// Frozen instance clauses
    pub instance: Vec<Vec<Literal>>,
    /// Learned clauses
    pub learned: Vec<Vec<Literal>>,
    /// Sorts of the arithmetic variables, by index
    pub sorts: Vec<Sort>,
    /// Theory atoms, by Boolean variable
    pub atoms: Vec<(Variable, Inequality)>,
}

impl SplitData {
    /// The split of an instance already known to be unsatisfiable.
    pub fn unsat() -> Self {
        let var = Variable(0);
        SplitData {
            num_vars: 1,
            units: vec![Literal::positive(var), Literal::negative(var)],
            ..Self::default()
        }
    }

    fn with_constraints(&self, constraints: Vec<Vec<Literal>>) -> Self {
        SplitData {
            constraints,
            ..self.clone()
        }
    }

    /// Total number of clauses, units included.
    pub fn num_clauses(&self) -> usize {
        self.units.len() + self.constraints.len() + self.instance.len() + self.learned.len()
    }

    /// All clauses in dump order.
    pub fn clauses(&self) -> impl Iterator<Item = Vec<Literal>> + '_ {
        self.units
            .iter()
            .map(|&u| vec![u])
            .chain(self.constraints.iter().cloned())
            .chain(self.instance.iter().cloned())
            .chain(self.learned.iter().cloned())
    }

    /// Write the split in DIMACS form.
    pub fn write_dimacs<W: Write>(&self, out: &mut W) -> CoreResult<()> {
        write!(out, "{self}")?;
        out.flush()?;
        Ok(())
    }

    /// The split in DIMACS form.
    pub fn to_dimacs_string(&self) -> String {
        self.to_string()
    }

    /// A fresh pure SAT solver for the Boolean part of this split. Atoms
    /// are ignored; an arithmetic split needs a theory-aware loader.
    pub fn to_solver(&self) -> Solver {
        let mut solver = Solver::new(self.num_vars);
        for clause in self.clauses() {
            if !solver.add_clause(clause) {
                break;
            }
        }
        solver
    }
}

fn write_clause(f: &mut fmt::Formatter<'_>, clause: &[Literal]) -> fmt::Result {
    for lit in clause {
        write!(f, "{} ", lit.to_dimacs())?;
    }
    writeln!(f, "0")
}

impl fmt::Display for SplitData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "p cnf {} {}", self.num_vars, self.num_clauses())?;
        for (i, sort) in self.sorts.iter().enumerate() {
            writeln!(f, "c sort {i} {sort}")?;
        }
        for (var, ineq) in &self.atoms {
            writeln!(f, "c atom {} {ineq}", Literal::positive(*var).to_dimacs())?;
        }
        writeln!(f, "c units")?;
        for &unit in &self.units {
            write_clause(f, &[unit])?;
        }
        writeln!(f, "c constraints")?;
        for clause in &self.constraints {
            write_clause(f, clause)?;
        }
        writeln!(f, "c instance")?;
        for clause in &self.instance {
            write_clause(f, clause)?;
        }
        writeln!(f, "c learned")?;
        for clause in &self.learned {
            write_clause(f, clause)?;
        }
        Ok(())
    }
}

/// Smallest `k` with `2^k >= n`.
fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

impl<T: TheorySolver> Solver<T> {
    /// Partition the search space according to `config`.
    ///
    /// The partitions are disjoint and together cover the instance. An
    /// instance refuted at level 0 yields a single unsatisfiable split.
    pub fn create_splits(&mut self, config: &SplitConfig) -> Vec<SplitData> {
        self.backtrack(0);
        if self.ok && !self.propagate_root() {
            self.ok = false;
        }
        if !self.ok {
            return vec![SplitData::unsat()];
        }
        let frozen = self.frozen_split();
        let splits = match config.split_type {
            SplitType::None => vec![frozen],
            SplitType::Scatter => self.scatter(&frozen, config.num_splits.max(1)),
            SplitType::Lookahead => {
                let cubes = self.lookahead_cubes(ceil_log2(config.num_splits));
                if cubes.is_empty() {
                    vec![SplitData::unsat()]
                } else {
                    cubes
                        .into_iter()
                        .map(|cube| frozen.with_constraints(cube.into_iter().map(|l| vec![l]).collect()))
                        .collect()
                }
            }
        };
        debug!(splits = splits.len(), kind = ?config.split_type, "created splits");
        splits
    }

    /// Snapshot of the instance at level 0, without partition constraints.
    fn frozen_split(&self) -> SplitData {
        let satisfied = |clause: &[Literal]| clause.iter().any(|&l| self.value(l) == Some(true));
        let mut units = self.root_units().to_vec();
        units.extend(self.scope_selectors.iter().map(|&s| Literal::negative(s)));
        SplitData {
            num_vars: self.num_vars,
            units,
            constraints: Vec::new(),
            instance: self
                .original_clauses()
                .into_iter()
                .filter(|c| !satisfied(c))
                .collect(),
            learned: self
                .learned_clauses()
                .into_iter()
                .filter(|c| !satisfied(c))
                .collect(),
            ..SplitData::default()
        }
    }

    fn scatter(&mut self, frozen: &SplitData, num_splits: usize) -> Vec<SplitData> {
        let mut excluded: Vec<Vec<Literal>> = Vec::new();
        let mut splits = Vec::with_capacity(num_splits);
        self.push();
        for i in 0..num_splits - 1 {
            let len = ceil_log2(num_splits - i).max(1) as usize;
            let cube = self.scatter_cube(len);
            if cube.is_empty() {
                break;
            }
            let mut constraints = excluded.clone();
            constraints.extend(cube.iter().map(|&l| vec![l]));
            splits.push(frozen.with_constraints(constraints));

            let blocking: Vec<Literal> = cube.iter().map(|l| l.negated()).collect();
            excluded.push(blocking.clone());
            self.add_clause(blocking);
        }
        splits.push(frozen.with_constraints(excluded));
        self.pop();
        splits
    }

    /// Choose up to `len` decisions consistent with the instance and the
    /// cubes excluded so far.
    fn scatter_cube(&mut self, len: usize) -> Vec<Literal> {
        let base = self.decision_level();
        self.new_probe_level();
        for i in 0..self.scope_selectors.len() {
            let active = Literal::negative(self.scope_selectors[i]);
            if self.value(active).is_none() {
                self.enqueue(active, Reason::Decision);
            }
        }
        let mut cube = Vec::with_capacity(len);
        if self.propagate().is_none() {
            while cube.len() < len {
                let Some(lit) = self.pick_branch_literal() else {
                    break;
                };
                let level = self.decision_level();
                self.new_probe_level();
                self.enqueue(lit, Reason::Decision);
                if self.propagate().is_some() {
                    self.undo_to(level, false);
                    break;
                }
                cube.push(lit);
            }
        }
        self.undo_to(base, false);
        cube
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimacs::parse_str;
    use crate::solver::SolveResult;

    fn pos(v: u32) -> Literal {
        Literal::positive(Variable(v))
    }

    fn neg(v: u32) -> Literal {
        Literal::negative(Variable(v))
    }

    fn count_models(split: &SplitData) -> usize {
        let n = split.num_vars;
        (0u32..1 << n)
            .filter(|bits| {
                split.clauses().all(|c| {
                    c.iter()
                        .any(|l| ((bits >> l.variable().0) & 1 == 1) == l.is_positive())
                })
            })
            .count()
    }

    fn small_instance() -> Solver {
        let mut solver = Solver::new(4);
        solver.add_clause(vec![pos(0), pos(1), pos(2)]);
        solver.add_clause(vec![neg(0), pos(3)]);
        solver.add_clause(vec![neg(1), neg(3)]);
        solver
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(5), 3);
    }

    #[test]
    fn test_scatter_splits_partition_models() {
        let mut solver = small_instance();
        let whole = count_models(&solver.create_splits(&SplitConfig {
            split_type: SplitType::None,
            num_splits: 1,
        })[0]);
        let splits = solver.create_splits(&SplitConfig {
            split_type: SplitType::Scatter,
            num_splits: 4,
        });
        assert!(splits.len() > 1);
        let total: usize = splits.iter().map(count_models).sum();
        assert_eq!(total, whole);
        // scatter constraints do not leak into the instance
        assert_eq!(solver.original_clauses().len(), 3);
    }

    #[test]
    fn test_lookahead_splits_cover_models() {
        let mut solver = small_instance();
        let whole = count_models(&solver.create_splits(&SplitConfig {
            split_type: SplitType::None,
            num_splits: 1,
        })[0]);
        let splits = solver.create_splits(&SplitConfig {
            split_type: SplitType::Lookahead,
            num_splits: 4,
        });
        let total: usize = splits.iter().map(count_models).sum();
        assert_eq!(total, whole);
    }

    #[test]
    fn test_unsat_instance_dump() {
        let mut solver = Solver::new(1);
        solver.add_clause(vec![pos(0)]);
        solver.add_clause(vec![neg(0)]);
        let splits = solver.create_splits(&SplitConfig::default());
        assert_eq!(splits, vec![SplitData::unsat()]);
        let text = splits[0].to_dimacs_string();
        assert!(text.contains("\n1 0\n-1 0\n"));
    }

    #[test]
    fn test_dump_round_trip_solves() {
        let mut solver = small_instance();
        solver.add_clause(vec![pos(2)]);
        let splits = solver.create_splits(&SplitConfig::default());
        for split in &splits {
            let text = split.to_dimacs_string();
            let formula = parse_str(&text).expect("dump parses");
            assert_eq!(formula.num_vars, split.num_vars);
            assert_eq!(formula.clauses.len(), split.num_clauses());
            let direct = split.to_solver().solve().is_sat();
            let reread = formula.into_solver().solve().is_sat();
            assert_eq!(direct, reread);
        }
        assert!(matches!(solver.solve(), SolveResult::Sat(_)));
    }

    #[test]
    fn test_dump_carries_atoms_and_sorts() {
        use lasmt_core::{ArithVar, LinearTerm};

        let x = LinearTerm::from_ints(&[(ArithVar(0), 1)]);
        let split = SplitData {
            num_vars: 3,
            units: vec![pos(0)],
            instance: vec![vec![pos(1), neg(2)]],
            sorts: vec![Sort::Int],
            atoms: vec![
                (Variable(0), Inequality::ge_int(x.clone(), 3)),
                (Variable(2), Inequality::le_int(x, 1)),
            ],
            ..SplitData::default()
        };
        let text = split.to_dimacs_string();
        assert!(text.contains("c sort 0 Int\n"));
        assert!(text.contains("c atom 1 3 <= x0\n"));
        assert!(text.contains("c atom 3 -1 <= -1*x0\n"));
        let formula = parse_str(&text).expect("dump parses");
        assert_eq!(formula.sorts, split.sorts);
        assert_eq!(formula.atoms, split.atoms);
        assert_eq!(formula.clauses.len(), split.num_clauses());
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_dimacs_reports_io_error() {
        let split = SplitData::unsat();
        let mut buf = Vec::new();
        split.write_dimacs(&mut buf).expect("vec writer");
        assert_eq!(String::from_utf8(buf).expect("utf8"), split.to_dimacs_string());
        let err = split.write_dimacs(&mut BrokenPipe).unwrap_err();
        assert!(matches!(err, lasmt_core::CoreError::Io(_)), "{err}");
    }
}
