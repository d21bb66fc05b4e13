//! CDCL(T) search loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Propagate --conflict--> Conflict --learn+backjump--> Propagate
//!     |                       |
//!     v                       +--luby limit--> Restart --> Propagate
//! TheoryCheck --conflict--> Conflict
//!     |  \--deduction/split--> Propagate
//!     v
//!   Decide --assumption/decision--> Propagate
//!     \--total assignment + theory Sat--> Done(Sat)
//! ```
//!
//! Decision levels are mirrored 1:1 by theory backtrack points. Probing
//! levels opened by the lookahead subsystem are Boolean-only and never
//! reach the theory.

use lasmt_core::{Literal, NoTheory, TheoryResult, TheorySolver, Variable};
use tracing::{debug, trace};

use crate::clause_db::{ClauseDB, ClauseRef};
use crate::config::{luby, Budget, ResourceLimit, SatConfig};
use crate::lookahead::LookaheadState;
use crate::vsids::Vsids;
use crate::watched::{WatchedLists, Watcher};

/// Clause activities are rescaled once any of them exceeds this value
const CLAUSE_RESCALE_LIMIT: f64 = 1e20;

/// Result of a solve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveResult {
    /// Satisfiable, with a value for every variable.
    Sat(Vec<bool>),
    /// Unsatisfiable. Under assumptions, carries the failed assumptions
    /// (empty when the clauses alone are unsatisfiable).
    Unsat(Vec<Literal>),
    /// The resource budget ran out.
    Unknown,
}

impl SolveResult {
    /// True for [`SolveResult::Sat`].
    pub fn is_sat(&self) -> bool {
        matches!(self, SolveResult::Sat(_))
    }

    /// True for [`SolveResult::Unsat`].
    pub fn is_unsat(&self) -> bool {
        matches!(self, SolveResult::Unsat(_))
    }
}

/// Why a literal is on the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reason {
    /// Decision, assumption, or level-0 unit
    Decision,
    /// Unit-propagated by a clause; the implied literal sits at position 0
    Clause(ClauseRef),
    /// Deduced by the theory; the reason clause is in `theory_reasons`
    Theory,
}

/// Search statistics.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Decisions made (assumptions included)
    pub decisions: u64,
    /// Literals propagated
    pub propagations: u64,
    /// Conflicts analyzed
    pub conflicts: u64,
    /// Conflicts reported by the theory
    pub theory_conflicts: u64,
    /// Literals deduced by the theory
    pub theory_propagations: u64,
    /// Split clauses received from the theory
    pub theory_splits: u64,
    /// Restarts performed
    pub restarts: u64,
    /// Clause database reductions
    pub reductions: u64,
    /// Literals probed by lookahead
    pub lookahead_probes: u64,
    /// Variables lookahead skipped thanks to upper bounds
    pub lookahead_skipped: u64,
    /// Decisions taken on a random variable
    pub random_decisions: u64,
    /// Clauses deleted because they were satisfied at level 0
    pub removed_satisfied: u64,
}

/// Where a conflict came from.
#[derive(Debug, Clone)]
pub(crate) enum ConflictSource {
    /// A falsified stored clause
    Clause(ClauseRef),
    /// A falsified clause that is not stored (theory explanation)
    Lits(Vec<Literal>),
}

enum SearchState {
    Propagate,
    TheoryCheck,
    Conflict(ConflictSource),
    Decide,
    Restart,
    Done(SolveResult),
}

enum TheoryStep {
    /// Nothing new: the theory agrees with the trail
    Consistent,
    /// New literals were enqueued or clauses added
    Progress,
    /// Falsified clause
    Conflict(Vec<Literal>),
}

/// CDCL solver, optionally coupled to a theory.
pub struct Solver<T: TheorySolver = NoTheory> {
    /// Number of variables
    pub(crate) num_vars: usize,
    /// Clause arena
    pub(crate) clause_db: ClauseDB,
    /// Watch lists indexed by literal
    pub(crate) watches: WatchedLists,
    /// Current value of each variable
    pub(crate) assignment: Vec<Option<bool>>,
    /// Decision level at which each variable was assigned
    pub(crate) level: Vec<u32>,
    /// Justification of each assignment
    pub(crate) reason: Vec<Reason>,
    /// Reason clauses of theory deductions, implied literal first
    pub(crate) theory_reasons: Vec<Vec<Literal>>,
    /// Assigned literals in assignment order
    pub(crate) trail: Vec<Literal>,
    /// Trail length at the start of each decision level
    pub(crate) trail_lim: Vec<usize>,
    /// Next trail position to propagate
    pub(crate) qhead: usize,
    /// Next trail position to assert to the theory
    theory_head: usize,
    /// Number of open levels that carry a theory backtrack point
    theory_levels: usize,
    /// Decision heuristic
    pub(crate) vsids: Vsids,
    /// Saved phases
    phase: Vec<Option<bool>>,
    /// Scratch marks for conflict analysis
    pub(crate) seen: Vec<bool>,
    /// Configuration
    pub(crate) config: SatConfig,
    /// Statistics
    pub(crate) stats: SolverStats,
    /// Position in the Luby sequence
    luby_idx: u64,
    /// Conflicts since the last restart
    conflicts_since_restart: u64,
    /// Conflict count triggering the next reduction
    next_reduce: u64,
    /// Clause activity increment
    clause_inc: f64,
    /// False once the empty clause has been derived
    pub(crate) ok: bool,
    /// Selector variables of open scopes, innermost last
    pub(crate) scope_selectors: Vec<Variable>,
    /// Lookahead counters
    pub(crate) lookahead: LookaheadState,
    /// Budget of the running search
    budget: Option<Budget>,
    /// State of the decision randomization
    rng: u64,
    /// Root trail length at the last removal of satisfied clauses
    simplified_trail: usize,
    /// The theory
    pub(crate) theory: T,
}

impl Solver<NoTheory> {
    /// Pure SAT solver over `num_vars` variables.
    pub fn new(num_vars: usize) -> Self {
        Solver::with_theory(num_vars, NoTheory, SatConfig::default())
    }
}

impl<T: TheorySolver> Solver<T> {
    /// Solver over `num_vars` variables coupled to `theory`.
    pub fn with_theory(num_vars: usize, theory: T, config: SatConfig) -> Self {
        let next_reduce = config.first_reduce;
        Solver {
            num_vars,
            clause_db: ClauseDB::new(),
            watches: WatchedLists::new(num_vars),
            assignment: vec![None; num_vars],
            level: vec![0; num_vars],
            reason: vec![Reason::Decision; num_vars],
            theory_reasons: vec![Vec::new(); num_vars],
            trail: Vec::with_capacity(num_vars),
            trail_lim: Vec::new(),
            qhead: 0,
            theory_head: 0,
            theory_levels: 0,
            vsids: Vsids::new(num_vars, config.var_decay),
            phase: vec![None; num_vars],
            seen: vec![false; num_vars],
            stats: SolverStats::default(),
            luby_idx: 0,
            conflicts_since_restart: 0,
            next_reduce,
            clause_inc: 1.0,
            ok: true,
            scope_selectors: Vec::new(),
            lookahead: LookaheadState::new(num_vars),
            budget: None,
            rng: config.seed,
            simplified_trail: 0,
            theory,
            config,
        }
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Allocate a fresh variable.
    pub fn new_var(&mut self) -> Variable {
        let var = Variable(self.num_vars as u32);
        self.ensure_num_vars(self.num_vars + 1);
        var
    }

    /// Grow every per-variable array to `num_vars`.
    pub fn ensure_num_vars(&mut self, num_vars: usize) {
        if num_vars <= self.num_vars {
            return;
        }
        self.num_vars = num_vars;
        self.watches.ensure_num_vars(num_vars);
        self.assignment.resize(num_vars, None);
        self.level.resize(num_vars, 0);
        self.reason.resize(num_vars, Reason::Decision);
        self.theory_reasons.resize(num_vars, Vec::new());
        self.phase.resize(num_vars, None);
        self.seen.resize(num_vars, false);
        self.vsids.ensure_num_vars(num_vars);
        self.lookahead.ensure_num_vars(num_vars);
    }

    /// The coupled theory.
    pub fn theory(&self) -> &T {
        &self.theory
    }

    /// Mutable access to the coupled theory, for declarations between solves.
    pub fn theory_mut(&mut self) -> &mut T {
        &mut self.theory
    }

    /// Search statistics.
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Configuration.
    pub fn config(&self) -> &SatConfig {
        &self.config
    }

    /// Replace the resource limits used by later solve calls.
    pub fn set_limits(&mut self, limits: ResourceLimit) {
        self.config.limits = limits;
    }

    /// Turn lookahead-based decisions on or off.
    pub fn set_lookahead(&mut self, enabled: bool) {
        self.config.lookahead = enabled;
    }

    /// Current decision level.
    #[inline]
    pub fn decision_level(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    /// Value of `lit` under the current assignment.
    #[inline]
    pub fn value(&self, lit: Literal) -> Option<bool> {
        lit_value(&self.assignment, lit)
    }

    /// Literals fixed at decision level 0.
    pub fn root_units(&self) -> &[Literal] {
        let end = self.trail_lim.first().copied().unwrap_or(self.trail.len());
        &self.trail[..end]
    }

    /// Literals of every live original clause.
    pub fn original_clauses(&self) -> Vec<Vec<Literal>> {
        self.clause_db
            .iter_refs()
            .filter(|&c| !self.clause_db.get(c).learned)
            .map(|c| self.clause_db.literals(c).to_vec())
            .collect()
    }

    /// Literals of every live learned clause.
    pub fn learned_clauses(&self) -> Vec<Vec<Literal>> {
        self.clause_db
            .learned_refs()
            .into_iter()
            .map(|c| self.clause_db.literals(c).to_vec())
            .collect()
    }

    /// False once the clause set is known to be unsatisfiable.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    // ------------------------------------------------------------------
    // Clause addition
    // ------------------------------------------------------------------

    /// Add a clause. Inside a scope the clause is retracted by the matching
    /// [`Solver::pop`]. Returns false if the clause set became unsatisfiable.
    pub fn add_clause(&mut self, mut lits: Vec<Literal>) -> bool {
        if let Some(&selector) = self.scope_selectors.last() {
            lits.push(Literal::positive(selector));
        }
        self.add_clause_internal(lits)
    }

    fn add_clause_internal(&mut self, mut lits: Vec<Literal>) -> bool {
        if !self.ok {
            return false;
        }
        self.backtrack(0);
        if let Some(max) = lits.iter().map(|l| l.variable().index()).max() {
            self.ensure_num_vars(max + 1);
        }
        lits.sort_unstable();
        lits.dedup();
        if lits.windows(2).any(|w| w[0] == w[1].negated()) {
            return true;
        }
        if lits.iter().any(|&l| self.value(l) == Some(true)) {
            return true;
        }
        lits.retain(|&l| self.value(l).is_none());

        match lits.len() {
            0 => {
                debug!("empty clause added");
                self.ok = false;
            }
            1 => {
                self.enqueue(lits[0], Reason::Decision);
                if self.propagate().is_some() {
                    self.ok = false;
                }
            }
            _ => {
                let cref = self.clause_db.add(lits, false);
                self.attach(cref);
            }
        }
        self.ok
    }

    fn attach(&mut self, cref: ClauseRef) {
        let lits = self.clause_db.literals(cref);
        let (a, b) = (lits[0], lits[1]);
        self.watches.add_watch(a, Watcher::new(cref, b));
        self.watches.add_watch(b, Watcher::new(cref, a));
    }

    /// Add a globally valid clause during search (theory split lemma).
    /// Returns the clause if it is falsified by the current assignment.
    fn add_lemma(&mut self, mut lits: Vec<Literal>) -> Option<Vec<Literal>> {
        lits.sort_unstable();
        lits.dedup();
        if lits.len() < 2 {
            self.backtrack(0);
            return match lits.first() {
                None => Some(Vec::new()),
                Some(&l) => match self.value(l) {
                    Some(true) => None,
                    Some(false) => Some(lits),
                    None => {
                        self.enqueue(l, Reason::Decision);
                        None
                    }
                },
            };
        }
        // true first, then unassigned, then false by decreasing level
        lits.sort_by_key(|&l| match self.value(l) {
            Some(true) => (0, 0),
            None => (1, 0),
            Some(false) => (2, u32::MAX - self.level[l.variable().index()]),
        });
        let (v0, v1) = (self.value(lits[0]), self.value(lits[1]));
        let cref = self.clause_db.add(lits.clone(), false);
        self.attach(cref);
        match (v0, v1) {
            (Some(false), _) => Some(lits),
            (None, Some(false)) => {
                self.enqueue(lits[0], Reason::Clause(cref));
                None
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Open a scope: clauses added until the matching [`Solver::pop`] are retracted by it.
    pub fn push(&mut self) {
        let selector = self.new_var();
        self.scope_selectors.push(selector);
        debug!(depth = self.scope_selectors.len(), "push scope");
    }

    /// Close the innermost scope. Returns false if no scope was open.
    pub fn pop(&mut self) -> bool {
        match self.scope_selectors.pop() {
            Some(selector) => {
                let retract = Literal::positive(selector);
                self.add_clause_internal(vec![retract]);
                // clauses of the scope are satisfied forever now
                let scoped: Vec<ClauseRef> = self
                    .clause_db
                    .iter_refs()
                    .filter(|&c| self.clause_db.literals(c).contains(&retract))
                    .collect();
                for &cref in &scoped {
                    self.clause_db.delete(cref);
                }
                let db = &self.clause_db;
                self.watches.retain(|c| db.is_live(c));
                debug!(
                    depth = self.scope_selectors.len(),
                    removed = scoped.len(),
                    "pop scope"
                );
                true
            }
            None => false,
        }
    }

    /// Number of open scopes.
    pub fn scope_depth(&self) -> usize {
        self.scope_selectors.len()
    }

    // ------------------------------------------------------------------
    // Trail
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn enqueue(&mut self, lit: Literal, reason: Reason) {
        let var = lit.variable().index();
        debug_assert!(self.assignment[var].is_none());
        self.assignment[var] = Some(lit.is_positive());
        self.level[var] = self.decision_level();
        self.reason[var] = reason;
        self.trail.push(lit);
    }

    /// Open a decision level mirrored by a theory backtrack point.
    fn new_decision_level(&mut self) {
        self.trail_lim.push(self.trail.len());
        self.theory.push_backtrack_point();
        self.theory_levels += 1;
    }

    /// Open a Boolean-only level for probing.
    pub(crate) fn new_probe_level(&mut self) {
        self.trail_lim.push(self.trail.len());
    }

    /// Undo everything above `target` and the matching theory backtrack points.
    pub fn backtrack(&mut self, target: u32) {
        self.undo_to(target, true);
    }

    /// Replay root-level literals to the theory on the next check. Used when
    /// an atom is declared for a variable that already has a root value.
    pub fn rewind_theory(&mut self) {
        self.backtrack(0);
        self.theory_head = 0;
    }

    pub(crate) fn undo_to(&mut self, target: u32, save_phase: bool) {
        if self.decision_level() <= target {
            return;
        }
        let lim = self.trail_lim[target as usize];
        for i in (lim..self.trail.len()).rev() {
            let lit = self.trail[i];
            let var = lit.variable();
            if save_phase {
                self.phase[var.index()] = Some(lit.is_positive());
            }
            self.assignment[var.index()] = None;
            self.reason[var.index()] = Reason::Decision;
            self.vsids.insert(var);
        }
        self.trail.truncate(lim);
        self.trail_lim.truncate(target as usize);
        self.qhead = lim;
        self.theory_head = self.theory_head.min(lim);
        let keep = self.theory_levels.min(target as usize);
        let pops = self.theory_levels - keep;
        if pops > 0 {
            self.theory.pop_backtrack_points(pops);
            self.theory_levels = keep;
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Unit-propagate to fixpoint. Returns a falsified clause on conflict.
    pub(crate) fn propagate(&mut self) -> Option<ClauseRef> {
        let mut conflict = None;
        while self.qhead < self.trail.len() && conflict.is_none() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            self.stats.propagations += 1;
            let false_lit = p.negated();
            let mut ws = self.watches.take(false_lit);
            let mut i = 0;
            let mut j = 0;
            while i < ws.len() {
                let w = ws[i];
                i += 1;
                if lit_value(&self.assignment, w.blocker) == Some(true) {
                    ws[j] = w;
                    j += 1;
                    continue;
                }
                let cref = w.clause;
                let clause = self.clause_db.get_mut(cref);
                if clause.lits[0] == false_lit {
                    clause.lits.swap(0, 1);
                }
                let first = clause.lits[0];
                let kept = Watcher::new(cref, first);
                if first != w.blocker && lit_value(&self.assignment, first) == Some(true) {
                    ws[j] = kept;
                    j += 1;
                    continue;
                }
                let mut moved = false;
                for k in 2..clause.lits.len() {
                    if lit_value(&self.assignment, clause.lits[k]) != Some(false) {
                        clause.lits.swap(1, k);
                        self.watches.add_watch(clause.lits[1], kept);
                        moved = true;
                        break;
                    }
                }
                if moved {
                    continue;
                }
                ws[j] = kept;
                j += 1;
                if lit_value(&self.assignment, first) == Some(false) {
                    conflict = Some(cref);
                    self.qhead = self.trail.len();
                    while i < ws.len() {
                        ws[j] = ws[i];
                        j += 1;
                        i += 1;
                    }
                } else {
                    self.enqueue(first, Reason::Clause(cref));
                }
            }
            ws.truncate(j);
            self.watches.restore(false_lit, ws);
        }
        conflict
    }

    // ------------------------------------------------------------------
    // Theory interaction
    // ------------------------------------------------------------------

    /// Assert pending trail literals, collect deductions, and check.
    fn theory_check(&mut self) -> TheoryStep {
        let mut asserted = 0usize;
        while self.theory_head < self.trail.len() {
            let lit = self.trail[self.theory_head];
            self.theory_head += 1;
            if !self.theory.is_theory_var(lit.variable()) {
                continue;
            }
            asserted += 1;
            if let TheoryResult::Unsat(explanation) = self.theory.assert_literal(lit) {
                return self.theory_conflict(explanation);
            }
        }

        let mut progressed = false;
        for prop in self.theory.take_deductions() {
            let lit = prop.literal;
            let mut clause = Vec::with_capacity(prop.reason.len() + 1);
            clause.push(lit);
            clause.extend(prop.reason.iter().map(|r| r.negated()));
            match self.value(lit) {
                Some(true) => {}
                Some(false) => {
                    trace!(?clause, "theory deduction contradicts trail");
                    self.stats.theory_conflicts += 1;
                    return TheoryStep::Conflict(clause);
                }
                None => {
                    self.stats.theory_propagations += 1;
                    self.theory_reasons[lit.variable().index()] = clause;
                    self.enqueue(lit, Reason::Theory);
                    progressed = true;
                }
            }
        }
        if progressed {
            return TheoryStep::Progress;
        }
        if asserted == 0 {
            return TheoryStep::Consistent;
        }
        self.theory_verdict(false)
    }

    /// Propagate clauses and theory to fixpoint at level 0. Returns false
    /// if the root assignment is refuted.
    pub(crate) fn propagate_root(&mut self) -> bool {
        debug_assert_eq!(self.decision_level(), 0);
        loop {
            if self.propagate().is_some() {
                return false;
            }
            match self.theory_check() {
                TheoryStep::Consistent => return true,
                TheoryStep::Progress => {}
                TheoryStep::Conflict(clause) => {
                    debug!(len = clause.len(), "theory conflict at level 0");
                    return false;
                }
            }
        }
    }

    fn theory_verdict(&mut self, complete: bool) -> TheoryStep {
        match self.theory.check(complete) {
            TheoryResult::Sat => TheoryStep::Consistent,
            TheoryResult::Unsat(explanation) => self.theory_conflict(explanation),
            TheoryResult::NewSplit => self.add_theory_splits(),
        }
    }

    fn theory_conflict(&mut self, explanation: Vec<Literal>) -> TheoryStep {
        self.stats.theory_conflicts += 1;
        let clause: Vec<Literal> = explanation.iter().map(|l| l.negated()).collect();
        trace!(?clause, "theory conflict");
        TheoryStep::Conflict(clause)
    }

    fn add_theory_splits(&mut self) -> TheoryStep {
        let mut next = self.num_vars as u32;
        let mut fresh = || {
            let var = Variable(next);
            next += 1;
            var
        };
        let clauses = self.theory.take_splits(&mut fresh);
        self.ensure_num_vars(next as usize);
        for clause in clauses {
            self.stats.theory_splits += 1;
            trace!(?clause, "theory split");
            if let Some(falsified) = self.add_lemma(clause) {
                return TheoryStep::Conflict(falsified);
            }
        }
        TheoryStep::Progress
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Solve without assumptions.
    pub fn solve(&mut self) -> SolveResult {
        self.solve_with_assumptions(&[])
    }

    /// Solve under temporary assumptions. Learned clauses and theory state
    /// survive the call; on return the solver is back at level 0.
    pub fn solve_with_assumptions(&mut self, assumptions: &[Literal]) -> SolveResult {
        if !self.ok {
            return SolveResult::Unsat(Vec::new());
        }
        if let Some(max) = assumptions.iter().map(|l| l.variable().index()).max() {
            self.ensure_num_vars(max + 1);
        }
        let mut combined: Vec<Literal> = self
            .scope_selectors
            .iter()
            .map(|&s| Literal::negative(s))
            .collect();
        combined.extend_from_slice(assumptions);

        self.budget = Some(Budget::start(
            &self.config.limits,
            self.stats.conflicts,
            self.stats.propagations,
        ));
        self.backtrack(0);
        self.remove_satisfied();
        let result = self.search(&combined);
        self.budget = None;
        self.backtrack(0);

        debug!(
            conflicts = self.stats.conflicts,
            decisions = self.stats.decisions,
            restarts = self.stats.restarts,
            sat = result.is_sat(),
            "search finished"
        );
        match result {
            SolveResult::Unsat(core) => SolveResult::Unsat(
                core.into_iter()
                    .filter(|l| !self.scope_selectors.contains(&l.variable()))
                    .collect(),
            ),
            other => other,
        }
    }

    fn search(&mut self, assumptions: &[Literal]) -> SolveResult {
        let mut state = SearchState::Propagate;
        loop {
            state = match state {
                SearchState::Propagate => match self.propagate() {
                    Some(cref) => SearchState::Conflict(ConflictSource::Clause(cref)),
                    None => SearchState::TheoryCheck,
                },
                SearchState::TheoryCheck => match self.theory_check() {
                    TheoryStep::Consistent => SearchState::Decide,
                    TheoryStep::Progress => SearchState::Propagate,
                    TheoryStep::Conflict(lits) => {
                        SearchState::Conflict(ConflictSource::Lits(lits))
                    }
                },
                SearchState::Conflict(source) => self.resolve_conflict(source),
                SearchState::Decide => self.decide(assumptions),
                SearchState::Restart => {
                    self.backtrack(0);
                    self.remove_satisfied();
                    self.stats.restarts += 1;
                    self.luby_idx += 1;
                    self.conflicts_since_restart = 0;
                    debug!(restarts = self.stats.restarts, "restart");
                    if self.budget_exhausted() {
                        SearchState::Done(SolveResult::Unknown)
                    } else {
                        SearchState::Propagate
                    }
                }
                SearchState::Done(result) => return result,
            };
        }
    }

    fn budget_exhausted(&self) -> bool {
        let exhausted = self
            .budget
            .as_ref()
            .is_some_and(|b| b.exhausted(self.stats.conflicts, self.stats.propagations));
        if exhausted {
            debug!(conflicts = self.stats.conflicts, "resource budget exhausted");
        }
        exhausted
    }

    fn resolve_conflict(&mut self, source: ConflictSource) -> SearchState {
        self.stats.conflicts += 1;
        self.conflicts_since_restart += 1;

        let lits = match source {
            ConflictSource::Clause(cref) => {
                self.bump_clause_activity(cref);
                self.clause_db.literals(cref).to_vec()
            }
            ConflictSource::Lits(lits) => lits,
        };
        let max_level = lits
            .iter()
            .map(|l| self.level[l.variable().index()])
            .max()
            .unwrap_or(0);
        if max_level == 0 {
            debug!("conflict at level 0");
            self.ok = false;
            return SearchState::Done(SolveResult::Unsat(Vec::new()));
        }
        if max_level < self.decision_level() {
            self.backtrack(max_level);
        }

        let result = self.analyze(&lits);
        self.backtrack(result.backtrack_level);
        let uip = result.learned[0];
        if result.learned.len() == 1 {
            self.enqueue(uip, Reason::Decision);
        } else {
            let cref = self.clause_db.add(result.learned, true);
            self.attach(cref);
            self.bump_clause_activity(cref);
            self.enqueue(uip, Reason::Clause(cref));
        }

        self.vsids.decay();
        self.clause_inc /= self.config.clause_decay;

        if self.stats.conflicts >= self.next_reduce {
            self.reduce_db();
            self.next_reduce = self.stats.conflicts
                + self.config.first_reduce
                + self.config.reduce_inc * self.stats.reductions;
        }

        if self.budget_exhausted() {
            return SearchState::Done(SolveResult::Unknown);
        }
        if self.conflicts_since_restart >= luby(self.luby_idx) * self.config.restart_base {
            SearchState::Restart
        } else {
            SearchState::Propagate
        }
    }

    fn decide(&mut self, assumptions: &[Literal]) -> SearchState {
        while (self.decision_level() as usize) < assumptions.len() {
            let p = assumptions[self.decision_level() as usize];
            match self.value(p) {
                Some(true) => self.new_decision_level(),
                Some(false) => {
                    let core = self.analyze_final(p);
                    return SearchState::Done(SolveResult::Unsat(core));
                }
                None => {
                    self.stats.decisions += 1;
                    self.new_decision_level();
                    self.enqueue(p, Reason::Decision);
                    return SearchState::Propagate;
                }
            }
        }

        let next = if self.config.lookahead {
            self.lookahead_decision()
        } else {
            self.pick_branch_literal()
        };
        match next {
            Some(lit) => {
                self.stats.decisions += 1;
                self.new_decision_level();
                self.enqueue(lit, Reason::Decision);
                SearchState::Propagate
            }
            None => match self.theory_verdict(true) {
                TheoryStep::Consistent => {
                    let model = self
                        .assignment
                        .iter()
                        .map(|v| v.unwrap_or(self.config.default_phase))
                        .collect();
                    self.theory.compute_model();
                    SearchState::Done(SolveResult::Sat(model))
                }
                TheoryStep::Progress => SearchState::Propagate,
                TheoryStep::Conflict(lits) => SearchState::Conflict(ConflictSource::Lits(lits)),
            },
        }
    }

    pub(crate) fn pick_branch_literal(&mut self) -> Option<Literal> {
        if self.config.random_var_freq > 0.0
            && self.num_vars > 0
            && self.next_random() < self.config.random_var_freq
        {
            let n = self.num_vars;
            let var = Variable(((self.next_random() * n as f64) as usize).min(n - 1) as u32);
            if self.assignment[var.index()].is_none() {
                self.stats.random_decisions += 1;
                return Some(Literal::new(var, self.pick_phase(var)));
            }
        }
        while let Some(var) = self.vsids.pop_max() {
            if self.assignment[var.index()].is_none() {
                return Some(Literal::new(var, self.pick_phase(var)));
            }
        }
        None
    }

    /// Next value of the decision randomization, uniform in `[0, 1)`.
    fn next_random(&mut self) -> f64 {
        self.rng = self
            .rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.rng >> 11) as f64 / (1u64 << 53) as f64
    }

    pub(crate) fn pick_phase(&self, var: Variable) -> bool {
        self.phase[var.index()]
            .or_else(|| self.theory.suggest_polarity(var))
            .unwrap_or(self.config.default_phase)
    }

    // ------------------------------------------------------------------
    // Clause database management
    // ------------------------------------------------------------------

    pub(crate) fn bump_clause_activity(&mut self, cref: ClauseRef) {
        let clause = self.clause_db.get_mut(cref);
        if !clause.learned {
            return;
        }
        clause.activity += self.clause_inc;
        if clause.activity > CLAUSE_RESCALE_LIMIT {
            self.clause_db.rescale_activities(1e-20);
            self.clause_inc *= 1e-20;
        }
    }

    /// A clause is locked while it justifies a trail literal.
    fn is_locked(&self, cref: ClauseRef) -> bool {
        let first = self.clause_db.literals(cref)[0];
        self.value(first) == Some(true)
            && self.reason[first.variable().index()] == Reason::Clause(cref)
    }

    /// Delete every clause satisfied at level 0. Runs only when the root
    /// trail grew since the last call.
    pub(crate) fn remove_satisfied(&mut self) {
        debug_assert_eq!(self.decision_level(), 0);
        if self.trail.len() == self.simplified_trail {
            return;
        }
        self.simplified_trail = self.trail.len();
        let satisfied: Vec<ClauseRef> = self
            .clause_db
            .iter_refs()
            .filter(|&c| {
                self.clause_db
                    .literals(c)
                    .iter()
                    .any(|&l| self.value(l) == Some(true))
            })
            .collect();
        if satisfied.is_empty() {
            return;
        }
        for &cref in &satisfied {
            // root literals are never analyzed, so their reasons can go
            let implied = self.clause_db.literals(cref)[0].variable().index();
            if self.reason[implied] == Reason::Clause(cref) {
                self.reason[implied] = Reason::Decision;
            }
            self.clause_db.delete(cref);
        }
        let db = &self.clause_db;
        self.watches.retain(|c| db.is_live(c));
        self.stats.removed_satisfied += satisfied.len() as u64;
        debug!(removed = satisfied.len(), "removed satisfied clauses");
    }

    /// Delete the less active half of the unlocked learned clauses.
    pub(crate) fn reduce_db(&mut self) {
        let mut candidates: Vec<ClauseRef> = self
            .clause_db
            .learned_refs()
            .into_iter()
            .filter(|&c| self.clause_db.literals(c).len() > 2 && !self.is_locked(c))
            .collect();
        candidates.sort_by(|&a, &b| {
            self.clause_db
                .get(a)
                .activity
                .total_cmp(&self.clause_db.get(b).activity)
                .then(a.index().cmp(&b.index()))
        });
        let remove = candidates.len() / 2;
        for &cref in &candidates[..remove] {
            self.clause_db.delete(cref);
        }
        let db = &self.clause_db;
        self.watches.retain(|c| db.is_live(c));
        self.stats.reductions += 1;
        debug!(
            removed = remove,
            learned = self.clause_db.num_learned(),
            "reduce clause database"
        );
    }

    /// Literals of the reason of `var`, without the implied literal.
    pub(crate) fn reason_literals(&self, var: Variable) -> Vec<Literal> {
        match self.reason[var.index()] {
            Reason::Decision => Vec::new(),
            Reason::Clause(cref) => self.clause_db.literals(cref)[1..].to_vec(),
            Reason::Theory => self.theory_reasons[var.index()][1..].to_vec(),
        }
    }
}

#[inline]
pub(crate) fn lit_value(assignment: &[Option<bool>], lit: Literal) -> Option<bool> {
    assignment[lit.variable().index()].map(|v| v == lit.is_positive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasmt_core::TheoryPropagation;

    fn pos(v: u32) -> Literal {
        Literal::positive(Variable(v))
    }

    fn neg(v: u32) -> Literal {
        Literal::negative(Variable(v))
    }

    fn satisfies(model: &[bool], clause: &[Literal]) -> bool {
        clause
            .iter()
            .any(|l| model[l.variable().index()] == l.is_positive())
    }

    #[test]
    fn test_empty_formula_sat() {
        let mut solver = Solver::new(3);
        assert!(solver.solve().is_sat());
    }

    #[test]
    fn test_unit_conflict() {
        let mut solver = Solver::new(1);
        assert!(solver.add_clause(vec![pos(0)]));
        assert!(!solver.add_clause(vec![neg(0)]));
        assert_eq!(solver.solve(), SolveResult::Unsat(vec![]));
    }

    #[test]
    fn test_propagation_chain() {
        let mut solver = Solver::new(4);
        solver.add_clause(vec![pos(0)]);
        solver.add_clause(vec![neg(0), pos(1)]);
        solver.add_clause(vec![neg(1), pos(2)]);
        solver.add_clause(vec![neg(2), neg(3)]);
        assert_eq!(solver.root_units(), &[pos(0), pos(1), pos(2), neg(3)]);
    }

    #[test]
    fn test_pigeonhole_3_2_unsat() {
        // p(i,h): pigeon i in hole h, var = 2*i + h
        let mut solver = Solver::new(6);
        for i in 0..3u32 {
            solver.add_clause(vec![pos(2 * i), pos(2 * i + 1)]);
        }
        for h in 0..2u32 {
            for i in 0..3u32 {
                for k in (i + 1)..3 {
                    solver.add_clause(vec![neg(2 * i + h), neg(2 * k + h)]);
                }
            }
        }
        assert!(solver.solve().is_unsat());
    }

    #[test]
    fn test_model_satisfies_clauses() {
        let clauses = vec![
            vec![pos(0), pos(1), neg(2)],
            vec![neg(0), pos(2)],
            vec![neg(1), neg(2), pos(3)],
            vec![neg(3), pos(0)],
            vec![pos(1), pos(3)],
        ];
        let mut solver = Solver::new(4);
        for c in &clauses {
            solver.add_clause(c.clone());
        }
        match solver.solve() {
            SolveResult::Sat(model) => {
                for c in &clauses {
                    assert!(satisfies(&model, c), "clause {c:?} violated");
                }
            }
            other => panic!("expected SAT, got {other:?}"),
        }
    }

    #[test]
    fn test_assumptions_core() {
        let mut solver = Solver::new(3);
        solver.add_clause(vec![pos(0), pos(1)]);
        solver.add_clause(vec![neg(0), pos(2)]);
        assert!(solver.solve_with_assumptions(&[neg(1)]).is_sat());
        match solver.solve_with_assumptions(&[neg(0), neg(1)]) {
            SolveResult::Unsat(core) => {
                assert!(core.contains(&neg(0)));
                assert!(core.contains(&neg(1)));
            }
            other => panic!("expected UNSAT, got {other:?}"),
        }
        // assumptions are temporary
        assert!(solver.solve().is_sat());
    }

    #[test]
    fn test_push_pop_retracts_clauses() {
        let mut solver = Solver::new(1);
        solver.add_clause(vec![pos(0)]);
        solver.push();
        solver.add_clause(vec![neg(0)]);
        assert!(solver.solve().is_unsat());
        assert!(solver.pop());
        assert!(solver.solve().is_sat());
        assert!(!solver.pop());
    }

    #[test]
    fn test_conflict_budget_gives_unknown() {
        // pigeonhole 6 into 5 needs far more than one conflict
        let pigeons = 6u32;
        let holes = 5u32;
        let var = |i: u32, h: u32| i * holes + h;
        let mut solver = Solver::new((pigeons * holes) as usize);
        for i in 0..pigeons {
            solver.add_clause((0..holes).map(|h| pos(var(i, h))).collect());
        }
        for h in 0..holes {
            for i in 0..pigeons {
                for k in (i + 1)..pigeons {
                    solver.add_clause(vec![neg(var(i, h)), neg(var(k, h))]);
                }
            }
        }
        solver.set_limits(ResourceLimit::conflicts(1));
        assert_eq!(solver.solve(), SolveResult::Unknown);
        solver.set_limits(ResourceLimit::unlimited());
        assert!(solver.solve().is_unsat());
    }

    #[test]
    fn test_root_satisfied_clauses_removed() {
        let mut solver = Solver::new(4);
        solver.add_clause(vec![pos(0), pos(1)]);
        solver.add_clause(vec![neg(0), pos(2)]);
        solver.add_clause(vec![pos(1), pos(3)]);
        solver.add_clause(vec![pos(0)]);
        assert_eq!(solver.root_units(), &[pos(0), pos(2)]);
        match solver.solve() {
            SolveResult::Sat(model) => assert!(satisfies(&model, &[pos(1), pos(3)])),
            other => panic!("expected SAT, got {other:?}"),
        }
        assert_eq!(solver.stats().removed_satisfied, 2);
        assert_eq!(solver.original_clauses(), vec![vec![pos(1), pos(3)]]);
        // the removal only reruns once the root trail grows
        assert!(solver.solve().is_sat());
        assert_eq!(solver.stats().removed_satisfied, 2);
        solver.add_clause(vec![neg(1)]);
        assert!(solver.solve().is_sat());
        assert_eq!(solver.stats().removed_satisfied, 3);
        assert!(solver.original_clauses().is_empty());
    }

    fn pigeonhole(pigeons: u32, holes: u32, config: SatConfig) -> (Solver, Vec<Vec<Literal>>) {
        let var = |i: u32, h: u32| i * holes + h;
        let mut clauses = Vec::new();
        for i in 0..pigeons {
            clauses.push((0..holes).map(|h| pos(var(i, h))).collect::<Vec<_>>());
        }
        for h in 0..holes {
            for i in 0..pigeons {
                for k in (i + 1)..pigeons {
                    clauses.push(vec![neg(var(i, h)), neg(var(k, h))]);
                }
            }
        }
        let mut solver = Solver::with_theory((pigeons * holes) as usize, NoTheory, config);
        for c in &clauses {
            solver.add_clause(c.clone());
        }
        (solver, clauses)
    }

    #[test]
    fn test_random_decisions_are_seeded() {
        let config = SatConfig {
            random_var_freq: 1.0,
            seed: 7,
            ..SatConfig::default()
        };
        let (mut a, clauses) = pigeonhole(5, 5, config.clone());
        let (mut b, _) = pigeonhole(5, 5, config);
        let (ra, rb) = (a.solve(), b.solve());
        assert_eq!(ra, rb);
        assert!(a.stats().random_decisions > 0);
        assert_eq!(a.stats().random_decisions, b.stats().random_decisions);
        match ra {
            SolveResult::Sat(model) => {
                for c in &clauses {
                    assert!(satisfies(&model, c), "clause {c:?} violated");
                }
            }
            other => panic!("expected SAT, got {other:?}"),
        }

        let (mut unsat, _) = pigeonhole(
            5,
            4,
            SatConfig {
                random_var_freq: 0.3,
                ..SatConfig::default()
            },
        );
        assert!(unsat.solve().is_unsat());
    }

    #[test]
    fn test_reduce_db_keeps_locked_clauses() {
        let mut solver = Solver::new(5);
        solver.add_clause(vec![pos(0), pos(1), pos(2)]);
        let learned = solver
            .clause_db
            .add(vec![pos(3), neg(0), neg(1)], true);
        solver.attach(learned);
        let other = solver.clause_db.add(vec![pos(4), neg(0), neg(2)], true);
        solver.attach(other);
        solver.new_decision_level();
        solver.enqueue(pos(0), Reason::Decision);
        solver.new_decision_level();
        solver.enqueue(pos(1), Reason::Decision);
        assert!(solver.propagate().is_none());
        assert_eq!(solver.value(pos(3)), Some(true));
        solver.reduce_db();
        assert!(solver.clause_db.is_live(learned));
    }

    /// A theory over variables 0 and 1 that forbids both being true and
    /// deduces `!1` from `0`.
    #[derive(Default)]
    struct Exclusive {
        asserted: Vec<Literal>,
        limits: Vec<usize>,
        deductions: Vec<TheoryPropagation>,
    }

    impl TheorySolver for Exclusive {
        fn is_theory_var(&self, var: Variable) -> bool {
            var.0 < 2
        }

        fn assert_literal(&mut self, lit: Literal) -> TheoryResult {
            self.asserted.push(lit);
            if lit == pos(0) {
                self.deductions.push(TheoryPropagation {
                    literal: neg(1),
                    reason: vec![pos(0)],
                });
            }
            self.check(false)
        }

        fn check(&mut self, _complete: bool) -> TheoryResult {
            if self.asserted.contains(&pos(0)) && self.asserted.contains(&pos(1)) {
                TheoryResult::Unsat(vec![pos(0), pos(1)])
            } else {
                TheoryResult::Sat
            }
        }

        fn take_deductions(&mut self) -> Vec<TheoryPropagation> {
            std::mem::take(&mut self.deductions)
        }

        fn take_splits(&mut self, _fresh: &mut dyn FnMut() -> Variable) -> Vec<Vec<Literal>> {
            Vec::new()
        }

        fn push_backtrack_point(&mut self) {
            self.limits.push(self.asserted.len());
        }

        fn pop_backtrack_points(&mut self, n: usize) {
            let target = self.limits[self.limits.len() - n];
            self.limits.truncate(self.limits.len() - n);
            self.asserted.truncate(target);
            self.deductions.clear();
        }
    }

    #[test]
    fn test_theory_conflict_is_learned() {
        let mut solver = Solver::with_theory(3, Exclusive::default(), SatConfig::default());
        solver.add_clause(vec![pos(0), pos(2)]);
        solver.add_clause(vec![pos(1), pos(2)]);
        solver.add_clause(vec![neg(2)]);
        assert!(solver.solve().is_unsat());
    }

    #[test]
    fn test_theory_deduction_enqueued() {
        let mut solver = Solver::with_theory(3, Exclusive::default(), SatConfig::default());
        solver.add_clause(vec![pos(0)]);
        match solver.solve() {
            SolveResult::Sat(model) => {
                assert!(model[0]);
                assert!(!model[1]);
            }
            other => panic!("expected SAT, got {other:?}"),
        }
        assert!(solver.stats().theory_propagations >= 1);
    }
}
