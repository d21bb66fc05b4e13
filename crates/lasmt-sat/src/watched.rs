//! Two-watched-literal index.

use lasmt_core::Literal;

use crate::clause_db::ClauseRef;

/// A watch list entry.
///
/// `blocker` is some other literal of the clause; if it is already true the
/// clause is satisfied and need not be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watcher {
    /// Watched clause.
    pub clause: ClauseRef,
    /// Cheap satisfaction hint.
    pub blocker: Literal,
}

impl Watcher {
    /// Create a watcher.
    #[inline]
    pub fn new(clause: ClauseRef, blocker: Literal) -> Self {
        Watcher { clause, blocker }
    }
}

/// Per-literal watch lists. `watches[l]` holds the clauses watching `l`;
/// they are visited when `l` becomes false.
#[derive(Debug, Clone, Default)]
pub struct WatchedLists {
    watches: Vec<Vec<Watcher>>,
}

impl WatchedLists {
    /// Watch lists for `num_vars` variables.
    pub fn new(num_vars: usize) -> Self {
        WatchedLists {
            watches: vec![Vec::new(); num_vars * 2],
        }
    }

    /// Grow to cover `num_vars` variables.
    pub fn ensure_num_vars(&mut self, num_vars: usize) {
        if self.watches.len() < num_vars * 2 {
            self.watches.resize(num_vars * 2, Vec::new());
        }
    }

    /// Register `watcher` on `lit`.
    #[inline]
    pub fn add_watch(&mut self, lit: Literal, watcher: Watcher) {
        self.watches[lit.index()].push(watcher);
    }

    /// Take the list of `lit` out for processing; put it back with [`Self::restore`].
    #[inline]
    pub fn take(&mut self, lit: Literal) -> Vec<Watcher> {
        std::mem::take(&mut self.watches[lit.index()])
    }

    /// Put back a list taken with [`Self::take`], keeping entries appended meanwhile.
    #[inline]
    pub fn restore(&mut self, lit: Literal, mut list: Vec<Watcher>) {
        let slot = &mut self.watches[lit.index()];
        list.append(slot);
        *slot = list;
    }

    /// Watchers of `lit`.
    pub fn get_watches(&self, lit: Literal) -> &[Watcher] {
        &self.watches[lit.index()]
    }

    /// Drop every watcher whose clause fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(ClauseRef) -> bool) {
        for list in &mut self.watches {
            list.retain(|w| keep(w.clause));
        }
    }
}
