//! Clause store: a generation-checked slot arena.
//!
//! Clauses are referenced by [`ClauseRef`] handles (slot index plus
//! generation) from watch lists and reasons. Deleting a clause bumps its
//! slot's generation, so a stale handle is caught on access instead of
//! reading a recycled clause.

use lasmt_core::Literal;

/// Handle to a clause in the [`ClauseDB`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClauseRef {
    index: u32,
    generation: u32,
}

impl ClauseRef {
    /// Slot index of this handle.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A stored clause.
#[derive(Debug, Clone)]
pub struct Clause {
    /// Literals; positions 0 and 1 are the watched ones.
    pub lits: Vec<Literal>,
    /// Bump-and-decay activity used by clause deletion.
    pub activity: f64,
    /// Learned by conflict analysis (deletable) or original.
    pub learned: bool,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    clause: Option<Clause>,
}

/// Arena of original and learned clauses.
#[derive(Debug, Clone, Default)]
pub struct ClauseDB {
    slots: Vec<Slot>,
    free: Vec<u32>,
    num_original: usize,
    num_learned: usize,
}

impl ClauseDB {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a clause and return its handle.
    pub fn add(&mut self, lits: Vec<Literal>, learned: bool) -> ClauseRef {
        if learned {
            self.num_learned += 1;
        } else {
            self.num_original += 1;
        }
        let clause = Clause {
            lits,
            activity: 0.0,
            learned,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.clause.is_none());
            slot.clause = Some(clause);
            ClauseRef {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                clause: Some(clause),
            });
            ClauseRef {
                index,
                generation: 0,
            }
        }
    }

    /// Free the slot of `cref`. The handle must not be used afterwards.
    pub fn delete(&mut self, cref: ClauseRef) {
        let slot = &mut self.slots[cref.index()];
        debug_assert_eq!(slot.generation, cref.generation, "stale clause handle");
        if let Some(clause) = slot.clause.take() {
            if clause.learned {
                self.num_learned -= 1;
            } else {
                self.num_original -= 1;
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(cref.index);
        }
    }

    /// Whether `cref` still names a live clause.
    pub fn is_live(&self, cref: ClauseRef) -> bool {
        self.slots
            .get(cref.index())
            .is_some_and(|s| s.generation == cref.generation && s.clause.is_some())
    }

    /// Access a live clause.
    #[inline]
    pub fn get(&self, cref: ClauseRef) -> &Clause {
        let slot = &self.slots[cref.index()];
        debug_assert_eq!(slot.generation, cref.generation, "stale clause handle");
        match &slot.clause {
            Some(c) => c,
            None => panic!("access to deleted clause {cref:?}"),
        }
    }

    /// Mutable access to a live clause.
    #[inline]
    pub fn get_mut(&mut self, cref: ClauseRef) -> &mut Clause {
        let slot = &mut self.slots[cref.index()];
        debug_assert_eq!(slot.generation, cref.generation, "stale clause handle");
        match &mut slot.clause {
            Some(c) => c,
            None => panic!("access to deleted clause {cref:?}"),
        }
    }

    /// Literals of a live clause.
    #[inline]
    pub fn literals(&self, cref: ClauseRef) -> &[Literal] {
        &self.get(cref).lits
    }

    /// Handles of all live clauses in slot order.
    pub fn iter_refs(&self) -> impl Iterator<Item = ClauseRef> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.clause.as_ref().map(|_| ClauseRef {
                index: i as u32,
                generation: s.generation,
            })
        })
    }

    /// Handles of live learned clauses.
    pub fn learned_refs(&self) -> Vec<ClauseRef> {
        self.iter_refs().filter(|&c| self.get(c).learned).collect()
    }

    /// Number of live original clauses.
    pub fn num_original(&self) -> usize {
        self.num_original
    }

    /// Number of live learned clauses.
    pub fn num_learned(&self) -> usize {
        self.num_learned
    }

    /// Total live clauses.
    pub fn len(&self) -> usize {
        self.num_original + self.num_learned
    }

    /// True if no clause is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Multiply every learned clause activity by `factor`.
    pub fn rescale_activities(&mut self, factor: f64) {
        for slot in &mut self.slots {
            if let Some(c) = slot.clause.as_mut() {
                if c.learned {
                    c.activity *= factor;
                }
            }
        }
    }
}
