//! Error types for the SMT facade

use lasmt_core::CoreError;
use thiserror::Error;

/// Facade errors. All of them are caused by the caller.
#[derive(Debug, Error)]
pub enum DpllError {
    /// Unknown variable or conflicting atom declaration
    #[error(transparent)]
    Core(#[from] CoreError),

    /// More backtrack points popped than pushed
    #[error("pop of {requested} backtrack points with only {open} open")]
    ScopeUnderflow {
        /// Points the caller asked to pop
        requested: usize,
        /// Points currently open
        open: usize,
    },

    /// Explanation requested without an unsat result
    #[error("no conflict to explain: the last solve did not return unsat")]
    NoConflict,
}

/// Result type for facade operations
pub type DpllResult<T> = Result<T, DpllError>;
