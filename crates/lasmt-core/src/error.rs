//! Errors raised for caller-supplied input.
//!
//! Theory infeasibility and budget exhaustion are ordinary results and never
//! appear here. Protocol violations panic.

use thiserror::Error;

use crate::linear::ArithVar;
use crate::literal::Variable;

/// Caller-caused failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A literal referenced a variable that was never created.
    #[error("unknown Boolean variable {0:?}")]
    UnknownVariable(Variable),
    /// A term referenced an arithmetic variable that was never created.
    #[error("unknown arithmetic variable {0}")]
    UnknownArithVar(ArithVar),
    /// The variable is already bound to a different atom.
    #[error("variable {0:?} is already declared as a different atom")]
    ConflictingAtom(Variable),
    /// Malformed DIMACS text.
    #[error("dimacs parse error at line {line}: {message}")]
    Dimacs {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
    /// Text that does not spell a sort or an inequality.
    #[error("malformed {what}: `{text}`")]
    Malformed {
        /// What was being parsed
        what: &'static str,
        /// The offending text
        text: String,
    },
    /// I/O failure while reading or writing solver snapshots.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn malformed(what: &'static str, text: &str) -> Self {
        CoreError::Malformed {
            what,
            text: text.to_string(),
        }
    }
}

/// Result alias for [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
