// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

use crate::dag::ValidationReport;

#[derive(Error, Debug)]
pub enum MulticError {
    /// A run or watch was requested while another one was still active.
    /// Fatal to that call only; orchestrator state is unchanged.
    #[error("Concurrent compilation: a run or watch session is already active.")]
    ConcurrentCompilation,

    /// The compiler set failed dependency validation. The report carries
    /// missing-dependency errors first, then the sorted cycle listing.
    #[error("{0}")]
    InvalidDependencyGraph(ValidationReport),

    /// A compiler's run or watch action failed.
    #[error("compiler '{compiler}' failed")]
    UnitAction {
        compiler: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading a per-compiler resource off the aggregate is ambiguous;
    /// there is one per compiler, not one for the set.
    #[error("Cannot read {0} of a MultiCompiler: the aggregate read is ambiguous.")]
    AmbiguousFileSystemRead(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MulticError>;
