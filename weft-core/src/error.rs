//! Error types for the task runtime.
//!
//! The core is a library layer, so its error surface is deliberately small:
//! allocator exhaustion is the only failure a submitter can observe at
//! runtime. Scoping violations are programming-contract violations and
//! panic instead of returning an error, and racing removals are structurally
//! absorbed by the liveness compare-and-swap rather than reported.

use thiserror::Error;

/// Errors surfaced by task submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmplaceError {
    /// The task arena could not grow another chunk.
    ///
    /// Raised only on true exhaustion, i.e. when the configured chunk limit
    /// is reached. Freeing tasks does not clear the condition until a whole
    /// chunk becomes recyclable.
    #[error("task arena exhausted: chunk limit of {limit} reached")]
    OutOfMemory {
        /// The configured maximum number of chunks.
        limit: usize,
    },
}
