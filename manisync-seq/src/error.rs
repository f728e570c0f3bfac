//! Error types for manisync-seq.

use thiserror::Error;

/// Errors raised by the runner's own helpers.
///
/// Step failures are the caller's error type and never pass through here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeqError {
    /// A step received a different number of runtime arguments than it needs.
    #[error("step expected {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },
}
