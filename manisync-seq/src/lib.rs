//! # manisync-seq
//!
//! Sequential step runner: threads values through an ordered chain of
//! synchronous and asynchronous steps without nesting callbacks.
//!
//! ```no_run
//! # async fn demo() -> Result<(), manisync_seq::SeqError> {
//! use manisync_seq::SequenceRunner;
//!
//! let mut seq = SequenceRunner::<i64, manisync_seq::SeqError>::new();
//! seq.add_async(|_args, next| {
//!     tokio::spawn(async move { next.resume_with(10) });
//!     Ok(())
//! });
//! seq.add_sync(|args| Ok(args.into_single()? * 10));
//! seq.add_sync(|args| {
//!     assert_eq!(args[0], 100);
//!     Ok(0)
//! });
//! seq.start([]).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod runner;

pub use error::SeqError;
pub use runner::{Args, Continuation, RunnerState, SequenceHandle, SequenceRunner, Step, StepMode};
