//! The runner, its steps and the continuation handed to asynchronous steps.
//!
//! ## Execution model
//!
//! 1. `start(initial)` queues `initial` as the first resume.
//! 2. Each resume pops the next step (FIFO). An empty queue means `Drained`.
//! 3. The step's bound arguments are prepended to the resume values.
//! 4. A synchronous step's return value is queued as the next resume, and
//!    the runner yields to the scheduler before processing it.
//! 5. An asynchronous step receives a [`Continuation`]; every call to it
//!    queues one resume. Until it is called the chain waits, with no timeout.
//! 6. A step error, or [`Continuation::fail`], ends the run with that error
//!    and leaves the remaining steps queued.
//!
//! Exactly one step is in flight at any time.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::SeqError;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Arguments handed to a step: bound values first, then runtime values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args<V>(Vec<V>);

impl<V> Args<V> {
    pub fn into_vec(self) -> Vec<V> {
        self.0
    }

    /// The only argument, or [`SeqError::Arity`] if there is not exactly one.
    pub fn into_single(self) -> Result<V, SeqError> {
        let got = self.0.len();
        let mut values = self.0;
        match (values.pop(), got) {
            (Some(value), 1) => Ok(value),
            _ => Err(SeqError::Arity { expected: 1, got }),
        }
    }

    /// Exactly `N` arguments as an array.
    pub fn into_array<const N: usize>(self) -> Result<[V; N], SeqError> {
        let got = self.0.len();
        self.0
            .try_into()
            .map_err(|_| SeqError::Arity { expected: N, got })
    }
}

impl<V> Deref for Args<V> {
    type Target = [V];

    fn deref(&self) -> &[V] {
        &self.0
    }
}

impl<V> IntoIterator for Args<V> {
    type Item = V;
    type IntoIter = std::vec::IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

type SyncOp<V, E> = Box<dyn FnOnce(Args<V>) -> Result<V, E> + Send>;
type AsyncOp<V, E> = Box<dyn FnOnce(Args<V>, Continuation<V, E>) -> Result<(), E> + Send>;

/// Whether a step returns its value or hands it to a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Sync,
    Async,
}

impl fmt::Display for StepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepMode::Sync => write!(f, "sync"),
            StepMode::Async => write!(f, "async"),
        }
    }
}

/// A step operation, not yet registered.
pub enum Step<V, E> {
    Sync(SyncOp<V, E>),
    Async(AsyncOp<V, E>),
}

impl<V, E> Step<V, E> {
    /// A step whose return value becomes the next step's sole argument.
    pub fn sync<F>(op: F) -> Self
    where
        F: FnOnce(Args<V>) -> Result<V, E> + Send + 'static,
    {
        Step::Sync(Box::new(op))
    }

    /// A step that advances the chain by calling its continuation.
    pub fn asynchronous<F>(op: F) -> Self
    where
        F: FnOnce(Args<V>, Continuation<V, E>) -> Result<(), E> + Send + 'static,
    {
        Step::Async(Box::new(op))
    }

    pub fn mode(&self) -> StepMode {
        match self {
            Step::Sync(_) => StepMode::Sync,
            Step::Async(_) => StepMode::Async,
        }
    }
}

impl<V, E> fmt::Debug for Step<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Step").field(&self.mode()).finish()
    }
}

struct Task<V, E> {
    step: Step<V, E>,
    bound: Vec<V>,
}

// ---------------------------------------------------------------------------
// Continuation
// ---------------------------------------------------------------------------

enum Resume<V, E> {
    Values(Vec<V>),
    Failed(E),
}

/// Advance handle given to asynchronous steps.
///
/// Every call queues one resume; calling it several times advances several
/// steps. Calls made after the run has ended are ignored.
pub struct Continuation<V, E> {
    tx: mpsc::UnboundedSender<Resume<V, E>>,
}

impl<V, E> Clone for Continuation<V, E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<V, E> fmt::Debug for Continuation<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<V, E> Continuation<V, E> {
    /// Resume with any number of values.
    pub fn resume(&self, values: impl IntoIterator<Item = V>) {
        self.send(Resume::Values(values.into_iter().collect()));
    }

    /// Resume with a single value.
    pub fn resume_with(&self, value: V) {
        self.send(Resume::Values(vec![value]));
    }

    /// Abort the run with `err`.
    pub fn fail(&self, err: E) {
        self.send(Resume::Failed(err));
    }

    /// `true` once the run this continuation belongs to has ended.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, resume: Resume<V, E>) {
        if self.tx.send(resume).is_err() {
            tracing::debug!("resume after the sequence ended; ignored");
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Not started yet.
    Idle,
    /// A step is executing or awaiting its continuation.
    Running,
    /// The queue emptied. Terminal.
    Drained,
    /// A step failed; remaining steps were left queued. Terminal.
    Aborted,
}

struct Inner<V, E> {
    queue: VecDeque<Task<V, E>>,
    state: RunnerState,
}

/// Ordered chain of steps, each run exactly once.
pub struct SequenceRunner<V, E> {
    inner: Arc<Mutex<Inner<V, E>>>,
}

/// Cloneable handle for inspecting a runner or extending its chain while it
/// runs.
pub struct SequenceHandle<V, E> {
    inner: Arc<Mutex<Inner<V, E>>>,
}

impl<V, E> Clone for SequenceHandle<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> Default for SequenceRunner<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for SequenceRunner<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SequenceRunner")
            .field("state", &inner.state)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

impl<V, E> SequenceRunner<V, E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                state: RunnerState::Idle,
            })),
        }
    }

    pub fn handle(&self) -> SequenceHandle<V, E> {
        SequenceHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Append `step`; `bound` values are prepended to its runtime arguments.
    pub fn add(&mut self, step: Step<V, E>, bound: impl IntoIterator<Item = V>) -> &mut Self {
        push(&self.inner, step, bound.into_iter().collect());
        self
    }

    pub fn add_sync<F>(&mut self, op: F) -> &mut Self
    where
        F: FnOnce(Args<V>) -> Result<V, E> + Send + 'static,
    {
        self.add(Step::sync(op), [])
    }

    pub fn add_async<F>(&mut self, op: F) -> &mut Self
    where
        F: FnOnce(Args<V>, Continuation<V, E>) -> Result<(), E> + Send + 'static,
    {
        self.add(Step::asynchronous(op), [])
    }

    pub fn add_sync_bound<F>(&mut self, bound: impl IntoIterator<Item = V>, op: F) -> &mut Self
    where
        F: FnOnce(Args<V>) -> Result<V, E> + Send + 'static,
    {
        self.add(Step::sync(op), bound)
    }

    pub fn add_async_bound<F>(&mut self, bound: impl IntoIterator<Item = V>, op: F) -> &mut Self
    where
        F: FnOnce(Args<V>, Continuation<V, E>) -> Result<(), E> + Send + 'static,
    {
        self.add(Step::asynchronous(op), bound)
    }

    pub fn state(&self) -> RunnerState {
        self.inner.lock().state
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl<V, E> SequenceRunner<V, E>
where
    V: Send + 'static,
    E: Send + 'static,
{
    /// Run the chain with `initial` as the first step's runtime arguments.
    ///
    /// Resolves with the number of steps executed once the queue drains, or
    /// with the first step error. Never resolves if an asynchronous step
    /// abandons its continuation; wrap in `tokio::time::timeout` when
    /// liveness matters. Dropping the future abandons the chain.
    pub async fn start(self, initial: impl IntoIterator<Item = V>) -> Result<usize, E> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let next = Continuation { tx };
        next.resume(initial);
        self.set_state(RunnerState::Running);

        let mut executed = 0usize;
        while let Some(resume) = rx.recv().await {
            let runtime = match resume {
                Resume::Values(values) => values,
                Resume::Failed(err) => {
                    tracing::debug!("sequence aborted by continuation after {executed} step(s)");
                    self.set_state(RunnerState::Aborted);
                    return Err(err);
                }
            };

            let task = self.inner.lock().queue.pop_front();
            let Some(Task { step, bound }) = task else {
                tracing::debug!("sequence drained after {executed} step(s)");
                self.set_state(RunnerState::Drained);
                return Ok(executed);
            };

            executed += 1;
            tracing::debug!("step {executed} ({}) starting", step.mode());
            let mut args = bound;
            args.extend(runtime);
            let args = Args(args);

            let outcome = match step {
                Step::Sync(op) => op(args).map(|value| next.resume_with(value)),
                Step::Async(op) => op(args, next.clone()),
            };
            if let Err(err) = outcome {
                tracing::debug!("step {executed} failed; sequence aborted");
                self.set_state(RunnerState::Aborted);
                return Err(err);
            }

            // The next step never runs on the stack of the one that fed it.
            tokio::task::yield_now().await;
        }

        // Unreachable in practice: `next` keeps the channel open.
        self.set_state(RunnerState::Drained);
        Ok(executed)
    }

    fn set_state(&self, state: RunnerState) {
        self.inner.lock().state = state;
    }
}

impl<V, E> SequenceHandle<V, E> {
    pub fn add(&self, step: Step<V, E>, bound: impl IntoIterator<Item = V>) {
        push(&self.inner, step, bound.into_iter().collect());
    }

    pub fn add_sync<F>(&self, op: F)
    where
        F: FnOnce(Args<V>) -> Result<V, E> + Send + 'static,
    {
        self.add(Step::sync(op), []);
    }

    pub fn add_async<F>(&self, op: F)
    where
        F: FnOnce(Args<V>, Continuation<V, E>) -> Result<(), E> + Send + 'static,
    {
        self.add(Step::asynchronous(op), []);
    }

    pub fn state(&self) -> RunnerState {
        self.inner.lock().state
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

fn push<V, E>(inner: &Mutex<Inner<V, E>>, step: Step<V, E>, bound: Vec<V>) {
    let mut inner = inner.lock();
    if inner.state == RunnerState::Drained {
        tracing::warn!("step added to a drained sequence will never run");
    }
    inner.queue.push_back(Task { step, bound });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_single_checks_arity() {
        assert_eq!(Args(vec![7]).into_single(), Ok(7));
        assert_eq!(
            Args::<i32>(vec![]).into_single(),
            Err(SeqError::Arity {
                expected: 1,
                got: 0
            })
        );
        assert_eq!(
            Args(vec![1, 2]).into_single(),
            Err(SeqError::Arity {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn into_array_checks_arity() {
        assert_eq!(Args(vec![1, 2]).into_array::<2>(), Ok([1, 2]));
        assert!(Args(vec![1, 2, 3]).into_array::<2>().is_err());
    }

    #[test]
    fn add_extends_queue_without_running() {
        let mut seq = SequenceRunner::<u8, ()>::new();
        seq.add_sync(|_| Ok(1)).add_async(|_, _| Ok(()));
        assert_eq!(seq.pending(), 2);
        assert_eq!(seq.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn empty_sequence_drains_immediately() {
        let seq = SequenceRunner::<u8, ()>::new();
        let handle = seq.handle();
        assert_eq!(seq.start([1]).await, Ok(0));
        assert_eq!(handle.state(), RunnerState::Drained);
    }

    #[tokio::test]
    async fn bound_args_precede_runtime_args() {
        let mut seq = SequenceRunner::<i32, ()>::new();
        seq.add_sync_bound([1, 2], |args| {
            assert_eq!(&*args, &[1, 2, 3]);
            Ok(4)
        });
        seq.add_async_bound([5], |args, next| {
            assert_eq!(&*args, &[5, 4]);
            next.resume([]);
            Ok(())
        });
        seq.add_sync(|args| {
            assert!(args.is_empty());
            Ok(0)
        });
        assert_eq!(seq.start([3]).await, Ok(3));
    }
}
