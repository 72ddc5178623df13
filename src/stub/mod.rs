//! Programmable stubs with call recording.
//!
//! A [`Stub`] stands in for one method of a test double. It holds a FIFO
//! queue of hooks and a default hook. Each call pops the front of the queue
//! or, once the queue is empty, runs the default hook. Every call is recorded
//! with the arguments it received and the result it produced.
//!
//! ```
//! use changeset_sources::stub::Stub;
//!
//! let stub: Stub<(u32,), Result<u32, String>> = Stub::lenient("double", |_| Ok(0));
//! stub.push_hook(|(value,)| Ok(*value * 2));
//!
//! assert_eq!(stub.call(&mut (21,)), Ok(42));
//! assert_eq!(stub.call(&mut (21,)), Ok(0));
//! assert_eq!(stub.call_count(), 2);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A function standing in for a method's implementation.
///
/// Hooks receive the call arguments mutably so they can simulate methods
/// that refresh their inputs, such as loading a changeset.
pub type Hook<A, R> = Arc<dyn Fn(&mut A) -> R + Send + Sync>;

/// One recorded invocation of a stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call<A, R> {
    /// Arguments as passed by the caller, before any hook ran.
    pub args: A,
    /// Value the stub returned.
    pub result: R,
}

struct StubState<A, R> {
    default_hook: Hook<A, R>,
    hooks: VecDeque<Hook<A, R>>,
    history: Vec<Call<A, R>>,
}

/// Hook queue, default hook, and call history for one stubbed method.
pub struct Stub<A, R> {
    name: &'static str,
    state: Mutex<StubState<A, R>>,
}

impl<A, R> Stub<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Creates a stub whose default hook returns a zero value.
    #[must_use]
    pub fn lenient<F>(name: &'static str, zero: F) -> Self
    where
        F: Fn(&mut A) -> R + Send + Sync + 'static,
    {
        Self::with_default(name, Arc::new(zero))
    }

    /// Creates a stub whose default hook panics.
    ///
    /// Strict stubs catch calls a test did not expect. Install a default hook
    /// or push hooks for every call the code under test should make.
    #[must_use]
    pub fn strict(name: &'static str) -> Self {
        Self::with_default(
            name,
            Arc::new(move |_: &mut A| -> R {
                panic!("unexpected call to {name}: no hook is configured")
            }),
        )
    }

    fn with_default(name: &'static str, default_hook: Hook<A, R>) -> Self {
        Self {
            name,
            state: Mutex::new(StubState {
                default_hook,
                hooks: VecDeque::new(),
                history: Vec::new(),
            }),
        }
    }

    /// Name of the stubbed method, used in panic messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Replaces the hook used once the queue is empty.
    pub fn set_default_hook<F>(&self, hook: F)
    where
        F: Fn(&mut A) -> R + Send + Sync + 'static,
    {
        self.lock().default_hook = Arc::new(hook);
    }

    /// Queues a hook for the next unanswered call.
    pub fn push_hook<F>(&self, hook: F)
    where
        F: Fn(&mut A) -> R + Send + Sync + 'static,
    {
        self.lock().hooks.push_back(Arc::new(hook));
    }

    /// Makes every call past the queue return `result`, whatever the arguments.
    pub fn set_default_return(&self, result: R)
    where
        R: Sync,
    {
        self.set_default_hook(move |_| result.clone());
    }

    /// Queues a hook that returns `result`, whatever the arguments.
    pub fn push_return(&self, result: R)
    where
        R: Sync,
    {
        self.push_hook(move |_| result.clone());
    }

    /// Invokes the next queued hook, or the default hook, and records the call.
    ///
    /// The lock is released while the hook runs, so hooks may call back into
    /// the same stub.
    ///
    /// # Panics
    ///
    /// Panics when the stub is strict and no hook handles the call.
    pub fn call(&self, args: &mut A) -> R {
        let hook = self.next_hook();
        let recorded = args.clone();
        let result = hook(args);
        self.lock().history.push(Call {
            args: recorded,
            result: result.clone(),
        });
        result
    }

    fn next_hook(&self) -> Hook<A, R> {
        let mut state = self.lock();
        match state.hooks.pop_front() {
            Some(hook) => hook,
            None => Arc::clone(&state.default_hook),
        }
    }

    /// Snapshot of every recorded call, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Call<A, R>> {
        self.lock().history.clone()
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().history.len()
    }

    /// Whether the stub was called exactly once.
    #[must_use]
    pub fn called_once(&self) -> bool {
        self.call_count() == 1
    }

    /// Number of queued hooks not yet consumed.
    #[must_use]
    pub fn pending_hooks(&self) -> usize {
        self.lock().hooks.len()
    }

    fn lock(&self) -> MutexGuard<'_, StubState<A, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, R> fmt::Debug for Stub<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Stub")
            .field("name", &self.name)
            .field("pending_hooks", &state.hooks.len())
            .field("calls", &state.history.len())
            .finish()
    }
}
