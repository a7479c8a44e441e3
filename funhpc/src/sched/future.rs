//! Futures and promises for cooperative tasks.
//!
//! A promise and its futures share one state object. The state starts
//! empty and fills exactly once, with a value or with the text of a task
//! panic; consumers observing a failed state re-raise the panic. A
//! deferred state instead carries a task that runs at most once, on first
//! observation.
//!
//! Waiting chains do not block worker threads: `then` registers a
//! continuation that the completing side hands to the scheduler. Blocking
//! `wait`/`get` park the calling thread on a condvar and are meant for
//! the edges of a computation (or the few operations the dispatcher
//! defines as suspension points).

use std::sync::{Arc, Condvar, Mutex};

/// Captured failure of a task: the panic message.
pub type TaskError = String;

pub(crate) type TaskResult<T> = Result<T, TaskError>;

/// Runs `f`, capturing a panic as a `TaskError`.
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> TaskResult<R> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(|payload| {
        if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_owned()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "task panicked".to_owned()
        }
    })
}

enum Value<T> {
    Pending,
    Ready(TaskResult<T>),
    /// A unique consumer moved the value out.
    Taken,
}

type Continuation<T> = Box<dyn FnOnce(&mut Value<T>) + Send>;
type Deferred<T> = Box<dyn FnOnce() -> TaskResult<T> + Send>;

struct Inner<T> {
    value: Value<T>,
    deferred: Option<Deferred<T>>,
    continuations: Vec<Continuation<T>>,
}

pub(crate) struct State<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T: Send + 'static> State<T> {
    fn new() -> Arc<State<T>> {
        Arc::new(State {
            inner: Mutex::new(Inner {
                value: Value::Pending,
                deferred: None,
                continuations: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    fn complete(&self, result: TaskResult<T>) {
        let mut inner = self.inner.lock().expect("future state poisoned");
        assert!(
            matches!(inner.value, Value::Pending),
            "future state completed twice"
        );
        inner.value = Value::Ready(result);
        self.cond.notify_all();
        let continuations = std::mem::take(&mut inner.continuations);
        for continuation in continuations {
            continuation(&mut inner.value);
        }
    }

    fn is_ready(&self) -> bool {
        !matches!(
            self.inner.lock().expect("future state poisoned").value,
            Value::Pending
        )
    }

    /// Runs the deferred task, if any, on the calling thread.
    fn run_deferred(&self) {
        let deferred = self.inner.lock().expect("future state poisoned").deferred.take();
        if let Some(task) = deferred {
            self.complete(task());
        }
    }

    /// Moves the deferred task, if any, onto the scheduler.
    fn force_deferred(this: &Arc<State<T>>) {
        let deferred = this.inner.lock().expect("future state poisoned").deferred.take();
        if let Some(task) = deferred {
            let state = Arc::clone(this);
            crate::sched::spawn_raw(Box::new(move || state.complete(task())));
        }
    }

    fn wait(&self) {
        self.run_deferred();
        let mut inner = self.inner.lock().expect("future state poisoned");
        while matches!(inner.value, Value::Pending) {
            inner = self.cond.wait(inner).expect("future state poisoned");
        }
    }

    /// Attaches a continuation, running it immediately when the state is
    /// already filled.
    fn add_continuation(this: &Arc<State<T>>, continuation: Continuation<T>) {
        State::force_deferred(this);
        let mut inner = this.inner.lock().expect("future state poisoned");
        match inner.value {
            Value::Pending => inner.continuations.push(continuation),
            _ => continuation(&mut inner.value),
        }
    }
}

fn take_value<T>(value: &mut Value<T>) -> TaskResult<T> {
    match std::mem::replace(value, Value::Taken) {
        Value::Ready(result) => result,
        _ => panic!("future value observed twice"),
    }
}

fn clone_value<T: Clone>(value: &mut Value<T>) -> TaskResult<T> {
    match value {
        Value::Ready(result) => result.clone(),
        _ => panic!("shared future value missing"),
    }
}

fn unwrap_result<T>(result: TaskResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(message) => panic!("task failed: {}", message),
    }
}

// Promise /////////////////////////////////////////////////////////////////////

/// The producing end of a future.
pub struct Promise<T: Send + 'static> {
    state: Arc<State<T>>,
    future_taken: bool,
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T: Send + 'static> Promise<T> {
    pub fn new() -> Promise<T> {
        Promise { state: State::new(), future_taken: false }
    }

    /// The future observing this promise; may be taken once.
    pub fn get_future(&mut self) -> Future<T> {
        assert!(!self.future_taken, "future already retrieved");
        self.future_taken = true;
        Future { state: Some(Arc::clone(&self.state)) }
    }

    pub fn set_value(self, value: T) {
        self.state.complete(Ok(value));
    }

    pub fn set_error(self, error: TaskError) {
        self.state.complete(Err(error));
    }

    pub(crate) fn complete(self, result: TaskResult<T>) {
        self.state.complete(result);
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        // An abandoned promise fails its observers instead of hanging
        // them. After set_value/set_error the state is no longer pending
        // and this is a no-op.
        let abandoned = {
            let inner = self.state.inner.lock().expect("future state poisoned");
            matches!(inner.value, Value::Pending) && inner.deferred.is_none()
        };
        if abandoned {
            self.state.complete(Err("broken promise".to_owned()));
        }
    }
}

// Future //////////////////////////////////////////////////////////////////////

/// A single-consumer handle to a value that becomes ready.
pub struct Future<T: Send + 'static> {
    state: Option<Arc<State<T>>>,
}

impl<T: Send + 'static> Default for Future<T> {
    fn default() -> Self {
        Future { state: None }
    }
}

impl<T: Send + 'static> Future<T> {
    /// An invalid future, observing nothing.
    pub fn invalid() -> Future<T> {
        Future::default()
    }

    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    pub fn ready(&self) -> bool {
        self.state.as_ref().expect("ready() on an invalid future").is_ready()
    }

    /// Blocks until the value is ready, running a deferred task in place.
    pub fn wait(&self) {
        self.state.as_ref().expect("wait() on an invalid future").wait();
    }

    /// Waits and moves the value out; re-raises a captured task panic.
    pub fn get(mut self) -> T {
        let state = self.state.take().expect("get() on an invalid future");
        state.wait();
        let mut inner = state.inner.lock().expect("future state poisoned");
        unwrap_result(take_value(&mut inner.value))
    }

    /// Chains `f` onto the value; `f` runs on the scheduler once the value
    /// is ready. Errors bypass `f`.
    pub fn then<R, F>(mut self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let state = self.state.take().expect("then() on an invalid future");
        let mut promise = Promise::new();
        let future = promise.get_future();
        State::add_continuation(&state, Box::new(move |value| {
            let result = take_value(value);
            crate::sched::spawn_raw(Box::new(move || {
                promise.complete(result.and_then(|x| catch(move || f(x))));
            }));
        }));
        future
    }

    /// Converts into a multi-consumer future.
    pub fn share(mut self) -> SharedFuture<T> {
        SharedFuture { state: self.state.take().expect("share() on an invalid future") }
    }
}

/// A ready future.
pub fn make_ready_future<T: Send + 'static>(value: T) -> Future<T> {
    let mut promise = Promise::new();
    let future = promise.get_future();
    promise.set_value(value);
    future
}

/// A future whose task runs at most once, on first observation.
pub fn make_deferred_future<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let state = State::new();
    state.inner.lock().expect("future state poisoned").deferred =
        Some(Box::new(move || catch(f)));
    Future { state: Some(state) }
}

// SharedFuture ////////////////////////////////////////////////////////////////

/// A multi-consumer future; `get` clones the value.
pub struct SharedFuture<T: Send + 'static> {
    state: Arc<State<T>>,
}

impl<T: Send + 'static> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        SharedFuture { state: Arc::clone(&self.state) }
    }
}

impl<T: Send + 'static> SharedFuture<T> {
    pub fn ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn wait(&self) {
        self.state.wait();
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.state.wait();
        let mut inner = self.state.inner.lock().expect("future state poisoned");
        unwrap_result(clone_value(&mut inner.value))
    }

    /// Chains `f` onto a clone of the value.
    pub fn then<R, F>(&self, f: F) -> Future<R>
    where
        T: Clone,
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let mut promise = Promise::new();
        let future = promise.get_future();
        State::add_continuation(&self.state, Box::new(move |value| {
            let result = clone_value(value);
            crate::sched::spawn_raw(Box::new(move || {
                promise.complete(result.and_then(|x| catch(move || f(x))));
            }));
        }));
        future
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promise_fills_future() {
        let mut promise = Promise::new();
        let future = promise.get_future();
        assert!(future.valid());
        assert!(!future.ready());
        promise.set_value(42);
        assert!(future.ready());
        assert_eq!(future.get(), 42);
    }

    #[test]
    fn deferred_runs_once_on_first_wait() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        let future = make_deferred_future(|| {
            RUNS.fetch_add(1, Ordering::SeqCst);
            7
        });
        assert!(!future.ready());
        future.wait();
        future.wait();
        assert_eq!(future.get(), 7);
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "task failed")]
    fn panics_reraise_at_the_consumer() {
        let future = make_deferred_future(|| -> i32 { panic!("boom") });
        future.get();
    }

    #[test]
    fn broken_promise_fails_observers() {
        let future = {
            let mut promise: Promise<i32> = Promise::new();
            promise.get_future()
        };
        assert!(future.ready());
        assert!(catch(move || future.get()).is_err());
    }

    #[test]
    fn shared_future_clones_value() {
        let mut promise = Promise::new();
        let shared = promise.get_future().share();
        let other = shared.clone();
        promise.set_value(vec![1, 2, 3]);
        assert_eq!(shared.get(), vec![1, 2, 3]);
        assert_eq!(other.get(), vec![1, 2, 3]);
    }

    #[test]
    fn then_chains_values() {
        let future = make_ready_future(5).then(|x| x * 2).then(|x| x + 1);
        assert_eq!(future.get(), 11);
    }
}
