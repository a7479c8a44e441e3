//! Remote execution of tasks, detached and with results.
//!
//! `rexec` fires a task at a process and forgets it (the task still
//! registers with the local outstanding-work counter, so the termination
//! barrier does not outrun it). `rexec_async` returns a future for the
//! remote result: the callee computes, then sends a completion task back
//! to the origin, which looks up the pending promise in the reply table.
//! `rexec_sync` is the blocking form used by synchronous remote folds.
//!
//! When the destination is the calling process (always the case in
//! single-process mode) the transport is bypassed and the task becomes a
//! plain scheduler spawn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::container::Payload;
use crate::execute::runtime;
use crate::sched::future::{catch, Future, Promise, TaskError};
use crate::remote::task::{RawFn, Task};

/// Runs `f(args)` on process `dest`, detached.
pub fn rexec<A: Payload>(dest: usize, f: fn(A), args: A) {
    let rt = runtime();
    if dest == rt.rank() {
        rt.spawn_counted(Box::new(move || f(args)));
    } else {
        let task = Task::bind(f, &args);
        rt.comm().send_task(dest, task.encode());
    }
}

/// Runs `f(args)` on process `dest`; the result (or the text of the
/// remote panic) arrives in the returned future.
pub fn rexec_async<A: Payload, R: Payload>(dest: usize, f: fn(A) -> R, args: A) -> Future<R> {
    let rt = runtime();
    if dest == rt.rank() {
        return crate::sched::spawn(move || f(args));
    }
    let (id, future) = rt.replies().register::<R>();
    let call = RemoteCall { origin: rt.rank(), id, f: RawFn::of(f as usize), args };
    rexec(dest, run_and_reply::<A, R>, call);
    future
}

/// Runs `f(args)` on process `dest` and blocks the calling fiber for the
/// result.
pub fn rexec_sync<A: Payload, R: Payload>(dest: usize, f: fn(A) -> R, args: A) -> R {
    rexec_async(dest, f, args).get()
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "A: serde::Serialize", deserialize = "A: serde::de::DeserializeOwned"))]
struct RemoteCall<A> {
    origin: usize,
    id: u64,
    f: RawFn,
    args: A,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "R: serde::Serialize", deserialize = "R: serde::de::DeserializeOwned"))]
struct Reply<R> {
    id: u64,
    result: Result<R, TaskError>,
}

fn run_and_reply<A: Payload, R: Payload>(call: RemoteCall<A>) {
    let f: fn(A) -> R = unsafe { call.f.get() };
    let args = call.args;
    let result = catch(move || f(args));
    rexec(call.origin, complete_reply::<R>, Reply { id: call.id, result });
}

fn complete_reply<R: Payload>(reply: Reply<R>) {
    runtime().replies().complete::<R>(reply.id, reply.result);
}

/// Pending promises of remote calls, keyed by call id.
pub(crate) struct ReplyTable {
    next: AtomicU64,
    pending: Mutex<HashMap<u64, Box<dyn std::any::Any + Send>>>,
}

impl ReplyTable {
    pub(crate) fn new() -> ReplyTable {
        ReplyTable { next: AtomicU64::new(0), pending: Mutex::new(HashMap::new()) }
    }

    fn register<R: Send + 'static>(&self) -> (u64, Future<R>) {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let mut promise = Promise::<R>::new();
        let future = promise.get_future();
        self.pending
            .lock()
            .expect("reply table poisoned")
            .insert(id, Box::new(promise));
        (id, future)
    }

    fn complete<R: Send + 'static>(&self, id: u64, result: Result<R, TaskError>) {
        let entry = self.pending.lock().expect("reply table poisoned").remove(&id);
        match entry {
            Some(boxed) => {
                let promise = *boxed
                    .downcast::<Promise<R>>()
                    .expect("reply completed at the wrong type");
                promise.complete(result);
            }
            None => warn!("dropping reply for unknown call {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add((a, b): (i64, i64)) -> i64 {
        a + b
    }

    fn boom(_: ()) -> i64 {
        panic!("remote failure")
    }

    #[test]
    fn local_bypass_returns_results() {
        // Single-process runtime: destination == rank, no serialization.
        assert_eq!(rexec_sync(0, add, (2, 3)), 5);
    }

    #[test]
    fn local_bypass_captures_panics() {
        let future = rexec_async(0, boom, ());
        assert!(catch(move || future.get()).is_err());
    }

    #[test]
    fn detached_local_tasks_run() {
        use std::sync::atomic::AtomicBool;
        static RAN: AtomicBool = AtomicBool::new(false);
        fn set(_: ()) {
            RAN.store(true, Ordering::SeqCst);
        }
        rexec(0, set, ());
        crate::execute::quiesce();
        assert!(RAN.load(Ordering::SeqCst));
    }
}
