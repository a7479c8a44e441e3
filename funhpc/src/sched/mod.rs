//! The cooperative task scheduler.
//!
//! Many lightweight tasks to a few OS worker threads, one thread per PU
//! by default. Tasks run to completion; anything that needs to wait does
//! so through a [`future`](future::Future), either by chaining a
//! continuation (`then`, cheap, never blocks a thread) or by parking at a
//! defined suspension point (`wait`/`get`).

pub mod affinity;
pub mod future;

use std::thread::JoinHandle;

use log::error;

use future::{catch, Future, Promise};

pub(crate) type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// A fixed pool of worker threads draining one shared injector queue.
pub struct Scheduler {
    sender: Option<crossbeam_channel::Sender<Runnable>>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts `threads` workers. With a layout, each worker is pinned to
    /// its PU before it starts taking tasks.
    pub fn new(threads: usize, layout: Option<std::sync::Arc<affinity::ThreadLayout>>) -> Scheduler {
        assert!(threads > 0, "scheduler needs at least one worker");
        let (sender, receiver) = crossbeam_channel::unbounded::<Runnable>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let layout = layout.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("funhpc worker {}", index))
                    .spawn(move || {
                        if let Some(layout) = layout {
                            layout.apply_to_worker(index);
                        }
                        while let Ok(task) = receiver.recv() {
                            // A detached task's panic is logged and
                            // swallowed; tasks with observers capture
                            // failures into their future themselves.
                            if let Err(message) = catch(task) {
                                error!("detached task failed: {}", message);
                            }
                        }
                    })
                    .expect("spawning worker thread"),
            );
        }
        Scheduler { sender: Some(sender), workers }
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn execute(&self, task: Runnable) {
        self.sender
            .as_ref()
            .expect("scheduler already stopped")
            .send(task)
            .expect("scheduler already stopped");
    }

    /// Stops accepting tasks, finishes the queue, and joins the workers.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            worker.join().expect("worker thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.shutdown();
        }
    }
}

pub(crate) fn spawn_raw(task: Runnable) {
    crate::execute::runtime().scheduler().execute(task);
}

/// Runs `f` as a new task; its result (or panic) lands in the returned
/// future.
pub fn spawn<R, F>(f: F) -> Future<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let mut promise = Promise::new();
    let fut = promise.get_future();
    spawn_raw(Box::new(move || promise.complete(catch(f))));
    fut
}

/// Runs `f` as a new task with no observer.
pub fn spawn_detached<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    spawn_raw(Box::new(f));
}

/// Cooperatively yields the current worker.
pub fn yield_now() {
    std::thread::yield_now();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_tasks_complete_their_futures() {
        let future = spawn(|| 2 + 2);
        assert_eq!(future.get(), 4);
    }

    #[test]
    fn spawned_panic_lands_in_the_future() {
        let future = spawn(|| -> i32 { panic!("deliberate") });
        assert!(catch(move || future.get()).is_err());
    }

    #[test]
    fn many_tasks_drain() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let counter = Arc::new(AtomicUsize::new(0));
        let futures: Vec<_> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&counter);
                spawn(move || counter.fetch_add(1, Ordering::SeqCst))
            })
            .collect();
        for future in futures {
            future.get();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
}
