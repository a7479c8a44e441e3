//! The per-peer send queue and its wake signal.
//!
//! Producers (any fiber) append encoded frames under a mutex; the peer's
//! send thread drains the whole queue in one swap. Critical sections are
//! O(1) appends or swaps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::Thread;

/// A signal appropriate to wake a single thread.
///
/// The first thread to call `wait` registers itself as the thread to wake.
/// The first call returns immediately so that pings sent before any wait
/// are not lost; callers must treat wake-ups as possibly spurious.
#[derive(Clone)]
pub struct Signal {
    thread: Arc<RwLock<Option<Thread>>>,
}

impl Default for Signal {
    fn default() -> Self {
        Signal { thread: Arc::new(RwLock::new(None)) }
    }
}

impl Signal {
    /// Blocks unless or until `ping` is called.
    pub fn wait(&self) {
        if self.thread.read().expect("signal poisoned").is_none() {
            *self.thread.write().expect("signal poisoned") = Some(std::thread::current());
        } else {
            std::thread::park();
        }
    }

    /// Unblocks the current or next call to `wait`.
    pub fn ping(&self) {
        if let Some(thread) = self.thread.read().expect("signal poisoned").as_ref() {
            thread.unpark();
        }
    }
}

struct Inner {
    frames: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
    dirty: Signal,
}

/// Queue of encoded frames bound for one peer process.
#[derive(Clone)]
pub struct SendQueue {
    inner: Arc<Inner>,
}

impl SendQueue {
    pub fn new() -> Self {
        SendQueue {
            inner: Arc::new(Inner {
                frames: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                dirty: Signal::default(),
            }),
        }
    }

    /// Appends one frame; wakes the send thread when the queue transitions
    /// from empty to non-empty.
    pub fn push(&self, frame: Vec<u8>) {
        let was_empty = {
            let mut frames = self.inner.frames.lock().expect("send queue poisoned");
            let was_empty = frames.is_empty();
            frames.push_back(frame);
            was_empty
        };
        if was_empty {
            self.inner.dirty.ping();
        }
    }

    /// Moves all queued frames into `stash`, clearing the queue.
    pub fn drain_into(&self, stash: &mut Vec<Vec<u8>>) {
        let mut frames = self.inner.frames.lock().expect("send queue poisoned");
        stash.extend(frames.drain(..));
    }

    /// True when no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.inner.frames.lock().expect("send queue poisoned").is_empty()
    }

    /// Marks the queue closed; the send thread finishes the remaining
    /// frames, writes the shutdown frame, and exits.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.dirty.ping();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Parks until the queue is pinged (new frame or close).
    pub fn wait(&self) {
        self.inner.dirty.wait();
    }
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain() {
        let queue = SendQueue::new();
        queue.push(vec![1, 2, 3]);
        queue.push(vec![4]);
        let mut stash = Vec::new();
        queue.drain_into(&mut stash);
        assert_eq!(stash, vec![vec![1, 2, 3], vec![4]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn close_wakes_waiter() {
        let queue = SendQueue::new();
        let waiter = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                while !queue.is_closed() {
                    queue.wait();
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(10));
        queue.close();
        waiter.join().unwrap();
    }
}
