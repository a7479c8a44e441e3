//! Serializable tasks: a function pointer and its bound arguments.
//!
//! Every process runs the identical binary, so a function pointer can
//! cross the wire as its offset from an anchor symbol in this crate; the
//! receiver adds its own anchor address back. The payload is a bincode
//! record of the bound arguments. A task is a `()`-returning closure in
//! spirit: run it and it invokes the function on the decoded arguments.
//!
//! The offset trick carries no type information; [`RawFn`] values must
//! only ever be resolved at the type they were taken from. The task
//! constructors below keep that pairing by monomorphizing one decoding
//! shim per argument type.

use serde::{Deserialize, Serialize};

use crate::container::Payload;

fn anchor() {}

/// A function pointer in wire form: its offset from [`anchor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFn {
    offset: i64,
}

impl RawFn {
    /// Wraps a function pointer address, e.g. `RawFn::of(f as usize)`.
    pub fn of(addr: usize) -> RawFn {
        RawFn { offset: (addr as i64).wrapping_sub(anchor as usize as i64) }
    }

    fn addr(&self) -> usize {
        (anchor as usize as i64).wrapping_add(self.offset) as usize
    }

    /// Recovers the pointer at type `F`, which must be the `fn` type the
    /// address was taken from.
    ///
    /// # Safety
    ///
    /// Undefined behavior if `F` differs from the original pointer type.
    pub unsafe fn get<F: Copy>(&self) -> F {
        assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        let addr = self.addr();
        std::mem::transmute_copy::<usize, F>(&addr)
    }
}

/// A task deliverable to any process: shim pointer plus encoded
/// arguments.
#[derive(Serialize, Deserialize)]
pub struct Task {
    shim: RawFn,
    payload: Vec<u8>,
}

fn run_shim<A: Payload>(payload: Vec<u8>) {
    let (f, args): (RawFn, A) =
        bincode::deserialize(&payload).expect("malformed task payload");
    let f: fn(A) = unsafe { f.get() };
    f(args);
}

impl Task {
    /// Bundles `f` with its arguments. Serialization of the arguments
    /// happens here, at enqueue time on the sending process.
    pub fn bind<A: Payload>(f: fn(A), args: &A) -> Task {
        let payload = bincode::serialize(&(RawFn::of(f as usize), args))
            .expect("task arguments failed to serialize");
        Task { shim: RawFn::of(run_shim::<A> as usize), payload }
    }

    /// Decodes the arguments and invokes the function.
    pub fn run(self) {
        let shim: fn(Vec<u8>) = unsafe { self.shim.get() };
        shim(self.payload);
    }

    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("task failed to serialize")
    }

    pub fn decode(bytes: &[u8]) -> Task {
        bincode::deserialize(bytes).expect("malformed task frame")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    static SEEN: AtomicI64 = AtomicI64::new(0);

    fn record(x: i64) {
        SEEN.store(x, Ordering::SeqCst);
    }

    #[test]
    fn roundtrip_through_bytes_and_run() {
        let task = Task::bind(record, &1234);
        let bytes = task.encode();
        Task::decode(&bytes).run();
        assert_eq!(SEEN.load(Ordering::SeqCst), 1234);
    }

    #[test]
    fn rawfn_resolves_to_the_same_pointer() {
        let raw = RawFn::of(record as usize);
        let f: fn(i64) = unsafe { raw.get() };
        assert_eq!(f as usize, record as usize);
    }
}
