//! Raw remote pointers: a (process, address) pair.
//!
//! An `Rptr` is only dereferenceable on its owning process; elsewhere it
//! is an opaque identity. Lifetime management sits one level up, in
//! [`shared_rptr`](crate::remote::shared_rptr).

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct Rptr<T> {
    proc: i64,
    addr: u64,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Rptr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Rptr<T> {}

impl<T> PartialEq for Rptr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.proc == other.proc && self.addr == other.addr
    }
}

impl<T> Eq for Rptr<T> {}

impl<T> std::fmt::Debug for Rptr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rptr({}:{:#x})", self.proc, self.addr)
    }
}

impl<T> Rptr<T> {
    pub fn null() -> Rptr<T> {
        Rptr { proc: -1, addr: 0, _marker: PhantomData }
    }

    /// Wraps an address owned by process `proc`.
    pub fn new(proc: usize, ptr: *const T) -> Rptr<T> {
        Rptr { proc: proc as i64, addr: ptr as usize as u64, _marker: PhantomData }
    }

    pub fn is_null(&self) -> bool {
        self.addr == 0
    }

    pub fn get_proc(&self) -> usize {
        debug_assert!(!self.is_null());
        self.proc as usize
    }

    /// The raw pointer.
    ///
    /// # Safety
    ///
    /// Only meaningful on the owning process, and only while the pointee
    /// is kept alive by a refcount the caller can account for.
    pub unsafe fn as_ptr(&self) -> *mut T {
        debug_assert_eq!(
            self.get_proc(),
            crate::execute::rank(),
            "dereferencing a remote pointer off its owning process"
        );
        self.addr as usize as *mut T
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_survives_the_wire() {
        let x = 5i64;
        let p = Rptr::new(3, &x);
        let bytes = bincode::serialize(&p).unwrap();
        let q: Rptr<i64> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(p, q);
        assert_eq!(q.get_proc(), 3);
        assert!(!q.is_null());
        assert!(Rptr::<i64>::null().is_null());
    }
}
