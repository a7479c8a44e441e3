//! The refcounted distributed pointer.
//!
//! Every holder owns a local *manager*: on the owning process the manager
//! holds the payload directly; elsewhere it records the payload's remote
//! pointer and a backpointer to the owner's manager. Managers are
//! refcounted locally with atomic counters; crossing the wire moves
//! exactly one refcount unit from the sending manager to the receiving
//! one, using point-to-point increment/decrement tasks — no global
//! registry, no stop-the-world.
//!
//! Serialization writes the payload identity plus (owner, origin)
//! manager pointers and pre-increments the sender's count, the unit being
//! transferred. Deserialization either shortcuts to the payload (arrived
//! back at the owner: take a payload reference, return the unit to the
//! origin) or records the owner and, when origin and owner differ, routes
//! the unit owner-ward: the owner increments for the new holder, then
//! releases the origin's transferred unit and the receiver's temporary
//! self-pin. The self-pin keeps the new manager alive until the owner has
//! observed the handover.
//!
//! The payload is destroyed exactly once, on the owner, when the last
//! unit anywhere is released. Destruction is eventual: in-flight
//! decrements may delay it arbitrarily.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::container::Payload;
use crate::execute::rank;
use crate::remote::exec::{rexec, rexec_async};
use crate::remote::rptr::Rptr;
use crate::sched::future::{make_ready_future, Future};

pub(crate) struct Manager<T: Send + Sync + 'static> {
    /// The payload; present exactly on the owning process.
    obj: Option<Arc<T>>,
    /// Identity of the payload on its owning process.
    robj: Rptr<T>,
    refcount: AtomicIsize,
    /// The owner's manager; `None` on the owning process.
    owner: Option<Rptr<Manager<T>>>,
}

impl<T: Send + Sync + 'static> Manager<T> {
    fn invariant(&self) -> bool {
        if self.owner.is_none() {
            self.obj.is_some() && self.robj.get_proc() == rank()
        } else {
            self.obj.is_none()
                && self.robj.get_proc() != rank()
                && self.owner.expect("checked").get_proc() == self.robj.get_proc()
        }
    }

    fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one unit; frees the manager when the count reaches zero,
    /// returning a remote holder's unit to the owner.
    unsafe fn decref(ptr: *mut Manager<T>) {
        if (*ptr).refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            let mgr = Box::from_raw(ptr);
            if let Some(owner) = mgr.owner {
                rexec(owner.get_proc(), decref_msg::<T>, owner);
            }
        }
    }

    fn alloc_owner(obj: Arc<T>) -> *mut Manager<T> {
        let robj = Rptr::new(rank(), Arc::as_ptr(&obj));
        let mgr = Box::new(Manager {
            obj: Some(obj),
            robj,
            refcount: AtomicIsize::new(1),
            owner: None,
        });
        debug_assert!(mgr.invariant());
        Box::into_raw(mgr)
    }
}

fn decref_msg<T: Send + Sync + 'static>(mgr: Rptr<Manager<T>>) {
    unsafe { Manager::decref(mgr.as_ptr()) }
}

/// Runs on the owner: take the new holder's unit, then release the
/// origin's transferred unit and the holder's temporary self-pin.
fn incref_then_decref2<T: Send + Sync + 'static>(
    (owner, origin, holder): (Rptr<Manager<T>>, Rptr<Manager<T>>, Rptr<Manager<T>>),
) {
    unsafe { (*owner.as_ptr()).incref() };
    rexec(origin.get_proc(), decref_msg::<T>, origin);
    rexec(holder.get_proc(), decref_msg::<T>, holder);
}

/// A movable, copyable handle to an object on one specific process.
pub struct SharedRptr<T: Send + Sync + 'static> {
    mgr: *mut Manager<T>,
}

unsafe impl<T: Send + Sync + 'static> Send for SharedRptr<T> {}
unsafe impl<T: Send + Sync + 'static> Sync for SharedRptr<T> {}

impl<T: Send + Sync + 'static> Default for SharedRptr<T> {
    fn default() -> Self {
        SharedRptr { mgr: std::ptr::null_mut() }
    }
}

impl<T: Send + Sync + 'static> SharedRptr<T> {
    /// The empty handle.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Allocates a payload owned by this process.
    pub fn new(x: T) -> Self {
        Self::from_arc(Arc::new(x))
    }

    pub fn from_arc(obj: Arc<T>) -> Self {
        SharedRptr { mgr: Manager::alloc_owner(obj) }
    }

    fn mgr(&self) -> &Manager<T> {
        debug_assert!(!self.mgr.is_null());
        unsafe { &*self.mgr }
    }

    pub fn is_valid(&self) -> bool {
        !self.mgr.is_null()
    }

    /// True when the payload lives on this process.
    pub fn local(&self) -> bool {
        assert!(self.is_valid());
        self.mgr().owner.is_none()
    }

    /// The owning process.
    pub fn get_proc(&self) -> usize {
        assert!(self.is_valid());
        self.mgr().robj.get_proc()
    }

    /// Identity of the payload; equal across all handles to one object.
    pub fn get_rptr(&self) -> Rptr<T> {
        assert!(self.is_valid());
        self.mgr().robj
    }

    /// The payload. Fails off the owning process; use
    /// [`make_local_shared`] to fetch a copy first.
    pub fn get_arc(&self) -> &Arc<T> {
        assert!(self.is_valid() && self.local(), "dereferencing a non-local shared_rptr");
        self.mgr().obj.as_ref().expect("owner manager without payload")
    }

    pub fn reset(&mut self) {
        if !self.mgr.is_null() {
            unsafe { Manager::decref(self.mgr) };
            self.mgr = std::ptr::null_mut();
        }
    }
}

impl<T: Send + Sync + 'static> std::ops::Deref for SharedRptr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get_arc()
    }
}

impl<T: Send + Sync + 'static> Clone for SharedRptr<T> {
    fn clone(&self) -> Self {
        if !self.mgr.is_null() {
            self.mgr().incref();
        }
        SharedRptr { mgr: self.mgr }
    }
}

impl<T: Send + Sync + 'static> Drop for SharedRptr<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: Send + Sync + 'static> PartialEq for SharedRptr<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (true, true) => self.mgr().robj == other.mgr().robj,
            _ => false,
        }
    }
}

impl<T: Send + Sync + 'static> Eq for SharedRptr<T> {}

impl<T: Send + Sync + 'static> std::fmt::Debug for SharedRptr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "shared_rptr({:?})", self.mgr().robj)
        } else {
            write!(f, "shared_rptr(null)")
        }
    }
}

impl<T: Send + Sync + 'static> Serialize for SharedRptr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.is_valid() {
            return (Rptr::<T>::null(), Rptr::<Manager<T>>::null(), Rptr::<Manager<T>>::null())
                .serialize(serializer);
        }
        let mgr = self.mgr();
        let origin: Rptr<Manager<T>> = Rptr::new(rank(), self.mgr);
        let owner = mgr.owner.unwrap_or(origin);
        // The unit being transferred to the receiver.
        mgr.incref();
        (mgr.robj, owner, origin).serialize(serializer)
    }
}

impl<'de, T: Send + Sync + 'static> Deserialize<'de> for SharedRptr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (robj, owner, origin): (Rptr<T>, Rptr<Manager<T>>, Rptr<Manager<T>>) =
            Deserialize::deserialize(deserializer)?;
        if robj.is_null() {
            return Ok(SharedRptr::invalid());
        }
        let me = rank();
        if owner.get_proc() == me {
            // The payload is local: shortcut to it and return the
            // transferred unit to the origin.
            let obj = unsafe { (*owner.as_ptr()).obj.clone() }
                .expect("owner manager without payload");
            let mgr = Box::into_raw(Box::new(Manager {
                obj: Some(obj),
                robj,
                refcount: AtomicIsize::new(1),
                owner: None,
            }));
            rexec(origin.get_proc(), decref_msg::<T>, origin);
            Ok(SharedRptr { mgr })
        } else {
            let transit = owner.get_proc() != origin.get_proc();
            // With the unit parked at a third process, pin ourselves
            // until the owner has taken it over.
            let mgr = Box::into_raw(Box::new(Manager {
                obj: None,
                robj,
                refcount: AtomicIsize::new(if transit { 2 } else { 1 }),
                owner: Some(owner),
            }));
            if transit {
                let holder: Rptr<Manager<T>> = Rptr::new(me, mgr);
                rexec(owner.get_proc(), incref_then_decref2::<T>, (owner, origin, holder));
            }
            Ok(SharedRptr { mgr })
        }
    }
}

/// A payload traveling by value; sharing resumes on arrival.
pub struct Packed<T>(pub Arc<T>);

impl<T> Clone for Packed<T> {
    fn clone(&self) -> Self {
        Packed(Arc::clone(&self.0))
    }
}

impl<T: Serialize> Serialize for Packed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Packed<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Packed(Arc::new(T::deserialize(deserializer)?)))
    }
}

fn fetch_payload<T: Payload>(r: SharedRptr<T>) -> Packed<T> {
    // Runs on the owner, where the handle deserialized local.
    Packed(r.get_arc().clone())
}

/// A future payload reference local to this process, fetching a copy
/// from the owner when needed.
pub fn make_local_shared<T: Payload>(r: &SharedRptr<T>) -> Future<Arc<T>> {
    assert!(r.is_valid());
    if r.local() {
        return make_ready_future(r.get_arc().clone());
    }
    rexec_async(r.get_proc(), fetch_payload::<T>, r.clone()).then(|packed| packed.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts drops into its own counter so parallel tests do not
    /// interfere.
    struct Probe(&'static AtomicUsize);

    impl Drop for Probe {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn copies_then_drop_destroys_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let r0 = SharedRptr::new(Probe(&DROPS));
        let r1 = r0.clone();
        let r2 = r1.clone();
        assert!(r0.local());
        assert_eq!(r0, r1);
        drop(r0);
        drop(r1);
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);
        drop(r2);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wire_roundtrip_on_the_owner_destroys_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let r0 = SharedRptr::new(Probe(&DROPS));
        // Serialize transfers a unit; deserializing on the owning process
        // shortcuts to the payload and returns the unit to the origin.
        let bytes = bincode::serialize(&r0).unwrap();
        let r1: SharedRptr<Probe> = bincode::deserialize(&bytes).unwrap();
        assert!(r1.local());
        assert_eq!(r0, r1);
        drop(r1);
        drop(r0);
        // The returned unit travels through a local task.
        crate::execute::quiesce();
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_handles_compare_equal() {
        let a: SharedRptr<i64> = SharedRptr::invalid();
        let b: SharedRptr<i64> = SharedRptr::default();
        assert!(!a.is_valid());
        assert_eq!(a, b);
        let bytes = bincode::serialize(&a).unwrap();
        let c: SharedRptr<i64> = bincode::deserialize(&bytes).unwrap();
        assert!(!c.is_valid());
    }

    #[test]
    fn make_local_is_immediate_on_the_owner() {
        let r = SharedRptr::new(31i64);
        let local = make_local_shared(&r);
        assert_eq!(*local.get(), 31);
    }
}
