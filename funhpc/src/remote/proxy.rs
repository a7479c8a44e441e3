//! The remote proxy: a future of a distributed pointer.
//!
//! A `Proxy<T>` is a first-class handle to a value on some process: a
//! shared future of a [`SharedRptr`] plus a cached owning-process id,
//! written at most once when first observed. Proxies are copyable; copies
//! share the future's state.
//!
//! Mapping over a proxy is asynchronous: the function ships to the owning
//! process, where the payload is local, and the result proxy's owner is
//! the same process. Folding is a synchronous remote call. `unwrap`
//! flattens a proxy of a proxy without routing the payload through the
//! calling process: only the small handle crosses the wire.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::container::{Family, Foldable, Functor, IotaMap, Monadic, Monoidal, Payload};
use crate::execute::rank;
use crate::index::IRange;
use crate::remote::exec::{rexec_async, rexec_sync};
use crate::remote::shared_rptr::{Packed, SharedRptr};
use crate::remote::task::RawFn;
use crate::sched::future::{Future, SharedFuture};
use crate::sched::spawn;

const PROC_UNKNOWN: i64 = -1;

pub struct Proxy<T: Payload> {
    robj: Option<SharedFuture<SharedRptr<T>>>,
    proc: Arc<AtomicI64>,
}

impl<T: Payload> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        Proxy { robj: self.robj.clone(), proc: Arc::clone(&self.proc) }
    }
}

impl<T: Payload> Default for Proxy<T> {
    fn default() -> Self {
        Proxy::invalid()
    }
}

impl<T: Payload> std::fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.valid() {
            write!(f, "proxy(invalid)")
        } else {
            write!(f, "proxy(proc {})", self.proc.load(Ordering::Relaxed))
        }
    }
}

fn proc_cache(proc: i64) -> Arc<AtomicI64> {
    Arc::new(AtomicI64::new(proc))
}

impl<T: Payload> Proxy<T> {
    /// The empty proxy.
    pub fn invalid() -> Self {
        Proxy { robj: None, proc: proc_cache(PROC_UNKNOWN) }
    }

    /// A proxy owning a freshly allocated local payload.
    pub fn from_value(x: T) -> Self {
        Proxy::from_shared_rptr(SharedRptr::new(x))
    }

    pub fn from_arc(x: Arc<T>) -> Self {
        Proxy::from_shared_rptr(SharedRptr::from_arc(x))
    }

    pub fn from_shared_rptr(r: SharedRptr<T>) -> Self {
        if !r.is_valid() {
            return Proxy::invalid();
        }
        let proc = r.get_proc() as i64;
        Proxy {
            robj: Some(crate::sched::future::make_ready_future(r).share()),
            proc: proc_cache(proc),
        }
    }

    /// A proxy over a pointer still being produced; the owner is unknown
    /// until the future resolves.
    pub fn from_future_rptr(fut: Future<SharedRptr<T>>) -> Self {
        Proxy { robj: Some(fut.share()), proc: proc_cache(PROC_UNKNOWN) }
    }

    fn from_future_rptr_at(proc: usize, fut: Future<SharedRptr<T>>) -> Self {
        Proxy { robj: Some(fut.share()), proc: proc_cache(proc as i64) }
    }

    /// A proxy over a payload being materialized on this process.
    pub fn from_future_arc(fut: Future<Arc<T>>) -> Self {
        Proxy::from_future_rptr_at(rank(), fut.then(SharedRptr::from_arc))
    }

    /// Flattens a future proxy into a proxy; the inner handle is awaited
    /// on a task, not on the caller.
    pub fn from_future_proxy(fut: Future<Proxy<T>>) -> Self {
        Proxy::from_future_rptr(fut.then(|p| {
            p.wait();
            p.rptr()
        }))
    }

    fn from_future_proxy_at(proc: usize, fut: Future<Proxy<T>>) -> Self {
        Proxy::from_future_rptr_at(
            proc,
            fut.then(move |p| {
                p.wait();
                debug_assert_eq!(p.get_proc(), proc);
                p.rptr()
            }),
        )
    }

    pub fn valid(&self) -> bool {
        self.robj.is_some()
    }

    fn shared(&self) -> &SharedFuture<SharedRptr<T>> {
        self.robj.as_ref().expect("operation on an invalid proxy")
    }

    /// The resolved handle; blocks until ready.
    fn rptr(&self) -> SharedRptr<T> {
        self.shared().get()
    }

    pub fn ready(&self) -> bool {
        self.shared().ready()
    }

    pub fn wait(&self) {
        self.shared().wait();
        self.cache_proc();
    }

    fn cache_proc(&self) {
        if self.proc.load(Ordering::Relaxed) < 0 {
            let proc = self.rptr().get_proc() as i64;
            // A benign race may store the same value twice.
            self.proc.store(proc, Ordering::Relaxed);
        }
    }

    /// True once the owning process is known without blocking.
    pub fn proc_ready(&self) -> bool {
        assert!(self.valid());
        if self.proc.load(Ordering::Relaxed) >= 0 {
            return true;
        }
        if !self.ready() {
            return false;
        }
        self.cache_proc();
        true
    }

    /// The owning process; blocks until known, then stays cached.
    pub fn get_proc(&self) -> usize {
        assert!(self.valid());
        let cached = self.proc.load(Ordering::Relaxed);
        if cached >= 0 {
            return cached as usize;
        }
        let proc = self.rptr().get_proc();
        self.proc.store(proc as i64, Ordering::Relaxed);
        proc
    }

    /// The owning process as a future; never blocks the caller.
    pub fn get_proc_future(&self) -> Future<usize> {
        assert!(self.valid());
        if self.proc_ready() {
            return crate::sched::future::make_ready_future(self.get_proc());
        }
        self.shared().then(|r| r.get_proc())
    }

    pub fn local(&self) -> bool {
        self.get_proc() == rank()
    }

    /// The payload; requires a local, ready proxy.
    pub fn get_arc(&self) -> Arc<T> {
        let r = self.rptr();
        assert!(r.local(), "dereferencing a proxy off its owning process");
        r.get_arc().clone()
    }

    /// A proxy whose payload is materialized on the calling process.
    /// Already-local proxies are returned as copies; remote ones fetch
    /// the payload by value through the owner.
    pub fn make_local(&self) -> Proxy<T> {
        assert!(self.valid());
        if self.proc_ready() && self.local() {
            return self.clone();
        }
        let p = self.clone();
        Proxy::from_future_arc(spawn(move || {
            if p.get_proc() == rank() {
                p.rptr().get_arc().clone()
            } else {
                rexec_sync(p.get_proc(), fetch_from_proxy::<T>, p.clone()).0
            }
        }))
    }

    fn mextract_value(&self) -> T {
        let local = self.make_local();
        local.wait();
        (*local.get_arc()).clone()
    }
}

fn fetch_from_proxy<T: Payload>(p: Proxy<T>) -> Packed<T> {
    // Runs on the owner; the handle deserialized local there.
    p.wait();
    Packed(p.get_arc())
}

impl<T: Payload> PartialEq for Proxy<T> {
    /// Identity of the referenced payload; blocks until both handles are
    /// known.
    fn eq(&self, other: &Self) -> bool {
        match (self.valid(), other.valid()) {
            (false, false) => true,
            (true, true) => self.rptr() == other.rptr(),
            _ => false,
        }
    }
}

impl<T: Payload> Serialize for Proxy<T> {
    /// Waits for the handle; only the handle crosses the wire.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.robj {
            None => (None::<SharedRptr<T>>, PROC_UNKNOWN).serialize(serializer),
            Some(shared) => {
                let r = shared.get();
                let proc = r.get_proc() as i64;
                (Some(r), proc).serialize(serializer)
            }
        }
    }
}

impl<'de, T: Payload> Deserialize<'de> for Proxy<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (r, _proc): (Option<SharedRptr<T>>, i64) = Deserialize::deserialize(deserializer)?;
        Ok(match r {
            Some(r) => Proxy::from_shared_rptr(r),
            None => Proxy::invalid(),
        })
    }
}

/// Flattens `Proxy<Proxy<T>>` without copying the payload through this
/// process: the owner of the outer proxy materializes the inner handle
/// and forwards it.
pub fn unwrap<T: Payload>(pp: &Proxy<Proxy<T>>) -> Proxy<T> {
    if !pp.valid() {
        return Proxy::invalid();
    }
    if pp.proc_ready() && pp.ready() && pp.local() {
        return (*pp.get_arc()).clone();
    }
    let pp = pp.clone();
    Proxy::from_future_proxy(spawn(move || pp.mextract_value()))
}

/// Allocates the payload on the calling process, asynchronously.
pub fn make_local_proxy<T: Payload>(x: T) -> Proxy<T> {
    Proxy::from_future_rptr_at(rank(), spawn(move || SharedRptr::new(x)))
}

/// Allocates the payload on process `dest`.
pub fn make_remote_proxy<T: Payload>(dest: usize, x: T) -> Proxy<T> {
    remote_call(dest, make_proxy_shim::<T>, x)
}

fn make_proxy_shim<T: Payload>(x: T) -> T {
    x
}

/// Runs `f(args)` on this process, returning a proxy of the result.
pub fn local_call<A: Payload, R: Payload>(f: fn(A) -> R, args: A) -> Proxy<R> {
    Proxy::from_future_rptr_at(rank(), spawn(move || SharedRptr::new(f(args))))
}

fn remote_call_shim<A: Payload, R: Payload>((f, args): (RawFn, A)) -> Proxy<R> {
    let f: fn(A) -> R = unsafe { f.get() };
    local_call(f, args)
}

/// Runs `f(args)` on process `dest`, returning a proxy of the result
/// that lives there.
pub fn remote_call<A: Payload, R: Payload>(dest: usize, f: fn(A) -> R, args: A) -> Proxy<R> {
    if dest == rank() {
        return local_call(f, args);
    }
    let fut = rexec_async(dest, remote_call_shim::<A, R>, (RawFn::of(f as usize), args));
    Proxy::from_future_proxy_at(dest, fut)
}

// The container view //////////////////////////////////////////////////////////

pub struct ProxyFamily;

impl Family for ProxyFamily {
    type Of<T: Payload> = Proxy<T>;
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: Option<usize> = Some(1);
}

/// Ships `shim(payload)` to `p`'s owner; defers the dispatch to a task
/// when the owner is not yet known or the handle not yet serializable
/// without blocking.
fn dispatch_on_owner<T: Payload, P: Payload, R: Payload>(
    p: &Proxy<T>,
    shim: fn(P) -> R,
    payload: P,
) -> (Option<usize>, Future<R>) {
    if p.proc_ready() {
        let dest = p.get_proc();
        if dest == rank() {
            (Some(dest), spawn(move || shim(payload)))
        } else if p.ready() {
            (Some(dest), rexec_async(dest, shim, payload))
        } else {
            // Serializing the payload would wait for the handle; do so on
            // a task rather than on the caller.
            (Some(dest), spawn(move || rexec_sync(dest, shim, payload)))
        }
    } else {
        let p = p.clone();
        (
            None,
            spawn(move || {
                let dest = p.get_proc();
                if dest == rank() {
                    shim(payload)
                } else {
                    rexec_sync(dest, shim, payload)
                }
            }),
        )
    }
}

fn into_proxy_result<R: Payload>(at: Option<usize>, fut: Future<Proxy<R>>) -> Proxy<R> {
    match at {
        Some(proc) => Proxy::from_future_proxy_at(proc, fut),
        None => Proxy::from_future_proxy(fut),
    }
}

fn proxy_fmap_shim<T: Payload, R: Payload, A: Payload>(
    (f, p, args): (RawFn, Proxy<T>, A),
) -> Proxy<R> {
    let f: fn(&T, &A) -> R = unsafe { f.get() };
    p.wait();
    let x = p.get_arc();
    Proxy::from_value(f(&x, &args))
}

fn proxy_fmap2_shim<T: Payload, U: Payload, R: Payload, A: Payload>(
    (f, p, q, args): (RawFn, Proxy<T>, Proxy<U>, A),
) -> Proxy<R> {
    let f: fn(&T, &U, &A) -> R = unsafe { f.get() };
    p.wait();
    // The second payload is pulled to this process when remote.
    let q = q.make_local();
    q.wait();
    let x = p.get_arc();
    let y = q.get_arc();
    Proxy::from_value(f(&x, &y, &args))
}

fn proxy_fmap3_shim<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
    (f, p, q, s, args): (RawFn, Proxy<T>, Proxy<U>, Proxy<V>, A),
) -> Proxy<R> {
    let f: fn(&T, &U, &V, &A) -> R = unsafe { f.get() };
    p.wait();
    let q = q.make_local();
    let s = s.make_local();
    q.wait();
    s.wait();
    let x = p.get_arc();
    let y = q.get_arc();
    let z = s.get_arc();
    Proxy::from_value(f(&x, &y, &z, &args))
}

impl Functor for ProxyFamily {
    /// Asynchronous: the function runs on the owner; the result lives
    /// there too.
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Proxy<T>,
        args: &A,
    ) -> Proxy<R> {
        if !xs.valid() {
            return Proxy::invalid();
        }
        let payload = (RawFn::of(f as usize), xs.clone(), args.clone());
        let (at, fut) = dispatch_on_owner(xs, proxy_fmap_shim::<T, R, A>, payload);
        into_proxy_result(at, fut)
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Proxy<T>,
        ys: &Proxy<U>,
        args: &A,
    ) -> Proxy<R> {
        if !xs.valid() {
            assert!(!ys.valid(), "fmap2 over proxies of different occupancy");
            return Proxy::invalid();
        }
        let payload = (RawFn::of(f as usize), xs.clone(), ys.clone(), args.clone());
        let (at, fut) = dispatch_on_owner(xs, proxy_fmap2_shim::<T, U, R, A>, payload);
        into_proxy_result(at, fut)
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Proxy<T>,
        ys: &Proxy<U>,
        zs: &Proxy<V>,
        args: &A,
    ) -> Proxy<R> {
        if !xs.valid() {
            assert!(!ys.valid() && !zs.valid(), "fmap3 over proxies of different occupancy");
            return Proxy::invalid();
        }
        let payload =
            (RawFn::of(f as usize), xs.clone(), ys.clone(), zs.clone(), args.clone());
        let (at, fut) = dispatch_on_owner(xs, proxy_fmap3_shim::<T, U, V, R, A>, payload);
        into_proxy_result(at, fut)
    }
}

fn proxy_fold_shim<T: Payload, R: Payload, A: Payload>(
    (f, op, z, p, args): (RawFn, RawFn, R, Proxy<T>, A),
) -> R {
    let f: fn(&T, &A) -> R = unsafe { f.get() };
    let op: fn(R, R) -> R = unsafe { op.get() };
    p.wait();
    let x = p.get_arc();
    op(z, f(&x, &args))
}

fn proxy_fold2_shim<T: Payload, U: Payload, R: Payload, A: Payload>(
    (f, op, z, p, q, args): (RawFn, RawFn, R, Proxy<T>, Proxy<U>, A),
) -> R {
    let f: fn(&T, &U, &A) -> R = unsafe { f.get() };
    let op: fn(R, R) -> R = unsafe { op.get() };
    p.wait();
    let q = q.make_local();
    q.wait();
    let x = p.get_arc();
    let y = q.get_arc();
    op(z, f(&x, &y, &args))
}

impl Foldable for ProxyFamily {
    /// Synchronous remote call: blocks the calling fiber, not the thread
    /// pool.
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Proxy<T>,
        args: &A,
    ) -> R {
        if !xs.valid() {
            return z;
        }
        let payload = (RawFn::of(f as usize), RawFn::of(op as usize), z, xs.clone(), args.clone());
        let dest = xs.get_proc();
        if dest == rank() {
            proxy_fold_shim(payload)
        } else {
            rexec_sync(dest, proxy_fold_shim::<T, R, A>, payload)
        }
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Proxy<T>,
        ys: &Proxy<U>,
        args: &A,
    ) -> R {
        if !xs.valid() {
            assert!(!ys.valid(), "fold_map2 over proxies of different occupancy");
            return z;
        }
        let payload = (
            RawFn::of(f as usize),
            RawFn::of(op as usize),
            z,
            xs.clone(),
            ys.clone(),
            args.clone(),
        );
        let dest = xs.get_proc();
        if dest == rank() {
            proxy_fold2_shim(payload)
        } else {
            rexec_sync(dest, proxy_fold2_shim::<T, U, R, A>, payload)
        }
    }

    fn msize<T: Payload>(xs: &Proxy<T>) -> usize {
        usize::from(xs.valid())
    }

    fn head<T: Payload>(xs: &Proxy<T>) -> T {
        assert!(xs.valid(), "head of an empty proxy");
        xs.mextract_value()
    }

    fn last<T: Payload>(xs: &Proxy<T>) -> T {
        Self::head(xs)
    }
}

impl IotaMap for ProxyFamily {
    fn iota_map<R: Payload, A: Payload>(f: fn(i64, &A) -> R, inds: IRange, args: &A) -> Proxy<R> {
        assert!(inds.size() <= 1, "proxy holds at most one element, got {}", inds);
        if inds.empty() {
            Proxy::invalid()
        } else {
            Proxy::from_value(f(inds.imin(), args))
        }
    }
}

impl Monadic for ProxyFamily {
    fn munit<T: Payload>(x: T) -> Proxy<T> {
        make_local_proxy(x)
    }

    fn mjoin<T: Payload>(xss: &Proxy<Proxy<T>>) -> Proxy<T> {
        unwrap(xss)
    }

    fn mextract<T: Payload>(xs: &Proxy<T>) -> T {
        assert!(xs.valid(), "mextract from an empty proxy");
        xs.mextract_value()
    }
}

impl Monoidal for ProxyFamily {
    fn mzero<T: Payload>() -> Proxy<T> {
        Proxy::invalid()
    }

    /// Keeps the first occupied proxy.
    fn mplus<T: Payload>(xs: &Proxy<T>, ys: &Proxy<T>) -> Proxy<T> {
        if xs.valid() {
            xs.clone()
        } else {
            ys.clone()
        }
    }
}
