//! The in-process refcounted cell: zero or one element behind an `Arc`.
//!
//! This is the local pointer-shaped container; its cross-process sibling
//! is [`Proxy`](crate::remote::proxy::Proxy). Copies share the payload,
//! which is destroyed when the last in-process reference drops.

use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::container::{Family, Foldable, Functor, IotaMap, Monadic, Monoidal, Payload};
use crate::index::IRange;

#[derive(Clone, Debug, Default)]
pub struct Shared<T> {
    ptr: Option<Arc<T>>,
}

impl<T> Shared<T> {
    pub fn new(x: T) -> Shared<T> {
        Shared { ptr: Some(Arc::new(x)) }
    }

    pub fn empty() -> Shared<T> {
        Shared { ptr: None }
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.ptr.as_deref()
    }

    pub fn get_arc(&self) -> Option<&Arc<T>> {
        self.ptr.as_ref()
    }
}

impl<T> From<Arc<T>> for Shared<T> {
    fn from(ptr: Arc<T>) -> Shared<T> {
        Shared { ptr: Some(ptr) }
    }
}

impl<T: PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Shared<T>) -> bool {
        self.ptr.as_deref() == other.ptr.as_deref()
    }
}

// Serialization copies the payload; sharing is per-process only.
impl<T: Serialize> Serialize for Shared<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ptr.as_deref().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Shared<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Shared<T>, D::Error> {
        Ok(Shared { ptr: Option::<T>::deserialize(deserializer)?.map(Arc::new) })
    }
}

pub struct SharedFamily;

impl Family for SharedFamily {
    type Of<T: Payload> = Shared<T>;
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: Option<usize> = Some(1);
}

impl Functor for SharedFamily {
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Shared<T>,
        args: &A,
    ) -> Shared<R> {
        match xs.get() {
            Some(x) => Shared::new(f(x, args)),
            None => Shared::empty(),
        }
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Shared<T>,
        ys: &Shared<U>,
        args: &A,
    ) -> Shared<R> {
        match (xs.get(), ys.get()) {
            (Some(x), Some(y)) => Shared::new(f(x, y, args)),
            (None, None) => Shared::empty(),
            _ => panic!("fmap2 over shared cells of different occupancy"),
        }
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Shared<T>,
        ys: &Shared<U>,
        zs: &Shared<V>,
        args: &A,
    ) -> Shared<R> {
        match (xs.get(), ys.get(), zs.get()) {
            (Some(x), Some(y), Some(z)) => Shared::new(f(x, y, z, args)),
            (None, None, None) => Shared::empty(),
            _ => panic!("fmap3 over shared cells of different occupancy"),
        }
    }
}

impl Foldable for SharedFamily {
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Shared<T>,
        args: &A,
    ) -> R {
        match xs.get() {
            Some(x) => op(z, f(x, args)),
            None => z,
        }
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Shared<T>,
        ys: &Shared<U>,
        args: &A,
    ) -> R {
        match (xs.get(), ys.get()) {
            (Some(x), Some(y)) => op(z, f(x, y, args)),
            (None, None) => z,
            _ => panic!("fold_map2 over shared cells of different occupancy"),
        }
    }

    fn msize<T: Payload>(xs: &Shared<T>) -> usize {
        usize::from(!xs.is_empty())
    }

    fn head<T: Payload>(xs: &Shared<T>) -> T {
        xs.get().expect("head of an empty shared cell").clone()
    }

    fn last<T: Payload>(xs: &Shared<T>) -> T {
        Self::head(xs)
    }
}

impl IotaMap for SharedFamily {
    fn iota_map<R: Payload, A: Payload>(f: fn(i64, &A) -> R, inds: IRange, args: &A) -> Shared<R> {
        assert!(inds.size() <= 1, "shared cell holds at most one element, got {}", inds);
        if inds.empty() {
            Shared::empty()
        } else {
            Shared::new(f(inds.imin(), args))
        }
    }
}

impl Monadic for SharedFamily {
    fn munit<T: Payload>(x: T) -> Shared<T> {
        Shared::new(x)
    }

    fn mjoin<T: Payload>(xss: &Shared<Shared<T>>) -> Shared<T> {
        match xss.get() {
            Some(xs) => xs.clone(),
            None => Shared::empty(),
        }
    }

    fn mextract<T: Payload>(xs: &Shared<T>) -> T {
        Self::head(xs)
    }
}

impl Monoidal for SharedFamily {
    fn mzero<T: Payload>() -> Shared<T> {
        Shared::empty()
    }

    /// Keeps the first occupied cell.
    fn mplus<T: Payload>(xs: &Shared<T>, ys: &Shared<T>) -> Shared<T> {
        if xs.is_empty() {
            ys.clone()
        } else {
            xs.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(x: &i64, _: &()) -> i64 {
        x * 2
    }

    #[test]
    fn copies_share_payload() {
        let xs = Shared::new(5i64);
        let ys = xs.clone();
        assert!(std::ptr::eq(
            xs.get_arc().unwrap().as_ref(),
            ys.get_arc().unwrap().as_ref()
        ));
    }

    #[test]
    fn monad_laws_hold_for_the_cell() {
        let xs = SharedFamily::munit(3i64);
        assert_eq!(SharedFamily::msize(&xs), 1);
        assert_eq!(SharedFamily::mextract(&xs), 3);
        assert_eq!(SharedFamily::mjoin(&SharedFamily::munit(xs.clone())), xs);
        let ys = SharedFamily::fmap(double, &xs, &());
        assert_eq!(SharedFamily::mextract(&ys), 6);
        assert_eq!(SharedFamily::msize(&SharedFamily::mzero::<i64>()), 0);
    }

    #[test]
    fn serialization_copies_the_payload() {
        let xs = Shared::new(7i64);
        let bytes = bincode::serialize(&xs).unwrap();
        let ys: Shared<i64> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(ys.get(), Some(&7));
    }
}
