//! The unit container: exactly one element.
//!
//! `Id` is the boundary shape of rank-1 containers and the identity for
//! nesting; it has no empty state.

use serde::{Deserialize, Serialize};

use crate::container::{Family, Foldable, Functor, HasBoundary, IotaMap, Monadic, Payload};
use crate::index::IRange;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T>(pub T);

pub struct IdFamily;

impl Family for IdFamily {
    type Of<T: Payload> = Id<T>;
    const MIN_SIZE: usize = 1;
    const MAX_SIZE: Option<usize> = Some(1);
}

impl Functor for IdFamily {
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Id<T>,
        args: &A,
    ) -> Id<R> {
        Id(f(&xs.0, args))
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Id<T>,
        ys: &Id<U>,
        args: &A,
    ) -> Id<R> {
        Id(f(&xs.0, &ys.0, args))
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Id<T>,
        ys: &Id<U>,
        zs: &Id<V>,
        args: &A,
    ) -> Id<R> {
        Id(f(&xs.0, &ys.0, &zs.0, args))
    }
}

impl Foldable for IdFamily {
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Id<T>,
        args: &A,
    ) -> R {
        op(z, f(&xs.0, args))
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Id<T>,
        ys: &Id<U>,
        args: &A,
    ) -> R {
        op(z, f(&xs.0, &ys.0, args))
    }

    fn msize<T: Payload>(_xs: &Id<T>) -> usize {
        1
    }

    fn head<T: Payload>(xs: &Id<T>) -> T {
        xs.0.clone()
    }

    fn last<T: Payload>(xs: &Id<T>) -> T {
        xs.0.clone()
    }
}

impl IotaMap for IdFamily {
    fn iota_map<R: Payload, A: Payload>(f: fn(i64, &A) -> R, inds: IRange, args: &A) -> Id<R> {
        assert_eq!(inds.size(), 1, "unit container needs a one-element range, got {}", inds);
        Id(f(inds.imin(), args))
    }
}

impl Monadic for IdFamily {
    fn munit<T: Payload>(x: T) -> Id<T> {
        Id(x)
    }

    fn mjoin<T: Payload>(xss: &Id<Id<T>>) -> Id<T> {
        xss.0.clone()
    }

    fn mextract<T: Payload>(xs: &Id<T>) -> T {
        xs.0.clone()
    }
}

impl HasBoundary for IdFamily {
    type Bnd = IdFamily;

    fn boundary<T: Payload>(xs: &Id<T>, i: usize) -> Id<T> {
        assert!(i < 2);
        xs.clone()
    }
}
