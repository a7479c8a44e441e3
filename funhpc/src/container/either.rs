//! The size-polymorphic sum container.
//!
//! One static type holding either a small inlined collection (the left
//! family, typically [`MaxArray`](crate::container::maxarray::MaxArray))
//! or an overflow collection (the right family). `iota_map` picks the
//! side from the requested size against the left family's bound; every
//! other operation dispatches on whichever side is active.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::container::{Family, Foldable, Functor, IotaMap, Payload};
use crate::index::IRange;

/// Exactly one branch is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }
}

pub struct EitherFamily<A, B> {
    _marker: PhantomData<(A, B)>,
}

const fn min_size(a: usize, b: usize) -> usize {
    if a < b {
        a
    } else {
        b
    }
}

const fn max_size(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a > b { a } else { b }),
        _ => None,
    }
}

impl<A: Family, B: Family> Family for EitherFamily<A, B> {
    type Of<T: Payload> = Either<A::Of<T>, B::Of<T>>;
    const MIN_SIZE: usize = min_size(A::MIN_SIZE, B::MIN_SIZE);
    const MAX_SIZE: Option<usize> = max_size(A::MAX_SIZE, B::MAX_SIZE);
}

impl<A: Family, B: Family> EitherFamily<A, B> {
    /// True when a collection of `size` elements fits the left family.
    fn fits_left(size: usize) -> bool {
        size >= A::MIN_SIZE && A::MAX_SIZE.map_or(true, |max| size <= max)
    }

    /// The unit container, preferring the left side when it can hold one
    /// element.
    pub fn munit<T: Payload>(x: T) -> Either<A::Of<T>, B::Of<T>>
    where
        A: IotaMap,
        B: IotaMap,
    {
        // Route through iota_map so both sides build the same way.
        fn pick<T: Payload>(_i: i64, x: &T) -> T {
            x.clone()
        }
        if Self::fits_left(1) {
            Either::Left(A::iota_map(pick::<T>, IRange::new(1), &x))
        } else {
            Either::Right(B::iota_map(pick::<T>, IRange::new(1), &x))
        }
    }

    /// The empty container, preferring the left side when it can be empty.
    pub fn mzero<T: Payload>() -> Either<A::Of<T>, B::Of<T>>
    where
        A: IotaMap,
        B: IotaMap,
    {
        fn never<T: Payload>(_i: i64, _args: &()) -> T {
            unreachable!("empty range produces no elements")
        }
        if A::MIN_SIZE == 0 {
            Either::Left(A::iota_map(never::<T>, IRange::new(0), &()))
        } else {
            assert_eq!(B::MIN_SIZE, 0, "neither side of the sum can be empty");
            Either::Right(B::iota_map(never::<T>, IRange::new(0), &()))
        }
    }

    pub fn mextract<T: Payload>(xs: &Either<A::Of<T>, B::Of<T>>) -> T
    where
        A: Foldable,
        B: Foldable,
    {
        Self::head(xs)
    }
}

impl<A: Functor, B: Functor> Functor for EitherFamily<A, B> {
    fn fmap<T: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &Ar) -> R,
        xs: &Either<A::Of<T>, B::Of<T>>,
        args: &Ar,
    ) -> Either<A::Of<R>, B::Of<R>> {
        match xs {
            Either::Left(xs) => Either::Left(A::fmap(f, xs, args)),
            Either::Right(xs) => Either::Right(B::fmap(f, xs, args)),
        }
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &U, &Ar) -> R,
        xs: &Either<A::Of<T>, B::Of<T>>,
        ys: &Either<A::Of<U>, B::Of<U>>,
        args: &Ar,
    ) -> Either<A::Of<R>, B::Of<R>> {
        match (xs, ys) {
            (Either::Left(xs), Either::Left(ys)) => Either::Left(A::fmap2(f, xs, ys, args)),
            (Either::Right(xs), Either::Right(ys)) => Either::Right(B::fmap2(f, xs, ys, args)),
            _ => panic!("fmap2 over sums with different active sides"),
        }
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &U, &V, &Ar) -> R,
        xs: &Either<A::Of<T>, B::Of<T>>,
        ys: &Either<A::Of<U>, B::Of<U>>,
        zs: &Either<A::Of<V>, B::Of<V>>,
        args: &Ar,
    ) -> Either<A::Of<R>, B::Of<R>> {
        match (xs, ys, zs) {
            (Either::Left(xs), Either::Left(ys), Either::Left(zs)) => {
                Either::Left(A::fmap3(f, xs, ys, zs, args))
            }
            (Either::Right(xs), Either::Right(ys), Either::Right(zs)) => {
                Either::Right(B::fmap3(f, xs, ys, zs, args))
            }
            _ => panic!("fmap3 over sums with different active sides"),
        }
    }
}

impl<A: Foldable, B: Foldable> Foldable for EitherFamily<A, B> {
    fn fold_map<T: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &Ar) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Either<A::Of<T>, B::Of<T>>,
        args: &Ar,
    ) -> R {
        match xs {
            Either::Left(xs) => A::fold_map(f, op, z, xs, args),
            Either::Right(xs) => B::fold_map(f, op, z, xs, args),
        }
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &U, &Ar) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Either<A::Of<T>, B::Of<T>>,
        ys: &Either<A::Of<U>, B::Of<U>>,
        args: &Ar,
    ) -> R {
        match (xs, ys) {
            (Either::Left(xs), Either::Left(ys)) => A::fold_map2(f, op, z, xs, ys, args),
            (Either::Right(xs), Either::Right(ys)) => B::fold_map2(f, op, z, xs, ys, args),
            _ => panic!("fold_map2 over sums with different active sides"),
        }
    }

    fn msize<T: Payload>(xs: &Either<A::Of<T>, B::Of<T>>) -> usize {
        match xs {
            Either::Left(xs) => A::msize(xs),
            Either::Right(xs) => B::msize(xs),
        }
    }

    fn head<T: Payload>(xs: &Either<A::Of<T>, B::Of<T>>) -> T {
        match xs {
            Either::Left(xs) => A::head(xs),
            Either::Right(xs) => B::head(xs),
        }
    }

    fn last<T: Payload>(xs: &Either<A::Of<T>, B::Of<T>>) -> T {
        match xs {
            Either::Left(xs) => A::last(xs),
            Either::Right(xs) => B::last(xs),
        }
    }
}

impl<A: IotaMap, B: IotaMap> IotaMap for EitherFamily<A, B> {
    fn iota_map<R: Payload, Ar: Payload>(
        f: fn(i64, &Ar) -> R,
        inds: IRange,
        args: &Ar,
    ) -> Either<A::Of<R>, B::Of<R>> {
        if Self::fits_left(inds.size()) {
            Either::Left(A::iota_map(f, inds, args))
        } else {
            Either::Right(B::iota_map(f, inds, args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::maxarray::MaxArrayFamily;
    use crate::container::vector::VectorFamily;

    type Small = EitherFamily<MaxArrayFamily<4>, VectorFamily>;

    fn ident(i: i64, _: &()) -> i64 {
        i
    }

    fn get(x: &i64, _: &()) -> i64 {
        *x
    }

    fn plus(a: i64, b: i64) -> i64 {
        a + b
    }

    #[test]
    fn small_ranges_stay_inline() {
        let xs = Small::iota_map(ident, IRange::new(3), &());
        assert!(xs.is_left());
        assert_eq!(Small::msize(&xs), 3);
        assert_eq!(Small::fold_map(get, plus, 0, &xs, &()), 3);
    }

    #[test]
    fn large_ranges_overflow_to_vector() {
        let xs = Small::iota_map(ident, IRange::new(100), &());
        assert!(xs.is_right());
        assert_eq!(Small::msize(&xs), 100);
        assert_eq!(Small::head(&xs), 0);
        assert_eq!(Small::last(&xs), 99);
    }

    #[test]
    fn munit_prefers_the_inline_side() {
        let xs = Small::munit(7i64);
        assert!(xs.is_left());
        assert_eq!(Small::mextract(&xs), 7);
        assert_eq!(Small::msize(&Small::mzero::<i64>()), 0);
    }
}
