//! The nested container: a pointer-shaped outer layer holding an
//! array-shaped inner layer.
//!
//! With a remote pointer outside (`ProxyFamily`) and a vector or grid
//! inside, a nested container is distributed data: the elements live
//! wherever the outer slots live, and every operation forwards through
//! the outer layer to run where the data is. The forwarded inner
//! operation is itself a `fn` pointer plus arguments, so it crosses the
//! wire the same way any task does.
//!
//! `iota_map` splits the requested range between the layers from the
//! families' size hints: each outer slot receives an inner chunk no
//! larger than the inner family's bound.

use std::marker::PhantomData;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::container::{Family, Foldable, Functor, IotaMap, Monadic, Monoidal, Payload};
use crate::index::IRange;
use crate::remote::task::RawFn;

pub struct Nested<P: Family, A: Family, T: Payload> {
    data: P::Of<A::Of<T>>,
}

impl<P: Family, A: Family, T: Payload> Nested<P, A, T> {
    pub fn from_outer(data: P::Of<A::Of<T>>) -> Self {
        Nested { data }
    }

    pub fn outer(&self) -> &P::Of<A::Of<T>> {
        &self.data
    }
}

impl<P: Family, A: Family, T: Payload> Clone for Nested<P, A, T> {
    fn clone(&self) -> Self {
        Nested { data: self.data.clone() }
    }
}

impl<P: Family, A: Family, T: Payload> Serialize for Nested<P, A, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

impl<'de, P: Family, A: Family, T: Payload> Deserialize<'de> for Nested<P, A, T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Nested { data: Deserialize::deserialize(deserializer)? })
    }
}

impl<P: Family, A: Family, T: Payload> std::fmt::Debug for Nested<P, A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "nested")
    }
}

pub struct NestedFamily<P, A> {
    _marker: PhantomData<(P, A)>,
}

const fn mul_sizes(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a * b),
        _ => None,
    }
}

impl<P: Family, A: Family> Family for NestedFamily<P, A> {
    type Of<T: Payload> = Nested<P, A, T>;
    const MIN_SIZE: usize = P::MIN_SIZE * A::MIN_SIZE;
    const MAX_SIZE: Option<usize> = mul_sizes(P::MAX_SIZE, A::MAX_SIZE);
}

impl<P: Family, A: Family> NestedFamily<P, A> {
    /// How many outer slots a range of `size` elements needs: one when
    /// the inner family can take it whole, otherwise enough maximal
    /// inner chunks.
    fn outer_size(size: usize) -> usize {
        let osize = match A::MAX_SIZE {
            None => usize::from(size > 0),
            Some(max_inner) => {
                if size == 0 {
                    0
                } else {
                    size.div_ceil(max_inner)
                }
            }
        };
        if let Some(max_outer) = P::MAX_SIZE {
            assert!(
                osize <= max_outer,
                "range of {} elements needs {} outer slots but the outer shape holds {}",
                size,
                osize,
                max_outer
            );
        }
        osize
    }

    /// The range of chunk origins: one index per outer slot.
    fn outer_inds(inds: IRange) -> IRange {
        let osize = Self::outer_size(inds.size());
        let omax = if osize == 0 { inds.imin() } else { inds.imax() };
        let ostep = match A::MAX_SIZE {
            None => (omax - inds.imin()).max(1),
            Some(max_inner) => inds.istep() * max_inner as i64,
        };
        let oinds = IRange::strided(inds.imin(), omax, ostep);
        assert_eq!(oinds.size(), osize);
        oinds
    }
}

fn nested_iota_inner<A: IotaMap, R: Payload, Ar: Payload>(
    origin: i64,
    args: &(RawFn, IRange, i64, Ar),
) -> A::Of<R> {
    let (f, inds, ostep, args) = args;
    let f: fn(i64, &Ar) -> R = unsafe { f.get() };
    let sub = IRange::strided(origin, (origin + ostep).min(inds.imax()), inds.istep());
    A::iota_map(f, sub, args)
}

impl<P, A> IotaMap for NestedFamily<P, A>
where
    P: IotaMap,
    A: IotaMap,
{
    fn iota_map<R: Payload, Ar: Payload>(
        f: fn(i64, &Ar) -> R,
        inds: IRange,
        args: &Ar,
    ) -> Nested<P, A, R> {
        let oinds = Self::outer_inds(inds);
        let forwarded = (RawFn::of(f as usize), inds, oinds.istep(), args.clone());
        Nested { data: P::iota_map(nested_iota_inner::<A, R, Ar>, oinds, &forwarded) }
    }
}

fn nested_fmap_inner<A: Functor, T: Payload, R: Payload, Ar: Payload>(
    xs: &A::Of<T>,
    args: &(RawFn, Ar),
) -> A::Of<R> {
    let f: fn(&T, &Ar) -> R = unsafe { args.0.get() };
    A::fmap(f, xs, &args.1)
}

fn nested_fmap2_inner<A: Functor, T: Payload, U: Payload, R: Payload, Ar: Payload>(
    xs: &A::Of<T>,
    ys: &A::Of<U>,
    args: &(RawFn, Ar),
) -> A::Of<R> {
    let f: fn(&T, &U, &Ar) -> R = unsafe { args.0.get() };
    A::fmap2(f, xs, ys, &args.1)
}

fn nested_fmap3_inner<A: Functor, T: Payload, U: Payload, V: Payload, R: Payload, Ar: Payload>(
    xs: &A::Of<T>,
    ys: &A::Of<U>,
    zs: &A::Of<V>,
    args: &(RawFn, Ar),
) -> A::Of<R> {
    let f: fn(&T, &U, &V, &Ar) -> R = unsafe { args.0.get() };
    A::fmap3(f, xs, ys, zs, &args.1)
}

impl<P, A> Functor for NestedFamily<P, A>
where
    P: Functor,
    A: Functor,
{
    fn fmap<T: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &Ar) -> R,
        xs: &Nested<P, A, T>,
        args: &Ar,
    ) -> Nested<P, A, R> {
        let forwarded = (RawFn::of(f as usize), args.clone());
        Nested { data: P::fmap(nested_fmap_inner::<A, T, R, Ar>, &xs.data, &forwarded) }
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &U, &Ar) -> R,
        xs: &Nested<P, A, T>,
        ys: &Nested<P, A, U>,
        args: &Ar,
    ) -> Nested<P, A, R> {
        let forwarded = (RawFn::of(f as usize), args.clone());
        Nested {
            data: P::fmap2(nested_fmap2_inner::<A, T, U, R, Ar>, &xs.data, &ys.data, &forwarded),
        }
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &U, &V, &Ar) -> R,
        xs: &Nested<P, A, T>,
        ys: &Nested<P, A, U>,
        zs: &Nested<P, A, V>,
        args: &Ar,
    ) -> Nested<P, A, R> {
        let forwarded = (RawFn::of(f as usize), args.clone());
        Nested {
            data: P::fmap3(
                nested_fmap3_inner::<A, T, U, V, R, Ar>,
                &xs.data,
                &ys.data,
                &zs.data,
                &forwarded,
            ),
        }
    }
}

fn nested_fold_inner<A: Foldable, T: Payload, R: Payload, Ar: Payload>(
    xs: &A::Of<T>,
    args: &(RawFn, RawFn, R, Ar),
) -> R {
    let f: fn(&T, &Ar) -> R = unsafe { args.0.get() };
    let op: fn(R, R) -> R = unsafe { args.1.get() };
    A::fold_map(f, op, args.2.clone(), xs, &args.3)
}

fn nested_fold2_inner<A: Foldable, T: Payload, U: Payload, R: Payload, Ar: Payload>(
    xs: &A::Of<T>,
    ys: &A::Of<U>,
    args: &(RawFn, RawFn, R, Ar),
) -> R {
    let f: fn(&T, &U, &Ar) -> R = unsafe { args.0.get() };
    let op: fn(R, R) -> R = unsafe { args.1.get() };
    A::fold_map2(f, op, args.2.clone(), xs, ys, &args.3)
}

fn nested_msize_inner<A: Foldable, T: Payload>(xs: &A::Of<T>, _args: &()) -> usize {
    A::msize(xs)
}

fn add_usize(a: usize, b: usize) -> usize {
    a + b
}

impl<P, A> Foldable for NestedFamily<P, A>
where
    P: Foldable,
    A: Foldable,
{
    fn fold_map<T: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &Ar) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Nested<P, A, T>,
        args: &Ar,
    ) -> R {
        let forwarded = (RawFn::of(f as usize), RawFn::of(op as usize), z.clone(), args.clone());
        P::fold_map(nested_fold_inner::<A, T, R, Ar>, op, z, &xs.data, &forwarded)
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, Ar: Payload>(
        f: fn(&T, &U, &Ar) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Nested<P, A, T>,
        ys: &Nested<P, A, U>,
        args: &Ar,
    ) -> R {
        let forwarded = (RawFn::of(f as usize), RawFn::of(op as usize), z.clone(), args.clone());
        P::fold_map2(nested_fold2_inner::<A, T, U, R, Ar>, op, z, &xs.data, &ys.data, &forwarded)
    }

    fn msize<T: Payload>(xs: &Nested<P, A, T>) -> usize {
        P::fold_map(nested_msize_inner::<A, T>, add_usize, 0, &xs.data, &())
    }

    fn head<T: Payload>(xs: &Nested<P, A, T>) -> T {
        A::head(&P::head(&xs.data))
    }

    fn last<T: Payload>(xs: &Nested<P, A, T>) -> T {
        A::last(&P::last(&xs.data))
    }
}

impl<P: Family, A: Family> NestedFamily<P, A> {
    /// The unit nested container: a unit outer slot holding a unit inner
    /// container.
    pub fn munit<T: Payload>(x: T) -> Nested<P, A, T>
    where
        P: Monadic,
        A: Monadic,
    {
        Nested { data: P::munit(A::munit(x)) }
    }

    pub fn mextract<T: Payload>(xs: &Nested<P, A, T>) -> T
    where
        P: Monadic,
        A: Monadic,
    {
        A::mextract(&P::mextract(&xs.data))
    }

    /// The empty nested container: no outer slots.
    pub fn mzero<T: Payload>() -> Nested<P, A, T>
    where
        P: Monoidal,
    {
        Nested { data: P::mzero() }
    }

    pub fn mempty<T: Payload>(xs: &Nested<P, A, T>) -> bool
    where
        P: Foldable,
        A: Foldable,
    {
        Self::msize(xs) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::maxarray::MaxArrayFamily;
    use crate::container::shared::SharedFamily;
    use crate::container::vector::VectorFamily;

    type LocalVec = NestedFamily<SharedFamily, VectorFamily>;
    type Chunked = NestedFamily<VectorFamily, MaxArrayFamily<8>>;

    fn ident(i: i64, _: &()) -> i64 {
        i
    }

    fn double(x: &i64, _: &()) -> i64 {
        x * 2
    }

    fn get(x: &i64, _: &()) -> i64 {
        *x
    }

    fn plus(a: i64, b: i64) -> i64 {
        a + b
    }

    #[test]
    fn pointer_of_vector_behaves_like_a_collection() {
        let xs = LocalVec::iota_map(ident, IRange::new(10), &());
        assert_eq!(LocalVec::msize(&xs), 10);
        assert_eq!(LocalVec::head(&xs), 0);
        assert_eq!(LocalVec::last(&xs), 9);
        let ys = LocalVec::fmap(double, &xs, &());
        assert_eq!(LocalVec::fold_map(get, plus, 0, &ys, &()), 90);
    }

    #[test]
    fn bounded_inner_splits_into_chunks() {
        // 20 elements over inner chunks of at most 8: three outer slots.
        let xs = Chunked::iota_map(ident, IRange::new(20), &());
        assert_eq!(xs.outer().len(), 3);
        assert_eq!(Chunked::msize(&xs), 20);
        assert_eq!(Chunked::head(&xs), 0);
        assert_eq!(Chunked::last(&xs), 19);
        assert_eq!(Chunked::fold_map(get, plus, 0, &xs, &()), 190);
    }

    #[test]
    fn unit_and_extract() {
        let xs = LocalVec::munit(31i64);
        assert_eq!(LocalVec::msize(&xs), 1);
        assert_eq!(LocalVec::mextract(&xs), 31);
    }

    #[test]
    fn empty_range_has_no_outer_slots() {
        let xs = Chunked::iota_map(ident, IRange::new(0), &());
        assert_eq!(Chunked::msize(&xs), 0);
        assert!(Chunked::mempty(&xs));
    }
}
