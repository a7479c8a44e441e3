//! The bounded array container: up to `N` elements stored inline.
//!
//! Its `MAX_SIZE` is what lets [`either`](crate::container::either) and
//! [`nested`](crate::container::nested) decide where data goes.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::container::id::{Id, IdFamily};
use crate::container::{
    Family, Foldable, Functor, HasBoundary, IotaMap, Monadic, Monoidal, Payload, Storage,
};
use crate::index::IRange;

/// A contiguous array of at most `N` elements, stored without a heap
/// allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
#[serde(transparent)]
pub struct MaxArray<T, const N: usize> {
    elts: SmallVec<[T; N]>,
}

impl<T, const N: usize> Default for MaxArray<T, N> {
    fn default() -> Self {
        MaxArray { elts: SmallVec::new() }
    }
}

impl<T, const N: usize> MaxArray<T, N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: T) {
        assert!(self.elts.len() < N, "maxarray overflow beyond {} elements", N);
        self.elts.push(x);
    }

    pub fn len(&self) -> usize {
        self.elts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elts.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elts.iter()
    }
}

impl<T, const N: usize> FromIterator<T> for MaxArray<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut r = MaxArray::new();
        for x in iter {
            r.push(x);
        }
        r
    }
}

pub struct MaxArrayFamily<const N: usize>;

impl<const N: usize> Family for MaxArrayFamily<N> {
    type Of<T: Payload> = MaxArray<T, N>;
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: Option<usize> = Some(N);
}

impl<const N: usize> Storage for MaxArrayFamily<N> {
    type Arr<X: Send + Sync + 'static> = MaxArray<X, N>;

    fn from_vec<X: Send + Sync + 'static>(items: Vec<X>) -> MaxArray<X, N> {
        items.into_iter().collect()
    }

    fn as_slice<X: Send + Sync + 'static>(xs: &MaxArray<X, N>) -> &[X] {
        xs.as_slice()
    }
}

impl<const N: usize> Functor for MaxArrayFamily<N> {
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &MaxArray<T, N>,
        args: &A,
    ) -> MaxArray<R, N> {
        xs.iter().map(|x| f(x, args)).collect()
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &MaxArray<T, N>,
        ys: &MaxArray<U, N>,
        args: &A,
    ) -> MaxArray<R, N> {
        assert_eq!(xs.len(), ys.len(), "fmap2 over maxarrays of different lengths");
        xs.iter().zip(ys.iter()).map(|(x, y)| f(x, y, args)).collect()
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &MaxArray<T, N>,
        ys: &MaxArray<U, N>,
        zs: &MaxArray<V, N>,
        args: &A,
    ) -> MaxArray<R, N> {
        assert_eq!(xs.len(), ys.len(), "fmap3 over maxarrays of different lengths");
        assert_eq!(xs.len(), zs.len(), "fmap3 over maxarrays of different lengths");
        itertools::izip!(xs.iter(), ys.iter(), zs.iter())
            .map(|(x, y, z)| f(x, y, z, args))
            .collect()
    }
}

impl<const N: usize> Foldable for MaxArrayFamily<N> {
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &MaxArray<T, N>,
        args: &A,
    ) -> R {
        xs.iter().fold(z, |r, x| op(r, f(x, args)))
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &MaxArray<T, N>,
        ys: &MaxArray<U, N>,
        args: &A,
    ) -> R {
        assert_eq!(xs.len(), ys.len(), "fold_map2 over maxarrays of different lengths");
        xs.iter().zip(ys.iter()).fold(z, |r, (x, y)| op(r, f(x, y, args)))
    }

    fn msize<T: Payload>(xs: &MaxArray<T, N>) -> usize {
        xs.len()
    }

    fn head<T: Payload>(xs: &MaxArray<T, N>) -> T {
        xs.as_slice().first().expect("head of an empty maxarray").clone()
    }

    fn last<T: Payload>(xs: &MaxArray<T, N>) -> T {
        xs.as_slice().last().expect("last of an empty maxarray").clone()
    }
}

impl<const N: usize> IotaMap for MaxArrayFamily<N> {
    fn iota_map<R: Payload, A: Payload>(
        f: fn(i64, &A) -> R,
        inds: IRange,
        args: &A,
    ) -> MaxArray<R, N> {
        assert!(inds.size() <= N, "range {} overflows maxarray of {}", inds, N);
        inds.iter().map(|i| f(i, args)).collect()
    }
}

impl<const N: usize> Monadic for MaxArrayFamily<N> {
    fn munit<T: Payload>(x: T) -> MaxArray<T, N> {
        std::iter::once(x).collect()
    }

    fn mjoin<T: Payload>(xss: &MaxArray<MaxArray<T, N>, N>) -> MaxArray<T, N> {
        xss.iter().flat_map(|xs| xs.iter().cloned()).collect()
    }

    fn mextract<T: Payload>(xs: &MaxArray<T, N>) -> T {
        Self::head(xs)
    }
}

impl<const N: usize> Monoidal for MaxArrayFamily<N> {
    fn mzero<T: Payload>() -> MaxArray<T, N> {
        MaxArray::new()
    }

    fn mplus<T: Payload>(xs: &MaxArray<T, N>, ys: &MaxArray<T, N>) -> MaxArray<T, N> {
        xs.iter().chain(ys.iter()).cloned().collect()
    }
}

impl<const N: usize> HasBoundary for MaxArrayFamily<N> {
    type Bnd = IdFamily;

    fn boundary<T: Payload>(xs: &MaxArray<T, N>, i: usize) -> Id<T> {
        assert!(i < 2);
        if i == 0 {
            Id(Self::head(xs))
        } else {
            Id(Self::last(xs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(i: i64, _: &()) -> i64 {
        i
    }

    #[test]
    fn stays_within_bound() {
        let xs: MaxArray<i64, 8> = MaxArrayFamily::<8>::iota_map(ident, IRange::new(8), &());
        assert_eq!(xs.len(), 8);
        assert_eq!(MaxArrayFamily::<8>::head(&xs), 0);
        assert_eq!(MaxArrayFamily::<8>::last(&xs), 7);
    }

    #[test]
    #[should_panic]
    fn overflow_is_fatal() {
        let _: MaxArray<i64, 4> = MaxArrayFamily::<4>::iota_map(ident, IRange::new(5), &());
    }
}
