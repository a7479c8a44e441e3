//! The unbounded array container over `Vec<T>`.
//!
//! `fmap` and friends index contiguously so the inner loop vectorizes.

use crate::container::id::{Id, IdFamily};
use crate::container::{
    Family, Foldable, Functor, HasBoundary, IotaMap, Monadic, Monoidal, Payload, Storage,
};
use crate::index::IRange;

pub struct VectorFamily;

impl Family for VectorFamily {
    type Of<T: Payload> = Vec<T>;
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: Option<usize> = None;
}

impl Storage for VectorFamily {
    type Arr<X: Send + Sync + 'static> = Vec<X>;

    fn from_vec<X: Send + Sync + 'static>(items: Vec<X>) -> Vec<X> {
        items
    }

    fn as_slice<X: Send + Sync + 'static>(xs: &Vec<X>) -> &[X] {
        xs
    }
}

impl Functor for VectorFamily {
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Vec<T>,
        args: &A,
    ) -> Vec<R> {
        xs.iter().map(|x| f(x, args)).collect()
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Vec<T>,
        ys: &Vec<U>,
        args: &A,
    ) -> Vec<R> {
        assert_eq!(xs.len(), ys.len(), "fmap2 over vectors of different lengths");
        xs.iter().zip(ys).map(|(x, y)| f(x, y, args)).collect()
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Vec<T>,
        ys: &Vec<U>,
        zs: &Vec<V>,
        args: &A,
    ) -> Vec<R> {
        assert_eq!(xs.len(), ys.len(), "fmap3 over vectors of different lengths");
        assert_eq!(xs.len(), zs.len(), "fmap3 over vectors of different lengths");
        itertools::izip!(xs, ys, zs).map(|(x, y, z)| f(x, y, z, args)).collect()
    }
}

impl Foldable for VectorFamily {
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Vec<T>,
        args: &A,
    ) -> R {
        xs.iter().fold(z, |r, x| op(r, f(x, args)))
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Vec<T>,
        ys: &Vec<U>,
        args: &A,
    ) -> R {
        assert_eq!(xs.len(), ys.len(), "fold_map2 over vectors of different lengths");
        xs.iter().zip(ys).fold(z, |r, (x, y)| op(r, f(x, y, args)))
    }

    fn msize<T: Payload>(xs: &Vec<T>) -> usize {
        xs.len()
    }

    fn head<T: Payload>(xs: &Vec<T>) -> T {
        xs.first().expect("head of an empty vector").clone()
    }

    fn last<T: Payload>(xs: &Vec<T>) -> T {
        xs.last().expect("last of an empty vector").clone()
    }
}

impl IotaMap for VectorFamily {
    fn iota_map<R: Payload, A: Payload>(f: fn(i64, &A) -> R, inds: IRange, args: &A) -> Vec<R> {
        inds.iter().map(|i| f(i, args)).collect()
    }
}

impl Monadic for VectorFamily {
    fn munit<T: Payload>(x: T) -> Vec<T> {
        vec![x]
    }

    fn mjoin<T: Payload>(xss: &Vec<Vec<T>>) -> Vec<T> {
        xss.iter().flatten().cloned().collect()
    }

    fn mextract<T: Payload>(xs: &Vec<T>) -> T {
        Self::head(xs)
    }
}

impl Monoidal for VectorFamily {
    fn mzero<T: Payload>() -> Vec<T> {
        Vec::new()
    }

    fn mplus<T: Payload>(xs: &Vec<T>, ys: &Vec<T>) -> Vec<T> {
        let mut r = xs.clone();
        r.extend_from_slice(ys);
        r
    }
}

impl HasBoundary for VectorFamily {
    type Bnd = IdFamily;

    fn boundary<T: Payload>(xs: &Vec<T>, i: usize) -> Id<T> {
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

    fn double(x: &i64, _: &()) -> i64 {
        x * 2
    }

    fn plus(a: i64, b: i64) -> i64 {
        a + b
    }

    fn ident(i: i64, _: &()) -> i64 {
        i
    }

    #[test]
    fn iota_fmap_fold() {
        let xs = VectorFamily::iota_map(ident, IRange::new(5), &());
        assert_eq!(xs, vec![0, 1, 2, 3, 4]);
        let ys = VectorFamily::fmap(double, &xs, &());
        assert_eq!(VectorFamily::fold_map(ident_elem, plus, 0, &ys, &()), 20);
    }

    fn ident_elem(x: &i64, _: &()) -> i64 {
        *x
    }

    #[test]
    fn boundary_is_head_and_last() {
        let xs = VectorFamily::iota_map(ident, IRange::with_min(3, 9), &());
        assert_eq!(VectorFamily::boundary(&xs, 0), Id(3));
        assert_eq!(VectorFamily::boundary(&xs, 1), Id(8));
    }
}
