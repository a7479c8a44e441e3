//! The balanced branching container.
//!
//! A tree is either a leaf holding one element or a branch holding
//! subtrees in an [`Storage`] array with at most [`MAX_FAN`] entries per
//! dimension. `iota_map` chunks large ranges so that every level is full:
//! a range of n elements produces a tree of depth O(log n).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::container::{
    Family, Foldable, Functor, IotaMap, IotaMapMulti, Monadic, Monoidal, Payload, Storage,
};
use crate::index::{Index, IRange, Range};

/// Fan-out bound per branch (per dimension for multi-dimensional ranges).
pub const MAX_FAN: usize = 16;

/// Fan-out per dimension for a D-dimensional range: the D-th root of
/// [`MAX_FAN`], rounded.
pub fn linear_fan(rank: usize) -> i64 {
    (MAX_FAN as f64).powf(1.0 / rank as f64).round() as i64
}

pub enum Tree<S: Storage, T: Payload> {
    Leaf(T),
    Branch(S::Arr<Tree<S, T>>),
}

impl<S: Storage, T: Payload> Tree<S, T> {
    fn branch(kids: Vec<Tree<S, T>>) -> Self {
        Tree::Branch(S::from_vec(kids))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Tree::Leaf(_))
    }

    fn children(&self) -> &[Tree<S, T>] {
        match self {
            Tree::Leaf(_) => panic!("leaf has no children"),
            Tree::Branch(kids) => S::as_slice(kids),
        }
    }

    pub fn msize(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Branch(kids) => S::as_slice(kids).iter().map(Tree::msize).sum(),
        }
    }

    pub fn mempty(&self) -> bool {
        match self {
            Tree::Leaf(_) => false,
            Tree::Branch(kids) => S::as_slice(kids).iter().all(Tree::mempty),
        }
    }

    /// Leftmost leaf.
    pub fn head(&self) -> T {
        match self {
            Tree::Leaf(x) => x.clone(),
            Tree::Branch(kids) => {
                S::as_slice(kids).first().expect("head of an empty tree").head()
            }
        }
    }

    /// Rightmost leaf.
    pub fn last(&self) -> T {
        match self {
            Tree::Leaf(x) => x.clone(),
            Tree::Branch(kids) => {
                S::as_slice(kids).last().expect("last of an empty tree").last()
            }
        }
    }
}

impl<S: Storage, T: Payload> Clone for Tree<S, T> {
    fn clone(&self) -> Self {
        match self {
            Tree::Leaf(x) => Tree::Leaf(x.clone()),
            Tree::Branch(kids) => Tree::Branch(S::from_vec(S::as_slice(kids).to_vec())),
        }
    }
}

impl<S: Storage, T: Payload + fmt::Debug> fmt::Debug for Tree<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tree::Leaf(x) => f.debug_tuple("Leaf").field(x).finish(),
            Tree::Branch(kids) => f.debug_list().entries(S::as_slice(kids)).finish(),
        }
    }
}

impl<S: Storage, T: Payload + PartialEq> PartialEq for Tree<S, T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Tree::Leaf(x), Tree::Leaf(y)) => x == y,
            (Tree::Branch(xs), Tree::Branch(ys)) => S::as_slice(xs) == S::as_slice(ys),
            _ => false,
        }
    }
}

/// Storage-independent wire shape; branches travel as plain sequences.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: serde::de::DeserializeOwned"))]
enum TreeRepr<T> {
    Leaf(T),
    Branch(Vec<TreeRepr<T>>),
}

impl<S: Storage, T: Payload> Tree<S, T> {
    fn to_repr(&self) -> TreeRepr<T> {
        match self {
            Tree::Leaf(x) => TreeRepr::Leaf(x.clone()),
            Tree::Branch(kids) => {
                TreeRepr::Branch(S::as_slice(kids).iter().map(Tree::to_repr).collect())
            }
        }
    }

    fn from_repr(repr: TreeRepr<T>) -> Self {
        match repr {
            TreeRepr::Leaf(x) => Tree::Leaf(x),
            TreeRepr::Branch(kids) => {
                Tree::branch(kids.into_iter().map(Tree::from_repr).collect())
            }
        }
    }
}

impl<S: Storage, T: Payload> Serialize for Tree<S, T> {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.to_repr().serialize(serializer)
    }
}

impl<'de, S: Storage, T: Payload> Deserialize<'de> for Tree<S, T> {
    fn deserialize<De: serde::Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        Ok(Tree::from_repr(TreeRepr::deserialize(deserializer)?))
    }
}

impl<S: Storage, T: Payload> Tree<S, T> {
    /// Builds a tree over an integer range, chunking by powers of
    /// [`MAX_FAN`] so that every branch is full.
    pub fn iota_map<A: Payload>(f: fn(i64, &A) -> T, inds: IRange, args: &A) -> Self {
        if inds.empty() {
            return Tree::branch(Vec::new());
        }
        if inds.shape() == 1 {
            return Tree::Leaf(f(inds.imin(), args));
        }
        let fan = MAX_FAN as i64;
        let mut scale = 1;
        while inds.shape() > scale * fan {
            scale *= fan;
        }
        debug_assert!(scale < inds.shape() && scale * fan >= inds.shape());
        let mut kids = Vec::new();
        let mut i = inds.imin();
        while i < inds.imax() {
            let sub =
                IRange::strided(i, (i + inds.istep() * scale).min(inds.imax()), inds.istep());
            kids.push(Tree::iota_map(f, sub, args));
            i += inds.istep() * scale;
        }
        Tree::branch(kids)
    }

    /// Builds a tree over a D-dimensional range, chunking each dimension
    /// by powers of the per-dimension fan-out.
    pub fn iota_map_multi<const D: usize, A: Payload>(
        f: fn(Index<D>, &A) -> T,
        inds: Range<D>,
        args: &A,
    ) -> Self {
        if inds.empty() {
            return Tree::branch(Vec::new());
        }
        if inds.size() == 1 {
            return Tree::Leaf(f(inds.imin(), args));
        }
        let fan = linear_fan(D);
        let mut scale = 1;
        while inds.shape().iter().any(|&s| s > scale * fan) {
            scale *= fan;
        }
        // Chunk origins form their own small range, visited in the same
        // dimension-0-fastest order as element loops.
        let counts: Index<D> = std::array::from_fn(|d| {
            let s = inds.shape()[d];
            (s + scale - 1) / scale
        });
        let mut kids = Vec::new();
        Range::new(counts).loop_over(|c| {
            let imin: Index<D> = std::array::from_fn(|d| inds.imin()[d] + c[d] * scale);
            let imax: Index<D> =
                std::array::from_fn(|d| (imin[d] + scale).min(inds.imax()[d]));
            kids.push(Tree::iota_map_multi(f, Range::with_min(imin, imax), args));
        });
        Tree::branch(kids)
    }

    pub fn fmap<R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Tree<S, T>,
        args: &A,
    ) -> Tree<S, R> {
        match xs {
            Tree::Leaf(x) => Tree::Leaf(f(x, args)),
            Tree::Branch(kids) => Tree::branch(
                S::as_slice(kids).iter().map(|k| Tree::fmap(f, k, args)).collect(),
            ),
        }
    }

    pub fn fmap2<U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Tree<S, T>,
        ys: &Tree<S, U>,
        args: &A,
    ) -> Tree<S, R> {
        match (xs, ys) {
            (Tree::Leaf(x), Tree::Leaf(y)) => Tree::Leaf(f(x, y, args)),
            (Tree::Branch(xk), Tree::Branch(yk)) => {
                let xk = S::as_slice(xk);
                let yk = S::as_slice(yk);
                assert_eq!(xk.len(), yk.len(), "fmap2 over trees of different structure");
                Tree::branch(
                    xk.iter().zip(yk).map(|(x, y)| Tree::fmap2(f, x, y, args)).collect(),
                )
            }
            _ => panic!("fmap2 over trees of different structure"),
        }
    }

    pub fn fmap3<U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Tree<S, T>,
        ys: &Tree<S, U>,
        zs: &Tree<S, V>,
        args: &A,
    ) -> Tree<S, R> {
        match (xs, ys, zs) {
            (Tree::Leaf(x), Tree::Leaf(y), Tree::Leaf(z)) => Tree::Leaf(f(x, y, z, args)),
            (Tree::Branch(xk), Tree::Branch(yk), Tree::Branch(zk)) => {
                let xk = S::as_slice(xk);
                let yk = S::as_slice(yk);
                let zk = S::as_slice(zk);
                assert_eq!(xk.len(), yk.len(), "fmap3 over trees of different structure");
                assert_eq!(xk.len(), zk.len(), "fmap3 over trees of different structure");
                Tree::branch(
                    itertools::izip!(xk, yk, zk)
                        .map(|(x, y, z)| Tree::fmap3(f, x, y, z, args))
                        .collect(),
                )
            }
            _ => panic!("fmap3 over trees of different structure"),
        }
    }

    /// Left-to-right fold threading the accumulator through the leaves.
    pub fn fold_map<R: Payload, A: Payload>(
        &self,
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        args: &A,
    ) -> R {
        match self {
            Tree::Leaf(x) => op(z, f(x, args)),
            Tree::Branch(kids) => S::as_slice(kids)
                .iter()
                .fold(z, |r, k| k.fold_map(f, op, r, args)),
        }
    }

    pub fn fold_map2<U: Payload, R: Payload, A: Payload>(
        &self,
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        ys: &Tree<S, U>,
        args: &A,
    ) -> R {
        match (self, ys) {
            (Tree::Leaf(x), Tree::Leaf(y)) => op(z, f(x, y, args)),
            (Tree::Branch(xk), Tree::Branch(yk)) => {
                let xk = S::as_slice(xk);
                let yk = S::as_slice(yk);
                assert_eq!(xk.len(), yk.len(), "fold_map2 over trees of different structure");
                xk.iter()
                    .zip(yk)
                    .fold(z, |r, (x, y)| x.fold_map2(f, op, r, y, args))
            }
            _ => panic!("fold_map2 over trees of different structure"),
        }
    }

    /// Stencil over the leaf sequence: every leaf sees the value of its
    /// left and right neighbors through `g`, or the supplied boundary
    /// value at the two global ends. The mask has bit 0 set at the global
    /// lower end and bit 1 at the global upper end.
    pub fn fmap_stencil<B: Payload, R: Payload, A: Payload>(
        f: fn(&T, u32, &B, &B, &A) -> R,
        g: fn(&T, usize) -> B,
        xs: &Tree<S, T>,
        bm: &B,
        bp: &B,
        args: &A,
    ) -> Tree<S, R> {
        Tree::stencil_impl(f, g, xs, true, bm, true, bp, args)
    }

    #[allow(clippy::too_many_arguments)]
    fn stencil_impl<B: Payload, R: Payload, A: Payload>(
        f: fn(&T, u32, &B, &B, &A) -> R,
        g: fn(&T, usize) -> B,
        xs: &Tree<S, T>,
        lo_bnd: bool,
        lo: &B,
        hi_bnd: bool,
        hi: &B,
        args: &A,
    ) -> Tree<S, R> {
        match xs {
            Tree::Leaf(x) => {
                let bmask = u32::from(lo_bnd) | (u32::from(hi_bnd) << 1);
                Tree::Leaf(f(x, bmask, lo, hi, args))
            }
            Tree::Branch(kids) => {
                let kids = S::as_slice(kids);
                let n = kids.len();
                let mapped = (0..n)
                    .map(|i| {
                        // Interior faces read the adjacent sibling's edge
                        // leaf; the outermost faces inherit the caller's.
                        let (klo_bnd, klo) = if i == 0 {
                            (lo_bnd, lo.clone())
                        } else {
                            (false, g(&kids[i - 1].last(), 0))
                        };
                        let (khi_bnd, khi) = if i + 1 == n {
                            (hi_bnd, hi.clone())
                        } else {
                            (false, g(&kids[i + 1].head(), 1))
                        };
                        Tree::stencil_impl(f, g, &kids[i], klo_bnd, &klo, khi_bnd, &khi, args)
                    })
                    .collect();
                Tree::branch(mapped)
            }
        }
    }

    /// Flattens a tree of trees by grafting each inner tree in place.
    pub fn mjoin(xss: &Tree<S, Tree<S, T>>) -> Tree<S, T> {
        match xss {
            Tree::Leaf(t) => t.clone(),
            Tree::Branch(kids) => {
                Tree::branch(S::as_slice(kids).iter().map(Tree::mjoin).collect())
            }
        }
    }

    /// Concatenation: a branch over the two trees.
    pub fn mplus(xs: &Tree<S, T>, ys: &Tree<S, T>) -> Tree<S, T> {
        Tree::branch(vec![xs.clone(), ys.clone()])
    }
}

pub struct TreeFamily<S> {
    _marker: std::marker::PhantomData<S>,
}

impl<S: Storage> Family for TreeFamily<S> {
    type Of<T: Payload> = Tree<S, T>;
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: Option<usize> = None;
}

impl<S: Storage> Functor for TreeFamily<S> {
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Tree<S, T>,
        args: &A,
    ) -> Tree<S, R> {
        Tree::fmap(f, xs, args)
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Tree<S, T>,
        ys: &Tree<S, U>,
        args: &A,
    ) -> Tree<S, R> {
        Tree::fmap2(f, xs, ys, args)
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Tree<S, T>,
        ys: &Tree<S, U>,
        zs: &Tree<S, V>,
        args: &A,
    ) -> Tree<S, R> {
        Tree::fmap3(f, xs, ys, zs, args)
    }
}

impl<S: Storage> Foldable for TreeFamily<S> {
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Tree<S, T>,
        args: &A,
    ) -> R {
        xs.fold_map(f, op, z, args)
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Tree<S, T>,
        ys: &Tree<S, U>,
        args: &A,
    ) -> R {
        xs.fold_map2(f, op, z, ys, args)
    }

    fn msize<T: Payload>(xs: &Tree<S, T>) -> usize {
        xs.msize()
    }

    fn mempty<T: Payload>(xs: &Tree<S, T>) -> bool {
        xs.mempty()
    }

    fn head<T: Payload>(xs: &Tree<S, T>) -> T {
        xs.head()
    }

    fn last<T: Payload>(xs: &Tree<S, T>) -> T {
        xs.last()
    }
}

impl<S: Storage> IotaMap for TreeFamily<S> {
    fn iota_map<R: Payload, A: Payload>(
        f: fn(i64, &A) -> R,
        inds: IRange,
        args: &A,
    ) -> Tree<S, R> {
        Tree::iota_map(f, inds, args)
    }
}

impl<S: Storage, const D: usize> IotaMapMulti<D> for TreeFamily<S> {
    fn iota_map_multi<R: Payload, A: Payload>(
        f: fn(Index<D>, &A) -> R,
        inds: Range<D>,
        args: &A,
    ) -> Tree<S, R> {
        Tree::iota_map_multi(f, inds, args)
    }
}

impl<S: Storage> Monadic for TreeFamily<S> {
    fn munit<T: Payload>(x: T) -> Tree<S, T> {
        Tree::Leaf(x)
    }

    fn mjoin<T: Payload>(xss: &Tree<S, Tree<S, T>>) -> Tree<S, T> {
        Tree::mjoin(xss)
    }

    fn mextract<T: Payload>(xs: &Tree<S, T>) -> T {
        xs.head()
    }
}

impl<S: Storage> Monoidal for TreeFamily<S> {
    fn mzero<T: Payload>() -> Tree<S, T> {
        Tree::branch(Vec::new())
    }

    fn mplus<T: Payload>(xs: &Tree<S, T>, ys: &Tree<S, T>) -> Tree<S, T> {
        Tree::mplus(xs, ys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::vector::VectorFamily;

    type T = TreeFamily<VectorFamily>;

    fn ident(i: i64, _: &()) -> i64 {
        i
    }

    fn get(x: &i64, _: &()) -> i64 {
        *x
    }

    #[test]
    fn branches_stay_within_fan_out() {
        fn depth_and_fan(t: &Tree<VectorFamily, i64>) -> (usize, usize) {
            match t {
                Tree::Leaf(_) => (0, 0),
                Tree::Branch(_) => {
                    let kids = t.children();
                    let (d, w) = kids.iter().map(depth_and_fan).fold((0, 0), |a, b| {
                        (a.0.max(b.0), a.1.max(b.1))
                    });
                    (d + 1, w.max(kids.len()))
                }
            }
        }
        let xs = Tree::<VectorFamily, i64>::iota_map(ident, IRange::new(1000), &());
        let (depth, fan) = depth_and_fan(&xs);
        assert!(fan <= MAX_FAN);
        assert_eq!(depth, 3); // 1000 <= 16^3
        assert_eq!(xs.head(), 0);
        assert_eq!(xs.last(), 999);
    }

    #[test]
    fn fold_visits_left_to_right() {
        fn keep_last(_a: i64, b: i64) -> i64 {
            b
        }
        let xs = T::iota_map(ident, IRange::new(100), &());
        assert_eq!(T::fold_map(get, keep_last, -1, &xs, &()), 99);
    }

    #[test]
    fn tree_monad_shapes() {
        let unit = T::munit(5i64);
        assert_eq!(T::msize(&unit), 1);
        let zero = T::mzero::<i64>();
        assert!(T::mempty(&zero));
        let both = T::mplus(&unit, &T::munit(7));
        assert_eq!(T::msize(&both), 2);
        assert_eq!(T::head(&both), 5);
        assert_eq!(T::last(&both), 7);
        let joined = T::mjoin(&T::munit(both.clone()));
        assert_eq!(joined, both);
    }
}
