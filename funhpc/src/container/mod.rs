//! The container operation vocabulary.
//!
//! Containers come in several shapes (unit cell, bounded array, vector,
//! sum, grid, tree, remote pointer, nested composition) but share one
//! small set of named operations. Each shape is described by a [`Family`]
//! — a type constructor `Of<T>` plus size hints — and implements the
//! subset of capability traits it supports. Algorithms program against
//! the traits, so the same `fold_map` drives a vector, a grid, or a
//! remote proxy.
//!
//! Operations take plain `fn` pointers plus one serializable `args` value
//! rather than capturing closures. In-process containers would not need
//! that restriction, but remote containers ship the function and its
//! arguments across the wire, and a uniform signature lets nested
//! containers forward any operation through a pointer-shaped outer layer.
//!
//! Containers are immutable after construction: every operation returns a
//! new value.

pub mod either;
pub mod id;
pub mod maxarray;
pub mod nested;
pub mod shared;
pub mod tree;
pub mod vector;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::index::{IRange, Index, Range};

/// Element and argument types carried by containers: value-semantic,
/// thread-safe, and serializable.
pub trait Payload: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static> Payload for T {}

/// A container shape: the type constructor together with the size hints
/// used by [`either`](either::EitherFamily) and by
/// [`nested`](nested::Nested)'s outer/inner split.
pub trait Family: Send + Sync + 'static {
    /// The concrete container holding elements of type `T`.
    type Of<T: Payload>: Payload;

    /// Fewest elements a container of this shape can hold.
    const MIN_SIZE: usize;

    /// Most elements a container of this shape can hold; `None` means
    /// unbounded.
    const MAX_SIZE: Option<usize>;
}

/// Contiguous, indexable backing used by grids and trees.
///
/// `Arr` deliberately carries no serialization bound, so containers can
/// hold recursive element types (subtrees); grids and trees serialize
/// their backing as a plain sequence of elements instead.
pub trait Storage: Family {
    type Arr<X: Send + Sync + 'static>: Send + Sync + 'static;

    fn from_vec<X: Send + Sync + 'static>(items: Vec<X>) -> Self::Arr<X>;

    fn as_slice<X: Send + Sync + 'static>(xs: &Self::Arr<X>) -> &[X];

    fn get<X: Send + Sync + 'static>(xs: &Self::Arr<X>, i: usize) -> &X {
        &Self::as_slice(xs)[i]
    }

    fn len<X: Send + Sync + 'static>(xs: &Self::Arr<X>) -> usize {
        Self::as_slice(xs).len()
    }
}

/// Elementwise mapping.
pub trait Functor: Family {
    /// The result holds `f(x, args)` for every element `x`, same shape as
    /// `xs`.
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Self::Of<T>,
        args: &A,
    ) -> Self::Of<R>;

    /// Zip-elementwise over two containers of identical shape.
    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Self::Of<T>,
        ys: &Self::Of<U>,
        args: &A,
    ) -> Self::Of<R>;

    /// Zip-elementwise over three containers of identical shape.
    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Self::Of<T>,
        ys: &Self::Of<U>,
        zs: &Self::Of<V>,
        args: &A,
    ) -> Self::Of<R>;
}

fn count_one<T: Payload>(_x: &T, _args: &()) -> usize {
    1
}

fn add_usize(a: usize, b: usize) -> usize {
    a + b
}

/// Left-to-right folding.
pub trait Foldable: Family {
    /// `r := op(r, f(x, args))` over all elements, starting from `z`.
    /// `op` must be associative with identity `z`.
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Self::Of<T>,
        args: &A,
    ) -> R;

    /// Folds over two containers of identical shape in lockstep.
    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Self::Of<T>,
        ys: &Self::Of<U>,
        args: &A,
    ) -> R;

    fn msize<T: Payload>(xs: &Self::Of<T>) -> usize {
        Self::fold_map(count_one::<T>, add_usize, 0, xs, &())
    }

    fn mempty<T: Payload>(xs: &Self::Of<T>) -> bool {
        Self::msize(xs) == 0
    }

    /// First element of the container; fails when empty.
    fn head<T: Payload>(xs: &Self::Of<T>) -> T;

    /// Last element of the container; fails when empty.
    fn last<T: Payload>(xs: &Self::Of<T>) -> T;
}

/// Construction from an integer range.
pub trait IotaMap: Family {
    /// The container of `f(i, args)` for `i` in `inds`. The order of
    /// evaluation is unspecified.
    fn iota_map<R: Payload, A: Payload>(
        f: fn(i64, &A) -> R,
        inds: IRange,
        args: &A,
    ) -> Self::Of<R>;
}

/// Construction from a multi-dimensional range.
pub trait IotaMapMulti<const D: usize>: Family {
    fn iota_map_multi<R: Payload, A: Payload>(
        f: fn(Index<D>, &A) -> R,
        inds: Range<D>,
        args: &A,
    ) -> Self::Of<R>;
}

/// Unit, join, and friends.
pub trait Monadic: Functor {
    /// The container holding exactly `x`.
    fn munit<T: Payload>(x: T) -> Self::Of<T>;

    /// Flattens a container of containers.
    fn mjoin<T: Payload>(xss: &Self::Of<Self::Of<T>>) -> Self::Of<T>;

    fn mbind<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> Self::Of<R>,
        xs: &Self::Of<T>,
        args: &A,
    ) -> Self::Of<R> {
        Self::mjoin(&Self::fmap(f, xs, args))
    }

    /// Extracts a representative element; fails when empty.
    fn mextract<T: Payload>(xs: &Self::Of<T>) -> T;
}

/// Empty container and concatenation. Not available for shapes that hold
/// exactly one element.
pub trait Monoidal: Family {
    /// The empty container.
    fn mzero<T: Payload>() -> Self::Of<T>;

    /// Concatenation.
    fn mplus<T: Payload>(xs: &Self::Of<T>, ys: &Self::Of<T>) -> Self::Of<T>;
}

/// Face extraction. `Bnd` is the boundary shape: the unit container for
/// rank-1 containers, a same-rank thickness-1 view for grids.
pub trait HasBoundary: Family {
    type Bnd: Family;

    /// The face-`i` slice, `i < 2` for rank-1 containers.
    fn boundary<T: Payload>(xs: &Self::Of<T>, i: usize) -> <Self::Bnd as Family>::Of<T>;
}

/// `fmap` over a face. Equivalent to mapping over `boundary(xs, i)`, with
/// the face index forwarded to `f`.
pub fn boundary_map<C, T, R, A>(
    f: fn(&T, &(usize, A)) -> R,
    xs: &C::Of<T>,
    i: usize,
    args: &A,
) -> <C::Bnd as Family>::Of<R>
where
    C: HasBoundary,
    C::Bnd: Functor,
    T: Payload,
    R: Payload,
    A: Payload,
{
    C::Bnd::fmap(f, &C::boundary(xs, i), &(i, args.clone()))
}
