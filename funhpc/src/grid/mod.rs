//! The D-dimensional indexed container with ghost zones.
//!
//! A grid pairs a [`Space`] (allocated + active regions, row-major
//! strides) with a storage of exactly `allocated.size()` elements behind
//! an `Arc`. Operations return fresh grids; [`Grid::boundary`] returns a
//! view whose active region is a face of thickness 1 and whose backing is
//! the same storage, no copy.
//!
//! The stencil operator [`Grid::fmap_stencil`] reads, for every active
//! cell, one neighbor per face: the adjacent cell of the source grid
//! where the face is interior, or the matching slot of the supplied
//! boundary grid where the face is a domain boundary. Which faces were
//! boundaries is handed to the cell function as a bitfield.

use std::fmt;
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::container::{Family, Foldable, Functor, HasBoundary, IotaMap, IotaMapMulti, Payload, Storage};
use crate::index::{add, offset, sub, IRange, Index, Range, Space};

/// Bit for face (`dir`, `d`) in a stencil boundary mask.
pub fn face_bit<const D: usize>(dir: usize, d: usize) -> u32 {
    debug_assert!(dir < 2 && d < D);
    1 << (dir * D + d)
}

/// A rectangular active region over an allocated backing held in `S`.
pub struct Grid<S: Storage, T: Payload, const D: usize> {
    space: Space<D>,
    data: Arc<S::Arr<T>>,
}

impl<S: Storage, T: Payload, const D: usize> Clone for Grid<S, T, D> {
    fn clone(&self) -> Self {
        Grid { space: self.space, data: Arc::clone(&self.data) }
    }
}

impl<S: Storage, T: Payload, const D: usize> fmt::Debug for Grid<S, T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid").field("space", &self.space).finish_non_exhaustive()
    }
}

impl<S: Storage, T: Payload, const D: usize> Serialize for Grid<S, T, D> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        (&self.space, S::as_slice(&self.data)).serialize(serializer)
    }
}

impl<'de, S: Storage, T: Payload, const D: usize> Deserialize<'de> for Grid<S, T, D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let (space, data): (Space<D>, Vec<T>) = Deserialize::deserialize(deserializer)?;
        Ok(Grid { space, data: Arc::new(S::from_vec(data)) })
    }
}

impl<S: Storage, T: Payload, const D: usize> Default for Grid<S, T, D> {
    fn default() -> Self {
        Grid::new()
    }
}

impl<S: Storage, T: Payload, const D: usize> Grid<S, T, D> {
    fn invariant(&self) -> bool {
        S::len(&self.data) == self.space.allocated().size()
    }

    /// The empty grid.
    pub fn new() -> Self {
        let grid = Grid { space: Space::default(), data: Arc::new(S::from_vec(Vec::new())) };
        assert!(grid.invariant());
        grid
    }

    /// A grid over externally supplied storage; the storage must have
    /// exactly `allocated.size()` elements.
    pub fn from_parts(space: Space<D>, data: S::Arr<T>) -> Self {
        let grid = Grid { space, data: Arc::new(data) };
        assert!(grid.invariant(), "storage size does not match the allocated region");
        grid
    }

    pub fn space(&self) -> Space<D> {
        self.space
    }

    pub fn active(&self) -> Range<D> {
        self.space.active()
    }

    pub fn size(&self) -> usize {
        self.space.size()
    }

    pub fn empty(&self) -> bool {
        self.space.empty()
    }

    /// The element at an active index.
    pub fn get(&self, ipos: Index<D>) -> &T {
        S::get(&self.data, self.space.linear(ipos))
    }

    pub fn head(&self) -> T {
        self.get(self.active().imin()).clone()
    }

    pub fn last(&self) -> T {
        self.get(sub(self.active().imax(), crate::index::one())).clone()
    }

    /// The unit grid of shape `[1; D]`.
    pub fn munit(x: T) -> Self {
        Grid::from_parts(Space::new(Range::new(crate::index::one())), S::from_vec(vec![x]))
    }

    /// The empty grid.
    pub fn mzero() -> Self {
        Grid::new()
    }

    pub fn mextract(&self) -> T {
        assert!(!self.empty(), "mextract from an empty grid");
        self.head()
    }

    /// Builds `f(ipos, args)` over `inds`; allocated and active coincide.
    pub fn iota_map_multi<A: Payload>(
        f: fn(Index<D>, &A) -> T,
        inds: Range<D>,
        args: &A,
    ) -> Self {
        let space = Space::new(inds);
        let mut acc = Vec::with_capacity(space.size());
        space.active().loop_over(|ipos| {
            debug_assert_eq!(space.linear(ipos), acc.len());
            acc.push(f(ipos, args));
        });
        Grid::from_parts(space, S::from_vec(acc))
    }

    /// Elementwise map; the result's region is the source's active region.
    pub fn fmap<U: Payload, A: Payload>(
        f: fn(&U, &A) -> T,
        xs: &Grid<S, U, D>,
        args: &A,
    ) -> Self {
        let space = Space::new(xs.active());
        let mut acc = Vec::with_capacity(space.size());
        space.active().loop_over(|ipos| {
            acc.push(f(xs.get(ipos), args));
        });
        Grid::from_parts(space, S::from_vec(acc))
    }

    pub fn fmap2<U: Payload, V: Payload, A: Payload>(
        f: fn(&U, &V, &A) -> T,
        xs: &Grid<S, U, D>,
        ys: &Grid<S, V, D>,
        args: &A,
    ) -> Self {
        assert_eq!(ys.active(), xs.active(), "fmap2 over grids of different shape");
        let space = Space::new(xs.active());
        let mut acc = Vec::with_capacity(space.size());
        space.active().loop_over(|ipos| {
            acc.push(f(xs.get(ipos), ys.get(ipos), args));
        });
        Grid::from_parts(space, S::from_vec(acc))
    }

    pub fn fmap3<U: Payload, V: Payload, W: Payload, A: Payload>(
        f: fn(&U, &V, &W, &A) -> T,
        xs: &Grid<S, U, D>,
        ys: &Grid<S, V, D>,
        zs: &Grid<S, W, D>,
        args: &A,
    ) -> Self {
        assert_eq!(ys.active(), xs.active(), "fmap3 over grids of different shape");
        assert_eq!(zs.active(), xs.active(), "fmap3 over grids of different shape");
        let space = Space::new(xs.active());
        let mut acc = Vec::with_capacity(space.size());
        space.active().loop_over(|ipos| {
            acc.push(f(xs.get(ipos), ys.get(ipos), zs.get(ipos), args));
        });
        Grid::from_parts(space, S::from_vec(acc))
    }

    /// The face of the active region on side `dir` of dimension `d`, as a
    /// view sharing this grid's storage.
    pub fn boundary(&self, dir: usize, d: usize) -> Self {
        Grid { space: self.space.boundary(dir, d, false), data: Arc::clone(&self.data) }
    }

    /// Stencil map. For every active cell `x` at `ipos`, the neighbor on
    /// face (`dir`, `d`) is the matching slot of `bss[dir][d]` when that
    /// face is a domain boundary, and `g(neighbor, dir, d)` on the source
    /// grid otherwise; the cell function sees which faces were boundaries
    /// in `bmask` (see [`face_bit`]).
    ///
    /// Every `bss[dir][d]` must have active region
    /// `xs.active().boundary(dir, d, outer = true)`.
    pub fn fmap_stencil<U: Payload, B: Payload, A: Payload>(
        f: fn(&U, u32, &[[B; D]; 2], &A) -> T,
        g: fn(&U, usize, usize) -> B,
        xs: &Grid<S, U, D>,
        bss: &[[Grid<S, B, D>; D]; 2],
        args: &A,
    ) -> Self {
        for (dir, bs) in bss.iter().enumerate() {
            for (d, b) in bs.iter().enumerate() {
                assert_eq!(
                    b.active(),
                    xs.active().boundary(dir, d, true),
                    "boundary grid ({}, {}) does not line the active region",
                    dir,
                    d
                );
            }
        }
        let space = Space::new(xs.active());
        let mut acc = Vec::with_capacity(space.size());
        space.active().loop_bnd(|ipos, isbnd| {
            let mut bmask = 0;
            let bs: [[B; D]; 2] = std::array::from_fn(|dir| {
                std::array::from_fn(|d| {
                    let jpos = add(ipos, offset(dir, d));
                    if isbnd[dir][d] {
                        bmask |= face_bit::<D>(dir, d);
                        bss[dir][d].get(jpos).clone()
                    } else {
                        g(xs.get(jpos), dir, d)
                    }
                })
            });
            acc.push(f(xs.get(ipos), bmask, &bs, args));
        });
        Grid::from_parts(space, S::from_vec(acc))
    }

    pub fn fold_map<R: Payload, A: Payload>(
        &self,
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        args: &A,
    ) -> R {
        let mut r = z;
        self.active().loop_over(|ipos| {
            r = op(r.clone(), f(self.get(ipos), args));
        });
        r
    }

    pub fn fold_map2<U: Payload, R: Payload, A: Payload>(
        &self,
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        ys: &Grid<S, U, D>,
        args: &A,
    ) -> R {
        assert_eq!(ys.active(), self.active(), "fold_map2 over grids of different shape");
        let mut r = z;
        self.active().loop_over(|ipos| {
            r = op(r.clone(), f(self.get(ipos), ys.get(ipos), args));
        });
        r
    }

    /// A deferred textual rendering: nested brackets in row-major order.
    pub fn dump(&self) -> GridDump<'_, S, T, D> {
        GridDump { grid: self }
    }
}

impl<S: Storage, T: Payload> Grid<S, T, 1> {
    /// One-dimensional construction from an integer range.
    pub fn iota_map<A: Payload>(f: fn(i64, &A) -> T, inds: IRange, args: &A) -> Self {
        let space = Space::new(Range::from_irange(inds));
        let mut acc = Vec::with_capacity(space.size());
        space.active().loop_over(|ipos| acc.push(f(ipos[0], args)));
        Grid::from_parts(space, S::from_vec(acc))
    }
}

/// Lazily renders a grid for diagnostics.
pub struct GridDump<'a, S: Storage, T: Payload, const D: usize> {
    grid: &'a Grid<S, T, D>,
}

impl<S: Storage, T: Payload + fmt::Display, const D: usize> fmt::Display
    for GridDump<'_, S, T, D>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.grid.active();
        write!(f, "grid{{")?;
        let mut result = Ok(());
        active.loop_over(|ipos| {
            if result.is_err() {
                return;
            }
            result = (|| {
                for d in 0..D {
                    if ipos[d] > active.imin()[d] {
                        break;
                    }
                    write!(f, "[")?;
                }
                write!(f, "{},", self.grid.get(ipos))?;
                for d in 0..D {
                    if ipos[d] < active.imax()[d] - 1 {
                        break;
                    }
                    write!(f, "],")?;
                }
                Ok(())
            })();
        });
        result?;
        write!(f, "}}")
    }
}

// The family view of a grid, for generic algorithms and nesting.

pub struct GridFamily<S, const D: usize> {
    _marker: std::marker::PhantomData<S>,
}

impl<S: Storage, const D: usize> Family for GridFamily<S, D> {
    type Of<T: Payload> = Grid<S, T, D>;
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: Option<usize> = None;
}

impl<S: Storage, const D: usize> Functor for GridFamily<S, D> {
    fn fmap<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        xs: &Grid<S, T, D>,
        args: &A,
    ) -> Grid<S, R, D> {
        Grid::fmap(f, xs, args)
    }

    fn fmap2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        xs: &Grid<S, T, D>,
        ys: &Grid<S, U, D>,
        args: &A,
    ) -> Grid<S, R, D> {
        Grid::fmap2(f, xs, ys, args)
    }

    fn fmap3<T: Payload, U: Payload, V: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &V, &A) -> R,
        xs: &Grid<S, T, D>,
        ys: &Grid<S, U, D>,
        zs: &Grid<S, V, D>,
        args: &A,
    ) -> Grid<S, R, D> {
        Grid::fmap3(f, xs, ys, zs, args)
    }
}

impl<S: Storage, const D: usize> Foldable for GridFamily<S, D> {
    fn fold_map<T: Payload, R: Payload, A: Payload>(
        f: fn(&T, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Grid<S, T, D>,
        args: &A,
    ) -> R {
        xs.fold_map(f, op, z, args)
    }

    fn fold_map2<T: Payload, U: Payload, R: Payload, A: Payload>(
        f: fn(&T, &U, &A) -> R,
        op: fn(R, R) -> R,
        z: R,
        xs: &Grid<S, T, D>,
        ys: &Grid<S, U, D>,
        args: &A,
    ) -> R {
        xs.fold_map2(f, op, z, ys, args)
    }

    fn msize<T: Payload>(xs: &Grid<S, T, D>) -> usize {
        xs.size()
    }

    fn head<T: Payload>(xs: &Grid<S, T, D>) -> T {
        xs.head()
    }

    fn last<T: Payload>(xs: &Grid<S, T, D>) -> T {
        xs.last()
    }
}

impl<S: Storage> IotaMap for GridFamily<S, 1> {
    fn iota_map<R: Payload, A: Payload>(
        f: fn(i64, &A) -> R,
        inds: IRange,
        args: &A,
    ) -> Grid<S, R, 1> {
        Grid::iota_map(f, inds, args)
    }
}

impl<S: Storage, const D: usize> IotaMapMulti<D> for GridFamily<S, D> {
    fn iota_map_multi<R: Payload, A: Payload>(
        f: fn(Index<D>, &A) -> R,
        inds: Range<D>,
        args: &A,
    ) -> Grid<S, R, D> {
        Grid::iota_map_multi(f, inds, args)
    }
}

impl<S: Storage, const D: usize> HasBoundary for GridFamily<S, D> {
    type Bnd = GridFamily<S, D>;

    /// Face `i = dir * D + d`, matching [`face_bit`].
    fn boundary<T: Payload>(xs: &Grid<S, T, D>, i: usize) -> Grid<S, T, D> {
        assert!(i < 2 * D);
        xs.boundary(i / D, i % D)
    }
}
