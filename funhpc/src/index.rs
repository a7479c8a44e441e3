//! Integer ranges, multi-dimensional index ranges, and index spaces.
//!
//! These are the loop drivers underneath every indexed container. A
//! [`Space`] pairs the physically backed (`allocated`) region with the
//! observable (`active`) region and owns the row-major stride arithmetic;
//! `stride[0]` is always 1 and dimension 0 varies fastest in all loops.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A multi-dimensional index.
pub type Index<const D: usize> = [i64; D];

/// `[0; D]`.
pub fn zero<const D: usize>() -> Index<D> {
    [0; D]
}

/// `[1; D]`.
pub fn one<const D: usize>() -> Index<D> {
    [1; D]
}

/// Componentwise sum.
pub fn add<const D: usize>(a: Index<D>, b: Index<D>) -> Index<D> {
    std::array::from_fn(|d| a[d] + b[d])
}

/// Componentwise difference.
pub fn sub<const D: usize>(a: Index<D>, b: Index<D>) -> Index<D> {
    std::array::from_fn(|d| a[d] - b[d])
}

/// Componentwise minimum.
pub fn min<const D: usize>(a: Index<D>, b: Index<D>) -> Index<D> {
    std::array::from_fn(|d| a[d].min(b[d]))
}

/// The unit offset along dimension `d`, pointing inward from side `dir`:
/// `-e_d` for the lower face, `+e_d` for the upper face.
pub fn offset<const D: usize>(dir: usize, d: usize) -> Index<D> {
    debug_assert!(dir < 2 && d < D);
    let mut ofs = [0; D];
    ofs[d] = if dir == 0 { -1 } else { 1 };
    ofs
}

fn div_ceil(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    if a <= 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

// Integer range ///////////////////////////////////////////////////////////////

/// A finite strided sequence `imin, imin+istep, ...` below `imax`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IRange {
    imin: i64,
    imax: i64,
    istep: i64,
}

impl Default for IRange {
    fn default() -> Self {
        IRange::new(0)
    }
}

impl IRange {
    /// `0..imax` with step 1.
    pub fn new(imax: i64) -> IRange {
        IRange::with_min(0, imax)
    }

    /// `imin..imax` with step 1.
    pub fn with_min(imin: i64, imax: i64) -> IRange {
        IRange::strided(imin, imax, 1)
    }

    /// `imin..imax` with the given step; the step must be positive.
    pub fn strided(imin: i64, imax: i64, istep: i64) -> IRange {
        assert!(istep > 0, "irange step must be positive, got {}", istep);
        IRange { imin, imax, istep }
    }

    pub fn imin(&self) -> i64 {
        self.imin
    }

    pub fn imax(&self) -> i64 {
        self.imax
    }

    pub fn istep(&self) -> i64 {
        self.istep
    }

    /// Number of elements in the sequence.
    pub fn shape(&self) -> i64 {
        div_ceil(self.imax - self.imin, self.istep)
    }

    pub fn size(&self) -> usize {
        self.shape() as usize
    }

    pub fn empty(&self) -> bool {
        self.imax <= self.imin
    }

    /// The `i`-th element, `imin + i * istep`.
    pub fn index(&self, i: i64) -> i64 {
        self.imin + i * self.istep
    }

    /// Iterates the sequence in order.
    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let r = *self;
        (0..r.shape()).map(move |i| r.index(i))
    }
}

impl fmt::Display for IRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "irange({}:{}:{})", self.imin, self.imax, self.istep)
    }
}

// Multi-dimensional unit range ////////////////////////////////////////////////

// Wire form of an index: a plain sequence. (Fixed-size arrays with a
// generic length have no serde impls.)
fn index_from_vec<const D: usize, E: serde::de::Error>(v: Vec<i64>) -> Result<Index<D>, E> {
    let len = v.len();
    v.try_into()
        .map_err(|_| E::custom(format!("index of rank {} where {} expected", len, D)))
}

/// A half-open hyperrectangle of indices with unit step.
#[derive(Clone, Copy, Debug)]
pub struct Range<const D: usize> {
    imin: Index<D>,
    imax: Index<D>,
}

impl<const D: usize> Serialize for Range<D> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.imin[..], &self.imax[..]).serialize(serializer)
    }
}

impl<'de, const D: usize> Deserialize<'de> for Range<D> {
    fn deserialize<De: serde::Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let (imin, imax): (Vec<i64>, Vec<i64>) = Deserialize::deserialize(deserializer)?;
        Ok(Range { imin: index_from_vec(imin)?, imax: index_from_vec(imax)? })
    }
}

impl<const D: usize> Default for Range<D> {
    fn default() -> Self {
        Range::new(zero())
    }
}

impl Range<1> {
    /// Converts a unit-step integer range.
    pub fn from_irange(inds: IRange) -> Range<1> {
        assert_eq!(inds.istep(), 1, "only unit-step ranges have a multi-index form");
        Range { imin: [inds.imin()], imax: [inds.imax()] }
    }
}

impl<const D: usize> Range<D> {
    /// `[0, imax)` in every dimension.
    pub fn new(imax: Index<D>) -> Range<D> {
        Range { imin: zero(), imax }
    }

    pub fn with_min(imin: Index<D>, imax: Index<D>) -> Range<D> {
        Range { imin, imax }
    }

    pub fn imin(&self) -> Index<D> {
        self.imin
    }

    pub fn imax(&self) -> Index<D> {
        self.imax
    }

    pub fn istep(&self) -> Index<D> {
        one()
    }

    /// Componentwise extent, clamped at zero.
    pub fn shape(&self) -> Index<D> {
        std::array::from_fn(|d| (self.imax[d] - self.imin[d]).max(0))
    }

    pub fn size(&self) -> usize {
        self.shape().iter().product::<i64>() as usize
    }

    pub fn empty(&self) -> bool {
        (0..D).any(|d| self.imax[d] <= self.imin[d])
    }

    /// The face of thickness 1 on side `dir` of dimension `d`, shifted one
    /// step outward when `outer` is set.
    pub fn boundary(&self, dir: usize, d: usize, outer: bool) -> Range<D> {
        assert!(!self.empty());
        assert!(dir < 2);
        assert!(d < D);
        let mut bnd = *self;
        if dir == 0 {
            if outer {
                bnd.imin[d] -= 1;
            }
            bnd.imax[d] = bnd.imin[d] + 1;
        } else {
            if outer {
                bnd.imax[d] += 1;
            }
            bnd.imin[d] = bnd.imax[d] - 1;
        }
        bnd
    }

    /// Calls `f` for every index, dimension 0 varying fastest.
    pub fn loop_over<F: FnMut(Index<D>)>(&self, mut f: F) {
        if self.empty() {
            return;
        }
        let mut ipos = self.imin;
        loop {
            f(ipos);
            let mut d = 0;
            loop {
                ipos[d] += 1;
                if ipos[d] < self.imax[d] {
                    break;
                }
                ipos[d] = self.imin[d];
                d += 1;
                if d == D {
                    return;
                }
            }
        }
    }

    /// Calls `f(index, is_boundary)` for every index, where
    /// `is_boundary[side][dim]` is set iff the index touches that face of
    /// this range. Each dimension is split into its min face, interior,
    /// and max face; an extent-1 dimension is both faces at once.
    pub fn loop_bnd<F: FnMut(Index<D>, [[bool; D]; 2])>(&self, mut f: F) {
        if self.empty() {
            return;
        }
        self.loop_bnd_impl(D, zero(), [[false; D]; 2], &mut f);
    }

    fn loop_bnd_impl<F: FnMut(Index<D>, [[bool; D]; 2])>(
        &self,
        dims: usize,
        ipos: Index<D>,
        isbnd: [[bool; D]; 2],
        f: &mut F,
    ) {
        if dims == 0 {
            f(ipos, isbnd);
            return;
        }
        let d = dims - 1;
        let imin = self.imin[d];
        let imax = self.imax[d];
        let mut at = |i: i64, lo: bool, hi: bool| {
            let mut ipos = ipos;
            let mut isbnd = isbnd;
            ipos[d] = i;
            isbnd[0][d] = lo;
            isbnd[1][d] = hi;
            self.loop_bnd_impl(d, ipos, isbnd, f);
        };
        if imin + 1 == imax {
            at(imin, true, true);
        } else {
            at(imin, true, false);
            for i in imin + 1..imax - 1 {
                at(i, false, false);
            }
            at(imax - 1, false, true);
        }
    }
}

impl<const D: usize> PartialEq for Range<D> {
    /// All empty ranges compare equal.
    fn eq(&self, other: &Range<D>) -> bool {
        (self.empty() && other.empty())
            || (!self.empty() && !other.empty() && self.imin == other.imin && self.imax == other.imax)
    }
}

impl<const D: usize> Eq for Range<D> {}

impl<const D: usize> fmt::Display for Range<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "range({:?}:{:?})", self.imin, self.imax)
    }
}

// Multi-dimensional strided range /////////////////////////////////////////////

/// A half-open hyperrectangle with a positive per-dimension step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRange<const D: usize> {
    imin: Index<D>,
    imax: Index<D>,
    istep: Index<D>,
}

impl<const D: usize> Serialize for StepRange<D> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.imin[..], &self.imax[..], &self.istep[..]).serialize(serializer)
    }
}

impl<'de, const D: usize> Deserialize<'de> for StepRange<D> {
    fn deserialize<De: serde::Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let (imin, imax, istep): (Vec<i64>, Vec<i64>, Vec<i64>) =
            Deserialize::deserialize(deserializer)?;
        Ok(StepRange {
            imin: index_from_vec(imin)?,
            imax: index_from_vec(imax)?,
            istep: index_from_vec(istep)?,
        })
    }
}

impl<const D: usize> StepRange<D> {
    pub fn new(imax: Index<D>) -> StepRange<D> {
        StepRange::strided(zero(), imax, one())
    }

    pub fn with_min(imin: Index<D>, imax: Index<D>) -> StepRange<D> {
        StepRange::strided(imin, imax, one())
    }

    pub fn strided(imin: Index<D>, imax: Index<D>, istep: Index<D>) -> StepRange<D> {
        assert!(istep.iter().all(|&s| s > 0), "steprange steps must be positive");
        StepRange { imin, imax, istep }
    }

    pub fn imin(&self) -> Index<D> {
        self.imin
    }

    pub fn imax(&self) -> Index<D> {
        self.imax
    }

    pub fn istep(&self) -> Index<D> {
        self.istep
    }

    pub fn shape(&self) -> Index<D> {
        std::array::from_fn(|d| div_ceil(self.imax[d] - self.imin[d], self.istep[d]))
    }

    pub fn size(&self) -> usize {
        self.shape().iter().product::<i64>() as usize
    }

    pub fn empty(&self) -> bool {
        (0..D).any(|d| self.imax[d] <= self.imin[d])
    }
}

// Index space /////////////////////////////////////////////////////////////////

/// An allocated backing region together with the active sub-region that
/// carries observable data.
///
/// Strides are stored explicitly, computed row-major over `allocated` with
/// `stride[0] = 1`; they never change when the active region is narrowed
/// to a face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Space<const D: usize> {
    allocated: Range<D>,
    active: Range<D>,
    strides: [i64; D],
}

impl<const D: usize> Serialize for Space<D> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.allocated, &self.active).serialize(serializer)
    }
}

impl<'de, const D: usize> Deserialize<'de> for Space<D> {
    fn deserialize<De: serde::Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let (allocated, active): (Range<D>, Range<D>) = Deserialize::deserialize(deserializer)?;
        // Strides are derived state; recompute rather than trusting the
        // wire.
        Ok(Space::with_allocated(allocated, active))
    }
}

impl<const D: usize> Default for Space<D> {
    fn default() -> Self {
        Space::new(Range::default())
    }
}

impl<const D: usize> Space<D> {
    /// Allocated and active coincide.
    pub fn new(active: Range<D>) -> Space<D> {
        Space::with_allocated(active, active)
    }

    pub fn with_allocated(allocated: Range<D>, active: Range<D>) -> Space<D> {
        let shape = allocated.shape();
        let mut strides = [1; D];
        for d in 1..D {
            strides[d] = strides[d - 1] * shape[d - 1];
        }
        let space = Space { allocated, active, strides };
        assert!(space.invariant(), "active region {} escapes allocated region {}", active, allocated);
        space
    }

    pub fn invariant(&self) -> bool {
        self.active.empty()
            || (0..D).all(|d| {
                self.active.imin()[d] >= self.allocated.imin()[d]
                    && self.active.imax()[d] <= self.allocated.imax()[d]
            })
    }

    pub fn allocated(&self) -> Range<D> {
        self.allocated
    }

    pub fn active(&self) -> Range<D> {
        self.active
    }

    pub fn size(&self) -> usize {
        self.active.size()
    }

    pub fn empty(&self) -> bool {
        self.active.empty()
    }

    /// Linear offset of `ipos` in the allocated backing.
    pub fn linear(&self, ipos: Index<D>) -> usize {
        debug_assert!(
            (0..D).all(|d| ipos[d] >= self.active.imin()[d] && ipos[d] < self.active.imax()[d]),
            "index {:?} outside active region {}",
            ipos,
            self.active
        );
        let mut ilin = 0;
        for d in 0..D {
            ilin += (ipos[d] - self.allocated.imin()[d]) * self.strides[d];
        }
        ilin as usize
    }

    /// Narrows the active region to a face, keeping the backing.
    pub fn boundary(&self, dir: usize, d: usize, outer: bool) -> Space<D> {
        let narrowed = Space {
            allocated: self.allocated,
            active: self.active.boundary(dir, d, outer),
            strides: self.strides,
        };
        assert!(narrowed.invariant());
        narrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irange_shape() {
        assert_eq!(IRange::new(10).shape(), 10);
        assert_eq!(IRange::with_min(3, 10).shape(), 7);
        assert_eq!(IRange::strided(0, 10, 3).shape(), 4);
        assert_eq!(IRange::with_min(5, 5).shape(), 0);
        assert!(IRange::with_min(5, 3).empty());
        assert_eq!(IRange::strided(2, 11, 3).index(2), 8);
    }

    #[test]
    #[should_panic]
    fn irange_rejects_nonpositive_step() {
        let _ = IRange::strided(0, 10, 0);
    }

    #[test]
    fn range_shape_and_equality() {
        let r = Range::with_min([1, 2], [4, 7]);
        assert_eq!(r.shape(), [3, 5]);
        assert_eq!(r.size(), 15);
        assert!(!r.empty());
        // Empty ranges are all equal.
        assert_eq!(Range::with_min([3, 0], [3, 5]), Range::<2>::new([0, 0]));
        assert_ne!(r, Range::<2>::new([0, 0]));
    }

    #[test]
    fn loop_order_is_dim0_fastest() {
        let mut seen = Vec::new();
        Range::with_min([0, 0], [2, 2]).loop_over(|ipos| seen.push(ipos));
        assert_eq!(seen, vec![[0, 0], [1, 0], [0, 1], [1, 1]]);
    }

    #[test]
    fn loop_bnd_flags() {
        let mut corner = None;
        let mut interior = 0;
        Range::<2>::new([3, 3]).loop_bnd(|ipos, isbnd| {
            if ipos == [0, 0] {
                corner = Some(isbnd);
            }
            if !isbnd[0].iter().chain(isbnd[1].iter()).any(|&b| b) {
                interior += 1;
            }
        });
        assert_eq!(corner, Some([[true, true], [false, false]]));
        assert_eq!(interior, 1);
    }

    #[test]
    fn loop_bnd_extent_one_is_both_faces() {
        let mut flags = Vec::new();
        Range::<1>::new([1]).loop_bnd(|_, isbnd| flags.push(isbnd));
        assert_eq!(flags, vec![[[true], [true]]]);
    }

    #[test]
    fn boundary_faces() {
        let r = Range::with_min([0, 0], [4, 5]);
        let lo = r.boundary(0, 0, false);
        assert_eq!(lo.imin(), [0, 0]);
        assert_eq!(lo.imax(), [1, 5]);
        let hi_outer = r.boundary(1, 1, true);
        assert_eq!(hi_outer.imin(), [0, 5]);
        assert_eq!(hi_outer.imax(), [4, 6]);
    }

    #[test]
    fn space_linear_is_row_major() {
        let space = Space::new(Range::<3>::new([4, 3, 2]));
        assert_eq!(space.linear([0, 0, 0]), 0);
        assert_eq!(space.linear([1, 0, 0]), 1);
        assert_eq!(space.linear([0, 1, 0]), 4);
        assert_eq!(space.linear([0, 0, 1]), 12);
        assert_eq!(space.linear([3, 2, 1]), 23);
    }

    #[test]
    fn space_boundary_keeps_strides() {
        let space = Space::new(Range::<2>::new([4, 4]));
        let face = space.boundary(1, 0, false);
        assert_eq!(face.active().shape(), [1, 4]);
        // Same backing: linear offsets match the full space.
        assert_eq!(face.linear([3, 2]), space.linear([3, 2]));
    }

    #[test]
    #[should_panic]
    fn space_rejects_escaping_active() {
        let _ = Space::with_allocated(Range::<1>::new([4]), Range::with_min([2], [6]));
    }
}
