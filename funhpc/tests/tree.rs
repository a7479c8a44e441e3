//! Tree construction, folding, and the sibling-boundary stencil.

use funhpc::container::tree::{Tree, TreeFamily};
use funhpc::container::vector::VectorFamily;
use funhpc::container::{Foldable, IotaMap};
use funhpc::{IRange, Index, Range};

type T = TreeFamily<VectorFamily>;
type VTree = Tree<VectorFamily, i64>;

fn one(_i: i64, _: &()) -> i64 {
    1
}

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
fn thousand_ones_sum_to_a_thousand() {
    let xs = T::iota_map(one, IRange::new(1000), &());
    assert_eq!(T::msize(&xs), 1000);
    assert_eq!(T::fold_map(get, plus, 0, &xs, &()), 1000);
}

#[test]
fn multi_dimensional_chunking_covers_the_range() {
    fn sum3(ix: Index<3>, _: &()) -> i64 {
        ix[0] + ix[1] + ix[2]
    }
    let xs = VTree::iota_map_multi(sum3, Range::new([10, 10, 10]), &());
    assert_eq!(xs.msize(), 1000);
    assert_eq!(xs.fold_map(get, plus, 0, &()), 13500);
}

#[test]
fn stencil_reads_siblings_and_caller_boundaries() {
    fn lap(x: &i64, _bmask: u32, lo: &i64, hi: &i64, _: &()) -> i64 {
        lo - 2 * x + hi
    }
    fn pass(x: &i64, _dir: usize) -> i64 {
        *x
    }
    fn abs_max(x: &i64, _: &()) -> i64 {
        x.abs()
    }
    fn max(a: i64, b: i64) -> i64 {
        a.max(b)
    }
    // Linear data: the discrete second derivative vanishes when the
    // boundary values continue the line.
    let xs = VTree::iota_map(ident, IRange::new(50), &());
    let ys = Tree::fmap_stencil(lap, pass, &xs, &-1, &50, &());
    assert_eq!(ys.fold_map(abs_max, max, 0, &()), 0);
}

#[test]
fn stencil_mask_marks_the_global_ends() {
    fn mask_of(_x: &i64, bmask: u32, _lo: &i64, _hi: &i64, _: &()) -> i64 {
        bmask as i64
    }
    fn pass(x: &i64, _dir: usize) -> i64 {
        *x
    }
    let xs = VTree::iota_map(ident, IRange::new(40), &());
    let masks = Tree::fmap_stencil(mask_of, pass, &xs, &0, &0, &());
    assert_eq!(masks.head(), 1);
    assert_eq!(masks.last(), 2);
    fn interior(x: &i64, _: &()) -> i64 {
        i64::from(*x == 0)
    }
    assert_eq!(masks.fold_map(interior, plus, 0, &()), 38);
}

#[test]
fn wire_roundtrip_preserves_structure() {
    let xs = T::iota_map(ident, IRange::new(40), &());
    let bytes = bincode::serialize(&xs).unwrap();
    let ys: VTree = bincode::deserialize(&bytes).unwrap();
    assert_eq!(xs, ys);
}
