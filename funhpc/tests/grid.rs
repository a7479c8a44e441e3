//! Grid construction, stencil, and fold scenarios.

use funhpc::container::vector::VectorFamily;
use funhpc::container::{Foldable, HasBoundary};
use funhpc::grid::{Grid, GridFamily};
use funhpc::{IRange, Index, Range};

type G1 = Grid<VectorFamily, f64, 1>;
type G2 = Grid<VectorFamily, f64, 2>;
type G3 = Grid<VectorFamily, f64, 3>;

fn as_f64(i: i64, _: &()) -> f64 {
    i as f64
}

fn index_sum3(ix: Index<3>, _: &()) -> f64 {
    (ix[0] + ix[1] + ix[2]) as f64
}

fn index_sum2(ix: Index<2>, _: &()) -> f64 {
    (ix[0] + ix[1]) as f64
}

fn get(x: &f64, _: &()) -> f64 {
    *x
}

fn plus(a: f64, b: f64) -> f64 {
    a + b
}

fn abs(x: &f64, _: &()) -> f64 {
    x.abs()
}

fn max(a: f64, b: f64) -> f64 {
    a.max(b)
}

#[test]
fn one_dimensional_iota() {
    // iotaMap over irange(10): size 10, head 0.0, last 9.0.
    let xs = G1::iota_map(as_f64, IRange::new(10), &());
    assert_eq!(xs.size(), 10);
    assert_eq!(xs.head(), 0.0);
    assert_eq!(xs.last(), 9.0);
}

#[test]
fn three_dimensional_fold() {
    // Sum of i+j+k over a 10^3 cube: 3 * 100 * 45.
    let xs = G3::iota_map_multi(index_sum3, Range::new([10, 10, 10]), &());
    assert_eq!(xs.size(), 1000);
    assert_eq!(xs.fold_map(get, plus, 0.0, &()), 13500.0);
}

/// The 2 x D boundary grids lining a grid's active region, built from
/// the same index formula.
fn boundaries2(xs: &G2) -> [[G2; 2]; 2] {
    std::array::from_fn(|dir| {
        std::array::from_fn(|d| {
            G2::iota_map_multi(index_sum2, xs.active().boundary(dir, d, true), &())
        })
    })
}

#[test]
fn laplacian_of_a_linear_field_vanishes() {
    fn laplacian(x: &f64, _bmask: u32, bs: &[[f64; 2]; 2], _: &()) -> f64 {
        (bs[0][0] - 2.0 * x + bs[1][0]) + (bs[0][1] - 2.0 * x + bs[1][1])
    }
    fn pass(x: &f64, _dir: usize, _d: usize) -> f64 {
        *x
    }
    let s = 10;
    let xs = G2::iota_map_multi(index_sum2, Range::new([s, s]), &());
    let ys = G2::fmap_stencil(laplacian, pass, &xs, &boundaries2(&xs), &());
    assert_eq!(ys.fold_map(abs, max, 0.0, &()), 0.0);
}

#[test]
fn identity_stencil_is_identity() {
    fn keep(x: &f64, _bmask: u32, _bs: &[[f64; 2]; 2], _: &()) -> f64 {
        *x
    }
    fn pass(x: &f64, _dir: usize, _d: usize) -> f64 {
        *x
    }
    let xs = G2::iota_map_multi(index_sum2, Range::new([6, 4]), &());
    let ys = G2::fmap_stencil(keep, pass, &xs, &boundaries2(&xs), &());
    assert_eq!(ys.active(), xs.active());
    assert_eq!(ys.size(), xs.size());
    let diff = G2::fmap2(sub, &xs, &ys, &());
    assert_eq!(diff.fold_map(abs, max, 0.0, &()), 0.0);

    fn sub(a: &f64, b: &f64, _: &()) -> f64 {
        a - b
    }
}

#[test]
fn stencil_mask_marks_domain_faces() {
    fn mask_of(_x: &f64, bmask: u32, _bs: &[[f64; 2]; 2], _: &()) -> f64 {
        bmask as f64
    }
    fn pass(x: &f64, _dir: usize, _d: usize) -> f64 {
        *x
    }
    let xs = G2::iota_map_multi(index_sum2, Range::new([3, 3]), &());
    let masks = G2::fmap_stencil(mask_of, pass, &xs, &boundaries2(&xs), &());
    // Corner (0, 0): lower faces of both dimensions.
    assert_eq!(masks.head(), (1 + 2) as f64);
    // Corner (2, 2): upper faces of both dimensions.
    assert_eq!(masks.last(), (4 + 8) as f64);
    // The center cell touches no face.
    assert_eq!(*masks.get([1, 1]), 0.0);
}

#[test]
#[should_panic]
fn mismatched_boundary_shapes_are_fatal() {
    fn keep(x: &f64, _bmask: u32, _bs: &[[f64; 2]; 2], _: &()) -> f64 {
        *x
    }
    fn pass(x: &f64, _dir: usize, _d: usize) -> f64 {
        *x
    }
    let xs = G2::iota_map_multi(index_sum2, Range::new([4, 4]), &());
    // Boundaries built for the wrong region.
    let other = G2::iota_map_multi(index_sum2, Range::new([5, 5]), &());
    let _ = G2::fmap_stencil(keep, pass, &xs, &boundaries2(&other), &());
}

#[test]
fn boundary_views_take_faces() {
    // A face of a D-dimensional cube of side s has s^(D-1) cells and
    // starts at the corner value.
    let s = 4;
    let xs = G2::iota_map_multi(index_sum2, Range::new([s, s]), &());
    for i in 0..4 {
        let face = GridFamily::<VectorFamily, 2>::boundary(&xs, i);
        assert_eq!(face.size(), s as usize);
    }
    assert_eq!(GridFamily::<VectorFamily, 2>::boundary(&xs, 0).head(), 0.0);
    // The upper face in dimension 0 starts at (s-1, 0).
    assert_eq!(
        GridFamily::<VectorFamily, 2>::boundary(&xs, 2).head(),
        (s - 1) as f64
    );
}

#[test]
fn fmap_of_a_view_compacts() {
    // Mapping over a boundary view produces a fresh dense grid over just
    // the face.
    let xs = G2::iota_map_multi(index_sum2, Range::new([5, 5]), &());
    let face = xs.boundary(1, 1);
    assert_eq!(face.size(), 5);
    let doubled = G2::fmap(double, &face, &());
    assert_eq!(doubled.size(), 5);
    assert_eq!(doubled.head(), 8.0);
    assert_eq!(doubled.last(), 16.0);

    fn double(x: &f64, _: &()) -> f64 {
        2.0 * x
    }
}

#[test]
fn boundary_map_is_fmap_over_the_face() {
    use funhpc::container::boundary_map;
    fn shift(x: &f64, face: &(usize, f64)) -> f64 {
        x + face.1
    }
    let xs = G2::iota_map_multi(index_sum2, Range::new([4, 4]), &());
    let face = boundary_map::<GridFamily<VectorFamily, 2>, _, _, _>(shift, &xs, 1, &100.0);
    assert_eq!(face.size(), 4);
    assert_eq!(face.head(), 100.0);
    assert_eq!(face.last(), 103.0);
}

#[test]
fn fold_map2_zips_grids() {
    fn prod(a: &f64, b: &f64, _: &()) -> f64 {
        a * b
    }
    let xs = G1::iota_map(as_f64, IRange::new(4), &());
    let ys = G1::iota_map(as_f64, IRange::new(4), &());
    // 0 + 1 + 4 + 9
    assert_eq!(xs.fold_map2(prod, plus, 0.0, &ys, &()), 14.0);
}

#[test]
fn dump_renders_row_major() {
    let xs = Grid::<VectorFamily, i64, 1>::iota_map(ident, IRange::new(3), &());
    assert_eq!(format!("{}", xs.dump()), "grid{[0,1,2,],}");

    fn ident(i: i64, _: &()) -> i64 {
        i
    }
}

#[test]
fn unit_and_empty_grids() {
    let unit = G2::munit(3.5);
    assert_eq!(unit.size(), 1);
    assert_eq!(unit.mextract(), 3.5);
    let empty = G2::mzero();
    assert!(empty.empty());
    assert_eq!(GridFamily::<VectorFamily, 2>::msize(&empty), 0);
}

#[test]
fn wire_roundtrip_preserves_the_active_region() {
    let xs = G2::iota_map_multi(index_sum2, Range::new([4, 4]), &());
    let face = xs.boundary(0, 1);
    let bytes = bincode::serialize(&face).unwrap();
    let back: G2 = bincode::deserialize(&bytes).unwrap();
    assert_eq!(back.active(), face.active());
    assert_eq!(back.head(), face.head());
    assert_eq!(back.last(), face.last());
}
