//! The universal container laws, checked per family through the shared
//! vocabulary.

use funhpc::container::id::IdFamily;
use funhpc::container::maxarray::MaxArrayFamily;
use funhpc::container::shared::SharedFamily;
use funhpc::container::tree::TreeFamily;
use funhpc::container::vector::VectorFamily;
use funhpc::container::{Foldable, Functor, IotaMap, Monadic, Monoidal};
use funhpc::IRange;

fn ident(x: &i64, _: &()) -> i64 {
    *x
}

fn from_index(i: i64, _: &()) -> i64 {
    10 * i + 3
}

fn inc(x: &i64, _: &()) -> i64 {
    x + 1
}

fn double(x: &i64, _: &()) -> i64 {
    x * 2
}

fn double_after_inc(x: &i64, _: &()) -> i64 {
    (x + 1) * 2
}

fn singleton(x: &i64, _: &()) -> Vec<i64> {
    vec![*x]
}

fn concat(mut a: Vec<i64>, b: Vec<i64>) -> Vec<i64> {
    a.extend(b);
    a
}

fn plus(a: i64, b: i64) -> i64 {
    a + b
}

/// The observable content of a container, in fold order.
fn elements<C: Foldable>(xs: &C::Of<i64>) -> Vec<i64> {
    C::fold_map(singleton, concat, Vec::new(), xs, &())
}

fn functor_laws<C: Functor + Foldable + IotaMap>(n: i64) {
    let xs = C::iota_map(from_index, IRange::new(n), &());
    // fmap id = id
    assert_eq!(elements::<C>(&C::fmap(ident, &xs, &())), elements::<C>(&xs));
    // fmap (g . f) = fmap g . fmap f
    assert_eq!(
        elements::<C>(&C::fmap(double_after_inc, &xs, &())),
        elements::<C>(&C::fmap(double, &C::fmap(inc, &xs, &()), &()))
    );
}

fn fold_unit_law<C: Monadic + Foldable>() {
    // foldMap f op z (munit x) = op(z, f(x))
    let x = 17i64;
    assert_eq!(
        C::fold_map(double, plus, 100, &C::munit(x), &()),
        plus(100, double(&x, &()))
    );
    assert_eq!(C::msize(&C::munit(x)), 1);
    assert_eq!(C::mextract(&C::munit(x)), x);
}

fn monoid_laws<C: Monadic + Monoidal + Foldable + IotaMap>(n: i64) {
    let xs = C::iota_map(from_index, IRange::new(n), &());
    let ys = C::iota_map(inc_index, IRange::new(3), &());
    assert_eq!(C::msize(&C::mzero::<i64>()), 0);
    assert!(C::mempty(&C::mzero::<i64>()));
    assert!(!C::mempty(&C::munit(5)));
    assert_eq!(
        C::msize(&C::mplus(&xs, &ys)),
        C::msize(&xs) + C::msize(&ys)
    );
    assert_eq!(
        elements::<C>(&C::mplus(&xs, &ys)),
        concat(elements::<C>(&xs), elements::<C>(&ys))
    );

    fn inc_index(i: i64, _: &()) -> i64 {
        i + 1
    }
}

fn ends_law<C: Foldable + IotaMap>(n: i64) {
    let xs = C::iota_map(from_index, IRange::new(n), &());
    assert_eq!(C::head(&xs), from_index(0, &()));
    assert_eq!(C::last(&xs), from_index(n - 1, &()));
}

#[test]
fn vector_obeys_the_laws() {
    functor_laws::<VectorFamily>(20);
    fold_unit_law::<VectorFamily>();
    monoid_laws::<VectorFamily>(20);
    ends_law::<VectorFamily>(20);
}

#[test]
fn maxarray_obeys_the_laws() {
    functor_laws::<MaxArrayFamily<32>>(20);
    fold_unit_law::<MaxArrayFamily<32>>();
    monoid_laws::<MaxArrayFamily<32>>(20);
    ends_law::<MaxArrayFamily<32>>(20);
}

#[test]
fn shared_cell_obeys_the_laws() {
    functor_laws::<SharedFamily>(1);
    fold_unit_law::<SharedFamily>();
    ends_law::<SharedFamily>(1);
}

#[test]
fn unit_container_obeys_the_laws() {
    functor_laws::<IdFamily>(1);
    fold_unit_law::<IdFamily>();
    ends_law::<IdFamily>(1);
}

#[test]
fn tree_obeys_the_laws() {
    functor_laws::<TreeFamily<VectorFamily>>(500);
    fold_unit_law::<TreeFamily<VectorFamily>>();
    monoid_laws::<TreeFamily<VectorFamily>>(500);
    ends_law::<TreeFamily<VectorFamily>>(500);
}

#[test]
fn join_of_units_is_identity() {
    // mjoin(fmap(munit, xs)) = xs, checked at the two concatenating
    // families.
    fn munit_vec(x: &i64, _: &()) -> Vec<i64> {
        VectorFamily::munit(*x)
    }
    let xs = VectorFamily::iota_map(from_index, IRange::new(12), &());
    assert_eq!(
        VectorFamily::mjoin(&VectorFamily::fmap(munit_vec, &xs, &())),
        xs
    );

    type VTree = TreeFamily<VectorFamily>;
    fn munit_tree(
        x: &i64,
        _: &(),
    ) -> funhpc::container::tree::Tree<VectorFamily, i64> {
        VTree::munit(*x)
    }
    let ts = VTree::iota_map(from_index, IRange::new(40), &());
    assert_eq!(
        elements::<VTree>(&VTree::mjoin(&VTree::fmap(munit_tree, &ts, &()))),
        elements::<VTree>(&ts)
    );
}

#[test]
fn mbind_is_join_after_map() {
    fn pair_with_next(x: &i64, _: &()) -> Vec<i64> {
        vec![*x, x + 1]
    }
    let xs = VectorFamily::iota_map(from_index, IRange::new(5), &());
    assert_eq!(
        VectorFamily::mbind(pair_with_next, &xs, &()),
        VectorFamily::mjoin(&VectorFamily::fmap(pair_with_next, &xs, &()))
    );
}
