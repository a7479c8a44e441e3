//! Single-process runtime behavior: futures, local remote execution,
//! proxies, and distributed containers degenerating to local spawns.

use funhpc::container::vector::VectorFamily;
use funhpc::container::nested::NestedFamily;
use funhpc::container::{Foldable, Functor, IotaMap, Monadic};
use funhpc::grid::GridFamily;
use funhpc::remote::{
    make_local_proxy, make_remote_proxy, remote_call, rexec, rexec_async, rexec_sync, unwrap,
    Proxy, ProxyFamily, SharedRptr,
};
use funhpc::IRange;

#[test]
fn rank_and_size_default_to_singleton() {
    let _ = env_logger::builder().is_test(true).try_init();
    assert_eq!(funhpc::rank(), 0);
    assert_eq!(funhpc::size(), 1);
}

#[test]
fn futures_chain_across_tasks() {
    let fut = funhpc::spawn(|| 21).then(|x| x * 2);
    assert_eq!(fut.get(), 42);
}

fn add((a, b): (i64, i64)) -> i64 {
    a + b
}

#[test]
fn rexec_variants_bypass_the_transport() {
    assert_eq!(rexec_sync(0, add, (20, 22)), 42);
    assert_eq!(rexec_async(0, add, (1, 2)).get(), 3);
    fn noop(_: ()) {}
    rexec(0, noop, ());
    funhpc::quiesce();
}

#[test]
fn local_proxy_roundtrip() {
    let p = make_local_proxy(42i64);
    p.wait();
    assert!(p.valid());
    assert_eq!(p.get_proc(), funhpc::rank());
    assert!(p.local());
    assert_eq!(ProxyFamily::mextract(&p), 42);
}

#[test]
fn proxy_unwrap_reaches_the_inner_payload() {
    // proxy<proxy<int>>: flattening must preserve the inner owner and
    // find the payload without copying it around.
    let p = make_local_proxy(42i64);
    let pp = make_local_proxy(p.clone());
    let q = unwrap(&pp);
    q.wait();
    assert!(q.valid());
    assert_eq!(q.get_proc(), funhpc::rank());
    let local = q.make_local();
    local.wait();
    assert_eq!(*local.get_arc(), 42);
}

#[test]
fn join_of_unit_is_identity_for_proxies() {
    let p = make_local_proxy(7i64);
    p.wait();
    let q = ProxyFamily::mjoin(&ProxyFamily::munit(p.clone()));
    assert_eq!(q, p);
}

fn double_cell(x: &i64, _: &()) -> i64 {
    x * 2
}

#[test]
fn proxy_fmap_runs_where_the_payload_lives() {
    let p = make_local_proxy(21i64);
    let q = ProxyFamily::fmap(double_cell, &p, &());
    q.wait();
    assert_eq!(q.get_proc(), p.get_proc());
    assert_eq!(ProxyFamily::mextract(&q), double_cell(&21, &()));
}

#[test]
fn proxy_fmap2_pulls_the_second_payload() {
    fn sum2(a: &i64, b: &i64, _: &()) -> i64 {
        a + b
    }
    let p = make_local_proxy(40i64);
    let q = make_local_proxy(2i64);
    let r = ProxyFamily::fmap2(sum2, &p, &q, &());
    assert_eq!(ProxyFamily::mextract(&r), 42);
}

#[test]
fn proxy_fold_is_synchronous() {
    fn get(x: &i64, _: &()) -> i64 {
        *x
    }
    fn plus(a: i64, b: i64) -> i64 {
        a + b
    }
    let p = make_local_proxy(5i64);
    assert_eq!(ProxyFamily::fold_map(get, plus, 10, &p, &()), 15);
    // The empty proxy folds to the unit.
    assert_eq!(ProxyFamily::fold_map(get, plus, 10, &Proxy::invalid(), &()), 10);
}

#[test]
fn remote_call_on_self_allocates_locally() {
    fn square(x: i64) -> i64 {
        x * x
    }
    let p = remote_call(0, square, 9);
    assert_eq!(ProxyFamily::mextract(&p), 81);
    let q = make_remote_proxy(0, 33i64);
    assert_eq!(ProxyFamily::mextract(&q), 33);
}

#[test]
fn shared_rptr_handles_are_proxy_payloads() {
    let r = SharedRptr::new(vec![1i64, 2, 3]);
    let p = Proxy::from_shared_rptr(r.clone());
    p.wait();
    assert!(p.local());
    assert_eq!(*p.get_arc(), vec![1, 2, 3]);
}

// The distributed container: a proxy-shaped outer layer over a
// grid-shaped inner layer. In a single process the outer slot lives
// here, but every operation still routes through the dispatch path.
type DistGrid = NestedFamily<ProxyFamily, GridFamily<VectorFamily, 1>>;

fn as_f64(i: i64, _: &()) -> f64 {
    i as f64
}

fn get_f64(x: &f64, _: &()) -> f64 {
    *x
}

fn plus_f64(a: f64, b: f64) -> f64 {
    a + b
}

#[test]
fn nested_proxy_grid_behaves_like_a_collection() {
    let xs = DistGrid::iota_map(as_f64, IRange::new(100), &());
    assert_eq!(DistGrid::msize(&xs), 100);
    assert_eq!(DistGrid::head(&xs), 0.0);
    assert_eq!(DistGrid::last(&xs), 99.0);
    assert_eq!(DistGrid::fold_map(get_f64, plus_f64, 0.0, &xs, &()), 4950.0);

    fn square(x: &f64, _: &()) -> f64 {
        x * x
    }
    let ys = DistGrid::fmap(square, &xs, &());
    assert_eq!(DistGrid::head(&ys), 0.0);
    assert_eq!(DistGrid::last(&ys), 99.0 * 99.0);
}

#[test]
fn nested_proxy_vector_zips() {
    type DistVec = NestedFamily<ProxyFamily, VectorFamily>;
    fn ident(i: i64, _: &()) -> i64 {
        i
    }
    fn diff(a: &i64, b: &i64, _: &()) -> i64 {
        a - b
    }
    fn get(x: &i64, _: &()) -> i64 {
        *x
    }
    fn plus(a: i64, b: i64) -> i64 {
        a + b
    }
    let xs = DistVec::iota_map(ident, IRange::new(10), &());
    let ys = DistVec::iota_map(ident, IRange::new(10), &());
    let zs = DistVec::fmap2(diff, &xs, &ys, &());
    assert_eq!(DistVec::fold_map(get, plus, 0, &zs, &()), 0);
}

#[test]
fn task_failure_reaches_the_caller_future() {
    fn fails(_: ()) -> i64 {
        panic!("remote task failure");
    }
    let fut = rexec_async(0, fails, ());
    let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || fut.get()));
    assert!(err.is_err());
}
