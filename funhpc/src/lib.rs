//! Distributed, asynchronous, data-parallel computation in a functional
//! style.
//!
//! A job is a set of processes connected by the
//! [`funhpc-communication`](funhpc_communication) mesh, each running many
//! lightweight tasks on a pool of pinned worker threads. Data lives in
//! immutable containers sharing one operation vocabulary
//! ([`container`]): build with `iota_map`, transform with `fmap` and the
//! grid stencil, reduce with `fold_map`. Containers whose outer shape is
//! a [`remote::Proxy`] place their data on other processes; operations on
//! them become tasks dispatched to wherever the data is, and their
//! results become futures the consumer's chain observes.
//!
//! The entry point is [`execute`]: it initializes the runtime, runs the
//! user main on the root process (or everywhere, with
//! `FUNHPC_MAIN_EVERYWHERE`), and shuts the job down through a
//! distributed termination barrier.
//!
//! ```no_run
//! fn funhpc_main(_args: Vec<String>) -> i32 {
//!     use funhpc::container::{Foldable, IotaMap};
//!     use funhpc::grid::GridFamily;
//!     use funhpc::container::vector::VectorFamily;
//!
//!     fn square(i: i64, _: &()) -> f64 {
//!         (i * i) as f64
//!     }
//!     fn get(x: &f64, _: &()) -> f64 {
//!         *x
//!     }
//!     fn plus(a: f64, b: f64) -> f64 {
//!         a + b
//!     }
//!
//!     type G = GridFamily<VectorFamily, 1>;
//!     let xs = G::iota_map(square, funhpc::IRange::new(100), &());
//!     println!("{}", G::fold_map(get, plus, 0.0, &xs, &()));
//!     0
//! }
//!
//! fn main() {
//!     std::process::exit(funhpc::execute(funhpc_main));
//! }
//! ```

pub mod container;
pub mod execute;
pub mod grid;
pub mod index;
pub mod remote;
pub mod sched;

pub use execute::{execute, execute_with, quiesce, rank, size};
pub use index::{IRange, Index, Range, Space, StepRange};
pub use sched::future::{Future, Promise, SharedFuture};
pub use sched::{spawn, spawn_detached, yield_now};
