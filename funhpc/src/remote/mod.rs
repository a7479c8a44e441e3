//! Remote execution and distributed pointers.

pub mod exec;
pub mod proxy;
pub mod rptr;
pub mod shared_rptr;
pub mod task;

pub use exec::{rexec, rexec_async, rexec_sync};
pub use proxy::{local_call, make_local_proxy, make_remote_proxy, remote_call, unwrap, Proxy, ProxyFamily};
pub use rptr::Rptr;
pub use shared_rptr::{make_local_shared, Packed, SharedRptr};
pub use task::{RawFn, Task};
