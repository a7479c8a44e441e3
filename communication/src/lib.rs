//! Process mesh and task transport for the FunHPC runtime.
//!
//! One process per rank, connected by a full TCP mesh. Tasks are
//! serialized byte strings sent point-to-point with a framed header; each
//! (source, destination) pair is a FIFO channel. The crate also carries
//! the process topology, the `FUNHPC_*` configuration surface, and the
//! distributed termination barrier.
//!
//! The runtime hands [`initialize`] a [`TaskSink`]; every arriving task
//! payload is delivered to it from the receive thread of the originating
//! peer. Sending is asynchronous: [`Comm::send_task`] appends to a
//! per-peer queue with an O(1) critical section and a dedicated send
//! thread drains it, so enqueue never blocks on the network in the good
//! case.
//!
//! With a single process the mesh is bypassed entirely: there are no
//! sockets, no threads, and the termination barrier completes locally.

pub mod barrier;
pub mod config;
pub mod message;
pub mod networking;
pub mod queue;
pub mod tcp;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::Result;
use log::{debug, error};

use barrier::TerminationBarrier;
pub use config::{Configuration, EnvConfig, Topology};
use message::{encode_frame, MessageHeader, MessageKind};
use queue::SendQueue;

/// Receives raw frames from the per-peer receive loops.
pub trait MessageSink: Send + Sync + 'static {
    fn deliver(&self, kind: MessageKind, source: usize, payload: Vec<u8>);
}

/// Receives task payloads. Implemented by the runtime; called from
/// receive threads, so implementations must hand the work to a scheduler
/// rather than run it in place.
pub trait TaskSink: Send + Sync + 'static {
    fn deliver(&self, source: usize, payload: Vec<u8>);
}

const ROOT: usize = 0;

struct CommState {
    topology: Topology,
    peers: Vec<Option<SendQueue>>,
    barrier: TerminationBarrier,
    seqnos: Vec<AtomicU64>,
}

impl CommState {
    fn send_frame(&self, dest: usize, kind: MessageKind, payload: &[u8]) {
        let queue = self.peers[dest]
            .as_ref()
            .unwrap_or_else(|| panic!("no channel to process {}", dest));
        let header = MessageHeader {
            kind,
            source: self.topology.rank,
            seqno: self.seqnos[dest].fetch_add(1, Ordering::Relaxed),
            length: payload.len(),
        };
        queue.push(encode_frame(&header, payload));
    }

    /// Handles a barrier entry (local or remote) on the root: counts it,
    /// and once everyone has entered broadcasts the release.
    fn root_observe_enter(&self) {
        assert_eq!(self.topology.rank, ROOT);
        if self.barrier.observe_enter() {
            for dest in 0..self.topology.size {
                if dest != self.topology.rank {
                    self.send_frame(dest, MessageKind::BarrierRelease, &[]);
                }
            }
            self.barrier.observe_release();
        }
    }
}

struct Router {
    state: Arc<CommState>,
    tasks: Arc<dyn TaskSink>,
}

impl MessageSink for Router {
    fn deliver(&self, kind: MessageKind, source: usize, payload: Vec<u8>) {
        match kind {
            MessageKind::Task => self.tasks.deliver(source, payload),
            MessageKind::BarrierEnter => {
                debug!("barrier entry from process {}", source);
                self.state.root_observe_enter();
            }
            MessageKind::BarrierRelease => self.state.barrier.observe_release(),
            MessageKind::Shutdown => unreachable!("shutdown frames end the recv loop"),
        }
    }
}

/// Handle to the communication layer held by the runtime.
pub struct Comm {
    state: Arc<CommState>,
    guards: Mutex<Vec<JoinHandle<()>>>,
}

impl Comm {
    pub fn rank(&self) -> usize {
        self.state.topology.rank
    }

    pub fn size(&self) -> usize {
        self.state.topology.size
    }

    pub fn topology(&self) -> Topology {
        self.state.topology
    }

    /// Enqueues a serialized task for `dest`. The destination must be a
    /// different process; local execution bypasses the transport.
    pub fn send_task(&self, dest: usize, payload: Vec<u8>) {
        assert_ne!(dest, self.rank(), "local tasks do not cross the transport");
        self.state.send_frame(dest, MessageKind::Task, &payload);
    }

    /// Enters the termination barrier; idempotent.
    pub fn enter_barrier(&self) {
        if self.state.barrier.enter_local() {
            debug!("process {} entering termination barrier", self.rank());
            if self.rank() == ROOT {
                self.state.root_observe_enter();
            } else {
                self.state.send_frame(ROOT, MessageKind::BarrierEnter, &[]);
            }
        }
    }

    pub fn has_entered_barrier(&self) -> bool {
        self.state.barrier.has_entered()
    }

    /// True once every process has entered the barrier and the release has
    /// reached this process.
    pub fn barrier_done(&self) -> bool {
        self.state.barrier.is_released()
    }

    /// True when every send queue has been drained by its send thread.
    pub fn sends_drained(&self) -> bool {
        self.state
            .peers
            .iter()
            .flatten()
            .all(|queue| queue.is_empty())
    }

    /// Flushes and closes all streams and joins the transport threads.
    /// Called after the termination barrier has completed.
    pub fn shutdown(&self) {
        for queue in self.state.peers.iter().flatten() {
            queue.close();
        }
        let mut guards = self.guards.lock().expect("comm guards poisoned");
        for guard in guards.drain(..) {
            guard.join().expect("transport thread panicked");
        }
    }
}

/// Builds the communication layer described by `config` and starts its
/// transport threads. Task payloads arriving from peers are delivered to
/// `tasks`.
pub fn initialize(config: &Configuration, tasks: Arc<dyn TaskSink>) -> Result<Comm> {
    if config.processes <= 1 {
        let state = Arc::new(CommState {
            topology: Topology::singleton(),
            peers: Vec::new(),
            barrier: TerminationBarrier::new(1),
            seqnos: Vec::new(),
        });
        return Ok(Comm { state, guards: Mutex::new(Vec::new()) });
    }

    let topology = Topology::from_addresses(config.process, &config.addresses);
    let sockets =
        networking::create_sockets(config.addresses.clone(), config.process, config.report)?;

    let peers: Vec<Option<SendQueue>> = sockets
        .iter()
        .map(|socket| socket.as_ref().map(|_| SendQueue::new()))
        .collect();
    let seqnos = (0..topology.size).map(|_| AtomicU64::new(0)).collect();

    let state = Arc::new(CommState {
        topology,
        peers,
        barrier: TerminationBarrier::new(topology.size),
        seqnos,
    });

    let router: Arc<dyn MessageSink> = Arc::new(Router { state: Arc::clone(&state), tasks });

    let mut guards = Vec::new();
    for (remote, socket) in sockets.into_iter().enumerate() {
        let Some(socket) = socket else { continue };
        let rank = topology.rank;

        let reader = socket.try_clone()?;
        let sink = Arc::clone(&router);
        guards.push(
            std::thread::Builder::new()
                .name(format!("funhpc recv {}", remote))
                .spawn(move || {
                    if let Err(err) = tcp::recv_loop(reader, sink, rank, remote) {
                        fatal_transport_error(rank, remote, &err);
                    }
                })?,
        );

        let queue = state.peers[remote].clone().expect("queue for connected peer");
        guards.push(
            std::thread::Builder::new()
                .name(format!("funhpc send {}", remote))
                .spawn(move || {
                    if let Err(err) = tcp::send_loop(socket, queue, rank, remote) {
                        fatal_transport_error(rank, remote, &err);
                    }
                })?,
        );
    }

    Ok(Comm { state, guards: Mutex::new(guards) })
}

/// Transport errors are fatal for the process: report and terminate. The
/// rest of the job observes the broken streams and follows.
fn fatal_transport_error(rank: usize, remote: usize, err: &anyhow::Error) -> ! {
    error!("process {}: transport error with process {}: {:#}", rank, remote, err);
    eprintln!("FunHPC[{}]: transport error with process {}: {:#}", rank, remote, err);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_barrier_completes() {
        let _ = env_logger::builder().is_test(true).try_init();
        struct NullSink;
        impl TaskSink for NullSink {
            fn deliver(&self, _source: usize, _payload: Vec<u8>) {}
        }
        let comm = initialize(&Configuration::singleton(), Arc::new(NullSink)).unwrap();
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert!(!comm.barrier_done());
        comm.enter_barrier();
        assert!(comm.barrier_done());
        assert!(comm.sends_drained());
        comm.shutdown();
    }
}
