//! Worker-to-PU layout and thread pinning.
//!
//! Workers of the processes sharing a node divide its PUs contiguously:
//! worker `w` of local process `l` gets PU `l * threads + w`. Over- and
//! under-subscription are detected at startup. Pinning is a Linux
//! `sched_setaffinity` call; elsewhere it is a no-op and only the layout
//! diagnostic remains.

use funhpc_communication::{EnvConfig, Topology};
use log::{debug, warn};

/// Where this process's workers sit among the PUs of its node.
pub struct ThreadLayout {
    rank: usize,
    node: usize,
    local_rank: usize,
    threads: usize,
    pus: usize,
    bind: bool,
    unbind: bool,
    verbose: bool,
}

impl ThreadLayout {
    pub fn new(topology: Topology, threads: usize, env: &EnvConfig) -> ThreadLayout {
        let pus = num_cpus::get();
        let wanted = topology.local_size * threads;
        if wanted > pus {
            warn!(
                "process {}: oversubscribed: {} workers on this node for {} PUs",
                topology.rank, wanted, pus
            );
        } else if wanted < pus {
            debug!(
                "process {}: undersubscribed: {} workers on this node for {} PUs",
                topology.rank, wanted, pus
            );
        }
        ThreadLayout {
            rank: topology.rank,
            node: topology.node,
            local_rank: topology.local_rank,
            threads,
            pus,
            bind: env.set_thread_bindings,
            unbind: env.unset_thread_bindings,
            verbose: env.verbose,
        }
    }

    fn pu_for_worker(&self, worker: usize) -> usize {
        (self.local_rank * self.threads + worker) % self.pus
    }

    /// One diagnostic line per worker, in the startup banner format.
    pub fn diagnostic_line(&self, worker: usize) -> String {
        let pu = self.pu_for_worker(worker);
        format!(
            "FunHPC[{}]: N{} L{} P{} (S{}) T{} PU set L#{{{}}} P#{{{}}}",
            self.rank, self.node, self.local_rank, self.rank, worker, worker, pu, pu
        )
    }

    /// Pins the calling worker thread to its PU and reports the layout.
    /// With unbinding requested, the binding is undone after reporting;
    /// useful when an external load balancer takes over.
    pub fn apply_to_worker(&self, worker: usize) {
        let pu = self.pu_for_worker(worker);
        if self.bind {
            bind_current_thread(&[pu]);
        }
        if self.verbose {
            println!("{}", self.diagnostic_line(worker));
        }
        if self.unbind {
            bind_current_thread(&(0..self.pus).collect::<Vec<_>>());
        }
    }
}

#[cfg(target_os = "linux")]
fn bind_current_thread(pus: &[usize]) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &pu in pus {
            libc::CPU_SET(pu, &mut set);
        }
        // pid 0 binds the calling thread.
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            warn!("sched_setaffinity failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_current_thread(_pus: &[usize]) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvConfig {
        EnvConfig {
            num_nodes: None,
            num_procs: None,
            num_threads: None,
            set_thread_bindings: false,
            unset_thread_bindings: false,
            main_everywhere: false,
            verbose: false,
        }
    }

    #[test]
    fn diagnostic_line_format() {
        let layout = ThreadLayout::new(Topology::singleton(), 2, &env());
        let line = layout.diagnostic_line(1);
        assert!(line.starts_with("FunHPC[0]: N0 L0 P0 (S1) T1 PU set L#{"));
    }

    #[test]
    fn workers_spread_over_pus() {
        let mut topology = Topology::singleton();
        topology.local_rank = 1;
        topology.local_size = 2;
        let layout = ThreadLayout::new(topology, 2, &env());
        assert_eq!(layout.pu_for_worker(0), 2 % layout.pus);
        assert_eq!(layout.pu_for_worker(1), 3 % layout.pus);
    }
}
