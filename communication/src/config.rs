//! Transport and runtime configuration.
//!
//! The transport owns a small getopts surface (`-w/-p/-n/-h/-r`); every
//! remaining argument is passed through to the user main. Runtime
//! expectations arrive through `FUNHPC_*` environment variables and are
//! checked against the detected layout at startup; a mismatch is fatal.

use std::env;

/// Possible configurations for the communication infrastructure.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Worker threads per process; `None` means derive from the machine.
    pub threads: Option<usize>,
    /// Rank of this process.
    pub process: usize,
    /// Total number of processes.
    pub processes: usize,
    /// One `host:port` per process. Empty for a single process.
    pub addresses: Vec<String>,
    /// Report connection progress.
    pub report: bool,
}

impl Configuration {
    /// A single-process configuration.
    pub fn singleton() -> Configuration {
        Configuration { threads: None, process: 0, processes: 1, addresses: Vec::new(), report: false }
    }

    /// Constructs a configuration by parsing supplied text arguments.
    ///
    /// Returns the configuration together with the arguments the transport
    /// did not consume, in order.
    #[cfg(feature = "getopts")]
    pub fn from_args<I: Iterator<Item = String>>(
        args: I,
    ) -> Result<(Configuration, Vec<String>), String> {
        let mut opts = getopts::Options::new();
        opts.optopt("w", "threads", "number of per-process worker threads", "NUM");
        opts.optopt("p", "process", "identity of this process", "IDX");
        opts.optopt("n", "processes", "number of processes", "NUM");
        opts.optopt("h", "hostfile", "text file whose lines are process addresses", "FILE");
        opts.optflag("r", "report", "reports connection progress");

        let matches = opts.parse(args).map_err(|e| format!("{:?}", e))?;

        let threads = match matches.opt_str("w") {
            Some(x) => Some(x.parse::<usize>().map_err(|e| format!("-w: {}", e))?),
            None => None,
        };
        let process = matches
            .opt_str("p")
            .map(|x| x.parse().unwrap_or(0))
            .unwrap_or(0);
        let processes = matches
            .opt_str("n")
            .map(|x| x.parse().unwrap_or(1))
            .unwrap_or(1);

        if process >= processes {
            return Err(format!("-p {} out of range for -n {}", process, processes));
        }

        let mut addresses = Vec::new();
        if processes > 1 {
            if let Some(hosts) = matches.opt_str("h") {
                use std::io::BufRead;
                let file = std::fs::File::open(&hosts)
                    .map_err(|e| format!("cannot open hostfile {}: {}", hosts, e))?;
                for line in std::io::BufReader::new(file).lines().take(processes) {
                    addresses.push(line.map_err(|e| format!("{}", e))?);
                }
                if addresses.len() < processes {
                    return Err(format!(
                        "could only read {} addresses from {}, but -n: {}",
                        addresses.len(),
                        hosts,
                        processes
                    ));
                }
            } else {
                for index in 0..processes {
                    addresses.push(format!("localhost:{}", 2101 + index));
                }
            }
        }

        let config = Configuration {
            threads,
            process,
            processes,
            addresses,
            report: matches.opt_present("r"),
        };
        Ok((config, matches.free))
    }
}

/// Runtime expectations and switches read from the environment.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// `FUNHPC_NUM_NODES`: expected number of nodes.
    pub num_nodes: Option<usize>,
    /// `FUNHPC_NUM_PROCS`: expected number of processes.
    pub num_procs: Option<usize>,
    /// `FUNHPC_NUM_THREADS`: expected worker threads per process.
    pub num_threads: Option<usize>,
    /// `FUNHPC_SET_THREAD_BINDINGS` (default on): pin workers to PUs.
    pub set_thread_bindings: bool,
    /// `FUNHPC_UNSET_THREAD_BINDINGS`: undo bindings after reporting them.
    pub unset_thread_bindings: bool,
    /// `FUNHPC_MAIN_EVERYWHERE`: run the user main on every process.
    pub main_everywhere: bool,
    /// `FUNHPC_VERBOSE`: emit the thread-layout diagnostic.
    pub verbose: bool,
}

fn env_count(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|x| x.parse().ok())
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => value != "0",
        Err(_) => default,
    }
}

impl EnvConfig {
    pub fn from_env() -> EnvConfig {
        EnvConfig {
            num_nodes: env_count("FUNHPC_NUM_NODES"),
            num_procs: env_count("FUNHPC_NUM_PROCS"),
            num_threads: env_count("FUNHPC_NUM_THREADS"),
            set_thread_bindings: env_flag("FUNHPC_SET_THREAD_BINDINGS", true),
            unset_thread_bindings: env_flag("FUNHPC_UNSET_THREAD_BINDINGS", false),
            main_everywhere: env_flag("FUNHPC_MAIN_EVERYWHERE", false),
            verbose: env_flag("FUNHPC_VERBOSE", false),
        }
    }
}

/// Where this process sits: rank among all processes, node among all
/// nodes, and position among the processes sharing its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Topology {
    pub rank: usize,
    pub size: usize,
    pub node: usize,
    pub num_nodes: usize,
    pub local_rank: usize,
    pub local_size: usize,
}

impl Topology {
    /// A single-process topology.
    pub fn singleton() -> Topology {
        Topology { rank: 0, size: 1, node: 0, num_nodes: 1, local_rank: 0, local_size: 1 }
    }

    /// Derives node layout from the per-process addresses: processes with
    /// the same host live on the same node, nodes numbered in order of
    /// first appearance.
    pub fn from_addresses(rank: usize, addresses: &[String]) -> Topology {
        assert!(rank < addresses.len());
        let host = |addr: &str| addr.split(':').next().unwrap_or(addr).to_owned();
        let mut hosts: Vec<String> = Vec::new();
        let mut node_of = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let h = host(addr);
            let node = match hosts.iter().position(|x| *x == h) {
                Some(n) => n,
                None => {
                    hosts.push(h);
                    hosts.len() - 1
                }
            };
            node_of.push(node);
        }
        let node = node_of[rank];
        let local_rank = node_of[..rank].iter().filter(|&&n| n == node).count();
        let local_size = node_of.iter().filter(|&&n| n == node).count();
        Topology {
            rank,
            size: addresses.len(),
            node,
            num_nodes: hosts.len(),
            local_rank,
            local_size,
        }
    }

    /// Checks the detected layout against the `FUNHPC_*` expectations.
    pub fn check(&self, env: &EnvConfig) -> Result<(), String> {
        if let Some(procs) = env.num_procs {
            if procs != self.size {
                return Err(format!(
                    "FUNHPC_NUM_PROCS={} but {} processes detected",
                    procs, self.size
                ));
            }
        }
        if let Some(nodes) = env.num_nodes {
            if nodes != self.num_nodes {
                return Err(format!(
                    "FUNHPC_NUM_NODES={} but {} nodes detected",
                    nodes, self.num_nodes
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_from_addresses() {
        let addresses: Vec<String> = [
            "alpha:2101",
            "alpha:2102",
            "beta:2101",
            "beta:2102",
            "alpha:2103",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let t = Topology::from_addresses(4, &addresses);
        assert_eq!(t.size, 5);
        assert_eq!(t.num_nodes, 2);
        assert_eq!(t.node, 0);
        assert_eq!(t.local_rank, 2);
        assert_eq!(t.local_size, 3);
    }

    #[test]
    fn mismatched_expectation_is_an_error() {
        let t = Topology::singleton();
        let mut env = EnvConfig {
            num_nodes: None,
            num_procs: Some(4),
            num_threads: None,
            set_thread_bindings: true,
            unset_thread_bindings: false,
            main_everywhere: false,
            verbose: false,
        };
        assert!(t.check(&env).is_err());
        env.num_procs = Some(1);
        assert!(t.check(&env).is_ok());
    }

    #[cfg(feature = "getopts")]
    #[test]
    fn passthrough_args_survive() {
        let args = ["-n", "1", "--", "solver", "--steps", "10"]
            .iter()
            .map(|s| s.to_string());
        let (config, rest) = Configuration::from_args(args).unwrap();
        assert_eq!(config.processes, 1);
        assert_eq!(rest, vec!["solver", "--steps", "10"]);
    }
}
