//! Runtime construction, the event pump, and the user-main entry point.
//!
//! There is exactly one piece of global state: the [`Runtime`], holding
//! the scheduler, the communication layer, the pending-reply table, and
//! the outstanding-work counter. [`execute`] builds it from command-line
//! and `FUNHPC_*` configuration, runs the user main as a task on the
//! designated process (or on all of them), and pumps until the
//! termination barrier completes everywhere.
//!
//! A process enters the barrier only once its share of the user main has
//! returned, no detached tasks are pending locally, and its send queues
//! have drained; tasks that arrive afterwards are still executed, because
//! the pump keeps running until the barrier releases.
//!
//! Library and test use without [`execute`] gets a lazily initialized
//! single-process runtime: remote executions degrade to local spawns and
//! the barrier completes trivially.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use funhpc_communication::{self as communication, Comm, Configuration, EnvConfig, TaskSink, Topology};
use log::{debug, info};

use crate::remote::exec::ReplyTable;
use crate::remote::task::Task;
use crate::sched::affinity::ThreadLayout;
use crate::sched::future::catch;
use crate::sched::{Runnable, Scheduler};

pub struct Runtime {
    scheduler: Scheduler,
    comm: OnceLock<Comm>,
    outstanding: AtomicIsize,
    replies: ReplyTable,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    fn new(scheduler: Scheduler) -> Runtime {
        Runtime {
            scheduler,
            comm: OnceLock::new(),
            outstanding: AtomicIsize::new(0),
            replies: ReplyTable::new(),
        }
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The communication layer. Receive threads may race runtime
    /// construction by a hair; spin until the handle is published.
    pub(crate) fn comm(&self) -> &Comm {
        loop {
            if let Some(comm) = self.comm.get() {
                return comm;
            }
            std::thread::yield_now();
        }
    }

    pub(crate) fn replies(&self) -> &ReplyTable {
        &self.replies
    }

    pub(crate) fn rank(&self) -> usize {
        self.comm().rank()
    }

    /// Runs a detached task that the termination barrier waits for.
    pub(crate) fn spawn_counted(&self, task: Runnable) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.scheduler.execute(Box::new(move || {
            if let Err(message) = catch(task) {
                log::error!("detached task failed: {}", message);
            }
            runtime().outstanding.fetch_sub(1, Ordering::SeqCst);
        }));
    }
}

/// Task intake from the transport: every arriving task runs as a counted
/// detached fiber; deserialization happens on that fiber, not on the
/// receive thread.
struct RuntimeSink;

impl TaskSink for RuntimeSink {
    fn deliver(&self, source: usize, payload: Vec<u8>) {
        debug!("task of {} bytes from process {}", payload.len(), source);
        runtime().spawn_counted(Box::new(move || Task::decode(&payload).run()));
    }
}

pub(crate) fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        // A few extra workers beyond the PU count: without fiber
        // suspension, blocking waits inside tasks need spare threads to
        // keep chained work progressing.
        let rt = Runtime::new(Scheduler::new(num_cpus::get().max(4), None));
        let comm = communication::initialize(&Configuration::singleton(), Arc::new(RuntimeSink))
            .expect("single-process communication cannot fail");
        rt.comm.set(comm).ok().expect("fresh runtime");
        rt
    })
}

/// Rank of this process.
pub fn rank() -> usize {
    runtime().comm().rank()
}

/// Number of processes in the job.
pub fn size() -> usize {
    runtime().comm().size()
}

/// Blocks until all locally pending detached work has drained and all
/// queued sends have left.
pub fn quiesce() {
    let rt = runtime();
    loop {
        if rt.outstanding.load(Ordering::SeqCst) == 0 && rt.comm().sends_drained() {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn fatal(message: &str) -> ! {
    eprintln!("FunHPC: {}", message);
    std::process::exit(1);
}

/// Parses the transport arguments and runs `user_main` under the
/// runtime; every argument the transport did not consume is passed
/// through. Returns the program's exit code: the value returned by
/// `user_main` on the root process, 0 elsewhere.
pub fn execute(user_main: fn(Vec<String>) -> i32) -> i32 {
    match Configuration::from_args(std::env::args().skip(1)) {
        Ok((config, rest)) => execute_with(config, rest, user_main),
        Err(message) => fatal(&message),
    }
}

/// [`execute`] with an explicit configuration.
pub fn execute_with(
    config: Configuration,
    args: Vec<String>,
    user_main: fn(Vec<String>) -> i32,
) -> i32 {
    let env = EnvConfig::from_env();

    let topology = if config.processes <= 1 {
        Topology::singleton()
    } else {
        Topology::from_addresses(config.process, &config.addresses)
    };
    if let Err(message) = topology.check(&env) {
        fatal(&message);
    }

    let threads = match (config.threads, env.num_threads) {
        (Some(flag), Some(expected)) if flag != expected => {
            fatal(&format!("-w {} but FUNHPC_NUM_THREADS={}", flag, expected))
        }
        (Some(flag), _) => flag,
        (None, Some(expected)) => expected,
        (None, None) => (num_cpus::get() / topology.local_size.max(1)).max(1),
    };

    let layout = Arc::new(ThreadLayout::new(topology, threads, &env));
    if RUNTIME.set(Runtime::new(Scheduler::new(threads, Some(layout)))).is_err() {
        fatal("runtime already initialized");
    }
    let comm = match communication::initialize(&config, Arc::new(RuntimeSink)) {
        Ok(comm) => comm,
        Err(err) => fatal(&format!("communication setup failed: {:#}", err)),
    };
    runtime().comm.set(comm).ok().expect("fresh runtime");

    let rt = runtime();
    let comm = rt.comm();
    if comm.rank() == 0 {
        println!(
            "FunHPC: {} processes, {} local processes, {} threads",
            comm.size(),
            topology.local_size,
            threads
        );
        println!("FunHPC: begin");
    }
    let start = Instant::now();

    let run_main_here = env.main_everywhere || comm.rank() == 0;
    let fres = run_main_here.then(|| crate::sched::spawn(move || user_main(args)));

    // The pump: enter the barrier once this process is quiescent, keep
    // executing arriving tasks until the barrier releases everywhere.
    loop {
        if !comm.has_entered_barrier() {
            let main_done = fres.as_ref().map_or(true, |f| f.ready());
            if main_done
                && rt.outstanding.load(Ordering::SeqCst) == 0
                && comm.sends_drained()
            {
                comm.enter_barrier();
            }
        }
        if comm.barrier_done() && rt.outstanding.load(Ordering::SeqCst) == 0 {
            break;
        }
        std::thread::sleep(Duration::from_micros(200));
    }
    comm.shutdown();

    let result = fres.map_or(0, |f| f.get());
    if comm.rank() == 0 {
        println!(
            "FunHPC: end; total execution time: {:.6} sec",
            start.elapsed().as_secs_f64()
        );
    }
    info!("process {} exiting with {}", comm.rank(), if comm.rank() == 0 { result } else { 0 });
    if comm.rank() == 0 {
        result
    } else {
        0
    }
}
