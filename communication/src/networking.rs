//! TCP mesh setup between processes.
//!
//! Process `p` connects to every process with a lower rank and accepts one
//! connection from every process with a higher rank, identifying itself
//! with a little-endian rank handshake. The result is one stream per
//! remote process, indexed by rank, with `None` at our own slot.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

/// Creates socket connections from a list of host addresses.
///
/// The resulting vector has one entry per process; entry `rank` is `None`
/// for the local process and `Some(stream)` otherwise.
pub fn create_sockets(
    addresses: Vec<String>,
    my_index: usize,
    noisy: bool,
) -> Result<Vec<Option<TcpStream>>> {
    let hosts1 = Arc::new(addresses);
    let hosts2 = Arc::clone(&hosts1);

    let start_task = thread::spawn(move || start_connections(hosts1, my_index, noisy));
    let await_task = thread::spawn(move || await_connections(hosts2, my_index, noisy));

    let mut results = start_task.join().expect("connect thread panicked")?;
    results.push(None);
    let to_extend = await_task.join().expect("accept thread panicked")?;
    results.extend(to_extend);

    if noisy {
        info!("process {}: mesh initialization complete", my_index);
    }

    Ok(results)
}

/// Result contains connections `[0, my_index - 1]`.
fn start_connections(
    addresses: Arc<Vec<String>>,
    my_index: usize,
    noisy: bool,
) -> Result<Vec<Option<TcpStream>>> {
    let mut results: Vec<_> = (0..my_index).map(|_| None).collect();
    for index in 0..my_index {
        loop {
            match TcpStream::connect(&addresses[index][..]) {
                Ok(mut stream) => {
                    stream.set_nodelay(true).context("set_nodelay call failed")?;
                    stream
                        .write_u32::<LittleEndian>(my_index as u32)
                        .context("sending process rank")?;
                    results[index] = Some(stream);
                    if noisy {
                        debug!("process {}: connection to process {}", my_index, index);
                    }
                    break;
                }
                Err(error) => {
                    warn!(
                        "process {}: error connecting to process {}: {}; retrying",
                        my_index, index, error
                    );
                    sleep(Duration::from_secs(1));
                }
            }
        }
    }

    Ok(results)
}

/// Result contains connections `[my_index + 1, addresses.len() - 1]`.
fn await_connections(
    addresses: Arc<Vec<String>>,
    my_index: usize,
    noisy: bool,
) -> Result<Vec<Option<TcpStream>>> {
    let mut results: Vec<_> = (0..(addresses.len() - my_index - 1)).map(|_| None).collect();
    let listener = TcpListener::bind(&addresses[my_index][..])
        .with_context(|| format!("binding {}", addresses[my_index]))?;

    for _ in (my_index + 1)..addresses.len() {
        let mut stream = listener.accept().context("accepting connection")?.0;
        stream.set_nodelay(true).context("set_nodelay call failed")?;
        let identifier =
            stream.read_u32::<LittleEndian>().context("reading process rank")? as usize;
        anyhow::ensure!(
            identifier > my_index && identifier < addresses.len(),
            "unexpected rank {} in handshake",
            identifier
        );
        results[identifier - my_index - 1] = Some(stream);
        if noisy {
            debug!("process {}: connection from process {}", my_index, identifier);
        }
    }

    Ok(results)
}
