//! Send and receive loops over one TCP stream.
//!
//! The intended communication pattern is a sequence of (header, payload)
//! frames, followed by a `Shutdown` header with zero length indicating the
//! end of the stream. If a stream fails mid-computation the loop returns an
//! error; the caller treats transport errors as fatal for the process.

use std::io::{BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::trace;

use crate::message::{MessageHeader, MessageKind};
use crate::queue::SendQueue;
use crate::MessageSink;

/// Repeatedly drains the send queue into the stream.
///
/// Frames arrive on the queue already encoded (header plus payload); the
/// loop writes them, flushes when the queue runs dry, and parks until new
/// frames or a close arrive. After a close it finishes the remaining
/// frames and writes the final shutdown frame.
pub fn send_loop(writer: TcpStream, queue: SendQueue, process: usize, remote: usize) -> Result<()> {
    let mut writer = BufWriter::with_capacity(1 << 16, writer);
    let mut stash = Vec::new();

    loop {
        queue.drain_into(&mut stash);

        if stash.is_empty() {
            // No frames queued. Flush buffered data so it becomes visible,
            // then either finish (closed) or park until pinged.
            writer.flush().context("flushing writer")?;
            if queue.is_closed() && queue.is_empty() {
                break;
            }
            queue.wait();
        } else {
            for frame in stash.drain(..) {
                trace!("process {}: sending {} bytes to {}", process, frame.len(), remote);
                writer.write_all(&frame[..]).context("writing frame")?;
            }
        }
    }

    // Write the final zero-length shutdown header.
    let header = MessageHeader { kind: MessageKind::Shutdown, source: process, seqno: 0, length: 0 };
    let mut buf = Vec::new();
    header.write_to(&mut buf)?;
    writer.write_all(&buf).context("writing shutdown frame")?;
    writer.flush().context("flushing writer")?;
    writer
        .get_mut()
        .shutdown(std::net::Shutdown::Write)
        .context("write shutdown failed")?;
    Ok(())
}

/// Repeatedly reads frames from the stream and hands them to the sink.
///
/// Returns once the clean shutdown frame has been observed; data after the
/// shutdown frame is an error.
pub fn recv_loop(
    mut reader: TcpStream,
    sink: Arc<dyn MessageSink>,
    process: usize,
    remote: usize,
) -> Result<()> {
    loop {
        let header = MessageHeader::read_from(&mut reader)
            .with_context(|| format!("reading header from process {}", remote))?;
        if header.kind == MessageKind::Shutdown {
            if header.length != 0 {
                bail!("shutdown frame with nonzero length");
            }
            let mut probe = [0u8; 1];
            if reader.read(&mut probe).context("probing stream end")? > 0 {
                bail!("clean shutdown followed by data");
            }
            return Ok(());
        }
        let mut payload = vec![0u8; header.length];
        reader
            .read_exact(&mut payload[..])
            .with_context(|| format!("reading {} payload bytes", header.length))?;
        trace!(
            "process {}: received {:?} ({} bytes) from {}",
            process,
            header.kind,
            header.length,
            remote
        );
        sink.deliver(header.kind, header.source, payload);
    }
}
