//! Framing for byte messages exchanged between processes.
//!
//! Every transmission is a fixed-size header followed by `length` payload
//! bytes. A `Shutdown` header with zero length marks the clean end of a
//! stream.

use std::io::{Read, Write};

use anyhow::{bail, Context};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// What a frame carries. Task payloads go to the runtime's task intake;
/// barrier frames drive termination; `Shutdown` closes a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A serialized task to spawn on the receiving process.
    Task,
    /// The sending process has entered the termination barrier.
    BarrierEnter,
    /// The root releases the termination barrier.
    BarrierRelease,
    /// Clean end of stream; always has zero length.
    Shutdown,
}

impl MessageKind {
    fn to_u8(self) -> u8 {
        match self {
            MessageKind::Task => 0,
            MessageKind::BarrierEnter => 1,
            MessageKind::BarrierRelease => 2,
            MessageKind::Shutdown => 3,
        }
    }

    fn from_u8(x: u8) -> anyhow::Result<MessageKind> {
        Ok(match x {
            0 => MessageKind::Task,
            1 => MessageKind::BarrierEnter,
            2 => MessageKind::BarrierRelease,
            3 => MessageKind::Shutdown,
            other => bail!("unknown message kind {}", other),
        })
    }
}

/// Framing data for each transmission: kind, source process, sequence
/// number within the (source, destination) pair, and payload length.
#[derive(Copy, Clone, Debug)]
pub struct MessageHeader {
    /// Frame kind.
    pub kind: MessageKind,
    /// Rank of the sending process.
    pub source: usize,
    /// Per-pair sequence number.
    pub seqno: u64,
    /// Number of payload bytes following the header.
    pub length: usize,
}

/// Encoded size of a header on the wire.
pub const HEADER_BYTES: usize = 1 + 4 + 8 + 4;

impl MessageHeader {
    /// Writes the header in fixed little-endian layout.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_u8(self.kind.to_u8())?;
        writer.write_u32::<LittleEndian>(self.source as u32)?;
        writer.write_u64::<LittleEndian>(self.seqno)?;
        writer.write_u32::<LittleEndian>(self.length as u32)?;
        Ok(())
    }

    /// Reads a header from the stream, blocking until one is available.
    pub fn read_from<R: Read>(reader: &mut R) -> anyhow::Result<MessageHeader> {
        let kind = MessageKind::from_u8(reader.read_u8().context("reading frame kind")?)?;
        let source = reader.read_u32::<LittleEndian>()? as usize;
        let seqno = reader.read_u64::<LittleEndian>()?;
        let length = reader.read_u32::<LittleEndian>()? as usize;
        Ok(MessageHeader { kind, source, seqno, length })
    }
}

/// A frame ready for transmission: header already encoded in front of the
/// payload so the send loop issues a single write per frame.
pub fn encode_frame(header: &MessageHeader, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(header.length, payload.len());
    let mut buf = Vec::with_capacity(HEADER_BYTES + payload.len());
    header.write_to(&mut buf).expect("writes to Vec<u8> do not fail");
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = MessageHeader {
            kind: MessageKind::Task,
            source: 3,
            seqno: 17,
            length: 1234,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_BYTES);
        let decoded = MessageHeader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(decoded.kind, MessageKind::Task);
        assert_eq!(decoded.source, 3);
        assert_eq!(decoded.seqno, 17);
        assert_eq!(decoded.length, 1234);
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut buf = Vec::new();
        MessageHeader { kind: MessageKind::Shutdown, source: 0, seqno: 0, length: 0 }
            .write_to(&mut buf)
            .unwrap();
        buf[0] = 200;
        assert!(MessageHeader::read_from(&mut &buf[..]).is_err());
    }
}
