//! Framed TCP transport: the network actor of spec §5.
//!
//! Grounded on the teacher's `server/protocol/ws.rs` read/write task
//! split (one task reading inbound frames into a channel, one task
//! draining an outbound channel onto the socket) but over a plain
//! `TcpStream` with this crate's own length-prefixed framing instead of
//! WebSocket frames, since spec §4.D calls for a framed TCP stream, not
//! WebSocket. A partial read of the length or payload preserves progress
//! in `buf` across socket readiness events (spec §4.D last paragraph).

use std::fmt;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::replication::record::Record;
use crate::replication::wire::{self, WireError};

const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "transport I/O failure: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Reads frames off `reader` until the connection closes or a framing
/// error occurs, forwarding decoded records to `inbound`. A known-tag
/// schema error drops just that record and keeps reading (spec §7
/// `ProtocolSchemaError`); a framing error or I/O failure closes the
/// connection (spec §7 `ProtocolFramingError` / `TransportIOFailure`).
pub async fn read_frames(mut reader: OwnedReadHalf, inbound: tokio::sync::mpsc::UnboundedSender<Record>) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                log::trace!("connection closed by peer");
                return;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                log::warn!("transport read failed: {}", TransportError::from(e));
                return;
            }
        }

        loop {
            match drain_one_frame(&buf) {
                FrameOutcome::NeedMoreBytes => break,
                FrameOutcome::Consumed { record, bytes } => {
                    buf.drain(..bytes);
                    if let Some(record) = record {
                        if inbound.send(record).is_err() {
                            log::trace!("inbound queue closed, stopping reader");
                            return;
                        }
                    }
                }
                FrameOutcome::SchemaDropped { bytes, reason } => {
                    log::warn!("dropping malformed record ({reason}), connection survives");
                    buf.drain(..bytes);
                }
                FrameOutcome::Framing(reason) => {
                    log::warn!("closing connection: framing error ({reason})");
                    return;
                }
            }
        }
    }
}

enum FrameOutcome {
    NeedMoreBytes,
    Consumed { record: Option<Record>, bytes: usize },
    SchemaDropped { bytes: usize, reason: String },
    Framing(String),
}

fn drain_one_frame(buf: &[u8]) -> FrameOutcome {
    if buf.len() < 4 {
        return FrameOutcome::NeedMoreBytes;
    }
    let len = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let payload_len = match wire::validate_length(len) {
        Ok(l) => l,
        Err(WireError::Framing(msg)) => return FrameOutcome::Framing(msg),
        Err(WireError::Schema(msg)) => return FrameOutcome::Framing(msg),
    };
    if buf.len() < 4 + payload_len {
        return FrameOutcome::NeedMoreBytes;
    }
    let payload = &buf[4..4 + payload_len];
    match wire::decode(payload) {
        Ok(record) => FrameOutcome::Consumed { record, bytes: 4 + payload_len },
        Err(WireError::Schema(msg)) => FrameOutcome::SchemaDropped { bytes: 4 + payload_len, reason: msg },
        Err(WireError::Framing(msg)) => FrameOutcome::Framing(msg),
    }
}

/// Drains `outbound` onto `writer` in emission order (spec §5 ordering
/// guarantee: "outbound messages for one client are delivered in emission
/// order"). Returns once the channel closes or a write fails.
pub async fn write_frames(mut writer: OwnedWriteHalf, mut outbound: UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            log::warn!("transport write failed: {}", TransportError::from(e));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::record::Record;

    #[test]
    fn drain_one_frame_waits_for_full_length_prefix() {
        let frame = wire::encode(&Record::ObjectRemoval { id: 1 });
        assert!(matches!(drain_one_frame(&frame[..2]), FrameOutcome::NeedMoreBytes));
    }

    #[test]
    fn drain_one_frame_waits_for_full_payload() {
        let frame = wire::encode(&Record::ObjectRemoval { id: 1 });
        assert!(matches!(drain_one_frame(&frame[..frame.len() - 1]), FrameOutcome::NeedMoreBytes));
    }

    #[test]
    fn drain_one_frame_consumes_exactly_one_complete_frame() {
        let frame = wire::encode(&Record::ObjectRemoval { id: 1 });
        match drain_one_frame(&frame) {
            FrameOutcome::Consumed { record: Some(Record::ObjectRemoval { id }), bytes } => {
                assert_eq!(id, 1);
                assert_eq!(bytes, frame.len());
            }
            _ => panic!("expected a consumed ObjectRemoval frame"),
        }
    }

    #[test]
    fn zero_length_prefix_is_a_framing_error() {
        let frame: [u8; 4] = [0, 0, 0, 0];
        assert!(matches!(drain_one_frame(&frame), FrameOutcome::Framing(_)));
    }
}
