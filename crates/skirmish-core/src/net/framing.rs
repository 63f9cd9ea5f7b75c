//! Length-prefixed frame packing and incremental reassembly.
//!
//! Every frame is `i32 type | i32 length | payload`, both header fields
//! little-endian. A length of zero marks a header-only control frame. Reads
//! from the socket can split frames at arbitrary byte boundaries, so the
//! codec keeps undigested trailing bytes and re-prefixes them to the next
//! chunk. A header is never consumed until its full payload has arrived.

use tracing::warn;

use crate::net::messages::{MessageType, ProtocolError};

/// Fixed I/O buffer size. A packed frame must fit in one buffer.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Two little-endian `i32` fields: type, then payload length.
pub const HEADER_LEN: usize = 8;

/// Largest payload that still fits a buffer together with its header.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_SIZE - HEADER_LEN;

/// One complete frame lifted off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn is_control(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Pack a header-only control frame.
pub fn pack_control(message_type: MessageType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(&message_type.wire().to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf
}

/// Pack a payload-carrying frame. Fails if the result would overflow the
/// fixed send buffer.
pub fn pack_message(message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge(HEADER_LEN + payload.len()));
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&message_type.wire().to_le_bytes());
    buf.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Incremental frame reassembler. One instance per connection; never shared.
#[derive(Debug, Default)]
pub struct FrameCodec {
    carry: Vec<u8>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held over from previous feeds, still waiting for the rest of
    /// their frame.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Digest one chunk of received bytes, returning every frame completed
    /// by it. Trailing partial input is carried to the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut offset = 0;

        while self.carry.len() - offset >= HEADER_LEN {
            let head = &self.carry[offset..offset + HEADER_LEN];
            let raw_type = i32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            let raw_len = i32::from_le_bytes([head[4], head[5], head[6], head[7]]);

            if raw_len < 0 || raw_len as usize > MAX_PAYLOAD_LEN {
                return Err(ProtocolError::InvalidLength(i64::from(raw_len)));
            }
            let payload_len = raw_len as usize;

            // Header stays unconsumed until the whole payload is here.
            if self.carry.len() - offset < HEADER_LEN + payload_len {
                break;
            }

            let body = &self.carry[offset + HEADER_LEN..offset + HEADER_LEN + payload_len];
            match MessageType::from_wire(raw_type) {
                Some(message_type) => frames.push(Frame {
                    message_type,
                    payload: body.to_vec(),
                }),
                None => {
                    // Length is trustworthy even when the type is not, so
                    // the frame can be skipped without losing sync.
                    warn!(raw_type, payload_len, "skipping frame with unknown type");
                },
            }
            offset += HEADER_LEN + payload_len;
        }

        self.carry.drain(..offset);
        Ok(frames)
    }
}
