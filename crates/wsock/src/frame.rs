//! WebSocket frames as defined in [RFC 6455 section 5.2].
//!
//! A [`Frame`] is the unit exchanged with the codec: FIN flag, opcode and
//! payload. Masking is a property of the endpoint role, not of the frame, so
//! the codec applies it — see [`crate::codec`].
//!
//! [RFC 6455 section 5.2]: https://datatracker.ietf.org/doc/html/rfc6455#section-5.2

use bytes::Bytes;

use crate::WebSocketError;

/// FIN bit in the first header byte.
pub const FIN: u8 = 0x80;
/// MASK bit in the length byte.
pub const MASK: u8 = 0x80;

/// Frame type identifier (4 bits of the first header byte).
///
/// Data frames carry application payload; control frames (`Close`, `Ping`,
/// `Pong`) manage the connection, must not be fragmented and are limited to
/// 125 payload bytes. The ranges 0x3-0x7 and 0xB-0xF are reserved and
/// rejected on receive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    /// Continues a fragmented message (0x0).
    Continuation,
    /// UTF-8 text payload (0x1).
    Text,
    /// Raw binary payload (0x2).
    Binary,
    /// Connection closure (0x8).
    Close,
    /// Liveness probe (0x9).
    Ping,
    /// Probe response (0xA).
    Pong,
}

impl OpCode {
    /// Returns `true` for `Close`, `Ping` and `Pong`.
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WebSocketError::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// A single WebSocket frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Final fragment flag; only the last frame of a message sets it.
    pub(crate) fin: bool,
    /// Frame type.
    pub(crate) opcode: OpCode,
    /// Payload, unmasked.
    pub(crate) payload: Bytes,
}

/// Worst-case header length: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub(crate) const MAX_HEAD_SIZE: usize = 14;

impl Frame {
    pub(crate) fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    /// Creates a final text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    /// Creates a final binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    /// Creates a ping frame.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    /// Creates a pong frame.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// Creates a close frame; a nonzero `code` becomes a 2-byte big-endian
    /// payload, zero an empty one.
    pub fn close(code: u16) -> Self {
        let payload = if code != 0 {
            Bytes::copy_from_slice(&code.to_be_bytes())
        } else {
            Bytes::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Frame type.
    #[inline(always)]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Whether this frame completes a message.
    #[inline(always)]
    pub fn is_fin(&self) -> bool {
        self.fin
    }

    /// Unmasked payload.
    #[inline(always)]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Close code carried by a CLOSE frame: the first two payload bytes
    /// big-endian, or zero when absent.
    pub(crate) fn close_code(&self) -> u16 {
        match self.payload.get(0..2) {
            Some(bytes) => u16::from_be_bytes(bytes.try_into().unwrap()),
            None => 0,
        }
    }

    /// Splits this frame into wire fragments of at most `partition` payload
    /// bytes. The first fragment keeps the opcode, the rest are
    /// continuations, and only the last carries FIN.
    pub(crate) fn into_fragments(self, partition: usize) -> impl Iterator<Item = Frame> {
        struct Split {
            first: bool,
            partition: usize,
            frame: Option<Frame>,
        }

        impl Iterator for Split {
            type Item = Frame;

            fn next(&mut self) -> Option<Self::Item> {
                let mut frame = self.frame.take()?;
                let opcode = if self.first {
                    frame.opcode
                } else {
                    OpCode::Continuation
                };
                self.first = false;
                if frame.payload.len() <= self.partition {
                    frame.fin = true;
                    frame.opcode = opcode;
                    Some(frame)
                } else {
                    let chunk = frame.payload.split_to(self.partition);
                    self.frame = Some(frame);
                    Some(Frame::new(false, opcode, chunk))
                }
            }
        }

        Split {
            first: true,
            partition: partition.max(1),
            frame: Some(self),
        }
    }
}
