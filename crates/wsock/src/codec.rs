//! Frame encoding and decoding on top of the `tokio_util` codec traits.
//!
//! The [`Decoder`] consumes bytes from a sliding [`BytesMut`] window and
//! tolerates partial reads: an incomplete header leaves the cursor untouched,
//! a complete header is latched until the payload is buffered. The
//! [`Encoder`] serializes frames, masking the output with a fresh random key
//! when the endpoint plays the client role.
//!
//! Violations detected here, per the close-code taxonomy:
//!
//! - role/mask mismatch, fragmented control frame, unknown opcode
//!   (nonzero RSV bits included) — protocol (1002)
//! - empty TEXT/BLOB frame, control payload above 125 bytes, declared length
//!   beyond the message cap — oversized (1009)

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec;

use crate::{
    Role, WebSocketError, mask,
    frame::{FIN, Frame, MASK, MAX_HEAD_SIZE, OpCode},
};

/// Header parsed from the wire, latched while its payload is buffered.
struct Header {
    fin: bool,
    opcode: OpCode,
    key: Option<[u8; 4]>,
    payload_len: usize,
}

/// Streaming frame decoder for one endpoint role.
pub struct Decoder {
    role: Role,
    pending: Option<Header>,
    /// Upper bound on a declared frame length; a frame above it can never
    /// assemble into a legal message.
    max_message_size: usize,
}

impl Decoder {
    pub fn new(role: Role, max_message_size: usize) -> Self {
        Self {
            role,
            pending: None,
            max_message_size,
        }
    }

    fn parse_header(&self, src: &mut BytesMut) -> Result<Option<Header>, WebSocketError> {
        if src.remaining() < 2 {
            return Ok(None);
        }

        let fin = src[0] & FIN != 0;
        // Nonzero RSV bits fold into the opcode check: the low seven bits of
        // the first byte only name a valid opcode when RSV1-3 are clear.
        let opcode = OpCode::try_from(src[0] & 0x7f)?;
        let masked = src[1] & MASK != 0;
        let length_code = src[1] & 0x7f;

        match self.role {
            Role::Client if masked => return Err(WebSocketError::MaskedFrame),
            Role::Server if !masked => return Err(WebSocketError::UnmaskedFrame),
            _ => {}
        }
        if opcode.is_control() && !fin {
            return Err(WebSocketError::FragmentedControlFrame);
        }

        let extra = match length_code {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_size = 2 + extra + masked as usize * 4;
        if src.remaining() < header_size {
            return Ok(None);
        }

        src.advance(2);
        let payload_len = match extra {
            0 => usize::from(length_code),
            2 => src.get_u16() as usize,
            _ => match usize::try_from(src.get_u64()) {
                Ok(len) => len,
                Err(_) => return Err(WebSocketError::MessageTooLarge),
            },
        };
        let key = masked.then(|| src.get_u32().to_be_bytes());

        if matches!(opcode, OpCode::Text | OpCode::Binary) && payload_len == 0 {
            return Err(WebSocketError::EmptyDataFrame);
        }
        if opcode.is_control() && payload_len > 125 {
            return Err(WebSocketError::ControlFrameTooLarge);
        }
        if payload_len > self.max_message_size {
            return Err(WebSocketError::MessageTooLarge);
        }

        Ok(Some(Header {
            fin,
            opcode,
            key,
            payload_len,
        }))
    }
}

impl codec::Decoder for Decoder {
    type Item = Frame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => match self.parse_header(src)? {
                Some(header) => header,
                None => return Ok(None),
            },
        };

        if src.remaining() < header.payload_len {
            src.reserve(header.payload_len - src.remaining());
            self.pending = Some(header);
            return Ok(None);
        }

        if let Some(key) = header.key {
            mask::apply_mask(&mut src[..header.payload_len], key);
        }
        let payload = src.split_to(header.payload_len).freeze();
        Ok(Some(Frame::new(header.fin, header.opcode, payload)))
    }
}

/// Frame encoder for one endpoint role; client output is masked.
pub struct Encoder {
    role: Role,
}

impl Encoder {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl codec::Encoder<Frame> for Encoder {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = frame.payload.len();
        let masked = self.role == Role::Client;
        dst.reserve(MAX_HEAD_SIZE + len);

        dst.put_u8((frame.fin as u8) << 7 | u8::from(frame.opcode));
        let mask_bit = if masked { MASK } else { 0 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len < 65536 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        if masked {
            let key: [u8; 4] = rand::random();
            dst.put_slice(&key);
            let at = dst.len();
            dst.extend_from_slice(&frame.payload);
            mask::apply_mask(&mut dst[at..], key);
        } else {
            dst.extend_from_slice(&frame.payload);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::codec::{Decoder as _, Encoder as _};

    use super::*;

    fn decode_all(decoder: &mut Decoder, bytes: &[u8]) -> Vec<crate::Result<Frame>> {
        let mut src = BytesMut::from(bytes);
        let mut out = Vec::new();
        loop {
            match decoder.decode(&mut src) {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => break,
                Err(err) => {
                    out.push(Err(err));
                    break;
                }
            }
        }
        out
    }

    #[test]
    fn server_decodes_masked_text() {
        // "hello" masked with 0x00000000 stays literal.
        let mut decoder = Decoder::new(Role::Server, 1 << 20);
        let wire = [
            &[0x81u8, 0x85, 0x00, 0x00, 0x00, 0x00][..],
            b"hello",
        ]
        .concat();
        let frames = decode_all(&mut decoder, &wire);
        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.opcode(), OpCode::Text);
        assert!(frame.is_fin());
        assert_eq!(frame.payload().as_ref(), b"hello");
    }

    #[test]
    fn server_unmasks_payload() {
        let key = [0x11u8, 0x22, 0x33, 0x44];
        let mut payload = b"masked payload".to_vec();
        mask::apply_mask(&mut payload, key);
        let mut wire = vec![0x82, 0x80 | payload.len() as u8];
        wire.extend_from_slice(&key);
        wire.extend_from_slice(&payload);

        let mut decoder = Decoder::new(Role::Server, 1 << 20);
        let frames = decode_all(&mut decoder, &wire);
        assert_eq!(frames[0].as_ref().unwrap().payload().as_ref(), b"masked payload");
    }

    #[test]
    fn partial_reads_do_not_advance() {
        let key = [9u8, 8, 7, 6];
        let mut payload = vec![0xaa; 300];
        mask::apply_mask(&mut payload, key);
        let mut wire = vec![0x82, 0x80 | 126, 0x01, 0x2c];
        wire.extend_from_slice(&key);
        wire.extend_from_slice(&payload);

        let mut decoder = Decoder::new(Role::Server, 1 << 20);
        let mut src = BytesMut::new();
        let mut decoded = None;
        // Feed one byte at a time; the decoder must wait without consuming.
        for &byte in &wire {
            src.put_u8(byte);
            if let Some(frame) = decoder.decode(&mut src).unwrap() {
                decoded = Some(frame);
            }
        }
        let frame = decoded.expect("frame after final byte");
        assert_eq!(frame.payload().len(), 300);
        assert!(frame.payload().iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn back_to_back_frames() {
        let mut decoder = Decoder::new(Role::Client, 1 << 20);
        let wire = [
            &[0x81u8, 0x02][..],
            b"ab",
            &[0x89, 0x00][..],
            &[0x82, 0x01][..],
            b"z",
        ]
        .concat();
        let frames = decode_all(&mut decoder, &wire);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref().unwrap().opcode(), OpCode::Text);
        assert_eq!(frames[1].as_ref().unwrap().opcode(), OpCode::Ping);
        assert_eq!(frames[2].as_ref().unwrap().opcode(), OpCode::Binary);
    }

    #[test]
    fn server_rejects_unmasked_frame() {
        let mut decoder = Decoder::new(Role::Server, 1 << 20);
        let frames = decode_all(&mut decoder, &[0x81, 0x01, b'x']);
        assert!(matches!(frames[0], Err(WebSocketError::UnmaskedFrame)));
    }

    #[test]
    fn client_rejects_masked_frame() {
        let mut decoder = Decoder::new(Role::Client, 1 << 20);
        let frames = decode_all(&mut decoder, &[0x81, 0x81, 1, 2, 3, 4, b'x']);
        assert!(matches!(frames[0], Err(WebSocketError::MaskedFrame)));
    }

    #[test]
    fn rejects_fragmented_control_frame() {
        let mut decoder = Decoder::new(Role::Client, 1 << 20);
        let frames = decode_all(&mut decoder, &[0x09, 0x00]);
        assert!(matches!(
            frames[0],
            Err(WebSocketError::FragmentedControlFrame)
        ));
    }

    #[test]
    fn rejects_reserved_opcodes_and_rsv_bits() {
        for first in [0x83u8, 0x8B, 0xC1, 0xA2] {
            let mut decoder = Decoder::new(Role::Client, 1 << 20);
            let frames = decode_all(&mut decoder, &[first, 0x01, b'x']);
            assert!(
                matches!(frames[0], Err(WebSocketError::InvalidOpCode(_))),
                "first byte {first:#04x}"
            );
        }
    }

    #[test]
    fn rejects_empty_data_frame() {
        let mut decoder = Decoder::new(Role::Client, 1 << 20);
        let frames = decode_all(&mut decoder, &[0x81, 0x00]);
        assert!(matches!(frames[0], Err(WebSocketError::EmptyDataFrame)));

        // A zero-length continuation is allowed.
        let mut decoder = Decoder::new(Role::Client, 1 << 20);
        let frames = decode_all(&mut decoder, &[0x80, 0x00]);
        assert!(frames[0].is_ok());
    }

    #[test]
    fn rejects_oversized_control_frame() {
        let mut wire = vec![0x89, 126, 0x00, 126];
        wire.extend_from_slice(&[0u8; 126]);
        let mut decoder = Decoder::new(Role::Client, 1 << 20);
        let frames = decode_all(&mut decoder, &wire);
        assert!(matches!(
            frames[0],
            Err(WebSocketError::ControlFrameTooLarge)
        ));
    }

    #[test]
    fn rejects_declared_length_beyond_cap() {
        // TEXT frame declaring 2000 bytes against a 1024-byte cap fails at
        // the header, before any payload arrives.
        let mut decoder = Decoder::new(Role::Client, 1024);
        let frames = decode_all(&mut decoder, &[0x81, 126, 0x07, 0xd0]);
        assert!(matches!(frames[0], Err(WebSocketError::MessageTooLarge)));
    }

    #[test]
    fn client_encoder_masks_and_is_reversible() {
        let mut encoder = Encoder::new(Role::Client);
        let mut dst = BytesMut::new();
        encoder.encode(Frame::text("ping me"), &mut dst).unwrap();

        assert_eq!(dst[0], 0x81);
        assert_eq!(dst[1], 0x80 | 7);
        let key: [u8; 4] = dst[2..6].try_into().unwrap();
        let mut body = dst[6..].to_vec();
        mask::apply_mask(&mut body, key);
        assert_eq!(body, b"ping me");
    }

    #[test]
    fn server_encoder_leaves_payload_clear() {
        let mut encoder = Encoder::new(Role::Server);
        let mut dst = BytesMut::new();
        encoder.encode(Frame::text("clear"), &mut dst).unwrap();
        assert_eq!(&dst[..], &[&[0x81u8, 0x05][..], b"clear"].concat()[..]);
    }

    #[test]
    fn encoder_length_encodings() {
        let mut encoder = Encoder::new(Role::Server);

        let mut dst = BytesMut::new();
        encoder
            .encode(Frame::binary(vec![0u8; 125]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..2], &[0x82, 125]);

        let mut dst = BytesMut::new();
        encoder
            .encode(Frame::binary(vec![0u8; 300]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..4], &[0x82, 126, 0x01, 0x2c]);

        let mut dst = BytesMut::new();
        encoder
            .encode(Frame::binary(vec![0u8; 70000]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..2], &[0x82, 127]);
        assert_eq!(u64::from_be_bytes(dst[2..10].try_into().unwrap()), 70000);
    }

    #[test]
    fn round_trip_through_both_roles() {
        let payload: Vec<u8> = (0u32..20000).map(|i| (i % 256) as u8).collect();
        let mut encoder = Encoder::new(Role::Client);
        let mut wire = BytesMut::new();
        encoder.encode(Frame::binary(payload.clone()), &mut wire).unwrap();

        let mut decoder = Decoder::new(Role::Server, 1 << 20);
        let frame = decoder.decode(&mut wire).unwrap().expect("complete frame");
        assert_eq!(frame.payload().as_ref(), &payload[..]);
        assert!(wire.is_empty());
    }
}
