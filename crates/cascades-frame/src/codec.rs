use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Message header: magic (2) + body length (4) + frame count (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Per-frame length prefix inside the body.
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Magic bytes: "IP" (0x49 0x50).
pub const MAGIC: [u8; 2] = [0x49, 0x50];

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

const MAX_FRAMES: usize = u16::MAX as usize;

/// Encode a multipart message into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────────┬─────────────┬──────────────────────────────┐
/// │ Magic (2B) │ Body length  │ Frame count │ Body: per frame              │
/// │ 0x49 0x50  │ (4B LE)      │ (2B LE)     │   length (4B LE) + bytes     │
/// └────────────┴──────────────┴─────────────┴──────────────────────────────┘
/// ```
pub fn encode_message(frames: &[Bytes], max_message: usize, dst: &mut BytesMut) -> Result<()> {
    if frames.len() > MAX_FRAMES {
        return Err(FrameError::TooManyFrames {
            count: frames.len(),
            max: MAX_FRAMES,
        });
    }

    let body_len: usize = frames.iter().map(|f| FRAME_PREFIX_SIZE + f.len()).sum();
    let max = max_message.min(u32::MAX as usize);
    if body_len > max {
        return Err(FrameError::MessageTooLarge {
            size: body_len,
            max,
        });
    }

    dst.reserve(HEADER_SIZE + body_len);
    dst.put_slice(&MAGIC);
    dst.put_u32_le(body_len as u32);
    dst.put_u16_le(frames.len() as u16);
    for frame in frames {
        dst.put_u32_le(frame.len() as u32);
        dst.put_slice(frame);
    }
    Ok(())
}

/// Decode a multipart message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer. Errors leave the
/// stream unsynchronized; the connection should be dropped.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Vec<Bytes>>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let body_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let frame_count = u16::from_le_bytes([src[6], src[7]]) as usize;

    if body_len > max_message {
        return Err(FrameError::MessageTooLarge {
            size: body_len,
            max: max_message,
        });
    }
    if frame_count * FRAME_PREFIX_SIZE > body_len {
        return Err(FrameError::Malformed("frame count exceeds body length"));
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let mut body = src.split_to(body_len).freeze();

    let mut frames = Vec::with_capacity(frame_count);
    for _ in 0..frame_count {
        if body.remaining() < FRAME_PREFIX_SIZE {
            return Err(FrameError::Malformed("truncated frame length"));
        }
        let len = body.get_u32_le() as usize;
        if body.remaining() < len {
            return Err(FrameError::Malformed("frame length exceeds body"));
        }
        frames.push(body.split_to(len));
    }

    if body.has_remaining() {
        return Err(FrameError::Malformed("trailing bytes after last frame"));
    }

    Ok(Some(frames))
}

/// `tokio_util` codec over [`encode_message`] / [`decode_message`].
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_message: usize,
}

impl MessageCodec {
    pub fn new(max_message: usize) -> Self {
        Self { max_message }
    }

    pub fn max_message(&self) -> usize {
        self.max_message
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE)
    }
}

impl Decoder for MessageCodec {
    type Item = Vec<Bytes>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_message(src, self.max_message)
    }
}

impl Encoder<Vec<Bytes>> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Vec<Bytes>, dst: &mut BytesMut) -> Result<()> {
        encode_message(&item, self.max_message, dst)
    }
}
