//! Multipart message framing and the Information Packet (IP) codec.
//!
//! Two layers live here:
//! - [`codec`] turns a byte stream into multipart messages (ordered lists of
//!   frames) and back. Every message starts with a 2-byte magic ("IP"), a
//!   4-byte body length and a 2-byte frame count.
//! - [`ip`] classifies a multipart message as one of the three IP variants
//!   (Packet, OpenBracket, CloseBracket) or rejects it as invalid.

pub mod codec;
pub mod error;
pub mod ip;

pub use codec::{
    decode_message, encode_message, MessageCodec, DEFAULT_MAX_MESSAGE, FRAME_PREFIX_SIZE,
    HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use ip::{is_valid, Ip, CLOSE_BRACKET_MARKER, OPEN_BRACKET_MARKER, PACKET_MARKER};
