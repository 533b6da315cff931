//! Information Packets.
//!
//! An IP is a multipart message whose first frame is a marker:
//!
//! | Variant      | Frames                     |
//! |--------------|----------------------------|
//! | Packet       | `[PACKET_MARKER, payload]` |
//! | OpenBracket  | `[OPEN_BRACKET_MARKER]`    |
//! | CloseBracket | `[CLOSE_BRACKET_MARKER]`   |
//!
//! Anything else is invalid. Classification never fails; it answers
//! `None` for invalid shapes.

use bytes::Bytes;

/// Marker frame of a data packet.
pub const PACKET_MARKER: &[u8] = b"\x00ip:packet";

/// Marker frame opening a substream.
pub const OPEN_BRACKET_MARKER: &[u8] = b"\x00ip:open";

/// Marker frame closing a substream.
pub const CLOSE_BRACKET_MARKER: &[u8] = b"\x00ip:close";

/// A structurally valid Information Packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ip {
    /// Opaque payload bytes.
    Packet(Bytes),
    /// Start of a substream.
    OpenBracket,
    /// End of a substream.
    CloseBracket,
}

impl Ip {
    /// Build a packet from any byte-like payload.
    pub fn packet(payload: impl Into<Bytes>) -> Self {
        Ip::Packet(payload.into())
    }

    /// Classify a multipart message. `None` means invalid.
    pub fn decode(frames: &[Bytes]) -> Option<Self> {
        match frames {
            [marker, payload] if marker.as_ref() == PACKET_MARKER => {
                Some(Ip::Packet(payload.clone()))
            }
            [marker] if marker.as_ref() == OPEN_BRACKET_MARKER => Some(Ip::OpenBracket),
            [marker] if marker.as_ref() == CLOSE_BRACKET_MARKER => Some(Ip::CloseBracket),
            _ => None,
        }
    }

    /// Produce the frames of this IP.
    pub fn encode(&self) -> Vec<Bytes> {
        match self {
            Ip::Packet(payload) => vec![Bytes::from_static(PACKET_MARKER), payload.clone()],
            Ip::OpenBracket => vec![Bytes::from_static(OPEN_BRACKET_MARKER)],
            Ip::CloseBracket => vec![Bytes::from_static(CLOSE_BRACKET_MARKER)],
        }
    }

    /// Consume the IP and produce its frames without cloning the payload.
    pub fn into_frames(self) -> Vec<Bytes> {
        match self {
            Ip::Packet(payload) => vec![Bytes::from_static(PACKET_MARKER), payload],
            other => other.encode(),
        }
    }

    /// Payload of a packet; brackets carry none.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Ip::Packet(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_packet(&self) -> bool {
        matches!(self, Ip::Packet(_))
    }

    pub fn is_open_bracket(&self) -> bool {
        matches!(self, Ip::OpenBracket)
    }

    pub fn is_close_bracket(&self) -> bool {
        matches!(self, Ip::CloseBracket)
    }

    /// Variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Ip::Packet(_) => "packet",
            Ip::OpenBracket => "open-bracket",
            Ip::CloseBracket => "close-bracket",
        }
    }
}

/// True if the frames form a valid IP.
pub fn is_valid(frames: &[Bytes]) -> bool {
    Ip::decode(frames).is_some()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn b(bytes: &'static [u8]) -> Bytes {
        Bytes::from_static(bytes)
    }

    #[test]
    fn decodes_each_variant() {
        assert_eq!(
            Ip::decode(&[b(PACKET_MARKER), b(b"hello")]),
            Some(Ip::packet(&b"hello"[..]))
        );
        assert_eq!(Ip::decode(&[b(OPEN_BRACKET_MARKER)]), Some(Ip::OpenBracket));
        assert_eq!(Ip::decode(&[b(CLOSE_BRACKET_MARKER)]), Some(Ip::CloseBracket));
    }

    #[test]
    fn packet_roundtrip_including_empty_and_marker_like_payloads() {
        for payload in [
            b(b""),
            b(b"hello"),
            b(PACKET_MARKER),
            b(OPEN_BRACKET_MARKER),
            Bytes::from(vec![0u8; 4096]),
        ] {
            let ip = Ip::Packet(payload.clone());
            assert_eq!(Ip::decode(&ip.encode()), Some(Ip::Packet(payload.clone())));
            assert_eq!(Ip::decode(&ip.into_frames()), Some(Ip::Packet(payload)));
        }
    }

    #[test]
    fn wrong_frame_counts_are_invalid() {
        assert_eq!(Ip::decode(&[]), None);
        assert_eq!(Ip::decode(&[b(PACKET_MARKER)]), None);
        assert_eq!(Ip::decode(&[b(PACKET_MARKER), b(b"a"), b(b"b")]), None);
        assert_eq!(Ip::decode(&[b(OPEN_BRACKET_MARKER), b(b"x")]), None);
        assert_eq!(Ip::decode(&[b(CLOSE_BRACKET_MARKER), b(b"")]), None);
    }

    #[test]
    fn unknown_markers_are_invalid() {
        assert_eq!(Ip::decode(&[b(b"")]), None);
        assert_eq!(Ip::decode(&[b(b"hello"), b(b"world")]), None);
        assert_eq!(Ip::decode(&[b(b"\x00ip:open ")]), None);
        assert_eq!(Ip::decode(&[b(b"\x00ip:packe"), b(b"x")]), None);
    }

    #[test]
    fn decode_is_total_over_generated_shapes() {
        // Every combination of up to three frames drawn from a mix of markers
        // and arbitrary content classifies without panicking, and only the
        // three canonical shapes are valid.
        let pool = [
            b(b""),
            b(b"x"),
            b(PACKET_MARKER),
            b(OPEN_BRACKET_MARKER),
            b(CLOSE_BRACKET_MARKER),
            Bytes::from(vec![0xFFu8; 17]),
        ];

        let mut shapes: Vec<Vec<Bytes>> = vec![vec![]];
        for a in &pool {
            shapes.push(vec![a.clone()]);
            for c in &pool {
                shapes.push(vec![a.clone(), c.clone()]);
                for d in &pool {
                    shapes.push(vec![a.clone(), c.clone(), d.clone()]);
                }
            }
        }

        for frames in shapes {
            let expected_valid = match frames.as_slice() {
                [m, _] => m.as_ref() == PACKET_MARKER,
                [m] => m.as_ref() == OPEN_BRACKET_MARKER || m.as_ref() == CLOSE_BRACKET_MARKER,
                _ => false,
            };
            assert_eq!(is_valid(&frames), expected_valid, "frames: {frames:?}");
        }
    }

    #[test]
    fn accessors() {
        let ip = Ip::packet("x");
        assert_eq!(ip.payload().map(|p| p.as_ref()), Some(&b"x"[..]));
        assert!(ip.is_packet());
        assert_eq!(ip.kind(), "packet");

        assert!(Ip::OpenBracket.payload().is_none());
        assert!(Ip::OpenBracket.is_open_bracket());
        assert!(Ip::CloseBracket.is_close_bracket());
        assert_eq!(Ip::CloseBracket.kind(), "close-bracket");
    }

    #[test]
    fn markers_are_distinct() {
        assert_ne!(PACKET_MARKER, OPEN_BRACKET_MARKER);
        assert_ne!(PACKET_MARKER, CLOSE_BRACKET_MARKER);
        assert_ne!(OPEN_BRACKET_MARKER, CLOSE_BRACKET_MARKER);
    }

    /// A frame that is either a marker or arbitrary bytes.
    fn frame() -> impl Strategy<Value = Bytes> {
        prop_oneof![
            Just(b(PACKET_MARKER)),
            Just(b(OPEN_BRACKET_MARKER)),
            Just(b(CLOSE_BRACKET_MARKER)),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(Bytes::from),
        ]
    }

    proptest! {
        #[test]
        fn decode_classifies_any_frame_sequence(
            frames in proptest::collection::vec(frame(), 0..6)
        ) {
            let expected = match frames.as_slice() {
                [m, payload] if m.as_ref() == PACKET_MARKER => Some(Ip::Packet(payload.clone())),
                [m] if m.as_ref() == OPEN_BRACKET_MARKER => Some(Ip::OpenBracket),
                [m] if m.as_ref() == CLOSE_BRACKET_MARKER => Some(Ip::CloseBracket),
                _ => None,
            };
            prop_assert_eq!(Ip::decode(&frames), expected);
        }

        #[test]
        fn any_payload_survives_encoding(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let ip = Ip::packet(payload.clone());
            prop_assert_eq!(Ip::decode(&ip.encode()), Some(Ip::packet(payload)));
        }
    }
}
