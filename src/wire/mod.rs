//! Wire protocol for framed message exchange.
//!
//! Every unit on the wire is a self-delimited frame. The first byte selects
//! the frame kind; the rest of the layout depends on it:
//!
//! ```text
//! Message frame:
//! ┌──────┬──────────────┬──────────────┬───────────┬────────────┐
//! │ 0x00 │ name len i32 │ body len i32 │ type name │ JSON body  │
//! │ 1B   │ 4B LE        │ 4B LE        │ N bytes   │ M bytes    │
//! └──────┴──────────────┴──────────────┴───────────┴────────────┘
//!
//! Disconnect frame:
//! ┌──────┬────────┐
//! │ 0x01 │ reason │
//! │ 1B   │ 1B     │
//! └──────┴────────┘
//! ```
//!
//! All multi-byte integers are little-endian; this is part of the protocol
//! contract and pinned by tests, independent of host byte order. The type
//! name and body are UTF-8; the body is JSON produced by the caller.
//!
//! Encoding and decoding here are pure: no I/O, no state. Streaming callers
//! accumulate bytes and use [`try_decode_frame`], which returns `Ok(None)`
//! until a full frame is available. Callers doing exact-size reads use
//! [`MessageHeader`] to learn how many bytes follow the header.

use thiserror::Error;

/// Frame kind byte for a standard message frame.
pub const FRAME_KIND_MESSAGE: u8 = 0x00;

/// Frame kind byte for a disconnect frame.
pub const FRAME_KIND_DISCONNECT: u8 = 0x01;

/// Size of a message frame header: kind byte plus two 4-byte lengths.
pub const MESSAGE_HEADER_SIZE: usize = 9;

/// Size of a complete disconnect frame: kind byte plus reason byte.
pub const DISCONNECT_FRAME_SIZE: usize = 2;

/// Maximum allowed size for the type-name field or the body field (1 MiB).
///
/// Guards against allocating huge buffers from corrupt or hostile length
/// fields before any payload bytes are read.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Errors that can occur during wire protocol operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Not enough data to decode a complete frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Total bytes needed for the frame as far as it could be decoded.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },

    /// The frame kind byte is not a known kind.
    #[error("invalid frame kind: {kind:#04x}")]
    InvalidFrameKind {
        /// The unrecognized kind byte.
        kind: u8,
    },

    /// A length field decoded to a negative value.
    #[error("invalid length field: {length}")]
    InvalidLength {
        /// The raw signed value read from the wire.
        length: i32,
    },

    /// A field length exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("frame field too large: {size} bytes (limit {limit})")]
    FrameTooLarge {
        /// The declared field size.
        size: usize,
        /// The enforced limit.
        limit: usize,
    },

    /// The disconnect reason byte is not a known reason code.
    #[error("invalid disconnect reason code: {code:#04x}")]
    InvalidDisconnectReason {
        /// The unrecognized reason byte.
        code: u8,
    },

    /// The type-name field is not valid UTF-8.
    #[error("type name is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidTypeName {
        /// Length of the valid UTF-8 prefix.
        valid_up_to: usize,
    },
}

/// Reason code carried by a disconnect frame.
///
/// `Unexpected` is never put on the wire by a well-behaved sender; it is
/// synthesized locally when a stream ends without a disconnect frame. It
/// still has a wire code so a received `0xFF` maps onto it instead of being
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Cooperative shutdown requested by the peer.
    Graceful,
    /// The peer application is being suspended.
    ApplicationSuspended,
    /// The peer application is terminating.
    ApplicationTerminated,
    /// The stream ended without a disconnect frame.
    Unexpected,
}

impl DisconnectReason {
    /// Wire code for this reason.
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Graceful => 0x00,
            Self::ApplicationSuspended => 0x01,
            Self::ApplicationTerminated => 0x02,
            Self::Unexpected => 0xFF,
        }
    }

    /// Map a wire code back to a reason, if it is a known code.
    pub const fn from_wire(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Graceful),
            0x01 => Some(Self::ApplicationSuspended),
            0x02 => Some(Self::ApplicationTerminated),
            0xFF => Some(Self::Unexpected),
            _ => None,
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Graceful => "graceful",
            Self::ApplicationSuspended => "application suspended",
            Self::ApplicationTerminated => "application terminated",
            Self::Unexpected => "unexpected",
        };
        write!(f, "{}", text)
    }
}

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A standard message: a declared runtime type name and a JSON body.
    Message {
        /// UTF-8 type name the receiver resolves against its registry.
        type_name: String,
        /// UTF-8 JSON-encoded payload bytes.
        payload: Vec<u8>,
    },
    /// A cooperative disconnect notification.
    Disconnect(DisconnectReason),
}

/// The two length fields of a message frame header.
///
/// Lengths are validated on construction and on decode: negative values and
/// values above [`MAX_PAYLOAD_SIZE`] are rejected before any allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Length of the type-name field in bytes.
    pub type_name_len: usize,
    /// Length of the body field in bytes.
    pub payload_len: usize,
}

impl MessageHeader {
    /// Encoded size of the two length fields, excluding the kind byte.
    pub const SIZE: usize = 8;

    /// Create a validated header.
    pub fn new(type_name_len: usize, payload_len: usize) -> Result<Self, WireError> {
        if type_name_len > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size: type_name_len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size: payload_len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            type_name_len,
            payload_len,
        })
    }

    /// Append the two little-endian length fields to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.type_name_len as i32).to_le_bytes());
        buf.extend_from_slice(&(self.payload_len as i32).to_le_bytes());
    }

    /// Decode and validate the two length fields.
    pub fn decode(bytes: &[u8; Self::SIZE]) -> Result<Self, WireError> {
        let raw_name = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let raw_payload = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if raw_name < 0 {
            return Err(WireError::InvalidLength { length: raw_name });
        }
        if raw_payload < 0 {
            return Err(WireError::InvalidLength { length: raw_payload });
        }
        Self::new(raw_name as usize, raw_payload as usize)
    }
}

/// Encode a standard message frame from its type name and JSON body.
pub fn encode_message_frame(type_name: &str, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let header = MessageHeader::new(type_name.len(), payload.len())?;
    let mut buf = Vec::with_capacity(MESSAGE_HEADER_SIZE + type_name.len() + payload.len());
    buf.push(FRAME_KIND_MESSAGE);
    header.encode_into(&mut buf);
    buf.extend_from_slice(type_name.as_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encode a disconnect frame for the given reason.
pub fn encode_disconnect_frame(reason: DisconnectReason) -> [u8; DISCONNECT_FRAME_SIZE] {
    [FRAME_KIND_DISCONNECT, reason.to_wire()]
}

/// Encode any frame to its wire bytes.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    match frame {
        Frame::Message { type_name, payload } => encode_message_frame(type_name, payload),
        Frame::Disconnect(reason) => Ok(encode_disconnect_frame(*reason).to_vec()),
    }
}

/// Decode one frame from the start of `data`.
///
/// Returns the frame and the number of bytes it consumed, so callers can
/// decode back-to-back frames out of one buffer. Fails with
/// [`WireError::InsufficientData`] when `data` does not yet hold a complete
/// frame; see [`try_decode_frame`] for the streaming-friendly variant.
pub fn decode_frame(data: &[u8]) -> Result<(Frame, usize), WireError> {
    if data.is_empty() {
        return Err(WireError::InsufficientData { needed: 1, have: 0 });
    }
    match data[0] {
        FRAME_KIND_MESSAGE => {
            if data.len() < MESSAGE_HEADER_SIZE {
                return Err(WireError::InsufficientData {
                    needed: MESSAGE_HEADER_SIZE,
                    have: data.len(),
                });
            }
            let mut lens = [0u8; MessageHeader::SIZE];
            lens.copy_from_slice(&data[1..MESSAGE_HEADER_SIZE]);
            let header = MessageHeader::decode(&lens)?;
            let total = MESSAGE_HEADER_SIZE + header.type_name_len + header.payload_len;
            if data.len() < total {
                return Err(WireError::InsufficientData {
                    needed: total,
                    have: data.len(),
                });
            }
            let name_end = MESSAGE_HEADER_SIZE + header.type_name_len;
            let type_name = String::from_utf8(data[MESSAGE_HEADER_SIZE..name_end].to_vec())
                .map_err(|error| WireError::InvalidTypeName {
                    valid_up_to: error.utf8_error().valid_up_to(),
                })?;
            let payload = data[name_end..total].to_vec();
            Ok((Frame::Message { type_name, payload }, total))
        }
        FRAME_KIND_DISCONNECT => {
            if data.len() < DISCONNECT_FRAME_SIZE {
                return Err(WireError::InsufficientData {
                    needed: DISCONNECT_FRAME_SIZE,
                    have: data.len(),
                });
            }
            let reason = DisconnectReason::from_wire(data[1])
                .ok_or(WireError::InvalidDisconnectReason { code: data[1] })?;
            Ok((Frame::Disconnect(reason), DISCONNECT_FRAME_SIZE))
        }
        other => Err(WireError::InvalidFrameKind { kind: other }),
    }
}

/// Try to decode one frame from accumulated stream data.
///
/// Returns `Ok(None)` when more bytes are needed, `Ok(Some((frame,
/// consumed)))` on success, and an error only for data that can never become
/// a valid frame.
pub fn try_decode_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, WireError> {
    match decode_frame(data) {
        Ok(result) => Ok(Some(result)),
        Err(WireError::InsufficientData { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_round_trip() {
        let encoded = encode_message_frame("Demo.Chat", br#"{"body":"hi"}"#).expect("encode");
        let (frame, consumed) = decode_frame(&encoded).expect("decode");
        assert_eq!(consumed, encoded.len());
        assert_eq!(
            frame,
            Frame::Message {
                type_name: "Demo.Chat".to_string(),
                payload: br#"{"body":"hi"}"#.to_vec(),
            }
        );
    }

    #[test]
    fn encode_frame_matches_dedicated_encoders() {
        let message = Frame::Message {
            type_name: "a".to_string(),
            payload: b"{}".to_vec(),
        };
        assert_eq!(
            encode_frame(&message).expect("encode"),
            encode_message_frame("a", b"{}").expect("encode")
        );
        let disconnect = Frame::Disconnect(DisconnectReason::Graceful);
        assert_eq!(
            encode_frame(&disconnect).expect("encode"),
            encode_disconnect_frame(DisconnectReason::Graceful).to_vec()
        );
    }

    #[test]
    fn message_frame_layout_is_pinned() {
        // "Demo.Ping" is 9 bytes, {"n":1} is 7 bytes; lengths are 4-byte LE.
        let encoded = encode_message_frame("Demo.Ping", br#"{"n":1}"#).expect("encode");
        let mut expected = vec![0x00, 0x09, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00];
        expected.extend_from_slice(b"Demo.Ping");
        expected.extend_from_slice(br#"{"n":1}"#);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn disconnect_frame_layout_is_pinned() {
        assert_eq!(
            encode_disconnect_frame(DisconnectReason::Graceful),
            [0x01, 0x00]
        );
        assert_eq!(
            encode_disconnect_frame(DisconnectReason::ApplicationSuspended),
            [0x01, 0x01]
        );
        assert_eq!(
            encode_disconnect_frame(DisconnectReason::ApplicationTerminated),
            [0x01, 0x02]
        );
        assert_eq!(
            encode_disconnect_frame(DisconnectReason::Unexpected),
            [0x01, 0xFF]
        );
    }

    #[test]
    fn disconnect_round_trip_all_reasons() {
        for reason in [
            DisconnectReason::Graceful,
            DisconnectReason::ApplicationSuspended,
            DisconnectReason::ApplicationTerminated,
            DisconnectReason::Unexpected,
        ] {
            let encoded = encode_disconnect_frame(reason);
            let (frame, consumed) = decode_frame(&encoded).expect("decode");
            assert_eq!(consumed, DISCONNECT_FRAME_SIZE);
            assert_eq!(frame, Frame::Disconnect(reason));
        }
    }

    #[test]
    fn empty_name_and_body_are_valid() {
        let encoded = encode_message_frame("", b"").expect("encode");
        assert_eq!(encoded.len(), MESSAGE_HEADER_SIZE);
        let (frame, consumed) = decode_frame(&encoded).expect("decode");
        assert_eq!(consumed, MESSAGE_HEADER_SIZE);
        assert_eq!(
            frame,
            Frame::Message {
                type_name: String::new(),
                payload: Vec::new(),
            }
        );
    }

    #[test]
    fn decode_consumes_exact_frame_length() {
        let mut buf = encode_message_frame("Demo.Ping", br#"{"n":1}"#).expect("encode");
        buf.extend_from_slice(&encode_disconnect_frame(DisconnectReason::Graceful));

        let (first, consumed) = decode_frame(&buf).expect("first frame");
        assert!(matches!(first, Frame::Message { .. }));
        let (second, rest) = decode_frame(&buf[consumed..]).expect("second frame");
        assert_eq!(second, Frame::Disconnect(DisconnectReason::Graceful));
        assert_eq!(consumed + rest, buf.len());
    }

    #[test]
    fn try_decode_reports_partial_frames_as_none() {
        let encoded = encode_message_frame("Demo.Ping", br#"{"n":1}"#).expect("encode");
        for len in 0..encoded.len() {
            let result = try_decode_frame(&encoded[..len]).expect("partial data is not an error");
            assert!(result.is_none(), "prefix of {} bytes decoded early", len);
        }
        let (frame, consumed) = try_decode_frame(&encoded)
            .expect("decode")
            .expect("complete frame");
        assert_eq!(consumed, encoded.len());
        assert!(matches!(frame, Frame::Message { .. }));
    }

    #[test]
    fn try_decode_propagates_real_errors() {
        let err = try_decode_frame(&[0x7F, 0x00]).expect_err("unknown kind");
        assert_eq!(err, WireError::InvalidFrameKind { kind: 0x7F });
    }

    #[test]
    fn decode_rejects_negative_length() {
        let mut buf = vec![FRAME_KIND_MESSAGE];
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        let err = decode_frame(&buf).expect_err("negative length");
        assert_eq!(err, WireError::InvalidLength { length: -1 });
    }

    #[test]
    fn decode_rejects_oversized_length_before_allocating() {
        let huge = (MAX_PAYLOAD_SIZE as i32) + 1;
        let mut buf = vec![FRAME_KIND_MESSAGE];
        buf.extend_from_slice(&4i32.to_le_bytes());
        buf.extend_from_slice(&huge.to_le_bytes());
        let err = decode_frame(&buf).expect_err("oversized length");
        assert_eq!(
            err,
            WireError::FrameTooLarge {
                size: huge as usize,
                limit: MAX_PAYLOAD_SIZE,
            }
        );
    }

    #[test]
    fn decode_rejects_unknown_disconnect_reason() {
        let err = decode_frame(&[FRAME_KIND_DISCONNECT, 0x42]).expect_err("unknown reason");
        assert_eq!(err, WireError::InvalidDisconnectReason { code: 0x42 });
    }

    #[test]
    fn decode_rejects_invalid_utf8_type_name() {
        let mut buf = vec![FRAME_KIND_MESSAGE];
        buf.extend_from_slice(&2i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&[0xFF, 0xFE]);
        let err = decode_frame(&buf).expect_err("invalid utf8");
        assert_eq!(err, WireError::InvalidTypeName { valid_up_to: 0 });
    }

    #[test]
    fn encode_rejects_oversized_body() {
        let body = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let err = encode_message_frame("Demo.Big", &body).expect_err("oversized body");
        assert_eq!(
            err,
            WireError::FrameTooLarge {
                size: MAX_PAYLOAD_SIZE + 1,
                limit: MAX_PAYLOAD_SIZE,
            }
        );
    }

    #[test]
    fn reason_wire_codes_round_trip() {
        for code in [0x00u8, 0x01, 0x02, 0xFF] {
            let reason = DisconnectReason::from_wire(code).expect("known code");
            assert_eq!(reason.to_wire(), code);
        }
        assert_eq!(DisconnectReason::from_wire(0x03), None);
    }

    #[test]
    fn header_round_trip() {
        let header = MessageHeader::new(9, 7).expect("valid header");
        let mut buf = Vec::new();
        header.encode_into(&mut buf);
        let mut bytes = [0u8; MessageHeader::SIZE];
        bytes.copy_from_slice(&buf);
        assert_eq!(MessageHeader::decode(&bytes).expect("decode"), header);
    }
}
