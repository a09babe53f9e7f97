//! Event codecs.
//!
//! Binary wire format: `[4-byte big-endian length][CBOR envelope]`, any
//! number of frames per transport message. Text wire format: one JSON
//! envelope per transport message.

use crate::error::{ChatError, ChatResult};
use std::io::Cursor;

/// Upper bound on a single CBOR frame (1 MiB).
pub const MAX_FRAME_LEN: usize = 1_048_576;

const LEN_PREFIX: usize = 4;

/// Encoding a connection speaks. Detected from the first inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Cbor,
    Json,
}

impl WireFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            WireFormat::Cbor => "cbor",
            WireFormat::Json => "json",
        }
    }
}

/// Encode a serializable value into a length-prefixed CBOR frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> ChatResult<Vec<u8>> {
    let mut frame = vec![0u8; LEN_PREFIX];
    ciborium::into_writer(value, &mut frame)?;

    let len = frame.len() - LEN_PREFIX;
    if len > MAX_FRAME_LEN {
        return Err(ChatError::InvalidMessage(format!(
            "frame too large: {len} bytes (max {MAX_FRAME_LEN})"
        )));
    }
    frame[..LEN_PREFIX].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(frame)
}

/// Decode a CBOR payload (without length prefix) into a typed value.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> ChatResult<T> {
    Ok(ciborium::from_reader(Cursor::new(data))?)
}

/// Encode a serializable value as a JSON text frame.
pub fn json_encode<T: serde::Serialize>(value: &T) -> ChatResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON text frame into a typed value.
pub fn json_decode<T: serde::de::DeserializeOwned>(text: &str) -> ChatResult<T> {
    Ok(serde_json::from_str(text)?)
}

/// Streaming frame decoder: accumulates bytes and yields complete messages.
///
/// A frame whose payload fails to decode is skipped and reported once in
/// the returned error list; the stream stays aligned because the length
/// prefix is still honoured.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

/// Output of one [`FrameDecoder::feed`] call.
#[derive(Debug)]
pub struct Decoded<T> {
    pub messages: Vec<T>,
    pub errors: Vec<ChatError>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and decode every complete frame.
    ///
    /// Returns `Err` only when a length prefix exceeds [`MAX_FRAME_LEN`];
    /// the buffer is discarded in that case since alignment is lost.
    pub fn feed<T: serde::de::DeserializeOwned>(&mut self, data: &[u8]) -> ChatResult<Decoded<T>> {
        self.buffer.extend_from_slice(data);
        let mut out = Decoded {
            messages: Vec::new(),
            errors: Vec::new(),
        };

        while self.buffer.len() >= LEN_PREFIX {
            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;

            if len > MAX_FRAME_LEN {
                self.buffer.clear();
                return Err(ChatError::InvalidMessage(format!(
                    "frame too large: {len} bytes (max {MAX_FRAME_LEN})"
                )));
            }
            if self.buffer.len() < LEN_PREFIX + len {
                break;
            }

            match cbor_decode(&self.buffer[LEN_PREFIX..LEN_PREFIX + len]) {
                Ok(msg) => out.messages.push(msg),
                Err(e) => out.errors.push(e),
            }
            self.buffer.drain(..LEN_PREFIX + len);
        }

        Ok(out)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::messages::{Envelope, MsgType, Payload, RoutedMessage};

    fn sample(payload: &str) -> Envelope {
        Envelope::send(&RoutedMessage::new(
            UserId::parse("alice").unwrap(),
            UserId::parse("bob").unwrap(),
            payload,
        ))
    }

    fn payload_text(env: &Envelope) -> &str {
        match &env.payload {
            Payload::Send(p) => &p.payload,
            other => panic!("expected send payload, got {other:?}"),
        }
    }

    #[test]
    fn decodes_batched_frames_in_order() {
        let mut batch = Vec::new();
        for text in ["one", "two", "three"] {
            batch.extend(frame_encode(&sample(text)).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let decoded = decoder.feed::<Envelope>(&batch).unwrap();
        assert!(decoded.errors.is_empty());
        let texts: Vec<&str> = decoded.messages.iter().map(payload_text).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn split_frame_waits_for_remainder() {
        let frame = frame_encode(&Envelope::ping(3)).unwrap();
        let (head, tail) = frame.split_at(frame.len() / 2);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed::<Envelope>(head).unwrap().messages.is_empty());
        assert_eq!(decoder.pending(), head.len());

        let decoded = decoder.feed::<Envelope>(tail).unwrap();
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].msg_type, MsgType::Ping);
    }

    #[test]
    fn garbage_frame_is_skipped_not_fatal() {
        let mut data = vec![0, 0, 0, 2, 0xff, 0xff];
        data.extend(frame_encode(&Envelope::ping(1)).unwrap());

        let mut decoder = FrameDecoder::new();
        let decoded = decoder.feed::<Envelope>(&data).unwrap();
        assert_eq!(decoded.errors.len(), 1);
        assert_eq!(decoded.messages.len(), 1);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed::<Envelope>(&len).is_err());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn json_text_frame() {
        let text = json_encode(&Envelope::pong(4)).unwrap();
        assert_eq!(text, r#"{"type":"pong","id":4}"#);
        let back: Envelope = json_decode(&text).unwrap();
        assert_eq!(back.msg_type, MsgType::Pong);
        assert!(json_decode::<Envelope>("{not json").is_err());
    }
}
