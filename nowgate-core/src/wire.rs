//! Framing: fixed 202-byte envelope. Byte 0 device type, byte 1 payload type, then a
//! NUL-padded 200-byte message buffer. Packed field by field; never a memory overlay.

use crate::protocol::{DeviceType, Frame, PayloadType};

/// Bytes available for the inner message.
pub const MESSAGE_SIZE: usize = 200;
const HEADER_SIZE: usize = 2;
/// Total envelope size on the radio link.
pub const FRAME_SIZE: usize = HEADER_SIZE + MESSAGE_SIZE;

/// Encode a frame into exactly `FRAME_SIZE` bytes. Oversize messages are rejected, never truncated.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
    let len = frame.message.len();
    if len > MESSAGE_SIZE {
        return Err(FrameEncodeError::TooLarge {
            len,
            max: MESSAGE_SIZE,
        });
    }
    if frame.message.contains(&0) {
        return Err(FrameEncodeError::EmbeddedNul);
    }
    let mut out = vec![0u8; FRAME_SIZE];
    out[0] = frame.device_type.code();
    out[1] = frame.payload_type.code();
    out[HEADER_SIZE..HEADER_SIZE + len].copy_from_slice(&frame.message);
    Ok(out)
}

/// Error encoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("message of {len} bytes exceeds the {max}-byte frame buffer")]
    TooLarge { len: usize, max: usize },
    #[error("message contains a NUL byte")]
    EmbeddedNul,
}

/// Decode one frame from the front of `bytes`. Bytes beyond `FRAME_SIZE` are ignored.
/// The message ends at the first NUL (or fills the whole buffer). JSON is not validated here.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameDecodeError> {
    if bytes.len() < FRAME_SIZE {
        return Err(FrameDecodeError::Truncated { len: bytes.len() });
    }
    let device_type =
        DeviceType::from_code(bytes[0]).ok_or(FrameDecodeError::UnknownDeviceType(bytes[0]))?;
    let payload_type =
        PayloadType::from_code(bytes[1]).ok_or(FrameDecodeError::UnknownPayloadType(bytes[1]))?;
    let buffer = &bytes[HEADER_SIZE..FRAME_SIZE];
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(MESSAGE_SIZE);
    Ok(Frame {
        device_type,
        payload_type,
        message: buffer[..end].to_vec(),
    })
}

/// Error decoding a frame (short input or unknown class codes).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame of {len} bytes is shorter than the envelope")]
    Truncated { len: usize },
    #[error("unknown device type code {0:#04x}")]
    UnknownDeviceType(u8),
    #[error("unknown payload type code {0:#04x}")]
    UnknownPayloadType(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_json_message() {
        let frame = Frame::new(
            DeviceType::Switch,
            PayloadType::Config,
            r#"{"name":"Kitchen","unit":1,"type":"switch"}"#,
        );
        let bytes = encode_frame(&frame).unwrap();
        assert_eq!(bytes.len(), FRAME_SIZE);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn roundtrip_full_buffer_and_empty() {
        let full = Frame::new(DeviceType::Led, PayloadType::State, vec![b'x'; MESSAGE_SIZE]);
        assert_eq!(decode_frame(&encode_frame(&full).unwrap()).unwrap(), full);
        let empty = Frame::new(DeviceType::Gateway, PayloadType::KeepAlive, Vec::new());
        assert_eq!(decode_frame(&encode_frame(&empty).unwrap()).unwrap(), empty);
    }

    #[test]
    fn header_layout_is_explicit() {
        let frame = Frame::new(DeviceType::Sensor, PayloadType::Forward, "ab");
        let bytes = encode_frame(&frame).unwrap();
        assert_eq!(bytes[0], DeviceType::Sensor.code());
        assert_eq!(bytes[1], PayloadType::Forward.code());
        assert_eq!(&bytes[2..4], b"ab");
        assert!(bytes[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversize_is_rejected() {
        let frame = Frame::new(DeviceType::Gateway, PayloadType::Set, vec![b'a'; MESSAGE_SIZE + 1]);
        assert_eq!(
            encode_frame(&frame),
            Err(FrameEncodeError::TooLarge {
                len: MESSAGE_SIZE + 1,
                max: MESSAGE_SIZE
            })
        );
    }

    #[test]
    fn embedded_nul_is_rejected() {
        let frame = Frame::new(DeviceType::Gateway, PayloadType::Set, b"a\0b".to_vec());
        assert_eq!(encode_frame(&frame), Err(FrameEncodeError::EmbeddedNul));
    }

    #[test]
    fn short_input_is_truncated() {
        assert_eq!(
            decode_frame(&[0x02, 0x01, b'O', b'N']),
            Err(FrameDecodeError::Truncated { len: 4 })
        );
        assert!(decode_frame(&[]).is_err());
    }

    #[test]
    fn unknown_codes_fail_decode() {
        let mut bytes = vec![0u8; FRAME_SIZE];
        bytes[0] = 0x7f;
        bytes[1] = PayloadType::State.code();
        assert_eq!(
            decode_frame(&bytes),
            Err(FrameDecodeError::UnknownDeviceType(0x7f))
        );
        bytes[0] = DeviceType::Switch.code();
        bytes[1] = 0x00;
        assert_eq!(
            decode_frame(&bytes),
            Err(FrameDecodeError::UnknownPayloadType(0x00))
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let frame = Frame::new(DeviceType::Switch, PayloadType::State, "ON");
        let mut bytes = encode_frame(&frame).unwrap();
        bytes.extend_from_slice(b"garbage");
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }
}
