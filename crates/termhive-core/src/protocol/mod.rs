//! Wire protocol between the UI side and the PTY supervisor daemon.
//!
//! JSON Lines over a Unix socket. Every message is one line tagged by its
//! `"type"` field; raw terminal bytes travel base64 encoded.

pub mod codec;
pub mod messages;
pub mod types;

pub use messages::{ClientMessage, DaemonMessage};
pub use types::{SessionInfo, SupervisorEvent};

use base64::Engine;

/// Encode raw PTY bytes for a JSON payload.
pub fn encode_bytes(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a base64 payload back into raw bytes.
pub fn decode_bytes(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_binary() {
        let raw = vec![0u8, 27, b'[', b'2', b'J', 255, b'\n'];
        assert_eq!(decode_bytes(&encode_bytes(&raw)).unwrap(), raw);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_bytes("not base64!!").is_err());
    }
}
