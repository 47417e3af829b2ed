use ethers::types::U256;

use crate::error::{Error, Result};

/// Width of the message payload slot, in bytes. The proof circuit consumes the
/// message as a single 256-bit word.
pub const MESSAGE_WIDTH: usize = 32;

/// Encodes a feedback string into the fixed-width numeric form the proof
/// circuit expects: UTF-8 bytes, right-padded with zeros into one 32-byte
/// word, interpreted big-endian.
pub fn encode_message(text: &str) -> Result<U256> {
    let bytes = text.as_bytes();
    if bytes.len() > MESSAGE_WIDTH {
        return Err(Error::MessageTooLong { len: bytes.len() });
    }
    let mut word = [0u8; MESSAGE_WIDTH];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(U256::from_big_endian(&word))
}

/// Decodes a message word back into the original string.
///
/// Returns `None` for words that were not produced by [`encode_message`]:
/// empty payloads, embedded NUL bytes, or invalid UTF-8. Callers drop such
/// entries instead of failing the whole scan.
pub fn decode_message(raw: U256) -> Option<String> {
    let mut word = [0u8; MESSAGE_WIDTH];
    raw.to_big_endian(&mut word);
    let end = word.iter().rposition(|b| *b != 0).map(|i| i + 1)?;
    if word[..end].contains(&0) {
        return None;
    }
    String::from_utf8(word[..end].to_vec()).ok()
}
