/// Incremental UTF-8 decoder for byte streams that may split multi-byte
/// sequences across chunks.
///
/// A trailing incomplete sequence is held back until more bytes arrive and is
/// only forced out (lossily) by `flush` at true end-of-stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the tail, wait for the
                            // next chunk.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_ascii_through() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(b"hello"), "hello");
        assert_eq!(decoder.flush(), "");
    }

    #[test]
    fn reassembles_split_multibyte_sequence() {
        // "é" is 0xC3 0xA9
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(&[0xC3]), "");
        assert_eq!(decoder.feed(&[0xA9, b'!']), "é!");
    }

    #[test]
    fn flushes_trailing_incomplete_sequence_lossily() {
        // First two bytes of a three-byte sequence.
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(&[b'a', 0xE2, 0x82]), "a");
        assert_eq!(decoder.flush(), "\u{FFFD}");
        assert_eq!(decoder.flush(), "");
    }

    #[test]
    fn replaces_invalid_bytes_mid_stream() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }
}
