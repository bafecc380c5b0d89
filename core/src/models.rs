use serde::{Deserialize, Serialize};

/// Exit code used when the remote reports a failed job without a code of its
/// own.
pub const EXIT_PLATFORM_ERROR: i32 = 125;

/// Exit code for sessions ended by an explicit kill or detach (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamId {
    Stdout,
    Stderr,
}

/// One demultiplexed piece of remote output. A zero-length payload with
/// `is_final` set signals end-of-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamId,
    pub payload: Vec<u8>,
    pub is_final: bool,
}

impl OutputChunk {
    pub fn data(stream: StreamId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            stream,
            payload: payload.into(),
            is_final: false,
        }
    }

    pub fn eof(stream: StreamId) -> Self {
        Self {
            stream,
            payload: Vec::new(),
            is_final: true,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.is_final && self.payload.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub running: bool,
    pub exit_code: Option<i32>,
}

impl JobStatus {
    pub fn running() -> Self {
        Self {
            running: true,
            exit_code: None,
        }
    }

    pub fn exited(code: i32) -> Self {
        Self {
            running: false,
            exit_code: Some(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// A local key press, already normalized by the terminal provider.
///
/// `Raw` carries bytes read from a non-interactive stdin verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Ctrl(char),
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Raw(Vec<u8>),
}

impl Key {
    /// Encode the key press as the byte sequence a terminal would produce.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Char(ch) => ch.to_string().into_bytes(),
            Key::Ctrl(ch) => vec![ctrl_byte(*ch)],
            Key::Enter => b"\r".to_vec(),
            Key::Esc => vec![0x1b],
            Key::Backspace => vec![0x7f],
            Key::Tab => vec![b'\t'],
            Key::Up => b"\x1b[A".to_vec(),
            Key::Down => b"\x1b[B".to_vec(),
            Key::Right => b"\x1b[C".to_vec(),
            Key::Left => b"\x1b[D".to_vec(),
            Key::Raw(bytes) => bytes.clone(),
        }
    }
}

fn ctrl_byte(ch: char) -> u8 {
    (ch as u8) & 0x1f
}

/// Outcome of the Ctrl-C dialog during a non-tty attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptDecision {
    Continue,
    Detach,
    Kill,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_control_keys() {
        assert_eq!(Key::Ctrl('c').encode(), vec![0x03]);
        assert_eq!(Key::Ctrl('d').encode(), vec![0x04]);
        assert_eq!(Key::Enter.encode(), b"\r".to_vec());
        assert_eq!(Key::Up.encode(), b"\x1b[A".to_vec());
    }

    #[test]
    fn encodes_multibyte_chars() {
        assert_eq!(Key::Char('é').encode(), "é".as_bytes().to_vec());
    }

    #[test]
    fn eof_chunk_is_recognized() {
        assert!(OutputChunk::eof(StreamId::Stdout).is_eof());
        assert!(!OutputChunk::data(StreamId::Stdout, b"x".to_vec()).is_eof());
    }
}
