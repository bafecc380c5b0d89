use std::io;

use crate::models::{StreamId, TermSize};

/// Write side of the local terminal device.
///
/// `write_str` targets the interactive terminal; `write_stream` is the
/// fileno-demultiplexed path used by non-tty sessions, where stdout and
/// stderr keep their own local destinations. Implementations own any
/// newline translation needed while the terminal is in raw mode.
pub trait TermSink: Send {
    fn write_str(&mut self, text: &str) -> io::Result<()>;
    fn write_stream(&mut self, stream: StreamId, text: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Read-only view of the local terminal device.
pub trait Terminal: Send + Sync {
    fn size(&self) -> io::Result<TermSize>;
    fn is_tty(&self) -> bool;
}
