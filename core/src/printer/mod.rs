//! Terminal-side renderers for attach sessions.
//!
//! `TtyPrinter` is a cursor-addressed renderer over a virtual line buffer: it
//! computes the exact ANSI control string needed to place text at a given
//! virtual line without disturbing the others. `StreamPrinter` is the
//! append-only fallback for non-interactive output with an idle heartbeat.
//! Both render to a `String`; the caller owns the actual device write.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cursor-addressed line renderer.
///
/// `total_lines` models how many terminal lines have been committed so far,
/// independent of actual scrollback. After every `print` the cursor sits on
/// the line immediately below `total_lines`.
#[derive(Debug, Default)]
pub struct TtyPrinter {
    total_lines: usize,
}

impl TtyPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Render `text` at virtual line `line` (append at the bottom when
    /// `None`), returning the control string to emit.
    pub fn print(&mut self, text: &str, line: Option<usize>) -> String {
        let lines: Vec<&str> = text.split('\n').collect();
        let line_number = line.unwrap_or(self.total_lines);
        let mut diff = self.total_lines as isize - line_number as isize;
        let mut out = String::new();

        if diff > 0 {
            // Target is above the bottom: move up and overwrite in place,
            // clearing stale tails only on lines that previously existed.
            out.push_str(&format!("\x1b[{}A", diff));
            for (idx, part) in lines.iter().enumerate() {
                out.push_str(part);
                if (idx as isize) < diff {
                    out.push_str("\x1b[0K");
                }
                out.push('\n');
            }
        } else {
            if diff < 0 {
                // Pad the buffer up to the target line, landing just above it.
                for _ in 0..-diff {
                    out.push('\n');
                }
                out.push_str("\x1b[1A");
            }
            out.push_str(text);
            out.push('\n');
        }

        diff -= lines.len() as isize;
        if diff > 0 {
            // The overwrite only advanced past `lines.len()` of the lines
            // above the bottom; move back down to the true bottom.
            out.push_str(&format!("\x1b[{}B", diff));
        }

        self.total_lines = self.total_lines.max(line_number + lines.len());
        out
    }
}

/// Key-to-line map for re-targeting updates, one entry per stage or layer.
///
/// The first `print` for a key allocates the current bottom line; later
/// prints for the same key overwrite that line in place.
#[derive(Debug, Default)]
pub struct LineIndex {
    lines: HashMap<String, usize>,
}

impl LineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(&mut self, printer: &mut TtyPrinter, key: &str, text: &str) -> String {
        let line = match self.lines.get(key) {
            Some(&line) => line,
            None => {
                let line = printer.total_lines();
                self.lines.insert(key.to_string(), line);
                line
            }
        };
        printer.print(text, Some(line))
    }

    pub fn line_of(&self, key: &str) -> Option<usize> {
        self.lines.get(key).copied()
    }
}

/// Append-only streaming printer with spam-controlled heartbeat ticks.
#[derive(Debug)]
pub struct StreamPrinter {
    idle: Duration,
    printed: bool,
    last_emit: Option<Instant>,
}

impl Default for StreamPrinter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl StreamPrinter {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            printed: false,
            last_emit: None,
        }
    }

    /// Render a message; messages after the first are preceded by a newline
    /// so the session never starts with a blank line.
    pub fn print(&mut self, text: &str) -> String {
        let mut out = String::new();
        if self.printed {
            out.push('\n');
        }
        out.push_str(text);
        self.printed = true;
        self.last_emit = Some(Instant::now());
        out
    }

    /// Render a single `.` if the idle interval elapsed since the last
    /// emission, nothing otherwise.
    pub fn tick(&mut self) -> String {
        let due = match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= self.idle,
        };
        if !due {
            return String::new();
        }
        self.last_emit = Some(Instant::now());
        ".".to_string()
    }

    /// Render the trailing newline, if anything was ever printed.
    pub fn close(&mut self) -> String {
        if self.printed {
            "\n".to_string()
        } else {
            String::new()
        }
    }
}
