//! Crossterm-backed terminal provider.
//!
//! Implements the engine's `Terminal`/`TermSink` traits over the real
//! stdio, and pumps local key presses onto a channel: crossterm events when
//! stdin is a terminal, raw byte reads otherwise.

use std::io::{self, IsTerminal, Read, Write};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

use jobmux_core::models::{Key, StreamId, TermSize};
use jobmux_core::term::{TermSink, Terminal};

/// Puts the terminal into raw mode and restores it on drop, whichever way
/// the session ends.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

pub struct CrosstermTerminal;

impl Terminal for CrosstermTerminal {
    fn size(&self) -> io::Result<TermSize> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(TermSize::new(cols, rows))
    }

    fn is_tty(&self) -> bool {
        io::stdin().is_terminal() && io::stdout().is_terminal()
    }
}

/// Stdout/stderr sink. In raw mode lone `\n` must become `\r\n`; output
/// that already carries `\r\n` (a remote pty does this) passes through
/// unchanged.
pub struct StdoutSink {
    raw: bool,
    out: io::Stdout,
    err: io::Stderr,
}

impl StdoutSink {
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            out: io::stdout(),
            err: io::stderr(),
        }
    }
}

impl TermSink for StdoutSink {
    fn write_str(&mut self, text: &str) -> io::Result<()> {
        if self.raw {
            self.out.write_all(translate_newlines(text).as_bytes())
        } else {
            self.out.write_all(text.as_bytes())
        }
    }

    fn write_stream(&mut self, stream: StreamId, text: &str) -> io::Result<()> {
        match stream {
            StreamId::Stdout => self.out.write_all(text.as_bytes()),
            StreamId::Stderr => {
                self.err.write_all(text.as_bytes())?;
                self.err.flush()
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn translate_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    out
}

/// Start the key pump thread and hand back its channel. The thread ends
/// when the receiver is dropped or local stdin reaches end-of-file.
pub fn spawn_key_pump(tty: bool) -> mpsc::Receiver<Key> {
    let (tx, rx) = mpsc::channel(64);
    if tty {
        thread::spawn(move || pump_events(tx));
    } else {
        thread::spawn(move || pump_stdin(tx));
    }
    rx
}

fn pump_events(tx: mpsc::Sender<Key>) {
    loop {
        match event::poll(Duration::from_millis(50)) {
            Ok(true) => {}
            Ok(false) => {
                if tx.is_closed() {
                    return;
                }
                continue;
            }
            Err(_) => return,
        }
        let event = match event::read() {
            Ok(event) => event,
            Err(_) => return,
        };
        if let Event::Key(key) = event {
            if let Some(key) = key_to_core(&key) {
                if tx.blocking_send(key).is_err() {
                    return;
                }
            }
        }
    }
}

fn pump_stdin(tx: mpsc::Sender<Key>) {
    let mut stdin = io::stdin();
    let mut buf = [0u8; 4096];
    loop {
        match stdin.read(&mut buf) {
            // Local EOF closes the key channel, which ends the session's
            // input routing.
            Ok(0) => return,
            Ok(n) => {
                if tx.blocking_send(Key::Raw(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

fn key_to_core(event: &KeyEvent) -> Option<Key> {
    match event.code {
        KeyCode::Char(ch) => {
            if event.modifiers.contains(KeyModifiers::CONTROL) {
                Some(Key::Ctrl(ch))
            } else {
                Some(Key::Char(ch))
            }
        }
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Backspace => Some(Key::Backspace),
        KeyCode::Tab => Some(Key::Tab),
        KeyCode::Esc => Some(Key::Esc),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Left => Some(Key::Left),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_control_and_plain_chars() {
        let plain = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert_eq!(key_to_core(&plain), Some(Key::Char('x')));

        let ctrl = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key_to_core(&ctrl), Some(Key::Ctrl('c')));
    }

    #[test]
    fn maps_navigation_keys() {
        let up = KeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(key_to_core(&up), Some(Key::Up));
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(key_to_core(&enter), Some(Key::Enter));
        let home = KeyEvent::new(KeyCode::Home, KeyModifiers::NONE);
        assert_eq!(key_to_core(&home), None);
    }

    #[test]
    fn raw_mode_translation_leaves_crlf_alone() {
        assert_eq!(translate_newlines("a\nb"), "a\r\nb");
        assert_eq!(translate_newlines("a\r\nb"), "a\r\nb");
        assert_eq!(translate_newlines("\n\n"), "\r\n\r\n");
    }
}
