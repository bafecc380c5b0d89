use std::sync::Arc;

use tokio::sync::Mutex;

use crate::term::TermSink;

/// Mutable per-session flags, always accessed under the session write-mutex.
#[derive(Debug, Default)]
pub struct AttachState {
    /// The log-tail banner was printed.
    pub log_header_printed: bool,
    /// Live attach output has started; set exactly once, just before the
    /// first live chunk is written.
    pub attach_ready: bool,
    /// Suppress banners and progress rendering.
    pub quiet: bool,
    /// The session ended via an explicit kill or detach, so the final
    /// status-poll phase must be skipped.
    pub skip_stopper: bool,
}

/// The session write-mutex: flags and terminal sink live behind the same
/// lock, so holding it is holding the terminal. This is what keeps log-tail
/// and live output from interleaving partial lines.
pub struct SessionTerm {
    pub state: AttachState,
    pub sink: Box<dyn TermSink>,
}

pub type SharedTerm = Arc<Mutex<SessionTerm>>;

impl SessionTerm {
    pub fn shared(sink: Box<dyn TermSink>, quiet: bool) -> SharedTerm {
        Arc::new(Mutex::new(Self {
            state: AttachState {
                quiet,
                ..AttachState::default()
            },
            sink,
        }))
    }
}
