//! Ctrl-C handling for non-tty attach sessions.
//!
//! In a tty session Ctrl-C arrives as a raw 0x03 byte and is forwarded to
//! the remote process like any other key. In a non-tty session it raises a
//! local SIGINT instead, and the user has to decide what it means: kill the
//! job, detach from it, or keep watching.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::client::SessionOps;
use crate::error::Result;
use crate::input::ModalInput;
use crate::models::{InterruptDecision, Key};
use crate::state::SharedTerm;

const DIALOG_PROMPT: &str =
    "\nInterrupted. Press 'c' to kill the job, 'd' to detach, Enter to continue: ";

/// Interrupt event source. Shared between the live-phase controller and the
/// post-session status poll; only one of them holds the lock at a time.
pub type InterruptSource = Arc<Mutex<mpsc::Receiver<()>>>;

pub fn interrupt_source(rx: mpsc::Receiver<()>) -> InterruptSource {
    Arc::new(Mutex::new(rx))
}

pub struct InterruptController {
    shared: SharedTerm,
    ops: Arc<dyn SessionOps>,
    /// Whether the local terminal can host the dialog at all.
    interactive: bool,
}

impl InterruptController {
    pub fn new(shared: SharedTerm, ops: Arc<dyn SessionOps>, interactive: bool) -> Self {
        Self {
            shared,
            ops,
            interactive,
        }
    }

    /// Consume interrupt events until one resolves the session or the event
    /// source closes. `skip_stopper` is set before returning on a kill or
    /// detach, even if the kill itself failed, so the caller never runs the
    /// status-poll phase against the user's explicit intent.
    pub async fn run(self, interrupts: InterruptSource, modal: ModalInput) -> Result<()> {
        let mut interrupts = interrupts.lock().await;
        while interrupts.recv().await.is_some() {
            if !self.interactive {
                let outcome = self.ops.kill().await;
                self.set_skip_stopper().await;
                return outcome;
            }
            match self.dialog(&modal).await? {
                InterruptDecision::Continue => continue,
                InterruptDecision::Detach => {
                    self.set_skip_stopper().await;
                    return Ok(());
                }
                InterruptDecision::Kill => {
                    let outcome = self.ops.kill().await;
                    self.set_skip_stopper().await;
                    return outcome;
                }
            }
        }
        Ok(())
    }

    /// Present the modal choice. The session write-mutex is held for the
    /// whole dialog, so log and live output stay frozen until the user
    /// answers. The modal guard releases key capture on any exit path,
    /// including cancellation mid-dialog.
    async fn dialog(&self, modal: &ModalInput) -> Result<InterruptDecision> {
        let _capture = modal.enter();
        let mut term = self.shared.lock().await;
        term.sink.write_str(DIALOG_PROMPT)?;
        term.sink.flush()?;
        loop {
            let Some(key) = modal.recv().await else {
                return Ok(InterruptDecision::Continue);
            };
            if let Some(decision) = decision_for(&key) {
                let note = match decision {
                    InterruptDecision::Continue => "continuing\n",
                    InterruptDecision::Detach => "detaching, the job keeps running\n",
                    InterruptDecision::Kill => "killing the job\n",
                };
                term.sink.write_str(note)?;
                term.sink.flush()?;
                return Ok(decision);
            }
            // Any other key is ignored.
        }
    }

    async fn set_skip_stopper(&self) {
        self.shared.lock().await.state.skip_stopper = true;
    }
}

fn decision_for(key: &Key) -> Option<InterruptDecision> {
    match key {
        Key::Enter | Key::Esc => Some(InterruptDecision::Continue),
        Key::Char('c') | Key::Char('C') | Key::Ctrl('c') => Some(InterruptDecision::Kill),
        Key::Char('d') | Key::Char('D') | Key::Ctrl('d') => Some(InterruptDecision::Detach),
        // Line-buffered stdin delivers the answer as raw bytes.
        Key::Raw(bytes) => match bytes.first() {
            None | Some(b'\r') | Some(b'\n') | Some(0x1b) => Some(InterruptDecision::Continue),
            Some(b'c') | Some(b'C') | Some(0x03) => Some(InterruptDecision::Kill),
            Some(b'd') | Some(b'D') | Some(0x04) => Some(InterruptDecision::Detach),
            Some(_) => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionTerm;
    use crate::term::testing::{rendered, MemSink};
    use crate::testing::FakeOps;

    fn setup(interactive: bool) -> (InterruptController, Arc<FakeOps>, SharedTerm) {
        let (sink, _writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), false);
        let ops = Arc::new(FakeOps::running());
        let controller = InterruptController::new(shared.clone(), ops.clone(), interactive);
        (controller, ops, shared)
    }

    #[tokio::test]
    async fn non_interactive_interrupt_kills_directly() {
        let (controller, ops, shared) = setup(false);
        let (int_tx, int_rx) = mpsc::channel(1);
        let (modal, _modal_tx, _active) = ModalInput::new(1);

        int_tx.send(()).await.unwrap();
        controller.run(interrupt_source(int_rx), modal).await.unwrap();

        assert!(ops.was_killed());
        assert!(shared.lock().await.state.skip_stopper);
    }

    #[tokio::test]
    async fn dialog_kill_path() {
        let (controller, ops, shared) = setup(true);
        let (int_tx, int_rx) = mpsc::channel(1);
        let (modal, modal_tx, _active) = ModalInput::new(4);

        int_tx.send(()).await.unwrap();
        let handle = tokio::spawn(controller.run(interrupt_source(int_rx), modal));
        modal_tx.send(Key::Char('c')).await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(ops.was_killed());
        assert!(shared.lock().await.state.skip_stopper);
    }

    #[tokio::test]
    async fn dialog_detach_keeps_the_job_running() {
        let (controller, ops, shared) = setup(true);
        let (int_tx, int_rx) = mpsc::channel(1);
        let (modal, modal_tx, _active) = ModalInput::new(4);

        int_tx.send(()).await.unwrap();
        let handle = tokio::spawn(controller.run(interrupt_source(int_rx), modal));
        modal_tx.send(Key::Ctrl('d')).await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(!ops.was_killed());
        assert!(shared.lock().await.state.skip_stopper);
    }

    #[tokio::test]
    async fn unknown_keys_are_ignored_and_enter_continues() {
        let (controller, ops, shared) = setup(true);
        let (int_tx, int_rx) = mpsc::channel(2);
        let (modal, modal_tx, _active) = ModalInput::new(4);

        int_tx.send(()).await.unwrap();
        let handle = tokio::spawn(controller.run(interrupt_source(int_rx), modal));
        modal_tx.send(Key::Char('x')).await.unwrap();
        modal_tx.send(Key::Enter).await.unwrap();

        // Continue resumes the wait loop; closing the interrupt source ends
        // the task without touching the job.
        drop(int_tx);
        handle.await.unwrap().unwrap();

        assert!(!ops.was_killed());
        assert!(!shared.lock().await.state.skip_stopper);
    }

    #[tokio::test]
    async fn prompt_is_written_through_the_session_sink() {
        let (sink, writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), false);
        let ops = Arc::new(FakeOps::running());
        let controller = InterruptController::new(shared, ops, true);
        let (int_tx, int_rx) = mpsc::channel(1);
        let (modal, modal_tx, _active) = ModalInput::new(4);

        int_tx.send(()).await.unwrap();
        let handle = tokio::spawn(controller.run(interrupt_source(int_rx), modal));
        modal_tx.send(Key::Char('d')).await.unwrap();
        handle.await.unwrap().unwrap();

        let out = rendered(&writes);
        assert!(out.contains("Press 'c' to kill the job"));
        assert!(out.contains("detaching"));
    }
}
