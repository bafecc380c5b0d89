//! Local key routing.
//!
//! All key presses flow through a single router task. In normal mode they go
//! to the stdin forwarder; while the interrupt dialog is open they are
//! captured by the modal channel instead, so the forwarder never eats the
//! user's answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::models::Key;

pub struct ModalInput {
    active: Arc<AtomicBool>,
    rx: Mutex<mpsc::Receiver<Key>>,
}

/// Resets modal capture when the dialog ends, including on cancellation.
pub struct ModalGuard {
    active: Arc<AtomicBool>,
}

impl Drop for ModalGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl ModalInput {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Key>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(capacity);
        let active = Arc::new(AtomicBool::new(false));
        (
            Self {
                active: active.clone(),
                rx: Mutex::new(rx),
            },
            tx,
            active,
        )
    }

    /// Start capturing keys; capture lasts until the guard drops.
    pub fn enter(&self) -> ModalGuard {
        self.active.store(true, Ordering::SeqCst);
        ModalGuard {
            active: self.active.clone(),
        }
    }

    pub async fn recv(&self) -> Option<Key> {
        self.rx.lock().await.recv().await
    }
}

/// Route keys from the terminal pump to either the stdin forwarder or the
/// modal channel. Ends when the pump or both consumers are gone.
pub async fn route_input(
    mut keys: mpsc::Receiver<Key>,
    stdin_tx: mpsc::Sender<Key>,
    modal_tx: mpsc::Sender<Key>,
    modal_active: Arc<AtomicBool>,
) {
    while let Some(key) = keys.recv().await {
        let delivered = if modal_active.load(Ordering::SeqCst) {
            modal_tx.send(key).await.is_ok()
        } else {
            stdin_tx.send(key).await.is_ok()
        };
        if !delivered {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_to_stdin_by_default() {
        let (modal, modal_tx, active) = ModalInput::new(8);
        let (keys_tx, keys_rx) = mpsc::channel(8);
        let (stdin_tx, mut stdin_rx) = mpsc::channel(8);
        let router = tokio::spawn(route_input(keys_rx, stdin_tx, modal_tx, active));

        keys_tx.send(Key::Char('a')).await.unwrap();
        assert_eq!(stdin_rx.recv().await, Some(Key::Char('a')));

        let guard = modal.enter();
        keys_tx.send(Key::Char('d')).await.unwrap();
        assert_eq!(modal.recv().await, Some(Key::Char('d')));
        drop(guard);

        keys_tx.send(Key::Char('b')).await.unwrap();
        assert_eq!(stdin_rx.recv().await, Some(Key::Char('b')));

        drop(keys_tx);
        router.await.unwrap();
    }

    #[tokio::test]
    async fn modal_guard_resets_on_drop() {
        let (modal, _tx, active) = ModalInput::new(1);
        {
            let _guard = modal.enter();
            assert!(active.load(Ordering::SeqCst));
        }
        assert!(!active.load(Ordering::SeqCst));
    }
}
