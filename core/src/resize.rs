//! Local terminal size watcher.
//!
//! On unix the watcher sleeps on SIGWINCH and only reads the size when the
//! kernel says it may have changed; elsewhere (or when signal registration
//! fails) it falls back to a fixed-interval poll. Either way `resize_fn`
//! fires at most once per distinct observed size.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::models::TermSize;
use crate::term::Terminal;

pub struct ResizeWatcher {
    poll_interval: Duration,
    last: Option<TermSize>,
}

impl ResizeWatcher {
    /// `initial` seeds the debounce with a size the caller already pushed,
    /// so the watcher does not repeat it.
    pub fn new(poll_interval: Duration, initial: Option<TermSize>) -> Self {
        Self {
            poll_interval,
            last: initial,
        }
    }

    /// Run until cancelled or until `resize_fn` returns `false`.
    pub async fn run<F, Fut>(mut self, terminal: Arc<dyn Terminal>, mut resize_fn: F)
    where
        F: FnMut(TermSize) -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::window_change()) {
                Ok(mut winch) => {
                    // The signal stream deregisters itself when dropped, so
                    // cancellation restores the previous handler.
                    loop {
                        if winch.recv().await.is_none() {
                            return;
                        }
                        if !self.observe(terminal.as_ref(), &mut resize_fn).await {
                            return;
                        }
                    }
                }
                Err(err) => {
                    log::debug!("SIGWINCH unavailable ({err}), falling back to polling");
                    self.poll(terminal, resize_fn).await;
                }
            }
        }
        #[cfg(not(unix))]
        self.poll(terminal, resize_fn).await;
    }

    pub(crate) async fn poll<F, Fut>(mut self, terminal: Arc<dyn Terminal>, mut resize_fn: F)
    where
        F: FnMut(TermSize) -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        loop {
            if !self.observe(terminal.as_ref(), &mut resize_fn).await {
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn observe<F, Fut>(&mut self, terminal: &dyn Terminal, resize_fn: &mut F) -> bool
    where
        F: FnMut(TermSize) -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        let size = match terminal.size() {
            Ok(size) => size,
            Err(_) => return true,
        };
        if self.last == Some(size) {
            return true;
        }
        self.last = Some(size);
        resize_fn(size).await
    }
}
