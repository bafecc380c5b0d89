//! The attach/exec session state machine.
//!
//! `AttachSession` connects a duplex stream to the local terminal and runs
//! the live phase as a set of sibling tasks: log replay, key routing, stdin
//! forwarding, output writing, resize watching and, for non-tty sessions,
//! interrupt handling. The first task to finish on its own ends the live
//! phase; the rest are cancelled and awaited before the final status poll
//! resolves the session's exit code.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{ChunkStream, SessionOps};
use crate::config::EngineConfig;
use crate::decode::Utf8Decoder;
use crate::error::{ControlError, Result};
use crate::input::{route_input, ModalInput};
use crate::interrupt::{interrupt_source, InterruptController, InterruptSource};
use crate::models::{Key, StreamId, EXIT_INTERRUPTED, EXIT_PLATFORM_ERROR};
use crate::printer::{StreamPrinter, TtyPrinter};
use crate::resize::ResizeWatcher;
use crate::state::{SessionTerm, SharedTerm};
use crate::tail::LogTailer;
use crate::task::{cancel_and_await, supervise};
use crate::term::{TermSink, Terminal};

pub const ATTACH_HEADER: &str = "=== live attach, output follows ===\n";
pub const ATTACH_HEADER_AFTER_LOG: &str =
    "=== live attach, output may repeat the log tail above ===\n";

#[derive(Debug, Clone, Copy, Default)]
pub struct AttachOptions {
    /// The remote session has a pty; output passes through unmodified and
    /// Ctrl-C is forwarded as a byte instead of handled locally.
    pub tty: bool,
    /// Replay the job's historical logs before (and into) the live phase.
    pub logs: bool,
    pub quiet: bool,
}

pub struct AttachSession {
    ops: Arc<dyn SessionOps>,
    terminal: Arc<dyn Terminal>,
    shared: SharedTerm,
    config: EngineConfig,
    opts: AttachOptions,
    interrupts: Option<mpsc::Receiver<()>>,
}

impl AttachSession {
    pub fn new(
        ops: Arc<dyn SessionOps>,
        terminal: Arc<dyn Terminal>,
        sink: Box<dyn TermSink>,
        config: EngineConfig,
        opts: AttachOptions,
    ) -> Self {
        let quiet = opts.quiet || config.quiet;
        Self {
            ops,
            terminal,
            shared: SessionTerm::shared(sink, quiet),
            config,
            opts,
            interrupts: None,
        }
    }

    /// Replace SIGINT delivery with an explicit event source. Used by
    /// embedders and tests; without it the session listens for Ctrl-C
    /// itself.
    pub fn with_interrupts(mut self, interrupts: mpsc::Receiver<()>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// Handle to the session's terminal state, shared with its tasks.
    pub fn state(&self) -> SharedTerm {
        self.shared.clone()
    }

    /// Drive the session to completion and resolve the local exit code.
    pub async fn run(mut self, keys: mpsc::Receiver<Key>) -> Result<i32> {
        let mut tailer: Option<JoinHandle<()>> = None;
        if self.opts.logs {
            let source = self.ops.monitor().await?;
            let shared = self.shared.clone();
            tailer = Some(tokio::spawn(async move {
                if let Err(err) = LogTailer::new(shared).run(source).await {
                    log::debug!("log replay ended early: {err}");
                }
            }));
        }

        let stream = match self.ops.open().await {
            Ok(stream) => stream,
            Err(err) => {
                if let Some(handle) = tailer {
                    cancel_and_await(handle).await;
                }
                return Err(err);
            }
        };

        let mut initial_size = None;
        if let Ok(size) = self.terminal.size() {
            match self.ops.resize(size).await {
                Ok(()) => initial_size = Some(size),
                Err(ControlError::InvalidState) => {
                    // The job finished before we could attach. Let the log
                    // replay run out, then report the outcome; there is no
                    // live phase to enter.
                    if let Some(handle) = tailer {
                        if let Err(err) = handle.await {
                            if !err.is_cancelled() {
                                log::warn!("log replay task failed: {err}");
                            }
                        }
                    }
                    return self.finish(None).await;
                }
                Err(err) => {
                    if let Some(handle) = tailer {
                        cancel_and_await(handle).await;
                    }
                    return Err(err);
                }
            }
        }

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        if let Some(handle) = tailer {
            handles.push(handle);
        }

        let (stdin_tx, stdin_rx) = mpsc::channel::<Key>(64);
        let (modal, modal_tx, modal_active) = ModalInput::new(8);
        handles.push(tokio::spawn(route_input(
            keys,
            stdin_tx,
            modal_tx,
            modal_active,
        )));
        handles.push(tokio::spawn(forward_stdin(stdin_rx, stream.input)));
        handles.push(tokio::spawn(write_output(
            stream.output,
            self.shared.clone(),
            self.opts.tty,
        )));

        let watcher = ResizeWatcher::new(self.config.resize_poll(), initial_size);
        let resize_ops = self.ops.clone();
        handles.push(tokio::spawn(watcher.run(
            self.terminal.clone(),
            move |size| {
                let ops = resize_ops.clone();
                async move {
                    match ops.resize(size).await {
                        Ok(()) => true,
                        // The job finished; nothing left to resize.
                        Err(ControlError::InvalidState) => false,
                        Err(err) => {
                            log::debug!("resize push failed: {err}");
                            true
                        }
                    }
                }
            },
        )));

        // The SIGINT pump is not supervised: it must outlive the live phase
        // so Ctrl-C still resolves the final status poll.
        let mut pump: Option<JoinHandle<()>> = None;
        let mut interrupts: Option<InterruptSource> = None;
        if !self.opts.tty {
            let rx = match self.interrupts.take() {
                Some(rx) => rx,
                None => {
                    let (tx, rx) = mpsc::channel(4);
                    pump = Some(tokio::spawn(pump_interrupts(tx)));
                    rx
                }
            };
            let source = interrupt_source(rx);
            interrupts = Some(source.clone());
            let controller = InterruptController::new(
                self.shared.clone(),
                self.ops.clone(),
                self.terminal.is_tty(),
            );
            handles.push(tokio::spawn(async move {
                if let Err(err) = controller.run(source, modal).await {
                    log::warn!("interrupt handling failed: {err}");
                }
            }));
        }

        supervise(handles).await;

        let outcome = self.finish(interrupts).await;
        if let Some(handle) = pump {
            cancel_and_await(handle).await;
        }
        outcome
    }

    /// Post-session phase: skip straight out on an explicit kill/detach,
    /// otherwise poll until the remote reports non-running and adopt its
    /// exit code. An interrupt during the poll kills the job and resolves
    /// the session; the dialog is gone at this point, so it is handled like
    /// the non-interactive path.
    async fn finish(&self, mut interrupts: Option<InterruptSource>) -> Result<i32> {
        let quiet = {
            let term = self.shared.lock().await;
            if term.state.skip_stopper {
                return Ok(EXIT_INTERRUPTED);
            }
            term.state.quiet
        };

        let label = self.ops.label();
        let mut progress =
            StopProgress::new(self.terminal.is_tty(), quiet, self.config.idle_tick());
        loop {
            let status = self.ops.status().await?;
            if !status.running {
                let code = status.exit_code.unwrap_or(EXIT_PLATFORM_ERROR);
                progress.done(&self.shared, &label, code).await;
                return Ok(code);
            }
            progress.running(&self.shared, &label).await;

            let mut source_closed = false;
            if let Some(source) = &interrupts {
                let mut rx = source.lock().await;
                tokio::select! {
                    _ = tokio::time::sleep(self.config.status_poll()) => {}
                    event = rx.recv() => match event {
                        Some(()) => {
                            self.ops.kill().await?;
                            return Ok(EXIT_INTERRUPTED);
                        }
                        None => source_closed = true,
                    },
                }
            } else {
                tokio::time::sleep(self.config.status_poll()).await;
            }
            if source_closed {
                interrupts = None;
            }
        }
    }
}

/// Forward SIGINT to the interrupt controller. The handler itself does
/// nothing but enqueue.
async fn pump_interrupts(tx: mpsc::Sender<()>) {
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if tx.send(()).await.is_err() {
            return;
        }
    }
}

/// Encode local key presses and push them to the remote stdin. A closed key
/// channel is local EOF; a closed remote input ends the task the same way.
async fn forward_stdin(mut keys: mpsc::Receiver<Key>, input: mpsc::Sender<Vec<u8>>) {
    while let Some(key) = keys.recv().await {
        let bytes = key.encode();
        if bytes.is_empty() {
            continue;
        }
        if input.send(bytes).await.is_err() {
            return;
        }
    }
}

/// Write remote output to the local terminal. The first fragment prints the
/// live banner and flips `attach_ready` under the write-mutex: that is the
/// handoff point that makes the log tailer stand down.
async fn write_output(mut output: ChunkStream, shared: SharedTerm, tty: bool) {
    let mut stdout_decoder = Utf8Decoder::new();
    let mut stderr_decoder = Utf8Decoder::new();
    while let Some(item) = output.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(err) => {
                log::debug!("remote output stream failed: {err}");
                return;
            }
        };
        // A tty stream is a single byte sequence; only the non-tty path
        // keeps one decoder per fileno.
        let decoder = if tty || chunk.stream == StreamId::Stdout {
            &mut stdout_decoder
        } else {
            &mut stderr_decoder
        };
        let mut text = decoder.feed(&chunk.payload);
        if chunk.is_final {
            text.push_str(&decoder.flush());
        }
        if !text.is_empty() {
            let mut term = shared.lock().await;
            if !term.state.attach_ready {
                let banner = if term.state.log_header_printed {
                    ATTACH_HEADER_AFTER_LOG
                } else {
                    ATTACH_HEADER
                };
                if !term.state.quiet && term.sink.write_str(banner).is_err() {
                    return;
                }
                term.state.attach_ready = true;
            }
            let written = if tty {
                term.sink.write_str(&text)
            } else {
                term.sink.write_stream(chunk.stream, &text)
            };
            if written.and_then(|_| term.sink.flush()).is_err() {
                return;
            }
        }
        if chunk.is_eof() {
            return;
        }
    }
}

/// One-line progress for the final status poll: a cursor re-addressed line
/// on a tty, heartbeat dots otherwise.
enum StopProgress {
    Quiet,
    Tty(TtyPrinter),
    Plain {
        printer: StreamPrinter,
        announced: bool,
    },
}

impl StopProgress {
    fn new(tty: bool, quiet: bool, idle: std::time::Duration) -> Self {
        if quiet {
            StopProgress::Quiet
        } else if tty {
            StopProgress::Tty(TtyPrinter::new())
        } else {
            StopProgress::Plain {
                printer: StreamPrinter::new(idle),
                announced: false,
            }
        }
    }

    async fn running(&mut self, shared: &SharedTerm, label: &str) {
        match self {
            StopProgress::Quiet => {}
            StopProgress::Tty(printer) => {
                let text = printer.print(&format!("{label}: running"), Some(0));
                emit(shared, &text).await;
            }
            StopProgress::Plain { printer, announced } => {
                let text = if *announced {
                    printer.tick()
                } else {
                    *announced = true;
                    printer.print(&format!("{label}: waiting to finish"))
                };
                emit(shared, &text).await;
            }
        }
    }

    async fn done(&mut self, shared: &SharedTerm, label: &str, code: i32) {
        match self {
            StopProgress::Quiet => {}
            StopProgress::Tty(printer) => {
                let text = printer.print(&format!("{label}: exited with code {code}"), Some(0));
                emit(shared, &text).await;
            }
            StopProgress::Plain { printer, .. } => {
                let mut text = printer.print(&format!("{label}: exited with code {code}"));
                text.push_str(&printer.close());
                emit(shared, &text).await;
            }
        }
    }
}

async fn emit(shared: &SharedTerm, text: &str) {
    if text.is_empty() {
        return;
    }
    let mut term = shared.lock().await;
    let _ = term.sink.write_str(text);
    let _ = term.sink.flush();
}
