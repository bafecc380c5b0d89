//! Scripted session-ops double shared by the engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::{chunk_stream, ChunkStream, DuplexStream, SessionOps};
use crate::error::{ControlError, Result};
use crate::models::{JobStatus, OutputChunk, TermSize};

pub(crate) struct FakeOps {
    killed: AtomicBool,
    statuses: Mutex<VecDeque<JobStatus>>,
    final_status: Mutex<JobStatus>,
    resize_errors: Mutex<VecDeque<ControlError>>,
    resizes: Mutex<Vec<TermSize>>,
    output: Mutex<Option<ChunkStream>>,
    monitor: Mutex<Option<ChunkStream>>,
    stdin_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl FakeOps {
    pub fn new(final_status: JobStatus) -> Self {
        Self {
            killed: AtomicBool::new(false),
            statuses: Mutex::new(VecDeque::new()),
            final_status: Mutex::new(final_status),
            resize_errors: Mutex::new(VecDeque::new()),
            resizes: Mutex::new(Vec::new()),
            output: Mutex::new(None),
            monitor: Mutex::new(None),
            stdin_rx: Mutex::new(None),
        }
    }

    pub fn running() -> Self {
        Self::new(JobStatus::running())
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Queue a status returned before the final one settles in.
    pub fn push_status(&self, status: JobStatus) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn fail_next_resize(&self, err: ControlError) {
        self.resize_errors.lock().unwrap().push_back(err);
    }

    pub fn resizes(&self) -> Vec<TermSize> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn set_output(&self, chunks: Vec<OutputChunk>) {
        *self.output.lock().unwrap() = Some(chunk_stream(chunks));
    }

    pub fn set_monitor(&self, chunks: Vec<OutputChunk>) {
        *self.monitor.lock().unwrap() = Some(chunk_stream(chunks));
    }

    pub fn take_stdin(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.stdin_rx.lock().unwrap().take()
    }
}

#[async_trait]
impl SessionOps for FakeOps {
    async fn open(&self) -> Result<DuplexStream> {
        let output = self
            .output
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Box::pin(futures::stream::pending()));
        let (tx, rx) = mpsc::channel(16);
        *self.stdin_rx.lock().unwrap() = Some(rx);
        Ok(DuplexStream { input: tx, output })
    }

    async fn monitor(&self) -> Result<ChunkStream> {
        Ok(self
            .monitor
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Box::pin(futures::stream::empty())))
    }

    async fn resize(&self, size: TermSize) -> Result<()> {
        self.resizes.lock().unwrap().push(size);
        match self.resize_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn status(&self) -> Result<JobStatus> {
        if let Some(status) = self.statuses.lock().unwrap().pop_front() {
            return Ok(status);
        }
        Ok(*self.final_status.lock().unwrap())
    }

    async fn kill(&self) -> Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        *self.final_status.lock().unwrap() = JobStatus::exited(137);
        Ok(())
    }

    fn label(&self) -> String {
        "job test-job".to_string()
    }
}
