//! Contracts for the out-of-process job-control collaborators.
//!
//! The engine never speaks the wire protocol itself; it drives these traits.
//! `SessionOps` is the narrowed seam `AttachSession` runs against, with
//! adapters for plain job attach and for exec sessions so one supervise path
//! serves both.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{JobStatus, OutputChunk, TermSize};

/// Lazy, finite sequence of output chunks, terminated by an empty final
/// chunk.
pub type ChunkStream = BoxStream<'static, Result<OutputChunk>>;

/// A bidirectional channel to a running remote process: locally-typed bytes
/// go down `input`, demultiplexed remote output comes back on `output`.
pub struct DuplexStream {
    pub input: mpsc::Sender<Vec<u8>>,
    pub output: ChunkStream,
}

#[async_trait]
pub trait JobControl: Send + Sync {
    /// Open a duplex stream to the job's stdio. Fails if the job is not in a
    /// state that can be attached.
    async fn attach(&self, job_id: &str) -> Result<DuplexStream>;

    /// Replay the job's historical log output.
    async fn monitor(&self, job_id: &str) -> Result<ChunkStream>;

    /// Push a new terminal size. Fails with `InvalidState` once the job has
    /// finished.
    async fn resize(&self, job_id: &str, size: TermSize) -> Result<()>;

    async fn status(&self, job_id: &str) -> Result<JobStatus>;

    async fn kill(&self, job_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ExecControl: Send + Sync {
    /// Register a one-off command inside a running job, returning an exec id.
    async fn exec_create(&self, job_id: &str, command: &[String], tty: bool) -> Result<String>;

    async fn exec_start(&self, exec_id: &str) -> Result<DuplexStream>;

    async fn exec_resize(&self, exec_id: &str, size: TermSize) -> Result<()>;

    async fn exec_inspect(&self, exec_id: &str) -> Result<JobStatus>;
}

/// What `AttachSession` needs from a session target, whichever variant it is.
#[async_trait]
pub trait SessionOps: Send + Sync {
    async fn open(&self) -> Result<DuplexStream>;
    async fn monitor(&self) -> Result<ChunkStream>;
    async fn resize(&self, size: TermSize) -> Result<()>;
    async fn status(&self) -> Result<JobStatus>;
    async fn kill(&self) -> Result<()>;
    fn label(&self) -> String;
}

/// Attach to a job's own stdio.
pub struct JobOps<S> {
    service: Arc<S>,
    job_id: String,
}

impl<S> JobOps<S> {
    pub fn new(service: Arc<S>, job_id: impl Into<String>) -> Self {
        Self {
            service,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl<S: JobControl> SessionOps for JobOps<S> {
    async fn open(&self) -> Result<DuplexStream> {
        self.service.attach(&self.job_id).await
    }

    async fn monitor(&self) -> Result<ChunkStream> {
        self.service.monitor(&self.job_id).await
    }

    async fn resize(&self, size: TermSize) -> Result<()> {
        self.service.resize(&self.job_id, size).await
    }

    async fn status(&self) -> Result<JobStatus> {
        self.service.status(&self.job_id).await
    }

    async fn kill(&self) -> Result<()> {
        self.service.kill(&self.job_id).await
    }

    fn label(&self) -> String {
        format!("job {}", self.job_id)
    }
}

/// Attach to a one-off command running inside an existing job. The exec has
/// no historical log stream; a kill from the interrupt dialog targets the
/// owning job.
pub struct ExecOps<S> {
    service: Arc<S>,
    job_id: String,
    exec_id: String,
}

impl<S> ExecOps<S> {
    pub fn new(service: Arc<S>, job_id: impl Into<String>, exec_id: impl Into<String>) -> Self {
        Self {
            service,
            job_id: job_id.into(),
            exec_id: exec_id.into(),
        }
    }
}

#[async_trait]
impl<S: JobControl + ExecControl> SessionOps for ExecOps<S> {
    async fn open(&self) -> Result<DuplexStream> {
        self.service.exec_start(&self.exec_id).await
    }

    async fn monitor(&self) -> Result<ChunkStream> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn resize(&self, size: TermSize) -> Result<()> {
        self.service.exec_resize(&self.exec_id, size).await
    }

    async fn status(&self) -> Result<JobStatus> {
        self.service.exec_inspect(&self.exec_id).await
    }

    async fn kill(&self) -> Result<()> {
        JobControl::kill(self.service.as_ref(), &self.job_id).await
    }

    fn label(&self) -> String {
        format!("exec {} in job {}", self.exec_id, self.job_id)
    }
}

/// Helper for backends assembling a `ChunkStream` from owned chunks.
pub fn chunk_stream(chunks: Vec<OutputChunk>) -> ChunkStream {
    Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
}
