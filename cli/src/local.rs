//! Local PTY-backed job service.
//!
//! `LocalJobService` is a concrete `JobControl`/`ExecControl` backend that
//! runs jobs under a local pseudo-terminal. Each job owns one reader pump
//! thread that fans output into a bounded ring buffer (served to `monitor`)
//! and into any live attach taps. A pty merges stdout and stderr, so every
//! chunk carries `StreamId::Stdout`.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use futures::StreamExt;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use uuid::Uuid;

use jobmux_core::client::{chunk_stream, ChunkStream, DuplexStream, ExecControl, JobControl};
use jobmux_core::error::{ControlError, Result};
use jobmux_core::models::{JobStatus, OutputChunk, StreamId, TermSize};

pub struct RingBuffer {
    buf: VecDeque<u8>,
    cap: usize,
}

impl RingBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if data.len() >= self.cap {
            self.buf.clear();
            let start = data.len() - self.cap;
            self.buf.extend(data[start..].iter().copied());
            return;
        }
        while self.buf.len() + data.len() > self.cap {
            self.buf.pop_front();
        }
        self.buf.extend(data.iter().copied());
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }
}

struct JobEntry {
    status: JobStatus,
    killer: Box<dyn ChildKiller + Send + Sync>,
    buffer: RingBuffer,
    taps: Vec<mpsc::Sender<OutputChunk>>,
    master: Box<dyn MasterPty + Send>,
    writer: Option<Box<dyn Write + Send>>,
    child_pid: Option<u32>,
    /// The reader pump reached end-of-output; new taps would never see an
    /// eof chunk, so attach serves the buffer snapshot instead.
    output_done: bool,
}

struct ExecEntry {
    job_id: String,
    command: Vec<String>,
    tty: bool,
    started: bool,
}

#[derive(Clone)]
pub struct LocalJobService {
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
    execs: Arc<Mutex<HashMap<String, ExecEntry>>>,
    buffer_cap: usize,
}

impl LocalJobService {
    pub fn new(buffer_cap: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            execs: Arc::new(Mutex::new(HashMap::new())),
            buffer_cap,
        }
    }

    /// Spawn `command` under `sh -c` on a fresh pty, returning the job id.
    pub fn spawn(&self, command: &str, size: TermSize) -> Result<String> {
        let mut cmd = CommandBuilder::new("sh");
        cmd.arg("-c");
        cmd.arg(command);
        let job_id = Uuid::new_v4().to_string();
        self.spawn_command(&job_id, cmd, size)?;
        Ok(job_id)
    }

    fn spawn_command(&self, job_id: &str, cmd: CommandBuilder, size: TermSize) -> Result<()> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(backend)?;

        let mut child = pair.slave.spawn_command(cmd).map_err(backend)?;
        let child_pid = child.process_id();
        let killer = child.clone_killer();

        // Take the writer immediately; the master refuses a second take.
        let writer = pair.master.take_writer().map_err(backend)?;
        let reader = pair.master.try_clone_reader().map_err(backend)?;

        let entry = JobEntry {
            status: JobStatus::running(),
            killer,
            buffer: RingBuffer::new(self.buffer_cap),
            taps: Vec::new(),
            master: pair.master,
            writer: Some(writer),
            child_pid,
            output_done: false,
        };
        self.jobs
            .lock()
            .map_err(|_| ControlError::Backend("job table poisoned".to_string()))?
            .insert(job_id.to_string(), entry);

        self.start_reader_pump(job_id.to_string(), reader);

        let jobs = Arc::clone(&self.jobs);
        let waited_id = job_id.to_string();
        tokio::task::spawn_blocking(move || {
            let status = child.wait();
            let mut guard = match jobs.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if let Some(entry) = guard.get_mut(&waited_id) {
                entry.status = match status {
                    Ok(exit) => JobStatus::exited(exit.exit_code() as i32),
                    Err(_) => JobStatus::exited(1),
                };
            }
        });

        Ok(())
    }

    fn start_reader_pump(&self, job_id: String, mut reader: Box<dyn Read + Send>) {
        let jobs = Arc::clone(&self.jobs);
        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                // A read error is the normal end on Linux: the master raises
                // EIO once the slave side is fully closed.
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };
                let mut guard = match jobs.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                let Some(entry) = guard.get_mut(&job_id) else {
                    return;
                };
                entry.buffer.push(&buf[..n]);
                let chunk = OutputChunk::data(StreamId::Stdout, buf[..n].to_vec());
                entry
                    .taps
                    .retain(|tap| tap.blocking_send(chunk.clone()).is_ok());
            }
            if let Ok(mut guard) = jobs.lock() {
                if let Some(entry) = guard.get_mut(&job_id) {
                    entry.output_done = true;
                    for tap in entry.taps.drain(..) {
                        let _ = tap.blocking_send(OutputChunk::eof(StreamId::Stdout));
                    }
                }
            }
        });
    }

    fn attach_entry(&self, id: &str) -> Result<DuplexStream> {
        let (output, writer) = {
            let mut guard = self.lock_jobs()?;
            let entry = guard
                .get_mut(id)
                .ok_or_else(|| ControlError::Backend(format!("unknown job {id}")))?;
            let writer = entry.writer.take();
            let output = if entry.output_done {
                let snapshot = entry.buffer.snapshot();
                let mut chunks = Vec::new();
                if !snapshot.is_empty() {
                    chunks.push(OutputChunk::data(StreamId::Stdout, snapshot));
                }
                chunks.push(OutputChunk::eof(StreamId::Stdout));
                chunk_stream(chunks)
            } else {
                // Snapshot and tap registration happen under the same lock
                // the pump appends under, so nothing is missed or repeated.
                let snapshot = entry.buffer.snapshot();
                let (tap, rx) = mpsc::channel(64);
                entry.taps.push(tap);
                let mut lead: Vec<Result<OutputChunk>> = Vec::new();
                if !snapshot.is_empty() {
                    lead.push(Ok(OutputChunk::data(StreamId::Stdout, snapshot)));
                }
                let live = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|chunk| (Ok(chunk), rx))
                });
                Box::pin(futures::stream::iter(lead).chain(live)) as ChunkStream
            };
            (output, writer)
        };

        // Pty writes block when the child stops draining its input, so they
        // run on their own thread with no table lock held.
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(mut writer) = writer {
            thread::spawn(move || {
                while let Some(bytes) = input_rx.blocking_recv() {
                    if writer.write_all(&bytes).and_then(|_| writer.flush()).is_err() {
                        return;
                    }
                }
            });
        }

        Ok(DuplexStream {
            input: input_tx,
            output,
        })
    }

    fn resize_entry(&self, id: &str, size: TermSize) -> Result<()> {
        let guard = self.lock_jobs()?;
        let entry = guard
            .get(id)
            .ok_or_else(|| ControlError::Backend(format!("unknown job {id}")))?;
        if !entry.status.running {
            return Err(ControlError::InvalidState);
        }
        entry
            .master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(backend)
    }

    fn status_entry(&self, id: &str) -> Result<JobStatus> {
        let guard = self.lock_jobs()?;
        guard
            .get(id)
            .map(|entry| entry.status)
            .ok_or_else(|| ControlError::Backend(format!("unknown job {id}")))
    }

    fn kill_entry(&self, id: &str) -> Result<()> {
        let mut guard = self.lock_jobs()?;
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| ControlError::Backend(format!("unknown job {id}")))?;
        entry.killer.kill().map_err(ControlError::Io)
    }

    /// Signal every live child, for process-level cleanup handlers.
    pub fn terminate_all(&self, signal: i32) {
        let Ok(guard) = self.jobs.lock() else { return };
        for entry in guard.values() {
            if !entry.status.running {
                continue;
            }
            if let Some(pid) = entry.child_pid {
                unsafe {
                    libc::kill(pid as libc::pid_t, signal);
                }
            } else {
                let _ = entry.killer.clone_killer().kill();
            }
        }
    }

    fn lock_jobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, JobEntry>>> {
        self.jobs
            .lock()
            .map_err(|_| ControlError::Backend("job table poisoned".to_string()))
    }
}

#[async_trait]
impl JobControl for LocalJobService {
    async fn attach(&self, job_id: &str) -> Result<DuplexStream> {
        self.attach_entry(job_id)
    }

    async fn monitor(&self, job_id: &str) -> Result<ChunkStream> {
        let guard = self.lock_jobs()?;
        let entry = guard
            .get(job_id)
            .ok_or_else(|| ControlError::Backend(format!("unknown job {job_id}")))?;
        let snapshot = entry.buffer.snapshot();
        let mut chunks = Vec::new();
        if !snapshot.is_empty() {
            chunks.push(OutputChunk::data(StreamId::Stdout, snapshot));
        }
        chunks.push(OutputChunk::eof(StreamId::Stdout));
        Ok(chunk_stream(chunks))
    }

    async fn resize(&self, job_id: &str, size: TermSize) -> Result<()> {
        self.resize_entry(job_id, size)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        self.status_entry(job_id)
    }

    async fn kill(&self, job_id: &str) -> Result<()> {
        self.kill_entry(job_id)
    }
}

#[async_trait]
impl ExecControl for LocalJobService {
    async fn exec_create(&self, job_id: &str, command: &[String], tty: bool) -> Result<String> {
        {
            let guard = self.lock_jobs()?;
            let entry = guard
                .get(job_id)
                .ok_or_else(|| ControlError::Backend(format!("unknown job {job_id}")))?;
            if !entry.status.running {
                return Err(ControlError::InvalidState);
            }
        }
        if command.is_empty() {
            return Err(ControlError::Backend("empty exec command".to_string()));
        }
        let exec_id = Uuid::new_v4().to_string();
        self.execs
            .lock()
            .map_err(|_| ControlError::Backend("exec table poisoned".to_string()))?
            .insert(
                exec_id.clone(),
                ExecEntry {
                    job_id: job_id.to_string(),
                    command: command.to_vec(),
                    tty,
                    started: false,
                },
            );
        Ok(exec_id)
    }

    async fn exec_start(&self, exec_id: &str) -> Result<DuplexStream> {
        let command = {
            let mut guard = self
                .execs
                .lock()
                .map_err(|_| ControlError::Backend("exec table poisoned".to_string()))?;
            let entry = guard
                .get_mut(exec_id)
                .ok_or_else(|| ControlError::Backend(format!("unknown exec {exec_id}")))?;
            if entry.started {
                return Err(ControlError::InvalidState);
            }
            entry.started = true;
            log::debug!("starting exec {exec_id} in job {} (tty={})", entry.job_id, entry.tty);
            entry.command.clone()
        };
        let mut cmd = CommandBuilder::new(&command[0]);
        for arg in &command[1..] {
            cmd.arg(arg);
        }
        // The exec process gets its own job entry under the exec id, so the
        // resize/status/kill plumbing is shared with plain jobs.
        self.spawn_command(exec_id, cmd, TermSize::new(80, 24))?;
        self.attach_entry(exec_id)
    }

    async fn exec_resize(&self, exec_id: &str, size: TermSize) -> Result<()> {
        self.resize_entry(exec_id, size)
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<JobStatus> {
        {
            let guard = self
                .execs
                .lock()
                .map_err(|_| ControlError::Backend("exec table poisoned".to_string()))?;
            let entry = guard
                .get(exec_id)
                .ok_or_else(|| ControlError::Backend(format!("unknown exec {exec_id}")))?;
            if !entry.started {
                return Ok(JobStatus::running());
            }
        }
        self.status_entry(exec_id)
    }
}

fn backend(err: anyhow::Error) -> ControlError {
    ControlError::Backend(err.to_string())
}
