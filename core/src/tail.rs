//! Historical log replay for attach sessions.
//!
//! The tailer streams the job's stored log output to the terminal until the
//! live attach produces its first chunk. From that point on the remaining
//! tail is discarded: the live stream owns the terminal and replaying more
//! history would only duplicate output.

use futures::StreamExt;

use crate::client::ChunkStream;
use crate::decode::Utf8Decoder;
use crate::error::Result;
use crate::state::SharedTerm;

pub const LOG_HEADER: &str = "=== job log follows ===\n";

pub struct LogTailer {
    shared: SharedTerm,
}

impl LogTailer {
    pub fn new(shared: SharedTerm) -> Self {
        Self { shared }
    }

    /// Replay `source` until end-of-stream or until live attach output takes
    /// over. The attach_ready check happens under the session write-mutex,
    /// so a fragment that was already decoded when the handoff happened is
    /// still dropped.
    pub async fn run(self, mut source: ChunkStream) -> Result<()> {
        let mut decoder = Utf8Decoder::new();
        while let Some(chunk) = source.next().await {
            let chunk = chunk?;
            let mut text = decoder.feed(&chunk.payload);
            if chunk.is_final {
                text.push_str(&decoder.flush());
            }
            if !text.is_empty() {
                let mut term = self.shared.lock().await;
                if term.state.attach_ready {
                    return Ok(());
                }
                if !term.state.log_header_printed {
                    if !term.state.quiet {
                        term.sink.write_str(LOG_HEADER)?;
                    }
                    term.state.log_header_printed = true;
                }
                term.sink.write_str(&text)?;
                term.sink.flush()?;
            }
            if chunk.is_final {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::chunk_stream;
    use crate::models::{OutputChunk, StreamId};
    use crate::state::SessionTerm;
    use crate::term::testing::{rendered, MemSink};

    fn log_chunks(parts: &[&[u8]]) -> ChunkStream {
        let mut chunks: Vec<OutputChunk> = parts
            .iter()
            .map(|payload| OutputChunk::data(StreamId::Stdout, payload.to_vec()))
            .collect();
        chunks.push(OutputChunk::eof(StreamId::Stdout));
        chunk_stream(chunks)
    }

    #[tokio::test]
    async fn replays_log_with_a_single_header() {
        let (sink, writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), false);

        LogTailer::new(shared)
            .run(log_chunks(&[b"line one\n", b"line two\n"]))
            .await
            .unwrap();

        let out = rendered(&writes);
        assert_eq!(out, format!("{LOG_HEADER}line one\nline two\n"));
    }

    #[tokio::test]
    async fn quiet_mode_suppresses_the_header_only() {
        let (sink, writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), true);

        LogTailer::new(shared)
            .run(log_chunks(&[b"payload\n"]))
            .await
            .unwrap();

        assert_eq!(rendered(&writes), "payload\n");
    }

    #[tokio::test]
    async fn abandons_once_attach_is_ready() {
        let (sink, writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), false);
        shared.lock().await.state.attach_ready = true;

        LogTailer::new(shared)
            .run(log_chunks(&[b"stale tail\n"]))
            .await
            .unwrap();

        assert_eq!(rendered(&writes), "");
    }

    #[tokio::test]
    async fn flushes_a_split_multibyte_sequence_at_end_of_stream() {
        let (sink, writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), true);

        // "é" split across the last data chunk and end-of-stream.
        let chunks = vec![
            OutputChunk::data(StreamId::Stdout, vec![b'a', 0xC3]),
            OutputChunk::eof(StreamId::Stdout),
        ];
        LogTailer::new(shared)
            .run(chunk_stream(chunks))
            .await
            .unwrap();

        assert_eq!(rendered(&writes), "a\u{FFFD}");
    }

    #[tokio::test]
    async fn marks_header_state_for_the_live_banner() {
        let (sink, _writes) = MemSink::new();
        let shared = SessionTerm::shared(Box::new(sink), false);

        LogTailer::new(shared.clone())
            .run(log_chunks(&[b"x"]))
            .await
            .unwrap();

        assert!(shared.lock().await.state.log_header_printed);
    }
}
