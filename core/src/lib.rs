//! Attach/exec session engine for remote compute jobs.
//!
//! The engine is transport-agnostic: a backend implements [`client::JobControl`]
//! (and optionally [`client::ExecControl`]), the host supplies a
//! [`term::Terminal`] and [`term::TermSink`], and [`attach::AttachSession`]
//! multiplexes log replay, live output, stdin forwarding, resize propagation
//! and interrupt handling over them.

pub mod attach;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod input;
pub mod interrupt;
pub mod models;
pub mod printer;
pub mod resize;
pub mod state;
pub mod tail;
pub mod task;
pub mod term;

#[cfg(test)]
pub(crate) mod testing;
