//! Coalescing writer for the handshake journal
//!
//! Handshake events arriving within one window are collected, sorted and
//! appended to the `JournalStore` together. A single actor owns the pending
//! batch, so windows never overlap and the store sees one writer.

mod writer;

pub use writer::{FlushReport, JournalWriter, WriterConfig, WriterError, WriterRunner};
