// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retrieval of the NVMe Persistent Event Log.
//!
//! The log is read through a device-side reporting context that must be
//! established before reading and released afterwards. A
//! [`PersistentEventLogSession`] tracks what it knows about that context and
//! sequences the Get Log Page commands for each step:
//!
//! * [`establish`](PersistentEventLogSession::establish) creates the context
//!   (or adopts one that already exists).
//! * [`read_log`](PersistentEventLogSession::read_log) reads the 512-byte
//!   header, then the rest of the log in bounded chunks.
//! * [`release`](PersistentEventLogSession::release) discards the context.
//! * [`check_context`](PersistentEventLogSession::check_context) asks the
//!   device whether a context exists, without changing it.
//!
//! Events are decoded from a completed log with [`walk_events`].

mod event;
mod header;
mod session;
#[cfg(test)]
mod tests;

pub use event::walk_events;
pub use event::EventDetails;
pub use event::PersistentEvent;
pub use event::PowerOnResetDescriptor;
pub use header::PelHeader;
pub use header::PersistentEventLog;
pub use session::PersistentEventLogSession;

use field_codec::FieldError;
use field_codec::FieldId;
use field_codec::FieldValues;
use nvme_passthru::admin::CommandError;
use nvme_passthru::BuildError;
use nvme_passthru::CompletionOutcome;
use nvme_passthru::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Default number of bytes read per Get Log Page command.
pub const DEFAULT_CHUNK_SIZE: usize = 16384;

/// Default upper bound on the log length a session will read.
pub const DEFAULT_MAX_LOG_LEN: u64 = 256 << 20;

/// What the session believes about the device-side reporting context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// No context exists.
    NotEstablished,
    /// A context exists and the log can be read.
    Established,
    /// A command failed in a way that leaves the context state unknown. Use
    /// [`PersistentEventLogSession::check_context`] before continuing.
    Unknown,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct PelConfig {
    /// Bytes per read after the header, when the controller supports
    /// extended Get Log Page data. A non-zero multiple of 4.
    pub chunk_size: usize,
    /// Per-command timeout. `None` uses the transport default.
    pub timeout: Option<Duration>,
    /// Largest log length, after rounding to 512 bytes, that will be read.
    /// Longer logs fail with [`PelError::LogTooLarge`] before any data past
    /// the header is requested.
    pub max_log_len: u64,
}

impl Default for PelConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: None,
            max_log_len: DEFAULT_MAX_LOG_LEN,
        }
    }
}

/// An error retrieving the Persistent Event Log.
#[derive(Debug, Error)]
pub enum PelError {
    /// Establishing the reporting context failed with a status other than
    /// the one reporting an existing context.
    #[error("failed to establish the reporting context: {0}")]
    EstablishFailed(CompletionOutcome),
    /// An event extends past the end of the log.
    #[error(
        "log truncated: event {index} at offset {offset} needs {needed} bytes, {available} remain"
    )]
    TruncatedLog {
        /// Zero based index of the event.
        index: u32,
        /// Byte offset of the event in the log.
        offset: usize,
        /// Bytes the event needs.
        needed: usize,
        /// Bytes left in the log.
        available: usize,
    },
    /// A previous failure left the context state unknown.
    #[error("reporting context state is unknown")]
    UnknownContextState,
    /// There is no reporting context to read from.
    #[error("no reporting context is established")]
    ContextNotEstablished,
    /// A read of the log failed. Progress up to `offset` is kept.
    #[error("log read at offset {offset} failed: {outcome}")]
    ReadFailed {
        /// Log offset of the failed read.
        offset: u64,
        /// The completion status.
        outcome: CompletionOutcome,
    },
    /// The reported log length exceeds the session's limit, or the log
    /// cannot be read in a single command and the controller does not
    /// support offsets.
    #[error("log of {len} bytes is too large to read")]
    LogTooLarge {
        /// The rounded log length, or the reported length if rounding
        /// overflows.
        len: u64,
    },
    /// The controller does not report Persistent Event Log support.
    #[error("persistent event log is not supported")]
    Unsupported,
    /// The chunk size is not a non-zero multiple of 4.
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(usize),
    /// The log header or an event header could not be decoded.
    #[error("malformed log header")]
    Header(#[source] FieldError),
    /// A command could not be built.
    #[error("failed to build command")]
    Build(#[source] BuildError),
    /// The transport failed; the context state is now unknown.
    #[error("transport error")]
    Transport(#[source] TransportError),
    /// Identify Controller failed while probing.
    #[error("failed to identify the controller")]
    Identify(#[source] CommandError),
}

/// Reads an integer field. Fields of a successfully decoded table are always
/// present.
fn uint<F: FieldId>(values: &FieldValues<F>, id: F) -> u64 {
    values.get_u64(id).unwrap_or_default()
}

fn text<F: FieldId>(values: &FieldValues<F>, id: F) -> String {
    values.get_text(id).unwrap_or_default().to_owned()
}
