// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::header::PelHeader;
use crate::header::PersistentEventLog;
use crate::ContextState;
use crate::PelConfig;
use crate::PelError;
use nvme_passthru::admin::identify_controller;
use nvme_passthru::admin::GetLogPage;
use nvme_passthru::issue;
use nvme_passthru::CompletionOutcome;
use nvme_passthru::DataBuffer;
use nvme_passthru::DeviceTransport;
use nvme_passthru::StatusBucket;
use nvme_spec::pel::PelAction;
use nvme_spec::pel::PEL_HEADER_LEN;
use nvme_spec::pel::PEL_SIZE_UNIT;
use nvme_spec::LogPageIdentifier;
use nvme_spec::NSID_ALL;

/// Largest transfer a Get Log Page without NUMDU can describe.
const MAX_NUMDL_TRANSFER: u64 = 0x1_0000 * 4;

/// A partially read log.
struct ReadProgress {
    header: PelHeader,
    /// Rounded log length.
    total_len: u64,
    /// Next log offset to read. Everything before it is in `data`.
    offset: u64,
    data: Vec<u8>,
}

/// Client-side state for reading the Persistent Event Log of one controller.
///
/// The session owns the buffer that every read lands in, so only one
/// command is in flight at a time. State changes only through
/// [`establish`](Self::establish), [`read_log`](Self::read_log),
/// [`release`](Self::release), and [`check_context`](Self::check_context).
///
/// Dropping a session does not release the device-side context.
pub struct PersistentEventLogSession {
    config: PelConfig,
    state: ContextState,
    extended: bool,
    max_log_len: u64,
    buffer: DataBuffer,
    progress: Option<ReadProgress>,
}

impl std::fmt::Debug for PersistentEventLogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentEventLogSession")
            .field("state", &self.state)
            .field("extended", &self.extended)
            .field("max_log_len", &self.max_log_len)
            .field("total_log_length", &self.total_log_length())
            .field("current_byte_offset", &self.current_byte_offset())
            .finish()
    }
}

impl PersistentEventLogSession {
    /// Creates a session for a controller. `extended_capacity_supported` is
    /// the extended data bit of the controller's log page attributes; see
    /// [`probe`](Self::probe).
    pub fn new(extended_capacity_supported: bool, config: PelConfig) -> Result<Self, PelError> {
        if config.chunk_size == 0 || config.chunk_size % 4 != 0 {
            return Err(PelError::InvalidChunkSize(config.chunk_size));
        }
        let buffer = DataBuffer::new(config.chunk_size.max(PEL_HEADER_LEN));
        Ok(Self {
            max_log_len: config.max_log_len,
            config,
            state: ContextState::NotEstablished,
            extended: extended_capacity_supported,
            buffer,
            progress: None,
        })
    }

    /// Creates a session after checking the controller's Persistent Event
    /// Log support with Identify Controller. A non-zero reported log size
    /// further limits the log length the session will read.
    pub fn probe<T: DeviceTransport + ?Sized>(
        transport: &mut T,
        config: PelConfig,
    ) -> Result<Self, PelError> {
        let identity = identify_controller(transport).map_err(PelError::Identify)?;
        if !identity.lpa.persistent_event() {
            return Err(PelError::Unsupported);
        }
        tracing::debug!(
            extended = identity.lpa.extended_data(),
            pels = identity.pels,
            "persistent event log supported"
        );
        let mut session = Self::new(identity.lpa.extended_data(), config)?;
        if identity.pels != 0 {
            session.max_log_len = session
                .max_log_len
                .min(u64::from(identity.pels) * PEL_SIZE_UNIT);
        }
        Ok(session)
    }

    /// What the session believes about the device-side context.
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Whether reads after the header use log page offsets.
    pub fn extended_capacity_supported(&self) -> bool {
        self.extended
    }

    /// The longest log, after rounding, that the session will read.
    pub fn max_log_len(&self) -> u64 {
        self.max_log_len
    }

    /// The rounded log length of the read in progress.
    pub fn total_log_length(&self) -> Option<u64> {
        self.progress.as_ref().map(|p| p.total_len)
    }

    /// The event count of the read in progress.
    pub fn total_event_count(&self) -> Option<u32> {
        self.progress.as_ref().map(|p| p.header.total_events)
    }

    /// The offset the next read of the log will start at. Zero when no read
    /// is in progress.
    pub fn current_byte_offset(&self) -> u64 {
        self.progress.as_ref().map_or(0, |p| p.offset)
    }

    fn set_state(&mut self, state: ContextState) {
        if state != self.state {
            tracing::debug!(from = ?self.state, to = ?state, "reporting context state");
        }
        self.state = state;
        if state == ContextState::NotEstablished {
            self.progress = None;
        }
    }

    /// Issues one Get Log Page for the Persistent Event Log into the session
    /// buffer. A transport failure makes the context state unknown.
    fn get_log<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        action: PelAction,
        offset: u64,
        len: usize,
    ) -> Result<CompletionOutcome, PelError> {
        if self.buffer.len() < len {
            self.buffer = DataBuffer::new(len);
        }
        let mut command = GetLogPage {
            lsp: action.0,
            nsid: NSID_ALL,
            offset,
            timeout: self.config.timeout,
            ..GetLogPage::new(LogPageIdentifier::PERSISTENT_EVENT, len)
        }
        .command(Some(&mut self.buffer))
        .map_err(PelError::Build)?;

        let result = issue(transport, &mut command);
        drop(command);
        match result {
            Ok(outcome) => {
                tracing::trace!(?action, offset, len, %outcome, "get log page");
                Ok(outcome)
            }
            Err(err) => {
                self.set_state(ContextState::Unknown);
                Err(PelError::Transport(err))
            }
        }
    }

    /// Establishes the reporting context, discarding any read progress.
    ///
    /// An existing context, reported as a Command Sequence Error, is
    /// adopted.
    pub fn establish<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), PelError> {
        self.progress = None;
        let outcome = self.get_log(
            transport,
            PelAction::ESTABLISH_CONTEXT_AND_READ,
            0,
            PEL_HEADER_LEN,
        )?;
        if outcome.is_success() {
            self.set_state(ContextState::Established);
        } else if outcome.is_command_sequence_error() {
            tracing::warn!(%outcome, "reporting context already established");
            self.set_state(ContextState::Established);
        } else {
            self.set_state(ContextState::Unknown);
            return Err(PelError::EstablishFailed(outcome));
        }
        Ok(())
    }

    /// Reads the whole log.
    ///
    /// Requires an established context. If a previous read failed part way,
    /// reading resumes at [`current_byte_offset`](Self::current_byte_offset).
    pub fn read_log<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<PersistentEventLog, PelError> {
        match self.state {
            ContextState::Established => {}
            ContextState::NotEstablished => return Err(PelError::ContextNotEstablished),
            ContextState::Unknown => return Err(PelError::UnknownContextState),
        }
        self.read_log_unchecked(transport)
    }

    /// Reads the whole log without consulting the recorded context state.
    /// The state is updated from the device's answer to the header read.
    pub fn read_log_unchecked<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<PersistentEventLog, PelError> {
        let mut progress = match self.progress.take() {
            Some(progress) => progress,
            None => self.read_header(transport)?,
        };
        match self.read_remaining(transport, &mut progress) {
            Ok(()) => {
                progress
                    .data
                    .truncate(progress.header.total_log_length as usize);
                tracing::debug!(
                    len = progress.total_len,
                    events = progress.header.total_events,
                    "read persistent event log"
                );
                Ok(PersistentEventLog::new(progress.header, progress.data))
            }
            Err(err) => {
                // Keep progress for a resume unless the context is gone.
                if self.state != ContextState::NotEstablished {
                    self.progress = Some(progress);
                }
                Err(err)
            }
        }
    }

    fn read_header<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<ReadProgress, PelError> {
        let outcome = self.get_log(transport, PelAction::READ_LOG_DATA, 0, PEL_HEADER_LEN)?;
        self.check_read(outcome, 0)?;
        self.set_state(ContextState::Established);

        let data = self.buffer.as_bytes()[..PEL_HEADER_LEN].to_vec();
        let header = PelHeader::decode(&data).map_err(PelError::Header)?;
        let total_len = match header.aligned_log_length() {
            Some(len) if len <= self.max_log_len => len,
            len => {
                let len = len.unwrap_or(header.total_log_length);
                tracing::warn!(
                    total_log_length = header.total_log_length,
                    max = self.max_log_len,
                    "persistent event log length out of range"
                );
                return Err(PelError::LogTooLarge { len });
            }
        };
        tracing::debug!(
            total_log_length = header.total_log_length,
            total_len,
            events = header.total_events,
            "persistent event log header"
        );
        Ok(ReadProgress {
            header,
            total_len,
            offset: PEL_HEADER_LEN as u64,
            data,
        })
    }

    /// Fails on anything but success. A Command Sequence Error means the
    /// context is gone.
    fn check_read(&mut self, outcome: CompletionOutcome, offset: u64) -> Result<(), PelError> {
        if outcome.is_success() {
            return Ok(());
        }
        if outcome.is_command_sequence_error() {
            self.set_state(ContextState::NotEstablished);
            return Err(PelError::ContextNotEstablished);
        }
        if outcome.bucket() == StatusBucket::Fatal {
            tracing::error!(offset, %outcome, "persistent event log read aborted");
        } else {
            tracing::warn!(offset, %outcome, "persistent event log read failed");
        }
        Err(PelError::ReadFailed { offset, outcome })
    }

    fn read_remaining<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        progress: &mut ReadProgress,
    ) -> Result<(), PelError> {
        if !self.extended {
            if progress.offset >= progress.total_len {
                return Ok(());
            }
            // Without log page offsets the only option is to read the whole
            // log, header included, in one command.
            if progress.total_len > MAX_NUMDL_TRANSFER {
                return Err(PelError::LogTooLarge {
                    len: progress.total_len,
                });
            }
            let len = progress.total_len as usize;
            let outcome = self.get_log(transport, PelAction::READ_LOG_DATA, 0, len)?;
            self.check_read(outcome, 0)?;
            progress.data.clear();
            progress
                .data
                .extend_from_slice(&self.buffer.as_bytes()[..len]);
            progress.offset = progress.total_len;
            return Ok(());
        }

        while progress.offset < progress.total_len {
            let remaining = (progress.total_len - progress.offset) as usize;
            let len = remaining.min(self.config.chunk_size).next_multiple_of(4);
            let outcome = self.get_log(transport, PelAction::READ_LOG_DATA, progress.offset, len)?;
            self.check_read(outcome, progress.offset)?;

            let chunk = &self.buffer.as_bytes()[..len.min(remaining)];
            progress.data.extend_from_slice(chunk);
            progress.offset += chunk.len() as u64;
            tracing::trace!(
                offset = progress.offset,
                total = progress.total_len,
                "persistent event log chunk"
            );
        }
        Ok(())
    }

    /// Releases the reporting context. The session is `NotEstablished`
    /// afterwards whatever the device answers.
    pub fn release<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), PelError> {
        let result = self.get_log(transport, PelAction::RELEASE_CONTEXT, 0, PEL_HEADER_LEN);
        self.set_state(ContextState::NotEstablished);
        let outcome = result?;
        tracing::debug!(%outcome, "released reporting context");
        Ok(())
    }

    /// Reads the log header to learn whether a context exists, and records
    /// the answer.
    pub fn check_context<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<ContextState, PelError> {
        let outcome = self.get_log(transport, PelAction::READ_LOG_DATA, 0, PEL_HEADER_LEN)?;
        let state = if outcome.is_success() {
            ContextState::Established
        } else if outcome.is_command_sequence_error() {
            ContextState::NotEstablished
        } else {
            tracing::warn!(%outcome, "context check failed");
            ContextState::Unknown
        };
        self.set_state(state);
        Ok(state)
    }

    /// Establishes a context, reads the log, and releases the context, even
    /// if the read fails.
    pub fn retrieve<T: DeviceTransport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<PersistentEventLog, PelError> {
        self.establish(transport)?;
        let result = self.read_log(transport);
        if let Err(err) = self.release(transport) {
            tracing::warn!(
                error = &err as &dyn std::error::Error,
                "failed to release reporting context"
            );
        }
        result
    }
}
