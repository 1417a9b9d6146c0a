// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::event::walk_events;
use crate::event::PersistentEvent;
use crate::text;
use crate::uint;
use crate::PelError;
use field_codec::FieldError;
use nvme_spec::pel::PelHeaderField;
use nvme_spec::pel::PersistentEventType;
use nvme_spec::pel::PEL_HEADER;
use nvme_spec::pel::PEL_LENGTH_ALIGNMENT;

/// The decoded 512-byte Persistent Event Log header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PelHeader {
    /// Log page identifier, 0x0d.
    pub log_identifier: u8,
    /// Number of events in the log.
    pub total_events: u32,
    /// Log length in bytes, as reported.
    pub total_log_length: u64,
    /// Log revision.
    pub log_revision: u8,
    /// Header length in bytes.
    pub header_length: u16,
    /// Controller timestamp when the context was established.
    pub timestamp: u64,
    /// Power on hours, low 64 bits.
    pub power_on_hours: u64,
    /// Power cycle count.
    pub power_cycle_count: u64,
    /// PCI vendor ID.
    pub vid: u16,
    /// PCI subsystem vendor ID.
    pub ssvid: u16,
    /// Serial number.
    pub serial_number: String,
    /// Model number.
    pub model_number: String,
    /// NVM subsystem NQN.
    pub subnqn: String,
    /// Incremented each time the log is cleared or wraps.
    pub generation_number: u16,
    /// Reporting context information.
    pub reporting_context: u32,
    /// One bit per supported event type.
    pub supported_events: [u8; 32],
}

impl PelHeader {
    /// Decodes a header from the first 512 bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, FieldError> {
        use PelHeaderField as F;

        let v = PEL_HEADER.decode(data)?;
        let mut supported_events = [0; 32];
        if let Some(bitmap) = v.get_bytes(F::SupportedEventsBitmap) {
            supported_events.copy_from_slice(bitmap);
        }
        Ok(Self {
            log_identifier: uint(&v, F::LogIdentifier) as u8,
            total_events: uint(&v, F::Tnev) as u32,
            total_log_length: uint(&v, F::Tll),
            log_revision: uint(&v, F::LogRevision) as u8,
            header_length: uint(&v, F::LogHeaderLength) as u16,
            timestamp: uint(&v, F::Timestamp),
            power_on_hours: uint(&v, F::Poh),
            power_cycle_count: uint(&v, F::PowerCycleCount),
            vid: uint(&v, F::Vid) as u16,
            ssvid: uint(&v, F::Ssvid) as u16,
            serial_number: text(&v, F::Sn),
            model_number: text(&v, F::Mn),
            subnqn: text(&v, F::Subnqn),
            generation_number: uint(&v, F::GenerationNumber) as u16,
            reporting_context: uint(&v, F::ReportingContext) as u32,
            supported_events,
        })
    }

    /// The log length rounded up to whole 512-byte units. Never less than
    /// the header itself. `None` if the rounded length overflows.
    pub fn aligned_log_length(&self) -> Option<u64> {
        self.total_log_length
            .div_ceil(PEL_LENGTH_ALIGNMENT)
            .max(1)
            .checked_mul(PEL_LENGTH_ALIGNMENT)
    }

    /// Whether the controller reports events of type `ty`.
    pub fn supports_event(&self, ty: PersistentEventType) -> bool {
        let bit = usize::from(ty.0);
        self.supported_events[bit / 8] & (1 << (bit % 8)) != 0
    }
}

/// A completely read Persistent Event Log.
#[derive(Debug, Clone)]
pub struct PersistentEventLog {
    header: PelHeader,
    data: Vec<u8>,
}

impl PersistentEventLog {
    pub(crate) fn new(header: PelHeader, data: Vec<u8>) -> Self {
        Self { header, data }
    }

    /// The decoded header.
    pub fn header(&self) -> &PelHeader {
        &self.header
    }

    /// The raw log, header included, cut to the reported total log length.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the log, returning the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decodes the events.
    pub fn events(&self) -> Result<Vec<PersistentEvent<'_>>, PelError> {
        walk_events(&self.data, self.header.total_events)
    }
}
