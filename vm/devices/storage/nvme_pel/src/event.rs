// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![expect(missing_docs)]

use crate::text;
use crate::uint;
use crate::PelError;
use field_codec::FieldError;
use nvme_spec::pel::ChangeNamespaceField;
use nvme_spec::pel::EventHeaderField;
use nvme_spec::pel::FirmwareCommitField;
use nvme_spec::pel::PersistentEventType;
use nvme_spec::pel::PowerOnResetEventField;
use nvme_spec::pel::PowerOnResetField;
use nvme_spec::pel::SanitizeStartField;
use nvme_spec::pel::ThermalExcursionField;
use nvme_spec::pel::TimestampChangeField;
use nvme_spec::pel::CHANGE_NAMESPACE_EVENT;
use nvme_spec::pel::EVENT_FIXED_HEADER_LEN;
use nvme_spec::pel::EVENT_HEADER;
use nvme_spec::pel::EVENT_HEADER_LEN;
use nvme_spec::pel::FIRMWARE_COMMIT_EVENT;
use nvme_spec::pel::PEL_HEADER_LEN;
use nvme_spec::pel::POWER_ON_RESET_DESCRIPTOR;
use nvme_spec::pel::POWER_ON_RESET_DESCRIPTOR_LEN;
use nvme_spec::pel::POWER_ON_RESET_EVENT;
use nvme_spec::pel::POWER_ON_RESET_FIRMWARE_LEN;
use nvme_spec::pel::SANITIZE_START_EVENT;
use nvme_spec::pel::THERMAL_EXCURSION_EVENT;
use nvme_spec::pel::TIMESTAMP_CHANGE_EVENT;
use nvme_spec::Status;

/// One event from the log, borrowing its payload from the log buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentEvent<'a> {
    /// Byte offset of the event in the log.
    pub offset: usize,
    pub event_type: PersistentEventType,
    pub revision: u8,
    /// Event header length, excluding the fixed three bytes.
    pub header_length: u8,
    pub additional_info: u8,
    pub controller_id: u16,
    /// Milliseconds, from the event timestamp field.
    pub timestamp: u64,
    pub port_id: u16,
    pub vendor_info: &'a [u8],
    pub data: &'a [u8],
}

/// Type specific event data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDetails {
    FirmwareCommit {
        old_revision: String,
        new_revision: String,
        commit_action: u8,
        slot: u8,
        /// Status of the firmware commit command.
        status: Status,
        vendor_status: u16,
    },
    TimestampChange {
        previous_timestamp: u64,
        milliseconds_since_reset: u64,
    },
    PowerOnOrReset {
        firmware_revision: String,
        controllers: Vec<PowerOnResetDescriptor>,
    },
    ChangeNamespace {
        nsid: u32,
        nsze: u64,
        ncap: u64,
        flbas: u8,
        dps: u8,
        nmic: u8,
        ana_group_id: u32,
        nvm_set_id: u16,
        management_cdw10: u32,
    },
    SanitizeStart {
        sanicap: u32,
        cdw10: u32,
        cdw11: u32,
    },
    ThermalExcursion {
        /// Kelvin above the threshold.
        over_temperature: u8,
        threshold: u8,
    },
    /// An event type without a decoder here.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerOnResetDescriptor {
    pub controller_id: u16,
    pub firmware_activation: u8,
    pub operation_in_progress: u8,
    pub controller_power_cycle: u32,
    pub power_on_milliseconds: u64,
    pub controller_timestamp: u64,
}

impl PersistentEvent<'_> {
    /// Decodes the event data for the known event types.
    pub fn details(&self) -> Result<EventDetails, FieldError> {
        let data = self.data;
        let details = match self.event_type {
            PersistentEventType::FIRMWARE_COMMIT => {
                use FirmwareCommitField as F;
                let v = FIRMWARE_COMMIT_EVENT.decode(data)?;
                EventDetails::FirmwareCommit {
                    old_revision: text(&v, F::OldFirmwareRevision),
                    new_revision: text(&v, F::NewFirmwareRevision),
                    commit_action: uint(&v, F::CommitAction) as u8,
                    slot: uint(&v, F::FirmwareSlot) as u8,
                    status: Status(
                        ((uint(&v, F::StatusCodeType) << 8) | uint(&v, F::StatusReturned)) as u16,
                    ),
                    vendor_status: uint(&v, F::VendorStatus) as u16,
                }
            }
            PersistentEventType::TIMESTAMP_CHANGE => {
                use TimestampChangeField as F;
                let v = TIMESTAMP_CHANGE_EVENT.decode(data)?;
                EventDetails::TimestampChange {
                    previous_timestamp: uint(&v, F::PreviousTimestamp),
                    milliseconds_since_reset: uint(&v, F::MillisecondsSinceReset),
                }
            }
            PersistentEventType::POWER_ON_OR_RESET => {
                use PowerOnResetField as F;
                let v = POWER_ON_RESET_EVENT.decode(data)?;
                let controllers = data[POWER_ON_RESET_FIRMWARE_LEN..]
                    .chunks_exact(POWER_ON_RESET_DESCRIPTOR_LEN)
                    .map(|desc| -> Result<_, FieldError> {
                        let d = POWER_ON_RESET_DESCRIPTOR.decode(desc)?;
                        Ok(PowerOnResetDescriptor {
                            controller_id: uint(&d, F::ControllerIdentifier) as u16,
                            firmware_activation: uint(&d, F::FirmwareActivation) as u8,
                            operation_in_progress: uint(&d, F::OperationInProgress) as u8,
                            controller_power_cycle: uint(&d, F::ControllerPowerCycle) as u32,
                            power_on_milliseconds: uint(&d, F::PowerOnMilliseconds),
                            controller_timestamp: uint(&d, F::ControllerTimestamp),
                        })
                    })
                    .collect::<Result<_, FieldError>>()?;
                EventDetails::PowerOnOrReset {
                    firmware_revision: text(&v, PowerOnResetEventField::FirmwareRevision),
                    controllers,
                }
            }
            PersistentEventType::CHANGE_NAMESPACE => {
                use ChangeNamespaceField as F;
                let v = CHANGE_NAMESPACE_EVENT.decode(data)?;
                EventDetails::ChangeNamespace {
                    nsid: uint(&v, F::Nsid) as u32,
                    nsze: uint(&v, F::Nsze),
                    ncap: uint(&v, F::Ncap),
                    flbas: uint(&v, F::Flbas) as u8,
                    dps: uint(&v, F::Dps) as u8,
                    nmic: uint(&v, F::Nmic) as u8,
                    ana_group_id: uint(&v, F::AnaGroupId) as u32,
                    nvm_set_id: uint(&v, F::NvmSetId) as u16,
                    management_cdw10: uint(&v, F::NamespaceManagementCdw10) as u32,
                }
            }
            PersistentEventType::SANITIZE_START => {
                use SanitizeStartField as F;
                let v = SANITIZE_START_EVENT.decode(data)?;
                EventDetails::SanitizeStart {
                    sanicap: uint(&v, F::Sanicap) as u32,
                    cdw10: uint(&v, F::SanitizeCdw10) as u32,
                    cdw11: uint(&v, F::SanitizeCdw11) as u32,
                }
            }
            PersistentEventType::THERMAL_EXCURSION => {
                use ThermalExcursionField as F;
                let v = THERMAL_EXCURSION_EVENT.decode(data)?;
                EventDetails::ThermalExcursion {
                    over_temperature: uint(&v, F::OverTemperature) as u8,
                    threshold: uint(&v, F::Threshold) as u8,
                }
            }
            _ => EventDetails::Other,
        };
        Ok(details)
    }
}

/// Walks the events of a log read from offset 0, header included.
///
/// Stops after `total_events` events. An event that does not fit in the
/// remaining bytes fails with [`PelError::TruncatedLog`].
pub fn walk_events(log: &[u8], total_events: u32) -> Result<Vec<PersistentEvent<'_>>, PelError> {
    use EventHeaderField as F;

    let mut events = Vec::new();
    let mut offset = PEL_HEADER_LEN;
    for index in 0..total_events {
        let available = log.len().saturating_sub(offset);
        let truncated = |needed| PelError::TruncatedLog {
            index,
            offset,
            needed,
            available,
        };
        if available < EVENT_HEADER_LEN {
            return Err(truncated(EVENT_HEADER_LEN));
        }
        let rest = &log[offset..];
        let h = EVENT_HEADER.decode(rest).map_err(PelError::Header)?;
        let header_len = uint(&h, F::Ehl) as usize + EVENT_FIXED_HEADER_LEN;
        let size = header_len + uint(&h, F::El) as usize;
        if size > available {
            return Err(truncated(size));
        }

        let body = &rest[header_len..size];
        let vendor_len = (uint(&h, F::Vsil) as usize).min(body.len());
        let (vendor_info, data) = body.split_at(vendor_len);
        let event = PersistentEvent {
            offset,
            event_type: PersistentEventType(uint(&h, F::EventType) as u8),
            revision: uint(&h, F::EventTypeRevision) as u8,
            header_length: uint(&h, F::Ehl) as u8,
            additional_info: uint(&h, F::AdditionalInfo) as u8,
            controller_id: uint(&h, F::ControllerIdentifier) as u16,
            timestamp: uint(&h, F::EventTimestamp),
            port_id: uint(&h, F::PortIdentifier) as u16,
            vendor_info,
            data,
        };
        tracing::trace!(index, offset, event_type = ?event.event_type, size, "event");
        events.push(event);
        offset += size;
    }
    Ok(events)
}
