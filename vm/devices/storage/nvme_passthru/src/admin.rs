// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Admin command helpers.

use crate::buffer::DataBuffer;
use crate::command::BuildError;
use crate::command::CommandBuilder;
use crate::command::CommandDescriptor;
use crate::command::CommandWord;
use crate::command::Opcode;
use crate::status::CompletionOutcome;
use crate::transport::issue;
use crate::transport::DeviceTransport;
use crate::transport::TransportError;
use field_codec::FieldError;
use field_codec::FieldId;
use field_codec::FieldValues;
use nvme_spec::identify::IdentifyCdw10;
use nvme_spec::identify::IdentifyControllerField;
use nvme_spec::identify::IDENTIFY_CDW10;
use nvme_spec::identify::IDENTIFY_CONTROLLER;
use nvme_spec::identify::IDENTIFY_DATA_LEN;
use nvme_spec::log::GetLogPageCdw10;
use nvme_spec::log::GetLogPageCdw11;
use nvme_spec::log::GetLogPageCdw12;
use nvme_spec::log::GetLogPageCdw13;
use nvme_spec::log::GetLogPageCdw14;
use nvme_spec::log::HealthLogField;
use nvme_spec::log::GET_LOG_PAGE_CDW10;
use nvme_spec::log::GET_LOG_PAGE_CDW11;
use nvme_spec::log::GET_LOG_PAGE_CDW12;
use nvme_spec::log::GET_LOG_PAGE_CDW13;
use nvme_spec::log::GET_LOG_PAGE_CDW14;
use nvme_spec::log::HEALTH_LOG;
use nvme_spec::log::HEALTH_LOG_LEN;
use nvme_spec::nvm::IdentifyNamespaceField;
use nvme_spec::nvm::IDENTIFY_NAMESPACE;
use nvme_spec::AdminOpcode;
use nvme_spec::Cns;
use nvme_spec::LogPageAttributes;
use nvme_spec::LogPageIdentifier;
use nvme_spec::OptionalAdminCommandSupport;
use std::time::Duration;
use thiserror::Error;

/// An error running an admin command to completion.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to build command")]
    Build(#[source] BuildError),
    #[error("transport error")]
    Transport(#[source] TransportError),
    #[error("command failed: {0}")]
    Failed(CompletionOutcome),
    #[error("malformed response")]
    Decode(#[source] FieldError),
}

/// Get Log Page parameters.
#[derive(Debug, Clone)]
pub struct GetLogPage {
    pub lid: LogPageIdentifier,
    /// Log specific parameter.
    pub lsp: u8,
    /// Retain asynchronous event.
    pub rae: bool,
    pub nsid: u32,
    /// Byte offset into the log page. Must be dword aligned.
    pub offset: u64,
    /// Bytes to read. Must be a non-zero multiple of 4.
    pub len: usize,
    /// Log specific identifier.
    pub lsi: u16,
    pub uuid_index: u8,
    pub timeout: Option<Duration>,
}

impl GetLogPage {
    pub fn new(lid: LogPageIdentifier, len: usize) -> Self {
        Self {
            lid,
            lsp: 0,
            rae: false,
            nsid: 0,
            offset: 0,
            len,
            lsi: 0,
            uuid_index: 0,
            timeout: None,
        }
    }

    /// Builds the command. Reads land in `buffer` if given, otherwise in a
    /// buffer owned by the descriptor.
    pub fn command<'a>(
        &self,
        buffer: Option<&'a mut DataBuffer>,
    ) -> Result<CommandDescriptor<'a>, BuildError> {
        if self.len == 0 || self.len % 4 != 0 {
            return Err(BuildError::UnalignedTransfer { len: self.len });
        }
        // Zero based dword count, split over NUMDL and NUMDU.
        let numd = (self.len / 4 - 1) as u64;
        let mut builder = CommandBuilder::new(Opcode::Admin(AdminOpcode::GET_LOG_PAGE))
            .nsid(self.nsid)
            .encode_word(
                CommandWord::Cdw10,
                &GET_LOG_PAGE_CDW10,
                &FieldValues::new()
                    .with(GetLogPageCdw10::Lid, self.lid.0)
                    .with(GetLogPageCdw10::Lsp, self.lsp)
                    .with(GetLogPageCdw10::Rae, self.rae)
                    .with(GetLogPageCdw10::Numdl, numd & 0xffff),
            )?
            .encode_word(
                CommandWord::Cdw11,
                &GET_LOG_PAGE_CDW11,
                &FieldValues::new()
                    .with(GetLogPageCdw11::Numdu, numd >> 16)
                    .with(GetLogPageCdw11::Lsi, self.lsi),
            )?
            .encode_word(
                CommandWord::Cdw12,
                &GET_LOG_PAGE_CDW12,
                &FieldValues::new().with(GetLogPageCdw12::Lpol, self.offset & 0xffff_ffff),
            )?
            .encode_word(
                CommandWord::Cdw13,
                &GET_LOG_PAGE_CDW13,
                &FieldValues::new().with(GetLogPageCdw13::Lpou, self.offset >> 32),
            )?
            .encode_word(
                CommandWord::Cdw14,
                &GET_LOG_PAGE_CDW14,
                &FieldValues::new().with(GetLogPageCdw14::UuidIndex, self.uuid_index),
            )?
            .transfer_len(self.len);
        if let Some(buffer) = buffer {
            builder = builder.data_buffer(buffer);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

/// Issues `command` and fails unless it completes successfully.
pub fn run(
    transport: &mut (impl DeviceTransport + ?Sized),
    command: &mut CommandDescriptor<'_>,
) -> Result<(), CommandError> {
    let outcome = issue(transport, command).map_err(CommandError::Transport)?;
    if !outcome.is_success() {
        return Err(CommandError::Failed(outcome));
    }
    Ok(())
}

/// Selected Identify Controller fields.
#[derive(Debug, Clone)]
pub struct ControllerIdentity {
    pub vid: u16,
    pub ssvid: u16,
    pub serial_number: String,
    pub model_number: String,
    pub firmware_revision: String,
    /// Maximum data transfer size as a power of two of the minimum memory
    /// page size. Zero means no limit.
    pub mdts: u8,
    pub controller_id: u16,
    pub version: u32,
    pub oacs: OptionalAdminCommandSupport,
    pub lpa: LogPageAttributes,
    /// Persistent event log size, in 64 KiB units.
    pub pels: u32,
    pub namespace_count: u32,
    pub subnqn: String,
}

fn uint<F: FieldId>(values: &FieldValues<F>, id: F) -> u64 {
    values.get_u64(id).unwrap_or_default()
}

fn text<F: FieldId>(values: &FieldValues<F>, id: F) -> String {
    values.get_text(id).unwrap_or_default().to_owned()
}

impl ControllerIdentity {
    pub fn decode(data: &[u8]) -> Result<Self, FieldError> {
        use IdentifyControllerField as F;

        let v = IDENTIFY_CONTROLLER.decode(data)?;
        Ok(Self {
            vid: uint(&v, F::Vid) as u16,
            ssvid: uint(&v, F::Ssvid) as u16,
            serial_number: text(&v, F::Sn),
            model_number: text(&v, F::Mn),
            firmware_revision: text(&v, F::Fr),
            mdts: uint(&v, F::Mdts) as u8,
            controller_id: uint(&v, F::Cntlid) as u16,
            version: uint(&v, F::Ver) as u32,
            oacs: OptionalAdminCommandSupport::from(uint(&v, F::Oacs) as u16),
            lpa: LogPageAttributes::from(uint(&v, F::Lpa) as u8),
            pels: uint(&v, F::Pels) as u32,
            namespace_count: uint(&v, F::Nn) as u32,
            subnqn: text(&v, F::Subnqn),
        })
    }
}

/// Issues Identify Controller.
pub fn identify_controller(
    transport: &mut (impl DeviceTransport + ?Sized),
) -> Result<ControllerIdentity, CommandError> {
    let mut command = CommandBuilder::new(Opcode::Admin(AdminOpcode::IDENTIFY))
        .encode_word(
            CommandWord::Cdw10,
            &IDENTIFY_CDW10,
            &FieldValues::new().with(IdentifyCdw10::Cns, Cns::CONTROLLER.0),
        )
        .and_then(|b| b.transfer_len(IDENTIFY_DATA_LEN).build())
        .map_err(CommandError::Build)?;
    run(transport, &mut command)?;

    let data = command.data().unwrap_or_default();
    let identity = ControllerIdentity::decode(data).map_err(CommandError::Decode)?;
    tracing::trace!(?identity, "identify controller");
    Ok(identity)
}

/// Selected Identify Namespace fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceIdentity {
    /// Namespace size, in logical blocks.
    pub size: u64,
    /// Namespace capacity, in logical blocks.
    pub capacity: u64,
    /// Allocated logical blocks.
    pub utilization: u64,
    /// Number of supported LBA formats.
    pub lba_format_count: u8,
    /// Index of the LBA format the namespace is formatted with.
    pub formatted_lba_format: u8,
    /// Data size of LBA format 0, as a power of two.
    pub lba_format0_data_shift: u8,
}

impl NamespaceIdentity {
    pub fn decode(data: &[u8]) -> Result<Self, FieldError> {
        use IdentifyNamespaceField as F;

        let v = IDENTIFY_NAMESPACE.decode(data)?;
        Ok(Self {
            size: uint(&v, F::Nsze),
            capacity: uint(&v, F::Ncap),
            utilization: uint(&v, F::Nuse),
            // Zero based on the wire.
            lba_format_count: (uint(&v, F::Nlbaf) as u8).wrapping_add(1),
            formatted_lba_format: uint(&v, F::FlbasIndex) as u8,
            lba_format0_data_shift: uint(&v, F::Lbaf0Lbads) as u8,
        })
    }
}

/// Issues Identify Namespace for `nsid`.
pub fn identify_namespace(
    transport: &mut (impl DeviceTransport + ?Sized),
    nsid: u32,
) -> Result<NamespaceIdentity, CommandError> {
    let mut command = CommandBuilder::new(Opcode::Admin(AdminOpcode::IDENTIFY))
        .nsid(nsid)
        .encode_word(
            CommandWord::Cdw10,
            &IDENTIFY_CDW10,
            &FieldValues::new().with(IdentifyCdw10::Cns, Cns::NAMESPACE.0),
        )
        .and_then(|b| b.transfer_len(IDENTIFY_DATA_LEN).build())
        .map_err(CommandError::Build)?;
    run(transport, &mut command)?;

    let data = command.data().unwrap_or_default();
    let identity = NamespaceIdentity::decode(data).map_err(CommandError::Decode)?;
    tracing::trace!(nsid, ?identity, "identify namespace");
    Ok(identity)
}

/// Critical warning bits of the SMART / Health Information log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriticalWarnings {
    pub spare_below_threshold: bool,
    pub temperature_threshold: bool,
    pub reliability_degraded: bool,
    pub read_only: bool,
    pub volatile_backup_failed: bool,
    pub persistent_memory_read_only: bool,
}

impl CriticalWarnings {
    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// Decoded SMART / Health Information log.
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub critical_warnings: CriticalWarnings,
    /// Composite temperature in Kelvin.
    pub composite_temperature: u16,
    /// Normalized percentage of remaining spare capacity.
    pub available_spare: u8,
    pub available_spare_threshold: u8,
    /// Vendor estimate of life used; may exceed 100.
    pub percentage_used: u8,
    /// Units of 1000 512-byte blocks.
    pub data_units_read: u64,
    pub data_units_written: u64,
    pub power_cycles: u64,
    pub power_on_hours: u64,
    pub unsafe_shutdowns: u64,
    pub media_errors: u64,
    pub error_log_entries: u64,
}

impl HealthSummary {
    pub fn decode(data: &[u8]) -> Result<Self, FieldError> {
        use HealthLogField as F;

        let v = HEALTH_LOG.decode(data)?;
        Ok(Self {
            critical_warnings: CriticalWarnings {
                spare_below_threshold: v.flag(F::SpareBelowThreshold),
                temperature_threshold: v.flag(F::TemperatureThreshold),
                reliability_degraded: v.flag(F::ReliabilityDegraded),
                read_only: v.flag(F::ReadOnly),
                volatile_backup_failed: v.flag(F::VolatileBackupFailed),
                persistent_memory_read_only: v.flag(F::PersistentMemoryReadOnly),
            },
            composite_temperature: uint(&v, F::CompositeTemperature) as u16,
            available_spare: uint(&v, F::AvailableSpare) as u8,
            available_spare_threshold: uint(&v, F::AvailableSpareThreshold) as u8,
            percentage_used: uint(&v, F::PercentageUsed) as u8,
            data_units_read: uint(&v, F::DataUnitsRead),
            data_units_written: uint(&v, F::DataUnitsWritten),
            power_cycles: uint(&v, F::PowerCycles),
            power_on_hours: uint(&v, F::PowerOnHours),
            unsafe_shutdowns: uint(&v, F::UnsafeShutdowns),
            media_errors: uint(&v, F::MediaErrors),
            error_log_entries: uint(&v, F::ErrorLogEntries),
        })
    }
}

/// Reads the SMART / Health Information log for `nsid`, or for the whole
/// controller with [`nvme_spec::NSID_ALL`].
pub fn health_log(
    transport: &mut (impl DeviceTransport + ?Sized),
    nsid: u32,
) -> Result<HealthSummary, CommandError> {
    let mut command = GetLogPage {
        nsid,
        ..GetLogPage::new(LogPageIdentifier::HEALTH_INFORMATION, HEALTH_LOG_LEN)
    }
    .command(None)
    .map_err(CommandError::Build)?;
    run(transport, &mut command)?;

    let summary =
        HealthSummary::decode(command.data().unwrap_or_default()).map_err(CommandError::Decode)?;
    tracing::trace!(?summary, "health log");
    Ok(summary)
}
