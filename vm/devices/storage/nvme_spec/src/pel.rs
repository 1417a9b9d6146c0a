// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent Event Log (log page 0x0d) layouts.
//!
//! The log starts with a 512-byte header followed by a packed sequence of
//! events. Every event is a 24-byte event header, optional vendor specific
//! information, and type-specific event data.

use field_codec::field_ids;
use field_codec::FieldSpec;
use field_codec::FieldTable;
use open_enum::open_enum;

/// Size of the log header. Also the read window for context actions.
pub const PEL_HEADER_LEN: usize = 512;
/// Bytes of every event header not counted by its event header length.
pub const EVENT_FIXED_HEADER_LEN: usize = 3;
/// Size of the event header defined by revision 1 of the log.
pub const EVENT_HEADER_LEN: usize = 24;
/// Log lengths are reported by the controller in these units.
pub const PEL_LENGTH_ALIGNMENT: u64 = 512;
/// Unit of the Persistent Event Log size (PELS) in Identify Controller.
pub const PEL_SIZE_UNIT: u64 = 64 * 1024;

/// Log specific parameter values selecting the reporting context action.
#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum PelAction {
    READ_LOG_DATA = 0,
    ESTABLISH_CONTEXT_AND_READ = 1,
    RELEASE_CONTEXT = 2,
}

field_ids! {
    /// Persistent Event Log header fields.
    pub enum PelHeaderField {
        LogIdentifier,
        /// Total number of events.
        Tnev,
        /// Total log length, in bytes.
        Tll,
        LogRevision,
        LogHeaderLength,
        Timestamp,
        /// Power on hours, low 64 bits.
        Poh,
        PowerCycleCount,
        Vid,
        Ssvid,
        Sn,
        Mn,
        Subnqn,
        GenerationNumber,
        ReportingContext,
        /// One bit per event type.
        SupportedEventsBitmap,
    }
}

pub const PEL_HEADER: FieldTable<PelHeaderField> = FieldTable::new(&[
    (PelHeaderField::LogIdentifier, FieldSpec::bytes(0, 1).le()),
    (PelHeaderField::Tnev, FieldSpec::bytes(4, 4).le()),
    (PelHeaderField::Tll, FieldSpec::bytes(8, 8).le()),
    (PelHeaderField::LogRevision, FieldSpec::bytes(16, 1).le()),
    (PelHeaderField::LogHeaderLength, FieldSpec::bytes(18, 2).le()),
    (PelHeaderField::Timestamp, FieldSpec::bytes(20, 8).le()),
    (PelHeaderField::Poh, FieldSpec::bytes(28, 8).le()),
    (PelHeaderField::PowerCycleCount, FieldSpec::bytes(44, 8).le()),
    (PelHeaderField::Vid, FieldSpec::bytes(52, 2).le()),
    (PelHeaderField::Ssvid, FieldSpec::bytes(54, 2).le()),
    (PelHeaderField::Sn, FieldSpec::bytes(56, 20).text()),
    (PelHeaderField::Mn, FieldSpec::bytes(76, 40).text()),
    (PelHeaderField::Subnqn, FieldSpec::bytes(116, 256).text()),
    (PelHeaderField::GenerationNumber, FieldSpec::bytes(372, 2).le()),
    (PelHeaderField::ReportingContext, FieldSpec::bytes(374, 4).le()),
    (PelHeaderField::SupportedEventsBitmap, FieldSpec::bytes(480, 32)),
]);

const _: () = assert!(PEL_HEADER.min_len() == PEL_HEADER_LEN);

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum PersistentEventType {
    SMART_HEALTH_SNAPSHOT = 0x01,
    FIRMWARE_COMMIT = 0x02,
    TIMESTAMP_CHANGE = 0x03,
    POWER_ON_OR_RESET = 0x04,
    NVM_SUBSYSTEM_HARDWARE_ERROR = 0x05,
    CHANGE_NAMESPACE = 0x06,
    FORMAT_NVM_START = 0x07,
    FORMAT_NVM_COMPLETION = 0x08,
    SANITIZE_START = 0x09,
    SANITIZE_COMPLETION = 0x0a,
    SET_FEATURE = 0x0b,
    TELEMETRY_LOG_CREATED = 0x0c,
    THERMAL_EXCURSION = 0x0d,
    VENDOR_SPECIFIC = 0xde,
    TCG_DEFINED = 0xdf,
}

field_ids! {
    pub enum EventHeaderField {
        EventType,
        EventTypeRevision,
        /// Event header length, excluding the first three bytes.
        Ehl,
        AdditionalInfo,
        ControllerIdentifier,
        /// Event timestamp, in milliseconds. Bits 63:48 of the field hold
        /// attributes and are not part of this value.
        EventTimestamp,
        PortIdentifier,
        /// Vendor specific information length.
        Vsil,
        /// Event length: vendor specific information plus event data.
        El,
    }
}

pub const EVENT_HEADER: FieldTable<EventHeaderField> = FieldTable::new(&[
    (EventHeaderField::EventType, FieldSpec::bytes(0, 1).le()),
    (EventHeaderField::EventTypeRevision, FieldSpec::bytes(1, 1).le()),
    (EventHeaderField::Ehl, FieldSpec::bytes(2, 1).le()),
    (EventHeaderField::AdditionalInfo, FieldSpec::bytes(3, 1).le()),
    (EventHeaderField::ControllerIdentifier, FieldSpec::bytes(4, 2).le()),
    (EventHeaderField::EventTimestamp, FieldSpec::bits(48, 48)),
    (EventHeaderField::PortIdentifier, FieldSpec::bytes(14, 2).le()),
    (EventHeaderField::Vsil, FieldSpec::bytes(20, 2).le()),
    (EventHeaderField::El, FieldSpec::bytes(22, 2).le()),
]);

const _: () = assert!(EVENT_HEADER.min_len() == EVENT_HEADER_LEN);

field_ids! {
    pub enum FirmwareCommitField {
        OldFirmwareRevision,
        NewFirmwareRevision,
        CommitAction,
        FirmwareSlot,
        StatusCodeType,
        StatusReturned,
        VendorStatus,
    }
}

pub const FIRMWARE_COMMIT_EVENT: FieldTable<FirmwareCommitField> = FieldTable::new(&[
    (FirmwareCommitField::OldFirmwareRevision, FieldSpec::bytes(0, 8).text()),
    (FirmwareCommitField::NewFirmwareRevision, FieldSpec::bytes(8, 8).text()),
    (FirmwareCommitField::CommitAction, FieldSpec::bytes(16, 1).le()),
    (FirmwareCommitField::FirmwareSlot, FieldSpec::bytes(17, 1).le()),
    (FirmwareCommitField::StatusCodeType, FieldSpec::bytes(18, 1).le()),
    (FirmwareCommitField::StatusReturned, FieldSpec::bytes(19, 1).le()),
    (FirmwareCommitField::VendorStatus, FieldSpec::bytes(20, 2).le()),
]);

field_ids! {
    pub enum TimestampChangeField {
        PreviousTimestamp,
        MillisecondsSinceReset,
    }
}

pub const TIMESTAMP_CHANGE_EVENT: FieldTable<TimestampChangeField> = FieldTable::new(&[
    (TimestampChangeField::PreviousTimestamp, FieldSpec::bytes(0, 8).le()),
    (TimestampChangeField::MillisecondsSinceReset, FieldSpec::bytes(8, 8).le()),
]);

field_ids! {
    /// Power-on or reset event data: the firmware revision, followed by one
    /// [`POWER_ON_RESET_DESCRIPTOR`] per controller.
    pub enum PowerOnResetEventField {
        FirmwareRevision,
    }
}

pub const POWER_ON_RESET_EVENT: FieldTable<PowerOnResetEventField> = FieldTable::new(&[(
    PowerOnResetEventField::FirmwareRevision,
    FieldSpec::bytes(0, 8).text(),
)]);

pub const POWER_ON_RESET_FIRMWARE_LEN: usize = POWER_ON_RESET_EVENT.min_len();
pub const POWER_ON_RESET_DESCRIPTOR_LEN: usize = 36;

field_ids! {
    pub enum PowerOnResetField {
        ControllerIdentifier,
        FirmwareActivation,
        OperationInProgress,
        ControllerPowerCycle,
        PowerOnMilliseconds,
        ControllerTimestamp,
    }
}

pub const POWER_ON_RESET_DESCRIPTOR: FieldTable<PowerOnResetField> = FieldTable::new(&[
    (PowerOnResetField::ControllerIdentifier, FieldSpec::bytes(0, 2).le()),
    (PowerOnResetField::FirmwareActivation, FieldSpec::bytes(2, 1).le()),
    (PowerOnResetField::OperationInProgress, FieldSpec::bytes(3, 1).le()),
    (PowerOnResetField::ControllerPowerCycle, FieldSpec::bytes(16, 4).le()),
    (PowerOnResetField::PowerOnMilliseconds, FieldSpec::bytes(20, 8).le()),
    (PowerOnResetField::ControllerTimestamp, FieldSpec::bytes(28, 8).le()),
]);

const _: () = assert!(POWER_ON_RESET_DESCRIPTOR.min_len() == POWER_ON_RESET_DESCRIPTOR_LEN);

field_ids! {
    pub enum ChangeNamespaceField {
        /// Namespace management command dword 10.
        NamespaceManagementCdw10,
        Nsze,
        Ncap,
        Flbas,
        Dps,
        Nmic,
        AnaGroupId,
        NvmSetId,
        Nsid,
    }
}

pub const CHANGE_NAMESPACE_EVENT: FieldTable<ChangeNamespaceField> = FieldTable::new(&[
    (ChangeNamespaceField::NamespaceManagementCdw10, FieldSpec::bytes(0, 4).le()),
    (ChangeNamespaceField::Nsze, FieldSpec::bytes(8, 8).le()),
    (ChangeNamespaceField::Ncap, FieldSpec::bytes(24, 8).le()),
    (ChangeNamespaceField::Flbas, FieldSpec::bytes(32, 1).le()),
    (ChangeNamespaceField::Dps, FieldSpec::bytes(33, 1).le()),
    (ChangeNamespaceField::Nmic, FieldSpec::bytes(34, 1).le()),
    (ChangeNamespaceField::AnaGroupId, FieldSpec::bytes(36, 4).le()),
    (ChangeNamespaceField::NvmSetId, FieldSpec::bytes(40, 2).le()),
    (ChangeNamespaceField::Nsid, FieldSpec::bytes(44, 4).le()),
]);

field_ids! {
    pub enum SanitizeStartField {
        /// Sanitize capabilities from Identify Controller.
        Sanicap,
        SanitizeCdw10,
        SanitizeCdw11,
    }
}

pub const SANITIZE_START_EVENT: FieldTable<SanitizeStartField> = FieldTable::new(&[
    (SanitizeStartField::Sanicap, FieldSpec::bytes(0, 4).le()),
    (SanitizeStartField::SanitizeCdw10, FieldSpec::bytes(4, 4).le()),
    (SanitizeStartField::SanitizeCdw11, FieldSpec::bytes(8, 4).le()),
]);

field_ids! {
    pub enum ThermalExcursionField {
        /// Degrees Kelvin over the threshold.
        OverTemperature,
        /// Which temperature threshold was crossed.
        Threshold,
    }
}

pub const THERMAL_EXCURSION_EVENT: FieldTable<ThermalExcursionField> = FieldTable::new(&[
    (ThermalExcursionField::OverTemperature, FieldSpec::bytes(0, 1).le()),
    (ThermalExcursionField::Threshold, FieldSpec::bytes(1, 1).le()),
]);
