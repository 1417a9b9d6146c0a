// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Get Log Page command dwords and the SMART / Health Information log page.

use field_codec::field_ids;
use field_codec::FieldSpec;
use field_codec::FieldTable;

field_ids! {
    pub enum GetLogPageCdw10 {
        /// Log page identifier.
        Lid,
        /// Log specific parameter.
        Lsp,
        /// Retain asynchronous event.
        Rae,
        /// Number of dwords, lower 16 bits, zero based.
        Numdl,
    }
}

pub const GET_LOG_PAGE_CDW10: FieldTable<GetLogPageCdw10> = FieldTable::new(&[
    (GetLogPageCdw10::Lid, FieldSpec::bits(0, 8)),
    (GetLogPageCdw10::Lsp, FieldSpec::bits(8, 7)),
    (GetLogPageCdw10::Rae, FieldSpec::flag(15)),
    (GetLogPageCdw10::Numdl, FieldSpec::bits(16, 16)),
]);

field_ids! {
    pub enum GetLogPageCdw11 {
        /// Number of dwords, upper 16 bits.
        Numdu,
        /// Log specific identifier.
        Lsi,
    }
}

pub const GET_LOG_PAGE_CDW11: FieldTable<GetLogPageCdw11> = FieldTable::new(&[
    (GetLogPageCdw11::Numdu, FieldSpec::bits(0, 16)),
    (GetLogPageCdw11::Lsi, FieldSpec::bits(16, 16)),
]);

field_ids! {
    pub enum GetLogPageCdw12 {
        /// Log page offset, lower 32 bits.
        Lpol,
    }
}

pub const GET_LOG_PAGE_CDW12: FieldTable<GetLogPageCdw12> =
    FieldTable::new(&[(GetLogPageCdw12::Lpol, FieldSpec::bits(0, 32))]);

field_ids! {
    pub enum GetLogPageCdw13 {
        /// Log page offset, upper 32 bits.
        Lpou,
    }
}

pub const GET_LOG_PAGE_CDW13: FieldTable<GetLogPageCdw13> =
    FieldTable::new(&[(GetLogPageCdw13::Lpou, FieldSpec::bits(0, 32))]);

field_ids! {
    pub enum GetLogPageCdw14 {
        UuidIndex,
        /// Offset type: the offset is an index rather than a byte offset.
        Ot,
        /// Command set identifier.
        Csi,
    }
}

pub const GET_LOG_PAGE_CDW14: FieldTable<GetLogPageCdw14> = FieldTable::new(&[
    (GetLogPageCdw14::UuidIndex, FieldSpec::bits(0, 7)),
    (GetLogPageCdw14::Ot, FieldSpec::flag(23)),
    (GetLogPageCdw14::Csi, FieldSpec::bits(24, 8)),
]);

const _: () = assert!(GET_LOG_PAGE_CDW10.min_len() == 4);
const _: () = assert!(GET_LOG_PAGE_CDW11.min_len() == 4);
const _: () = assert!(GET_LOG_PAGE_CDW12.min_len() == 4);
const _: () = assert!(GET_LOG_PAGE_CDW13.min_len() == 4);
const _: () = assert!(GET_LOG_PAGE_CDW14.min_len() == 4);

/// Size of the SMART / Health Information log page.
pub const HEALTH_LOG_LEN: usize = 512;

field_ids! {
    /// SMART / Health Information log page fields. The 128-bit counters are
    /// read as their low 64 bits.
    pub enum HealthLogField {
        SpareBelowThreshold,
        TemperatureThreshold,
        ReliabilityDegraded,
        ReadOnly,
        VolatileBackupFailed,
        PersistentMemoryReadOnly,
        /// Composite temperature in Kelvin.
        CompositeTemperature,
        AvailableSpare,
        AvailableSpareThreshold,
        PercentageUsed,
        DataUnitsRead,
        DataUnitsWritten,
        HostReadCommands,
        HostWriteCommands,
        ControllerBusyTime,
        PowerCycles,
        PowerOnHours,
        UnsafeShutdowns,
        MediaErrors,
        ErrorLogEntries,
    }
}

pub const HEALTH_LOG: FieldTable<HealthLogField> = FieldTable::new(&[
    // Critical warning bits all live in byte 0.
    (HealthLogField::SpareBelowThreshold, FieldSpec::mask(0, 0x01)),
    (HealthLogField::TemperatureThreshold, FieldSpec::mask(0, 0x02)),
    (HealthLogField::ReliabilityDegraded, FieldSpec::mask(0, 0x04)),
    (HealthLogField::ReadOnly, FieldSpec::mask(0, 0x08)),
    (HealthLogField::VolatileBackupFailed, FieldSpec::mask(0, 0x10)),
    (HealthLogField::PersistentMemoryReadOnly, FieldSpec::mask(0, 0x20)),
    (HealthLogField::CompositeTemperature, FieldSpec::bytes(1, 2).le()),
    (HealthLogField::AvailableSpare, FieldSpec::bytes(3, 1).le()),
    (HealthLogField::AvailableSpareThreshold, FieldSpec::bytes(4, 1).le()),
    (HealthLogField::PercentageUsed, FieldSpec::bytes(5, 1).le()),
    (HealthLogField::DataUnitsRead, FieldSpec::bytes(32, 8).le()),
    (HealthLogField::DataUnitsWritten, FieldSpec::bytes(48, 8).le()),
    (HealthLogField::HostReadCommands, FieldSpec::bytes(64, 8).le()),
    (HealthLogField::HostWriteCommands, FieldSpec::bytes(80, 8).le()),
    (HealthLogField::ControllerBusyTime, FieldSpec::bytes(96, 8).le()),
    (HealthLogField::PowerCycles, FieldSpec::bytes(112, 8).le()),
    (HealthLogField::PowerOnHours, FieldSpec::bytes(128, 8).le()),
    (HealthLogField::UnsafeShutdowns, FieldSpec::bytes(144, 8).le()),
    (HealthLogField::MediaErrors, FieldSpec::bytes(160, 8).le()),
    (HealthLogField::ErrorLogEntries, FieldSpec::bytes(176, 8).le()),
]);

const _: () = assert!(HEALTH_LOG.min_len() <= HEALTH_LOG_LEN);
