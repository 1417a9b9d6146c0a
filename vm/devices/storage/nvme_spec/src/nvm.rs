// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVM command set definitions
//!
//! NVM Command Set 1.0c: <https://nvmexpress.org/wp-content/uploads/NVM-Express-NVM-Command-Set-Specification-1.0c-2022.10.03-Ratified.pdf>

use field_codec::field_ids;
use field_codec::FieldSpec;
use field_codec::FieldTable;
use open_enum::open_enum;

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum NvmOpcode {
    FLUSH = 0x00,
    WRITE = 0x01,
    READ = 0x02,
    WRITE_UNCORRECTABLE = 0x04,
    COMPARE = 0x05,
    WRITE_ZEROES = 0x08,
    /// Dataset management.
    DSM = 0x09,
    VERIFY = 0x0c,

    RESERVATION_REGISTER = 0x0d,
    RESERVATION_REPORT = 0x0e,
    RESERVATION_ACQUIRE = 0x11,
    RESERVATION_RELEASE = 0x15,
}

field_ids! {
    /// Identify Namespace data structure fields.
    pub enum IdentifyNamespaceField {
        /// Namespace size, in logical blocks.
        Nsze,
        /// Namespace capacity, in logical blocks.
        Ncap,
        /// Namespace utilization, in logical blocks.
        Nuse,
        /// Number of LBA formats. Zero based.
        Nlbaf,
        /// Index of the formatted LBA format, low four bits.
        FlbasIndex,
        /// LBA data size of LBA format 0, as a power of two.
        Lbaf0Lbads,
    }
}

pub const IDENTIFY_NAMESPACE: FieldTable<IdentifyNamespaceField> = FieldTable::new(&[
    (IdentifyNamespaceField::Nsze, FieldSpec::bytes(0, 8).le()),
    (IdentifyNamespaceField::Ncap, FieldSpec::bytes(8, 8).le()),
    (IdentifyNamespaceField::Nuse, FieldSpec::bytes(16, 8).le()),
    (IdentifyNamespaceField::Nlbaf, FieldSpec::bytes(25, 1).le()),
    (IdentifyNamespaceField::FlbasIndex, FieldSpec::mask(26, 0x0f)),
    (IdentifyNamespaceField::Lbaf0Lbads, FieldSpec::bytes(130, 1).le()),
]);

const _: () = assert!(IDENTIFY_NAMESPACE.min_len() <= crate::identify::IDENTIFY_DATA_LEN);
