// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Identify command layouts.

use field_codec::field_ids;
use field_codec::FieldSpec;
use field_codec::FieldTable;

/// Size of every Identify data structure.
pub const IDENTIFY_DATA_LEN: usize = 4096;

field_ids! {
    pub enum IdentifyCdw10 {
        /// Controller or namespace structure.
        Cns,
        /// Controller identifier.
        Cntid,
    }
}

pub const IDENTIFY_CDW10: FieldTable<IdentifyCdw10> = FieldTable::new(&[
    (IdentifyCdw10::Cns, FieldSpec::bits(0, 8)),
    (IdentifyCdw10::Cntid, FieldSpec::bits(16, 16)),
]);

const _: () = assert!(IDENTIFY_CDW10.min_len() == 4);

field_ids! {
    /// Identify Controller data structure fields.
    pub enum IdentifyControllerField {
        /// PCI vendor ID.
        Vid,
        /// PCI subsystem vendor ID.
        Ssvid,
        /// Serial number.
        Sn,
        /// Model number.
        Mn,
        /// Firmware revision.
        Fr,
        /// Maximum data transfer size, as a power of two of the minimum page
        /// size.
        Mdts,
        Cntlid,
        /// Version.
        Ver,
        /// Optional admin command support.
        Oacs,
        /// Log page attributes.
        Lpa,
        /// Error log page entries, zero based.
        Elpe,
        /// Warning composite temperature threshold.
        Wctemp,
        /// Critical composite temperature threshold.
        Cctemp,
        /// Persistent event log size, in 64 KiB units.
        Pels,
        /// Number of namespaces.
        Nn,
        /// NVM subsystem NVMe qualified name.
        Subnqn,
    }
}

pub const IDENTIFY_CONTROLLER: FieldTable<IdentifyControllerField> = FieldTable::new(&[
    (IdentifyControllerField::Vid, FieldSpec::bytes(0, 2).le()),
    (IdentifyControllerField::Ssvid, FieldSpec::bytes(2, 2).le()),
    (IdentifyControllerField::Sn, FieldSpec::bytes(4, 20).text()),
    (IdentifyControllerField::Mn, FieldSpec::bytes(24, 40).text()),
    (IdentifyControllerField::Fr, FieldSpec::bytes(64, 8).text()),
    (IdentifyControllerField::Mdts, FieldSpec::bytes(77, 1).le()),
    (IdentifyControllerField::Cntlid, FieldSpec::bytes(78, 2).le()),
    (IdentifyControllerField::Ver, FieldSpec::bytes(80, 4).le()),
    (IdentifyControllerField::Oacs, FieldSpec::bytes(256, 2).le()),
    (IdentifyControllerField::Lpa, FieldSpec::bytes(261, 1).le()),
    (IdentifyControllerField::Elpe, FieldSpec::bytes(262, 1).le()),
    (IdentifyControllerField::Wctemp, FieldSpec::bytes(266, 2).le()),
    (IdentifyControllerField::Cctemp, FieldSpec::bytes(268, 2).le()),
    (IdentifyControllerField::Pels, FieldSpec::bytes(352, 4).le()),
    (IdentifyControllerField::Nn, FieldSpec::bytes(516, 4).le()),
    (IdentifyControllerField::Subnqn, FieldSpec::bytes(768, 256).text()),
]);

const _: () = assert!(IDENTIFY_CONTROLLER.min_len() <= IDENTIFY_DATA_LEN);
