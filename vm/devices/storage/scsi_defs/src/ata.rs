// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! ATA commands carried in SCSI ATA PASS-THROUGH(12) and (16) command blocks,
//! and the ATA IDENTIFY DEVICE response.

use crate::ScsiOp;
use field_codec::field_ids;
use field_codec::FieldError;
use field_codec::FieldId;
use field_codec::FieldSpec;
use field_codec::FieldTable;
use field_codec::FieldValues;
use open_enum::open_enum;

pub const ATA_PASS_THROUGH_12_LEN: usize = 12;
pub const ATA_PASS_THROUGH_16_LEN: usize = 16;
pub const IDENTIFY_DEVICE_DATA_LEN: usize = 512;

/// Largest LBA addressable without the 48-bit feature set.
pub const MAX_LBA28: u64 = 0x0fff_ffff;

/// LBA mid/high signature required by every SMART subcommand.
pub const SMART_LBA_SIGNATURE: u64 = 0xc2_4f00;

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum AtaProtocol {
    HARD_RESET = 0,
    SOFT_RESET = 1,
    NON_DATA = 3,
    PIO_DATA_IN = 4,
    PIO_DATA_OUT = 5,
    DMA = 6,
    DMA_QUEUED = 7,
    DEVICE_DIAGNOSTIC = 8,
    DEVICE_RESET = 9,
    UDMA_DATA_IN = 10,
    UDMA_DATA_OUT = 11,
    FPDMA = 12,
    RETURN_RESPONSE_INFORMATION = 15,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum AtaCommand {
    READ_LOG_EXT = 0x2F,
    READ_LOG_DMA_EXT = 0x47,
    SMART = 0xB0,
    CHECK_POWER_MODE = 0xE5,
    IDENTIFY_DEVICE = 0xEC,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum SmartFeature {
    READ_DATA = 0xD0,
    READ_THRESHOLDS = 0xD1,
    RETURN_STATUS = 0xDA,
}

/// Where the transfer length is found (T_LENGTH).
#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum TransferLength {
    NONE = 0,
    FEATURES = 1,
    SECTOR_COUNT = 2,
    STPSIU = 3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AtaDirection {
    ToDevice,
    FromDevice,
}

/// The ATA registers written for a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AtaTaskfile {
    pub features: u16,
    pub count: u16,
    /// 48-bit LBA.
    pub lba: u64,
    pub device: u8,
    pub command: AtaCommand,
}

impl AtaTaskfile {
    pub fn new(command: AtaCommand) -> Self {
        Self {
            features: 0,
            count: 0,
            lba: 0,
            device: 0,
            command,
        }
    }

    /// Whether the registers need the 48-bit (extended) taskfile.
    pub fn is_extended(&self) -> bool {
        self.features > 0xff || self.count > 0xff || self.lba > MAX_LBA28
    }
}

/// An ATA command and how the SCSI layer transports it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AtaPassThrough {
    pub protocol: AtaProtocol,
    pub direction: AtaDirection,
    pub length: TransferLength,
    /// The transfer length counts blocks rather than bytes.
    pub byte_block: bool,
    /// Blocks are logical sectors rather than 512 bytes.
    pub logical_block_units: bool,
    /// Return the ATA registers in sense data even on success.
    pub check_condition: bool,
    /// Seconds the bus may be invalid after the command, as 2^n - 2.
    pub off_line: u8,
    pub multiple_count: u8,
    pub taskfile: AtaTaskfile,
    pub control: u8,
}

impl AtaPassThrough {
    pub fn new(protocol: AtaProtocol, direction: AtaDirection, taskfile: AtaTaskfile) -> Self {
        Self {
            protocol,
            direction,
            length: TransferLength::NONE,
            byte_block: false,
            logical_block_units: false,
            check_condition: false,
            off_line: 0,
            multiple_count: 0,
            taskfile,
            control: 0,
        }
    }

    /// IDENTIFY DEVICE, reading one 512-byte block.
    pub fn identify_device() -> Self {
        let taskfile = AtaTaskfile {
            count: 1,
            ..AtaTaskfile::new(AtaCommand::IDENTIFY_DEVICE)
        };
        Self {
            length: TransferLength::SECTOR_COUNT,
            byte_block: true,
            ..Self::new(AtaProtocol::PIO_DATA_IN, AtaDirection::FromDevice, taskfile)
        }
    }

    /// A SMART subcommand reading one 512-byte block.
    pub fn smart_read(feature: SmartFeature) -> Self {
        let taskfile = AtaTaskfile {
            features: feature.0.into(),
            count: 1,
            lba: SMART_LBA_SIGNATURE,
            ..AtaTaskfile::new(AtaCommand::SMART)
        };
        Self {
            length: TransferLength::SECTOR_COUNT,
            byte_block: true,
            ..Self::new(AtaProtocol::PIO_DATA_IN, AtaDirection::FromDevice, taskfile)
        }
    }

    fn flags(&self) -> FieldValues<AtaPassThroughField> {
        use AtaPassThroughField as F;
        FieldValues::new()
            .with(F::MultipleCount, self.multiple_count)
            .with(F::Protocol, self.protocol.0)
            .with(F::OffLine, self.off_line)
            .with(F::CkCond, self.check_condition)
            .with(F::TType, self.logical_block_units)
            .with(F::TDir, self.direction == AtaDirection::FromDevice)
            .with(F::BytBlok, self.byte_block)
            .with(F::TLength, self.length.0)
            .with(F::Command, self.taskfile.command.0)
            .with(F::Control, self.control)
    }
}

field_ids! {
    /// Fields of the ATA PASS-THROUGH command blocks.
    pub enum AtaPassThroughField {
        OperationCode,
        MultipleCount,
        Protocol,
        /// The 48-bit taskfile is valid.
        Extend,
        OffLine,
        /// Check condition.
        CkCond,
        /// Transfer type.
        TType,
        /// Transfer direction; set for device to host.
        TDir,
        /// Byte or block transfer length.
        BytBlok,
        TLength,
        Features,
        Count,
        /// LBA bits 7:0, with bits 31:24 in the upper byte for the 16-byte
        /// command.
        LbaLow,
        /// LBA bits 15:8, with bits 39:32 in the upper byte.
        LbaMid,
        /// LBA bits 23:16, with bits 47:40 in the upper byte.
        LbaHigh,
        Device,
        Command,
        Control,
    }
}

pub const ATA_PASS_THROUGH_16: FieldTable<AtaPassThroughField> = FieldTable::new(&[
    (AtaPassThroughField::OperationCode, FieldSpec::bytes(0, 1).le()),
    (AtaPassThroughField::MultipleCount, FieldSpec::mask(1, 0xe0)),
    (AtaPassThroughField::Protocol, FieldSpec::mask(1, 0x1e)),
    (AtaPassThroughField::Extend, FieldSpec::mask(1, 0x01)),
    (AtaPassThroughField::OffLine, FieldSpec::mask(2, 0xc0)),
    (AtaPassThroughField::CkCond, FieldSpec::mask(2, 0x20)),
    (AtaPassThroughField::TType, FieldSpec::mask(2, 0x10)),
    (AtaPassThroughField::TDir, FieldSpec::mask(2, 0x08)),
    (AtaPassThroughField::BytBlok, FieldSpec::mask(2, 0x04)),
    (AtaPassThroughField::TLength, FieldSpec::mask(2, 0x03)),
    (AtaPassThroughField::Features, FieldSpec::mask(3, 0xffff)),
    (AtaPassThroughField::Count, FieldSpec::mask(5, 0xffff)),
    (AtaPassThroughField::LbaLow, FieldSpec::mask(7, 0xffff)),
    (AtaPassThroughField::LbaMid, FieldSpec::mask(9, 0xffff)),
    (AtaPassThroughField::LbaHigh, FieldSpec::mask(11, 0xffff)),
    (AtaPassThroughField::Device, FieldSpec::bytes(13, 1).le()),
    (AtaPassThroughField::Command, FieldSpec::bytes(14, 1).le()),
    (AtaPassThroughField::Control, FieldSpec::bytes(15, 1).le()),
]);

const _: () = assert!(ATA_PASS_THROUGH_16.min_len() == ATA_PASS_THROUGH_16_LEN);

pub const ATA_PASS_THROUGH_12: FieldTable<AtaPassThroughField> = FieldTable::new(&[
    (AtaPassThroughField::OperationCode, FieldSpec::bytes(0, 1).le()),
    (AtaPassThroughField::MultipleCount, FieldSpec::mask(1, 0xe0)),
    (AtaPassThroughField::Protocol, FieldSpec::mask(1, 0x1e)),
    (AtaPassThroughField::OffLine, FieldSpec::mask(2, 0xc0)),
    (AtaPassThroughField::CkCond, FieldSpec::mask(2, 0x20)),
    (AtaPassThroughField::TType, FieldSpec::mask(2, 0x10)),
    (AtaPassThroughField::TDir, FieldSpec::mask(2, 0x08)),
    (AtaPassThroughField::BytBlok, FieldSpec::mask(2, 0x04)),
    (AtaPassThroughField::TLength, FieldSpec::mask(2, 0x03)),
    (AtaPassThroughField::Features, FieldSpec::bytes(3, 1).le()),
    (AtaPassThroughField::Count, FieldSpec::bytes(4, 1).le()),
    (AtaPassThroughField::LbaLow, FieldSpec::bytes(5, 1).le()),
    (AtaPassThroughField::LbaMid, FieldSpec::bytes(6, 1).le()),
    (AtaPassThroughField::LbaHigh, FieldSpec::bytes(7, 1).le()),
    (AtaPassThroughField::Device, FieldSpec::bytes(8, 1).le()),
    (AtaPassThroughField::Command, FieldSpec::bytes(9, 1).le()),
    (AtaPassThroughField::Control, FieldSpec::bytes(11, 1).le()),
]);

const _: () = assert!(ATA_PASS_THROUGH_12.min_len() == ATA_PASS_THROUGH_12_LEN);

/// Builds an ATA PASS-THROUGH(16) command block.
pub fn ata_pass_through_16(
    request: &AtaPassThrough,
) -> Result<[u8; ATA_PASS_THROUGH_16_LEN], FieldError> {
    use AtaPassThroughField as F;

    let tf = &request.taskfile;
    // Each LBA register pair is (previous content, current content).
    let pair = |shift: u32| (((tf.lba >> (shift + 24)) & 0xff) << 8) | ((tf.lba >> shift) & 0xff);
    let values = request
        .flags()
        .with(F::OperationCode, ScsiOp::ATA_PASSTHROUGH16.0)
        .with(F::Extend, tf.is_extended())
        .with(F::Features, tf.features)
        .with(F::Count, tf.count)
        .with(F::LbaLow, pair(0))
        .with(F::LbaMid, pair(8))
        .with(F::LbaHigh, pair(16))
        .with(F::Device, tf.device);

    let mut cdb = [0; ATA_PASS_THROUGH_16_LEN];
    ATA_PASS_THROUGH_16.encode(&values, &mut cdb)?;
    Ok(cdb)
}

/// Builds an ATA PASS-THROUGH(12) command block. Only 28-bit commands fit;
/// LBA bits 27:24 go in the low nibble of the device register.
pub fn ata_pass_through_12(
    request: &AtaPassThrough,
) -> Result<[u8; ATA_PASS_THROUGH_12_LEN], FieldError> {
    use AtaPassThroughField as F;

    let tf = &request.taskfile;
    if tf.lba > MAX_LBA28 {
        return Err(FieldError::ValueTooLarge {
            field: F::LbaHigh.name(),
            value: tf.lba,
            max: MAX_LBA28,
        });
    }
    let device = u64::from(tf.device) | (tf.lba >> 24);
    let values = request
        .flags()
        .with(F::OperationCode, ScsiOp::ATA_PASSTHROUGH12.0)
        .with(F::Features, tf.features)
        .with(F::Count, tf.count)
        .with(F::LbaLow, tf.lba & 0xff)
        .with(F::LbaMid, (tf.lba >> 8) & 0xff)
        .with(F::LbaHigh, (tf.lba >> 16) & 0xff)
        .with(F::Device, device);

    let mut cdb = [0; ATA_PASS_THROUGH_12_LEN];
    ATA_PASS_THROUGH_12.encode(&values, &mut cdb)?;
    Ok(cdb)
}

field_ids! {
    /// IDENTIFY DEVICE fields. Offsets are in bytes; ATA numbers words.
    pub enum IdentifyDeviceField {
        /// Words 10-19.
        SerialNumber,
        /// Words 23-26.
        FirmwareRevision,
        /// Words 27-46.
        ModelNumber,
        LbaSupported,
        /// Words 60-61.
        Lba28Sectors,
        SmartSupported,
        Lba48Supported,
        SmartEnabled,
        /// Words 100-103.
        Lba48Sectors,
        /// Word 106 bits 15:14; 01b when word 106 is valid.
        SectorSizeValid,
        MultipleLogicalPerPhysical,
        LogicalLongerThan256Words,
        LogicalPerPhysicalLog2,
        /// Words 117-118.
        LogicalSectorWords,
        /// Word 217.
        RotationRate,
    }
}

pub const IDENTIFY_DEVICE: FieldTable<IdentifyDeviceField> = FieldTable::new(&[
    (IdentifyDeviceField::SerialNumber, FieldSpec::bytes(20, 20)),
    (IdentifyDeviceField::FirmwareRevision, FieldSpec::bytes(46, 8)),
    (IdentifyDeviceField::ModelNumber, FieldSpec::bytes(54, 40)),
    (IdentifyDeviceField::LbaSupported, FieldSpec::mask(98, 0x0200).le()),
    (IdentifyDeviceField::Lba28Sectors, FieldSpec::bytes(120, 4).le()),
    (IdentifyDeviceField::SmartSupported, FieldSpec::mask(164, 0x0001).le()),
    (IdentifyDeviceField::Lba48Supported, FieldSpec::mask(166, 0x0400).le()),
    (IdentifyDeviceField::SmartEnabled, FieldSpec::mask(170, 0x0001).le()),
    (IdentifyDeviceField::Lba48Sectors, FieldSpec::bytes(200, 8).le()),
    (IdentifyDeviceField::SectorSizeValid, FieldSpec::mask(212, 0xc000).le()),
    (IdentifyDeviceField::MultipleLogicalPerPhysical, FieldSpec::mask(212, 0x2000).le()),
    (IdentifyDeviceField::LogicalLongerThan256Words, FieldSpec::mask(212, 0x1000).le()),
    (IdentifyDeviceField::LogicalPerPhysicalLog2, FieldSpec::mask(212, 0x000f).le()),
    (IdentifyDeviceField::LogicalSectorWords, FieldSpec::bytes(234, 4).le()),
    (IdentifyDeviceField::RotationRate, FieldSpec::bytes(434, 2).le()),
]);

const _: () = assert!(IDENTIFY_DEVICE.min_len() <= IDENTIFY_DEVICE_DATA_LEN);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RotationRate {
    NonRotating,
    Rpm(u16),
}

/// Selected IDENTIFY DEVICE fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaIdentity {
    pub serial_number: String,
    pub firmware_revision: String,
    pub model_number: String,
    pub lba_supported: bool,
    pub lba48_supported: bool,
    pub smart_supported: bool,
    pub smart_enabled: bool,
    /// User addressable sectors, from the 48-bit count when supported.
    pub sectors: u64,
    pub logical_sector_size: u32,
    pub physical_sector_size: u32,
    /// `None` if not reported.
    pub rotation_rate: Option<RotationRate>,
}

/// ATA strings store the first character of each word in its high byte.
fn ata_string(raw: &[u8]) -> String {
    let swapped: Vec<u8> = raw
        .chunks_exact(2)
        .flat_map(|word| [word[1], word[0]])
        .collect();
    String::from_utf8_lossy(&swapped)
        .trim_matches(|c| c == ' ' || c == '\0')
        .to_owned()
}

impl AtaIdentity {
    pub fn decode(data: &[u8]) -> Result<Self, FieldError> {
        use IdentifyDeviceField as F;

        let v = IDENTIFY_DEVICE.decode(data)?;
        let uint = |id| v.get_u64(id).unwrap_or_default();
        let string = |id| v.get_bytes(id).map(ata_string).unwrap_or_default();

        let lba48_supported = uint(F::Lba48Supported) != 0;
        let sectors = if lba48_supported {
            uint(F::Lba48Sectors) & 0xffff_ffff_ffff
        } else {
            uint(F::Lba28Sectors)
        };

        let word106_valid = uint(F::SectorSizeValid) == 0b01;
        let logical_sector_size = if word106_valid && uint(F::LogicalLongerThan256Words) != 0 {
            (uint(F::LogicalSectorWords) * 2) as u32
        } else {
            512
        };
        let physical_sector_size = if word106_valid && uint(F::MultipleLogicalPerPhysical) != 0 {
            logical_sector_size << uint(F::LogicalPerPhysicalLog2)
        } else {
            logical_sector_size
        };

        let rotation_rate = match uint(F::RotationRate) {
            1 => Some(RotationRate::NonRotating),
            rpm @ 0x0401..=0xfffe => Some(RotationRate::Rpm(rpm as u16)),
            _ => None,
        };

        Ok(Self {
            serial_number: string(F::SerialNumber),
            firmware_revision: string(F::FirmwareRevision),
            model_number: string(F::ModelNumber),
            lba_supported: uint(F::LbaSupported) != 0,
            lba48_supported,
            smart_supported: uint(F::SmartSupported) != 0,
            smart_enabled: uint(F::SmartEnabled) != 0,
            sectors,
            logical_sector_size,
            physical_sector_size,
            rotation_rate,
        })
    }
}
