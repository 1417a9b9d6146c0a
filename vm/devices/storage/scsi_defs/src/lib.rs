// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! SCSI definitions used to pass commands through to block devices: operation
//! codes, status, fixed-format sense data, and the ATA PASS-THROUGH command
//! blocks in [`ata`].

#![expect(missing_docs)]

pub mod ata;

use bitfield_struct::bitfield;
use open_enum::open_enum;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

type U32BE = zerocopy::byteorder::U32<zerocopy::byteorder::BigEndian>;

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum ScsiOp {
    TEST_UNIT_READY = 0x00,
    REQUEST_SENSE = 0x03,
    INQUIRY = 0x12,
    MODE_SENSE = 0x1A,
    START_STOP_UNIT = 0x1B,
    SEND_DIAGNOSTIC = 0x1D,
    READ_CAPACITY = 0x25,
    READ = 0x28,
    WRITE = 0x2A,
    VERIFY = 0x2F,
    SYNCHRONIZE_CACHE = 0x35,
    WRITE_DATA_BUFF = 0x3B,
    READ_DATA_BUFF = 0x3C,
    LOG_SENSE = 0x4D,
    MODE_SENSE10 = 0x5A,
    ATA_PASSTHROUGH16 = 0x85,
    READ16 = 0x88,
    WRITE16 = 0x8A,
    SERVICE_ACTION_IN16 = 0x9E,
    REPORT_LUNS = 0xA0,
    ATA_PASSTHROUGH12 = 0xA1,
    SECURITY_PROTOCOL_IN = 0xA2,
    SECURITY_PROTOCOL_OUT = 0xB5,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum SenseKey {
    NO_SENSE = 0x00,
    RECOVERED_ERROR = 0x01,
    NOT_READY = 0x02,
    MEDIUM_ERROR = 0x03,
    HARDWARE_ERROR = 0x04,
    ILLEGAL_REQUEST = 0x05,
    UNIT_ATTENTION = 0x06,
    DATA_PROTECT = 0x07,
    BLANK_CHECK = 0x08,
    UNIQUE = 0x09,
    COPY_ABORTED = 0x0A,
    ABORTED_COMMAND = 0x0B,
    EQUAL = 0x0C,
    VOL_OVERFLOW = 0x0D,
    MISCOMPARE = 0x0E,
    RESERVED = 0x0F,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum SenseDataErrorCode {
    FIXED_CURRENT = 0x70,
    FIXED_DEFERRED = 0x71,
    DESCRIPTOR_CURRENT = 0x72,
    DESCRIPTOR_DEFERRED = 0x73,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum AdditionalSenseCode {
    NO_SENSE = 0x00,
    NO_SEEK_COMPLETE = 0x02,
    LUN_NOT_READY = 0x04,
    LUN_COMMUNICATION = 0x08,
    WARNING = 0x0B,
    WRITE_ERROR = 0x0C,
    CRC_OR_ECC_ERROR = 0x10,
    UNRECOVERED_ERROR = 0x11,
    ILLEGAL_COMMAND = 0x20,
    ILLEGAL_BLOCK = 0x21,
    INVALID_CDB = 0x24,
    INVALID_LUN = 0x25,
    INVALID_FIELD_PARAMETER_LIST = 0x26,
    WRITE_PROTECT = 0x27,
    MEDIUM_CHANGED = 0x28,
    BUS_RESET = 0x29,
    PARAMETERS_CHANGED = 0x2A,
    COMMAND_SEQUENCE_ERROR = 0x2C,
    NO_MEDIA_IN_DEVICE = 0x3a,
    LOGICAL_UNIT_ERROR = 0x3e,
    INTERNAL_TARGET_FAILURE = 0x44,
    FAILURE_PREDICTION_THRESHOLD_EXCEEDED = 0x5d,
}

// ATA PASS-THROUGH information available (ASC 0x00) qualifier
pub const SCSI_SENSEQ_ATA_PASS_THROUGH_INFORMATION_AVAILABLE: u8 = 0x1D;

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SenseErrorCodeByte {
    #[bits(7)]
    pub error_code: u8,
    /// The information field is defined.
    pub valid: bool,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SenseKeyByte {
    #[bits(4)]
    pub sense_key: u8,
    _reserved: bool,
    pub incorrect_length: bool,
    pub end_of_media: bool,
    pub file_mark: bool,
}

/// Fixed-format sense data.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SenseData {
    pub error_code: SenseErrorCodeByte,
    pub segment_number: u8,
    pub sense_key: SenseKeyByte,
    pub information: U32BE,
    pub additional_sense_length: u8,
    pub command_specific_information: U32BE,
    pub additional_sense_code: u8,
    pub additional_sense_code_qualifier: u8,
    pub field_replaceable_unit_code: u8,
    pub sense_key_specific: [u8; 3],
}

/// Bytes of sense data up to and including the additional sense length.
pub const SENSE_DATA_HEADER_LEN: usize = 8;

impl SenseData {
    pub fn new(
        sense_key: SenseKey,
        additional_sense_code: AdditionalSenseCode,
        additional_sense_code_qualifier: u8,
    ) -> Self {
        SenseData {
            error_code: SenseErrorCodeByte::new()
                .with_error_code(SenseDataErrorCode::FIXED_CURRENT.0),
            segment_number: 0,
            sense_key: SenseKeyByte::new().with_sense_key(sense_key.0),
            information: 0.into(),
            additional_sense_length: (size_of::<SenseData>() - SENSE_DATA_HEADER_LEN) as u8,
            command_specific_information: 0.into(),
            additional_sense_code: additional_sense_code.0,
            additional_sense_code_qualifier,
            field_replaceable_unit_code: 0,
            sense_key_specific: [0; 3],
        }
    }
}

#[derive(Debug, Error)]
pub enum SenseError {
    #[error("sense data of {0} bytes is too short")]
    TooShort(usize),
    #[error("descriptor format sense data (response code {0:#x})")]
    DescriptorFormat(u8),
    #[error("unknown sense response code {0:#x}")]
    UnknownResponseCode(u8),
}

/// Decoded fixed-format sense data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSense {
    pub error_code: SenseDataErrorCode,
    /// `information` is defined.
    pub valid: bool,
    pub sense_key: SenseKey,
    pub incorrect_length: bool,
    pub end_of_media: bool,
    pub file_mark: bool,
    pub information: u32,
    pub command_specific_information: u32,
    pub additional_sense_code: AdditionalSenseCode,
    pub additional_sense_code_qualifier: u8,
    pub field_replaceable_unit_code: u8,
    pub sense_key_specific: [u8; 3],
}

impl FixedSense {
    /// Decodes fixed-format sense data. Bytes past the additional sense length,
    /// or past the end of `data`, read as zero.
    pub fn decode(data: &[u8]) -> Result<Self, SenseError> {
        if data.len() < SENSE_DATA_HEADER_LEN {
            return Err(SenseError::TooShort(data.len()));
        }
        let mut raw = [0u8; size_of::<SenseData>()];
        let len = (SENSE_DATA_HEADER_LEN + usize::from(data[7]))
            .min(data.len())
            .min(raw.len());
        raw[..len].copy_from_slice(&data[..len]);
        let sense = SenseData::read_from_bytes(&raw[..]).map_err(|_| SenseError::TooShort(len))?;

        let error_code = SenseDataErrorCode(sense.error_code.error_code());
        match error_code {
            SenseDataErrorCode::FIXED_CURRENT | SenseDataErrorCode::FIXED_DEFERRED => {}
            SenseDataErrorCode::DESCRIPTOR_CURRENT | SenseDataErrorCode::DESCRIPTOR_DEFERRED => {
                return Err(SenseError::DescriptorFormat(error_code.0));
            }
            _ => return Err(SenseError::UnknownResponseCode(error_code.0)),
        }

        Ok(Self {
            error_code,
            valid: sense.error_code.valid(),
            sense_key: SenseKey(sense.sense_key.sense_key()),
            incorrect_length: sense.sense_key.incorrect_length(),
            end_of_media: sense.sense_key.end_of_media(),
            file_mark: sense.sense_key.file_mark(),
            information: sense.information.get(),
            command_specific_information: sense.command_specific_information.get(),
            additional_sense_code: AdditionalSenseCode(sense.additional_sense_code),
            additional_sense_code_qualifier: sense.additional_sense_code_qualifier,
            field_replaceable_unit_code: sense.field_replaceable_unit_code,
            sense_key_specific: sense.sense_key_specific,
        })
    }

    /// Whether this is the sense data an ATA PASS-THROUGH command returns
    /// when asked for the ATA status registers with `CK_COND`.
    pub fn ata_status_available(&self) -> bool {
        self.sense_key == SenseKey::RECOVERED_ERROR
            && self.additional_sense_code == AdditionalSenseCode::NO_SENSE
            && self.additional_sense_code_qualifier
                == SCSI_SENSEQ_ATA_PASS_THROUGH_INFORMATION_AVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sense_data_layout() {
        assert_eq!(size_of::<SenseData>(), 18);
        let sense = SenseData::new(SenseKey::ILLEGAL_REQUEST, AdditionalSenseCode::INVALID_CDB, 0);
        let bytes = sense.as_bytes();
        assert_eq!(bytes[0], 0x70);
        assert_eq!(bytes[2], 0x05);
        assert_eq!(bytes[7], 10);
        assert_eq!(bytes[12], 0x24);
    }

    #[test]
    fn decode_fixed_sense() {
        let sense = SenseData::new(SenseKey::ILLEGAL_REQUEST, AdditionalSenseCode::INVALID_CDB, 0);
        let fixed = FixedSense::decode(sense.as_bytes()).unwrap();
        assert_eq!(fixed.error_code, SenseDataErrorCode::FIXED_CURRENT);
        assert!(!fixed.valid);
        assert_eq!(fixed.sense_key, SenseKey::ILLEGAL_REQUEST);
        assert_eq!(fixed.additional_sense_code, AdditionalSenseCode::INVALID_CDB);

        let mut raw = [0u8; 18];
        raw[0] = 0xf0;
        raw[2] = 0x20 | 0x03;
        raw[3..7].copy_from_slice(&0x0012_3456u32.to_be_bytes());
        raw[7] = 10;
        raw[12] = 0x11;
        raw[13] = 0x04;
        let fixed = FixedSense::decode(&raw).unwrap();
        assert!(fixed.valid);
        assert!(fixed.incorrect_length);
        assert!(!fixed.file_mark);
        assert_eq!(fixed.sense_key, SenseKey::MEDIUM_ERROR);
        assert_eq!(fixed.information, 0x12_3456);
        assert_eq!(fixed.additional_sense_code, AdditionalSenseCode::UNRECOVERED_ERROR);
        assert_eq!(fixed.additional_sense_code_qualifier, 4);
    }

    #[test]
    fn short_sense_reads_zero() {
        let mut raw = [0xffu8; 18];
        raw[0] = 0x70;
        raw[2] = 0x06;
        raw[7] = 0;
        let fixed = FixedSense::decode(&raw).unwrap();
        assert_eq!(fixed.sense_key, SenseKey::UNIT_ATTENTION);
        assert_eq!(fixed.additional_sense_code, AdditionalSenseCode::NO_SENSE);
        assert_eq!(fixed.command_specific_information, 0);

        assert!(matches!(
            FixedSense::decode(&raw[..5]),
            Err(SenseError::TooShort(5))
        ));
    }

    #[test]
    fn ata_status_sense() {
        let sense = SenseData::new(
            SenseKey::RECOVERED_ERROR,
            AdditionalSenseCode::NO_SENSE,
            SCSI_SENSEQ_ATA_PASS_THROUGH_INFORMATION_AVAILABLE,
        );
        assert!(FixedSense::decode(sense.as_bytes())
            .unwrap()
            .ata_status_available());

        let sense = SenseData::new(SenseKey::ILLEGAL_REQUEST, AdditionalSenseCode::INVALID_CDB, 0);
        assert!(!FixedSense::decode(sense.as_bytes())
            .unwrap()
            .ata_status_available());
    }

    #[test]
    fn descriptor_sense_rejected() {
        let mut raw = [0u8; 8];
        raw[0] = 0x72;
        assert!(matches!(
            FixedSense::decode(&raw),
            Err(SenseError::DescriptorFormat(0x72))
        ));
        raw[0] = 0x7f;
        assert!(matches!(
            FixedSense::decode(&raw),
            Err(SenseError::UnknownResponseCode(0x7f))
        ));
    }
}
