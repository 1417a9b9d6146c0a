// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Definitions from the NVMe specifications:
//!
//! Base 2.0c: <https://nvmexpress.org/wp-content/uploads/NVM-Express-Base-Specification-2.0c-2022.10.04-Ratified.pdf>
//!
//! Fixed-size, fully populated structures are expressed as `zerocopy` types.
//! Structures that callers read field-by-field (identify data, log pages, the
//! packed command dwords) are described by `field_codec` tables in the
//! submodules.

#![expect(missing_docs)]

pub mod identify;
pub mod log;
pub mod nvm;
pub mod pel;

use bitfield_struct::bitfield;
use open_enum::open_enum;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Namespace identifier addressing every namespace (and controller-scoped
/// log pages).
pub const NSID_ALL: u32 = 0xffff_ffff;

/// Submission queue entry.
#[repr(C)]
#[derive(Copy, Clone, Debug, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Command {
    pub cdw0: Cdw0,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    pub mptr: u64,
    pub dptr: [u64; 2],
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
}

const _: () = assert!(size_of::<Command>() == 64);

#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdw0 {
    pub opcode: u8,
    #[bits(2)]
    pub fuse: u8,
    #[bits(4)]
    pub reserved: u8,
    #[bits(2)]
    pub psdt: u8,
    pub cid: u16,
}

/// Data transfer direction, encoded in the low two bits of every opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataDirection {
    None,
    HostToController,
    ControllerToHost,
    Bidirectional,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Opcode(pub u8);

impl Opcode {
    pub fn transfer_controller_to_host(&self) -> bool {
        self.0 & 0b10 != 0
    }

    pub fn transfer_host_to_controller(&self) -> bool {
        self.0 & 0b01 != 0
    }

    pub fn direction(&self) -> DataDirection {
        match (
            self.transfer_host_to_controller(),
            self.transfer_controller_to_host(),
        ) {
            (false, false) => DataDirection::None,
            (true, false) => DataDirection::HostToController,
            (false, true) => DataDirection::ControllerToHost,
            (true, true) => DataDirection::Bidirectional,
        }
    }
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum AdminOpcode {
    DELETE_IO_SUBMISSION_QUEUE = 0x00,
    CREATE_IO_SUBMISSION_QUEUE = 0x01,
    GET_LOG_PAGE = 0x02,
    DELETE_IO_COMPLETION_QUEUE = 0x04,
    CREATE_IO_COMPLETION_QUEUE = 0x05,
    IDENTIFY = 0x06,
    ABORT = 0x08,
    SET_FEATURES = 0x09,
    GET_FEATURES = 0x0a,
    ASYNCHRONOUS_EVENT_REQUEST = 0x0c,
    NAMESPACE_MANAGEMENT = 0x0d,
    FIRMWARE_COMMIT = 0x10,
    FIRMWARE_IMAGE_DOWNLOAD = 0x11,
    DEVICE_SELF_TEST = 0x14,
    NAMESPACE_ATTACHMENT = 0x15,
    KEEP_ALIVE = 0x18,
    DIRECTIVE_SEND = 0x19,
    DIRECTIVE_RECEIVE = 0x1a,
    NV_ME_MI_SEND = 0x1d,
    NV_ME_MI_RECEIVE = 0x1e,
    FORMAT_NVM = 0x80,
    SECURITY_SEND = 0x81,
    SECURITY_RECEIVE = 0x82,
    SANITIZE = 0x84,
    GET_LBA_STATUS = 0x86,
}

/// Completion queue entry.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Completion {
    pub dw0: u32,
    pub dw1: u32,
    pub sqhd: u16,
    pub sqid: u16,
    pub cid: u16,
    pub status: CompletionStatus,
}

#[bitfield(u16)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CompletionStatus {
    pub phase: bool,
    /// 8 bits of status code followed by 3 bits of the status code type.
    #[bits(11)]
    pub status: u16,
    #[bits(2)]
    pub crd: u8,
    pub more: bool,
    pub dnr: bool,
}

/// The status field of a completion without its phase tag, as returned by
/// pass-through interfaces such as the Linux NVMe ioctls.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct StatusWord {
    pub status_code: u8,
    #[bits(3)]
    pub status_code_type: u8,
    /// Command retry delay index.
    #[bits(2)]
    pub crd: u8,
    pub more: bool,
    /// Do not retry.
    pub dnr: bool,
    #[bits(1)]
    _rsvd: u8,
}

impl StatusWord {
    /// The combined status code type and status code.
    pub fn status(&self) -> Status {
        Status((u16::from(self.status_code_type()) << 8) | u16::from(self.status_code()))
    }
}

impl From<CompletionStatus> for StatusWord {
    fn from(value: CompletionStatus) -> Self {
        Self::from(u16::from(value) >> 1)
    }
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum StatusCodeType {
    GENERIC = 0,
    COMMAND_SPECIFIC = 1,
    MEDIA_ERROR = 2,
    PATH_RELATED = 3,
    VENDOR_SPECIFIC = 7,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u16)]
pub enum Status {
    SUCCESS = 0x00,
    INVALID_COMMAND_OPCODE = 0x01,
    INVALID_FIELD_IN_COMMAND = 0x02,
    COMMAND_ID_CONFLICT = 0x03,
    DATA_TRANSFER_ERROR = 0x04,
    COMMANDS_ABORTED_DUE_TO_POWER_LOSS_NOTIFICATION = 0x05,
    INTERNAL_ERROR = 0x06,
    COMMAND_ABORT_REQUESTED = 0x07,
    INVALID_NAMESPACE_OR_FORMAT = 0x0b,
    /// Reported by Get Log Page for the Persistent Event Log when the
    /// reporting context is in an unexpected state.
    COMMAND_SEQUENCE_ERROR = 0x0c,
    OPERATION_DENIED = 0x15,
    SANITIZE_IN_PROGRESS = 0x1d,
    NAMESPACE_IS_WRITE_PROTECTED = 0x20,
    COMMAND_INTERRUPTED = 0x21,
    TRANSIENT_TRANSPORT_ERROR = 0x22,
    ADMIN_COMMAND_MEDIA_NOT_READY = 0x24,

    LBA_OUT_OF_RANGE = 0x80,
    CAPACITY_EXCEEDED = 0x81,
    NAMESPACE_NOT_READY = 0x82,
    RESERVATION_CONFLICT = 0x83,
    FORMAT_IN_PROGRESS = 0x84,

    INVALID_LOG_PAGE = 0x109,
    INVALID_FORMAT = 0x10a,
    DEVICE_SELF_TEST_IN_PROGRESS = 0x11d,

    MEDIA_WRITE_FAULT = 0x280,
    MEDIA_UNRECOVERED_READ_ERROR = 0x281,
    MEDIA_END_TO_END_GUARD_CHECK_ERROR = 0x282,
    MEDIA_END_TO_END_APPLICATION_TAG_CHECK_ERROR = 0x283,
    MEDIA_END_TO_END_REFERENCE_TAG_CHECK_ERROR = 0x284,
    MEDIA_COMPARE_FAILURE = 0x285,
    MEDIA_ACCESS_DENIED = 0x286,
    MEDIA_DEALLOCATED_OR_UNWRITTEN_LOGICAL_BLOCK = 0x287,
}

impl Status {
    pub fn status_code(&self) -> u8 {
        self.0 as u8
    }

    pub fn status_code_type(&self) -> StatusCodeType {
        StatusCodeType((self.0 >> 8) as u8)
    }
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum Cns {
    NAMESPACE = 0x0,
    CONTROLLER = 0x1,
    ACTIVE_NAMESPACES = 0x2,
    DESCRIPTOR_NAMESPACE = 0x3,
}

#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum LogPageIdentifier {
    SUPPORTED_LOG_PAGES = 0x00,
    ERROR_INFORMATION = 0x01,
    HEALTH_INFORMATION = 0x02,
    FIRMWARE_SLOT_INFORMATION = 0x03,
    CHANGED_NAMESPACE_LIST = 0x04,
    COMMANDS_SUPPORTED_AND_EFFECTS = 0x05,
    DEVICE_SELF_TEST = 0x06,
    TELEMETRY_HOST_INITIATED = 0x07,
    TELEMETRY_CONTROLLER_INITIATED = 0x08,
    PERSISTENT_EVENT = 0x0d,
}

/// Log page attributes (LPA) from Identify Controller.
#[bitfield(u8)]
pub struct LogPageAttributes {
    pub smart_per_namespace: bool,
    pub commands_supported_and_effects: bool,
    /// Get Log Page supports NUMDU and the 64-bit log page offset.
    pub extended_data: bool,
    pub telemetry: bool,
    pub persistent_event: bool,
    #[bits(3)]
    _rsvd: u8,
}

/// Optional admin command support (OACS) from Identify Controller.
#[bitfield(u16)]
pub struct OptionalAdminCommandSupport {
    pub security_send_security_receive: bool,
    pub format_nvm: bool,
    pub firmware_activate_firmware_download: bool,
    pub ns_management: bool,
    pub self_test: bool,
    pub directives: bool,
    pub nvme_mi_send_nvme_mi_receive: bool,
    pub virtualization_management: bool,
    pub doorbell_buffer_config: bool,
    pub get_lba_status: bool,
    pub command_feature_lockdown: bool,
    #[bits(5)]
    _rsvd: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_direction() {
        assert_eq!(
            Opcode(AdminOpcode::GET_LOG_PAGE.0).direction(),
            DataDirection::ControllerToHost
        );
        assert_eq!(
            Opcode(AdminOpcode::FIRMWARE_IMAGE_DOWNLOAD.0).direction(),
            DataDirection::HostToController
        );
        assert_eq!(
            Opcode(AdminOpcode::KEEP_ALIVE.0).direction(),
            DataDirection::None
        );
    }

    #[test]
    fn status_word_layout() {
        // DNR, command specific, invalid log page.
        let word = StatusWord::from(0x4109u16);
        assert_eq!(word.status_code(), 0x09);
        assert_eq!(word.status_code_type(), 1);
        assert!(word.dnr());
        assert!(!word.more());
        assert_eq!(word.status(), Status::INVALID_LOG_PAGE);
        assert_eq!(
            word.status().status_code_type(),
            StatusCodeType::COMMAND_SPECIFIC
        );
    }

    #[test]
    fn status_word_from_completion_drops_phase() {
        let completion = CompletionStatus::new()
            .with_phase(true)
            .with_status(Status::COMMAND_SEQUENCE_ERROR.0)
            .with_more(true);
        let word = StatusWord::from(completion);
        assert_eq!(word.status(), Status::COMMAND_SEQUENCE_ERROR);
        assert!(word.more());
        assert!(!word.dnr());
    }
}
