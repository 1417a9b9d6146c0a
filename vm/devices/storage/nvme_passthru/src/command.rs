// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command descriptors: one NVMe command, its buffers, and its completion.

use crate::buffer::DataBuffer;
use crate::transport::TransportError;
use field_codec::FieldError;
use field_codec::FieldId;
use field_codec::FieldTable;
use field_codec::FieldValues;
use nvme_spec::nvm::NvmOpcode;
use nvme_spec::AdminOpcode;
use nvme_spec::DataDirection;
use nvme_spec::StatusWord;
use std::time::Duration;
use thiserror::Error;

/// An opcode together with the command set it belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Admin(AdminOpcode),
    Io(NvmOpcode),
}

impl Opcode {
    pub fn code(&self) -> u8 {
        match *self {
            Opcode::Admin(AdminOpcode(code)) | Opcode::Io(NvmOpcode(code)) => code,
        }
    }

    pub fn direction(&self) -> DataDirection {
        nvme_spec::Opcode(self.code()).direction()
    }
}

/// One of the six command specific dwords.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandWord {
    Cdw10,
    Cdw11,
    Cdw12,
    Cdw13,
    Cdw14,
    Cdw15,
}

impl CommandWord {
    fn index(self) -> usize {
        match self {
            CommandWord::Cdw10 => 0,
            CommandWord::Cdw11 => 1,
            CommandWord::Cdw12 => 2,
            CommandWord::Cdw13 => 3,
            CommandWord::Cdw14 => 4,
            CommandWord::Cdw15 => 5,
        }
    }
}

/// The completion fields filled in by a transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// The status field, without the phase tag.
    pub status: StatusWord,
    /// Command specific result (completion dword 0).
    pub result: u32,
}

enum DataRegion<'a> {
    Owned(DataBuffer),
    Borrowed(&'a mut DataBuffer),
}

impl DataRegion<'_> {
    fn buffer(&self) -> &DataBuffer {
        match self {
            DataRegion::Owned(buffer) => buffer,
            DataRegion::Borrowed(buffer) => buffer,
        }
    }

    fn buffer_mut(&mut self) -> &mut DataBuffer {
        match self {
            DataRegion::Owned(buffer) => buffer,
            DataRegion::Borrowed(buffer) => buffer,
        }
    }
}

struct DataTransfer<'a> {
    region: DataRegion<'a>,
    len: usize,
}

/// A single NVMe command instance.
///
/// Built once with [`CommandBuilder`], executed at most once by a
/// [`DeviceTransport`](crate::DeviceTransport), and read-only after its
/// completion has been recorded.
pub struct CommandDescriptor<'a> {
    opcode: Opcode,
    nsid: u32,
    cdw2: u32,
    cdw3: u32,
    cdws: [u32; 6],
    data: Option<DataTransfer<'a>>,
    metadata: Option<DataBuffer>,
    timeout: Option<Duration>,
    completion: Option<Completion>,
}

impl std::fmt::Debug for CommandDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("opcode", &self.opcode)
            .field("nsid", &self.nsid)
            .field("cdws", &self.cdws)
            .field("data_len", &self.data_len())
            .field("metadata_len", &self.metadata_len())
            .field("timeout", &self.timeout)
            .field("completion", &self.completion)
            .finish()
    }
}

impl<'a> CommandDescriptor<'a> {
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn nsid(&self) -> u32 {
        self.nsid
    }

    pub fn cdw2(&self) -> u32 {
        self.cdw2
    }

    pub fn cdw3(&self) -> u32 {
        self.cdw3
    }

    pub fn word(&self, word: CommandWord) -> u32 {
        self.cdws[word.index()]
    }

    /// Command dwords 10 through 15.
    pub fn words(&self) -> [u32; 6] {
        self.cdws
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn data_direction(&self) -> DataDirection {
        self.opcode.direction()
    }

    /// Number of bytes transferred through the data buffer.
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.len)
    }

    /// The transfer window of the data buffer.
    pub fn data(&self) -> Option<&[u8]> {
        self.data
            .as_ref()
            .map(|data| &data.region.buffer().as_bytes()[..data.len])
    }

    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.data
            .as_mut()
            .map(|data| &mut data.region.buffer_mut().as_mut_bytes()[..data.len])
    }

    pub fn metadata_len(&self) -> usize {
        self.metadata.as_ref().map_or(0, DataBuffer::len)
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_ref().map(DataBuffer::as_bytes)
    }

    pub fn metadata_mut(&mut self) -> Option<&mut [u8]> {
        self.metadata.as_mut().map(DataBuffer::as_mut_bytes)
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    /// Records the completion. Called by transports, exactly once.
    pub fn complete(&mut self, status: StatusWord, result: u32) -> Result<(), TransportError> {
        if self.completion.is_some() {
            return Err(TransportError::AlreadyExecuted);
        }
        self.completion = Some(Completion { status, result });
        Ok(())
    }

    /// Renders the 64-byte submission queue entry, with the data and metadata
    /// pointers set to the buffer addresses.
    pub fn submission_entry(&self) -> nvme_spec::Command {
        let [cdw10, cdw11, cdw12, cdw13, cdw14, cdw15] = self.cdws;
        nvme_spec::Command {
            cdw0: nvme_spec::Cdw0::new().with_opcode(self.opcode.code()),
            nsid: self.nsid,
            cdw2: self.cdw2,
            cdw3: self.cdw3,
            mptr: self.metadata.as_ref().map_or(0, DataBuffer::address),
            dptr: [
                self.data
                    .as_ref()
                    .map_or(0, |data| data.region.buffer().address()),
                0,
            ],
            cdw10,
            cdw11,
            cdw12,
            cdw13,
            cdw14,
            cdw15,
        }
    }

    /// Returns the data buffer if the descriptor owns it.
    pub fn into_data(self) -> Option<DataBuffer> {
        match self.data?.region {
            DataRegion::Owned(buffer) => Some(buffer),
            DataRegion::Borrowed(_) => None,
        }
    }
}

/// An error building a [`CommandDescriptor`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("buffer of {len} bytes is shorter than the {required} byte transfer")]
    BufferTooShort { required: usize, len: usize },
    #[error("transfer length {len} is not a non-zero multiple of 4 bytes")]
    UnalignedTransfer { len: usize },
    #[error("failed to encode {word:?}")]
    Encode {
        word: CommandWord,
        #[source]
        source: FieldError,
    },
}

/// Builds a [`CommandDescriptor`].
#[must_use]
pub struct CommandBuilder<'a> {
    opcode: Opcode,
    nsid: u32,
    cdw2: u32,
    cdw3: u32,
    cdws: [u32; 6],
    transfer_len: Option<usize>,
    data: Option<DataRegion<'a>>,
    metadata: Option<DataBuffer>,
    timeout: Option<Duration>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            nsid: 0,
            cdw2: 0,
            cdw3: 0,
            cdws: [0; 6],
            transfer_len: None,
            data: None,
            metadata: None,
            timeout: None,
        }
    }

    pub fn nsid(mut self, nsid: u32) -> Self {
        self.nsid = nsid;
        self
    }

    pub fn cdw2(mut self, value: u32) -> Self {
        self.cdw2 = value;
        self
    }

    pub fn cdw3(mut self, value: u32) -> Self {
        self.cdw3 = value;
        self
    }

    /// Sets a command dword to a raw value.
    pub fn word(mut self, word: CommandWord, value: u32) -> Self {
        self.cdws[word.index()] = value;
        self
    }

    /// Encodes `values` into a command dword using a table describing the
    /// dword's sub-fields. Fields not named by `values` keep their current
    /// bits.
    pub fn encode_word<F: FieldId>(
        mut self,
        word: CommandWord,
        table: &FieldTable<F>,
        values: &FieldValues<F>,
    ) -> Result<Self, BuildError> {
        let slot = &mut self.cdws[word.index()];
        let mut bytes = slot.to_le_bytes();
        table
            .encode(values, &mut bytes)
            .map_err(|source| BuildError::Encode { word, source })?;
        *slot = u32::from_le_bytes(bytes);
        Ok(self)
    }

    /// Requests a data transfer of `len` bytes. Without a buffer from
    /// [`CommandBuilder::data_buffer`], a zeroed one is allocated.
    pub fn transfer_len(mut self, len: usize) -> Self {
        self.transfer_len = Some(len);
        self
    }

    /// Transfers through a caller-owned buffer. The descriptor borrows it for
    /// its lifetime.
    pub fn data_buffer(mut self, buffer: &'a mut DataBuffer) -> Self {
        self.data = Some(DataRegion::Borrowed(buffer));
        self
    }

    /// Transfers through `buffer`, which the descriptor takes ownership of.
    pub fn owned_data_buffer(mut self, buffer: DataBuffer) -> Self {
        self.data = Some(DataRegion::Owned(buffer));
        self
    }

    pub fn metadata_buffer(mut self, buffer: DataBuffer) -> Self {
        self.metadata = Some(buffer);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<CommandDescriptor<'a>, BuildError> {
        let data = match (self.data, self.transfer_len) {
            (None, None) => None,
            (None, Some(len)) => {
                check_alignment(len)?;
                Some(DataTransfer {
                    region: DataRegion::Owned(DataBuffer::new(len)),
                    len,
                })
            }
            (Some(region), len) => {
                let available = region.buffer().len();
                let len = len.unwrap_or(available);
                check_alignment(len)?;
                if available < len {
                    return Err(BuildError::BufferTooShort {
                        required: len,
                        len: available,
                    });
                }
                Some(DataTransfer { region, len })
            }
        };

        Ok(CommandDescriptor {
            opcode: self.opcode,
            nsid: self.nsid,
            cdw2: self.cdw2,
            cdw3: self.cdw3,
            cdws: self.cdws,
            data,
            metadata: self.metadata,
            timeout: self.timeout,
            completion: None,
        })
    }
}

fn check_alignment(len: usize) -> Result<(), BuildError> {
    if len == 0 || len % 4 != 0 {
        return Err(BuildError::UnalignedTransfer { len });
    }
    Ok(())
}
