// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous NVMe command passthrough.
//!
//! A [`CommandDescriptor`] describes one command: its opcode, addressing,
//! command dwords (packed with `field_codec` tables), and optional data and
//! metadata buffers. A [`DeviceTransport`] executes it against a device and
//! records the raw completion, which [`classify`] turns into a
//! [`CompletionOutcome`].
//!
//! Only one command is outstanding per transport; execution blocks the
//! calling thread until the device completes it or the timeout expires.

#![expect(missing_docs)]

pub mod admin;
mod buffer;
mod command;
#[cfg(target_os = "linux")]
pub mod linux;
mod status;
mod transport;

pub use buffer::DataBuffer;
pub use buffer::PAGE_SIZE;
pub use command::BuildError;
pub use command::CommandBuilder;
pub use command::CommandDescriptor;
pub use command::CommandWord;
pub use command::Completion;
pub use command::Opcode;
pub use status::classify;
pub use status::CompletionOutcome;
pub use status::StatusBucket;
pub use transport::issue;
pub use transport::DeviceTransport;
pub use transport::TransportError;
