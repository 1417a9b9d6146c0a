// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The device transport abstraction.

use crate::command::CommandDescriptor;
use crate::status::classify;
use crate::status::CompletionOutcome;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// An error delivering a command to a device.
///
/// A transport error means the command's outcome is unknown; it is distinct
/// from a command that completed with a failure status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied opening {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("failed to open {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("device {} changed and could not be reopened", .path.display())]
    Replug {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("device control request failed")]
    Io(#[source] io::Error),
    #[error("command was already executed")]
    AlreadyExecuted,
    #[error("transport did not record a completion")]
    NotCompleted,
}

/// Executes commands against one device.
///
/// Implementations block until the device completes the command, then record
/// the completion with [`CommandDescriptor::complete`]. On error the
/// completion must be left unset.
pub trait DeviceTransport {
    fn execute(&mut self, command: &mut CommandDescriptor<'_>) -> Result<(), TransportError>;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for &mut T {
    fn execute(&mut self, command: &mut CommandDescriptor<'_>) -> Result<(), TransportError> {
        (**self).execute(command)
    }
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn execute(&mut self, command: &mut CommandDescriptor<'_>) -> Result<(), TransportError> {
        (**self).execute(command)
    }
}

/// Executes `command` on `transport` and classifies its completion.
pub fn issue<T: DeviceTransport + ?Sized>(
    transport: &mut T,
    command: &mut CommandDescriptor<'_>,
) -> Result<CompletionOutcome, TransportError> {
    if command.is_completed() {
        return Err(TransportError::AlreadyExecuted);
    }
    tracing::debug!(
        opcode = ?command.opcode(),
        nsid = command.nsid(),
        cdw10 = command.words()[0],
        data_len = command.data_len(),
        "issuing command"
    );
    transport.execute(command)?;
    let completion = command.completion().ok_or(TransportError::NotCompleted)?;
    let outcome = classify(completion.status.into());
    tracing::trace!(%outcome, result = completion.result, "command completed");
    Ok(outcome)
}
