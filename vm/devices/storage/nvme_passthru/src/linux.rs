// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVMe passthrough through the Linux `NVME_IOCTL_*_CMD` ioctls.

#![expect(unsafe_code)]

use crate::command::CommandDescriptor;
use crate::command::Opcode;
use crate::transport::DeviceTransport;
use crate::transport::TransportError;
use fs_err::os::unix::fs::OpenOptionsExt;
use nvme_spec::StatusWord;
use std::io;
use std::os::unix::prelude::*;
use std::path::Path;
use std::path::PathBuf;

mod ioctl {
    use nix::ioctl_readwrite;

    // struct nvme_passthru_cmd from linux/nvme_ioctl.h
    #[repr(C)]
    #[derive(Debug)]
    pub struct NvmeCmd {
        pub opcode: u8,
        pub flags: u8,
        pub rsvd1: u16,
        pub ns_id: u32,
        pub cdw2: u32,
        pub cdw3: u32,
        pub metadata: u64,
        pub addr: u64,
        pub metadata_len: u32,
        pub data_len: u32,
        pub cdw10: u32,
        pub cdw11: u32,
        pub cdw12: u32,
        pub cdw13: u32,
        pub cdw14: u32,
        pub cdw15: u32,
        pub timeout_ms: u32,
        pub result: u32,
    }

    const _: () = assert!(size_of::<NvmeCmd>() == 72);

    // #define NVME_IOCTL_ADMIN_CMD	_IOWR('N', 0x41, struct nvme_admin_cmd)
    const NVME_IOC_MAGIC: u8 = b'N';
    ioctl_readwrite!(nvme_ioctl_admin_cmd, NVME_IOC_MAGIC, 0x41, NvmeCmd);

    // #define NVME_IOCTL_IO_CMD	_IOWR('N', 0x43, struct nvme_passthru_cmd)
    ioctl_readwrite!(nvme_ioctl_io_cmd, NVME_IOC_MAGIC, 0x43, NvmeCmd);
}

/// Options for [`LinuxNvmeTransport`].
#[derive(Debug, Clone)]
pub struct LinuxTransportOptions {
    /// Open the device read-only. Sufficient for admin commands that only
    /// read data, such as Identify and Get Log Page.
    pub read_only: bool,
    /// Before each command, check whether the device node now refers to a
    /// different device and reopen it if so.
    pub detect_replug: bool,
}

impl Default for LinuxTransportOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            detect_replug: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct DeviceIdentity {
    dev: u64,
    ino: u64,
    rdev: u64,
}

impl DeviceIdentity {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = fs_err::metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
            rdev: meta.rdev(),
        })
    }
}

/// A [`DeviceTransport`] for an NVMe controller (`/dev/nvmeN`) or namespace
/// (`/dev/nvmeNnM`) device node.
#[derive(Debug)]
pub struct LinuxNvmeTransport {
    path: PathBuf,
    file: fs_err::File,
    identity: DeviceIdentity,
    options: LinuxTransportOptions,
}

impl LinuxNvmeTransport {
    pub fn open(
        path: impl Into<PathBuf>,
        options: LinuxTransportOptions,
    ) -> Result<Self, TransportError> {
        let path = path.into();
        let file = open_device(&path, &options).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => TransportError::NotFound(path.clone()),
            io::ErrorKind::PermissionDenied => TransportError::PermissionDenied(path.clone()),
            _ => TransportError::Open {
                path: path.clone(),
                err,
            },
        })?;
        let identity = DeviceIdentity::of(&path).map_err(|err| TransportError::Open {
            path: path.clone(),
            err,
        })?;
        tracing::debug!(path = %path.display(), ?identity, "opened nvme device");
        Ok(Self {
            path,
            file,
            identity,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_replug(&mut self) -> Result<(), TransportError> {
        if !self.options.detect_replug {
            return Ok(());
        }
        let replug_err = |err| TransportError::Replug {
            path: self.path.clone(),
            err,
        };
        let identity = DeviceIdentity::of(&self.path).map_err(replug_err)?;
        if identity != self.identity {
            tracing::warn!(
                path = %self.path.display(),
                old = ?self.identity,
                new = ?identity,
                "device changed, reopening"
            );
            self.file = open_device(&self.path, &self.options).map_err(replug_err)?;
            self.identity = identity;
        }
        Ok(())
    }
}

fn open_device(path: &Path, options: &LinuxTransportOptions) -> io::Result<fs_err::File> {
    fs_err::OpenOptions::new()
        .read(true)
        .write(!options.read_only)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

fn too_large(what: &str, len: usize) -> TransportError {
    TransportError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{what} length {len} does not fit the passthrough request"),
    ))
}

impl DeviceTransport for LinuxNvmeTransport {
    fn execute(&mut self, command: &mut CommandDescriptor<'_>) -> Result<(), TransportError> {
        self.check_replug()?;

        let data_len = command.data_len();
        let metadata_len = command.metadata_len();
        let timeout_ms = command
            .timeout()
            .map_or(0, |t| t.as_millis().try_into().unwrap_or(u32::MAX));
        let [cdw10, cdw11, cdw12, cdw13, cdw14, cdw15] = command.words();

        let mut cmd = ioctl::NvmeCmd {
            opcode: command.opcode().code(),
            flags: 0,
            rsvd1: 0,
            ns_id: command.nsid(),
            cdw2: command.cdw2(),
            cdw3: command.cdw3(),
            metadata: 0,
            addr: 0,
            metadata_len: metadata_len
                .try_into()
                .map_err(|_| too_large("metadata", metadata_len))?,
            data_len: data_len
                .try_into()
                .map_err(|_| too_large("data", data_len))?,
            cdw10,
            cdw11,
            cdw12,
            cdw13,
            cdw14,
            cdw15,
            timeout_ms,
            result: 0,
        };
        // Take the addresses through mutable borrows, since the kernel writes
        // through them.
        cmd.addr = command.data_mut().map_or(0, |d| d.as_mut_ptr() as u64);
        cmd.metadata = command.metadata_mut().map_or(0, |d| d.as_mut_ptr() as u64);

        let fd = self.file.file().as_raw_fd();
        // SAFETY: The FD is owned by the corresponding File, and this IOCTL is
        //         legal to call on any valid FD. The data and metadata
        //         addresses point to buffers owned or borrowed by `command`
        //         of at least the lengths given, which stay alive and unaliased
        //         until the ioctl returns. More documentation on this specific
        //         ioctl can be found in nvme_ioctl.h.
        let status = unsafe {
            match command.opcode() {
                Opcode::Admin(_) => ioctl::nvme_ioctl_admin_cmd(fd, &mut cmd),
                Opcode::Io(_) => ioctl::nvme_ioctl_io_cmd(fd, &mut cmd),
            }
        };
        let status = match status {
            Ok(status) => status,
            Err(errno) => {
                if errno == nix::errno::Errno::ENOTTY {
                    tracing::warn!(
                        path = %self.path.display(),
                        "device does not accept nvme passthrough requests"
                    );
                }
                return Err(TransportError::Io(errno.into()));
            }
        };

        // Positive returns are the completion status field without the phase
        // tag.
        command.complete(StatusWord::from(status as u16), cmd.result)
    }
}
