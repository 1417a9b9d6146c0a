// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::walk_events;
use crate::ContextState;
use crate::EventDetails;
use crate::PelConfig;
use crate::PelError;
use crate::PersistentEventLogSession;
use nvme_passthru::CommandDescriptor;
use nvme_passthru::DeviceTransport;
use nvme_passthru::Opcode;
use nvme_passthru::StatusBucket;
use nvme_passthru::TransportError;
use nvme_spec::identify::IDENTIFY_DATA_LEN;
use nvme_spec::log::GetLogPageCdw10;
use nvme_spec::log::GetLogPageCdw12;
use nvme_spec::log::GetLogPageCdw13;
use nvme_spec::log::GET_LOG_PAGE_CDW10;
use nvme_spec::log::GET_LOG_PAGE_CDW12;
use nvme_spec::log::GET_LOG_PAGE_CDW13;
use nvme_spec::pel::PersistentEventType;
use nvme_spec::pel::EVENT_FIXED_HEADER_LEN;
use nvme_spec::pel::EVENT_HEADER_LEN;
use nvme_spec::pel::PEL_HEADER_LEN;
use nvme_spec::AdminOpcode;
use nvme_spec::LogPageIdentifier;
use nvme_spec::Status;
use nvme_spec::StatusWord;
use nvme_spec::NSID_ALL;
use test_with_tracing::test;

const COMMAND_SEQUENCE_ERROR: u16 = 0x000c;
const INTERNAL_ERROR: u16 = 0x0006;
const INTERNAL_ERROR_DNR: u16 = 0x4006;

/// A controller with a Persistent Event Log and a single reporting context.
struct SimulatedDevice {
    identify: Vec<u8>,
    log: Vec<u8>,
    context: bool,
    /// (lsp, offset, len) of every Get Log Page.
    reads: Vec<(u8, u64, usize)>,
    /// Completes every Get Log Page with this status.
    status: Option<u16>,
    /// Fails the next read of log data at an offset.
    fail_at: Option<(u64, u16)>,
    /// Fails the next Get Log Page with this (lsp, offset) in the transport.
    transport_error_at: Option<(u8, u64)>,
}

impl SimulatedDevice {
    fn new(log: Vec<u8>) -> Self {
        let mut identify = vec![0u8; IDENTIFY_DATA_LEN];
        identify[261] = 0x14;
        identify[352..356].copy_from_slice(&1u32.to_le_bytes());
        Self {
            identify,
            log,
            context: false,
            reads: Vec::new(),
            status: None,
            fail_at: None,
            transport_error_at: None,
        }
    }

    fn read_into(&self, offset: u64, data: &mut [u8]) {
        data.fill(0);
        let start = (offset as usize).min(self.log.len());
        let end = (start + data.len()).min(self.log.len());
        data[..end - start].copy_from_slice(&self.log[start..end]);
    }

    fn get_log_page(&mut self, command: &mut CommandDescriptor<'_>) -> Result<(), TransportError> {
        let [cdw10, _, cdw12, cdw13, ..] = command.words();
        let cdw10 = GET_LOG_PAGE_CDW10.decode(&cdw10.to_le_bytes()).unwrap();
        let lpol = GET_LOG_PAGE_CDW12.decode(&cdw12.to_le_bytes()).unwrap();
        let lpou = GET_LOG_PAGE_CDW13.decode(&cdw13.to_le_bytes()).unwrap();
        assert_eq!(
            cdw10.get_u64(GetLogPageCdw10::Lid),
            Some(LogPageIdentifier::PERSISTENT_EVENT.0.into())
        );
        assert_eq!(command.nsid(), NSID_ALL);

        let lsp = cdw10.get_u64(GetLogPageCdw10::Lsp).unwrap() as u8;
        let offset = lpol.get_u64(GetLogPageCdw12::Lpol).unwrap()
            | (lpou.get_u64(GetLogPageCdw13::Lpou).unwrap() << 32);
        self.reads.push((lsp, offset, command.data_len()));

        if self.transport_error_at == Some((lsp, offset)) {
            self.transport_error_at = None;
            return Err(TransportError::Io(std::io::Error::other("link down")));
        }
        if let Some(status) = self.status {
            return command.complete(StatusWord::from(status), 0);
        }
        if lsp == 0 {
            if let Some((at, status)) = self.fail_at {
                if at == offset {
                    self.fail_at = None;
                    return command.complete(StatusWord::from(status), 0);
                }
            }
        }

        let status = match lsp {
            1 if self.context => COMMAND_SEQUENCE_ERROR,
            1 => {
                self.context = true;
                if let Some(data) = command.data_mut() {
                    self.read_into(0, data);
                }
                0
            }
            2 => {
                self.context = false;
                0
            }
            0 if !self.context => COMMAND_SEQUENCE_ERROR,
            0 => {
                if let Some(data) = command.data_mut() {
                    self.read_into(offset, data);
                }
                0
            }
            _ => 0x0002,
        };
        command.complete(StatusWord::from(status), 0)
    }
}

impl DeviceTransport for SimulatedDevice {
    fn execute(&mut self, command: &mut CommandDescriptor<'_>) -> Result<(), TransportError> {
        match command.opcode() {
            Opcode::Admin(AdminOpcode::IDENTIFY) => {
                if let Some(data) = command.data_mut() {
                    data.copy_from_slice(&self.identify[..data.len()]);
                }
                command.complete(StatusWord::from(0u16), 0)
            }
            Opcode::Admin(AdminOpcode::GET_LOG_PAGE) => self.get_log_page(command),
            _ => command.complete(StatusWord::from(0x0001u16), 0),
        }
    }
}

fn event(ty: PersistentEventType, timestamp: u64, data: &[u8]) -> Vec<u8> {
    let mut event = vec![0u8; EVENT_HEADER_LEN];
    event[0] = ty.0;
    event[1] = 1;
    event[2] = (EVENT_HEADER_LEN - EVENT_FIXED_HEADER_LEN) as u8;
    event[4..6].copy_from_slice(&1u16.to_le_bytes());
    event[6..14].copy_from_slice(&timestamp.to_le_bytes());
    event[22..24].copy_from_slice(&(data.len() as u16).to_le_bytes());
    event.extend_from_slice(data);
    event
}

fn sample_events() -> Vec<Vec<u8>> {
    let mut timestamp = [0u8; 16];
    timestamp[0..8].copy_from_slice(&1000u64.to_le_bytes());
    timestamp[8..16].copy_from_slice(&25u64.to_le_bytes());

    let mut power_on = vec![0u8; 8 + 36];
    power_on[0..8].copy_from_slice(b"FW1.0   ");
    power_on[8..10].copy_from_slice(&1u16.to_le_bytes());
    power_on[8 + 16..8 + 20].copy_from_slice(&7u32.to_le_bytes());
    power_on[8 + 20..8 + 28].copy_from_slice(&1234u64.to_le_bytes());
    power_on[8 + 28..8 + 36].copy_from_slice(&5555u64.to_le_bytes());

    vec![
        event(PersistentEventType::TIMESTAMP_CHANGE, 100, &timestamp),
        event(PersistentEventType::POWER_ON_OR_RESET, 200, &power_on),
        event(PersistentEventType::THERMAL_EXCURSION, 300, &[4, 1, 0, 0]),
    ]
}

/// Builds a log of `len` bytes reporting `tll` as its length. Bytes past the
/// events hold a pattern.
fn log_image(tll: u64, events: &[Vec<u8>], len: usize) -> Vec<u8> {
    let mut log = vec![0u8; PEL_HEADER_LEN];
    log[0] = LogPageIdentifier::PERSISTENT_EVENT.0;
    log[4..8].copy_from_slice(&(events.len() as u32).to_le_bytes());
    log[8..16].copy_from_slice(&tll.to_le_bytes());
    log[16] = 1;
    log[18..20].copy_from_slice(&(PEL_HEADER_LEN as u16).to_le_bytes());
    log[56..62].copy_from_slice(b"SN0001");
    // Timestamp change, power on or reset, thermal excursion.
    log[480] = 0x18;
    log[481] = 0x20;
    for event in events {
        log.extend_from_slice(event);
    }
    let start = log.len();
    log.extend((start..len).map(|i| (i % 251) as u8));
    log
}

fn events_len(events: &[Vec<u8>]) -> usize {
    events.iter().map(Vec::len).sum()
}

fn session(extended: bool) -> PersistentEventLogSession {
    PersistentEventLogSession::new(extended, PelConfig::default()).unwrap()
}

#[test]
fn extended_read_in_chunks() {
    let mut device = SimulatedDevice::new(log_image(20000, &sample_events(), 20480));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    assert_eq!(session.state(), ContextState::Established);
    let log = session.read_log(&mut device).unwrap();

    assert_eq!(
        device.reads,
        [(1, 0, 512), (0, 0, 512), (0, 512, 16384), (0, 16896, 3584)]
    );
    assert_eq!(log.as_bytes(), &device.log[..20000]);
    assert_eq!(log.header().total_log_length, 20000);
    assert_eq!(log.header().total_events, 3);
    assert_eq!(log.header().serial_number, "SN0001");
    assert_eq!(log.header().aligned_log_length(), Some(20480));
    assert!(log.header().supports_event(PersistentEventType::THERMAL_EXCURSION));
    assert!(!log.header().supports_event(PersistentEventType::SANITIZE_START));
    assert_eq!(session.state(), ContextState::Established);
}

#[test]
fn small_chunk_size() {
    let mut device = SimulatedDevice::new(log_image(2048, &sample_events(), 2048));
    let mut session = PersistentEventLogSession::new(
        true,
        PelConfig {
            chunk_size: 1024,
            ..PelConfig::default()
        },
    )
    .unwrap();

    session.establish(&mut device).unwrap();
    let log = session.read_log(&mut device).unwrap();
    assert_eq!(
        device.reads,
        [(1, 0, 512), (0, 0, 512), (0, 512, 1024), (0, 1536, 512)]
    );
    assert_eq!(log.as_bytes(), &device.log[..]);
}

#[test]
fn non_extended_reads_whole_log() {
    let mut device = SimulatedDevice::new(log_image(1000, &sample_events(), 1024));
    let mut session = session(false);

    session.establish(&mut device).unwrap();
    let log = session.read_log(&mut device).unwrap();

    assert_eq!(device.reads, [(1, 0, 512), (0, 0, 512), (0, 0, 1024)]);
    assert_eq!(log.as_bytes(), &device.log[..1000]);
}

#[test]
fn non_extended_header_only_log() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    let mut session = session(false);

    session.establish(&mut device).unwrap();
    let log = session.read_log(&mut device).unwrap();

    assert_eq!(device.reads, [(1, 0, 512), (0, 0, 512)]);
    assert_eq!(log.as_bytes().len(), 512);
    assert!(log.events().unwrap().is_empty());
}

#[test]
fn non_extended_log_too_large() {
    let mut device = SimulatedDevice::new(log_image(300_000, &[], 512));
    let mut session = session(false);

    session.establish(&mut device).unwrap();
    let err = session.read_log(&mut device).unwrap_err();

    assert!(matches!(err, PelError::LogTooLarge { len: 300_032 }), "{err:?}");
    assert_eq!(device.reads, [(1, 0, 512), (0, 0, 512)]);
    assert_eq!(session.state(), ContextState::Established);
}

#[test]
fn check_context_reports_device_state() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    let mut session = session(true);

    assert_eq!(
        session.check_context(&mut device).unwrap(),
        ContextState::NotEstablished
    );
    device.context = true;
    assert_eq!(
        session.check_context(&mut device).unwrap(),
        ContextState::Established
    );
    assert_eq!(session.state(), ContextState::Established);

    device.status = Some(INTERNAL_ERROR);
    assert_eq!(
        session.check_context(&mut device).unwrap(),
        ContextState::Unknown
    );
    assert!(device.reads.iter().all(|&(lsp, offset, len)| lsp == 0
        && offset == 0
        && len == 512));
}

#[test]
fn establish_adopts_existing_context() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    session.establish(&mut device).unwrap();

    assert_eq!(session.state(), ContextState::Established);
    assert!(device.context);
    assert_eq!(device.reads, [(1, 0, 512), (1, 0, 512)]);
}

#[test]
fn establish_failure_leaves_state_unknown() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    device.status = Some(INTERNAL_ERROR);
    let mut session = session(true);

    let err = session.establish(&mut device).unwrap_err();
    let PelError::EstablishFailed(outcome) = err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(outcome.status(), Status::INTERNAL_ERROR);
    assert_eq!(outcome.bucket(), StatusBucket::Retryable);
    assert_eq!(session.state(), ContextState::Unknown);

    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::UnknownContextState)
    ));
    assert_eq!(device.reads.len(), 1);
}

#[test]
fn establish_transport_error_leaves_state_unknown() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    device.transport_error_at = Some((1, 0));
    let mut session = session(true);

    assert!(matches!(
        session.establish(&mut device),
        Err(PelError::Transport(TransportError::Io(_)))
    ));
    assert_eq!(session.state(), ContextState::Unknown);
    assert!(!device.context);
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::UnknownContextState)
    ));

    assert_eq!(
        session.check_context(&mut device).unwrap(),
        ContextState::NotEstablished
    );
    session.establish(&mut device).unwrap();
    assert_eq!(session.state(), ContextState::Established);
}

#[test]
fn out_of_range_log_length_is_rejected() {
    for tll in [u64::MAX, u64::MAX - 100, 1 << 40] {
        let mut device = SimulatedDevice::new(log_image(tll, &[], 512));
        let mut session = session(true);

        session.establish(&mut device).unwrap();
        let err = session.read_log(&mut device).unwrap_err();
        let PelError::LogTooLarge { len } = err else {
            panic!("unexpected error {err:?}");
        };
        assert!(len >= tll, "{len} < {tll}");
        // Nothing past the header was requested.
        assert_eq!(device.reads, [(1, 0, 512), (0, 0, 512)]);
        assert_eq!(session.state(), ContextState::Established);
        assert_eq!(session.total_log_length(), None);
        assert_eq!(session.current_byte_offset(), 0);
    }
}

#[test]
fn configured_log_length_limit() {
    let mut device = SimulatedDevice::new(log_image(20000, &sample_events(), 20480));
    let mut session = PersistentEventLogSession::new(
        true,
        PelConfig {
            max_log_len: 16384,
            ..PelConfig::default()
        },
    )
    .unwrap();

    session.establish(&mut device).unwrap();
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::LogTooLarge { len: 20480 })
    ));
    assert_eq!(device.reads.len(), 2);

    // A log of exactly the limit is read. The new session adopts the
    // context that is still open.
    let mut session = PersistentEventLogSession::new(
        true,
        PelConfig {
            max_log_len: 20480,
            ..PelConfig::default()
        },
    )
    .unwrap();
    session.establish(&mut device).unwrap();
    let log = session.read_log(&mut device).unwrap();
    assert_eq!(log.as_bytes(), &device.log[..20000]);
}

#[test]
fn reported_log_size_limits_log_length() {
    // The simulated controller reports a 64 KiB log.
    let mut device = SimulatedDevice::new(log_image(70_000, &[], 70_144));
    let mut session =
        PersistentEventLogSession::probe(&mut device, PelConfig::default()).unwrap();
    assert_eq!(session.max_log_len(), 64 * 1024);

    session.establish(&mut device).unwrap();
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::LogTooLarge { len: 70_144 })
    ));
    assert_eq!(device.reads, [(1, 0, 512), (0, 0, 512)]);

    // No reported size leaves the configured limit in place.
    device.identify[352..356].fill(0);
    let session = PersistentEventLogSession::probe(&mut device, PelConfig::default()).unwrap();
    assert_eq!(session.max_log_len(), crate::DEFAULT_MAX_LOG_LEN);
}

#[test]
fn read_requires_context() {
    let mut device = SimulatedDevice::new(log_image(1024, &sample_events(), 1024));
    let mut session = session(true);

    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::ContextNotEstablished)
    ));
    assert!(device.reads.is_empty());

    assert!(matches!(
        session.read_log_unchecked(&mut device),
        Err(PelError::ContextNotEstablished)
    ));
    assert_eq!(session.state(), ContextState::NotEstablished);

    // A context established elsewhere is picked up by the header read.
    device.context = true;
    let log = session.read_log_unchecked(&mut device).unwrap();
    assert_eq!(session.state(), ContextState::Established);
    assert_eq!(log.as_bytes(), &device.log[..]);
}

#[test]
fn failed_chunk_resumes_at_offset() {
    let mut device = SimulatedDevice::new(log_image(20000, &sample_events(), 20480));
    device.fail_at = Some((16896, INTERNAL_ERROR_DNR));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    let err = session.read_log(&mut device).unwrap_err();
    let PelError::ReadFailed { offset, outcome } = err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(offset, 16896);
    assert_eq!(outcome.bucket(), StatusBucket::Fatal);
    assert_eq!(session.current_byte_offset(), 16896);
    assert_eq!(session.total_log_length(), Some(20480));
    assert_eq!(session.total_event_count(), Some(3));
    assert_eq!(session.state(), ContextState::Established);

    device.reads.clear();
    let log = session.read_log(&mut device).unwrap();
    assert_eq!(device.reads, [(0, 16896, 3584)]);
    assert_eq!(log.as_bytes(), &device.log[..20000]);
}

#[test]
fn header_read_failure() {
    let mut device = SimulatedDevice::new(log_image(1024, &[], 1024));
    device.fail_at = Some((0, INTERNAL_ERROR));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::ReadFailed { offset: 0, .. })
    ));
    assert_eq!(session.total_log_length(), None);
    assert_eq!(session.state(), ContextState::Established);
}

#[test]
fn lost_context_discards_progress() {
    let mut device = SimulatedDevice::new(log_image(20000, &sample_events(), 20480));
    device.fail_at = Some((16896, COMMAND_SEQUENCE_ERROR));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::ContextNotEstablished)
    ));
    assert_eq!(session.state(), ContextState::NotEstablished);
    assert_eq!(session.current_byte_offset(), 0);
    assert_eq!(session.total_log_length(), None);
}

#[test]
fn transport_error_then_resume() {
    let mut device = SimulatedDevice::new(log_image(20000, &sample_events(), 20480));
    device.transport_error_at = Some((0, 512));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::Transport(TransportError::Io(_)))
    ));
    assert_eq!(session.state(), ContextState::Unknown);
    assert_eq!(session.current_byte_offset(), 512);
    assert!(matches!(
        session.read_log(&mut device),
        Err(PelError::UnknownContextState)
    ));

    assert_eq!(
        session.check_context(&mut device).unwrap(),
        ContextState::Established
    );
    device.reads.clear();
    let log = session.read_log(&mut device).unwrap();
    assert_eq!(device.reads, [(0, 512, 16384), (0, 16896, 3584)]);
    assert_eq!(log.as_bytes(), &device.log[..20000]);
}

#[test]
fn release_is_unconditional() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    let mut session = session(true);

    session.establish(&mut device).unwrap();
    device.status = Some(INTERNAL_ERROR_DNR);
    session.release(&mut device).unwrap();
    assert_eq!(session.state(), ContextState::NotEstablished);

    device.status = None;
    session.establish(&mut device).unwrap();
    device.transport_error_at = Some((2, 0));
    assert!(matches!(
        session.release(&mut device),
        Err(PelError::Transport(_))
    ));
    assert_eq!(session.state(), ContextState::NotEstablished);
}

#[test]
fn retrieve_and_decode_events() {
    let events = sample_events();
    let mut device = SimulatedDevice::new(log_image(20000, &events, 20480));
    let mut session = session(true);

    let log = session.retrieve(&mut device).unwrap();
    assert!(!device.context);
    assert_eq!(device.reads.last(), Some(&(2, 0, 512)));
    assert_eq!(session.state(), ContextState::NotEstablished);

    let decoded = log.events().unwrap();
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded[0].offset, PEL_HEADER_LEN);
    assert_eq!(decoded[0].event_type, PersistentEventType::TIMESTAMP_CHANGE);
    assert_eq!(decoded[0].timestamp, 100);
    assert_eq!(decoded[0].controller_id, 1);
    assert_eq!(decoded[1].offset, PEL_HEADER_LEN + events[0].len());
    assert_eq!(decoded[2].timestamp, 300);

    assert_eq!(
        decoded[0].details().unwrap(),
        EventDetails::TimestampChange {
            previous_timestamp: 1000,
            milliseconds_since_reset: 25,
        }
    );
    let EventDetails::PowerOnOrReset {
        firmware_revision,
        controllers,
    } = decoded[1].details().unwrap()
    else {
        panic!("wrong event details");
    };
    assert_eq!(firmware_revision, "FW1.0");
    assert_eq!(controllers.len(), 1);
    assert_eq!(controllers[0].controller_id, 1);
    assert_eq!(controllers[0].controller_power_cycle, 7);
    assert_eq!(controllers[0].power_on_milliseconds, 1234);
    assert_eq!(controllers[0].controller_timestamp, 5555);
    assert_eq!(
        decoded[2].details().unwrap(),
        EventDetails::ThermalExcursion {
            over_temperature: 4,
            threshold: 1,
        }
    );
}

#[test]
fn retrieve_releases_after_failed_read() {
    let mut device = SimulatedDevice::new(log_image(1024, &[], 1024));
    device.fail_at = Some((512, INTERNAL_ERROR));
    let mut session = session(true);

    assert!(matches!(
        session.retrieve(&mut device),
        Err(PelError::ReadFailed { offset: 512, .. })
    ));
    assert!(!device.context);
    assert_eq!(device.reads.last(), Some(&(2, 0, 512)));
    assert_eq!(session.state(), ContextState::NotEstablished);
}

#[test]
fn walk_stops_at_truncated_event() {
    let events = sample_events();
    let log = log_image(0, &events, PEL_HEADER_LEN + events_len(&events));

    assert_eq!(walk_events(&log, 3).unwrap().len(), 3);
    let err = walk_events(&log, 5).unwrap_err();
    assert!(
        matches!(
            err,
            PelError::TruncatedLog {
                index: 3,
                needed: 24,
                available: 0,
                ..
            }
        ),
        "{err:?}"
    );

    // Cut the last event short.
    let short = &log[..log.len() - 1];
    assert!(matches!(
        walk_events(short, 3),
        Err(PelError::TruncatedLog { index: 2, .. })
    ));
}

#[test]
fn identify_reads_log_page_attributes() {
    let mut device = SimulatedDevice::new(log_image(512, &[], 512));
    let session = PersistentEventLogSession::probe(&mut device, PelConfig::default()).unwrap();
    assert!(session.extended_capacity_supported());
    assert_eq!(session.state(), ContextState::NotEstablished);

    device.identify[261] = 0x10;
    let session = PersistentEventLogSession::probe(&mut device, PelConfig::default()).unwrap();
    assert!(!session.extended_capacity_supported());

    device.identify[261] = 0x04;
    assert!(matches!(
        PersistentEventLogSession::probe(&mut device, PelConfig::default()),
        Err(PelError::Unsupported)
    ));
}

#[test]
fn chunk_size_must_be_dword_multiple() {
    for chunk_size in [0, 6] {
        assert!(matches!(
            PersistentEventLogSession::new(
                true,
                PelConfig {
                    chunk_size,
                    ..PelConfig::default()
                },
            ),
            Err(PelError::InvalidChunkSize(n)) if n == chunk_size
        ));
    }
}
