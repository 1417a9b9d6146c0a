// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Classification of NVMe completion status words.

use nvme_spec::Status;
use nvme_spec::StatusCodeType;
use nvme_spec::StatusWord;
use std::fmt;

/// What a caller should do with a completed command.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatusBucket {
    /// The command succeeded.
    Success,
    /// The command failed but may succeed if issued again.
    Retryable,
    /// The command failed and must not be retried.
    Fatal,
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            StatusBucket::Success => "success",
            StatusBucket::Retryable => "retryable",
            StatusBucket::Fatal => "fatal",
        })
    }
}

/// A decoded completion status word.
///
/// Branch on [`CompletionOutcome::bucket`]; the raw fields are kept for
/// diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompletionOutcome {
    word: StatusWord,
}

/// Decodes a raw status word (status field of the completion queue entry
/// without the phase tag).
pub fn classify(raw: u16) -> CompletionOutcome {
    CompletionOutcome {
        word: StatusWord::from(raw),
    }
}

impl From<StatusWord> for CompletionOutcome {
    fn from(word: StatusWord) -> Self {
        Self { word }
    }
}

impl CompletionOutcome {
    pub fn status_word(&self) -> StatusWord {
        self.word
    }

    pub fn raw(&self) -> u16 {
        self.word.into()
    }

    pub fn status_code(&self) -> u8 {
        self.word.status_code()
    }

    pub fn status_code_type(&self) -> StatusCodeType {
        StatusCodeType(self.word.status_code_type())
    }

    /// The combined status code type and status code.
    pub fn status(&self) -> Status {
        self.word.status()
    }

    pub fn more(&self) -> bool {
        self.word.more()
    }

    pub fn do_not_retry(&self) -> bool {
        self.word.dnr()
    }

    pub fn command_retry_delay(&self) -> u8 {
        self.word.crd()
    }

    pub fn is_success(&self) -> bool {
        self.status() == Status::SUCCESS
    }

    /// Whether this is the generic Command Sequence Error status, which the
    /// Persistent Event Log reports when the reporting context is not in the
    /// state the command expects.
    pub fn is_command_sequence_error(&self) -> bool {
        self.status() == Status::COMMAND_SEQUENCE_ERROR
    }

    pub fn bucket(&self) -> StatusBucket {
        if self.is_success() {
            return StatusBucket::Success;
        }
        if self.do_not_retry() {
            return StatusBucket::Fatal;
        }
        match self.status_code_type() {
            StatusCodeType::GENERIC
            | StatusCodeType::COMMAND_SPECIFIC
            | StatusCodeType::PATH_RELATED => StatusBucket::Retryable,
            _ => StatusBucket::Fatal,
        }
    }

    fn class(&self) -> &'static str {
        match self.status_code_type() {
            StatusCodeType::GENERIC => "generic",
            StatusCodeType::COMMAND_SPECIFIC => "command-specific",
            StatusCodeType::MEDIA_ERROR => "media error",
            StatusCodeType::PATH_RELATED => "path related",
            StatusCodeType::VENDOR_SPECIFIC => "vendor specific",
            _ => "reserved",
        }
    }
}

impl fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} sct={:#x} sc={:#04x} crd={} more={} dnr={})",
            self.bucket(),
            self.class(),
            self.word.status_code_type(),
            self.status_code(),
            self.command_retry_delay(),
            u8::from(self.more()),
            u8::from(self.do_not_retry()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_the_only_success() {
        assert_eq!(classify(0).bucket(), StatusBucket::Success);
        // MORE alone is still a success.
        assert_eq!(classify(0x2000).bucket(), StatusBucket::Success);
        assert_eq!(classify(0x0001).bucket(), StatusBucket::Retryable);
        assert_eq!(classify(0x0100).bucket(), StatusBucket::Retryable);
    }

    #[test]
    fn dnr_is_fatal() {
        let outcome = classify(0x4000 | Status::INTERNAL_ERROR.0);
        assert!(outcome.do_not_retry());
        assert_eq!(outcome.bucket(), StatusBucket::Fatal);
    }

    #[test]
    fn media_and_vendor_errors_are_fatal() {
        assert_eq!(
            classify(Status::MEDIA_UNRECOVERED_READ_ERROR.0).bucket(),
            StatusBucket::Fatal
        );
        assert_eq!(classify(0x0701).bucket(), StatusBucket::Fatal);
        // Reserved status code type.
        assert_eq!(classify(0x0401).bucket(), StatusBucket::Fatal);
        assert_eq!(classify(0x0301).bucket(), StatusBucket::Retryable);
    }

    #[test]
    fn command_sequence_error_is_distinct() {
        let outcome = classify(0x000c);
        assert!(outcome.is_command_sequence_error());
        assert!(!outcome.is_success());
        assert_eq!(outcome.status_code_type(), StatusCodeType::GENERIC);
        assert_eq!(outcome.bucket(), StatusBucket::Retryable);

        // Same code with DNR set is still recognized.
        let outcome = classify(0x400c);
        assert!(outcome.is_command_sequence_error());
        assert_eq!(outcome.bucket(), StatusBucket::Fatal);

        // Same code, different type.
        assert!(!classify(0x010c).is_command_sequence_error());
    }

    #[test]
    fn raw_fields() {
        let outcome = classify(0x5a81);
        assert_eq!(outcome.status_code(), 0x81);
        assert_eq!(outcome.status_code_type(), StatusCodeType::MEDIA_ERROR);
        assert_eq!(outcome.command_retry_delay(), 3);
        assert!(!outcome.more());
        assert!(outcome.do_not_retry());
        assert_eq!(outcome.raw(), 0x5a81);
    }

    #[test]
    fn display() {
        assert_eq!(
            classify(0x4109).to_string(),
            "fatal (command-specific sct=0x1 sc=0x09 crd=0 more=0 dnr=1)"
        );
        assert_eq!(
            classify(0).to_string(),
            "success (generic sct=0x0 sc=0x00 crd=0 more=0 dnr=0)"
        );
    }
}
