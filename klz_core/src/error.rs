use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::format::FrameError;
use crate::verifier::VerifyError;

/// Where in a file operation a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Open,
    Read,
    Transform,
    Write,
    Finalize,
    Rename,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Validate => "validate",
            Phase::Open => "open",
            Phase::Read => "read",
            Phase::Transform => "transform",
            Phase::Write => "write",
            Phase::Finalize => "finalize",
            Phase::Rename => "rename",
            Phase::Cleanup => "cleanup",
        })
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("[open] {}: no such file", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("[validate] {}: not a regular file", .path.display())]
    NotRegularFile { path: PathBuf },

    #[error("[validate] {}: unknown suffix, expected {suffix}", .path.display())]
    SuffixMismatch { path: PathBuf, suffix: String },

    #[error("[validate] {}: already exists, use --force to overwrite", .path.display())]
    DestinationExists { path: PathBuf },

    #[error("[{phase}] {}: {source}", .path.display())]
    Framing {
        phase: Phase,
        path: PathBuf,
        source: FrameError,
    },

    #[error("[{phase}] {}: permission denied: {source}", .path.display())]
    PermissionDenied {
        phase: Phase,
        path: PathBuf,
        source: io::Error,
    },

    #[error("[{phase}] {}: corrupt input: {source}", .path.display())]
    CorruptInput {
        phase: Phase,
        path: PathBuf,
        source: VerifyError,
    },

    #[error("[{phase}] {}: {source}", .path.display())]
    IoFailure {
        phase: Phase,
        path: PathBuf,
        source: io::Error,
    },

    #[error(
        "[cleanup] wrote {} but could not remove {}, both files now exist: {source}",
        .destination.display(),
        .source_path.display()
    )]
    PostconditionViolation {
        source_path: PathBuf,
        destination: PathBuf,
        source: io::Error,
    },
}

impl TranscodeError {
    pub fn phase(&self) -> Phase {
        match self {
            TranscodeError::SourceNotFound { .. } => Phase::Open,
            TranscodeError::NotRegularFile { .. }
            | TranscodeError::SuffixMismatch { .. }
            | TranscodeError::DestinationExists { .. } => Phase::Validate,
            TranscodeError::Framing { phase, .. }
            | TranscodeError::PermissionDenied { phase, .. }
            | TranscodeError::CorruptInput { phase, .. }
            | TranscodeError::IoFailure { phase, .. } => *phase,
            TranscodeError::PostconditionViolation { .. } => Phase::Cleanup,
        }
    }

    /// Tag an I/O error, keeping permission problems distinguishable.
    pub(crate) fn io(phase: Phase, path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => TranscodeError::PermissionDenied { phase, path, source },
            _ => TranscodeError::IoFailure { phase, path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_lead_with_phase() {
        let err = TranscodeError::io(
            Phase::Rename,
            Path::new("out.gz"),
            io::Error::new(io::ErrorKind::Other, "boom"),
        );
        assert_eq!(err.phase(), Phase::Rename);
        assert_eq!(err.to_string(), "[rename] out.gz: boom");
    }

    #[test]
    fn permission_errors_keep_their_kind() {
        let err = TranscodeError::io(
            Phase::Open,
            Path::new("a"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, TranscodeError::PermissionDenied { phase: Phase::Open, .. }));
    }
}
