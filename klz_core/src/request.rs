use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Default suffix appended on compression and stripped on decompression.
pub const DEFAULT_SUFFIX: &str = ".gz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("compression level {0} is out of range (1–9)")]
    InvalidLevel(u32),

    #[error("suffix must not be empty")]
    EmptySuffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Compress,
    Decompress,
    Test,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Compress => "compress",
            Mode::Decompress => "decompress",
            Mode::Test => "test",
        })
    }
}

/// DEFLATE effort, 1 (fastest) to 9 (smallest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Level(u32);

impl Level {
    pub const FASTEST: Level = Level(1);
    pub const BEST: Level = Level(9);

    pub fn new(level: u32) -> Result<Self, RequestError> {
        if (1..=9).contains(&level) {
            Ok(Self(level))
        } else {
            Err(RequestError::InvalidLevel(level))
        }
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for Level {
    fn default() -> Self {
        Self(5)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File-name suffix, always starting with a dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix(String);

impl Suffix {
    /// `"gz"` and `".gz"` both become `".gz"`.
    pub fn new(suffix: &str) -> Result<Self, RequestError> {
        match suffix {
            "" => Err(RequestError::EmptySuffix),
            s if s.starts_with('.') => Ok(Self(s.to_string())),
            s => Ok(Self(format!(".{}", s))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Suffix {
    fn default() -> Self {
        Self(DEFAULT_SUFFIX.to_string())
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything one file operation needs, fixed before the operation starts.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source: PathBuf,
    pub suffix: Suffix,
    pub mode: Mode,
    pub level: Level,
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
    /// Leave the source in place after a successful operation.
    pub keep_source: bool,
    /// Store the source's base name and modification time in the header.
    pub embed_name: bool,
    /// Emit sync-flushed 64 KiB chunks with hand-built framing.
    pub chunked: bool,
    pub verbose: bool,
}

impl TranscodeRequest {
    /// Request with the tool's defaults: `.gz`, level 5, name embedded.
    pub fn new(source: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            source: source.into(),
            suffix: Suffix::default(),
            mode,
            level: Level::default(),
            overwrite: false,
            keep_source: false,
            embed_name: true,
            chunked: false,
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_bounds() {
        assert_eq!(Level::new(0), Err(RequestError::InvalidLevel(0)));
        assert_eq!(Level::new(10), Err(RequestError::InvalidLevel(10)));
        assert_eq!(Level::new(1), Ok(Level::FASTEST));
        assert_eq!(Level::new(9), Ok(Level::BEST));
        assert_eq!(Level::default().get(), 5);
    }

    #[test]
    fn suffix_gets_leading_dot() {
        assert_eq!(Suffix::new("gz").unwrap().as_str(), ".gz");
        assert_eq!(Suffix::new(".z").unwrap().as_str(), ".z");
        assert_eq!(Suffix::new(""), Err(RequestError::EmptySuffix));
        assert_eq!(Suffix::default().as_str(), DEFAULT_SUFFIX);
    }

    #[test]
    fn defaults_embed_name_and_remove_source() {
        let req = TranscodeRequest::new("a.txt", Mode::Compress);
        assert!(req.embed_name);
        assert!(!req.keep_source);
        assert!(!req.overwrite);
        assert!(!req.chunked);
    }
}
