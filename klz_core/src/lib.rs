//! gzip file transcoding with atomic replacement.
//!
//! The entropy coder is supplied through the [`Codec`] trait; this crate owns
//! the container format, the sync-friendly chunked encoder, integrity checks,
//! and the staged-output file handling.

pub mod checksum;
pub mod codec;
pub mod encoder;
pub mod error;
pub mod fanout;
pub mod format;
pub mod pending;
pub mod request;
pub mod transcoder;
pub mod verifier;

pub use checksum::Checksum;
pub use codec::{ChunkSink, Codec};
pub use encoder::{ChunkedStreamEncoder, CHUNK_SIZE};
pub use error::{Phase, TranscodeError};
pub use fanout::FanOut;
pub use format::{ContainerFooter, ContainerHeader, FrameError, MAGIC};
pub use pending::PendingOutput;
pub use request::{Level, Mode, RequestError, Suffix, TranscodeRequest};
pub use transcoder::{AtomicFileTranscoder, TranscodeOutcome};
pub use verifier::{IntegrityVerifier, VerifyError, VerifyReport};
