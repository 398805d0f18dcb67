use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

use crate::checksum::Checksum;
use crate::codec::Codec;
use crate::fanout::FanOut;
use crate::format::{ContainerFooter, ContainerHeader, FrameError, FOOTER_SIZE};

const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("header invalid: {0}")]
    HeaderInvalid(String),

    #[error("payload corrupt: {0}")]
    PayloadCorrupt(#[source] io::Error),

    #[error("checksum mismatch: footer says {expected:08x}, data hashes to {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("length mismatch: footer says {expected} bytes, data has {actual} (mod 2^32)")]
    LengthMismatch { expected: u32, actual: u32 },

    #[error("stream truncated in {0}")]
    TruncatedStream(&'static str),

    #[error("reading compressed input: {0}")]
    Read(#[source] io::Error),

    #[error("writing decoded output: {0}")]
    Write(#[source] io::Error),
}

/// What a successful decode saw.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Header of the first member.
    pub header: ContainerHeader,
    pub members: usize,
    /// Decoded bytes across all members.
    pub decoded_len: u64,
}

/// Decodes whole containers and checks every member's footer.
///
/// A stream only passes once each member's payload has inflated cleanly and
/// its CRC32 and length match the footer; anything left over after a member
/// must itself be a valid member.
pub struct IntegrityVerifier<'c> {
    codec: &'c dyn Codec,
}

impl<'c> IntegrityVerifier<'c> {
    pub fn new(codec: &'c dyn Codec) -> Self {
        Self { codec }
    }

    /// Decode `src` and discard the output.
    pub fn verify<R: BufRead>(&self, src: R) -> Result<VerifyReport, VerifyError> {
        self.decode(src, &mut io::sink())
    }

    /// Decode `src`, writing the plaintext of every member to `dst` in order.
    ///
    /// `dst` may already hold a prefix of the output when an error is
    /// returned; callers that need all-or-nothing semantics must stage it.
    pub fn decode<R: BufRead, W: Write>(
        &self,
        mut src: R,
        dst: &mut W,
    ) -> Result<VerifyReport, VerifyError> {
        let mut first = None;
        let mut members = 0usize;
        let mut decoded_len = 0u64;

        loop {
            let header =
                ContainerHeader::read_from(&mut src).map_err(|e| header_error(e, members))?;
            let checksum = self.inflate_member(&mut src, dst)?;

            let mut buf = [0u8; FOOTER_SIZE];
            src.read_exact(&mut buf).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => VerifyError::TruncatedStream("footer"),
                _ => VerifyError::Read(e),
            })?;
            let expected = ContainerFooter::from_bytes(&buf);
            let actual = checksum.footer();
            if expected.crc32 != actual.crc32 {
                return Err(VerifyError::ChecksumMismatch {
                    expected: expected.crc32,
                    actual: actual.crc32,
                });
            }
            if expected.size != actual.size {
                return Err(VerifyError::LengthMismatch {
                    expected: expected.size,
                    actual: actual.size,
                });
            }

            members += 1;
            decoded_len += checksum.len();
            first.get_or_insert(header);

            if src.fill_buf().map_err(VerifyError::Read)?.is_empty() {
                break;
            }
        }

        Ok(VerifyReport {
            header: first.unwrap_or_default(),
            members,
            decoded_len,
        })
    }

    fn inflate_member<R: BufRead, W: Write>(
        &self,
        src: &mut R,
        dst: &mut W,
    ) -> Result<Checksum, VerifyError> {
        let mut checksum = Checksum::new();
        let mut inflater = self.codec.inflate(src);
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = match inflater.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(payload_error(e)),
            };
            let mut sinks: [&mut dyn Write; 2] = [&mut *dst, &mut checksum];
            FanOut::new(&mut sinks)
                .write_all(&buf[..n])
                .map_err(VerifyError::Write)?;
        }
        Ok(checksum)
    }
}

fn header_error(err: FrameError, members: usize) -> VerifyError {
    match err {
        FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            VerifyError::TruncatedStream("header")
        }
        FrameError::Io(e) => VerifyError::Read(e),
        FrameError::InvalidHeader(msg) if members > 0 => {
            VerifyError::HeaderInvalid(format!("trailing data after member {}: {}", members, msg))
        }
        other => VerifyError::HeaderInvalid(other.to_string()),
    }
}

fn payload_error(err: io::Error) -> VerifyError {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => VerifyError::PayloadCorrupt(err),
        io::ErrorKind::UnexpectedEof => VerifyError::TruncatedStream("payload"),
        _ => VerifyError::Read(err),
    }
}
