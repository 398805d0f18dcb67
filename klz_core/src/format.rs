use std::io::{self, Read, Write};

use thiserror::Error;

/// Magic bytes opening every gzip member.
pub const MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression method id for DEFLATE, the only method gzip defines.
pub const METHOD_DEFLATE: u8 = 8;

/// Fixed size of the header prefix in bytes.
///   magic[2] + method:u8 + flags:u8 + mtime:u32 + xfl:u8 + os:u8
///   = 2 + 1 + 1 + 4 + 1 + 1 = 10
pub const HEADER_PREFIX_SIZE: usize = 10;

/// Size of the member footer in bytes.
///   crc32:u32 + isize:u32 = 8
pub const FOOTER_SIZE: usize = 8;

/// Largest extra field the two-byte length prefix can describe.
pub const MAX_EXTRA_LEN: usize = 0xffff;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Payload is probably text. Never written, ignored on read.
pub const FLAG_TEXT: u8 = 1 << 0;

/// A CRC16 of the header precedes the payload.
pub const FLAG_HCRC: u8 = 1 << 1;

/// A length-prefixed extra field follows the fixed prefix.
pub const FLAG_EXTRA: u8 = 1 << 2;

/// A NUL-terminated original file name follows.
pub const FLAG_NAME: u8 = 1 << 3;

/// A NUL-terminated comment follows.
pub const FLAG_COMMENT: u8 = 1 << 4;

/// Bits 5–7 must be zero.
const FLAG_RESERVED: u8 = 0xe0;

// ── OS ids ─────────────────────────────────────────────────────────────────

pub const OS_UNIX: u8 = 3;
pub const OS_UNKNOWN: u8 = 255;

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("extra field is {len} bytes, the limit is {MAX_EXTRA_LEN}")]
    FieldTooLarge { len: usize },

    #[error("{field} contains {ch:?}, which has no single-byte Latin-1 encoding")]
    EncodingError { field: &'static str, ch: char },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of a gzip member header.
///
/// `Some` on an optional field means the field is present and its flag bit is
/// set, even when the value is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Modification time of the original file, Unix seconds. Zero means unknown.
    pub mtime: u32,
    pub os: u8,
    pub extra: Option<Vec<u8>>,
    pub name: Option<String>,
    pub comment: Option<String>,
}

impl Default for ContainerHeader {
    fn default() -> Self {
        Self {
            mtime: 0,
            os: OS_UNKNOWN,
            extra: None,
            name: None,
            comment: None,
        }
    }
}

impl ContainerHeader {
    /// Flag byte describing which optional fields are present.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.extra.is_some() {
            flags |= FLAG_EXTRA;
        }
        if self.name.is_some() {
            flags |= FLAG_NAME;
        }
        if self.comment.is_some() {
            flags |= FLAG_COMMENT;
        }
        flags
    }

    /// Serialize the full header, optional fields included.
    ///
    /// Every field is validated before the buffer is returned, so a caller
    /// that writes the result never emits a partial header.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::with_capacity(HEADER_PREFIX_SIZE + 64);
        buf.extend_from_slice(&MAGIC);
        buf.push(METHOD_DEFLATE);
        buf.push(self.flags());
        buf.extend_from_slice(&self.mtime.to_le_bytes());
        buf.push(0); // xfl
        buf.push(self.os);

        if let Some(extra) = &self.extra {
            if extra.len() > MAX_EXTRA_LEN {
                return Err(FrameError::FieldTooLarge { len: extra.len() });
            }
            buf.extend_from_slice(&(extra.len() as u16).to_le_bytes());
            buf.extend_from_slice(extra);
        }
        if let Some(name) = &self.name {
            buf.extend_from_slice(&encode_latin1("name", name)?);
            buf.push(0);
        }
        if let Some(comment) = &self.comment {
            buf.extend_from_slice(&encode_latin1("comment", comment)?);
            buf.push(0);
        }
        Ok(buf)
    }

    /// Encode and write the header in one `write_all`. Returns the byte count.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, FrameError> {
        let buf = self.encode()?;
        w.write_all(&buf)?;
        Ok(buf.len())
    }

    /// Read and validate a header from the current position of `r`.
    ///
    /// On return `r` is positioned at the first payload byte.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self, FrameError> {
        let mut rec = Recorder {
            inner: r,
            seen: Vec::with_capacity(HEADER_PREFIX_SIZE + 64),
        };

        let mut prefix = [0u8; HEADER_PREFIX_SIZE];
        rec.read_exact(&mut prefix)?;
        if prefix[..2] != MAGIC {
            return Err(FrameError::InvalidHeader(format!(
                "bad magic {:02x} {:02x}, not a gzip member",
                prefix[0], prefix[1]
            )));
        }
        if prefix[2] != METHOD_DEFLATE {
            return Err(FrameError::InvalidHeader(format!(
                "unsupported compression method {}",
                prefix[2]
            )));
        }
        let flags = prefix[3];
        if flags & FLAG_RESERVED != 0 {
            return Err(FrameError::InvalidHeader(format!(
                "reserved flag bits set (0x{:02x})",
                flags
            )));
        }
        let mtime = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        let os = prefix[9];

        let extra = if flags & FLAG_EXTRA != 0 {
            let mut len_buf = [0u8; 2];
            rec.read_exact(&mut len_buf)?;
            let mut extra = vec![0u8; u16::from_le_bytes(len_buf) as usize];
            rec.read_exact(&mut extra)?;
            Some(extra)
        } else {
            None
        };
        let name = if flags & FLAG_NAME != 0 {
            Some(decode_latin1(&read_cstring(&mut rec)?))
        } else {
            None
        };
        let comment = if flags & FLAG_COMMENT != 0 {
            Some(decode_latin1(&read_cstring(&mut rec)?))
        } else {
            None
        };

        if flags & FLAG_HCRC != 0 {
            let expected = (crc32fast::hash(&rec.seen) & 0xffff) as u16;
            let mut crc_buf = [0u8; 2];
            rec.inner.read_exact(&mut crc_buf)?;
            let stored = u16::from_le_bytes(crc_buf);
            if stored != expected {
                return Err(FrameError::InvalidHeader(format!(
                    "header crc mismatch: stored {:04x}, computed {:04x}",
                    stored, expected
                )));
            }
        }

        Ok(Self {
            mtime,
            os,
            extra,
            name,
            comment,
        })
    }
}

// ── Footer ─────────────────────────────────────────────────────────────────

/// The 8-byte trailer closing a gzip member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerFooter {
    /// CRC32 (IEEE) of the uncompressed data.
    pub crc32: u32,
    /// Uncompressed length modulo 2^32.
    pub size: u32,
}

impl ContainerFooter {
    /// Serialize to exactly `FOOTER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..4].copy_from_slice(&self.crc32.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Deserialize from `FOOTER_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; FOOTER_SIZE]) -> Self {
        Self {
            crc32: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }
}

// ── Latin-1 text ───────────────────────────────────────────────────────────

/// Map `text` onto one byte per character.
///
/// gzip stores names and comments as ISO 8859-1; NUL terminates the field, so
/// it cannot appear inside one.
pub fn encode_latin1(field: &'static str, text: &str) -> Result<Vec<u8>, FrameError> {
    text.chars()
        .map(|ch| match u32::from(ch) {
            v @ 0x01..=0xff => Ok(v as u8),
            _ => Err(FrameError::EncodingError { field, ch }),
        })
        .collect()
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Read bytes up to (and consuming) the next NUL.
fn read_cstring<R: Read + ?Sized>(r: &mut R) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if byte[0] == 0 {
            return Ok(out);
        }
        out.push(byte[0]);
    }
}

/// Keeps a copy of everything read so the optional header CRC can be checked.
struct Recorder<'a, R: Read + ?Sized> {
    inner: &'a mut R,
    seen: Vec<u8>,
}

impl<R: Read + ?Sized> Read for Recorder<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}
