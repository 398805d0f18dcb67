use std::io::{self, Write};

use crate::format::ContainerFooter;

/// Running CRC32 and byte count over a plaintext stream.
///
/// Implements [`Write`] so it can sit next to a compressor in a
/// [`FanOut`](crate::fanout::FanOut). Writing never fails.
#[derive(Clone, Default)]
pub struct Checksum {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Total bytes seen, not truncated.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Footer describing everything seen so far; the size wraps at 2^32.
    pub fn footer(&self) -> ContainerFooter {
        ContainerFooter {
            crc32: self.crc32(),
            size: self.len as u32,
        }
    }
}

impl Write for Checksum {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
