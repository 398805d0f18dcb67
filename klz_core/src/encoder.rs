use std::io::{self, Write};

use crate::checksum::Checksum;
use crate::codec::ChunkSink;
use crate::fanout::FanOut;
use crate::format::ContainerFooter;

/// Plaintext bytes between forced synchronization points: 64 KiB.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming encoder for the sync-friendly mode.
///
/// # Write contract
/// Call [`write`](Write::write) any number of times with arbitrary-sized
/// slices. Each slice is cut at chunk boundaries; every piece goes first to
/// the compressor and then to the running [`Checksum`], and the compressor is
/// sync-flushed each time exactly `chunk_size` plaintext bytes have passed
/// since the previous boundary. Call [`finish`](Self::finish) to force a last
/// sync point, terminate the DEFLATE stream, and get the footer values.
///
/// Unchanged regions of the input therefore compress to identical bytes
/// regardless of edits elsewhere, at the cost of a little ratio per chunk.
pub struct ChunkedStreamEncoder<'w> {
    compressor: Box<dyn ChunkSink + 'w>,
    checksum: Checksum,
    chunk_size: usize,
    /// Plaintext bytes written since the last sync point.
    filled: usize,
}

impl<'w> ChunkedStreamEncoder<'w> {
    pub fn new(compressor: Box<dyn ChunkSink + 'w>) -> Self {
        Self::with_chunk_size(compressor, CHUNK_SIZE)
    }

    /// `chunk_size` of zero is treated as one.
    pub fn with_chunk_size(compressor: Box<dyn ChunkSink + 'w>, chunk_size: usize) -> Self {
        Self {
            compressor,
            checksum: Checksum::new(),
            chunk_size: chunk_size.max(1),
            filled: 0,
        }
    }

    /// Plaintext bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.checksum.len()
    }

    /// Sync-flush, close the compressor, and return the footer for the data
    /// written.
    pub fn finish(mut self) -> io::Result<ContainerFooter> {
        self.compressor.sync_flush()?;
        let footer = self.checksum.footer();
        self.compressor.finish()?;
        Ok(footer)
    }
}

impl Write for ChunkedStreamEncoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let take = (self.chunk_size - self.filled).min(buf.len());
        {
            let mut sinks: [&mut dyn Write; 2] = [&mut self.compressor, &mut self.checksum];
            FanOut::new(&mut sinks).write_all(&buf[..take])?;
        }
        self.filled += take;
        if self.filled == self.chunk_size {
            self.compressor.sync_flush()?;
            self.filled = 0;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.compressor.flush()
    }
}
