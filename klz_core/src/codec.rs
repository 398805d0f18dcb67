use std::io::{self, BufRead, Read, Write};

use crate::format::ContainerHeader;
use crate::request::Level;

/// A compressor that can be forced onto a synchronization point.
///
/// After [`sync_flush`](ChunkSink::sync_flush) returns, everything written so
/// far has reached the underlying writer as a byte-aligned prefix that a
/// decoder can fully inflate without any later data.
pub trait ChunkSink: Write {
    /// Emit a synchronization point without resetting the compression state.
    fn sync_flush(&mut self) -> io::Result<()>;

    /// Terminate the compressed stream and flush it to the underlying writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Entropy-coding backend.
///
/// The container framing, checksums and file handling all live in this crate;
/// an implementation only has to turn plaintext into DEFLATE data and back.
/// - `compress_member` is the plain path: the backend writes a whole member,
///   header and trailer included, from the given header values.
/// - `open_chunked` is the raw path used with hand-built framing.
/// - `inflate` must stop consuming `src` exactly at the end of the compressed
///   data so the caller can read the trailer that follows.
pub trait Codec: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// Compress all of `src` into one complete member on `dst`.
    ///
    /// Returns the number of plaintext bytes consumed.
    fn compress_member(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        header: &ContainerHeader,
        level: Level,
    ) -> io::Result<u64>;

    /// Open a raw DEFLATE compressor writing into `dst`.
    fn open_chunked<'w>(&self, dst: &'w mut dyn Write, level: Level) -> Box<dyn ChunkSink + 'w>;

    /// Raw DEFLATE decoder reading from `src`.
    fn inflate<'r>(&self, src: &'r mut dyn BufRead) -> Box<dyn Read + 'r>;
}
