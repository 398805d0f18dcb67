use std::io::{self, BufRead, Read, Write};

use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, GzBuilder};

use klz_core::format::{encode_latin1, ContainerHeader, FrameError, MAX_EXTRA_LEN};
use klz_core::{ChunkSink, Codec, Level};

/// DEFLATE via flate2.
///
/// Plain members go through `GzBuilder`, which writes its own header and
/// trailer. The chunked path is a raw `DeflateEncoder` whose `flush` is a
/// Z_SYNC_FLUSH: the current block is closed, output is byte-aligned, and an
/// empty stored block (`00 00 ff ff`) marks the boundary.
pub struct FlateCodec;

impl Codec for FlateCodec {
    fn name(&self) -> &'static str {
        "flate2"
    }

    fn compress_member(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        header: &ContainerHeader,
        level: Level,
    ) -> io::Result<u64> {
        let mut builder = GzBuilder::new()
            .mtime(header.mtime)
            .operating_system(header.os);
        if let Some(extra) = &header.extra {
            if extra.len() > MAX_EXTRA_LEN {
                return Err(FrameError::FieldTooLarge { len: extra.len() }.into());
            }
            builder = builder.extra(extra.clone());
        }
        // GzBuilder panics on interior NULs, so encode up front.
        if let Some(name) = &header.name {
            builder = builder.filename(encode_latin1("name", name)?);
        }
        if let Some(comment) = &header.comment {
            builder = builder.comment(encode_latin1("comment", comment)?);
        }

        let mut encoder = builder.write(dst, Compression::new(level.get()));
        let n = io::copy(src, &mut encoder)?;
        encoder.finish()?;
        Ok(n)
    }

    fn open_chunked<'w>(&self, dst: &'w mut dyn Write, level: Level) -> Box<dyn ChunkSink + 'w> {
        Box::new(FlateChunkSink::new(dst, level))
    }

    fn inflate<'r>(&self, src: &'r mut dyn BufRead) -> Box<dyn Read + 'r> {
        Box::new(DeflateDecoder::new(src))
    }
}

/// Raw DEFLATE writer with sync points.
pub struct FlateChunkSink<W: Write> {
    encoder: DeflateEncoder<W>,
}

impl<W: Write> FlateChunkSink<W> {
    pub fn new(dst: W, level: Level) -> Self {
        Self {
            encoder: DeflateEncoder::new(dst, Compression::new(level.get())),
        }
    }
}

impl<W: Write> Write for FlateChunkSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl<W: Write> ChunkSink for FlateChunkSink<W> {
    fn sync_flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.encoder.finish().map(|_| ())
    }
}
