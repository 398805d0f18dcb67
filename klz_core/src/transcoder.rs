use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use crate::codec::Codec;
use crate::encoder::ChunkedStreamEncoder;
use crate::error::{Phase, TranscodeError};
use crate::format::ContainerHeader;
use crate::pending::PendingOutput;
use crate::request::{Level, Mode, Suffix, TranscodeRequest};
use crate::verifier::{IntegrityVerifier, VerifyError};

/// Comment stored in the header of sync-friendly output.
pub const CHUNKED_COMMENT: &str = "rsyncable: 64 KiB sync-flushed chunks";

const IO_BUF_SIZE: usize = 64 * 1024;

/// Summary of a finished file operation.
#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub mode: Mode,
    pub source: PathBuf,
    /// `None` in test mode.
    pub destination: Option<PathBuf>,
    /// Bytes read from the source.
    pub input_len: u64,
    /// Bytes written to the destination, or decoded bytes in test mode.
    pub output_len: u64,
    pub elapsed: Duration,
    pub source_removed: bool,
}

enum Transform {
    Compress(ContainerHeader),
    Decompress,
}

/// Validated plan for one request.
enum Plan {
    Stage {
        destination: PathBuf,
        transform: Transform,
    },
    Test,
}

/// Compresses, decompresses, or tests one file at a time.
///
/// # Operation sequence
/// 1. Stat and open the source; reject anything but a regular file.
/// 2. Derive the destination and check the overwrite policy. For compression,
///    encode the header now so a bad name fails before anything is staged.
/// 3. Stage the output in a temporary file beside the destination and stream
///    the source through the codec into it.
/// 4. Flush, fsync, and rename the staged file over the destination. Without
///    `overwrite`, a destination created in the meantime is not replaced.
/// 5. Remove the source unless `keep_source` is set.
///
/// A failure in 3 or 4 deletes the staged file and leaves both the source and
/// any previous destination untouched. A failure in 5 is reported as
/// [`TranscodeError::PostconditionViolation`]; the new destination stays.
///
/// The transcoder holds no per-request state and can be shared across threads.
pub struct AtomicFileTranscoder {
    codec: Arc<dyn Codec>,
}

impl AtomicFileTranscoder {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    pub fn run(&self, req: &TranscodeRequest) -> Result<TranscodeOutcome, TranscodeError> {
        let started = Instant::now();
        log::debug!(
            "{} {}: suffix={} level={} overwrite={} keep={} name={} chunked={} codec={}",
            req.mode,
            req.source.display(),
            req.suffix,
            req.level,
            req.overwrite,
            req.keep_source,
            req.embed_name,
            req.chunked,
            self.codec.name()
        );
        if req.verbose {
            log::info!("{} {}", progress_verb(req), req.source.display());
        }

        let (meta, source) = open_source(&req.source)?;
        let outcome = match plan(req, &meta)? {
            Plan::Test => self.test(req, source, meta.len(), started)?,
            Plan::Stage {
                destination,
                transform,
            } => self.transcode(req, source, &destination, &transform, started)?,
        };

        if req.verbose {
            log_summary(req, &outcome);
        }
        Ok(outcome)
    }

    fn test(
        &self,
        req: &TranscodeRequest,
        source: File,
        input_len: u64,
        started: Instant,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let reader = BufReader::with_capacity(IO_BUF_SIZE, source);
        let report = IntegrityVerifier::new(self.codec.as_ref())
            .verify(reader)
            .map_err(|e| verify_error(e, &req.source, &req.source))?;
        Ok(TranscodeOutcome {
            mode: Mode::Test,
            source: req.source.clone(),
            destination: None,
            input_len,
            output_len: report.decoded_len,
            elapsed: started.elapsed(),
            source_removed: false,
        })
    }

    fn transcode(
        &self,
        req: &TranscodeRequest,
        source: File,
        destination: &Path,
        transform: &Transform,
        started: Instant,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let mut pending = PendingOutput::create(destination)
            .map_err(|e| TranscodeError::io(Phase::Open, destination, e))?;
        log::debug!("staging {}", pending.staged_path().display());

        let (input_len, output_len) = match self.stage(req, source, transform, &mut pending) {
            Ok(lens) => lens,
            Err(err) => {
                discard(pending);
                return Err(err);
            }
        };

        pending.promote(req.overwrite).map_err(|e| {
            if !req.overwrite && e.kind() == io::ErrorKind::AlreadyExists {
                TranscodeError::DestinationExists {
                    path: destination.to_path_buf(),
                }
            } else {
                TranscodeError::io(Phase::Rename, destination, e)
            }
        })?;

        let source_removed = if req.keep_source {
            false
        } else {
            fs::remove_file(&req.source).map_err(|source| {
                TranscodeError::PostconditionViolation {
                    source_path: req.source.clone(),
                    destination: destination.to_path_buf(),
                    source,
                }
            })?;
            true
        };

        Ok(TranscodeOutcome {
            mode: req.mode,
            source: req.source.clone(),
            destination: Some(destination.to_path_buf()),
            input_len,
            output_len,
            elapsed: started.elapsed(),
            source_removed,
        })
    }

    /// Stream the source into the staged file and make it durable.
    ///
    /// Returns (bytes read, bytes staged). The source handle is closed on
    /// return.
    fn stage(
        &self,
        req: &TranscodeRequest,
        source: File,
        transform: &Transform,
        pending: &mut PendingOutput,
    ) -> Result<(u64, u64), TranscodeError> {
        let destination = pending.destination().to_path_buf();
        let mut reader = BufReader::with_capacity(IO_BUF_SIZE, SourceReader::new(source));
        let mut out = BufWriter::with_capacity(IO_BUF_SIZE, pending.file_mut());

        match transform {
            Transform::Compress(header) => {
                let result = if req.chunked {
                    self.compress_chunked(&mut reader, &mut out, header, req.level)
                } else {
                    self.codec
                        .compress_member(&mut reader, &mut out, header, req.level)
                        .map(|_| ())
                };
                result.map_err(|e| {
                    if reader.get_ref().failed {
                        TranscodeError::io(Phase::Read, &req.source, e)
                    } else {
                        TranscodeError::io(Phase::Write, &destination, e)
                    }
                })?;
            }
            Transform::Decompress => {
                IntegrityVerifier::new(self.codec.as_ref())
                    .decode(&mut reader, &mut out)
                    .map_err(|e| verify_error(e, &req.source, &destination))?;
            }
        }
        let input_len = reader.get_ref().consumed;
        drop(reader);

        out.flush()
            .map_err(|e| TranscodeError::io(Phase::Finalize, &destination, e))?;
        drop(out);
        pending
            .sync()
            .map_err(|e| TranscodeError::io(Phase::Finalize, &destination, e))?;
        let output_len = pending
            .len()
            .map_err(|e| TranscodeError::io(Phase::Finalize, &destination, e))?;
        Ok((input_len, output_len))
    }

    /// Hand-built header, sync-flushed DEFLATE payload, footer from the
    /// encoder's running checksum.
    fn compress_chunked(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        header: &ContainerHeader,
        level: Level,
    ) -> io::Result<()> {
        header.write_to(dst)?;
        let mut encoder = ChunkedStreamEncoder::new(self.codec.open_chunked(&mut *dst, level));
        io::copy(src, &mut encoder)?;
        let footer = encoder.finish()?;
        footer.write_to(dst)
    }
}

/// Destination for `req`: suffix appended on compression, stripped on
/// decompression, none for testing.
pub fn destination_for(req: &TranscodeRequest) -> Result<Option<PathBuf>, TranscodeError> {
    match req.mode {
        Mode::Compress => {
            let mut name = req.source.clone().into_os_string();
            name.push(req.suffix.as_str());
            Ok(Some(PathBuf::from(name)))
        }
        Mode::Decompress => strip_suffix(&req.source, &req.suffix)
            .map(Some)
            .ok_or_else(|| TranscodeError::SuffixMismatch {
                path: req.source.clone(),
                suffix: req.suffix.to_string(),
            }),
        Mode::Test => Ok(None),
    }
}

#[cfg(unix)]
fn strip_suffix(path: &Path, suffix: &Suffix) -> Option<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let name = path.file_name()?.as_bytes();
    match name.strip_suffix(suffix.as_str().as_bytes()) {
        Some(stem) if !stem.is_empty() => Some(path.with_file_name(OsStr::from_bytes(stem))),
        _ => None,
    }
}

/// Non-unix names must be valid Unicode to have a suffix stripped.
#[cfg(not(unix))]
fn strip_suffix(path: &Path, suffix: &Suffix) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    match name.strip_suffix(suffix.as_str()) {
        Some(stem) if !stem.is_empty() => Some(path.with_file_name(stem)),
        _ => None,
    }
}

fn open_source(path: &Path) -> Result<(Metadata, File), TranscodeError> {
    let not_found = |e: io::Error| match e.kind() {
        io::ErrorKind::NotFound => TranscodeError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => TranscodeError::io(Phase::Open, path, e),
    };
    let meta = fs::metadata(path).map_err(not_found)?;
    if !meta.is_file() {
        return Err(TranscodeError::NotRegularFile {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(not_found)?;
    Ok((meta, file))
}

fn plan(req: &TranscodeRequest, meta: &Metadata) -> Result<Plan, TranscodeError> {
    let destination = match destination_for(req)? {
        Some(d) => d,
        None => return Ok(Plan::Test),
    };
    if !req.overwrite && fs::symlink_metadata(&destination).is_ok() {
        return Err(TranscodeError::DestinationExists { path: destination });
    }
    let transform = match req.mode {
        Mode::Compress => Transform::Compress(header_for(req, meta)?),
        _ => Transform::Decompress,
    };
    Ok(Plan::Stage {
        destination,
        transform,
    })
}

/// Header values for compressing `req.source`, already checked to encode.
fn header_for(req: &TranscodeRequest, meta: &Metadata) -> Result<ContainerHeader, TranscodeError> {
    let mut header = ContainerHeader::default();
    if req.embed_name {
        header.name = Some(
            req.source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        header.mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
    }
    if req.chunked {
        header.comment = Some(CHUNKED_COMMENT.to_string());
    }
    header
        .encode()
        .map_err(|source| TranscodeError::Framing {
            phase: Phase::Validate,
            path: req.source.clone(),
            source,
        })?;
    Ok(header)
}

fn verify_error(err: VerifyError, source: &Path, destination: &Path) -> TranscodeError {
    match err {
        VerifyError::Read(e) => TranscodeError::io(Phase::Read, source, e),
        VerifyError::Write(e) => TranscodeError::io(Phase::Write, destination, e),
        other => TranscodeError::CorruptInput {
            phase: Phase::Transform,
            path: source.to_path_buf(),
            source: other,
        },
    }
}

fn discard(pending: PendingOutput) {
    let staged = pending.staged_path().to_path_buf();
    if let Err(e) = pending.discard() {
        log::warn!("could not remove staged file {}: {}", staged.display(), e);
    }
}

fn progress_verb(req: &TranscodeRequest) -> &'static str {
    match (req.mode, req.chunked) {
        (Mode::Compress, true) => "Compressing (rsyncable)",
        (Mode::Compress, false) => "Compressing",
        (Mode::Decompress, _) => "Decompressing",
        (Mode::Test, _) => "Testing",
    }
}

fn log_summary(req: &TranscodeRequest, outcome: &TranscodeOutcome) {
    let input = human_bytes(outcome.input_len);
    let output = human_bytes(outcome.output_len);
    match (&outcome.destination, outcome.mode) {
        (Some(dst), Mode::Compress) => log::info!(
            "Compressed {} from {} to {} (level {}) in {:.3?}",
            dst.display(),
            input,
            output,
            req.level,
            outcome.elapsed
        ),
        (Some(dst), _) => log::info!(
            "Decompressed {} from {} to {} in {:.3?}",
            dst.display(),
            input,
            output,
            outcome.elapsed
        ),
        (None, _) => log::info!(
            "Tested {} ({}) in {:.3?}",
            outcome.source.display(),
            input,
            outcome.elapsed
        ),
    }
}

pub fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Counts bytes taken from the source and remembers whether reading failed,
/// so an I/O error coming back out of a codec can be blamed on the right file.
struct SourceReader<R> {
    inner: R,
    consumed: u64,
    failed: bool,
}

impl<R> SourceReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            consumed: 0,
            failed: false,
        }
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.consumed += n as u64;
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.failed = true;
                }
                Err(e)
            }
        }
    }
}
