//! Sequential archive scanning, listing and extraction.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::Options;
use crate::block::{BlockError, padded_len, skip_bytes, skip_content};
use crate::error::{Result, TarError};
use crate::tar::{BLOCK_SIZE, TarHeader, is_end_of_archive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    Done,
}

// Content of the entry last returned by `next_header`.
#[derive(Debug, Clone, Copy)]
struct Pending {
    size: u64,
    consumed: u64,
}

/// Pulls one header at a time out of an archive stream.
///
/// Scanning ends at the first record whose name starts with NUL, or at a
/// record cut short by the end of the stream. Content that the caller does
/// not read is skipped before the next header is fetched. The sequence
/// cannot be restarted; seek the underlying stream and build a new reader.
#[derive(Debug)]
pub struct ArchiveReader<R> {
    inner: R,
    state: ScanState,
    current: Option<Pending>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: ScanState::Scanning,
            current: None,
        }
    }

    /// Next entry header, or `None` once the end of the archive is reached
    pub fn next_header(&mut self) -> io::Result<Option<TarHeader>> {
        if self.state == ScanState::Done {
            return Ok(None);
        }
        self.finish_entry()?;

        let mut block = [0u8; BLOCK_SIZE];
        let n = read_full(&mut self.inner, &mut block)?;
        if n < BLOCK_SIZE {
            debug!(read = n, "archive ends without a full terminator");
            self.state = ScanState::Done;
            return Ok(None);
        }
        if is_end_of_archive(&block) {
            self.state = ScanState::Done;
            return Ok(None);
        }

        let header = TarHeader::from_bytes(&block);
        debug!(name = %header.name.display(), size = header.size, "entry");
        self.current = Some(Pending {
            size: header.size,
            consumed: 0,
        });
        Ok(Some(header))
    }

    /// Copy the current entry's content into `out`.
    ///
    /// Stops early without error if the archive is truncated; the return
    /// value is the number of bytes copied.
    pub fn read_content<W: Write>(&mut self, out: &mut W) -> std::result::Result<u64, BlockError> {
        let Some(pending) = self.current.as_mut() else {
            return Ok(0);
        };
        let mut buffer = [0u8; BLOCK_SIZE];
        let mut copied = 0;
        while pending.consumed < pending.size {
            let want = (pending.size - pending.consumed).min(BLOCK_SIZE as u64) as usize;
            let n = match self.inner.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BlockError::Read(e)),
            };
            pending.consumed += n as u64;
            out.write_all(&buffer[..n]).map_err(BlockError::Write)?;
            copied += n as u64;
        }
        Ok(copied)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    // Position the stream at the next header.
    fn finish_entry(&mut self) -> io::Result<()> {
        match self.current.take() {
            None => Ok(()),
            Some(Pending { size, consumed: 0 }) => skip_content(&mut self.inner, size),
            Some(Pending { size, consumed }) => {
                skip_bytes(&mut self.inner, padded_len(size) - consumed)
            }
        }
    }
}

impl<R: Read + Seek> Iterator for ArchiveReader<R> {
    type Item = io::Result<TarHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_header() {
            Ok(header) => header.map(Ok),
            Err(e) => {
                self.state = ScanState::Done;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn open_archive(archive: &Path) -> Result<ArchiveReader<BufReader<File>>> {
    let file = File::open(archive).map_err(|source| TarError::OpenFailed {
        path: archive.to_path_buf(),
        source,
    })?;
    Ok(ArchiveReader::new(BufReader::new(file)))
}

/// Lists TarHeader in a tar archive, in archive order.
///
/// Headers are read lazily; a read error is yielded once and ends the sequence.
pub fn list(archive: &Path) -> Result<impl Iterator<Item = Result<TarHeader>> + use<>> {
    let reader = open_archive(archive)?;
    let path = archive.to_path_buf();
    Ok(reader.map(move |header| {
        header.map_err(|source| TarError::ShortRead {
            path: path.clone(),
            source,
        })
    }))
}

/// Outcome of an extraction that ran to the end of the archive
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Names written to disk, in archive order
    pub extracted: Vec<PathBuf>,
    /// Entries that could not be written; the rest of the archive was still processed
    pub failures: Vec<TarError>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Extracts every entry of `archive` below `options.directory`.
///
/// Failing to create or write one destination is recorded in the report and
/// does not stop the remaining entries. Errors reading the archive itself
/// are returned.
pub fn extract(archive: &Path, options: &Options) -> Result<ExtractReport> {
    let mut reader = open_archive(archive)?;
    let mut report = ExtractReport::default();

    loop {
        let header = reader.next_header().map_err(|source| TarError::ShortRead {
            path: archive.to_path_buf(),
            source,
        })?;
        let Some(header) = header else { break };

        match extract_entry(&mut reader, &header, archive, options)? {
            Ok(()) => {
                info!(name = %header.name.display(), size = header.size, "extracted");
                report.extracted.push(header.name);
            }
            Err(e) => {
                warn!("{e}");
                report.failures.push(e);
            }
        }
    }
    Ok(report)
}

// The outer error aborts the extraction, the inner one only this entry.
fn extract_entry<R: Read + Seek>(
    reader: &mut ArchiveReader<R>,
    header: &TarHeader,
    archive: &Path,
    options: &Options,
) -> Result<std::result::Result<(), TarError>> {
    let dest = options.directory.join(&header.name);
    let file = match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(&dest)
    {
        Ok(file) => file,
        // The unread content is skipped by the next `next_header` call.
        Err(source) => return Ok(Err(TarError::OpenFailed { path: dest, source })),
    };

    let mut out = BufWriter::new(file);
    match reader.read_content(&mut out) {
        Ok(copied) if copied < header.size => {
            warn!(name = %header.name.display(), expected = header.size, copied, "archive truncated");
        }
        Ok(_) => {}
        Err(BlockError::Write(source)) => {
            return Ok(Err(TarError::ShortWrite { path: dest, source }));
        }
        Err(e) => return Err(e.at(archive, &dest)),
    }
    if let Err(source) = out.flush() {
        return Ok(Err(TarError::ShortWrite { path: dest, source }));
    }

    if options.preserve_mtime {
        if let Err(source) = restore_mtime(out.get_ref(), header.mtime) {
            return Ok(Err(TarError::TimesFailed { path: dest, source }));
        }
    }
    Ok(Ok(()))
}

/// Set both access and modification time of the open file to `mtime`
fn restore_mtime(file: &File, mtime: u64) -> io::Result<()> {
    let secs = i64::try_from(mtime)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "mtime out of range"))?;
    let time = FileTime::from_unix_time(secs, 0);
    filetime::set_file_handle_times(file, Some(time), Some(time))
}
