//! Archive creation and the rebuild-and-replace append.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::Options;
use crate::block::{copy_content_blocks, write_content};
use crate::error::{Result, TarError};
use crate::reader::read_full;
use crate::tar::{BLOCK_SIZE, TarHeader, is_end_of_archive};

/// Writes header and content records to an archive stream
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    inner: W,
    path: PathBuf,
}

impl<W: Write> ArchiveWriter<W> {
    /// `path` is only used to name the output in error messages
    pub fn new(inner: W, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Add the file `dir/name`, stored under `name`.
    ///
    /// Directories are skipped and reported with `Ok(false)`.
    pub fn append_file(&mut self, dir: &Path, name: &Path) -> Result<bool> {
        let mut file = File::open(dir.join(name)).map_err(|source| TarError::OpenFailed {
            path: name.to_path_buf(),
            source,
        })?;
        let meta = file.metadata().map_err(|source| TarError::StatFailed {
            path: name.to_path_buf(),
            source,
        })?;
        if meta.is_dir() {
            debug!(name = %name.display(), "skipping directory");
            return Ok(false);
        }

        let header = TarHeader::from_metadata(name, &meta);
        self.append_raw_header(&header.to_bytes()?)?;
        write_content(&mut self.inner, &mut file, header.size)
            .map_err(|e| e.at(name, &self.path))?;
        info!(name = %header.name.display(), size = header.size, "added");
        Ok(true)
    }

    /// Write an already encoded header record unchanged
    pub fn append_raw_header(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.inner
            .write_all(block)
            .map_err(|source| TarError::ShortWrite {
                path: self.path.clone(),
                source,
            })
    }

    /// Write the two zero blocks that end the archive and flush
    pub fn finish(mut self) -> Result<W> {
        let path = self.path.clone();
        let write_err = |source| TarError::ShortWrite { path, source };
        self.inner
            .write_all(&[0u8; 2 * BLOCK_SIZE])
            .and_then(|()| self.inner.flush())
            .map_err(write_err)?;
        Ok(self.inner)
    }
}

/// Creates `archive` from `files`, in the given order.
///
/// The first file that cannot be added aborts the run; whatever was written
/// so far stays on disk.
pub fn create(archive: &Path, files: &[PathBuf], options: &Options) -> Result<()> {
    let file = File::create(archive).map_err(|source| TarError::OpenFailed {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut writer = ArchiveWriter::new(BufWriter::new(file), archive);
    let mut added = 0;
    for name in files {
        if writer.append_file(&options.directory, name)? {
            added += 1;
        }
    }
    writer.finish()?;
    info!(archive = %archive.display(), entries = added, "created");
    Ok(())
}

/// Adds `files` in front of the entries of an existing archive.
///
/// The new archive is built in `<archive>.tmp` and renamed over the original.
/// On any failure the temp file is removed and the original is not touched.
pub fn append(archive: &Path, files: &[PathBuf], options: &Options) -> Result<()> {
    let original = File::open(archive).map_err(|source| TarError::OpenFailed {
        path: archive.to_path_buf(),
        source,
    })?;
    let permissions = original
        .metadata()
        .map_err(|source| TarError::StatFailed {
            path: archive.to_path_buf(),
            source,
        })?
        .permissions();

    let (temp, file) = TempArchive::create(archive)?;
    let mut writer = ArchiveWriter::new(BufWriter::new(file), &temp.path);
    for name in files {
        writer.append_file(&options.directory, name)?;
    }
    let kept = copy_entries(&mut BufReader::new(original), archive, &mut writer)?;

    let file = writer
        .finish()?
        .into_inner()
        .map_err(|e| TarError::ShortWrite {
            path: temp.path.clone(),
            source: e.into_error(),
        })?;
    file.sync_all().map_err(|source| TarError::ShortWrite {
        path: temp.path.clone(),
        source,
    })?;
    if let Err(e) = file.set_permissions(permissions) {
        warn!(path = %temp.path.display(), "cannot copy archive permissions: {e}");
    }
    drop(file);

    temp.persist(archive)?;
    info!(archive = %archive.display(), added = files.len(), kept, "appended");
    Ok(())
}

// Copy every record of `input` verbatim until the terminator or end of file.
fn copy_entries<R: Read, W: Write>(
    input: &mut R,
    archive: &Path,
    writer: &mut ArchiveWriter<W>,
) -> Result<usize> {
    let mut count = 0;
    loop {
        let mut block = [0u8; BLOCK_SIZE];
        let n = read_full(input, &mut block).map_err(|source| TarError::ShortRead {
            path: archive.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        if n < BLOCK_SIZE {
            return Err(TarError::CorruptHeader {
                path: archive.to_path_buf(),
                read: n,
            });
        }
        if is_end_of_archive(&block) {
            break;
        }

        let header = TarHeader::from_bytes(&block);
        writer.append_raw_header(&block)?;
        copy_content_blocks(writer.get_mut(), input, header.size)
            .map_err(|e| e.at(archive, writer.path()))?;
        debug!(name = %header.name.display(), size = header.size, "kept");
        count += 1;
    }
    Ok(count)
}

/// `<archive>.tmp`, removed on drop unless it replaced the archive
#[derive(Debug)]
struct TempArchive {
    path: PathBuf,
    persisted: bool,
}

impl TempArchive {
    fn create(archive: &Path) -> Result<(Self, File)> {
        let mut name = archive.as_os_str().to_owned();
        name.push(".tmp");
        let path = PathBuf::from(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&path)
            .map_err(|source| TarError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        Ok((
            Self {
                path,
                persisted: false,
            },
            file,
        ))
    }

    fn persist(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target).map_err(|source| TarError::RenameFailed {
            path: target.to_path_buf(),
            source,
        })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), "cannot remove temp archive: {e}");
        }
    }
}
