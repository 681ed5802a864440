//! Minimal ustar archiver: create, list, extract and append
//!
//! Only regular files are stored, under names of at most 100 bytes. Archives
//! are plain POSIX ustar and can be read by any tar implementation.
//!
//! # Usage
//!
//! ## Creating an archive
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use ustar_light::{create, Options};
//!
//! let files = vec![PathBuf::from("file1.txt"), PathBuf::from("file2.txt")];
//! create(Path::new("archive.tar"), &files, &Options::default()).unwrap();
//! ```
//!
//! ## Listing and extracting
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use ustar_light::{extract, list, Options};
//!
//! for header in list(Path::new("archive.tar")).unwrap() {
//!     let header = header.unwrap();
//!     println!("{} ({} bytes)", header.name.display(), header.size);
//! }
//!
//! let options = Options {
//!     directory: PathBuf::from("output_directory"),
//!     ..Options::default()
//! };
//! let report = extract(Path::new("archive.tar"), &options).unwrap();
//! println!("{} file(s) extracted", report.extracted.len());
//! ```
//!
//! ## Appending
//!
//! New files are placed before the existing entries. The archive is rebuilt
//! next to the original (`archive.tar.tmp`) and renamed over it, so readers
//! see either the old or the new archive, never a partial one. Concurrent
//! writers to the same archive are not coordinated.
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use ustar_light::{append, Options};
//!
//! append(Path::new("archive.tar"), &[PathBuf::from("new.txt")], &Options::default()).unwrap();
//! ```

pub mod block;
pub mod error;
pub mod reader;
pub mod tar;
pub mod writer;

use std::path::{Path, PathBuf};

pub use error::{Result, TarError};
pub use reader::{ArchiveReader, ExtractReport, extract, list};
pub use tar::TarHeader;
pub use writer::{ArchiveWriter, append, create};

/// Settings shared by all archive operations
#[derive(Debug, Clone)]
pub struct Options {
    /// Input paths and extraction destinations are resolved against this
    /// directory. Stored names are the paths as given.
    pub directory: PathBuf,
    /// Restore access and modification times of extracted files
    pub preserve_mtime: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            preserve_mtime: true,
        }
    }
}

/// Update mode: only add files newer than their archived copy.
///
/// Not implemented; always fails with [`TarError::Unsupported`].
pub fn update(_archive: &Path, _files: &[PathBuf], _options: &Options) -> Result<()> {
    Err(TarError::Unsupported("update"))
}
