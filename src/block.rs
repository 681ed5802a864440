//! Block-aligned content streaming.
//!
//! Entry content is stored in whole 512-byte blocks; the tail of the last
//! block is zero padding.

use std::io::{self, Read, Seek, Write};
use std::path::Path;

use tracing::warn;

use crate::error::TarError;
use crate::tar::BLOCK_SIZE;

const BLOCK: u64 = BLOCK_SIZE as u64;

/// Stream failure, before it is attributed to a path.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("input ended with {remaining} bytes left to copy")]
    Eof { remaining: u64 },
}

impl BlockError {
    /// Attach the input and output paths; read side failures name `input`,
    /// write side failures name `output`.
    pub fn at(self, input: &Path, output: &Path) -> TarError {
        match self {
            BlockError::Read(source) => TarError::ShortRead {
                path: input.to_path_buf(),
                source,
            },
            BlockError::Write(source) => TarError::ShortWrite {
                path: output.to_path_buf(),
                source,
            },
            BlockError::Eof { remaining } => TarError::UnexpectedEof {
                path: input.to_path_buf(),
                remaining,
            },
        }
    }
}

/// Content size rounded up to a whole number of blocks
pub fn padded_len(size: u64) -> u64 {
    size.div_ceil(BLOCK) * BLOCK
}

/// Copy `size` bytes of `input` into `output`, then zero-pad to the block
/// boundary. Returns the number of bytes taken from `input`.
///
/// An input that ends early is not an error: the shortfall is written as
/// zeros so the archive still holds exactly `padded_len(size)` bytes.
pub fn write_content<W: Write, R: Read>(
    output: &mut W,
    input: &mut R,
    size: u64,
) -> Result<u64, BlockError> {
    let mut buffer = [0u8; BLOCK_SIZE];
    let mut total: u64 = 0;

    while total < size {
        let want = chunk_len(size - total);
        let n = match input.read(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BlockError::Read(e)),
        };
        output.write_all(&buffer[..n]).map_err(BlockError::Write)?;
        total += n as u64;
    }

    if total < size {
        warn!(expected = size, copied = total, "input ended early, zero-filling");
    }
    write_zeros(output, padded_len(size) - total)?;
    Ok(total)
}

/// Advance past an entry's content without reading it.
///
/// Uses `Seek::seek_relative`, so a `BufReader` keeps its buffer when the
/// target is already buffered.
pub fn skip_content<S: Seek>(cursor: &mut S, size: u64) -> io::Result<()> {
    skip_bytes(cursor, padded_len(size))
}

pub(crate) fn skip_bytes<S: Seek>(cursor: &mut S, len: u64) -> io::Result<()> {
    if len > 0 {
        let offset = i64::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
        cursor.seek_relative(offset)?;
    }
    Ok(())
}

/// Copy an existing entry's content blocks verbatim, padding included.
/// Running out of input before `padded_len(size)` bytes is an error.
pub fn copy_content_blocks<W: Write, R: Read>(
    output: &mut W,
    input: &mut R,
    size: u64,
) -> Result<(), BlockError> {
    let mut buffer = [0u8; BLOCK_SIZE];
    let mut remaining = padded_len(size);

    while remaining > 0 {
        let want = chunk_len(remaining);
        let n = match input.read(&mut buffer[..want]) {
            Ok(0) => return Err(BlockError::Eof { remaining }),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BlockError::Read(e)),
        };
        output.write_all(&buffer[..n]).map_err(BlockError::Write)?;
        remaining -= n as u64;
    }
    Ok(())
}

fn write_zeros<W: Write>(output: &mut W, mut len: u64) -> Result<(), BlockError> {
    let zeros = [0u8; BLOCK_SIZE];
    while len > 0 {
        let n = chunk_len(len);
        output.write_all(&zeros[..n]).map_err(BlockError::Write)?;
        len -= n as u64;
    }
    Ok(())
}

fn chunk_len(remaining: u64) -> usize {
    remaining.min(BLOCK) as usize
}
