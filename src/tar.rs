//! ustar header codec
//!
//! # Usage
//!
//! ## Encoding a header
//!
//! ```rust
//! use ustar_light::tar::{calc_checksum, TarHeader};
//!
//! let header = TarHeader::new("hello.txt".to_string(), 0o644, 12);
//! let bytes = header.to_bytes().unwrap();
//! assert_eq!(&bytes[257..263], b"ustar\0");
//!
//! // The stored checksum matches the recomputed one
//! let parsed = TarHeader::from_bytes(&bytes);
//! assert_eq!(parsed.checksum, calc_checksum(&bytes));
//! ```
//!
//! ## Names longer than the name field are rejected
//!
//! ```rust
//! use ustar_light::tar::TarHeader;
//!
//! let header = TarHeader::new("a".repeat(101), 0o644, 0);
//! assert!(header.to_bytes().is_err());
//! ```

use std::ffi::OsStr;
use std::fs::Metadata;
use std::ops::Range;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{Result, TarError};

/// Size of a header record and of one content block
pub const BLOCK_SIZE: usize = 512;
/// Maximum length of an entry name (no prefix splitting)
pub const NAME_SIZE: usize = 100;
/// Typeflag of a regular file
pub const REGTYPE: u8 = b'0';

// Field table: byte ranges inside the 512-byte record.
const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;

// Tar header struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Raw name bytes as stored in the archive
    pub name: PathBuf,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: u64,
    pub checksum: u32,
    pub typeflag: u8,
    pub magic: String,
    pub version: String,
}

impl TarHeader {
    /// Create a new TarHeader with minimal required fields
    /// Other fields are filled with default values
    pub fn new(name: impl Into<PathBuf>, mode: u32, size: u64) -> Self {
        Self {
            name: name.into(),
            mode,
            size,
            uid: 0,
            gid: 0,
            mtime: 0,
            checksum: 0,
            typeflag: REGTYPE,
            magic: "ustar".to_string(),
            version: "00".to_string(),
        }
    }

    /// Build the header of a regular file from its metadata
    pub fn from_metadata(name: impl Into<PathBuf>, meta: &Metadata) -> Self {
        let mut header = Self::new(name, meta.mode() & 0o777, meta.len());
        header.uid = meta.uid();
        header.gid = meta.gid();
        header.mtime = u64::try_from(meta.mtime()).unwrap_or(0);
        header
    }

    /// Parse a TarHeader from a 512-byte record.
    ///
    /// No checksum verification is done here; see [`TarHeader::verify_checksum`].
    pub fn from_bytes(data: &[u8; BLOCK_SIZE]) -> Self {
        TarHeader {
            name: read_tar_path(data, NAME),
            mode: read_tar_u32(data, MODE),
            uid: read_tar_u32(data, UID),
            gid: read_tar_u32(data, GID),
            size: read_tar_octal(data, SIZE),
            mtime: read_tar_octal(data, MTIME),
            checksum: read_tar_u32(data, CHKSUM),
            typeflag: data[TYPEFLAG],
            magic: read_tar_str(data, MAGIC),
            version: read_tar_str(data, VERSION),
        }
    }

    /// Encode the header into a 512-byte record with a valid checksum
    pub fn to_bytes(&self) -> Result<[u8; BLOCK_SIZE]> {
        let name = self.name.as_os_str().as_bytes();
        if name.len() > NAME_SIZE {
            return Err(TarError::NameTooLong {
                path: self.name.clone(),
                len: name.len(),
            });
        }

        let mut data = [0u8; BLOCK_SIZE];
        data[..name.len()].copy_from_slice(name);
        self.put_octal(&mut data, MODE, "mode", u64::from(self.mode))?;
        self.put_octal(&mut data, UID, "uid", u64::from(self.uid))?;
        self.put_octal(&mut data, GID, "gid", u64::from(self.gid))?;
        self.put_octal(&mut data, SIZE, "size", self.size)?;
        self.put_octal(&mut data, MTIME, "mtime", self.mtime)?;
        data[CHKSUM].fill(b' ');
        data[TYPEFLAG] = self.typeflag;
        put_str(&mut data[MAGIC], &self.magic);
        put_str(&mut data[VERSION], &self.version);

        // "%06o\0 "
        let checksum = format!("{:06o}", calc_checksum(&data));
        data[CHKSUM.start..CHKSUM.start + 6].copy_from_slice(checksum.as_bytes());
        data[CHKSUM.start + 6] = 0;
        data[CHKSUM.start + 7] = b' ';
        Ok(data)
    }

    /// Verify the checksum of the header
    /// Returns true if the checksum is valid
    pub fn verify_checksum(&self, data: &[u8; BLOCK_SIZE]) -> bool {
        calc_checksum(data) == self.checksum
    }

    /// One `tar -tv` style line: permissions, owner, size, mtime (UTC) and name
    pub fn long_listing(&self) -> String {
        let when = i64::try_from(self.mtime)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??".to_string());
        format!(
            "{} {}/{} {:>8} {} {}",
            permission_string(self.mode),
            self.uid,
            self.gid,
            self.size,
            when,
            self.name.display()
        )
    }

    fn put_octal(
        &self,
        data: &mut [u8; BLOCK_SIZE],
        range: Range<usize>,
        field: &'static str,
        value: u64,
    ) -> Result<()> {
        if write_octal(&mut data[range], value) {
            Ok(())
        } else {
            Err(TarError::FieldOverflow {
                path: self.name.clone(),
                field,
                value,
            })
        }
    }
}

/// True when the record is the end-of-archive sentinel (name starts with NUL).
/// Nothing else in the record is looked at.
pub fn is_end_of_archive(data: &[u8; BLOCK_SIZE]) -> bool {
    data[NAME.start] == 0
}

/// Calc checksum of the header bytes, counting the checksum field as spaces
pub fn calc_checksum(data: &[u8; BLOCK_SIZE]) -> u32 {
    let mut sum: u32 = 0;
    for (i, &b) in data.iter().enumerate() {
        if CHKSUM.contains(&i) {
            sum += u32::from(b' ');
        } else {
            sum += u32::from(b);
        }
    }
    sum
}

/// Zero-padded octal of `len - 1` digits followed by NUL.
/// Returns false when the value needs more digits than the field has.
fn write_octal(field: &mut [u8], value: u64) -> bool {
    let digits = field.len() - 1;
    let text = format!("{value:0digits$o}");
    if text.len() > digits {
        return false;
    }
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
    true
}

fn put_str(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}

// Field bytes up to the first NUL.
fn read_tar_bytes(data: &[u8], range: Range<usize>) -> &[u8] {
    let field = &data[range];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

fn read_tar_str(data: &[u8], range: Range<usize>) -> String {
    String::from_utf8_lossy(read_tar_bytes(data, range)).into_owned()
}

fn read_tar_path(data: &[u8], range: Range<usize>) -> PathBuf {
    PathBuf::from(OsStr::from_bytes(read_tar_bytes(data, range)))
}

// Leading spaces are skipped, parsing stops at the first non-octal byte.
fn read_tar_octal(data: &[u8], range: Range<usize>) -> u64 {
    data[range]
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|b| (b'0'..=b'7').contains(b))
        .fold(0u64, |acc, &b| {
            acc.saturating_mul(8).saturating_add(u64::from(b - b'0'))
        })
}

fn read_tar_u32(data: &[u8], range: Range<usize>) -> u32 {
    u32::try_from(read_tar_octal(data, range)).unwrap_or(u32::MAX)
}

fn permission_string(mode: u32) -> String {
    let mut s = String::with_capacity(10);
    s.push('-');
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn checksum_test() {
        let mut header = TarHeader::new("test.txt".to_string(), 0o644, 33);
        header.mtime = 1_700_000_000;
        let bytes = header.to_bytes().unwrap();

        let parsed = TarHeader::from_bytes(&bytes);
        assert!(parsed.verify_checksum(&bytes), "Checksum verification failed");

        // Recomputing with the checksum field blanked gives the stored value
        let mut blank = bytes;
        blank[148..156].fill(b' ');
        assert_eq!(calc_checksum(&blank), parsed.checksum);
        assert_eq!(&bytes[154..156], b"\0 ");
    }

    #[test]
    fn write_read_test() {
        let mut header = TarHeader::new("hoge.txt".to_string(), 0o644, 12);
        header.uid = 1000;
        header.gid = 100;
        header.mtime = 1_234_567_890;
        let bytes = header.to_bytes().unwrap();
        let parsed = TarHeader::from_bytes(&bytes);

        assert_eq!(parsed.name, PathBuf::from("hoge.txt"));
        assert_eq!(parsed.mode, 0o644);
        assert_eq!(parsed.uid, 1000);
        assert_eq!(parsed.gid, 100);
        assert_eq!(parsed.size, 12);
        assert_eq!(parsed.mtime, 1_234_567_890);
        assert_eq!(parsed.typeflag, REGTYPE);
        assert_eq!(parsed.magic, "ustar");
        assert_eq!(parsed.version, "00");
    }

    #[test]
    fn numeric_fields_are_zero_padded() {
        let mut header = TarHeader::new("a".to_string(), 0o644, 3);
        header.mtime = 0o17;
        let bytes = header.to_bytes().unwrap();
        assert_eq!(&bytes[100..108], b"0000644\0");
        assert_eq!(&bytes[108..116], b"0000000\0");
        assert_eq!(&bytes[124..136], b"00000000003\0");
        assert_eq!(&bytes[136..148], b"00000000017\0");
        assert_eq!(bytes[156], b'0');
        assert_eq!(&bytes[263..265], b"00");
        // uname, gname, devmajor, devminor, prefix and pad stay zero
        assert!(bytes[265..512].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_name_is_rejected() {
        let header = TarHeader::new("a".repeat(101), 0o644, 10);
        match header.to_bytes() {
            Err(TarError::NameTooLong { len, .. }) => assert_eq!(len, 101),
            other => panic!("expected NameTooLong, got {other:?}"),
        }
    }

    #[test]
    fn name_filling_the_whole_field() {
        let name = "n".repeat(NAME_SIZE);
        let bytes = TarHeader::new(name.clone(), 0o644, 0).to_bytes().unwrap();
        assert_eq!(bytes[99], b'n');
        assert_eq!(TarHeader::from_bytes(&bytes).name, PathBuf::from(name));
    }

    #[test]
    fn size_overflow_is_rejected() {
        // 11 octal digits hold at most 0o77777777777
        let header = TarHeader::new("big.bin".to_string(), 0o644, 0o100000000000);
        assert!(matches!(
            header.to_bytes(),
            Err(TarError::FieldOverflow { field: "size", .. })
        ));
        let header = TarHeader::new("big.bin".to_string(), 0o644, 0o77777777777);
        assert!(header.to_bytes().is_ok());
    }

    #[test]
    fn permissive_octal_parsing() {
        let mut data = [0u8; BLOCK_SIZE];
        data[124..136].copy_from_slice(b"  1750 xyz\0\0");
        data[136..148].copy_from_slice(b"12389\0\0\0\0\0\0\0");
        data[100..108].copy_from_slice(b"\0\0\0\0\0\0\0\0");
        let parsed = TarHeader::from_bytes(&data);
        assert_eq!(parsed.size, 0o1750);
        assert_eq!(parsed.mtime, 0o123);
        assert_eq!(parsed.mode, 0);
    }

    #[test]
    fn null_byte_in_name_ends_it() {
        let bytes = TarHeader::new("file\0hidden.txt".to_string(), 0o644, 5)
            .to_bytes()
            .unwrap();
        assert_eq!(TarHeader::from_bytes(&bytes).name, PathBuf::from("file"));
    }

    #[test]
    fn end_of_archive_sentinel() {
        let mut data = [0u8; BLOCK_SIZE];
        assert!(is_end_of_archive(&data));
        // Only the first name byte matters
        data[1..100].fill(b'x');
        assert!(is_end_of_archive(&data));
        let bytes = TarHeader::new("x".to_string(), 0o644, 0).to_bytes().unwrap();
        assert!(!is_end_of_archive(&bytes));
    }

    #[test]
    fn invalid_checksum_is_detected() {
        let mut bytes = TarHeader::new("test.txt".to_string(), 0o644, 10)
            .to_bytes()
            .unwrap();
        bytes[148] = b'7';
        bytes[149] = b'7';
        let parsed = TarHeader::from_bytes(&bytes);
        assert!(!parsed.verify_checksum(&bytes));
    }

    #[test]
    fn non_utf8_name_is_kept_verbatim() {
        let raw: &[u8] = b"caf\xe9.txt";
        let name = PathBuf::from(OsStr::from_bytes(raw));
        let bytes = TarHeader::new(name.clone(), 0o644, 0).to_bytes().unwrap();
        assert_eq!(&bytes[..raw.len()], raw);
        assert_eq!(bytes[raw.len()], 0);
        assert_eq!(TarHeader::from_bytes(&bytes).name, name);

        // The limit counts raw bytes: 100 non-UTF-8 bytes still fit
        let full = PathBuf::from(OsStr::from_bytes(&[0xe9u8; NAME_SIZE]));
        let bytes = TarHeader::new(full.clone(), 0o644, 0).to_bytes().unwrap();
        assert_eq!(TarHeader::from_bytes(&bytes).name, full);
    }

    #[test]
    fn long_listing_format() {
        let mut header = TarHeader::new("x.txt".to_string(), 0o754, 3);
        header.uid = 1000;
        header.gid = 1000;
        header.mtime = 0;
        assert_eq!(
            header.long_listing(),
            "-rwxr-xr-- 1000/1000        3 1970-01-01 00:00 x.txt"
        );
    }
}
