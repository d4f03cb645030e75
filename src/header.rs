//! Local file header access.
//!
//! This is the byte-level tier: one explicit read of the fixed 30-byte
//! local header at an entry's header offset, done against the archive file
//! itself rather than through the central directory reader.

use eyre::{Result, WrapErr};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{LOCAL_FILE_HEADER_SIGNATURE, le_u16};

/// Size of the fixed part of a local file header.
pub const LOCAL_HEADER_LEN: usize = 30;

/// The fields of a local file header that locate the entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub signature: [u8; 4],
    pub compression_method: u16,
    /// Little-endian u16 at byte 26.
    pub filename_len: u16,
    /// Little-endian u16 at byte 28.
    pub extra_len: u16,
}

impl LocalFileHeader {
    pub fn parse(raw: &[u8; LOCAL_HEADER_LEN]) -> Self {
        Self {
            signature: [raw[0], raw[1], raw[2], raw[3]],
            compression_method: le_u16(raw, 8),
            filename_len: le_u16(raw, 26),
            extra_len: le_u16(raw, 28),
        }
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature == LOCAL_FILE_HEADER_SIGNATURE
    }

    /// Bytes between the start of the header and the start of the payload.
    pub fn span(&self) -> u64 {
        LOCAL_HEADER_LEN as u64 + self.filename_len as u64 + self.extra_len as u64
    }

    /// Absolute offset of the payload for a header located at `header_offset`.
    pub fn data_offset(&self, header_offset: u64) -> u64 {
        header_offset + self.span()
    }
}

/// Outcome of reading a local header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRead {
    Complete(LocalFileHeader),
    /// Fewer than [`LOCAL_HEADER_LEN`] bytes exist at the header offset.
    Truncated { available: usize },
}

/// Open the archive at `path`, seek to `header_offset` and read the local
/// header there. The file is closed before returning.
pub fn read_local_header(path: &Path, header_offset: u64) -> Result<HeaderRead> {
    let mut file = File::open(path)
        .wrap_err_with(|| format!("Failed to reopen archive {}", path.display()))?;
    read_local_header_from(&mut file, header_offset)
}

/// Same as [`read_local_header`] for an already open source.
pub fn read_local_header_from<R: Read + Seek>(
    reader: &mut R,
    header_offset: u64,
) -> Result<HeaderRead> {
    let len = reader.seek(SeekFrom::End(0))?;
    if header_offset >= len {
        return Ok(HeaderRead::Truncated { available: 0 });
    }

    reader.seek(SeekFrom::Start(header_offset))?;
    let mut raw = Vec::with_capacity(LOCAL_HEADER_LEN);
    reader
        .by_ref()
        .take(LOCAL_HEADER_LEN as u64)
        .read_to_end(&mut raw)
        .wrap_err_with(|| format!("Failed to read local header at offset {header_offset}"))?;

    let Ok(raw) = <[u8; LOCAL_HEADER_LEN]>::try_from(raw.as_slice()) else {
        return Ok(HeaderRead::Truncated {
            available: raw.len(),
        });
    };
    Ok(HeaderRead::Complete(LocalFileHeader::parse(&raw)))
}
