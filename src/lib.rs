//! # apkalign
//!
//! Reports where the payload of selected entries in an APK (a ZIP archive)
//! begins, and how that offset sits relative to a page boundary.
//!
//! The central directory records where each entry's *local* header starts,
//! not where its data starts. The local header carries its own file name and
//! extra field lengths, which may differ from the central directory copy, so
//! finding the payload needs two tiers of access:
//!
//! - [`ZipReader`] walks the central directory once and builds an
//!   [`ArchiveIndex`].
//! - [`header::read_local_header`] performs an explicit 30-byte read at each
//!   entry's header offset and derives the data offset from it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use apkalign::inspect::{Inspector, DEFAULT_PAGE_SIZE};
//! use eyre::Result;
//!
//! fn main() -> Result<()> {
//!     let inspector = Inspector::open("app-debug.apk", DEFAULT_PAGE_SIZE)?;
//!     for report in inspector.inspect_all(["lib/arm64-v8a/libmain.so"])? {
//!         println!("{report}\n");
//!     }
//!     Ok(())
//! }
//! ```

use eyre::{Result, WrapErr, eyre};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

pub mod error;
pub mod header;
pub mod inspect;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::InspectError;

// ============================================================================
// Constants
// ============================================================================

/// ZIP local file header signature (0x04034b50)
pub const LOCAL_FILE_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// ZIP central directory header signature (0x02014b50)
pub const CENTRAL_DIR_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

/// End of Central Directory signature (0x06054b50)
pub const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// ZIP64 End of Central Directory signature (0x06064b50)
pub const ZIP64_EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x06];

/// ZIP64 End of Central Directory Locator signature (0x07064b50)
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x07];

/// Header id of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// Compression method: no compression (stored)
pub const COMPRESSION_STORED: u16 = 0;

const ZIP64_SENTINEL_U32: u32 = 0xFFFF_FFFF;
const ZIP64_SENTINEL_U16: u16 = 0xFFFF;

const CENTRAL_DIR_HEADER_LEN: u64 = 46;
const EOCD_MIN_LEN: u64 = 22;
const ZIP64_EOCD_LOCATOR_LEN: u64 = 20;

pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

// ============================================================================
// I/O Trait
// ============================================================================

/// Positioned read access to the bytes of an archive.
///
/// The central directory tier reads through this trait, so an index can be
/// built from a file on disk or from an in-memory buffer.
pub trait ZipIO: Send + Sync {
    /// Read exact number of bytes at given offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or if EOF is reached before
    /// filling the buffer.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Get total size of the source in bytes.
    fn size(&self) -> Result<u64>;
}

impl<T: ZipIO + ?Sized> ZipIO for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn size(&self) -> Result<u64> {
        (**self).size()
    }
}

/// [`ZipIO`] backed by a file on disk.
pub struct FileIO {
    file: Mutex<File>,
    len: u64,
}

impl FileIO {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("Failed to open archive {}", path.display()))?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ZipIO for FileIO {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset
            .checked_add(buf.len() as u64)
            .is_none_or(|end| end > self.len)
        {
            return Err(eyre!(
                "Read of {} bytes at offset {} runs past end of archive ({} bytes)",
                buf.len(),
                offset,
                self.len
            ));
        }

        let mut file = self
            .file
            .lock()
            .map_err(|_| eyre!("Archive handle poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A central directory record for one entry of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// File name (path) within the ZIP archive
    pub name: String,

    /// Uncompressed size in bytes
    pub uncompressed_size: u64,

    /// Size of the stored payload in bytes
    pub compressed_size: u64,

    /// Offset of the local file header in the ZIP file
    pub offset: u64,

    /// Compression method (0 = stored/uncompressed)
    pub compression_method: u16,

    /// General purpose bit flags
    pub flags: u16,
}

impl ZipEntry {
    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Check if this entry uses STORED (uncompressed) compression.
    pub fn is_stored(&self) -> bool {
        self.compression_method == COMPRESSION_STORED
    }

    /// Whether sizes and CRC live in a data descriptor after the payload.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & (1 << 3) != 0
    }

    /// Check if this entry is a shared library in the APK native library tree.
    pub fn is_native_library(&self) -> bool {
        self.name.starts_with("lib/") && self.name.ends_with(".so") && !self.is_dir()
    }
}

/// Every central directory entry of an archive, in directory order.
///
/// Built once by [`ZipReader::index`] and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: Vec<ZipEntry>,
}

impl ArchiveIndex {
    pub fn new(entries: Vec<ZipEntry>) -> Self {
        Self { entries }
    }

    /// Look up an entry by its exact (case-sensitive) name.
    ///
    /// When a name is recorded more than once the last record wins, matching
    /// how ZIP readers that build a name table resolve duplicates.
    pub fn get(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZipEntry> {
        self.entries.iter()
    }

    pub fn native_libraries(&self) -> impl Iterator<Item = &ZipEntry> {
        self.entries.iter().filter(|e| e.is_native_library())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ArchiveIndex {
    type Item = ZipEntry;
    type IntoIter = std::vec::IntoIter<ZipEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ============================================================================
// ZIP Reader
// ============================================================================

/// Central directory reader.
pub struct ZipReader<I: ZipIO> {
    io: I,
}

impl ZipReader<FileIO> {
    /// Open a reader over the archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FileIO::open(path)?))
    }
}

impl<I: ZipIO> ZipReader<I> {
    /// Create a new ZIP reader from an I/O source.
    pub fn new(io: I) -> Self {
        Self { io }
    }

    /// Walk the central directory and collect every entry.
    pub fn index(&self) -> Result<ArchiveIndex> {
        let (cd_offset, num_entries) = self.get_central_directory_info()?;
        tracing::debug!(cd_offset, num_entries, "reading central directory");

        // Every record takes at least CENTRAL_DIR_HEADER_LEN bytes after cd_offset.
        let room = self.io.size()?.saturating_sub(cd_offset) / CENTRAL_DIR_HEADER_LEN;
        if num_entries as u64 > room {
            return Err(eyre!(
                "Central directory claims {num_entries} entries but only {room} fit in the archive"
            ));
        }

        let mut entries = Vec::with_capacity(num_entries);
        let mut current_offset = cd_offset;
        for _ in 0..num_entries {
            let (entry, next_offset) = self
                .read_central_directory_entry(current_offset)
                .wrap_err_with(|| {
                    format!("Bad central directory record at offset {current_offset}")
                })?;
            tracing::trace!(name = %entry.name, offset = entry.offset, "indexed entry");
            entries.push(entry);
            current_offset = next_offset;
        }

        Ok(ArchiveIndex::new(entries))
    }

    /// Find a specific entry by name.
    pub fn find_entry(&self, name: &str) -> Result<Option<ZipEntry>> {
        Ok(self.index()?.get(name).cloned())
    }

    // Internal methods

    /// Find the End of Central Directory record, scanning backwards over a
    /// possible trailing comment.
    fn find_eocd(&self) -> Result<u64> {
        let file_size = self.io.size()?;
        if file_size < EOCD_MIN_LEN {
            return Err(eyre!("Archive too small to be a ZIP ({file_size} bytes)"));
        }

        let max_search = std::cmp::min(file_size, u16::MAX as u64 + EOCD_MIN_LEN);
        let floor = file_size - max_search;
        let chunk_size = 8192;
        let mut current_pos = file_size;
        let mut buffer = vec![0u8; chunk_size];

        while current_pos > floor {
            let read_size = std::cmp::min(chunk_size, (current_pos - floor) as usize);
            let read_pos = current_pos - read_size as u64;
            self.io.read_at(read_pos, &mut buffer[..read_size])?;

            if let Some(i) = buffer[..read_size]
                .windows(4)
                .rposition(|w| w == EOCD_SIGNATURE)
            {
                return Ok(read_pos + i as u64);
            }

            // Overlap chunks so a signature straddling the boundary is seen.
            current_pos = if read_pos > floor + 3 { read_pos + 3 } else { floor };
        }

        Err(eyre!("Could not find End of Central Directory record"))
    }

    /// Read ZIP64 End of Central Directory information.
    fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<(u64, u64)> {
        if eocd_offset < ZIP64_EOCD_LOCATOR_LEN {
            return Err(eyre!("Invalid ZIP64 structure"));
        }

        let mut locator = [0u8; ZIP64_EOCD_LOCATOR_LEN as usize];
        self.io
            .read_at(eocd_offset - ZIP64_EOCD_LOCATOR_LEN, &mut locator)?;
        if locator[0..4] != ZIP64_EOCD_LOCATOR_SIGNATURE {
            return Err(eyre!(
                "ZIP64 format indicated but ZIP64 EOCD locator not found"
            ));
        }
        let zip64_eocd_offset = le_u64(&locator, 8);

        let mut zip64_eocd = [0u8; 56];
        self.io.read_at(zip64_eocd_offset, &mut zip64_eocd)?;
        if zip64_eocd[0..4] != ZIP64_EOCD_SIGNATURE {
            return Err(eyre!("Invalid ZIP64 EOCD signature"));
        }

        let num_entries = le_u64(&zip64_eocd, 32);
        let cd_offset = le_u64(&zip64_eocd, 48);
        Ok((cd_offset, num_entries))
    }

    /// Get central directory offset and number of entries.
    fn get_central_directory_info(&self) -> Result<(u64, usize)> {
        let eocd_offset = self.find_eocd()?;

        let mut eocd = [0u8; EOCD_MIN_LEN as usize];
        self.io.read_at(eocd_offset, &mut eocd)?;
        let num_entries = le_u16(&eocd, 10);
        let cd_offset = le_u32(&eocd, 16);

        if cd_offset == ZIP64_SENTINEL_U32 || num_entries == ZIP64_SENTINEL_U16 {
            let (real_cd_offset, real_num_entries) = self.read_zip64_eocd(eocd_offset)?;
            let real_num_entries = usize::try_from(real_num_entries)
                .wrap_err("ZIP64 entry count does not fit in memory")?;
            Ok((real_cd_offset, real_num_entries))
        } else {
            Ok((cd_offset as u64, num_entries as usize))
        }
    }

    /// Read a single central directory entry, returning it with the offset of
    /// the record that follows.
    fn read_central_directory_entry(&self, offset: u64) -> Result<(ZipEntry, u64)> {
        let mut record = [0u8; CENTRAL_DIR_HEADER_LEN as usize];
        self.io.read_at(offset, &mut record)?;

        if record[0..4] != CENTRAL_DIR_HEADER_SIGNATURE {
            return Err(eyre!("Invalid central directory header signature"));
        }

        let flags = le_u16(&record, 8);
        let compression_method = le_u16(&record, 10);
        let compressed_size = le_u32(&record, 20);
        let uncompressed_size = le_u32(&record, 24);
        let filename_len = le_u16(&record, 28) as usize;
        let extra_len = le_u16(&record, 30) as usize;
        let comment_len = le_u16(&record, 32) as usize;
        let local_header_offset = le_u32(&record, 42);

        let mut variable = vec![0u8; filename_len + extra_len];
        self.io
            .read_at(offset + CENTRAL_DIR_HEADER_LEN, &mut variable)?;
        let (filename, extra_data) = variable.split_at(filename_len);
        let name = String::from_utf8_lossy(filename).into_owned();

        let mut zip64 = Zip64Fields::new(uncompressed_size, compressed_size, local_header_offset);
        if zip64.any_pending() {
            zip64.resolve(extra_data);
        }
        let (uncompressed_size, compressed_size, local_header_offset) = zip64
            .finish()
            .ok_or_else(|| InspectError::Zip64Unsupported { name: name.clone() })?;

        let next_offset = offset
            + CENTRAL_DIR_HEADER_LEN
            + filename_len as u64
            + extra_len as u64
            + comment_len as u64;

        Ok((
            ZipEntry {
                name,
                uncompressed_size,
                compressed_size,
                offset: local_header_offset,
                compression_method,
                flags,
            },
            next_offset,
        ))
    }
}

/// Central directory fields that may be widened by the ZIP64 extra field.
///
/// A field is pending while it holds the 32-bit sentinel and no 64-bit value
/// has been found for it.
struct Zip64Fields {
    fields: [(u64, bool); 3],
}

impl Zip64Fields {
    fn new(uncompressed: u32, compressed: u32, header_offset: u32) -> Self {
        let field = |v: u32| (v as u64, v == ZIP64_SENTINEL_U32);
        Self {
            fields: [field(uncompressed), field(compressed), field(header_offset)],
        }
    }

    fn any_pending(&self) -> bool {
        self.fields.iter().any(|&(_, pending)| pending)
    }

    /// Fill pending fields from the ZIP64 extra block. The block only carries
    /// values for sentinel fields, in the order uncompressed, compressed,
    /// header offset.
    fn resolve(&mut self, extra: &[u8]) {
        let mut pos = 0;
        while pos + 4 <= extra.len() {
            let header_id = le_u16(extra, pos);
            let data_size = le_u16(extra, pos + 2) as usize;
            let data_end = pos + 4 + data_size;
            if data_end > extra.len() {
                break;
            }

            if header_id == ZIP64_EXTRA_FIELD_ID {
                let mut field_pos = pos + 4;
                for (value, pending) in self.fields.iter_mut().filter(|field| field.1) {
                    if field_pos + 8 > data_end {
                        break;
                    }
                    *value = le_u64(extra, field_pos);
                    *pending = false;
                    field_pos += 8;
                }
                return;
            }
            pos = data_end;
        }
    }

    fn finish(self) -> Option<(u64, u64, u64)> {
        if self.any_pending() {
            return None;
        }
        let [(uncompressed, _), (compressed, _), (offset, _)] = self.fields;
        Some((uncompressed, compressed, offset))
    }
}

// ============================================================================
// Tests
// ============================================================================
