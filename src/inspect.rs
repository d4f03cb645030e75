//! Per-entry alignment inspection.

use eyre::{Result, eyre};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::header::{self, HeaderRead};
use crate::{ArchiveIndex, InspectError, ZipReader};

/// Page size native libraries must be aligned to.
pub const DEFAULT_PAGE_SIZE: u64 = 16384;

/// Archive checked when none is given: the debug build output of the app.
pub const DEFAULT_ARCHIVE: &str = "app/build/outputs/apk/debug/app-debug.apk";

/// Entries checked when none are given.
pub const DEFAULT_ENTRIES: [&str; 2] = [
    "lib/arm64-v8a/liboboe.so",
    "lib/arm64-v8a/liboboe_synth.so",
];

/// Where an entry's payload sits in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub name: String,
    pub compression_method: u16,
    pub header_offset: u64,
    pub data_offset: u64,
    pub page_size: u64,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

impl Placement {
    /// `data_offset % page_size`.
    pub fn remainder(&self) -> u64 {
        self.data_offset % self.page_size
    }

    pub fn is_aligned(&self) -> bool {
        self.remainder() == 0
    }
}

/// Result of inspecting one entry. Missing entries and unreadable headers
/// are outcomes, not errors: the run goes on with the next entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryReport {
    NotFound { name: String },
    HeaderReadFailed { name: String, available: usize },
    Inspected(Placement),
}

impl EntryReport {
    pub fn name(&self) -> &str {
        match self {
            EntryReport::NotFound { name } | EntryReport::HeaderReadFailed { name, .. } => name,
            EntryReport::Inspected(placement) => &placement.name,
        }
    }
}

impl fmt::Display for EntryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryReport::NotFound { name } => write!(f, "{name} NOT FOUND"),
            EntryReport::HeaderReadFailed { name, .. } => {
                write!(f, "{name} failed to read local header")
            }
            EntryReport::Inspected(p) => {
                writeln!(f, "{}", p.name)?;
                writeln!(
                    f,
                    "  compress_type: {} (0 = stored/uncompressed)",
                    p.compression_method
                )?;
                writeln!(f, "  header_offset: {}", p.header_offset)?;
                writeln!(f, "  data_offset  : {}", p.data_offset)?;
                writeln!(f, "  data_offset % {} = {}", p.page_size, p.remainder())?;
                writeln!(f, "  file_size    : {}", p.uncompressed_size)?;
                write!(f, "  compress_size: {}", p.compressed_size)
            }
        }
    }
}

/// An archive whose central directory has been loaded, ready to measure
/// entries.
pub struct Inspector {
    path: PathBuf,
    index: ArchiveIndex,
    page_size: u64,
}

impl Inspector {
    /// Index the archive at `path`.
    ///
    /// # Errors
    ///
    /// [`InspectError::MissingArchive`] if nothing exists at `path`, or any
    /// error from reading the central directory.
    pub fn open(path: impl AsRef<Path>, page_size: u64) -> Result<Self> {
        let path = path.as_ref();
        if page_size == 0 {
            return Err(eyre!("Page size must be non-zero"));
        }
        if !path.is_file() {
            return Err(InspectError::MissingArchive(path.to_path_buf()).into());
        }

        let index = ZipReader::open(path)?.index()?;
        tracing::info!(path = %path.display(), entries = index.len(), "indexed archive");

        Ok(Self {
            path: path.to_path_buf(),
            index,
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Names of every native library in the archive, in directory order.
    pub fn native_libraries(&self) -> Vec<String> {
        self.index
            .native_libraries()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Measure one entry.
    pub fn inspect_entry(&self, name: &str) -> Result<EntryReport> {
        let Some(entry) = self.index.get(name) else {
            tracing::debug!(name, "entry not in central directory");
            return Ok(EntryReport::NotFound {
                name: name.to_string(),
            });
        };

        if entry.has_data_descriptor() {
            tracing::debug!(name, "entry uses a data descriptor");
        }
        if !entry.is_stored() {
            tracing::info!(
                name,
                method = entry.compression_method,
                "entry is compressed and cannot be mapped in place"
            );
        }

        let header = match header::read_local_header(&self.path, entry.offset)? {
            HeaderRead::Complete(header) => header,
            HeaderRead::Truncated { available } => {
                tracing::warn!(
                    name,
                    header_offset = entry.offset,
                    available,
                    "local header is truncated"
                );
                return Ok(EntryReport::HeaderReadFailed {
                    name: name.to_string(),
                    available,
                });
            }
        };

        if !header.has_valid_signature() {
            tracing::warn!(
                name,
                header_offset = entry.offset,
                signature = ?header.signature,
                "local header signature mismatch"
            );
        }
        tracing::debug!(
            name,
            header_offset = entry.offset,
            filename_len = header.filename_len,
            extra_len = header.extra_len,
            "read local header"
        );

        Ok(EntryReport::Inspected(Placement {
            name: entry.name.clone(),
            compression_method: entry.compression_method,
            header_offset: entry.offset,
            data_offset: header.data_offset(entry.offset),
            page_size: self.page_size,
            uncompressed_size: entry.uncompressed_size,
            compressed_size: entry.compressed_size,
        }))
    }

    /// Measure each of `names` in order.
    pub fn inspect_all<I, S>(&self, names: I) -> Result<Vec<EntryReport>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| self.inspect_entry(name.as_ref()))
            .collect()
    }
}
