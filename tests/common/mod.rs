use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Writes a STORED-only ZIP to `dir/name` and returns its path together with
/// the local header offset of each entry.
///
/// `entries` holds `(name, local extra field, payload)`.
pub fn write_apk(dir: &Path, name: &str, entries: &[(&str, &[u8], &[u8])]) -> (PathBuf, Vec<u64>) {
    let mut out: Vec<u8> = Vec::new();
    let mut offsets = Vec::new();

    for (entry, extra, data) in entries {
        offsets.push(out.len() as u64);
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&[20, 0, 0, 0, 0, 0, 0, 0, 0x21, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
        out.extend_from_slice(extra);
        out.extend_from_slice(data);
    }

    let cd_start = out.len();
    for ((entry, _, data), offset) in entries.iter().zip(&offsets) {
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&[20, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0x21, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&(*offset as u32).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
    }
    let cd_len = out.len() - cd_start;

    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(cd_len as u32).to_le_bytes());
    out.extend_from_slice(&(cd_start as u32).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    let path = dir.join(name);
    std::fs::write(&path, out).unwrap();
    (path, offsets)
}

pub fn apkalign<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_apkalign"))
        .args(args)
        .output()
        .unwrap()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Rewrites the local header offset stored in the central directory record
/// of entry `nth` of an archive written by [`write_apk`].
pub fn retarget_entry(path: &Path, nth: usize, offset: u32) {
    let mut bytes = std::fs::read(path).unwrap();
    let eocd = bytes.len() - 22;
    let cd_start = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;

    let mut record = cd_start;
    for _ in 0..nth {
        let name_len = u16::from_le_bytes([bytes[record + 28], bytes[record + 29]]) as usize;
        record += 46 + name_len;
    }
    bytes[record + 42..record + 46].copy_from_slice(&offset.to_le_bytes());
    std::fs::write(path, bytes).unwrap();
}
