//! Builds small ZIP archives byte by byte for tests.

pub(crate) struct EntrySpec {
    name: String,
    payload: Vec<u8>,
    uncompressed_size: u32,
    method: u16,
    local_extra: Vec<u8>,
    central_extra: Vec<u8>,
    central_offset: Option<u32>,
}

impl EntrySpec {
    pub(crate) fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            payload: data.to_vec(),
            uncompressed_size: data.len() as u32,
            method: 0,
            local_extra: Vec::new(),
            central_extra: Vec::new(),
            central_offset: None,
        }
    }

    /// A deflate entry whose payload is `compressed_len` filler bytes.
    pub(crate) fn deflated(name: &str, data: &[u8], compressed_len: usize) -> Self {
        Self {
            payload: vec![0xAA; compressed_len],
            method: 8,
            ..Self::stored(name, data)
        }
    }

    pub(crate) fn local_extra(mut self, extra: Vec<u8>) -> Self {
        self.local_extra = extra;
        self
    }

    pub(crate) fn central_extra(mut self, extra: Vec<u8>) -> Self {
        self.central_extra = extra;
        self
    }

    /// Record `offset` in the central directory instead of the real one.
    pub(crate) fn central_offset(mut self, offset: u32) -> Self {
        self.central_offset = Some(offset);
        self
    }
}

pub(crate) struct BuiltZip {
    pub(crate) bytes: Vec<u8>,
    pub(crate) header_offsets: Vec<u64>,
}

#[derive(Default)]
pub(crate) struct ZipBuilder {
    entries: Vec<EntrySpec>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry(mut self, entry: EntrySpec) -> Self {
        self.entries.push(entry);
        self
    }

    pub(crate) fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub(crate) fn build(self) -> BuiltZip {
        let mut out = Vec::new();
        let mut header_offsets = Vec::new();

        for e in &self.entries {
            header_offsets.push(out.len() as u64);
            out.extend_from_slice(&crate::LOCAL_FILE_HEADER_SIGNATURE);
            put_u16(&mut out, 20);
            put_u16(&mut out, 0);
            put_u16(&mut out, e.method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0x21);
            put_u32(&mut out, 0);
            put_u32(&mut out, e.payload.len() as u32);
            put_u32(&mut out, e.uncompressed_size);
            put_u16(&mut out, e.name.len() as u16);
            put_u16(&mut out, e.local_extra.len() as u16);
            out.extend_from_slice(e.name.as_bytes());
            out.extend_from_slice(&e.local_extra);
            out.extend_from_slice(&e.payload);
        }

        let cd_start = out.len();
        for (e, &offset) in self.entries.iter().zip(&header_offsets) {
            out.extend_from_slice(&crate::CENTRAL_DIR_HEADER_SIGNATURE);
            put_u16(&mut out, 20);
            put_u16(&mut out, 20);
            put_u16(&mut out, 0);
            put_u16(&mut out, e.method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0x21);
            put_u32(&mut out, 0);
            put_u32(&mut out, e.payload.len() as u32);
            put_u32(&mut out, e.uncompressed_size);
            put_u16(&mut out, e.name.len() as u16);
            put_u16(&mut out, e.central_extra.len() as u16);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u32(&mut out, 0);
            put_u32(&mut out, e.central_offset.unwrap_or(offset as u32));
            out.extend_from_slice(e.name.as_bytes());
            out.extend_from_slice(&e.central_extra);
        }
        let cd_len = out.len() - cd_start;

        out.extend_from_slice(&crate::EOCD_SIGNATURE);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.entries.len() as u16);
        put_u16(&mut out, self.entries.len() as u16);
        put_u32(&mut out, cd_len as u32);
        put_u32(&mut out, cd_start as u32);
        put_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);

        BuiltZip {
            bytes: out,
            header_offsets,
        }
    }
}

/// A ZIP64 extended information extra block holding `values`.
pub(crate) fn zip64_extra(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    put_u16(&mut out, crate::ZIP64_EXTRA_FIELD_ID);
    put_u16(&mut out, (values.len() * 8) as u16);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
