//! The bundle archive container.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "BALE"  u16 version  u32 entry_count
//! entry_count x { u16 name_len, name (utf-8), u32 data_len, data }
//! ```
//!
//! Entries are written in name order so the same inputs always produce the
//! same bytes, and therefore the same content hash in the manifest.

use std::collections::BTreeMap;

use crate::error::{FormatError, FormatResult};

/// Magic bytes at the start of every archive.
pub const MAGIC: &[u8; 4] = b"BALE";

/// Current container version.
pub const VERSION: u16 = 1;

/// A parsed archive: named objects and their serialized bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    /// Decode an archive from bytes.
    pub fn parse(bytes: &[u8]) -> FormatResult<Self> {
        let mut reader = Reader { bytes, pos: 0 };

        if reader.take(MAGIC.len(), "magic")? != MAGIC {
            return Err(FormatError::BadMagic);
        }
        let version = reader.u16("version")?;
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion { version });
        }

        let count = reader.u32("entry count")?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let name_len = reader.u16("entry name length")? as usize;
            let name = std::str::from_utf8(reader.take(name_len, "entry name")?)
                .map_err(|_| FormatError::InvalidName)?
                .to_string();
            let data_len = reader.u32("entry data length")? as usize;
            let data = reader.take(data_len, "entry data")?.to_vec();
            entries.insert(name, data);
        }

        Ok(Self { entries })
    }

    /// Bytes of the named object, if present.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Check whether the archive holds the named object.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate object names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive holds no objects.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for archive bytes.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ArchiveWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object. A later insert with the same name replaces the earlier one.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(name.into(), data.into());
        self
    }

    /// Number of objects added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the archive.
    pub fn finish(&self) -> FormatResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());

        let count = u32::try_from(self.entries.len()).map_err(|_| FormatError::TooLarge {
            name: "<entry count>".to_string(),
        })?;
        out.extend_from_slice(&count.to_le_bytes());

        for (name, data) in &self.entries {
            let name_len = u16::try_from(name.len())
                .map_err(|_| FormatError::TooLarge { name: name.clone() })?;
            let data_len = u32::try_from(data.len())
                .map_err(|_| FormatError::TooLarge { name: name.clone() })?;

            out.extend_from_slice(&name_len.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&data_len.to_le_bytes());
            out.extend_from_slice(data);
        }

        Ok(out)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, context: &'static str) -> FormatResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(FormatError::Truncated { context })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self, context: &'static str) -> FormatResult<u16> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, context: &'static str) -> FormatResult<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
