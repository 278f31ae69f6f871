//! OJFS image layout.
//!
//! ```text
//! +-------------------------------+ 0
//! | header (32 bytes)             |
//! +-------------------------------+ 32
//! | entry table (32 bytes each)   |
//! +-------------------------------+ string_offset
//! | NUL-terminated names          |
//! +-------------------------------+ data_offset
//! | file payloads                 |
//! +-------------------------------+ total_size
//! ```
//!
//! All integers are little-endian. Header offsets and entry data offsets are
//! absolute from the start of the image; entry name offsets are relative to
//! the string table. The data section starts 8-byte aligned.

use core::fmt;

use crate::Permissions;

/// `"OJFS"` read as a little-endian `u32`.
pub const MAGIC: u32 = 0x5346_4A4F;

/// The only supported format version.
pub const VERSION: u32 = 1;

/// Size of the image header.
pub const HEADER_SIZE: usize = 32;

/// Size of one entry record.
pub const ENTRY_SIZE: usize = 32;

/// Parent index of the root directory.
pub const ROOT_PARENT: u32 = 0xFFFF_FFFF;

/// Entry type tag for regular files.
pub const TYPE_FILE: u32 = 1;

/// Entry type tag for directories.
pub const TYPE_DIR: u32 = 2;

fn le_u32(data: &[u8], off: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&data[off..off + 4]);
    u32::from_le_bytes(bytes)
}

fn le_u64(data: &[u8], off: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&data[off..off + 8]);
    u64::from_le_bytes(bytes)
}

/// Image validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OjfsError {
    /// The buffer is too short for the structure being read.
    Truncated,
    /// The header does not start with [`MAGIC`].
    BadMagic,
    /// The header names a version other than [`VERSION`].
    UnsupportedVersion,
    /// The header's `total_size` exceeds the buffer, or a table lies outside it.
    SizeMismatch,
    /// Every instance slot is taken.
    TooManyInstances,
}

impl fmt::Display for OjfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "image truncated"),
            Self::BadMagic => write!(f, "invalid OJFS magic"),
            Self::UnsupportedVersion => write!(f, "unsupported OJFS version"),
            Self::SizeMismatch => write!(f, "image size mismatch"),
            Self::TooManyInstances => write!(f, "too many OJFS instances"),
        }
    }
}

/// Image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Must equal [`MAGIC`].
    pub magic: u32,
    /// Must equal [`VERSION`].
    pub version: u32,
    /// Number of entry records following the header.
    pub entry_count: u32,
    /// Absolute offset of the string table.
    pub string_offset: u32,
    /// Size of the string table in bytes.
    pub string_size: u32,
    /// Absolute offset of the data section.
    pub data_offset: u32,
    /// Size of the whole image.
    pub total_size: u64,
}

impl Header {
    /// Reads the header fields without validating them.
    ///
    /// # Errors
    ///
    /// [`OjfsError::Truncated`] if `data` is shorter than [`HEADER_SIZE`].
    pub fn parse(data: &[u8]) -> Result<Self, OjfsError> {
        if data.len() < HEADER_SIZE {
            return Err(OjfsError::Truncated);
        }
        Ok(Self {
            magic: le_u32(data, 0),
            version: le_u32(data, 4),
            entry_count: le_u32(data, 8),
            string_offset: le_u32(data, 12),
            string_size: le_u32(data, 16),
            data_offset: le_u32(data, 20),
            total_size: le_u64(data, 24),
        })
    }

    /// Checks magic, version and that the declared size fits in `len` bytes.
    ///
    /// # Errors
    ///
    /// The first check that fails, in that order.
    pub fn validate(&self, len: usize) -> Result<(), OjfsError> {
        if self.magic != MAGIC {
            return Err(OjfsError::BadMagic);
        }
        if self.version != VERSION {
            return Err(OjfsError::UnsupportedVersion);
        }
        if self.total_size > len as u64 {
            return Err(OjfsError::SizeMismatch);
        }
        let table_end = (self.entry_count as u64) * ENTRY_SIZE as u64 + HEADER_SIZE as u64;
        let strings_end = u64::from(self.string_offset) + u64::from(self.string_size);
        if table_end > self.total_size || strings_end > self.total_size {
            return Err(OjfsError::SizeMismatch);
        }
        Ok(())
    }

    /// Encodes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.entry_count.to_le_bytes());
        out[12..16].copy_from_slice(&self.string_offset.to_le_bytes());
        out[16..20].copy_from_slice(&self.string_size.to_le_bytes());
        out[20..24].copy_from_slice(&self.data_offset.to_le_bytes());
        out[24..32].copy_from_slice(&self.total_size.to_le_bytes());
        out
    }
}

/// One file or directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Offset of the name within the string table.
    pub name_offset: u32,
    /// Index of the parent entry, or [`ROOT_PARENT`].
    pub parent: u32,
    /// [`TYPE_FILE`] or [`TYPE_DIR`].
    pub kind: u32,
    /// Permission bits.
    pub permissions: u32,
    /// Absolute offset of the payload (files only).
    pub data_offset: u64,
    /// Payload size in bytes (files only).
    pub size: u64,
}

impl Entry {
    /// Reads an entry from a [`ENTRY_SIZE`]-byte record.
    ///
    /// # Errors
    ///
    /// [`OjfsError::Truncated`] if `data` is too short.
    pub fn parse(data: &[u8]) -> Result<Self, OjfsError> {
        if data.len() < ENTRY_SIZE {
            return Err(OjfsError::Truncated);
        }
        Ok(Self {
            name_offset: le_u32(data, 0),
            parent: le_u32(data, 4),
            kind: le_u32(data, 8),
            permissions: le_u32(data, 12),
            data_offset: le_u64(data, 16),
            size: le_u64(data, 24),
        })
    }

    /// Whether this entry is a directory.
    pub const fn is_dir(&self) -> bool {
        self.kind == TYPE_DIR
    }

    /// Whether this entry is a regular file.
    pub const fn is_file(&self) -> bool {
        self.kind == TYPE_FILE
    }

    /// Encodes the entry.
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0; ENTRY_SIZE];
        out[0..4].copy_from_slice(&self.name_offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.parent.to_le_bytes());
        out[8..12].copy_from_slice(&self.kind.to_le_bytes());
        out[12..16].copy_from_slice(&self.permissions.to_le_bytes());
        out[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        out[24..32].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

/// One node handed to [`pack`].
#[derive(Debug, Clone, Copy)]
pub struct ImageNode<'a> {
    /// Name component (empty for the root).
    pub name: &'a str,
    /// Index of the parent within the node list; `None` for the root.
    pub parent: Option<u32>,
    /// File payload, or `None` for a directory.
    pub contents: Option<&'a [u8]>,
}

impl<'a> ImageNode<'a> {
    /// A directory node.
    pub const fn dir(name: &'a str, parent: Option<u32>) -> Self {
        Self {
            name,
            parent,
            contents: None,
        }
    }

    /// A file node.
    pub const fn file(name: &'a str, parent: u32, contents: &'a [u8]) -> Self {
        Self {
            name,
            parent: Some(parent),
            contents: Some(contents),
        }
    }
}

/// Bytes [`pack`] needs for `nodes`.
pub fn packed_size(nodes: &[ImageNode<'_>]) -> usize {
    let (strings_end, data_size) = section_sizes(nodes);
    strings_end.next_multiple_of(8) + data_size
}

fn section_sizes(nodes: &[ImageNode<'_>]) -> (usize, usize) {
    let strings: usize = nodes.iter().map(|n| n.name.len() + 1).sum();
    let data: usize = nodes.iter().filter_map(|n| n.contents).map(<[u8]>::len).sum();
    (HEADER_SIZE + nodes.len() * ENTRY_SIZE + strings, data)
}

/// Writes an image holding `nodes`, in order, into `out`. Entries get
/// `READ | SYSTEM` permissions. Returns the image size.
///
/// # Errors
///
/// [`OjfsError::Truncated`] if `out` is smaller than [`packed_size`].
pub fn pack(nodes: &[ImageNode<'_>], out: &mut [u8]) -> Result<usize, OjfsError> {
    let total = packed_size(nodes);
    let out = out.get_mut(..total).ok_or(OjfsError::Truncated)?;
    out.fill(0);

    let string_offset = HEADER_SIZE + nodes.len() * ENTRY_SIZE;
    let (strings_end, _) = section_sizes(nodes);
    let data_offset = strings_end.next_multiple_of(8);
    let header = Header {
        magic: MAGIC,
        version: VERSION,
        entry_count: nodes.len() as u32,
        string_offset: string_offset as u32,
        string_size: (strings_end - string_offset) as u32,
        data_offset: data_offset as u32,
        total_size: total as u64,
    };
    out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

    let permissions = (Permissions::READ | Permissions::SYSTEM).bits();
    let mut name_at = 0;
    let mut data_at = data_offset;
    for (i, node) in nodes.iter().enumerate() {
        let size = node.contents.map_or(0, <[u8]>::len);
        let entry = Entry {
            name_offset: name_at as u32,
            parent: node.parent.unwrap_or(ROOT_PARENT),
            kind: if node.contents.is_some() { TYPE_FILE } else { TYPE_DIR },
            permissions,
            data_offset: if node.contents.is_some() { data_at as u64 } else { 0 },
            size: size as u64,
        };
        let at = HEADER_SIZE + i * ENTRY_SIZE;
        out[at..at + ENTRY_SIZE].copy_from_slice(&entry.to_bytes());

        let name = string_offset + name_at;
        out[name..name + node.name.len()].copy_from_slice(node.name.as_bytes());
        name_at += node.name.len() + 1;

        if let Some(contents) = node.contents {
            out[data_at..data_at + size].copy_from_slice(contents);
            data_at += size;
        }
    }
    Ok(total)
}
