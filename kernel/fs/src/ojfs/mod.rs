//! OJFS: read-only packed filesystem over an in-memory image.
//!
//! The directory tree exists only as parent back-references, so listing a
//! directory scans the whole entry table and looking up a path scans it once
//! per component.
//!
//! Up to [`MAX_OJFS_INSTANCES`] images can be initialized, but path-based
//! operations always go through the most recently initialized one. Handles
//! stay bound to the image they were opened on.

use core::fmt;

use ojjy_core::sync::SpinLock;
use ojjy_core::{kinfo, kwarn};

use crate::path;
use crate::{
    DirEntry, FileName, FileSystem, FsError, FsHandle, OpenFlags, Permissions, Stat, VfsFileType,
    Whence, claim_slot, release_slot, seek_target, slot_mut, slot_ref,
};

pub mod format;

pub use format::{Entry, Header, ImageNode, OjfsError, pack, packed_size};
use format::{ENTRY_SIZE, HEADER_SIZE, ROOT_PARENT};

/// Images that can be initialized over the lifetime of an [`Ojfs`].
pub const MAX_OJFS_INSTANCES: usize = 4;

/// Open file handles.
pub const MAX_OJFS_FILES: usize = 16;

/// Open directory handles.
pub const MAX_OJFS_DIRS: usize = 8;

/// Parent chains longer than this are not followed when indenting a listing.
const MAX_TREE_DEPTH: usize = 10;

/// A validated view of an OJFS image.
#[derive(Clone, Copy)]
pub struct OjfsImage<'a> {
    data: &'a [u8],
    header: Header,
}

impl<'a> OjfsImage<'a> {
    /// Validates `data` and wraps it.
    ///
    /// # Errors
    ///
    /// See [`Header::validate`].
    pub fn parse(data: &'a [u8]) -> Result<Self, OjfsError> {
        let header = Header::parse(data)?;
        header.validate(data.len())?;
        Ok(Self { data, header })
    }

    /// The image header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.header.entry_count as usize
    }

    /// Entry `index`, if it lies inside the image.
    pub fn entry(&self, index: usize) -> Option<Entry> {
        let start = HEADER_SIZE + index.checked_mul(ENTRY_SIZE)?;
        let record = self.data.get(start..start + ENTRY_SIZE)?;
        Entry::parse(record).ok()
    }

    /// `(index, entry)` pairs in table order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, Entry)> + '_ {
        (0..self.entry_count()).filter_map(|i| self.entry(i).map(|e| (i, e)))
    }

    /// The entry's name, or `""` if it is not valid UTF-8 inside the
    /// string table.
    pub fn name(&self, entry: &Entry) -> &'a str {
        let start = self.header.string_offset as usize;
        let end = start + self.header.string_size as usize;
        let Some(strings) = self.data.get(start..end) else {
            return "";
        };
        let tail = strings.get(entry.name_offset as usize..).unwrap_or_default();
        let len = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        core::str::from_utf8(&tail[..len]).unwrap_or_default()
    }

    /// A file entry's payload.
    ///
    /// # Errors
    ///
    /// [`FsError::Corrupt`] if the payload lies outside the image.
    pub fn file_data(&self, entry: &Entry) -> Result<&'a [u8], FsError> {
        let start = usize::try_from(entry.data_offset).map_err(|_| FsError::Corrupt)?;
        let len = usize::try_from(entry.size).map_err(|_| FsError::Corrupt)?;
        let end = start.checked_add(len).ok_or(FsError::Corrupt)?;
        self.data.get(start..end).ok_or(FsError::Corrupt)
    }

    /// Index of the root directory entry.
    pub fn root(&self) -> Option<usize> {
        self.entries()
            .find(|(_, e)| e.parent == ROOT_PARENT && e.is_dir())
            .map(|(i, _)| i)
    }

    /// Index of the first entry under `parent` named `name`.
    fn child(&self, parent: u32, name: &str) -> Option<usize> {
        self.entries()
            .find(|(_, e)| e.parent == parent && self.name(e) == name)
            .map(|(i, _)| i)
    }

    /// Resolves a path relative to the image root.
    ///
    /// The walk starts from the root entry's children; an image without a
    /// root entry is searched from the top-level sentinel instead.
    pub fn find(&self, path: &str) -> Option<usize> {
        let mut components = path::components(path).peekable();
        if components.peek().is_none() {
            return self.root();
        }
        let mut parent = self.root().map_or(ROOT_PARENT, |r| r as u32);
        let mut found = None;
        for name in components {
            let index = self.child(parent, name)?;
            parent = index as u32;
            found = Some(index);
        }
        found
    }

    /// The type reported for an entry. Directories named `*.app` are bundles.
    pub fn file_type(&self, entry: &Entry) -> VfsFileType {
        if entry.is_dir() {
            if path::is_bundle(self.name(entry)) {
                VfsFileType::Bundle
            } else {
                VfsFileType::Directory
            }
        } else if entry.is_file() {
            VfsFileType::File
        } else {
            VfsFileType::Unknown
        }
    }

    fn depth(&self, entry: &Entry) -> usize {
        let mut depth = 0;
        let mut parent = entry.parent;
        while parent != ROOT_PARENT && depth < MAX_TREE_DEPTH {
            depth += 1;
            parent = match self.entry(parent as usize) {
                Some(e) => e.parent,
                None => break,
            };
        }
        depth
    }

    /// Writes an indented listing of every entry.
    ///
    /// # Errors
    ///
    /// Propagates errors from `out`.
    pub fn write_tree(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "OJFS: {} entries", self.entry_count())?;
        for (_, entry) in self.entries() {
            for _ in 0..self.depth(&entry) {
                out.write_str("  ")?;
            }
            let name = self.name(&entry);
            if entry.is_dir() {
                writeln!(out, "[DIR ] {name}/")?;
            } else {
                writeln!(out, "[FILE] {name} ({} bytes)", entry.size)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct OpenFile {
    instance: usize,
    entry: Entry,
    position: u64,
}

#[derive(Clone, Copy)]
struct OpenDir {
    instance: usize,
    parent: u32,
    cursor: usize,
}

struct State<'a> {
    instances: [Option<OjfsImage<'a>>; MAX_OJFS_INSTANCES],
    current: Option<usize>,
    files: [Option<OpenFile>; MAX_OJFS_FILES],
    dirs: [Option<OpenDir>; MAX_OJFS_DIRS],
}

impl<'a> State<'a> {
    fn current(&self) -> Result<(usize, OjfsImage<'a>), FsError> {
        let index = self.current.ok_or(FsError::NotMounted)?;
        let image = self.instances[index].ok_or(FsError::NotMounted)?;
        Ok((index, image))
    }

    fn instance(&self, index: usize) -> Result<OjfsImage<'a>, FsError> {
        self.instances[index].ok_or(FsError::NotMounted)
    }

    fn lookup(&self, path: &str) -> Result<(usize, OjfsImage<'a>, usize, Entry), FsError> {
        let (instance, image) = self.current()?;
        let index = image.find(path).ok_or(FsError::NotFound)?;
        let entry = image.entry(index).ok_or(FsError::Corrupt)?;
        Ok((instance, image, index, entry))
    }
}

/// The OJFS backend.
pub struct Ojfs<'a> {
    state: SpinLock<State<'a>>,
}

impl<'a> Ojfs<'a> {
    /// A backend with no images.
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new(State {
                instances: [None; MAX_OJFS_INSTANCES],
                current: None,
                files: [None; MAX_OJFS_FILES],
                dirs: [None; MAX_OJFS_DIRS],
            }),
        }
    }

    /// Validates `image`, stores it in the next instance slot and makes it
    /// the image every path operation goes to. Returns the slot.
    ///
    /// # Errors
    ///
    /// Any validation failure, or [`OjfsError::TooManyInstances`].
    pub fn init(&self, image: &'a [u8]) -> Result<usize, OjfsError> {
        let parsed = match OjfsImage::parse(image) {
            Ok(parsed) => parsed,
            Err(e) => {
                kwarn!("OJFS: rejected image: {}", e);
                return Err(e);
            }
        };
        let mut state = self.state.lock();
        let slot = state
            .instances
            .iter()
            .position(Option::is_none)
            .ok_or(OjfsError::TooManyInstances)?;
        state.instances[slot] = Some(parsed);
        state.current = Some(slot);
        kinfo!(
            "OJFS: initialized instance {} ({} entries, {} bytes)",
            slot,
            parsed.entry_count(),
            parsed.header().total_size
        );
        Ok(slot)
    }

    /// Slot of the image path operations currently use.
    pub fn current_instance(&self) -> Option<usize> {
        self.state.lock().current
    }

    /// Number of initialized images.
    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.iter().flatten().count()
    }

    /// The image in `slot`.
    pub fn image(&self, slot: usize) -> Option<OjfsImage<'a>> {
        self.state.lock().instances.get(slot).copied().flatten()
    }
}

impl Default for Ojfs<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for Ojfs<'_> {
    fn name(&self) -> &'static str {
        "ojfs"
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FsHandle, FsError> {
        if flags.is_mutating() {
            return Err(FsError::ReadOnly);
        }
        let mut state = self.state.lock();
        let (instance, image, _, entry) = state.lookup(path)?;
        if !entry.is_file() {
            return Err(FsError::IsADirectory);
        }
        image.file_data(&entry)?;
        let file = OpenFile {
            instance,
            entry,
            position: 0,
        };
        let slot = claim_slot(&mut state.files, file)?;
        Ok(FsHandle::from_slot(slot))
    }

    fn close(&self, handle: FsHandle) -> Result<(), FsError> {
        release_slot(&mut self.state.lock().files, handle.slot()).map(drop)
    }

    fn read(&self, handle: FsHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let file = *slot_ref(&state.files, handle.slot())?;
        let data = state.instance(file.instance)?.file_data(&file.entry)?;
        let start = usize::try_from(file.position).map_err(|_| FsError::InvalidArgument)?;
        let remaining = data.get(start..).unwrap_or_default();
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        slot_mut(&mut state.files, handle.slot())?.position += n as u64;
        Ok(n)
    }

    fn write(&self, _handle: FsHandle, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::ReadOnly)
    }

    fn seek(&self, handle: FsHandle, offset: i64, whence: Whence) -> Result<u64, FsError> {
        let mut state = self.state.lock();
        let file = slot_mut(&mut state.files, handle.slot())?;
        file.position = seek_target(file.position, file.entry.size, offset, whence)?;
        Ok(file.position)
    }

    fn tell(&self, handle: FsHandle) -> Result<u64, FsError> {
        Ok(slot_ref(&self.state.lock().files, handle.slot())?.position)
    }

    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let (_, image, index, entry) = self.state.lock().lookup(path)?;
        Ok(Stat {
            file_type: image.file_type(&entry),
            size: entry.size,
            permissions: Permissions::from_bits_truncate(entry.permissions),
            uid: 0,
            created: 0,
            modified: 0,
            inode: index as u64,
        })
    }

    fn opendir(&self, path: &str) -> Result<FsHandle, FsError> {
        let mut state = self.state.lock();
        let (instance, image) = state.current()?;
        let parent = match image.find(path) {
            Some(index) => {
                let entry = image.entry(index).ok_or(FsError::Corrupt)?;
                if !entry.is_dir() {
                    return Err(FsError::NotADirectory);
                }
                index as u32
            }
            // An image without a root entry still lists its top level.
            None if path::components(path).next().is_none() => ROOT_PARENT,
            None => return Err(FsError::NotFound),
        };
        let dir = OpenDir {
            instance,
            parent,
            cursor: 0,
        };
        let slot = claim_slot(&mut state.dirs, dir)?;
        Ok(FsHandle::from_slot(slot))
    }

    fn closedir(&self, handle: FsHandle) -> Result<(), FsError> {
        release_slot(&mut self.state.lock().dirs, handle.slot()).map(drop)
    }

    fn readdir(&self, handle: FsHandle) -> Result<Option<DirEntry>, FsError> {
        let mut state = self.state.lock();
        let dir = *slot_ref(&state.dirs, handle.slot())?;
        let image = state.instance(dir.instance)?;
        let mut cursor = dir.cursor;
        let mut found = None;
        while cursor < image.entry_count() {
            let index = cursor;
            cursor += 1;
            let Some(entry) = image.entry(index) else {
                break;
            };
            if entry.parent == dir.parent {
                found = Some(DirEntry {
                    name: FileName::new(image.name(&entry))?,
                    file_type: image.file_type(&entry),
                    size: entry.size,
                    inode: index as u64,
                });
                break;
            }
        }
        slot_mut(&mut state.dirs, handle.slot())?.cursor = cursor;
        Ok(found)
    }

    fn rewinddir(&self, handle: FsHandle) -> Result<(), FsError> {
        slot_mut(&mut self.state.lock().dirs, handle.slot())?.cursor = 0;
        Ok(())
    }

    fn mkdir(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }

    fn unlink(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }

    fn rename(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }

    fn exists(&self, path: &str) -> Result<bool, FsError> {
        let (_, image) = self.state.lock().current()?;
        Ok(image.find(path).is_some())
    }

    fn isdir(&self, path: &str) -> Result<bool, FsError> {
        let (_, image) = self.state.lock().current()?;
        Ok(image
            .find(path)
            .and_then(|i| image.entry(i))
            .is_some_and(|e| e.is_dir()))
    }

    fn isfile(&self, path: &str) -> Result<bool, FsError> {
        let (_, image) = self.state.lock().current()?;
        Ok(image
            .find(path)
            .and_then(|i| image.entry(i))
            .is_some_and(|e| e.is_file()))
    }
}
