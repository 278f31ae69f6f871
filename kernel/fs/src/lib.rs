//! Filesystem layer: the VFS mount router, the read-only packed filesystem
//! (OJFS) and the in-memory read-write filesystem (RAMFS).
//!
//! Backends implement [`FileSystem`], a capability table in which every
//! operation is optional. The [`vfs::Vfs`] router resolves absolute paths to
//! a mount, strips the mount prefix and forwards the call to the backend.

#![cfg_attr(not(test), no_std)]

use core::fmt;

pub mod ojfs;
pub mod path;
pub mod ramfs;
pub mod vfs;

/// Longest file name component, in bytes.
pub const NAME_MAX: usize = 255;

/// Filesystem errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file or directory.
    NotFound,
    /// The target name is already taken.
    AlreadyExists,
    /// A directory was required.
    NotADirectory,
    /// A regular file was required.
    IsADirectory,
    /// The directory still has children.
    NotEmpty,
    /// A malformed path, flag combination or seek target.
    InvalidArgument,
    /// A path component exceeds [`NAME_MAX`] or a path exceeds its buffer.
    NameTooLong,
    /// The handle is not open.
    BadFd,
    /// The handle was not opened for this kind of access.
    PermissionDenied,
    /// The filesystem or mount is read-only.
    ReadOnly,
    /// Source and destination are on different mounts.
    CrossMount,
    /// The backend does not implement this operation.
    NotSupported,
    /// Every handle slot is in use.
    HandlesExhausted,
    /// Every mount slot is in use.
    MountTableFull,
    /// A filesystem is already mounted at this exact path.
    AlreadyMounted,
    /// Nothing is mounted at this path.
    NotMounted,
    /// Handles are still open on the mount.
    Busy,
    /// The data arena is exhausted.
    NoSpace,
    /// The node table is exhausted.
    NoFreeNodes,
    /// On-disk structures are inconsistent.
    Corrupt,
    /// The backing store failed.
    IoError,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "no such file or directory",
            Self::AlreadyExists => "file exists",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::NotEmpty => "directory not empty",
            Self::InvalidArgument => "invalid argument",
            Self::NameTooLong => "name too long",
            Self::BadFd => "bad file handle",
            Self::PermissionDenied => "permission denied",
            Self::ReadOnly => "read-only filesystem",
            Self::CrossMount => "cross-mount operation",
            Self::NotSupported => "operation not supported",
            Self::HandlesExhausted => "too many open handles",
            Self::MountTableFull => "mount table full",
            Self::AlreadyMounted => "already mounted",
            Self::NotMounted => "not mounted",
            Self::Busy => "resource busy",
            Self::NoSpace => "no space left",
            Self::NoFreeNodes => "no free nodes",
            Self::Corrupt => "filesystem corrupt",
            Self::IoError => "I/O error",
        })
    }
}

/// The type of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsFileType {
    /// Unused slot or unrecognized entry.
    Unknown,
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Application bundle: a directory whose name ends in `.app`.
    Bundle,
    /// Symbolic link.
    Symlink,
}

impl VfsFileType {
    /// Directories and bundles.
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory | Self::Bundle)
    }
}

bitflags::bitflags! {
    /// Flags passed to `open`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for reading.
        const READ = 1 << 0;
        /// Open for writing.
        const WRITE = 1 << 1;
        /// Create the file if it does not exist.
        const CREATE = 1 << 2;
        /// Discard existing contents.
        const TRUNCATE = 1 << 3;
        /// Start positioned at end of file.
        const APPEND = 1 << 4;
    }
}

impl OpenFlags {
    /// Flags that modify the filesystem and are refused on read-only mounts.
    pub const MUTATING: Self = Self::WRITE.union(Self::CREATE).union(Self::TRUNCATE);

    /// Whether any mutating flag is set.
    pub const fn is_mutating(self) -> bool {
        self.intersects(Self::MUTATING)
    }
}

bitflags::bitflags! {
    /// Permission bits stored with every file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// Readable.
        const READ = 1 << 0;
        /// Writable.
        const WRITE = 1 << 1;
        /// Executable.
        const EXECUTE = 1 << 2;
        /// Owned by the system image.
        const SYSTEM = 1 << 7;
    }
}

impl Permissions {
    /// `READ`.
    pub const fn read_only() -> Self {
        Self::READ
    }

    /// `READ | WRITE`.
    pub const fn read_write() -> Self {
        Self::READ.union(Self::WRITE)
    }
}

/// Origin for `seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the file.
    Set,
    /// From the current position.
    Cur,
    /// From the end of the file.
    End,
}

/// Computes a seek target and checks that it lies within `[0, size]`.
///
/// # Errors
///
/// [`FsError::InvalidArgument`] for a target before the start or past the end.
pub fn seek_target(current: u64, size: u64, offset: i64, whence: Whence) -> Result<u64, FsError> {
    let base = match whence {
        Whence::Set => 0,
        Whence::Cur => current,
        Whence::End => size,
    };
    let target = i128::from(base) + i128::from(offset);
    match u64::try_from(target) {
        Ok(pos) if pos <= size => Ok(pos),
        _ => Err(FsError::InvalidArgument),
    }
}

/// File metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Object type.
    pub file_type: VfsFileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Permission bits.
    pub permissions: Permissions,
    /// Owner.
    pub uid: u32,
    /// Creation stamp.
    pub created: u64,
    /// Last modification stamp.
    pub modified: u64,
    /// Backend-specific object number.
    pub inode: u64,
}

/// A file name component stored inline.
#[derive(Clone, Copy)]
pub struct FileName {
    len: u8,
    bytes: [u8; NAME_MAX],
}

impl FileName {
    /// The empty name (used by root directories).
    pub const EMPTY: Self = Self {
        len: 0,
        bytes: [0; NAME_MAX],
    };

    /// Copies `name`.
    ///
    /// # Errors
    ///
    /// [`FsError::NameTooLong`] past [`NAME_MAX`] bytes.
    pub fn new(name: &str) -> Result<Self, FsError> {
        let len = u8::try_from(name.len()).map_err(|_| FsError::NameTooLong)?;
        let mut bytes = [0; NAME_MAX];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self { len, bytes })
    }

    /// The name.
    pub fn as_str(&self) -> &str {
        // Only ever filled from a `&str`.
        core::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
    }

    /// Whether the name is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for FileName {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for FileName {}

impl PartialEq<str> for FileName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for FileName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One directory listing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name.
    pub name: FileName,
    /// Entry type.
    pub file_type: VfsFileType,
    /// Size in bytes.
    pub size: u64,
    /// Backend-specific object number.
    pub inode: u64,
}

/// A backend's own open-file or open-directory handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsHandle(pub u32);

impl FsHandle {
    pub(crate) const fn from_slot(slot: usize) -> Self {
        Self(slot as u32)
    }

    pub(crate) const fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Stores `value` in the first free slot of a handle pool.
pub(crate) fn claim_slot<T>(pool: &mut [Option<T>], value: T) -> Result<usize, FsError> {
    let slot = pool
        .iter()
        .position(Option::is_none)
        .ok_or(FsError::HandlesExhausted)?;
    pool[slot] = Some(value);
    Ok(slot)
}

pub(crate) fn slot_ref<T>(pool: &[Option<T>], slot: usize) -> Result<&T, FsError> {
    pool.get(slot).and_then(Option::as_ref).ok_or(FsError::BadFd)
}

pub(crate) fn slot_mut<T>(pool: &mut [Option<T>], slot: usize) -> Result<&mut T, FsError> {
    pool.get_mut(slot).and_then(Option::as_mut).ok_or(FsError::BadFd)
}

pub(crate) fn release_slot<T>(pool: &mut [Option<T>], slot: usize) -> Result<T, FsError> {
    pool.get_mut(slot).and_then(Option::take).ok_or(FsError::BadFd)
}

/// The capability table a filesystem backend exposes to the VFS.
///
/// Paths are relative to the mount point and always start with `/`. Every
/// method is optional and defaults to [`FsError::NotSupported`]; the VFS
/// surfaces that failure instead of silently ignoring it. The `exists`,
/// `isdir` and `isfile` predicates are fast paths: when absent, the VFS
/// answers them through `stat`.
pub trait FileSystem: Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Opens a file.
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FsHandle, FsError> {
        let _ = (path, flags);
        Err(FsError::NotSupported)
    }

    /// Releases a file handle.
    fn close(&self, handle: FsHandle) -> Result<(), FsError> {
        let _ = handle;
        Err(FsError::NotSupported)
    }

    /// Reads at the handle's position and advances it.
    fn read(&self, handle: FsHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let _ = (handle, buf);
        Err(FsError::NotSupported)
    }

    /// Writes at the handle's position and advances it.
    fn write(&self, handle: FsHandle, buf: &[u8]) -> Result<usize, FsError> {
        let _ = (handle, buf);
        Err(FsError::NotSupported)
    }

    /// Moves the handle's position. Returns the new position.
    fn seek(&self, handle: FsHandle, offset: i64, whence: Whence) -> Result<u64, FsError> {
        let _ = (handle, offset, whence);
        Err(FsError::NotSupported)
    }

    /// Current position of the handle.
    fn tell(&self, handle: FsHandle) -> Result<u64, FsError> {
        let _ = handle;
        Err(FsError::NotSupported)
    }

    /// Metadata for a path.
    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    /// Opens a directory for listing.
    fn opendir(&self, path: &str) -> Result<FsHandle, FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    /// Releases a directory handle.
    fn closedir(&self, handle: FsHandle) -> Result<(), FsError> {
        let _ = handle;
        Err(FsError::NotSupported)
    }

    /// Next entry, or `None` at the end of the listing.
    fn readdir(&self, handle: FsHandle) -> Result<Option<DirEntry>, FsError> {
        let _ = handle;
        Err(FsError::NotSupported)
    }

    /// Restarts the listing.
    fn rewinddir(&self, handle: FsHandle) -> Result<(), FsError> {
        let _ = handle;
        Err(FsError::NotSupported)
    }

    /// Creates a directory.
    fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    /// Removes a file or an empty directory.
    fn unlink(&self, path: &str) -> Result<(), FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    /// Moves an object within this filesystem.
    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let _ = (from, to);
        Err(FsError::NotSupported)
    }

    /// Whether `path` names anything.
    fn exists(&self, path: &str) -> Result<bool, FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    /// Whether `path` names a directory or bundle.
    fn isdir(&self, path: &str) -> Result<bool, FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }

    /// Whether `path` names a regular file.
    fn isfile(&self, path: &str) -> Result<bool, FsError> {
        let _ = path;
        Err(FsError::NotSupported)
    }
}
