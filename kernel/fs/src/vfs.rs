//! VFS mount table and path routing.
//!
//! The VFS keeps a fixed table of mounts keyed by absolute path. Every
//! path-based call picks the mount with the longest matching prefix, strips
//! that prefix and forwards the remainder to the backend. Open files and
//! directories are tracked in fixed pools that wrap the backend's own
//! handles.

use ojjy_core::{kdebug, kinfo, kwarn};

use crate::path::{self, PathBuf};
use crate::{
    DirEntry, FileSystem, FsError, FsHandle, OpenFlags, Stat, VfsFileType, Whence, claim_slot,
    release_slot, slot_ref,
};

/// Mount table capacity.
pub const MAX_MOUNTS: usize = 8;

/// Open file handles across all mounts.
pub const MAX_OPEN_FILES: usize = 32;

/// Open directory handles across all mounts.
pub const MAX_OPEN_DIRS: usize = 16;

/// An open file, as handed out by [`Vfs::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(usize);

/// An open directory, as handed out by [`Vfs::opendir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirHandle(usize);

#[derive(Clone, Copy)]
struct Mount<'a> {
    path: PathBuf,
    fs: &'a dyn FileSystem,
    context: usize,
    readonly: bool,
}

#[derive(Clone, Copy)]
struct OpenFile {
    mount: usize,
    handle: FsHandle,
    flags: OpenFlags,
}

#[derive(Clone, Copy)]
struct OpenDir {
    mount: usize,
    handle: FsHandle,
}

/// Information about one mount.
#[derive(Debug, Clone, Copy)]
pub struct MountInfo<'m> {
    /// Mount point.
    pub path: &'m str,
    /// Backend name.
    pub fs_name: &'static str,
    /// Whether writes are refused.
    pub readonly: bool,
}

/// The virtual filesystem.
pub struct Vfs<'a> {
    mounts: [Option<Mount<'a>>; MAX_MOUNTS],
    files: [Option<OpenFile>; MAX_OPEN_FILES],
    dirs: [Option<OpenDir>; MAX_OPEN_DIRS],
}

impl<'a> Vfs<'a> {
    /// An empty VFS with no mounts.
    pub const fn new() -> Self {
        Self {
            mounts: [None; MAX_MOUNTS],
            files: [None; MAX_OPEN_FILES],
            dirs: [None; MAX_OPEN_DIRS],
        }
    }

    /// Mounts `fs` at `path`. `context` is stored with the mount and handed
    /// back by [`mount_context`](Self::mount_context).
    ///
    /// Mount points are kept in [`normalized`](path::normalize) form, and
    /// the lookups by mount point normalize their argument the same way.
    ///
    /// # Errors
    ///
    /// [`FsError::InvalidArgument`] for a relative path,
    /// [`FsError::AlreadyMounted`] if `path` is already a mount point,
    /// [`FsError::MountTableFull`] past [`MAX_MOUNTS`].
    pub fn mount(
        &mut self,
        path: &str,
        fs: &'a dyn FileSystem,
        context: usize,
        readonly: bool,
    ) -> Result<(), FsError> {
        if !path::is_absolute(path) {
            return Err(FsError::InvalidArgument);
        }
        let normalized = path::normalize(path)?;
        let path = normalized.as_str();
        if self.find_exact(path).is_some() {
            return Err(FsError::AlreadyMounted);
        }
        let slot = self
            .mounts
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::MountTableFull)?;
        self.mounts[slot] = Some(Mount {
            path: normalized,
            fs,
            context,
            readonly,
        });
        kinfo!(
            "VFS: mounted {} at {} ({})",
            fs.name(),
            path,
            if readonly { "ro" } else { "rw" }
        );
        Ok(())
    }

    /// Removes the mount at exactly `path`.
    ///
    /// # Errors
    ///
    /// [`FsError::NotMounted`], or [`FsError::Busy`] while files or
    /// directories are open on it.
    pub fn unmount(&mut self, path: &str) -> Result<(), FsError> {
        let normalized = path::normalize(path)?;
        let slot = self
            .find_exact(normalized.as_str())
            .ok_or(FsError::NotMounted)?;
        let busy = self.files.iter().flatten().any(|f| f.mount == slot)
            || self.dirs.iter().flatten().any(|d| d.mount == slot);
        if busy {
            kwarn!("VFS: {} is busy", path);
            return Err(FsError::Busy);
        }
        self.mounts[slot] = None;
        kinfo!("VFS: unmounted {}", path);
        Ok(())
    }

    /// Number of active mounts.
    pub fn mount_count(&self) -> usize {
        self.mounts.iter().flatten().count()
    }

    /// Active mounts in table order.
    pub fn mounts(&self) -> impl Iterator<Item = MountInfo<'_>> {
        self.mounts.iter().flatten().map(|m| MountInfo {
            path: m.path.as_str(),
            fs_name: m.fs.name(),
            readonly: m.readonly,
        })
    }

    /// The context stored with the mount at exactly `path`.
    pub fn mount_context(&self, path: &str) -> Option<usize> {
        let slot = self.find_exact(path::normalize(path).ok()?.as_str())?;
        self.mounts[slot].map(|m| m.context)
    }

    fn find_exact(&self, path: &str) -> Option<usize> {
        self.mounts
            .iter()
            .position(|m| m.is_some_and(|m| m.path.as_str() == path))
    }

    fn mount_at(&self, slot: usize) -> Result<&Mount<'a>, FsError> {
        self.mounts
            .get(slot)
            .and_then(Option::as_ref)
            .ok_or(FsError::NotMounted)
    }

    /// Picks the owning mount for `path` and the path the backend sees.
    fn resolve<'p>(&self, path: &'p str) -> Result<(usize, &'p str), FsError> {
        if !path::is_absolute(path) {
            return Err(FsError::InvalidArgument);
        }
        let candidates = self
            .mounts
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (i, m.path.as_str())));
        let slot = path::longest_prefix_match(path, candidates).ok_or(FsError::NotFound)?;
        let mount = self.mount_at(slot)?;
        Ok((slot, path::strip_mount_prefix(path, mount.path.as_str())))
    }

    /// Opens a file.
    ///
    /// # Errors
    ///
    /// [`FsError::ReadOnly`] for `WRITE`, `CREATE` or `TRUNCATE` on a
    /// read-only mount (the backend is not consulted),
    /// [`FsError::HandlesExhausted`] past [`MAX_OPEN_FILES`], or the
    /// backend's error.
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        let (slot, rel) = self.resolve(path)?;
        let mount = *self.mount_at(slot)?;
        if mount.readonly && flags.is_mutating() {
            kdebug!("VFS: refused {:?} on read-only {}", flags, path);
            return Err(FsError::ReadOnly);
        }
        if self.files.iter().all(Option::is_some) {
            return Err(FsError::HandlesExhausted);
        }
        let handle = mount.fs.open(rel, flags)?;
        let file = OpenFile {
            mount: slot,
            handle,
            flags,
        };
        match claim_slot(&mut self.files, file) {
            Ok(index) => Ok(FileHandle(index)),
            Err(e) => {
                let _ = mount.fs.close(handle);
                Err(e)
            }
        }
    }

    /// Closes a file.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] for a handle that is not open.
    pub fn close(&mut self, file: FileHandle) -> Result<(), FsError> {
        let open = release_slot(&mut self.files, file.0)?;
        self.mount_at(open.mount)?.fs.close(open.handle)
    }

    /// Reads from the current position.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] or the backend's error.
    pub fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let open = *slot_ref(&self.files, file.0)?;
        self.mount_at(open.mount)?.fs.read(open.handle, buf)
    }

    /// Writes at the current position.
    ///
    /// # Errors
    ///
    /// [`FsError::ReadOnly`] on a read-only mount,
    /// [`FsError::PermissionDenied`] if the file was not opened with
    /// `WRITE`, [`FsError::BadFd`], or the backend's error.
    pub fn write(&self, file: FileHandle, buf: &[u8]) -> Result<usize, FsError> {
        let open = *slot_ref(&self.files, file.0)?;
        let mount = self.mount_at(open.mount)?;
        if mount.readonly {
            return Err(FsError::ReadOnly);
        }
        if !open.flags.contains(OpenFlags::WRITE) {
            return Err(FsError::PermissionDenied);
        }
        mount.fs.write(open.handle, buf)
    }

    /// Moves the file position. Returns the new position.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] or the backend's error.
    pub fn seek(&self, file: FileHandle, offset: i64, whence: Whence) -> Result<u64, FsError> {
        let open = *slot_ref(&self.files, file.0)?;
        self.mount_at(open.mount)?.fs.seek(open.handle, offset, whence)
    }

    /// Current file position.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] or the backend's error.
    pub fn tell(&self, file: FileHandle) -> Result<u64, FsError> {
        let open = slot_ref(&self.files, file.0)?;
        self.mount_at(open.mount)?.fs.tell(open.handle)
    }

    /// Metadata for `path`.
    ///
    /// # Errors
    ///
    /// Routing errors or the backend's error.
    pub fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let (slot, rel) = self.resolve(path)?;
        self.mount_at(slot)?.fs.stat(rel)
    }

    /// Whether `path` exists.
    ///
    /// Uses the backend's fast path when it has one and `stat` otherwise.
    ///
    /// # Errors
    ///
    /// Backend errors other than [`FsError::NotFound`].
    pub fn exists(&self, path: &str) -> Result<bool, FsError> {
        self.predicate(path, |fs, rel| fs.exists(rel), |_| true)
    }

    /// Whether `path` is a directory or bundle.
    ///
    /// # Errors
    ///
    /// As for [`exists`](Self::exists).
    pub fn isdir(&self, path: &str) -> Result<bool, FsError> {
        self.predicate(path, |fs, rel| fs.isdir(rel), |st| st.file_type.is_dir())
    }

    /// Whether `path` is a regular file.
    ///
    /// # Errors
    ///
    /// As for [`exists`](Self::exists).
    pub fn isfile(&self, path: &str) -> Result<bool, FsError> {
        self.predicate(
            path,
            |fs, rel| fs.isfile(rel),
            |st| st.file_type == VfsFileType::File,
        )
    }

    fn predicate(
        &self,
        path: &str,
        fast: impl FnOnce(&dyn FileSystem, &str) -> Result<bool, FsError>,
        from_stat: impl FnOnce(&Stat) -> bool,
    ) -> Result<bool, FsError> {
        let (slot, rel) = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(FsError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        let fs = self.mount_at(slot)?.fs;
        match fast(fs, rel) {
            Err(FsError::NotSupported) => {}
            other => return other,
        }
        match fs.stat(rel) {
            Ok(st) => Ok(from_stat(&st)),
            Err(FsError::NotFound | FsError::NotADirectory) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Opens a directory for listing.
    ///
    /// # Errors
    ///
    /// [`FsError::HandlesExhausted`] past [`MAX_OPEN_DIRS`], routing errors
    /// or the backend's error.
    pub fn opendir(&mut self, path: &str) -> Result<DirHandle, FsError> {
        let (slot, rel) = self.resolve(path)?;
        let fs = self.mount_at(slot)?.fs;
        if self.dirs.iter().all(Option::is_some) {
            return Err(FsError::HandlesExhausted);
        }
        let handle = fs.opendir(rel)?;
        match claim_slot(&mut self.dirs, OpenDir { mount: slot, handle }) {
            Ok(index) => Ok(DirHandle(index)),
            Err(e) => {
                let _ = fs.closedir(handle);
                Err(e)
            }
        }
    }

    /// Next entry, or `None` once the listing is exhausted.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] or the backend's error.
    pub fn readdir(&self, dir: DirHandle) -> Result<Option<DirEntry>, FsError> {
        let open = slot_ref(&self.dirs, dir.0)?;
        self.mount_at(open.mount)?.fs.readdir(open.handle)
    }

    /// Restarts a listing.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] or the backend's error.
    pub fn rewinddir(&self, dir: DirHandle) -> Result<(), FsError> {
        let open = slot_ref(&self.dirs, dir.0)?;
        self.mount_at(open.mount)?.fs.rewinddir(open.handle)
    }

    /// Closes a directory.
    ///
    /// # Errors
    ///
    /// [`FsError::BadFd`] for a handle that is not open.
    pub fn closedir(&mut self, dir: DirHandle) -> Result<(), FsError> {
        let open = release_slot(&mut self.dirs, dir.0)?;
        self.mount_at(open.mount)?.fs.closedir(open.handle)
    }

    fn resolve_writable<'p>(&self, path: &'p str) -> Result<(&'a dyn FileSystem, &'p str), FsError> {
        let (slot, rel) = self.resolve(path)?;
        let mount = self.mount_at(slot)?;
        if mount.readonly {
            return Err(FsError::ReadOnly);
        }
        Ok((mount.fs, rel))
    }

    /// Creates a directory.
    ///
    /// # Errors
    ///
    /// [`FsError::ReadOnly`] on a read-only mount, or the backend's error.
    pub fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let (fs, rel) = self.resolve_writable(path)?;
        fs.mkdir(rel)
    }

    /// Removes a file or an empty directory.
    ///
    /// # Errors
    ///
    /// [`FsError::ReadOnly`] on a read-only mount, or the backend's error.
    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        let (fs, rel) = self.resolve_writable(path)?;
        fs.unlink(rel)
    }

    /// Renames within a single mount.
    ///
    /// # Errors
    ///
    /// [`FsError::CrossMount`] when `from` and `to` resolve to different
    /// mounts, [`FsError::ReadOnly`] on a read-only mount, or the backend's
    /// error.
    pub fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let (from_slot, _) = self.resolve(from)?;
        let (to_slot, to_rel) = self.resolve(to)?;
        if from_slot != to_slot {
            return Err(FsError::CrossMount);
        }
        let (fs, from_rel) = self.resolve_writable(from)?;
        fs.rename(from_rel, to_rel)
    }

    /// Reads the whole file at `path` into `buf`, stopping when the buffer
    /// fills. Returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// Any error from opening or reading. The file is closed either way.
    pub fn read_file(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = self.open(path, OpenFlags::READ)?;
        let mut total = 0;
        let result = loop {
            if total == buf.len() {
                break Ok(total);
            }
            match self.read(file, &mut buf[total..]) {
                Ok(0) => break Ok(total),
                Ok(n) => total += n,
                Err(e) => break Err(e),
            }
        };
        let closed = self.close(file);
        let total = result?;
        closed.map(|()| total)
    }

    /// Number of open files.
    pub fn open_files(&self) -> usize {
        self.files.iter().flatten().count()
    }

    /// Number of open directories.
    pub fn open_dirs(&self) -> usize {
        self.dirs.iter().flatten().count()
    }
}

impl Default for Vfs<'_> {
    fn default() -> Self {
        Self::new()
    }
}
