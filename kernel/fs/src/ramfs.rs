//! In-memory read-write filesystem.
//!
//! Nodes live in a fixed table and file contents in a caller-provided byte
//! arena handed out by a bump allocator. Neither is ever reclaimed: unlinking
//! only marks the node unused, and growing a file abandons its old region.
//! Contents are lost when the arena goes away.

use ojjy_core::sync::SpinLock;
use ojjy_core::{kdebug, kinfo};
use planck_noalloc::vec::ArrayVec;

use crate::path;
use crate::{
    DirEntry, FileName, FileSystem, FsError, FsHandle, OpenFlags, Permissions, Stat, VfsFileType,
    Whence, claim_slot, release_slot, seek_target, slot_mut, slot_ref,
};

/// Node table capacity, root included.
pub const RAMFS_MAX_NODES: usize = 256;

/// Open file handles.
pub const RAMFS_MAX_FILES: usize = 64;

/// Open directory handles.
pub const RAMFS_MAX_DIRS: usize = 32;

/// Arena size used by the kernel's user filesystem.
pub const RAMFS_DATA_SIZE: usize = 256 * 1024;

/// Initial file capacity and minimum growth increment.
pub const RAMFS_GROW_STEP: usize = 4096;

const ROOT: usize = 0;
const OWNER_UID: u32 = 1000;

#[derive(Clone, Copy)]
struct Node {
    name: FileName,
    parent: Option<usize>,
    file_type: VfsFileType,
    permissions: Permissions,
    size: usize,
    capacity: usize,
    data: usize,
}

impl Node {
    const fn new(name: FileName, parent: Option<usize>, file_type: VfsFileType) -> Self {
        Self {
            name,
            parent,
            file_type,
            permissions: Permissions::read_write(),
            size: 0,
            capacity: 0,
            data: 0,
        }
    }

    fn is_live(&self) -> bool {
        self.file_type != VfsFileType::Unknown
    }
}

#[derive(Clone, Copy)]
struct OpenFile {
    node: usize,
    position: usize,
}

#[derive(Clone, Copy)]
struct OpenDir {
    dir: usize,
    cursor: usize,
}

struct Inner<'a> {
    pool: &'a mut [u8],
    pool_used: usize,
    nodes: ArrayVec<Node, RAMFS_MAX_NODES>,
    files: [Option<OpenFile>; RAMFS_MAX_FILES],
    dirs: [Option<OpenDir>; RAMFS_MAX_DIRS],
}

impl Inner<'_> {
    fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.is_live() && n.parent == Some(parent) && n.name == name)
    }

    fn has_children(&self, dir: usize) -> bool {
        self.nodes.iter().any(|n| n.is_live() && n.parent == Some(dir))
    }

    fn lookup(&self, path: &str) -> Result<usize, FsError> {
        let mut current = ROOT;
        for name in path::components(path) {
            if !self.nodes[current].file_type.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = self.find_child(current, name).ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    fn alloc_data(&mut self, size: usize) -> Result<usize, FsError> {
        let end = self
            .pool_used
            .checked_add(size)
            .filter(|&end| end <= self.pool.len())
            .ok_or(FsError::NoSpace)?;
        let offset = self.pool_used;
        self.pool_used = end;
        Ok(offset)
    }

    fn push_node(&mut self, node: Node) -> Result<usize, FsError> {
        let index = self.nodes.len();
        self.nodes.try_push(node).map_err(|_| FsError::NoFreeNodes)?;
        Ok(index)
    }

    /// Walks `path` without changing anything. Returns the deepest existing
    /// directory and how many components below it are still missing.
    fn missing_dirs(&self, path: &str) -> Result<(usize, usize), FsError> {
        let mut current = ROOT;
        let mut missing = 0;
        for name in path::components(path) {
            if missing == 0 {
                match self.find_child(current, name) {
                    Some(index) if self.nodes[index].file_type.is_dir() => {
                        current = index;
                        continue;
                    }
                    Some(_) => return Err(FsError::NotADirectory),
                    None => {}
                }
            }
            FileName::new(name)?;
            missing += 1;
        }
        Ok((current, missing))
    }

    /// Walks `path`, creating every missing directory.
    fn ensure_dir(&mut self, path: &str) -> Result<usize, FsError> {
        let mut current = ROOT;
        for name in path::components(path) {
            current = match self.find_child(current, name) {
                Some(index) if self.nodes[index].file_type.is_dir() => index,
                Some(_) => return Err(FsError::NotADirectory),
                None => {
                    let name = FileName::new(name)?;
                    self.push_node(Node::new(name, Some(current), VfsFileType::Directory))?
                }
            };
        }
        Ok(current)
    }

    /// Adds a node and any missing parents, or nothing at all on failure.
    /// Files start without a data region.
    fn create(&mut self, path: &str, file_type: VfsFileType) -> Result<usize, FsError> {
        let name = path::basename(path);
        if name.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        let name = FileName::new(name)?;
        let dir = path::dirname(path);
        let (deepest, missing) = self.missing_dirs(dir)?;
        if missing == 0 && self.find_child(deepest, name.as_str()).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if self.nodes.len() + missing + 1 > RAMFS_MAX_NODES {
            return Err(FsError::NoFreeNodes);
        }
        let parent = self.ensure_dir(dir)?;
        self.push_node(Node::new(name, Some(parent), file_type))
    }

    fn has_room(&self, size: usize) -> bool {
        self.pool_used
            .checked_add(size)
            .is_some_and(|end| end <= self.pool.len())
    }

    /// Moves the node to a bigger region when `needed` exceeds its capacity.
    fn reserve(&mut self, index: usize, needed: usize) -> Result<(), FsError> {
        let node = self.nodes[index];
        if needed <= node.capacity {
            return Ok(());
        }
        let capacity = needed.max(node.capacity + RAMFS_GROW_STEP);
        let data = self.alloc_data(capacity)?;
        self.pool.copy_within(node.data..node.data + node.size, data);
        let node = &mut self.nodes[index];
        node.data = data;
        node.capacity = capacity;
        Ok(())
    }

    /// `true` if `ancestor` is `index` or lies on its parent chain.
    fn is_within(&self, index: usize, ancestor: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }
}

/// A read-write filesystem held entirely in memory.
pub struct RamFs<'a> {
    inner: SpinLock<Inner<'a>>,
}

impl<'a> RamFs<'a> {
    /// Creates an empty filesystem whose file contents live in `pool`.
    pub fn new(pool: &'a mut [u8]) -> Self {
        let mut nodes = ArrayVec::new();
        // A fresh table always has room for the root.
        let _ = nodes.try_push(Node::new(FileName::EMPTY, None, VfsFileType::Directory));
        kinfo!(
            "RAMFS: initialized ({} nodes, {} KiB pool)",
            RAMFS_MAX_NODES,
            pool.len() / 1024
        );
        Self {
            inner: SpinLock::new(Inner {
                pool,
                pool_used: 0,
                nodes,
                files: [None; RAMFS_MAX_FILES],
                dirs: [None; RAMFS_MAX_DIRS],
            }),
        }
    }

    /// Creates a directory, along with any missing parents.
    ///
    /// # Errors
    ///
    /// [`FsError::AlreadyExists`] if the path exists, [`FsError::NoFreeNodes`]
    /// when the node table is full.
    pub fn create_dir(&self, path: &str) -> Result<(), FsError> {
        self.mkdir(path)
    }

    /// Creates an empty file, along with any missing parents. Its data
    /// region is allocated when it is first opened.
    ///
    /// # Errors
    ///
    /// [`FsError::AlreadyExists`] if the path exists, [`FsError::NoFreeNodes`]
    /// when the node table cannot hold the file and its missing parents.
    pub fn create_file(&self, path: &str) -> Result<(), FsError> {
        let mut fs = self.inner.lock();
        if fs.lookup(path).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        fs.create(path, VfsFileType::File)?;
        Ok(())
    }

    /// Node slots consumed so far, including unlinked ones.
    pub fn nodes_used(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Arena bytes handed out so far, including abandoned regions.
    pub fn bytes_used(&self) -> usize {
        self.inner.lock().pool_used
    }
}

impl FileSystem for RamFs<'_> {
    fn name(&self) -> &'static str {
        "ramfs"
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FsHandle, FsError> {
        let mut fs = self.inner.lock();
        if fs.files.iter().all(Option::is_some) {
            return Err(FsError::HandlesExhausted);
        }
        let index = match fs.lookup(path) {
            Ok(index) => index,
            Err(FsError::NotFound) if flags.contains(OpenFlags::CREATE) => {
                // A failed open must not leave the node behind.
                if !fs.has_room(RAMFS_GROW_STEP) {
                    return Err(FsError::NoSpace);
                }
                fs.create(path, VfsFileType::File)?
            }
            Err(e) => return Err(e),
        };
        if fs.nodes[index].file_type != VfsFileType::File {
            return Err(FsError::IsADirectory);
        }
        if fs.nodes[index].capacity == 0 {
            let data = fs.alloc_data(RAMFS_GROW_STEP)?;
            let node = &mut fs.nodes[index];
            node.data = data;
            node.capacity = RAMFS_GROW_STEP;
        }
        if flags.contains(OpenFlags::TRUNCATE) {
            fs.nodes[index].size = 0;
        }
        let position = if flags.contains(OpenFlags::APPEND) {
            fs.nodes[index].size
        } else {
            0
        };
        let slot = claim_slot(&mut fs.files, OpenFile { node: index, position })?;
        Ok(FsHandle::from_slot(slot))
    }

    fn close(&self, handle: FsHandle) -> Result<(), FsError> {
        release_slot(&mut self.inner.lock().files, handle.slot()).map(drop)
    }

    fn read(&self, handle: FsHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut guard = self.inner.lock();
        let fs = &mut *guard;
        let file = slot_mut(&mut fs.files, handle.slot())?;
        let node = &fs.nodes[file.node];
        if file.position >= node.size {
            return Ok(0);
        }
        let n = buf.len().min(node.size - file.position);
        let start = node.data + file.position;
        buf[..n].copy_from_slice(&fs.pool[start..start + n]);
        file.position += n;
        Ok(n)
    }

    fn write(&self, handle: FsHandle, buf: &[u8]) -> Result<usize, FsError> {
        let mut guard = self.inner.lock();
        let fs = &mut *guard;
        let file = *slot_ref(&fs.files, handle.slot())?;
        if !fs.nodes[file.node].is_live() {
            return Err(FsError::NotFound);
        }
        let end = file.position + buf.len();
        fs.reserve(file.node, end)?;

        let node = &mut fs.nodes[file.node];
        let start = node.data + file.position;
        fs.pool[start..start + buf.len()].copy_from_slice(buf);
        node.size = node.size.max(end);
        slot_mut(&mut fs.files, handle.slot())?.position = end;
        Ok(buf.len())
    }

    fn seek(&self, handle: FsHandle, offset: i64, whence: Whence) -> Result<u64, FsError> {
        let mut guard = self.inner.lock();
        let fs = &mut *guard;
        let file = slot_mut(&mut fs.files, handle.slot())?;
        let size = fs.nodes[file.node].size as u64;
        let target = seek_target(file.position as u64, size, offset, whence)?;
        file.position = target as usize;
        Ok(target)
    }

    fn tell(&self, handle: FsHandle) -> Result<u64, FsError> {
        let fs = self.inner.lock();
        Ok(slot_ref(&fs.files, handle.slot())?.position as u64)
    }

    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let fs = self.inner.lock();
        let index = fs.lookup(path)?;
        let node = &fs.nodes[index];
        Ok(Stat {
            file_type: node.file_type,
            size: node.size as u64,
            permissions: node.permissions,
            uid: OWNER_UID,
            created: 0,
            modified: 0,
            inode: index as u64,
        })
    }

    fn opendir(&self, path: &str) -> Result<FsHandle, FsError> {
        let mut fs = self.inner.lock();
        let dir = fs.lookup(path)?;
        if !fs.nodes[dir].file_type.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let slot = claim_slot(&mut fs.dirs, OpenDir { dir, cursor: 0 })?;
        Ok(FsHandle::from_slot(slot))
    }

    fn closedir(&self, handle: FsHandle) -> Result<(), FsError> {
        release_slot(&mut self.inner.lock().dirs, handle.slot()).map(drop)
    }

    fn readdir(&self, handle: FsHandle) -> Result<Option<DirEntry>, FsError> {
        let mut guard = self.inner.lock();
        let fs = &mut *guard;
        let dir = slot_mut(&mut fs.dirs, handle.slot())?;
        while let Some(node) = fs.nodes.as_slice().get(dir.cursor) {
            let inode = dir.cursor;
            dir.cursor += 1;
            if node.is_live() && node.parent == Some(dir.dir) {
                return Ok(Some(DirEntry {
                    name: node.name,
                    file_type: node.file_type,
                    size: node.size as u64,
                    inode: inode as u64,
                }));
            }
        }
        Ok(None)
    }

    fn rewinddir(&self, handle: FsHandle) -> Result<(), FsError> {
        slot_mut(&mut self.inner.lock().dirs, handle.slot())?.cursor = 0;
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let mut fs = self.inner.lock();
        if fs.lookup(path).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        fs.create(path, VfsFileType::Directory)?;
        Ok(())
    }

    fn unlink(&self, path: &str) -> Result<(), FsError> {
        let mut fs = self.inner.lock();
        let index = fs.lookup(path)?;
        if index == ROOT {
            return Err(FsError::PermissionDenied);
        }
        if fs.nodes[index].file_type.is_dir() && fs.has_children(index) {
            return Err(FsError::NotEmpty);
        }
        let node = &mut fs.nodes[index];
        node.file_type = VfsFileType::Unknown;
        node.name = FileName::EMPTY;
        node.size = 0;
        node.capacity = 0;
        node.data = 0;
        kdebug!("RAMFS: unlinked {} (slot {} retired)", path, index);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut fs = self.inner.lock();
        let index = fs.lookup(from)?;
        if index == ROOT {
            return Err(FsError::PermissionDenied);
        }
        let name = path::basename(to);
        if name.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        let name = FileName::new(name)?;
        let parent = fs.lookup(path::dirname(to))?;
        if !fs.nodes[parent].file_type.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if fs.find_child(parent, name.as_str()).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if fs.is_within(parent, index) {
            return Err(FsError::InvalidArgument);
        }
        let node = &mut fs.nodes[index];
        node.parent = Some(parent);
        node.name = name;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, FsError> {
        match self.inner.lock().lookup(path) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound | FsError::NotADirectory) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn isdir(&self, path: &str) -> Result<bool, FsError> {
        let fs = self.inner.lock();
        Ok(fs.lookup(path).is_ok_and(|i| fs.nodes[i].file_type.is_dir()))
    }

    fn isfile(&self, path: &str) -> Result<bool, FsError> {
        let fs = self.inner.lock();
        Ok(fs
            .lookup(path)
            .is_ok_and(|i| fs.nodes[i].file_type == VfsFileType::File))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(kib: usize) -> Vec<u8> {
        vec![0; kib * 1024]
    }

    fn names(fs: &RamFs<'_>, dir: &str) -> Vec<String> {
        let h = fs.opendir(dir).unwrap();
        let mut out = Vec::new();
        while let Some(entry) = fs.readdir(h).unwrap() {
            out.push(entry.name.as_str().to_owned());
        }
        fs.closedir(h).unwrap();
        out
    }

    #[test]
    fn create_makes_missing_parents() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        fs.create_file("/a/b/c.txt").unwrap();
        assert!(fs.isdir("/a").unwrap());
        assert!(fs.isdir("/a/b").unwrap());
        assert!(fs.isfile("/a/b/c.txt").unwrap());
        assert_eq!(fs.unlink("/a/b"), Err(FsError::NotEmpty));
        fs.unlink("/a/b/c.txt").unwrap();
        fs.unlink("/a/b").unwrap();
        assert!(!fs.exists("/a/b").unwrap());
    }

    #[test]
    fn write_past_initial_capacity() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let h = fs.open("/big", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        assert_eq!(fs.write(h, &data), Ok(5000));
        fs.close(h).unwrap();
        // Initial 4096 bytes abandoned, then max(4096 + 4096, 5000).
        assert_eq!(fs.bytes_used(), RAMFS_GROW_STEP + 2 * RAMFS_GROW_STEP);

        let h = fs.open("/big", OpenFlags::READ).unwrap();
        let mut out = vec![0; 6000];
        assert_eq!(fs.read(h, &mut out), Ok(5000));
        assert_eq!(&out[..5000], &data[..]);
        assert_eq!(fs.read(h, &mut out), Ok(0));
    }

    #[test]
    fn growth_preserves_earlier_bytes() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        let h = fs.open("/f", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        fs.write(h, b"head").unwrap();
        fs.seek(h, 0, Whence::End).unwrap();
        fs.write(h, &[b'x'; RAMFS_GROW_STEP]).unwrap();
        fs.seek(h, 0, Whence::Set).unwrap();
        let mut out = [0; 4];
        fs.read(h, &mut out).unwrap();
        assert_eq!(&out, b"head");
        assert_eq!(fs.stat("/f").unwrap().size, 4 + RAMFS_GROW_STEP as u64);
    }

    #[test]
    fn truncate_and_append() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        let h = fs.open("/log", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        fs.write(h, b"hello").unwrap();
        fs.close(h).unwrap();

        let h = fs.open("/log", OpenFlags::WRITE | OpenFlags::APPEND).unwrap();
        assert_eq!(fs.tell(h), Ok(5));
        fs.write(h, b" world").unwrap();
        fs.close(h).unwrap();
        assert_eq!(fs.stat("/log").unwrap().size, 11);

        let h = fs.open("/log", OpenFlags::WRITE | OpenFlags::TRUNCATE).unwrap();
        assert_eq!(fs.stat("/log").unwrap().size, 0);
        assert_eq!(fs.tell(h), Ok(0));
    }

    #[test]
    fn open_errors() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        assert_eq!(fs.open("/missing", OpenFlags::READ), Err(FsError::NotFound));
        fs.create_dir("/d").unwrap();
        assert_eq!(fs.open("/d", OpenFlags::READ), Err(FsError::IsADirectory));
        fs.create_file("/f").unwrap();
        assert_eq!(fs.open("/f/x", OpenFlags::CREATE), Err(FsError::NotADirectory));
    }

    #[test]
    fn seek_is_bounded_by_size() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        let h = fs.open("/f", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        fs.write(h, b"abcdef").unwrap();
        assert_eq!(fs.seek(h, -2, Whence::End), Ok(4));
        assert_eq!(fs.seek(h, 1, Whence::Cur), Ok(5));
        assert_eq!(fs.seek(h, 7, Whence::Set), Err(FsError::InvalidArgument));
        assert_eq!(fs.tell(h), Ok(5));
    }

    #[test]
    fn stat_reports_owner_and_slot() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        fs.create_file("/notes.txt").unwrap();
        let st = fs.stat("/notes.txt").unwrap();
        assert_eq!(st.file_type, VfsFileType::File);
        assert_eq!(st.uid, 1000);
        assert_eq!(st.inode, 1);
        assert_eq!(st.permissions, Permissions::read_write());
        assert_eq!(fs.stat("/").unwrap().file_type, VfsFileType::Directory);
    }

    #[test]
    fn mkdir_refuses_existing_paths() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        fs.mkdir("/docs").unwrap();
        assert_eq!(fs.mkdir("/docs"), Err(FsError::AlreadyExists));
        assert_eq!(fs.mkdir("/"), Err(FsError::AlreadyExists));
        assert_eq!(fs.create_file("/docs"), Err(FsError::AlreadyExists));
    }

    #[test]
    fn listing_skips_unlinked_nodes() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        for path in ["/a", "/b", "/c"] {
            fs.create_file(path).unwrap();
        }
        fs.unlink("/b").unwrap();
        assert_eq!(names(&fs, "/"), ["a", "c"]);
        assert_eq!(fs.nodes_used(), 4);

        let h = fs.opendir("/").unwrap();
        fs.readdir(h).unwrap();
        fs.rewinddir(h).unwrap();
        assert_eq!(fs.readdir(h).unwrap().unwrap().name, "a");
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        assert_eq!(fs.unlink("/"), Err(FsError::PermissionDenied));
        assert_eq!(fs.rename("/", "/x"), Err(FsError::PermissionDenied));
    }

    #[test]
    fn rename_moves_without_copying() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        let h = fs.open("/a.txt", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        fs.write(h, b"payload").unwrap();
        fs.close(h).unwrap();
        fs.create_dir("/docs").unwrap();
        let used = fs.bytes_used();

        fs.rename("/a.txt", "/docs/b.txt").unwrap();
        assert_eq!(fs.bytes_used(), used);
        assert!(!fs.exists("/a.txt").unwrap());
        assert_eq!(fs.stat("/docs/b.txt").unwrap().size, 7);

        fs.create_file("/c.txt").unwrap();
        assert_eq!(fs.rename("/c.txt", "/docs/b.txt"), Err(FsError::AlreadyExists));
        assert_eq!(fs.rename("/c.txt", "/nowhere/c.txt"), Err(FsError::NotFound));
    }

    #[test]
    fn rename_into_own_subtree_is_rejected() {
        let mut pool = arena(64);
        let fs = RamFs::new(&mut pool);
        fs.create_dir("/a/b").unwrap();
        assert_eq!(fs.rename("/a", "/a/b/a"), Err(FsError::InvalidArgument));
        assert_eq!(fs.rename("/a", "/a/z"), Err(FsError::InvalidArgument));
    }

    #[test]
    fn arena_exhaustion() {
        let mut pool = vec![0; 2 * RAMFS_GROW_STEP];
        let fs = RamFs::new(&mut pool);
        for path in ["/one", "/two", "/three"] {
            fs.create_file(path).unwrap();
        }
        assert_eq!(fs.bytes_used(), 0);

        // Each file takes its region on first open.
        for path in ["/one", "/two", "/one"] {
            let h = fs.open(path, OpenFlags::READ).unwrap();
            fs.close(h).unwrap();
        }
        assert_eq!(fs.bytes_used(), 2 * RAMFS_GROW_STEP);
        assert_eq!(fs.open("/three", OpenFlags::READ), Err(FsError::NoSpace));

        // Freed space is never handed out again.
        fs.unlink("/one").unwrap();
        assert_eq!(fs.open("/three", OpenFlags::READ), Err(FsError::NoSpace));
        assert!(fs.isfile("/three").unwrap());
    }

    #[test]
    fn failed_create_leaves_no_nodes() {
        let mut pool = arena(4);
        let fs = RamFs::new(&mut pool);
        for i in 1..RAMFS_MAX_NODES - 2 {
            fs.mkdir(&format!("/d{i}")).unwrap();
        }
        let used = fs.nodes_used();
        assert_eq!(used, RAMFS_MAX_NODES - 2);

        // Two free slots cannot hold /x, /x/y and the file.
        assert_eq!(fs.create_file("/x/y/z.txt"), Err(FsError::NoFreeNodes));
        assert_eq!(fs.mkdir("/x/y/z"), Err(FsError::NoFreeNodes));
        assert_eq!(
            fs.open("/x/y/z.txt", OpenFlags::WRITE | OpenFlags::CREATE),
            Err(FsError::NoFreeNodes)
        );
        assert_eq!(fs.nodes_used(), used);
        assert!(!fs.exists("/x").unwrap());

        // Exactly enough room still succeeds.
        fs.create_file("/x/z.txt").unwrap();
        assert_eq!(fs.nodes_used(), RAMFS_MAX_NODES);
    }

    #[test]
    fn create_on_open_needs_arena_space() {
        let mut pool = vec![0; RAMFS_GROW_STEP];
        let fs = RamFs::new(&mut pool);
        let h = fs.open("/first", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        fs.close(h).unwrap();

        assert_eq!(
            fs.open("/x/y/second", OpenFlags::WRITE | OpenFlags::CREATE),
            Err(FsError::NoSpace)
        );
        assert_eq!(fs.nodes_used(), 2);
        assert!(!fs.exists("/x").unwrap());
        assert_eq!(fs.bytes_used(), RAMFS_GROW_STEP);
    }

    #[test]
    fn node_table_exhaustion() {
        let mut pool = arena(4);
        let fs = RamFs::new(&mut pool);
        for i in 1..RAMFS_MAX_NODES {
            fs.mkdir(&format!("/d{i}")).unwrap();
        }
        assert_eq!(fs.mkdir("/extra"), Err(FsError::NoFreeNodes));
        fs.unlink("/d1").unwrap();
        assert_eq!(fs.mkdir("/extra"), Err(FsError::NoFreeNodes));
    }

    #[test]
    fn handle_pool_exhaustion() {
        let mut pool = arena(8);
        let fs = RamFs::new(&mut pool);
        fs.create_file("/f").unwrap();
        let handles: Vec<_> = (0..RAMFS_MAX_FILES)
            .map(|_| fs.open("/f", OpenFlags::READ).unwrap())
            .collect();
        assert_eq!(fs.open("/f", OpenFlags::READ), Err(FsError::HandlesExhausted));
        assert_eq!(
            fs.open("/g", OpenFlags::WRITE | OpenFlags::CREATE),
            Err(FsError::HandlesExhausted)
        );
        assert!(!fs.exists("/g").unwrap());
        fs.close(handles[3]).unwrap();
        assert_eq!(fs.close(handles[3]), Err(FsError::BadFd));
        assert!(fs.open("/f", OpenFlags::READ).is_ok());
    }
}
