//! Path utilities for the VFS layer.
//!
//! Paths are `/`-separated byte strings. Mount matching respects component
//! boundaries: `/data` matches `/data` and `/data/x` but never `/dataX`.

use core::fmt;

use crate::FsError;

/// Longest path, in bytes, that [`PathBuf`] can hold.
pub const PATH_MAX: usize = 256;

/// Splits `path` into its non-empty components.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// `true` if `path` starts with `/`.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// `true` if `mount` covers `path`: the root mount covers everything; any
/// other mount covers itself and paths that continue with `/`.
#[must_use]
pub fn mount_covers(mount: &str, path: &str) -> bool {
    if mount == "/" {
        return true;
    }
    match path.strip_prefix(mount) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Index of the longest mount point covering `path`.
pub fn longest_prefix_match<'m>(
    path: &str,
    mounts: impl Iterator<Item = (usize, &'m str)>,
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, mount) in mounts {
        if mount_covers(mount, path) && best.is_none_or(|(_, len)| mount.len() > len) {
            best = Some((index, mount.len()));
        }
    }
    best.map(|(index, _)| index)
}

/// The part of `path` below `mount`, as seen by the backend.
///
/// Under the root mount the path is passed through unchanged. Otherwise the
/// prefix is removed and an empty remainder becomes `/`.
#[must_use]
pub fn strip_mount_prefix<'p>(path: &'p str, mount: &str) -> &'p str {
    if mount == "/" {
        return path;
    }
    match path.get(mount.len()..) {
        Some(rest) if !rest.is_empty() => rest,
        _ => "/",
    }
}

/// Final component of `path`, ignoring trailing slashes. `/` yields `""`.
#[must_use]
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Everything before the final component.
///
/// Top-level names yield `/`; a name with no slash yields `""`.
#[must_use]
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(pos) => trimmed[..pos].trim_end_matches('/'),
        None if is_absolute(path) => "/",
        None => "",
    }
}

/// `true` if the final component names an application bundle (`*.app`).
#[must_use]
pub fn is_bundle(path: &str) -> bool {
    let name = basename(path);
    name.len() > ".app".len() && name.ends_with(".app")
}

/// Lexically normalizes `path`: repeated separators collapse, `.` is
/// dropped and `..` removes the previous component. `..` never climbs above
/// the root of an absolute path.
///
/// # Errors
///
/// [`FsError::NameTooLong`] if the result exceeds [`PATH_MAX`].
pub fn normalize(path: &str) -> Result<PathBuf, FsError> {
    let absolute = is_absolute(path);
    let mut out = PathBuf::new();
    if absolute {
        out.push_str("/")?;
    }
    let floor = out.len();
    for part in components(path) {
        match part {
            "." => {}
            ".." => {
                if out.len() > floor && out.last_component(floor) != ".." {
                    out.pop_component(floor);
                } else if !absolute {
                    out.push_component("..", floor)?;
                }
            }
            name => out.push_component(name, floor)?,
        }
    }
    if out.is_empty() {
        out.push_str(".")?;
    }
    Ok(out)
}

/// A path held in a fixed inline buffer.
#[derive(Clone, Copy)]
pub struct PathBuf {
    len: usize,
    bytes: [u8; PATH_MAX],
}

impl PathBuf {
    /// An empty path.
    pub const fn new() -> Self {
        Self {
            len: 0,
            bytes: [0; PATH_MAX],
        }
    }

    /// Copies `path`.
    ///
    /// # Errors
    ///
    /// [`FsError::NameTooLong`] past [`PATH_MAX`].
    pub fn from_str(path: &str) -> Result<Self, FsError> {
        let mut out = Self::new();
        out.push_str(path)?;
        Ok(out)
    }

    /// The path.
    pub fn as_str(&self) -> &str {
        // Only ever extended with whole `&str`s.
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the path is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push_str(&mut self, s: &str) -> Result<(), FsError> {
        let end = self.len + s.len();
        let dst = self.bytes.get_mut(self.len..end).ok_or(FsError::NameTooLong)?;
        dst.copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }

    fn push_component(&mut self, name: &str, floor: usize) -> Result<(), FsError> {
        if self.len > floor {
            self.push_str("/")?;
        }
        self.push_str(name)
    }

    fn last_component(&self, floor: usize) -> &str {
        let tail = &self.as_str()[floor..];
        tail.rfind('/').map_or(tail, |pos| &tail[pos + 1..])
    }

    fn pop_component(&mut self, floor: usize) {
        let tail = &self.as_str()[floor..];
        self.len = match tail.rfind('/') {
            Some(pos) => floor + pos,
            None => floor,
        };
    }
}

impl Default for PathBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq<&str> for PathBuf {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_skip_empty_segments() {
        assert_eq!(components("/a//b/c/").collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(components("/").count(), 0);
    }

    #[test]
    fn mount_boundary() {
        assert!(mount_covers("/", "/anything"));
        assert!(mount_covers("/data", "/data"));
        assert!(mount_covers("/data", "/data/x"));
        assert!(!mount_covers("/data", "/dataX/x"));
        assert!(!mount_covers("/data", "/dat"));
    }

    #[test]
    fn longest_mount_wins() {
        let mounts = ["/", "/data", "/data/cache"];
        let pick = |p| longest_prefix_match(p, mounts.iter().copied().enumerate());
        assert_eq!(pick("/data/cache/x"), Some(2));
        assert_eq!(pick("/data/x"), Some(1));
        assert_eq!(pick("/dataX/x"), Some(0));
        assert_eq!(pick("/x"), Some(0));
        assert_eq!(longest_prefix_match("/x", ["/data"].into_iter().enumerate()), None);
    }

    #[test]
    fn stripping_mount_prefix() {
        assert_eq!(strip_mount_prefix("/data/x/y", "/data"), "/x/y");
        assert_eq!(strip_mount_prefix("/data", "/data"), "/");
        assert_eq!(strip_mount_prefix("/etc/motd", "/"), "/etc/motd");
    }

    #[test]
    fn base_and_dir_names() {
        assert_eq!(basename("/a/b.txt"), "b.txt");
        assert_eq!(basename("/a/b/"), "b");
        assert_eq!(basename("/"), "");
        assert_eq!(dirname("/a/b.txt"), "/a");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
        assert_eq!(dirname("file"), "");
        assert_eq!(dirname("a/b"), "a");
    }

    #[test]
    fn bundles() {
        assert!(is_bundle("/Applications/Terminal.app"));
        assert!(is_bundle("/Applications/Terminal.app/"));
        assert!(!is_bundle("/Applications/notes.txt"));
        assert!(!is_bundle("/.app"));
    }

    #[test]
    fn normalizing() {
        assert_eq!(normalize("/a//b/./c/").unwrap(), "/a/b/c");
        assert_eq!(normalize("/a/b/../c").unwrap(), "/a/c");
        assert_eq!(normalize("/../..").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("a/../../b").unwrap(), "../b");
        assert_eq!(normalize("./").unwrap(), ".");
        assert_eq!(normalize("/a/b../..").unwrap(), "/a");
        assert_eq!(normalize("a../..").unwrap(), ".");
        assert_eq!(normalize("../x../..").unwrap(), "..");
        assert_eq!(normalize("../../a").unwrap(), "../../a");
    }
}
