//! File-system access for static resources
//!
//! Static serving only needs three things from the file system: whether a
//! path is an existing regular file, its size and modification time, and a
//! reader over its contents. [`FileSystem`] is that seam.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::SystemTime;

/// Metadata of a regular file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// File-system collaborator used by the dispatcher
pub trait FileSystem: Send + Sync {
    /// Stat `path`; `None` unless it exists and is a regular file
    fn stat(&self, path: &Path) -> Option<FileStat>;

    /// Open `path` for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn stat(&self, path: &Path) -> Option<FileStat> {
        let meta = fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(FileStat {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_stat_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"abc").unwrap();

        let local = LocalFileSystem;
        let stat = local.stat(&file).unwrap();
        assert_eq!(stat.len, 3);
        assert!(stat.modified.is_some());

        let mut content = String::new();
        local.open(&file).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "abc");

        assert!(local.stat(dir.path()).is_none());
        assert!(local.stat(&dir.path().join("missing")).is_none());
    }
}
