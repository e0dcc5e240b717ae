//! Filesystems for the simulated kernel
//!
//! [`RamFs`] keeps files in memory and is what most tests use. [`HostFs`]
//! reads from a directory on the host, so real executables can be spawned
//! in the simulation.

use kernel_api::{FileSystem, FsError};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem
#[derive(Debug, Clone, Default)]
pub struct RamFs {
    files: HashMap<String, Vec<u8>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a file
    pub fn add_file(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(path.into(), contents);
    }

    pub fn remove_file(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

impl FileSystem for RamFs {
    fn read_fully(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }
}

/// Filesystem rooted at a host directory
///
/// Kernel paths are resolved relative to the root; a leading `/` is
/// ignored.
#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystem for HostFs {
    fn read_fully(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        std::fs::read(self.resolve(path)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            _ => FsError::Io(format!("{}: {}", path, err)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ram_fs_read() {
        let mut fs = RamFs::new();
        fs.add_file("/c/a.exe", vec![1, 2, 3]);

        assert_eq!(fs.read_fully("/c/a.exe"), Ok(vec![1, 2, 3]));
        assert_eq!(
            fs.read_fully("/c/b.exe"),
            Err(FsError::NotFound("/c/b.exe".to_string()))
        );
    }

    #[test]
    fn test_ram_fs_remove() {
        let mut fs = RamFs::new();
        fs.add_file("/c/a.exe", vec![1]);
        assert!(fs.remove_file("/c/a.exe").is_some());
        assert!(!fs.contains("/c/a.exe"));
    }

    #[test]
    fn test_host_fs_read() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();
        std::fs::write(dir.path().join("c/shell.exe"), b"\x7fELF").unwrap();

        let mut fs = HostFs::new(dir.path());
        assert_eq!(fs.read_fully("/c/shell.exe"), Ok(b"\x7fELF".to_vec()));
    }

    #[test]
    fn test_host_fs_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut fs = HostFs::new(dir.path());
        assert!(matches!(
            fs.read_fully("/c/missing.exe"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_host_fs_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let mut fs = HostFs::new(dir.path());
        assert!(matches!(fs.read_fully("/c"), Err(FsError::Io(_))));
    }
}
