use std::io;
use std::path::Path;

/// The filesystem operations the engine needs, over absolute paths.
pub trait FolderTree {
    fn is_dir(&self, path: &Path) -> bool;

    /// Files directly inside `path`; subfolders are not counted or entered.
    fn count_files(&self, path: &Path) -> io::Result<usize>;

    /// Whether any file exists anywhere below `path`.
    fn contains_files(&self, path: &Path) -> io::Result<bool>;

    /// Names of the immediate subfolders of `path`, sorted.
    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>>;

    fn is_empty_dir(&self, path: &Path) -> bool;

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()>;

    /// Move a folder and its contents, creating the destination's parents.
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a folder only if it is empty.
    fn remove_dir(&mut self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct DiskTree;

impl FolderTree for DiskTree {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn count_files(&self, path: &Path) -> io::Result<usize> {
        let mut count = 0;
        // Follows symlinks, so a linked receipt counts as a file.
        for entry in std::fs::read_dir(path)? {
            if entry?.path().is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn contains_files(&self, path: &Path) -> io::Result<bool> {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let kind = entry.file_type()?;
            if kind.is_dir() {
                if self.contains_files(&entry.path())? {
                    return Ok(true);
                }
            } else {
                // Symlinks and special files count as content worth keeping.
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn is_empty_dir(&self, path: &Path) -> bool {
        std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(from, to)
    }

    fn remove_dir(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

#[cfg(test)]
pub use mem::MemTree;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_count_files_ignores_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("claim");
        std::fs::create_dir_all(folder.join("nested")).unwrap();
        std::fs::write(folder.join("a.pdf"), b"a").unwrap();
        std::fs::write(folder.join("b.jpg"), b"b").unwrap();
        std::fs::write(folder.join("nested").join("c.pdf"), b"c").unwrap();
        let tree = DiskTree;
        assert_eq!(tree.count_files(&folder).unwrap(), 2);
        assert!(tree.contains_files(&folder).unwrap());
        assert_eq!(tree.list_dirs(&folder).unwrap(), vec!["nested".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_count_files_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = dir.path().join("receipt.pdf");
        std::fs::write(&receipt, b"%PDF").unwrap();
        let folder = dir.path().join("claim");
        std::fs::create_dir_all(&folder).unwrap();
        std::os::unix::fs::symlink(&receipt, folder.join("linked.pdf")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.pdf"), folder.join("dangling.pdf")).unwrap();
        assert_eq!(DiskTree.count_files(&folder).unwrap(), 1);
    }

    #[test]
    fn test_disk_contains_files_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("a");
        std::fs::create_dir_all(folder.join("b").join("c")).unwrap();
        let tree = DiskTree;
        assert!(!tree.contains_files(&folder).unwrap());
        std::fs::write(folder.join("b").join("c").join("x.txt"), b"x").unwrap();
        assert!(tree.contains_files(&folder).unwrap());
    }

    #[test]
    fn test_disk_rename_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("pending").join("张三").join("2.文具");
        std::fs::create_dir_all(&from).unwrap();
        std::fs::write(from.join("receipt.pdf"), b"%PDF-1.4 receipt").unwrap();
        let to = dir.path().join("completed").join("张三").join("2.文具");
        let mut tree = DiskTree;
        tree.rename(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(to.join("receipt.pdf")).unwrap(), b"%PDF-1.4 receipt");
    }

    #[test]
    fn test_disk_remove_dir_refuses_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("x");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("keep.txt"), b"k").unwrap();
        let mut tree = DiskTree;
        assert!(tree.remove_dir(&folder).is_err());
        assert!(folder.exists());
        assert!(!tree.is_empty_dir(&folder));
    }

    #[test]
    fn test_mem_rename_moves_subtree() {
        let mut tree = MemTree::new();
        tree.add_file("/r/pending/a/2.x/f.pdf", b"data");
        tree.rename(Path::new("/r/pending/a/2.x"), Path::new("/r/completed/a/2.x")).unwrap();
        assert!(!tree.has_dir("/r/pending/a/2.x"));
        assert!(tree.has_dir("/r/pending/a"));
        assert_eq!(tree.read("/r/completed/a/2.x/f.pdf"), Some(&b"data"[..]));
        assert_eq!(tree.count_files(Path::new("/r/completed/a/2.x")).unwrap(), 1);
    }
}
