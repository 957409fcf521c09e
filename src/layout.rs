use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::models::Status;

/// Top-level names under the managed root that cleanup never touches.
pub const RESERVED_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".venv",
    "venv",
    "env",
    ".idea",
    ".vscode",
    "__pycache__",
];

/// Shape of the managed folder tree:
/// `<root>/<bucket>/<payer>/<line>.<description>`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    completed: String,
    pending: String,
}

impl Layout {
    pub fn new(root: &Path, completed: &str, pending: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            completed: completed.to_string(),
            pending: pending.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_names(&self) -> [&str; 2] {
        [&self.completed, &self.pending]
    }

    pub fn bucket_roots(&self) -> [PathBuf; 2] {
        [self.root.join(&self.completed), self.root.join(&self.pending)]
    }

    pub fn bucket_for(&self, status: &Status) -> &str {
        if status.is_yes() {
            &self.completed
        } else {
            &self.pending
        }
    }

    /// Root-relative folder for a row.
    pub fn target_for(&self, status: &Status, payer: &str, line: usize, description: &str) -> PathBuf {
        PathBuf::from(self.bucket_for(status))
            .join(sanitize_component(payer))
            .join(format!("{line}.{}", sanitize_component(description)))
    }

    /// Turn a stored `folder_path` into an absolute path under the root.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            normalize(path)
        } else {
            self.root.join(normalize(path))
        }
    }

    /// Root-relative form used for storage and comparison; absolute paths
    /// outside the root are kept as they are.
    pub fn relative(&self, path: &Path) -> PathBuf {
        let path = normalize(path);
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path,
        }
    }

    pub fn is_bucket_root(&self, abs: &Path) -> bool {
        self.bucket_roots().iter().any(|b| b == abs)
    }

    /// Folders cleanup must never remove: the root and the bucket roots.
    pub fn is_protected(&self, abs: &Path) -> bool {
        abs == self.root || self.is_bucket_root(abs) || !abs.starts_with(&self.root)
    }

    pub fn is_reserved_top_level(&self, name: &str) -> bool {
        RESERVED_DIRS.contains(&name) || self.bucket_names().contains(&name)
    }
}

/// Drop `.` components so `./a/b` and `a/b` compare equal.
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Make cell text safe to use as a single path component.
pub fn sanitize_component(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).unwrap());
    let cleaned = re.replace_all(raw.trim(), "_");
    match cleaned.as_ref() {
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new(Path::new("/club"), "completed", "pending")
    }

    #[test]
    fn test_target_uses_pending_unless_yes() {
        let l = layout();
        assert_eq!(
            l.target_for(&Status::Empty, "张三", 2, "文具"),
            PathBuf::from("pending/张三/2.文具")
        );
        assert_eq!(
            l.target_for(&Status::Check, "张三", 2, "文具"),
            PathBuf::from("pending/张三/2.文具")
        );
        assert_eq!(
            l.target_for(&Status::Yes, "张三", 7, "文具"),
            PathBuf::from("completed/张三/7.文具")
        );
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("打印/复印"), "打印_复印");
        assert_eq!(sanitize_component(" a:b*c "), "a_b_c");
        assert_eq!(sanitize_component(".."), "__");
        assert_eq!(sanitize_component("文具"), "文具");
    }

    #[test]
    fn test_resolve_and_relative() {
        let l = layout();
        assert_eq!(l.resolve("./张三/文具"), PathBuf::from("/club/张三/文具"));
        assert_eq!(l.resolve("/other/place"), PathBuf::from("/other/place"));
        assert_eq!(
            l.relative(Path::new("/club/pending/张三/2.文具")),
            PathBuf::from("pending/张三/2.文具")
        );
        assert_eq!(l.relative(Path::new("./pending/x")), PathBuf::from("pending/x"));
    }

    #[test]
    fn test_protected_paths() {
        let l = layout();
        assert!(l.is_protected(Path::new("/club")));
        assert!(l.is_protected(Path::new("/club/pending")));
        assert!(l.is_protected(Path::new("/elsewhere/x")));
        assert!(!l.is_protected(Path::new("/club/pending/张三")));
    }

    #[test]
    fn test_reserved_top_level() {
        let l = layout();
        assert!(l.is_reserved_top_level(".git"));
        assert!(l.is_reserved_top_level("completed"));
        assert!(!l.is_reserved_top_level("张三"));
    }
}
