//! Directory listing for the `list` call.

use std::path::{Path, PathBuf};

use fileferry_protocol::FileInfo;
use tracing::debug;

/// Errors from listing a directory.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to read directory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lists every entry of `root`, files and directories alike, sorted by name.
///
/// Hidden entries are included. Entries whose metadata cannot be read
/// (e.g. a dangling symlink) are skipped. An empty directory yields an
/// empty vector.
pub async fn list_directory(root: &Path) -> Result<Vec<FileInfo>, ListError> {
    let read_err = |source| ListError::Read {
        path: root.to_path_buf(),
        source,
    };

    let meta = tokio::fs::metadata(root).await.map_err(read_err)?;
    if !meta.is_dir() {
        return Err(ListError::NotADirectory(root.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(root).await.map_err(read_err)?;
    let mut result = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let name = entry.file_name().to_string_lossy().to_string();
        let metadata = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(e) => {
                debug!(name = %name, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        result.push(FileInfo {
            name,
            size: metadata.len(),
            is_dir: metadata.is_dir(),
        });
    }

    result.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_and_dirs_with_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path();

        std::fs::create_dir(base.join("sub")).unwrap();
        std::fs::write(base.join("b.txt"), "four").unwrap();
        std::fs::write(base.join("a.bin"), [0u8; 10]).unwrap();
        std::fs::write(base.join(".hidden"), "x").unwrap();

        let entries = list_directory(base).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".hidden", "a.bin", "b.txt", "sub"]);

        assert_eq!(entries[1].size, 10);
        assert!(!entries[1].is_dir);
        assert_eq!(entries[2].size, 4);
        assert!(entries[3].is_dir);
    }

    #[tokio::test]
    async fn empty_directory_is_empty_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = list_directory(tmp.path()).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn nonexistent_root_is_error() {
        let result = list_directory(Path::new("/definitely/not/real")).await;
        assert!(matches!(result, Err(ListError::Read { .. })));
    }

    #[tokio::test]
    async fn file_root_is_not_a_directory() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let result = list_directory(tmp.path()).await;
        assert!(matches!(result, Err(ListError::NotADirectory(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("link")).unwrap();
        std::fs::write(tmp.path().join("real.txt"), "ok").unwrap();

        let entries = list_directory(tmp.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real.txt");
    }
}
