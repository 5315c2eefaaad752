use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Validates that `name` is a plain file name: exactly one normal path
/// component, no separators, no `.`/`..`, no drive or root prefix.
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidPath(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {name}"
        ))),
        (Some(Component::Prefix(_)), _) | (Some(Component::RootDir), _) => Err(
            TransferError::InvalidPath(format!("absolute path not allowed: {name}")),
        ),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {name}"
        ))),
    }
}

/// Reduces a client-declared upload name to its base name.
///
/// `../a.txt`, `dir/a.txt` and `C:\dir\a.txt` all become `a.txt`. Names
/// whose last segment is empty, `.` or `..` are rejected.
pub fn upload_file_name(declared: &str) -> Result<String, TransferError> {
    let base = declared.rsplit(['/', '\\']).next().unwrap_or_default();
    validate_file_name(base)?;
    Ok(base.to_string())
}

/// Joins a validated file name onto `root`.
///
/// A plain name can only land inside `root`, so the one way out is a
/// symlink already sitting at the target. A symlink must resolve to
/// something inside the canonical root; a dangling one is rejected
/// because creating the file would follow it wherever it points.
pub async fn resolve_in_root(root: &Path, name: &str) -> Result<PathBuf, TransferError> {
    validate_file_name(name)?;
    let path = root.join(name);

    let meta = match tokio::fs::symlink_metadata(&path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(path),
        Err(e) => return Err(e.into()),
    };
    if !meta.file_type().is_symlink() {
        return Ok(path);
    }

    let resolved = tokio::fs::canonicalize(&path)
        .await
        .map_err(|_| TransferError::InvalidPath(format!("{name} is a dangling symlink")))?;
    let root = tokio::fs::canonicalize(root).await?;
    if !resolved.starts_with(&root) {
        return Err(TransferError::InvalidPath(format!(
            "{name} resolves outside the root directory"
        )));
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_parent_dir() {
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../a.txt").is_err());
    }

    #[test]
    fn rejects_current_dir() {
        assert!(validate_file_name(".").is_err());
    }

    #[test]
    fn rejects_nested_paths() {
        assert!(validate_file_name("sub/file.txt").is_err());
        assert!(validate_file_name("sub\\file.txt").is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(validate_file_name("/etc/passwd").is_err());
    }

    #[test]
    fn accepts_plain_names() {
        assert!(validate_file_name("game.exe").is_ok());
        assert!(validate_file_name(".bashrc").is_ok());
        assert!(validate_file_name("a..b").is_ok());
    }

    #[test]
    fn upload_name_strips_directories() {
        assert_eq!(upload_file_name("a.txt").unwrap(), "a.txt");
        assert_eq!(upload_file_name("../a.txt").unwrap(), "a.txt");
        assert_eq!(upload_file_name("../../etc/a.txt").unwrap(), "a.txt");
        assert_eq!(upload_file_name("C:\\Users\\me\\a.txt").unwrap(), "a.txt");
    }

    #[test]
    fn upload_name_rejects_degenerate_base() {
        assert!(upload_file_name("").is_err());
        assert!(upload_file_name("dir/").is_err());
        assert!(upload_file_name("..").is_err());
        assert!(upload_file_name("sub/..").is_err());
        assert!(upload_file_name("./.").is_err());
    }

    #[tokio::test]
    async fn resolve_joins_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = resolve_in_root(dir.path(), "new.bin").await.unwrap();
        assert_eq!(path, dir.path().join("new.bin"));
    }

    #[tokio::test]
    async fn resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_in_root(dir.path(), "../a.txt").await;
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, b"top secret").unwrap();

        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&secret, root.path().join("link.txt")).unwrap();

        let result = resolve_in_root(root.path(), "link.txt").await;
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_dangling_symlink() {
        let outside = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let target = outside.path().join("planted.txt");
        std::os::unix::fs::symlink(&target, root.path().join("a.txt")).unwrap();

        let result = resolve_in_root(root.path(), "a.txt").await;
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_allows_symlink_within_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(root.path().join("real.txt"), root.path().join("alias.txt"))
            .unwrap();

        let path = resolve_in_root(root.path(), "alias.txt").await.unwrap();
        assert_eq!(path, root.path().join("alias.txt"));
    }

    #[tokio::test]
    async fn resolve_keeps_existing_plain_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("here.txt"), b"x").unwrap();
        let path = resolve_in_root(root.path(), "here.txt").await.unwrap();
        assert_eq!(path, root.path().join("here.txt"));
    }
}
