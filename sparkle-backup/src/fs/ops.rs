//! Filesystem mutations used by restore.
//!
//! The restore transaction performs every copy and delete against the live data
//! directory through [`FsOps`], so tests can substitute an implementation that
//! fails at a chosen point.

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

#[async_trait]
pub trait FsOps: Send + Sync {
    /// Remove a file or directory tree. Returns `Ok(false)` if nothing was there.
    async fn remove_all(&self, path: &Path) -> io::Result<bool>;

    /// Copy a file, or a directory tree, to `dst`. Parent directories of `dst`
    /// must exist.
    async fn copy_all(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// [`FsOps`] backed by the real filesystem, running blocking work off the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl FsOps for LocalFs {
    async fn remove_all(&self, path: &Path) -> io::Result<bool> {
        let path = path.to_path_buf();
        run_blocking(move || remove_path(&path)).await
    }

    async fn copy_all(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
        run_blocking(move || copy_recursive(&src, &dst)).await
    }
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::other(format!("blocking task failed: {e}")))?
}

/// Remove `path` whether it is a file, a symlink or a directory tree.
pub fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copy a file, symlink or directory tree from `src` to `dst`.
///
/// Symlinks are recreated as links with the same target, dangling or not.
/// Any other special file (socket, fifo, device) fails the copy.
pub fn copy_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    let file_type = fs::symlink_metadata(src)?.file_type();
    if file_type.is_symlink() {
        return copy_link(src, dst);
    }
    if file_type.is_file() {
        fs::copy(src, dst)?;
        return Ok(());
    }
    if !file_type.is_dir() {
        return Err(special_file(src));
    }

    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            copy_link(entry.path(), &target)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            return Err(special_file(entry.path()));
        }
    }

    Ok(())
}

fn special_file(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy special file {}", path.display()),
    )
}

/// Recreate the symlink `src` at `dst`, pointing at the same target.
fn copy_link(src: &Path, dst: &Path) -> io::Result<()> {
    let link_target = fs::read_link(src)?;
    make_link(&link_target, src, dst)
}

#[cfg(unix)]
fn make_link(link_target: &Path, _src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link_target, dst)
}

#[cfg(windows)]
fn make_link(link_target: &Path, src: &Path, dst: &Path) -> io::Result<()> {
    let points_to_dir = fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false);
    if points_to_dir {
        std::os::windows::fs::symlink_dir(link_target, dst)
    } else {
        std::os::windows::fs::symlink_file(link_target, dst)
    }
}

#[cfg(not(any(unix, windows)))]
fn make_link(link_target: &Path, src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy symlink {} -> {}", src.display(), link_target.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_directory_tree() -> io::Result<()> {
        let temp = TempDir::new()?;
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("a/b"))?;
        fs::create_dir_all(src.join("empty"))?;
        fs::write(src.join("top.txt"), b"top")?;
        fs::write(src.join("a/b/deep.txt"), b"deep")?;

        let dst = temp.path().join("dst");
        copy_recursive(&src, &dst)?;

        assert_eq!(fs::read(dst.join("top.txt"))?, b"top");
        assert_eq!(fs::read(dst.join("a/b/deep.txt"))?, b"deep");
        assert!(dst.join("empty").is_dir());
        Ok(())
    }

    #[test]
    fn test_copy_single_file() -> io::Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join("config.yaml"), b"mode: rule")?;

        copy_recursive(&temp.path().join("config.yaml"), &temp.path().join("copy.yaml"))?;

        assert_eq!(fs::read(temp.path().join("copy.yaml"))?, b"mode: rule");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_symlinks() -> io::Result<()> {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new()?;
        let src = temp.path().join("profiles");
        fs::create_dir_all(&src)?;
        fs::write(src.join("a.yaml"), b"a")?;
        symlink("a.yaml", src.join("link.yaml"))?;
        symlink("missing.yaml", src.join("dangling.yaml"))?;
        symlink("profiles-missing", temp.path().join("override"))?;

        let dst = temp.path().join("copy");
        copy_recursive(&src, &dst)?;
        copy_recursive(&temp.path().join("override"), &temp.path().join("override-copy"))?;

        assert!(fs::symlink_metadata(dst.join("link.yaml"))?.file_type().is_symlink());
        assert_eq!(fs::read_link(dst.join("link.yaml"))?, Path::new("a.yaml"));
        assert_eq!(fs::read(dst.join("link.yaml"))?, b"a");
        assert_eq!(fs::read_link(dst.join("dangling.yaml"))?, Path::new("missing.yaml"));
        assert_eq!(
            fs::read_link(temp.path().join("override-copy"))?,
            Path::new("profiles-missing")
        );

        assert!(remove_path(&temp.path().join("override-copy"))?);
        assert!(fs::symlink_metadata(temp.path().join("override-copy")).is_err());
        Ok(())
    }

    #[test]
    fn test_remove_path() -> io::Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("themes/dark"))?;
        fs::write(temp.path().join("themes/dark/style.css"), b"body{}")?;
        fs::write(temp.path().join("config.yaml"), b"")?;

        assert!(remove_path(&temp.path().join("themes"))?);
        assert!(remove_path(&temp.path().join("config.yaml"))?);
        assert!(!remove_path(&temp.path().join("missing"))?);
        assert!(!temp.path().join("themes").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_fs_ops() -> io::Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("profiles"))?;
        fs::write(temp.path().join("profiles/a.yaml"), b"a")?;

        LocalFs
            .copy_all(&temp.path().join("profiles"), &temp.path().join("copy"))
            .await?;
        assert_eq!(fs::read(temp.path().join("copy/a.yaml"))?, b"a");

        assert!(LocalFs.remove_all(&temp.path().join("copy")).await?);
        assert!(!LocalFs.remove_all(&temp.path().join("copy")).await?);
        Ok(())
    }
}
