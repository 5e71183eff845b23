//! File helpers

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Replace `path` with `contents` through a temp file in the same directory
///
/// An existing file keeps its permission bits.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let previous = std::fs::metadata(path).ok().map(|meta| meta.permissions());

    let mut temp = NamedTempFile::new_in(dir).map_err(Error::file(dir))?;
    temp.write_all(contents).map_err(Error::file(path))?;
    temp.as_file().sync_all().map_err(Error::file(path))?;
    if let Some(permissions) = previous {
        temp.as_file()
            .set_permissions(permissions)
            .map_err(Error::file(path))?;
    }
    temp.persist(path).map_err(|e| Error::File {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Set the permission bits of `path`
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(Error::file(path))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current_host");

        write_atomic(&path, b"yunohost.org\n").unwrap();
        write_atomic(&path, b"example.org\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "example.org\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.cf");
        std::fs::write(&path, "myhostname = yunohost.org\n").unwrap();
        set_mode(&path, 0o640).unwrap();

        write_atomic(&path, b"myhostname = example.org\n").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = write_atomic(&dir.path().join("absent/file"), b"x").unwrap_err();
        assert!(matches!(err, Error::File { .. }));
    }
}
