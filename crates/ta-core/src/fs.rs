//! File-safety guard rails for paths read on the caller's behalf (IMA/UEFI
//! log paths, `--pub-path`, AK-cert `file://` URIs).

use crate::error::{CoreError, Result};
use std::path::Path;

/// Read `path` to bytes, rejecting any path containing a `..` component or
/// that is itself a symbolic link.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();

    if path.components().any(|c| c.as_os_str() == "..") {
        return Err(CoreError::PathTraversal(path.display().to_string()));
    }

    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Err(CoreError::SymlinkNotAllowed(path.display().to_string()));
    }

    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_path_traversal() {
        let result = read_file("foo/../bar");
        assert!(matches!(result, Err(CoreError::PathTraversal(_))));
    }

    #[test]
    fn reads_plain_file() {
        let mut f = tempfile_path();
        writeln!(f.1, "hello").unwrap();
        let bytes = read_file(&f.0).unwrap();
        assert_eq!(bytes, b"hello\n");
    }

    #[test]
    fn rejects_symlink() {
        let (target_path, _target_file) = tempfile_path();
        let link_path = target_path.with_extension("link");
        std::os::unix::fs::symlink(&target_path, &link_path).unwrap();
        let result = read_file(&link_path);
        let _ = std::fs::remove_file(&link_path);
        assert!(matches!(result, Err(CoreError::SymlinkNotAllowed(_))));
    }

    fn tempfile_path() -> (std::path::PathBuf, std::fs::File) {
        let mut path = std::env::temp_dir();
        path.push(format!("ta-core-fs-test-{:?}", std::thread::current().id()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
