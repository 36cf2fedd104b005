use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when reading a host file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file `{path}`: {source}")]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Resolves an absolute host path below the mounted host root filesystem.
///
/// # Example
/// ```
/// # use docker_exporter::fsutil;
/// # use std::path::Path;
/// let path = fsutil::host_path("/rootfs", "/etc/hostname");
/// assert_eq!(path, Path::new("/rootfs/etc/hostname"));
/// ```
pub fn host_path(rootfs: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    rootfs
        .as_ref()
        .join(path.strip_prefix("/").unwrap_or(path))
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened.
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileReadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads the host name of the machine whose root filesystem is at `rootfs`.
///
/// Falls back to `proc/sys/kernel/hostname` if `etc/hostname` is missing.
///
/// # Errors
///
/// Returns a [`FileReadError`] for the fallback if neither file can be read.
pub fn read_hostname(rootfs: impl AsRef<Path>) -> Result<String, FileReadError> {
    let rootfs = rootfs.as_ref();
    let read = |path: &str| {
        let path = host_path(rootfs, path);
        std::fs::read_to_string(&path)
            .map(|hostname| hostname.trim().to_owned())
            .map_err(|source| FileReadError { path, source })
    };
    read("/etc/hostname").or_else(|_| read("/proc/sys/kernel/hostname"))
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_host_path() {
        assert_eq!(
            host_path("/", "/etc/os-release"),
            PathBuf::from("/etc/os-release")
        );
        assert_eq!(
            host_path("/rootfs", "etc/hostname"),
            PathBuf::from("/rootfs/etc/hostname")
        );
    }

    #[test]
    fn test_open_file_reader_error() {
        let result = open_file_reader("/definitely/does/not/exist");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_hostname() {
        let rootfs = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::create_dir(rootfs.path().join("etc")).unwrap();
        std::fs::write(rootfs.path().join("etc/hostname"), "docker-host-01\n").unwrap();

        assert_eq!(read_hostname(rootfs.path()).unwrap(), "docker-host-01");
    }

    #[test]
    fn test_read_missing_hostname() {
        let rootfs = tempfile::tempdir().expect("failed to create temp dir");
        let err = read_hostname(rootfs.path()).unwrap_err();
        assert_eq!(err.path, rootfs.path().join("proc/sys/kernel/hostname"));
    }
}
