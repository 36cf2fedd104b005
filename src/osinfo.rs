//! Host operating system identification from `os-release`.

use std::io::BufRead;
use std::path::Path;

use crate::fsutil;

const UNKNOWN: &str = "Unknown";

/// Operating system name and version of the docker host.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OsInfo {
    pub name: String,
    pub version_id: String,
}

impl Default for OsInfo {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_owned(),
            version_id: UNKNOWN.to_owned(),
        }
    }
}

impl OsInfo {
    /// Reads `etc/os-release` below `rootfs`.
    ///
    /// A missing or unreadable file yields [`OsInfo::default`].
    pub fn read(rootfs: impl AsRef<Path>) -> Self {
        let path = fsutil::host_path(rootfs, "/etc/os-release");
        let mut reader = match fsutil::open_file_reader(&path) {
            Ok(reader) => reader,
            Err(err) => {
                log::warn!("{err}");
                return Self::default();
            }
        };
        Self::from_reader(&mut reader).unwrap_or_else(|err| {
            log::warn!("failed to parse `{}`: {}", path.display(), err);
            Self::default()
        })
    }

    /// Parses `KEY=VALUE` lines, picking up `NAME` and `VERSION_ID`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading from `buf` fails.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut info = Self::default();
        for line in buf.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "NAME" => info.name = clean_os_name(value).to_owned(),
                "VERSION_ID" => info.version_id = value.to_owned(),
                _ => {}
            }
        }
        Ok(info)
    }
}

fn clean_os_name(name: &str) -> &str {
    let name = name.strip_suffix(" Linux").unwrap_or(name);
    name.strip_suffix("/Linux").unwrap_or(name)
}
