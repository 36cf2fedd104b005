//! Host CPU and memory utilisation read from procfs below the host root.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use crate::fsutil::{self, FileReadError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] FileReadError),
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing `{field}` in `{path}`")]
    MissingField { path: PathBuf, field: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Aggregate CPU time counters of the `cpu` line in `/proc/stat`, in jiffies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub system: u64,
    /// Idle plus iowait.
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Parses the aggregate `cpu` line. Returns `None` if there is none.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Option<Self>> {
        for line in buf.lines() {
            let line = line?;
            let mut fields = line.split_ascii_whitespace();
            if fields.next() != Some("cpu") {
                continue;
            }
            // user nice system idle iowait irq softirq steal guest guest_nice
            let mut values = [0u64; 10];
            for (slot, field) in values.iter_mut().zip(fields) {
                *slot = field.parse().unwrap_or_default();
            }
            let [user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice] =
                values;
            return Ok(Some(Self {
                user,
                system,
                idle: idle + iowait,
                total: user
                    + nice
                    + system
                    + idle
                    + iowait
                    + irq
                    + softirq
                    + steal
                    + guest
                    + guest_nice,
            }));
        }
        Ok(None)
    }
}

/// CPU usage in percent between two samples as `(total, user, system)`.
///
/// Every value is clamped to `0..=100`; no elapsed time yields zeros.
pub fn cpu_percentages(before: &CpuTimes, after: &CpuTimes) -> (f64, f64, f64) {
    let total = after.total.saturating_sub(before.total) as f64;
    if total <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let share = |delta: u64| (delta as f64 / total * 100.0).clamp(0.0, 100.0);
    let idle = after.idle.saturating_sub(before.idle) as f64;
    (
        ((1.0 - idle / total) * 100.0).clamp(0.0, 100.0),
        share(after.user.saturating_sub(before.user)),
        share(after.system.saturating_sub(before.system)),
    )
}

/// Memory figures of `/proc/meminfo` in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kib: u64,
    pub available_kib: u64,
}

impl MemInfo {
    /// Parses `MemTotal` and `MemAvailable`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading from `buf` fails.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<(Option<u64>, Option<u64>)> {
        let mut total = None;
        let mut available = None;
        for line in buf.lines() {
            let line = line?;
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let value = rest
                .split_ascii_whitespace()
                .next()
                .and_then(|v| v.parse().ok());
            match key {
                "MemTotal" => total = value,
                "MemAvailable" => available = value,
                _ => {}
            }
        }
        Ok((total, available))
    }

    /// Used memory in percent of the total.
    pub fn used_percent(&self) -> f64 {
        if self.total_kib == 0 {
            return 0.0;
        }
        let used = self.total_kib.saturating_sub(self.available_kib);
        used as f64 / self.total_kib as f64 * 100.0
    }
}

/// Host utilisation served on `/api/usage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostUsage {
    pub cpu_percent: f64,
    pub cpu_percent_user: f64,
    pub cpu_percent_system: f64,
    pub mem_percent: f64,
}

/// Samples host utilisation from the procfs mounted below `rootfs`.
#[derive(Debug, Clone)]
pub struct UsageSampler {
    rootfs: PathBuf,
    interval: Duration,
}

impl UsageSampler {
    /// Time between the two `/proc/stat` reads of a CPU measurement.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Measures CPU usage over the sampling interval and reads memory usage.
    ///
    /// A part that cannot be read is logged and reported as zero.
    pub async fn sample(&self) -> HostUsage {
        let mut usage = HostUsage::default();

        match self.cpu_times() {
            Ok(before) => {
                tokio::time::sleep(self.interval).await;
                match self.cpu_times() {
                    Ok(after) => {
                        let (total, user, system) = cpu_percentages(&before, &after);
                        usage.cpu_percent = total;
                        usage.cpu_percent_user = user;
                        usage.cpu_percent_system = system;
                    }
                    Err(err) => log::error!("failed to read cpu usage: {err}"),
                }
            }
            Err(err) => log::error!("failed to read cpu usage: {err}"),
        }

        match self.mem_info() {
            Ok(mem) => usage.mem_percent = mem.used_percent(),
            Err(err) => log::error!("failed to read memory usage: {err}"),
        }

        usage
    }

    fn cpu_times(&self) -> Result<CpuTimes> {
        let path = fsutil::host_path(&self.rootfs, "/proc/stat");
        let mut reader = fsutil::open_file_reader(&path)?;
        CpuTimes::from_reader(&mut reader)
            .map_err(|source| Error::Read {
                path: path.clone(),
                source,
            })?
            .ok_or(Error::MissingField { path, field: "cpu" })
    }

    fn mem_info(&self) -> Result<MemInfo> {
        let path = fsutil::host_path(&self.rootfs, "/proc/meminfo");
        let mut reader = fsutil::open_file_reader(&path)?;
        let (total, available) = MemInfo::from_reader(&mut reader).map_err(|source| {
            Error::Read {
                path: path.clone(),
                source,
            }
        })?;
        let total_kib = total.ok_or_else(|| Error::MissingField {
            path: path.clone(),
            field: "MemTotal",
        })?;
        let available_kib = available.ok_or(Error::MissingField {
            path,
            field: "MemAvailable",
        })?;
        Ok(MemInfo {
            total_kib,
            available_kib,
        })
    }
}
