//! Host memory and disk snapshot

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

use crate::error::{Result, WatchdogError};

/// Host-level usage numbers, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub memory_used: u64,
    pub memory_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
}

impl ResourceSnapshot {
    /// e.g. `3.2G/8G`
    pub fn memory_display(&self) -> String {
        format!("{}/{}", format_bytes(self.memory_used), format_bytes(self.memory_total))
    }

    /// e.g. `40G/100G`
    pub fn disk_display(&self) -> String {
        format!("{}/{}", format_bytes(self.disk_used), format_bytes(self.disk_total))
    }
}

/// Source of host resource figures
#[async_trait::async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn snapshot(&self) -> Result<ResourceSnapshot>;
}

/// `sysinfo`-backed probe
pub struct SysinfoResources {
    disk_mount: PathBuf,
}

impl SysinfoResources {
    pub fn new(disk_mount: impl Into<PathBuf>) -> Self {
        Self {
            disk_mount: disk_mount.into(),
        }
    }
}

#[async_trait::async_trait]
impl ResourceProbe for SysinfoResources {
    async fn snapshot(&self) -> Result<ResourceSnapshot> {
        let mut sys = System::new();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64, u64)> = disks
            .list()
            .iter()
            .map(|d| (d.mount_point().to_path_buf(), d.total_space(), d.available_space()))
            .collect();

        let (total, available) = select_disk(&mounts, &self.disk_mount).ok_or_else(|| {
            WatchdogError::Parse(format!("no filesystem found for {}", self.disk_mount.display()))
        })?;

        Ok(ResourceSnapshot {
            memory_used: sys.used_memory(),
            memory_total: sys.total_memory(),
            disk_used: total.saturating_sub(available),
            disk_total: total,
        })
    }
}

/// Host name, or "unknown"
pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// Pick the filesystem that holds `target`: the mount point that is the
/// longest prefix of it. Returns `(total, available)`.
fn select_disk(mounts: &[(PathBuf, u64, u64)], target: &Path) -> Option<(u64, u64)> {
    mounts
        .iter()
        .filter(|(mount, _, _)| target.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(_, total, avail)| (*total, *avail))
}

/// Compact binary-unit formatting in the style of `df -h`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        return format!("{}B", bytes);
    }

    let rendered = if value < 10.0 {
        let s = format!("{:.1}", value);
        s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
    } else {
        format!("{:.0}", value)
    };
    format!("{}{}", rendered, UNITS[unit])
}
