use crate::utils::error::{ProvisionError, Result};
use std::path::{Path, PathBuf};

/// 主機探測結果（preflight）
#[derive(Debug, Clone)]
pub struct HostReport {
    pub os: String,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub total_memory_mb: Option<u64>,
    pub free_disk_mb: Option<u64>,
    pub mount_point: Option<PathBuf>,
}

impl HostReport {
    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }

    /// 平台不支援時回傳錯誤；空間不足只產生警告
    pub fn check(&self, min_free_disk_mb: u64) -> Result<Vec<String>> {
        if !self.is_linux() {
            return Err(ProvisionError::UnsupportedPlatform {
                os: self.os.clone(),
            });
        }

        let mut warnings = Vec::new();
        match self.free_disk_mb {
            Some(free) if free < min_free_disk_mb => warnings.push(format!(
                "Only {}MB free on {} (recommended: {}MB)",
                free,
                self.mount_point
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unknown mount".to_string()),
                min_free_disk_mb
            )),
            None => warnings.push("Could not determine free disk space".to_string()),
            _ => {}
        }
        Ok(warnings)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "🖥️ Host: {} {} (kernel {}), Memory: {}MB, Free disk: {}MB",
            self.os_name.as_deref().unwrap_or(&self.os),
            self.os_version.as_deref().unwrap_or("?"),
            self.kernel_version.as_deref().unwrap_or("?"),
            self.total_memory_mb
                .map(|m| m.to_string())
                .unwrap_or_else(|| "?".to_string()),
            self.free_disk_mb
                .map(|m| m.to_string())
                .unwrap_or_else(|| "?".to_string()),
        );
    }
}

/// 從多個掛載點中挑出包含 `target` 的最長者
fn best_mount<'a, I>(target: &Path, mounts: I) -> Option<(PathBuf, u64)>
where
    I: IntoIterator<Item = (&'a Path, u64)>,
{
    mounts
        .into_iter()
        .filter(|(mount, _)| target.starts_with(mount))
        .max_by_key(|(mount, _)| mount.as_os_str().len())
        .map(|(mount, free)| (mount.to_path_buf(), free))
}

#[cfg(feature = "cli")]
pub fn probe_host(project_root: &Path) -> HostReport {
    use sysinfo::{Disks, System};

    let mut system = System::new();
    system.refresh_memory();
    let total_memory = system.total_memory() / 1024 / 1024;

    let target = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let mount = best_mount(
        &target,
        disks
            .list()
            .iter()
            .map(|disk| (disk.mount_point(), disk.available_space())),
    );

    HostReport {
        os: std::env::consts::OS.to_string(),
        os_name: System::name(),
        os_version: System::os_version(),
        kernel_version: System::kernel_version(),
        total_memory_mb: (total_memory > 0).then_some(total_memory),
        free_disk_mb: mount.as_ref().map(|(_, free)| free / 1024 / 1024),
        mount_point: mount.map(|(path, _)| path),
    }
}

// 非 CLI 環境只回報作業系統
#[cfg(not(feature = "cli"))]
pub fn probe_host(_project_root: &Path) -> HostReport {
    HostReport {
        os: std::env::consts::OS.to_string(),
        os_name: None,
        os_version: None,
        kernel_version: None,
        total_memory_mb: None,
        free_disk_mb: None,
        mount_point: None,
    }
}
