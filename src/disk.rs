use crate::{
    OperationError, Result,
    config::{DiskFormat, StratusConfig, parse_size_to_bytes},
    log_debug, log_info,
    runner::{CommandRunner, CommandSpec},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A virtual disk file handed to the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskSpec {
    pub path: PathBuf,
    pub format: DiskFormat,
    /// Only known for disks created through [`DiskManager::create_disk`].
    pub size_bytes: Option<u64>,
}

impl DiskSpec {
    /// Describe an existing disk; the format follows the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DiskFormat::from_path(&path);
        Self {
            path,
            format,
            size_bytes: None,
        }
    }

    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(OperationError::invalid("disk path must not be empty"));
        }
        if !self.path.is_file() {
            return Err(OperationError::not_found(format!(
                "Disk image '{}'",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// The `-drive` value for the launcher. Commas in the path are doubled,
    /// which is how QEMU escapes them inside an option string.
    pub fn drive_arg(&self) -> String {
        let path = self.path.to_string_lossy().replace(',', ",,");
        format!("file={},format={}", path, self.format.as_str())
    }
}

/// Creates disk images with the configured disk utility.
pub struct DiskManager {
    runner: Arc<dyn CommandRunner>,
    config: Arc<StratusConfig>,
}

impl DiskManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<StratusConfig>) -> Self {
        Self { runner, config }
    }

    /// Create a new disk file of `size` (e.g. "20G"; a bare number is GiB).
    ///
    /// Refuses to overwrite an existing file. The format must agree with the
    /// extension, since [`DiskSpec::from_path`] re-infers it at launch. An
    /// extensionless path gets the extension of `format` (or of the
    /// configured default) appended; the returned spec carries the final path.
    pub async fn create_disk(
        &self,
        path: &Path,
        size: &str,
        format: Option<DiskFormat>,
    ) -> Result<DiskSpec> {
        if path.as_os_str().is_empty() {
            return Err(OperationError::invalid("disk path must not be empty"));
        }

        let size_bytes = parse_size_to_bytes(size)
            .filter(|bytes| *bytes > 0)
            .ok_or_else(|| {
                OperationError::invalid(format!("disk size '{}' is not a positive size", size))
            })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(OperationError::not_found(format!(
                    "Directory '{}'",
                    parent.display()
                )));
            }
        }

        let (path, format) = match path.extension() {
            Some(_) => {
                let inferred = DiskFormat::from_path(path);
                match format {
                    Some(requested) if requested != inferred => {
                        return Err(OperationError::invalid(format!(
                            "format {} does not match '{}'; use a .{} file name",
                            requested.as_str(),
                            path.display(),
                            requested.extension()
                        )));
                    }
                    _ => (path.to_path_buf(), inferred),
                }
            }
            None => {
                let format = format.unwrap_or(self.config.disk.default_format);
                (path.with_extension(format.extension()), format)
            }
        };

        if path.exists() {
            return Err(OperationError::invalid(format!(
                "'{}' already exists",
                path.display()
            )));
        }

        log_info!(
            "Creating disk {} (format={}, bytes={})",
            path.display(),
            format.as_str(),
            size_bytes
        );

        let spec = CommandSpec::new(&self.config.tools.disk_utility)
            .args(["create", "-f", format.as_str()])
            .arg(path.to_string_lossy())
            .arg(size_bytes.to_string())
            .timeout(self.config.timeouts.default_timeout());

        self.runner.run(spec).await?;
        log_debug!("Disk created at {}", path.display());

        Ok(DiskSpec {
            path,
            format,
            size_bytes: Some(size_bytes),
        })
    }
}
