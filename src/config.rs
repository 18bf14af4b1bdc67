use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StratusConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub vm: VmLaunchConfig,
    #[serde(default)]
    pub disk: DiskConfig,
}

/// Executable names (or paths) of the external tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_launcher")]
    pub launcher: String,
    #[serde(default = "default_disk_utility")]
    pub disk_utility: String,
    #[serde(default = "default_lister")]
    pub lister: String,
    /// Passed to the lister as `-c <uri>`, e.g. `qemu:///system`.
    #[serde(default)]
    pub lister_uri: Option<String>,
    #[serde(default = "default_container_engine")]
    pub container_engine: String,
    #[serde(default = "default_process_table")]
    pub process_table: String,
}

/// Per-class timeouts in seconds. Zero disables the timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_secs: u64,
    #[serde(default)]
    pub build_secs: u64,
    #[serde(default = "default_pull_secs")]
    pub pull_secs: u64,
}

/// Launcher flags fixed by policy rather than by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmLaunchConfig {
    #[serde(default = "default_vga")]
    pub vga: String,
    /// Each entry becomes a `-net <entry>` pair.
    #[serde(default = "default_vm_network")]
    pub network: Vec<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskConfig {
    #[serde(default = "default_disk_format")]
    pub default_format: DiskFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Qcow2,
    Raw,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            disk_utility: default_disk_utility(),
            lister: default_lister(),
            lister_uri: None,
            container_engine: default_container_engine(),
            process_table: default_process_table(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: default_timeout_secs(),
            build_secs: 0,
            pull_secs: default_pull_secs(),
        }
    }
}

impl Default for VmLaunchConfig {
    fn default() -> Self {
        Self {
            vga: default_vga(),
            network: default_vm_network(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            default_format: default_disk_format(),
        }
    }
}

impl Default for DiskFormat {
    fn default() -> Self {
        DiskFormat::Qcow2
    }
}

fn default_launcher() -> String {
    "qemu-system-x86_64".to_string()
}

fn default_disk_utility() -> String {
    "qemu-img".to_string()
}

fn default_lister() -> String {
    "virsh".to_string()
}

fn default_container_engine() -> String {
    "docker".to_string()
}

fn default_process_table() -> String {
    "ps".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pull_secs() -> u64 {
    600
}

fn default_vga() -> String {
    "virtio".to_string()
}

fn default_vm_network() -> Vec<String> {
    vec!["nic".to_string(), "user".to_string()]
}

fn default_disk_format() -> DiskFormat {
    DiskFormat::Qcow2
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.default_secs)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.build_secs)
    }

    pub fn pull_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.pull_secs)
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl DiskFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Raw => "raw",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Raw => "img",
        }
    }

    /// `.qcow2` files are qcow2, anything else is handed to QEMU as raw.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("qcow2") => DiskFormat::Qcow2,
            _ => DiskFormat::Raw,
        }
    }
}

impl StratusConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let config: StratusConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tools = [
            ("launcher", &self.tools.launcher),
            ("disk_utility", &self.tools.disk_utility),
            ("lister", &self.tools.lister),
            ("container_engine", &self.tools.container_engine),
            ("process_table", &self.tools.process_table),
        ];

        for (key, value) in tools {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tools.{} must not be empty",
                    key
                )));
            }
        }

        if self.vm.vga.trim().is_empty() {
            return Err(ConfigError::Invalid("vm.vga must not be empty".to_string()));
        }

        Ok(())
    }

    /// `<config dir>/stratus/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stratus").join("config.toml"))
    }
}

/// Parse a size like "20G", "512M", "10Gi" into bytes.
///
/// A bare number is taken as GiB, matching how disk sizes are typed into
/// the VM form.
pub fn parse_size_to_bytes(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim();

    if size_str.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(n) = size_str.strip_suffix("Gi") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = size_str.strip_suffix("Mi") {
        (n, 1024 * 1024)
    } else if let Some(n) = size_str.strip_suffix('G') {
        (n, 1000 * 1000 * 1000)
    } else if let Some(n) = size_str.strip_suffix('M') {
        (n, 1000 * 1000)
    } else {
        (size_str, 1024 * 1024 * 1024)
    };

    let number: u64 = number_part.trim().parse().ok()?;
    number.checked_mul(multiplier)
}
