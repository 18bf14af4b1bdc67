//! Typed snapshots of the resources the external tools report on.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VmState {
    Running,
    Paused,
    ShutOff,
    Unknown,
}

impl VmState {
    /// Classify a state column as printed by `virsh list`.
    pub fn from_virsh(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" | "idle" | "blocked" => VmState::Running,
            "paused" | "pmsuspended" => VmState::Paused,
            "shut off" | "shutoff" => VmState::ShutOff,
            _ => VmState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VmState::Running => "running",
            VmState::Paused => "paused",
            VmState::ShutOff => "shut-off",
            VmState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmRecord {
    /// Domain id, or the launcher's pid for bare QEMU processes. `None` for
    /// domains that are defined but not running.
    pub id: Option<String>,
    pub name: String,
    pub state: VmState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub repository: String,
    pub tag: String,
    pub id: String,
}

impl ImageRecord {
    /// `repository:tag`, the form accepted by `docker run` and `docker pull`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerState {
    Running,
    Exited,
    Paused,
    Restarting,
    Created,
    Dead,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub image: String,
    /// Status column exactly as the engine printed it, e.g. "Up 3 hours".
    pub status: String,
    pub name: String,
}

impl ContainerRecord {
    pub fn state(&self) -> ContainerState {
        let status = self.status.to_lowercase();
        // "Up 2 minutes (Paused)" is paused, not running.
        if status.contains("paused") {
            ContainerState::Paused
        } else if status.starts_with("up") || status.contains("running") {
            ContainerState::Running
        } else if status.starts_with("exited") {
            ContainerState::Exited
        } else if status.starts_with("restarting") {
            ContainerState::Restarting
        } else if status.starts_with("created") {
            ContainerState::Created
        } else if status.starts_with("dead") {
            ContainerState::Dead
        } else {
            ContainerState::Unknown
        }
    }

    /// Whether `needle` names this container: full id, id prefix or name.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return false;
        }
        // `docker ps` prints 12-char ids; callers may hold the full 64-char one.
        self.id.starts_with(needle) || needle.starts_with(&self.id) || self.name == needle
    }
}
