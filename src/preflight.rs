use crate::{
    OperationError, config::StratusConfig, log_info,
    runner::{CommandRunner, CommandSpec},
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ToolAvailability {
    Available { version: String },
    Missing,
    Failing { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub role: &'static str,
    pub program: String,
    pub availability: ToolAvailability,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        matches!(self.availability, ToolAvailability::Available { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreflightSummary {
    pub tools: Vec<ToolStatus>,
    pub issues: Vec<String>,
}

impl PreflightSummary {
    pub fn is_ready(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for PreflightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stratus Preflight Summary")?;
        writeln!(f, "\nTools:")?;
        for tool in &self.tools {
            let state = match &tool.availability {
                ToolAvailability::Available { version } => format!("available ({})", version),
                ToolAvailability::Missing => "missing".to_string(),
                ToolAvailability::Failing { message } => format!("failing: {}", message),
            };
            writeln!(f, "  - {} [{}]: {}", tool.program, tool.role, state)?;
        }
        if self.issues.is_empty() {
            writeln!(f, "\nAll tools available")
        } else {
            writeln!(f, "\nIssues:")?;
            for issue in &self.issues {
                writeln!(f, "  - {}", issue)?;
            }
            Ok(())
        }
    }
}

/// Run `<tool> --version` for every configured tool. Never fails as a whole.
pub async fn run_preflight(runner: &dyn CommandRunner, config: &StratusConfig) -> PreflightSummary {
    log_info!("Running preflight checks");

    let tools = &config.tools;
    let roles = [
        ("launcher", &tools.launcher),
        ("disk utility", &tools.disk_utility),
        ("lister", &tools.lister),
        ("container engine", &tools.container_engine),
        ("process table", &tools.process_table),
    ];

    let mut statuses = Vec::with_capacity(roles.len());
    for (role, program) in roles {
        statuses.push(probe_tool(runner, role, program).await);
    }

    let issues = statuses
        .iter()
        .filter(|tool| !tool.is_available())
        .map(|tool| match &tool.availability {
            ToolAvailability::Missing => {
                format!("{} ({}) missing from PATH", tool.program, tool.role)
            }
            _ => format!("{} ({}) is installed but not working", tool.program, tool.role),
        })
        .collect();

    PreflightSummary {
        tools: statuses,
        issues,
    }
}

async fn probe_tool(runner: &dyn CommandRunner, role: &'static str, program: &str) -> ToolStatus {
    // procps `ps` has no --version on every platform; `-V` works for it.
    let flag = if role == "process table" { "-V" } else { "--version" };
    let spec = CommandSpec::new(program).arg(flag).timeout(Some(PROBE_TIMEOUT));

    let availability = match runner.run(spec).await {
        Ok(output) => ToolAvailability::Available {
            version: output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("unknown version")
                .to_string(),
        },
        Err(OperationError::ToolNotFound { .. }) => ToolAvailability::Missing,
        Err(err) => ToolAvailability::Failing {
            message: err.to_string(),
        },
    };

    ToolStatus {
        role,
        program: program.to_string(),
        availability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_readable_summary() {
        let summary = PreflightSummary {
            tools: vec![
                ToolStatus {
                    role: "container engine",
                    program: "docker".into(),
                    availability: ToolAvailability::Available {
                        version: "Docker version 24.0.7".into(),
                    },
                },
                ToolStatus {
                    role: "lister",
                    program: "virsh".into(),
                    availability: ToolAvailability::Missing,
                },
            ],
            issues: vec!["virsh (lister) missing from PATH".into()],
        };

        let printed = summary.to_string();
        assert!(printed.contains("docker [container engine]: available (Docker version 24.0.7)"));
        assert!(printed.contains("virsh [lister]: missing"));
        assert!(printed.contains("virsh (lister) missing from PATH"));
        assert!(!summary.is_ready());
    }
}
