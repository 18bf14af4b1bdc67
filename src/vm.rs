use crate::{
    OperationError, Result,
    config::StratusConfig,
    disk::DiskSpec,
    log_debug, log_info,
    parser::{self, Listing},
    resource::VmRecord,
    runner::{CommandRunner, CommandSpec, ProcessHandle},
};
use std::path::PathBuf;
use std::sync::Arc;

/// Parameters of a VM launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRequest {
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub disk: DiskSpec,
    /// Optional `-name` for the guest.
    pub name: Option<String>,
}

impl VmRequest {
    pub fn new(cpu_count: u32, memory_mb: u64, disk: impl Into<PathBuf>) -> Self {
        Self {
            cpu_count,
            memory_mb,
            disk: DiskSpec::from_path(disk),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build a request from free-text form fields.
    pub fn from_form(cpu_count: &str, memory_mb: &str, disk: &str) -> Result<Self> {
        let cpu_count = parse_positive::<u32>(cpu_count, "CPU count")?;
        let memory_mb = parse_positive::<u64>(memory_mb, "memory (MB)")?;
        Ok(Self::new(cpu_count, memory_mb, disk.trim()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpu_count == 0 {
            return Err(OperationError::invalid("CPU count must be a positive integer"));
        }
        if self.memory_mb == 0 {
            return Err(OperationError::invalid("memory (MB) must be a positive integer"));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() || name.contains(',') {
                return Err(OperationError::invalid(
                    "VM name must be non-empty and must not contain ','",
                ));
            }
        }
        Ok(())
    }
}

fn parse_positive<T>(value: &str, what: &str) -> Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(OperationError::invalid(format!(
            "{} must be a positive integer, got '{}'",
            what, value
        ))),
    }
}

pub struct VmManager {
    runner: Arc<dyn CommandRunner>,
    config: Arc<StratusConfig>,
}

impl VmManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<StratusConfig>) -> Self {
        Self { runner, config }
    }

    /// Launcher command line for `request`, without validation.
    pub fn launch_spec(&self, request: &VmRequest) -> CommandSpec {
        let vm = &self.config.vm;
        let mut spec = CommandSpec::new(&self.config.tools.launcher);

        if let Some(name) = &request.name {
            spec = spec.args(["-name", name.as_str()]);
        }

        spec = spec
            .args(["-smp".to_string(), request.cpu_count.to_string()])
            .args(["-m".to_string(), request.memory_mb.to_string()])
            .args(["-drive".to_string(), request.disk.drive_arg()])
            .args(["-vga", vm.vga.as_str()]);

        for net in &vm.network {
            spec = spec.args(["-net", net.as_str()]);
        }

        spec.args(vm.extra_args.iter().cloned()).timeout(None)
    }

    /// Start a VM and return as soon as the launcher process exists.
    ///
    /// Success means the process started, not that the guest booted.
    pub async fn create_vm(&self, request: &VmRequest) -> Result<ProcessHandle> {
        request.validate()?;
        request.disk.ensure_exists()?;

        let spec = self.launch_spec(request);
        log_debug!("Launcher command: {}", spec.command_line());

        let handle = self.runner.launch(spec).await?;
        log_info!(
            "VM on {} launched (handle {}, pid {:?})",
            request.disk.path.display(),
            handle.id,
            handle.pid
        );
        Ok(handle)
    }

    /// Domains known to the virtualization lister, in every state.
    pub async fn list_vms(&self) -> Result<Listing<VmRecord>> {
        let mut spec = CommandSpec::new(&self.config.tools.lister);
        if let Some(uri) = &self.config.tools.lister_uri {
            spec = spec.args(["-c", uri.as_str()]);
        }
        let spec = spec
            .args(["list", "--all"])
            .timeout(self.config.timeouts.default_timeout());

        let output = self.runner.run(spec).await?;
        parser::parse_vm_list(&output.stdout)
    }

    /// Bare launcher processes currently running on this host.
    pub async fn list_running_vms(&self) -> Result<Listing<VmRecord>> {
        let spec = CommandSpec::new(&self.config.tools.process_table)
            .args(["-eo", "pid=,args="])
            .timeout(self.config.timeouts.default_timeout());

        let output = self.runner.run(spec).await?;
        parser::parse_qemu_processes(&output.stdout, &self.config.tools.launcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn form_fields_must_be_positive_integers() {
        for (cpu, mem) in [("two", "1024"), ("2", "1GB"), ("0", "1024"), ("2", "0"), ("-1", "512"), ("", "")] {
            let err = VmRequest::from_form(cpu, mem, "/vm/a.qcow2").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "cpu={cpu:?} mem={mem:?}");
        }

        let request = VmRequest::from_form(" 4 ", "2048", "/vm/a.qcow2").unwrap();
        assert_eq!(request.cpu_count, 4);
        assert_eq!(request.memory_mb, 2048);
    }

    #[test]
    fn zero_values_fail_validation() {
        assert!(VmRequest::new(0, 512, "/vm/a.img").validate().is_err());
        assert!(VmRequest::new(1, 0, "/vm/a.img").validate().is_err());
        assert!(VmRequest::new(1, 512, "/vm/a.img").with_name("a,b").validate().is_err());
        assert!(VmRequest::new(1, 512, "/vm/a.img").validate().is_ok());
    }
}
