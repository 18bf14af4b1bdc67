use crate::{
    OperationError, Result,
    config::StratusConfig,
    log_info, log_warn,
    parser::{self, Listing},
    resource::ContainerRecord,
    runner::{CommandRunner, CommandSpec},
};
use std::sync::Arc;

pub struct ContainerManager {
    runner: Arc<dyn CommandRunner>,
    config: Arc<StratusConfig>,
}

impl ContainerManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<StratusConfig>) -> Self {
        Self { runner, config }
    }

    fn engine(&self) -> CommandSpec {
        CommandSpec::new(&self.config.tools.container_engine)
            .timeout(self.config.timeouts.default_timeout())
    }

    /// All containers, stopped ones included.
    pub async fn list_containers(&self) -> Result<Listing<ContainerRecord>> {
        let output = self.runner.run(self.engine().args(["ps", "-a"])).await?;
        parser::parse_container_list(&output.stdout)
    }

    pub async fn stop_container(&self, id_or_name: &str) -> Result<()> {
        let id_or_name = id_or_name.trim();
        if id_or_name.is_empty() {
            return Err(OperationError::invalid("container id or name must not be empty"));
        }

        log_info!("Stopping container: {}", id_or_name);
        self.runner
            .run(self.engine().args(["stop", id_or_name]))
            .await?;
        Ok(())
    }

    /// Stop a container picked from an earlier listing.
    ///
    /// The identifier is resolved against a fresh listing first, so a
    /// container removed since the caller's snapshot is reported as
    /// [`OperationError::ResourceNotFound`] instead of being acted on blindly.
    pub async fn stop_listed_container(&self, id_or_name: &str) -> Result<ContainerRecord> {
        let needle = id_or_name.trim();
        if needle.is_empty() {
            return Err(OperationError::invalid("container id or name must not be empty"));
        }

        let listing = self.list_containers().await?;
        let mut matches = listing.iter().filter(|c| c.matches(needle));
        let Some(record) = matches.next().cloned() else {
            log_warn!("Container '{}' is no longer present", needle);
            return Err(OperationError::not_found(format!("Container '{}'", needle)));
        };
        if matches.next().is_some() {
            return Err(OperationError::invalid(format!(
                "'{}' matches more than one container",
                needle
            )));
        }

        self.stop_container(&record.id).await?;
        Ok(record)
    }
}
