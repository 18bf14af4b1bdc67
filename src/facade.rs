//! Single entry point bundling every resource operation.

use crate::{
    config::StratusConfig,
    container::ContainerManager,
    disk::DiskManager,
    image::ImageManager,
    preflight::{self, PreflightSummary},
    runner::{CommandRunner, SystemRunner},
    vm::VmManager,
};
use std::sync::Arc;

/// Holds no state beyond the runner and configuration; every listing call
/// re-runs its tool.
pub struct ResourceFacade {
    pub vms: VmManager,
    pub disks: DiskManager,
    pub containers: ContainerManager,
    pub images: ImageManager,
    runner: Arc<dyn CommandRunner>,
    config: Arc<StratusConfig>,
}

impl ResourceFacade {
    pub fn new(config: StratusConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let config = Arc::new(config);
        Self {
            vms: VmManager::new(runner.clone(), config.clone()),
            disks: DiskManager::new(runner.clone(), config.clone()),
            containers: ContainerManager::new(runner.clone(), config.clone()),
            images: ImageManager::new(runner.clone(), config.clone()),
            runner,
            config,
        }
    }

    /// Facade over the real tools found through `PATH`.
    pub fn system(config: StratusConfig) -> Self {
        Self::new(config, Arc::new(SystemRunner::new()))
    }

    pub fn config(&self) -> &StratusConfig {
        &self.config
    }

    pub async fn preflight(&self) -> PreflightSummary {
        preflight::run_preflight(self.runner.as_ref(), &self.config).await
    }
}
