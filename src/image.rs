use crate::{
    OperationError, Result,
    config::StratusConfig,
    log_debug, log_info,
    parser::{self, Listing},
    resource::ImageRecord,
    runner::{CommandResult, CommandRunner, CommandSpec},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ImageManager {
    runner: Arc<dyn CommandRunner>,
    config: Arc<StratusConfig>,
}

fn validate_image_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(OperationError::invalid("image name must not be empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(OperationError::invalid(format!(
            "image name '{}' must not contain whitespace",
            name
        )));
    }
    Ok(name)
}

/// Directory a Dockerfile is built from: its parent, or `.` for a bare name.
pub fn build_context(dockerfile: &Path) -> PathBuf {
    match dockerfile.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ImageManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<StratusConfig>) -> Self {
        Self { runner, config }
    }

    fn engine(&self) -> CommandSpec {
        CommandSpec::new(&self.config.tools.container_engine)
            .timeout(self.config.timeouts.default_timeout())
    }

    pub async fn list_images(&self) -> Result<Listing<ImageRecord>> {
        let output = self.runner.run(self.engine().arg("images")).await?;
        parser::parse_image_list(&output.stdout)
    }

    /// Build `image_name` from `dockerfile`, using its directory as context.
    ///
    /// Runs under the build timeout, which is disabled by default.
    pub async fn build_image(&self, dockerfile: &Path, image_name: &str) -> Result<CommandResult> {
        if dockerfile.as_os_str().is_empty() {
            return Err(OperationError::invalid("Dockerfile path must not be empty"));
        }
        let image_name = validate_image_name(image_name)?;
        if !dockerfile.is_file() {
            return Err(OperationError::not_found(format!(
                "Dockerfile '{}'",
                dockerfile.display()
            )));
        }

        let context = build_context(dockerfile);
        let spec = self
            .engine()
            .args(["build", "-t", image_name, "-f"])
            .arg(dockerfile.to_string_lossy())
            .arg(context.to_string_lossy())
            .timeout(self.config.timeouts.build_timeout());

        log_info!("Building image {} from {}", image_name, dockerfile.display());
        let output = self.runner.run(spec).await?;
        log_debug!("Build of {} finished in {:?}", image_name, output.elapsed);
        Ok(output)
    }

    pub async fn pull_image(&self, image_name: &str) -> Result<CommandResult> {
        let image_name = validate_image_name(image_name)?;

        log_info!("Pulling image: {}", image_name);
        let spec = self
            .engine()
            .args(["pull", image_name])
            .timeout(self.config.timeouts.pull_timeout());
        self.runner.run(spec).await
    }

    /// Local images matching `image_name`; an empty listing means "not
    /// present locally", not an error.
    pub async fn search_local_image(&self, image_name: &str) -> Result<Listing<ImageRecord>> {
        let image_name = validate_image_name(image_name)?;

        let output = self
            .runner
            .run(self.engine().args(["images", image_name]))
            .await?;
        if output.stdout.trim().is_empty() {
            return Ok(Listing::default());
        }
        parser::parse_image_list(&output.stdout)
    }
}
