// Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use stratus::config::StratusConfig;
use stratus::{
    CommandResult, CommandRunner, CommandSpec, OperationError, ProcessHandle, ResourceFacade,
};

/// Replays queued outcomes instead of spawning processes. Once the queue is
/// drained every `run` succeeds with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: Mutex<VecDeque<Result<CommandResult, OperationError>>>,
    runs: Mutex<Vec<CommandSpec>>,
    launches: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_stdout(&self, stdout: &str) {
        self.push(Ok(CommandResult::with_stdout(stdout)));
    }

    pub fn push(&self, outcome: Result<CommandResult, OperationError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn runs(&self) -> Vec<CommandSpec> {
        self.runs.lock().unwrap().clone()
    }

    pub fn launches(&self) -> Vec<CommandSpec> {
        self.launches.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> usize {
        self.runs.lock().unwrap().len() + self.launches.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandResult, OperationError> {
        self.runs.lock().unwrap().push(spec);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandResult::with_stdout("")))
    }

    async fn launch(&self, spec: CommandSpec) -> Result<ProcessHandle, OperationError> {
        let handle = ProcessHandle::new(spec.program.clone(), Some(4242));
        self.launches.lock().unwrap().push(spec);
        Ok(handle)
    }
}

pub fn facade_with(runner: &Arc<ScriptedRunner>) -> ResourceFacade {
    ResourceFacade::new(StratusConfig::default(), runner.clone())
}

pub const DOCKER_PS: &str = "\
CONTAINER ID   IMAGE          COMMAND                  CREATED       STATUS                   PORTS     NAMES
abc123def456   nginx:latest   \"/docker-entrypoint.…\"   2 hours ago   Up 2 hours               80/tcp    web
0f1e2d3c4b5a   redis:7        \"docker-entrypoint.s…\"   3 days ago    Exited (0) 2 days ago              cache
";

pub const DOCKER_PS_AFTER_STOP: &str = "\
CONTAINER ID   IMAGE     COMMAND                  CREATED      STATUS                  PORTS     NAMES
0f1e2d3c4b5a   redis:7   \"docker-entrypoint.s…\"   3 days ago   Exited (0) 2 days ago             cache
";

pub const DOCKER_IMAGES: &str = "\
REPOSITORY   TAG       IMAGE ID       CREATED       SIZE
nginx        latest    605c77e624dd   2 weeks ago   141MB
redis        7         7614ae9453d1   3 weeks ago   113MB
";

pub const VIRSH_LIST: &str = " Id   Name       State
-----------------------------
 1    web        running
 -    database   shut off
";
