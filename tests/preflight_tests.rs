// Integration tests for tool preflight and facade wiring
mod common;

use common::{ScriptedRunner, facade_with};
use stratus::config::StratusConfig;
use stratus::preflight::ToolAvailability;
use stratus::{CommandResult, OperationError, ResourceFacade};

#[tokio::test]
async fn test_preflight_reports_every_tool() {
    let runner = ScriptedRunner::new();
    runner.push_stdout("QEMU emulator version 8.2.0\n");
    runner.push_stdout("qemu-img version 8.2.0\n");
    runner.push(Err(OperationError::ToolNotFound {
        tool: "virsh".into(),
    }));
    runner.push_stdout("Docker version 24.0.7, build afdd53b\n");
    runner.push(Ok(CommandResult {
        exit_code: 0,
        stdout: String::new(),
        stderr: "ps from procps-ng 4.0.4\n".into(),
        elapsed: Default::default(),
    }));
    let facade = facade_with(&runner);

    let summary = facade.preflight().await;
    assert_eq!(summary.tools.len(), 5);
    assert!(!summary.is_ready());
    assert_eq!(summary.issues.len(), 1);
    assert!(summary.issues[0].contains("virsh"));

    assert_eq!(
        summary.tools[0].availability,
        ToolAvailability::Available {
            version: "QEMU emulator version 8.2.0".into()
        }
    );
    assert_eq!(summary.tools[2].availability, ToolAvailability::Missing);
    assert_eq!(
        summary.tools[4].availability,
        ToolAvailability::Available {
            version: "ps from procps-ng 4.0.4".into()
        }
    );

    let runs = runner.runs();
    assert_eq!(runs[0].args, vec!["--version"]);
    assert_eq!(runs[4].args, vec!["-V"]);
}

#[tokio::test]
async fn test_facade_uses_configured_tool_names() {
    let config = StratusConfig::from_str(
        r#"
[tools]
container_engine = "podman"
lister_uri = "qemu:///system"
"#,
    )
    .unwrap();

    let runner = ScriptedRunner::new();
    let facade = ResourceFacade::new(config, runner.clone());
    assert_eq!(facade.config().tools.container_engine, "podman");

    facade.containers.list_containers().await.unwrap();
    facade.vms.list_vms().await.unwrap();

    let runs = runner.runs();
    assert_eq!(runs[0].program, "podman");
    assert_eq!(runs[1].program, "virsh");
    assert_eq!(runs[1].args, vec!["-c", "qemu:///system", "list", "--all"]);
}
