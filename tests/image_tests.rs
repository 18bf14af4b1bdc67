// Integration tests for image listing, building, pulling and searching
mod common;

use common::{DOCKER_IMAGES, ScriptedRunner, facade_with};
use std::path::Path;
use std::time::Duration;
use stratus::ErrorKind;
use stratus::config::StratusConfig;
use stratus::ResourceFacade;
use tempfile::TempDir;

#[tokio::test]
async fn test_list_images() {
    let runner = ScriptedRunner::new();
    runner.push_stdout(DOCKER_IMAGES);
    let facade = facade_with(&runner);

    let listing = facade.images.list_images().await.unwrap();
    let refs: Vec<_> = listing.iter().map(|i| i.reference()).collect();
    assert_eq!(refs, vec!["nginx:latest", "redis:7"]);
    assert_eq!(listing.records[0].id, "605c77e624dd");
}

#[tokio::test]
async fn test_build_uses_tag_dockerfile_and_its_directory() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dockerfile = temp_dir.path().join("Dockerfile");
    std::fs::write(&dockerfile, "FROM alpine:3.19\n").unwrap();

    let runner = ScriptedRunner::new();
    runner.push_stdout("Successfully tagged myapp:latest\n");
    let facade = facade_with(&runner);

    let output = facade.images.build_image(&dockerfile, "myapp:latest").await.unwrap();
    assert!(output.stdout.contains("myapp:latest"));

    let runs = runner.runs();
    assert_eq!(runs.len(), 1);
    let spec = &runs[0];
    assert_eq!(spec.program, "docker");
    let line = spec.command_line();
    assert!(line.contains("-t myapp:latest"));
    assert!(line.contains(&format!("-f {}", dockerfile.display())));
    assert_eq!(
        spec.args.last().map(String::as_str),
        Some(temp_dir.path().to_str().unwrap())
    );
    assert_eq!(spec.timeout, None, "builds are not timed out by default");
}

#[tokio::test]
async fn test_build_rejects_missing_dockerfile_and_bad_names() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dockerfile = temp_dir.path().join("Dockerfile");

    let runner = ScriptedRunner::new();
    let facade = facade_with(&runner);

    let err = facade
        .images
        .build_image(&dockerfile, "myapp")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);

    std::fs::write(&dockerfile, "FROM alpine\n").unwrap();
    let err = facade.images.build_image(&dockerfile, "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = facade
        .images
        .build_image(Path::new(""), "myapp")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(runner.spawned(), 0);
}

#[tokio::test]
async fn test_pull_uses_configured_timeout() {
    let mut config = StratusConfig::default();
    config.timeouts.pull_secs = 5;

    let runner = ScriptedRunner::new();
    let facade = ResourceFacade::new(config, runner.clone());

    facade.images.pull_image("alpine:3.19").await.unwrap();

    let runs = runner.runs();
    assert_eq!(runs[0].args, vec!["pull", "alpine:3.19"]);
    assert_eq!(runs[0].timeout, Some(Duration::from_secs(5)));
}

#[tokio::test]
async fn test_search_local_image() {
    let runner = ScriptedRunner::new();
    runner.push_stdout(
        "REPOSITORY   TAG       IMAGE ID       CREATED       SIZE\n\
         nginx        latest    605c77e624dd   2 weeks ago   141MB\n",
    );
    runner.push_stdout("REPOSITORY   TAG       IMAGE ID       CREATED   SIZE\n");
    runner.push_stdout("");
    let facade = facade_with(&runner);

    let found = facade.images.search_local_image("nginx").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(runner.runs()[0].args, vec!["images", "nginx"]);

    assert!(facade.images.search_local_image("ghost").await.unwrap().is_empty());
    assert!(facade.images.search_local_image("ghost").await.unwrap().is_empty());
}
