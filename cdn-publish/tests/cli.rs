use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs::write;
use tempfile::tempdir;

const CDN_ENV: [&str; 6] = [
    "CDN_CONFIG",
    "CDN_STORAGE_ACCESS_KEY",
    "CDN_STORAGE_ZONE_NAME",
    "CDN_STORAGE_BASE_URL",
    "CDN_ACCESS_KEY",
    "CDN_API_BASE_URL",
];

/// The binary with every CDN_* variable removed from its environment.
fn cdn_publish() -> Command {
    let mut cmd = Command::cargo_bin("cdn-publish").expect("Binary exists");
    for var in CDN_ENV {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_and_version_exit_zero() {
    cdn_publish()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("publish"));
    cdn_publish().arg("--version").assert().success();
}

#[test]
fn argument_errors_exit_one() {
    cdn_publish().arg("unknown").assert().code(1);
    cdn_publish()
        .args(["upload", "-k", "key", "-s", "zone", "a.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--dest"));
}

#[test]
fn missing_access_key_exits_one() {
    cdn_publish()
        .args(["list", "-s", "zone", "dir"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing storage access key"));
}

#[test]
fn unauthorized_response_prints_access_key_hint() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/zone/dir/");
        then.status(401)
            .header("content-type", "application/json")
            .body(r#"{"HttpCode":401,"Message":"Unauthorized"}"#);
    });

    cdn_publish()
        .args(["list", "-k", "wrong", "-s", "zone", "-u", &server.base_url(), "dir"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "HTTP response returned UNAUTHORIZED",
        ));
}

#[test]
fn upload_happy_flow_prints_destination() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/zone/assets/site/index.html")
            .header("accesskey", "key");
        then.status(201)
            .header("content-type", "application/json")
            .body(r#"{"HttpCode":201,"Message":"File uploaded."}"#);
    });

    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("site")).unwrap();
    write(dir.path().join("site/index.html"), b"<html></html>").unwrap();

    cdn_publish()
        .current_dir(dir.path())
        .args([
            "upload",
            "-k",
            "key",
            "-s",
            "zone",
            "-u",
            &server.base_url(),
            "-d",
            "assets",
            "site",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Path: ./assets"));

    put.assert();
}

#[test]
fn options_can_come_from_environment_and_config_file() {
    let server = MockServer::start();
    let listing = server.mock(|when, then| {
        when.method(GET)
            .path("/from-file/docs/")
            .header("accesskey", "env-key");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"[{"ObjectName":"guide.md","IsDirectory":false,"Path":"/from-file/docs/"}]"#);
    });

    let dir = tempdir().unwrap();
    let config = dir.path().join("cdn.yaml");
    write(
        &config,
        format!(
            "storage:\n  access_key: file-key\n  zone_name: from-file\n  base_url: {}\n",
            server.base_url()
        ),
    )
    .unwrap();

    cdn_publish()
        .env("CDN_STORAGE_ACCESS_KEY", "env-key")
        .args(["--config", config.to_str().unwrap(), "list", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("guide.md"));

    listing.assert();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use cdn_publish::cli::{run_with, Cli, Commands, StorageArgs};
    use cdn_publish_core::report::MemoryReporter;

    // Built directly so no CDN_* variable can supply credentials: the command fails
    // before any request, after the trace event.
    let cli = Cli {
        config: None,
        command: Commands::List {
            storage: StorageArgs::default(),
            dir: "dir".to_string(),
        },
    };
    let dir = tempdir().unwrap();
    let result = run_with(
        cli,
        dir.path().to_path_buf(),
        Arc::new(MemoryReporter::default()),
    )
    .await;
    assert!(result.is_err(), "no credentials were supplied");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
