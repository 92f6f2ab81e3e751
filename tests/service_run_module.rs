use inkmill::{DocumentRef, ExportArea, ExportFormat, ExportSpec, MillConfig, MillError, RunRequest, Service};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

/// Stub engine that honors `export-filename:` inside `--actions=` the way
/// the real engine would, then exits 0.
const EXPORTING_ENGINE: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --actions=*) acts="${arg#--actions=}" ;;
  esac
done
out=$(printf '%s' "$acts" | tr ';' '\n' | sed -n 's/^export-filename://p')
if [ -n "$out" ]; then printf 'PNGDATA' > "$out"; fi
exit 0
"#;

fn service(dir: &Path, engine_body: &str) -> Service {
    let bin = dir.join("stub-engine");
    write_script(&bin, engine_body);
    let config = MillConfig::new(dir.join("ws"))
        .expect("config")
        .with_engine_binary(bin.display().to_string());
    Service::new(config).expect("service")
}

fn run_request(doc: DocumentRef, actions: &[&str]) -> RunRequest {
    RunRequest {
        doc,
        actions: actions.iter().map(|a| a.to_string()).collect(),
        export: None,
        timeout_s: Some(5),
    }
}

fn workspace_file_names(service: &Service) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(service.workspace().root())
        .expect("read_dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn inline_run_without_export_succeeds_and_leaves_nothing_behind() {
    let dir = tempdir().expect("tempdir");
    let service = service(dir.path(), "#!/bin/sh\nexit 0\n");

    let outcome = service
        .run_actions(run_request(DocumentRef::inline("<svg/>"), &["select-all"]))
        .await
        .expect("run");
    assert!(outcome.ok);
    assert_eq!(outcome.out, None);
    assert!(workspace_file_names(&service).is_empty(), "inline temp leaked");
}

#[tokio::test]
async fn export_is_published_atomically_at_the_destination() {
    let dir = tempdir().expect("tempdir");
    let service = service(dir.path(), EXPORTING_ENGINE);

    let mut request = run_request(DocumentRef::inline("<svg/>"), &["select-all"]);
    request.export = Some(ExportSpec {
        format: ExportFormat::Png,
        out: "nested/out.png".to_string(),
        dpi: Some(300),
        area: ExportArea::Page,
    });

    let outcome = service.run_actions(request).await.expect("run");
    assert!(outcome.ok);
    let out = outcome.out.expect("destination path");
    let final_path = service.workspace().root().join("nested/out.png");
    assert_eq!(out, final_path.display().to_string());
    assert_eq!(fs::read_to_string(&final_path).expect("read"), "PNGDATA");

    // neither the inline temp nor the temporary export survives
    for entry in fs::read_dir(final_path.parent().expect("parent")).expect("read_dir") {
        let name = entry.expect("entry").file_name().to_string_lossy().into_owned();
        assert!(!name.contains(".tmp-"), "leftover temp artifact {name}");
    }
    assert!(!workspace_file_names(&service)
        .iter()
        .any(|name| name.starts_with("inline-")));
}

#[tokio::test]
async fn unsafe_action_is_rejected_before_any_spawn() {
    let dir = tempdir().expect("tempdir");
    let service = service(
        dir.path(),
        "#!/bin/sh\ntouch engine-was-invoked\nexit 0\n",
    );

    let err = service
        .run_actions(run_request(DocumentRef::inline("<svg/>"), &["file-open"]))
        .await
        .expect_err("unsafe");
    match err {
        MillError::UnsafeAction { action } => assert_eq!(action, "file-open"),
        other => panic!("expected UnsafeAction, got {other:?}"),
    }
    assert!(!service.workspace().root().join("engine-was-invoked").exists());
    assert!(workspace_file_names(&service).is_empty(), "no temp input either");
}

#[tokio::test]
async fn unsafe_action_is_rejected_even_while_the_gate_is_saturated() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("stub-engine");
    write_script(&bin, "#!/bin/sh\nsleep 2\nexit 0\n");
    let config = MillConfig::new(dir.path().join("ws"))
        .expect("config")
        .with_engine_binary(bin.display().to_string())
        .with_max_concurrent(1);
    let service = std::sync::Arc::new(Service::new(config).expect("service"));

    let slow = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .run_actions(run_request(DocumentRef::inline("<svg/>"), &["select-all"]))
                .await
        })
    };
    // let the slow request claim the only slot
    tokio::time::sleep(Duration::from_millis(200)).await;

    let rejected = tokio::time::timeout(
        Duration::from_millis(200),
        service.run_actions(run_request(DocumentRef::inline("<svg/>"), &["file-open"])),
    )
    .await
    .expect("must not wait on the gate");
    assert!(matches!(rejected, Err(MillError::UnsafeAction { .. })));

    slow.await.expect("join").expect("slow run");
}

#[tokio::test]
async fn timeout_returns_timeout_and_releases_the_slot() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("stub-engine");
    write_script(&bin, "#!/bin/sh\necho $$ > pid\nsleep 30\n");
    let config = MillConfig::new(dir.path().join("ws"))
        .expect("config")
        .with_engine_binary(bin.display().to_string())
        .with_max_concurrent(1);
    let service = Service::new(config).expect("service");

    let mut request = run_request(DocumentRef::inline("<svg/>"), &[]);
    request.timeout_s = Some(1);
    let err = service.run_actions(request).await.expect_err("timeout");
    assert!(matches!(err, MillError::Timeout { timeout_s: 1 }));

    let pid: u32 = fs::read_to_string(service.workspace().root().join("pid"))
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let alive = std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    assert!(!alive, "engine survived the teardown");

    // the single slot was released: a fast run goes straight through
    fs::remove_file(service.workspace().root().join("pid")).expect("cleanup pid");
    write_script(&bin, "#!/bin/sh\nexit 0\n");
    let outcome = service
        .run_actions(run_request(DocumentRef::inline("<svg/>"), &[]))
        .await
        .expect("slot free");
    assert!(outcome.ok);
}

#[tokio::test]
async fn same_file_requests_serialize_and_distinct_files_overlap() {
    let dir = tempdir().expect("tempdir");
    let service = std::sync::Arc::new(service(
        dir.path(),
        "#!/bin/sh\necho start >> windows.log\nsleep 0.3\necho end >> windows.log\nexit 0\n",
    ));
    fs::write(service.workspace().root().join("a.svg"), "<svg/>").expect("write");
    fs::write(service.workspace().root().join("b.svg"), "<svg/>").expect("write");

    let (first, second) = tokio::join!(
        service.run_actions(run_request(DocumentRef::file("a.svg"), &[])),
        service.run_actions(run_request(DocumentRef::file("a.svg"), &[])),
    );
    first.expect("first");
    second.expect("second");
    let log_path = service.workspace().root().join("windows.log");
    let log = fs::read_to_string(&log_path).expect("log");
    assert_eq!(
        log.lines().collect::<Vec<_>>(),
        vec!["start", "end", "start", "end"],
        "same-file runs overlapped: {log}"
    );

    fs::remove_file(&log_path).expect("reset log");
    let (first, second) = tokio::join!(
        service.run_actions(run_request(DocumentRef::file("a.svg"), &[])),
        service.run_actions(run_request(DocumentRef::file("b.svg"), &[])),
    );
    first.expect("first");
    second.expect("second");
    let log = fs::read_to_string(&log_path).expect("log");
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines[..2].to_vec(), vec!["start", "start"], "distinct files serialized: {log}");
}

#[tokio::test]
async fn export_claimed_but_not_produced_is_a_hard_error() {
    let dir = tempdir().expect("tempdir");
    let service = service(dir.path(), "#!/bin/sh\nexit 0\n");

    let mut request = run_request(DocumentRef::inline("<svg/>"), &[]);
    request.export = Some(ExportSpec {
        format: ExportFormat::Png,
        out: "out.png".to_string(),
        dpi: None,
        area: ExportArea::Page,
    });
    let err = service.run_actions(request).await.expect_err("no artifact");
    assert!(matches!(err, MillError::ExportMissing { .. }));
    assert!(!service.workspace().root().join("out.png").exists());
}

#[tokio::test]
async fn export_destination_outside_the_workspace_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let service = service(
        dir.path(),
        "#!/bin/sh\ntouch engine-was-invoked\nexit 0\n",
    );

    let mut request = run_request(DocumentRef::inline("<svg/>"), &[]);
    request.export = Some(ExportSpec {
        format: ExportFormat::Png,
        out: "../escape.png".to_string(),
        dpi: None,
        area: ExportArea::Page,
    });
    let err = service.run_actions(request).await.expect_err("escape");
    assert!(matches!(err, MillError::PathEscape { .. }));
    assert!(!service.workspace().root().join("engine-was-invoked").exists());
    assert!(!dir.path().join("escape.png").exists());
    assert!(workspace_file_names(&service).is_empty(), "inline temp leaked");
}

#[tokio::test]
async fn engine_stderr_reaches_the_caller_on_failure() {
    let dir = tempdir().expect("tempdir");
    let service = service(dir.path(), "#!/bin/sh\necho 'render exploded' 1>&2\nexit 3\n");

    let err = service
        .run_actions(run_request(DocumentRef::inline("<svg/>"), &["select-all"]))
        .await
        .expect_err("failure");
    match err {
        MillError::ExecutionFailed { detail } => {
            assert!(detail.contains("code 3"), "{detail}");
            assert!(detail.contains("render exploded"), "{detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(workspace_file_names(&service).is_empty(), "inline temp leaked");
}

#[tokio::test]
async fn list_actions_is_idempotent() {
    let dir = tempdir().expect("tempdir");
    let service = service(
        dir.path(),
        "#!/bin/sh\necho 'select-all : Select everything'\necho 'export-do : Run the export'\nexit 0\n",
    );

    let first = service.list_actions().await.expect("first listing");
    let second = service.list_actions().await.expect("second listing");
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].id, "select-all");
    assert_eq!(first, second);
}

#[tokio::test]
async fn list_actions_failure_is_execution_failed() {
    let dir = tempdir().expect("tempdir");
    let service = service(dir.path(), "#!/bin/sh\nexit 2\n");

    let err = service.list_actions().await.expect_err("failure");
    assert!(matches!(err, MillError::ExecutionFailed { .. }));
}

#[tokio::test]
async fn caller_timeout_overrides_the_default() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("stub-engine");
    write_script(&bin, "#!/bin/sh\nsleep 30\n");
    let config = MillConfig::new(dir.path().join("ws"))
        .expect("config")
        .with_engine_binary(bin.display().to_string())
        .with_timeout_default(Duration::from_secs(600));
    let service = Service::new(config).expect("service");

    let start = Instant::now();
    let mut request = run_request(DocumentRef::inline("<svg/>"), &[]);
    request.timeout_s = Some(1);
    let err = service.run_actions(request).await.expect_err("timeout");
    assert!(matches!(err, MillError::Timeout { timeout_s: 1 }));
    assert!(start.elapsed() < Duration::from_secs(10));
}
