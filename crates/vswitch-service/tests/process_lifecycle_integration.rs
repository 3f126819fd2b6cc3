#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;
use vswitch_backend::{ManagedProcess, Operation, ProcessError};
use vswitch_core::VersionCatalog;
use vswitch_service::{
    ExecutableProcess, ServiceControl, ServiceManagerKind, ServiceProcess, ServiceState,
};

const FAKE_SYSTEMCTL: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
state="$dir/$2.state"
case "$1" in
  is-active)
    if [ -f "$state" ]; then cat "$state"; else echo inactive; fi
    ;;
  start|stop)
    if [ -f "$dir/$2.fail-$1" ]; then
      echo "Job for $2.service failed." >&2
      exit 1
    fi
    if [ "$1" = start ]; then echo active > "$state"; else echo inactive > "$state"; fi
    ;;
  *)
    exit 2
    ;;
esac
"#;

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).expect("write script");
    let mut perms = std::fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).expect("make script executable");
}

fn fake_service(dir: &Path) -> ServiceProcess {
    let program = dir.join("systemctl");
    write_script(&program, FAKE_SYSTEMCTL);
    let control = ServiceControl::new(ServiceManagerKind::Systemctl, program);
    ServiceProcess::new("Apache", "apache2", control)
        .with_timeout(Duration::from_secs(2))
        .with_poll_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn service_stop_after_start_reports_not_running() {
    let temp_dir = tempdir().expect("create temp dir");
    let service = fake_service(temp_dir.path());

    service.start().await.expect("start succeeds");
    assert!(service.is_running().await.expect("query succeeds"));

    service.stop().await.expect("stop succeeds");
    assert!(!service.is_running().await.expect("query succeeds"));
}

#[tokio::test]
async fn service_stop_failure_names_operation_and_process() {
    let temp_dir = tempdir().expect("create temp dir");
    let service = fake_service(temp_dir.path());
    service.start().await.expect("start succeeds");
    std::fs::write(temp_dir.path().join("apache2.fail-stop"), "").expect("inject failure");

    let result = service.stop().await;

    assert!(matches!(
        result,
        Err(ProcessError::Operation {
            operation: Operation::Stop,
            ref name,
            ref details,
        }) if name == "Apache" && details.contains("failed")
    ));
    assert!(service.is_running().await.expect("query succeeds"));
}

#[tokio::test]
async fn service_restart_runs_stop_then_start() {
    let temp_dir = tempdir().expect("create temp dir");
    let service = fake_service(temp_dir.path());
    service.start().await.expect("start succeeds");
    std::fs::write(temp_dir.path().join("apache2.fail-start"), "").expect("inject failure");

    let result = service.restart().await;

    assert!(matches!(
        result,
        Err(ProcessError::Operation {
            operation: Operation::Restart,
            ref details,
            ..
        }) if details.starts_with("start failed")
    ));
    assert!(!service.is_running().await.expect("query succeeds"));
}

#[tokio::test]
async fn service_start_times_out_when_state_never_changes() {
    let temp_dir = tempdir().expect("create temp dir");
    let program = temp_dir.path().join("systemctl");
    write_script(
        &program,
        "#!/bin/sh\ncase \"$1\" in is-active) echo activating ;; esac\n",
    );
    let control = ServiceControl::new(ServiceManagerKind::Systemctl, program);
    assert_eq!(
        control.query("nginx").await,
        Ok(ServiceState::Transitioning)
    );
    let service = ServiceProcess::new("nginx", "nginx", control)
        .with_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(20));

    let result = service.start().await;

    assert!(matches!(
        result,
        Err(ProcessError::Operation {
            operation: Operation::Start,
            ref details,
            ..
        }) if details.starts_with("timed out")
    ));
}

#[tokio::test]
async fn service_query_failure_is_query_error() {
    let temp_dir = tempdir().expect("create temp dir");
    let control = ServiceControl::new(
        ServiceManagerKind::Systemctl,
        temp_dir.path().join("does-not-exist"),
    );
    let service = ServiceProcess::new("Apache", "apache2", control);

    let result = service.is_running().await;

    assert!(matches!(result, Err(ProcessError::Query { ref name, .. }) if name == "Apache"));
}

fn seed_version(root: &Path, version: &str) {
    let dir = root.join(version);
    std::fs::create_dir_all(&dir).expect("create version dir");
    write_script(
        &dir.join("php-cgi"),
        &format!(
            "#!/bin/sh\necho {version} >> \"$1\"\n\
             trap 'kill $child; exit 0' TERM\n\
             sleep 30 &\nchild=$!\nwait $child\n"
        ),
    );
}

fn cgi_process(root: &Path, pid_dir: &Path, log: &Path) -> ExecutableProcess {
    let catalog = VersionCatalog::with_pointer_file(root.to_path_buf());
    ExecutableProcess::new("PHP CGI", catalog, "php-cgi", pid_dir)
        .with_args(vec![log.display().to_string()])
        .with_timeout(Duration::from_secs(5))
}

async fn wait_for_line_count(log: &Path, count: usize) -> Vec<String> {
    for _ in 0..50 {
        let lines: Vec<String> = std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect();
        if lines.len() >= count {
            return lines;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never reached {count} lines", log.display());
}

#[tokio::test]
async fn executable_restart_picks_up_version_switch() {
    let temp_dir = tempdir().expect("create temp dir");
    let root = temp_dir.path().join("php");
    let pid_dir = temp_dir.path().join("pids");
    let log = temp_dir.path().join("launches.log");
    seed_version(&root, "8.1.27");
    seed_version(&root, "8.2.15");

    let catalog = VersionCatalog::with_pointer_file(root.clone());
    catalog
        .switch_to(&"8.1.27".parse().expect("version parses"))
        .await
        .expect("initial switch");

    let process = cgi_process(&root, &pid_dir, &log);
    process.start().await.expect("start succeeds");
    assert!(process.is_running().await.expect("query succeeds"));
    assert_eq!(wait_for_line_count(&log, 1).await, vec!["8.1.27"]);

    catalog
        .switch_to(&"8.2.15".parse().expect("version parses"))
        .await
        .expect("switch succeeds");
    process.restart().await.expect("restart succeeds");

    assert!(process.is_running().await.expect("query succeeds"));
    assert_eq!(
        wait_for_line_count(&log, 2).await,
        vec!["8.1.27", "8.2.15"]
    );

    process.stop().await.expect("stop succeeds");
    assert!(!process.is_running().await.expect("query succeeds"));
    assert!(!process.pid_file().exists());
}

#[tokio::test]
async fn executable_start_twice_fails_with_start_error() {
    let temp_dir = tempdir().expect("create temp dir");
    let root = temp_dir.path().join("php");
    let log = temp_dir.path().join("launches.log");
    seed_version(&root, "8.3.0");
    VersionCatalog::with_pointer_file(root.clone())
        .switch_to(&"8.3.0".parse().expect("version parses"))
        .await
        .expect("switch succeeds");

    let process = cgi_process(&root, &temp_dir.path().join("pids"), &log);
    process.start().await.expect("first start succeeds");

    let second = process.start().await;

    assert!(matches!(
        second,
        Err(ProcessError::Operation {
            operation: Operation::Start,
            ref name,
            ..
        }) if name == "PHP CGI"
    ));
    process.stop().await.expect("stop succeeds");
}

#[tokio::test]
async fn executable_ignores_pid_file_naming_unrelated_process() {
    let temp_dir = tempdir().expect("create temp dir");
    let root = temp_dir.path().join("php");
    let pid_dir = temp_dir.path().join("pids");
    seed_version(&root, "8.3.0");
    VersionCatalog::with_pointer_file(root.clone())
        .switch_to(&"8.3.0".parse().expect("version parses"))
        .await
        .expect("switch succeeds");

    let mut unrelated = tokio::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn unrelated process");
    let pid = unrelated.id().expect("unrelated pid");
    let process = cgi_process(&root, &pid_dir, &temp_dir.path().join("launches.log"));
    std::fs::create_dir_all(&pid_dir).expect("create pid dir");
    std::fs::write(
        process.pid_file(),
        format!("{pid}\n{}\n", root.join("8.3.0").join("php-cgi").display()),
    )
    .expect("write stale pid file");

    assert!(!process.is_running().await.expect("query succeeds"));
    process.stop().await.expect("stop succeeds");

    assert!(!process.pid_file().exists());
    assert!(
        unrelated.try_wait().expect("poll unrelated process").is_none(),
        "unrelated process must survive stop"
    );
    unrelated.kill().await.expect("kill unrelated process");
}
