use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;

use vswitch_backend::{ManagedProcess, Operation, ProcessError};
use vswitch_core::VersionCatalog;
use vswitch_platform::{HideWindow, is_pid_alive, pid_command_line, terminate_pid};

const STARTUP_GRACE: Duration = Duration::from_millis(200);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An executable shipped inside each version directory, such as `php-cgi`.
///
/// The binary is resolved against the active version when started, so a
/// version switch between `stop` and `start` launches the new build. The pid
/// of the launched process and the program it runs are kept in a pid file;
/// nothing is held in memory. A recorded pid only counts while its command
/// line still names that program.
///
/// Starting while already running fails. Stopping while stopped succeeds.
#[derive(Debug, Clone)]
pub struct ExecutableProcess {
    name: String,
    group: String,
    catalog: VersionCatalog,
    relative_path: PathBuf,
    args: Vec<String>,
    pid_file: PathBuf,
    restart_on_version_change: bool,
    timeout: Duration,
}

impl ExecutableProcess {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        catalog: VersionCatalog,
        relative_path: impl Into<PathBuf>,
        pid_dir: &Path,
    ) -> Self {
        let name = name.into();
        let pid_file = pid_dir.join(format!("{}.pid", pid_file_stem(&name)));
        Self {
            name,
            group: "Executables".to_string(),
            catalog,
            relative_path: relative_path.into(),
            args: Vec::new(),
            pid_file,
            restart_on_version_change: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    #[must_use]
    pub fn with_restart_on_version_change(mut self, restart: bool) -> Self {
        self.restart_on_version_change = restart;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn failure(&self, operation: Operation, details: impl std::fmt::Display) -> ProcessError {
        ProcessError::operation(operation, &self.name, details)
    }

    async fn remove_pid_file(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.pid_file).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Pid of the running instance. A pid file whose process has exited, or
    /// whose pid now belongs to another program, is removed.
    async fn live_pid(&self) -> io::Result<Option<u32>> {
        let content = match tokio::fs::read_to_string(&self.pid_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(record) = PidRecord::parse(&content) else {
            warn!(
                "Discarding malformed pid file {}: {:?}",
                self.pid_file.display(),
                content.trim()
            );
            self.remove_pid_file().await?;
            return Ok(None);
        };

        if is_pid_alive(record.pid).await? {
            match pid_command_line(record.pid).await? {
                Some(command_line) if record.runs(&command_line) => return Ok(Some(record.pid)),
                Some(command_line) => warn!(
                    "pid {} of {} now runs {command_line:?}",
                    record.pid, self.name
                ),
                None => {}
            }
        }

        debug!("Discarding stale pid file {}", self.pid_file.display());
        self.remove_pid_file().await?;
        Ok(None)
    }

    async fn executable_path(&self) -> Result<(PathBuf, PathBuf), ProcessError> {
        let dir = self
            .catalog
            .active_dir()
            .await
            .map_err(|e| self.failure(Operation::Start, e))?
            .ok_or_else(|| self.failure(Operation::Start, "no active version is set"))?;
        Ok((dir.join(&self.relative_path), dir))
    }

    async fn wait_until_exited(&self, pid: u32) -> Result<(), ProcessError> {
        let wait = async {
            loop {
                match is_pid_alive(pid).await {
                    Ok(false) => return Ok(()),
                    Ok(true) => tokio::time::sleep(POLL_INTERVAL).await,
                    Err(e) => return Err(self.failure(Operation::Stop, e)),
                }
            }
        };

        tokio::time::timeout(self.timeout, wait)
            .await
            .unwrap_or_else(|_| {
                Err(self.failure(
                    Operation::Stop,
                    format!("pid {pid} still alive after {}s", self.timeout.as_secs()),
                ))
            })
    }
}

/// Contents of a pid file: the pid on the first line, the launched program on
/// the second.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PidRecord {
    pid: u32,
    program: String,
}

impl PidRecord {
    fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines().map(str::trim);
        let pid = lines.next()?.parse().ok()?;
        let program = lines.next().filter(|p| !p.is_empty())?.to_string();
        Some(Self { pid, program })
    }

    fn runs(&self, command_line: &str) -> bool {
        command_line
            .to_lowercase()
            .contains(&self.program.to_lowercase())
    }
}

impl std::fmt::Display for PidRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.pid)?;
        writeln!(f, "{}", self.program)
    }
}

fn pid_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[async_trait]
impl ManagedProcess for ExecutableProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn group_name(&self) -> &str {
        &self.group
    }

    fn restart_on_version_change(&self) -> bool {
        self.restart_on_version_change
    }

    async fn is_running(&self) -> Result<bool, ProcessError> {
        self.live_pid()
            .await
            .map(|pid| pid.is_some())
            .map_err(|e| ProcessError::query(&self.name, e))
    }

    async fn start(&self) -> Result<(), ProcessError> {
        if let Some(pid) = self
            .live_pid()
            .await
            .map_err(|e| self.failure(Operation::Start, e))?
        {
            return Err(self.failure(Operation::Start, format!("already running as pid {pid}")));
        }

        let (program, working_dir) = self.executable_path().await?;
        info!(
            "Starting {}: {} {}",
            self.name,
            program.display(),
            self.args.join(" ")
        );

        let mut child = Command::new(&program)
            .args(&self.args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .hide_window()
            .spawn()
            .map_err(|e| self.failure(Operation::Start, format!("{}: {e}", program.display())))?;

        let pid = child
            .id()
            .ok_or_else(|| self.failure(Operation::Start, "process exited before reporting a pid"))?;

        if let Ok(status) = tokio::time::timeout(STARTUP_GRACE, child.wait()).await {
            let status = status.map_err(|e| self.failure(Operation::Start, e))?;
            if !status.success() {
                return Err(self.failure(Operation::Start, format!("exited with {status}")));
            }
        }

        if let Some(parent) = self.pid_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failure(Operation::Start, e))?;
        }
        let record = PidRecord {
            pid,
            program: program.display().to_string(),
        };
        tokio::fs::write(&self.pid_file, record.to_string())
            .await
            .map_err(|e| self.failure(Operation::Start, e))?;

        debug!("{} started as pid {pid}", self.name);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        let Some(pid) = self
            .live_pid()
            .await
            .map_err(|e| self.failure(Operation::Stop, e))?
        else {
            debug!("{} is not running", self.name);
            return Ok(());
        };

        info!("Stopping {} (pid {pid})", self.name);
        terminate_pid(pid)
            .await
            .map_err(|e| self.failure(Operation::Stop, e))?;
        self.wait_until_exited(pid).await?;

        self.remove_pid_file()
            .await
            .map_err(|e| self.failure(Operation::Stop, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_is_named_after_process() {
        let catalog = VersionCatalog::with_pointer_file(PathBuf::from("/opt/php"));
        let process = ExecutableProcess::new("PHP CGI", catalog, "php-cgi", Path::new("/run/vswitch"));

        assert_eq!(process.pid_file(), Path::new("/run/vswitch/php-cgi.pid"));
        assert_eq!(process.group_name(), "Executables");
        assert!(process.restart_on_version_change());
    }

    #[tokio::test]
    async fn missing_pid_file_means_not_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let catalog = VersionCatalog::with_pointer_file(dir.path().to_path_buf());
        let process = ExecutableProcess::new("php-cgi", catalog, "php-cgi", dir.path());

        assert!(!process.is_running().await.expect("query succeeds"));
    }

    #[tokio::test]
    async fn malformed_pid_file_means_not_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let catalog = VersionCatalog::with_pointer_file(dir.path().to_path_buf());
        let process = ExecutableProcess::new("php-cgi", catalog, "php-cgi", dir.path());
        std::fs::write(process.pid_file(), "garbage").expect("write pid file");

        assert!(!process.is_running().await.expect("query succeeds"));
    }

    #[test]
    fn pid_record_needs_pid_and_program() {
        let record = PidRecord {
            pid: 4242,
            program: "/opt/php/8.2.15/php-cgi".to_string(),
        };

        assert_eq!(PidRecord::parse(&record.to_string()), Some(record));
        assert_eq!(PidRecord::parse("4242\n"), None);
        assert_eq!(PidRecord::parse("abc\n/opt/php/8.2.15/php-cgi\n"), None);
    }

    #[test]
    fn pid_record_matches_command_line_naming_program() {
        let record = PidRecord::parse("7\nC:\\php\\8.2.15\\php-cgi.exe\n").expect("record parses");

        assert!(record.runs("\"C:\\PHP\\8.2.15\\php-cgi.exe\" -b 127.0.0.1:9000"));
        assert!(!record.runs("notepad.exe"));
    }

    #[tokio::test]
    async fn malformed_pid_file_is_removed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let catalog = VersionCatalog::with_pointer_file(dir.path().to_path_buf());
        let process = ExecutableProcess::new("php-cgi", catalog, "php-cgi", dir.path());
        std::fs::write(process.pid_file(), "4242\n").expect("write pid file");

        assert!(!process.is_running().await.expect("query succeeds"));
        assert!(!process.pid_file().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pid_of_another_program_is_not_trusted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let catalog = VersionCatalog::with_pointer_file(dir.path().to_path_buf());
        let process = ExecutableProcess::new("php-cgi", catalog, "php-cgi", dir.path());
        let record = PidRecord {
            pid: std::process::id(),
            program: dir.path().join("8.2.15/php-cgi").display().to_string(),
        };
        std::fs::write(process.pid_file(), record.to_string()).expect("write pid file");

        assert!(!process.is_running().await.expect("query succeeds"));
        assert!(!process.pid_file().exists());
        process.stop().await.expect("stop is a no-op");
    }

    #[tokio::test]
    async fn start_without_active_version_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let catalog = VersionCatalog::with_pointer_file(dir.path().to_path_buf());
        let process = ExecutableProcess::new("php-cgi", catalog, "php-cgi", dir.path());

        let result = process.start().await;

        assert!(matches!(
            result,
            Err(ProcessError::Operation {
                operation: Operation::Start,
                ref details,
                ..
            }) if details == "no active version is set"
        ));
    }

    #[tokio::test]
    async fn stop_when_not_running_succeeds() {
        let dir = tempfile::tempdir().expect("temp dir");
        let catalog = VersionCatalog::with_pointer_file(dir.path().to_path_buf());
        let process = ExecutableProcess::new("php-cgi", catalog, "php-cgi", dir.path());

        process.stop().await.expect("stop is idempotent");
    }
}
