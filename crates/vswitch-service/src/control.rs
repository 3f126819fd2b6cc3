use std::path::PathBuf;

use log::{debug, error, info, trace};
use tokio::process::Command;

use vswitch_platform::HideWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManagerKind {
    /// Windows service control manager through `sc.exe`.
    Sc,
    /// systemd through `systemctl`.
    Systemctl,
}

impl ServiceManagerKind {
    #[must_use]
    pub fn native() -> Self {
        if cfg!(windows) { Self::Sc } else { Self::Systemctl }
    }

    #[must_use]
    pub fn program_name(self) -> &'static str {
        match self {
            Self::Sc => "sc.exe",
            Self::Systemctl => "systemctl",
        }
    }

    fn query_verb(self) -> &'static str {
        match self {
            Self::Sc => "query",
            Self::Systemctl => "is-active",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
    /// Starting, stopping, or paused.
    Transitioning,
}

/// Host service-control primitive: query, start and stop a service by name.
#[derive(Debug, Clone)]
pub struct ServiceControl {
    kind: ServiceManagerKind,
    program: PathBuf,
}

impl ServiceControl {
    #[must_use]
    pub fn new(kind: ServiceManagerKind, program: PathBuf) -> Self {
        Self { kind, program }
    }

    /// Locate the native service-control program on `PATH`.
    #[must_use]
    pub fn detect() -> Option<Self> {
        let kind = ServiceManagerKind::native();
        match which::which(kind.program_name()) {
            Ok(program) => {
                debug!("Found {} at {}", kind.program_name(), program.display());
                Some(Self::new(kind, program))
            }
            Err(e) => {
                debug!("{} not found: {e}", kind.program_name());
                None
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> ServiceManagerKind {
        self.kind
    }

    fn build_command(&self, args: &[&str]) -> Command {
        debug!(
            "Building service command: {} {}",
            self.program.display(),
            args.join(" ")
        );
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.hide_window();
        cmd
    }

    /// Query the current state of `service`.
    ///
    /// # Errors
    /// Returns a description of the failure if the program cannot be run or
    /// its output is not understood (for example an unknown service).
    pub async fn query(&self, service: &str) -> Result<ServiceState, String> {
        let output = self
            .build_command(&[self.kind.query_verb(), service])
            .output()
            .await
            .map_err(|e| format!("{}: {e}", self.program.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("{} query stdout: {stdout}", self.kind.program_name());

        let state = match self.kind {
            ServiceManagerKind::Sc => parse_sc_state(&stdout),
            ServiceManagerKind::Systemctl => parse_systemctl_state(&stdout),
        };

        state.ok_or_else(|| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let details = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            format!("unrecognized state for {service}: {details}")
        })
    }

    /// Ask the service manager to start `service`. Returns once the request
    /// was accepted, not once the service is running.
    ///
    /// # Errors
    /// Returns the tool's error output if the request is rejected.
    pub async fn start(&self, service: &str) -> Result<(), String> {
        self.execute(&["start", service]).await
    }

    /// Ask the service manager to stop `service`.
    ///
    /// # Errors
    /// Returns the tool's error output if the request is rejected.
    pub async fn stop(&self, service: &str) -> Result<(), String> {
        self.execute(&["stop", service]).await
    }

    async fn execute(&self, args: &[&str]) -> Result<(), String> {
        info!(
            "Executing {} {}",
            self.kind.program_name(),
            args.join(" ")
        );

        let output = self
            .build_command(args)
            .output()
            .await
            .map_err(|e| format!("{}: {e}", self.program.display()))?;

        debug!("Service command exit status: {:?}", output.status);
        if output.status.success() {
            return Ok(());
        }

        // sc.exe reports failures on stdout.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let details = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        error!("Service command failed: args={args:?}, output='{details}'");
        Err(if details.is_empty() {
            format!("exited with {}", output.status)
        } else {
            details
        })
    }
}

fn parse_sc_state(output: &str) -> Option<ServiceState> {
    let line = output
        .lines()
        .find(|line| line.trim_start().starts_with("STATE"))?;
    let code: u32 = line
        .split_once(':')?
        .1
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;

    Some(match code {
        1 => ServiceState::Stopped,
        4 => ServiceState::Running,
        _ => ServiceState::Transitioning,
    })
}

fn parse_systemctl_state(output: &str) -> Option<ServiceState> {
    match output.lines().next()?.trim() {
        "active" | "reloading" => Some(ServiceState::Running),
        "inactive" | "failed" => Some(ServiceState::Stopped),
        "activating" | "deactivating" | "maintenance" | "refreshing" => {
            Some(ServiceState::Transitioning)
        }
        _ => None,
    }
}
