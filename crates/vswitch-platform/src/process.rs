//! Liveness checks and termination of processes by pid, via the host's
//! process tools.

use std::io;

use log::{debug, trace};
use tokio::process::Command;

use crate::commands::HideWindow;

/// Report whether `pid` refers to a live process.
///
/// On unix a zombie counts as exited.
///
/// # Errors
/// Returns an error if the process tool cannot be launched.
pub async fn is_pid_alive(pid: u32) -> io::Result<bool> {
    #[cfg(unix)]
    {
        let output = Command::new("ps")
            .args(["-o", "stat=", "-p", &pid.to_string()])
            .hide_window()
            .output()
            .await?;
        let stat = String::from_utf8_lossy(&output.stdout);
        trace!("ps stat for {pid}: {:?}", stat.trim());
        Ok(output.status.success() && parse_unix_stat_alive(&stat))
    }

    #[cfg(windows)]
    {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/FO", "CSV", "/NH"])
            .hide_window()
            .output()
            .await?;
        let listing = String::from_utf8_lossy(&output.stdout);
        trace!("tasklist for {pid}: {}", listing.trim());
        Ok(output.status.success() && parse_tasklist_alive(&listing, pid))
    }
}

/// Terminate `pid`. A pid that is already gone is not an error.
///
/// # Errors
/// Returns an error if the termination tool cannot be launched or reports a
/// failure for a process that is still alive.
pub async fn terminate_pid(pid: u32) -> io::Result<()> {
    debug!("Terminating pid {pid}");

    #[cfg(unix)]
    let output = Command::new("kill")
        .arg(pid.to_string())
        .hide_window()
        .output()
        .await?;

    #[cfg(windows)]
    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .hide_window()
        .output()
        .await?;

    if output.status.success() || !is_pid_alive(pid).await? {
        Ok(())
    } else {
        Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

/// Command line of `pid`, or `None` if no such process exists.
///
/// # Errors
/// Returns an error if the process tool cannot be launched.
pub async fn pid_command_line(pid: u32) -> io::Result<Option<String>> {
    #[cfg(unix)]
    {
        let output = Command::new("ps")
            .args(["-o", "args=", "-p", &pid.to_string()])
            .hide_window()
            .output()
            .await?;
        let args = String::from_utf8_lossy(&output.stdout);
        trace!("ps args for {pid}: {:?}", args.trim());
        let args = args.trim();
        Ok((output.status.success() && !args.is_empty()).then(|| args.to_string()))
    }

    #[cfg(windows)]
    {
        let output = Command::new("wmic")
            .args([
                "process",
                "where",
                &format!("ProcessId={pid}"),
                "get",
                "CommandLine",
                "/value",
            ])
            .hide_window()
            .output()
            .await?;
        let listing = String::from_utf8_lossy(&output.stdout);
        trace!("wmic command line for {pid}: {}", listing.trim());
        Ok(parse_wmic_command_line(&listing))
    }
}

#[cfg(any(windows, test))]
fn parse_wmic_command_line(listing: &str) -> Option<String> {
    listing
        .lines()
        .find_map(|line| line.trim().strip_prefix("CommandLine="))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(any(unix, test))]
fn parse_unix_stat_alive(stat: &str) -> bool {
    let stat = stat.trim();
    !stat.is_empty() && !stat.starts_with('Z')
}

#[cfg(any(windows, test))]
fn parse_tasklist_alive(listing: &str, pid: u32) -> bool {
    let needle = format!("\"{pid}\"");
    listing.lines().any(|line| line.contains(&needle))
}
