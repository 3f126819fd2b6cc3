use async_trait::async_trait;

use crate::error::{Operation, ProcessError};

/// A controllable OS-level process or service.
///
/// Implementations hold configuration only; every state query goes to the
/// live OS.
#[async_trait]
pub trait ManagedProcess: Send + Sync + ManagedProcessClone {
    fn name(&self) -> &str;

    /// Menu group this process is listed under.
    fn group_name(&self) -> &str;

    /// Whether a change of the active version must be followed by a restart.
    fn restart_on_version_change(&self) -> bool;

    /// Query live state. Not running is `Ok(false)`, never an error.
    async fn is_running(&self) -> Result<bool, ProcessError>;

    async fn start(&self) -> Result<(), ProcessError>;

    async fn stop(&self) -> Result<(), ProcessError>;

    /// Stop then start, so that anything read at start time (such as the
    /// active version) is re-read. A failure of either step is reported as a
    /// single restart failure.
    async fn restart(&self) -> Result<(), ProcessError> {
        self.stop()
            .await
            .map_err(|e| restart_failure(self.name(), Operation::Stop, &e))?;
        self.start()
            .await
            .map_err(|e| restart_failure(self.name(), Operation::Start, &e))
    }
}

fn restart_failure(name: &str, step: Operation, error: &ProcessError) -> ProcessError {
    let details = match error {
        ProcessError::Operation { details, .. } | ProcessError::Query { details, .. } => details,
    };
    ProcessError::operation(Operation::Restart, name, format!("{step} failed: {details}"))
}

pub trait ManagedProcessClone: Send + Sync {
    fn clone_box(&self) -> Box<dyn ManagedProcess>;
}

impl<T> ManagedProcessClone for T
where
    T: 'static + ManagedProcess + Clone,
{
    fn clone_box(&self) -> Box<dyn ManagedProcess> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ManagedProcess> {
    fn clone(&self) -> Box<dyn ManagedProcess> {
        self.clone_box()
    }
}

impl<T: ManagedProcess + Clone + 'static> From<T> for Box<dyn ManagedProcess> {
    fn from(process: T) -> Self {
        Box::new(process)
    }
}
