use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use vswitch_backend::{ManagedProcess, Operation, ProcessError};

use crate::control::{ServiceControl, ServiceState};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// An OS service controlled through the host's service manager.
///
/// `start` on a running service and `stop` on a stopped one return
/// immediately without issuing a command. Both wait until the service reaches
/// the requested state, and fail if it does not within the timeout.
#[derive(Debug, Clone)]
pub struct ServiceProcess {
    name: String,
    group: String,
    service: String,
    restart_on_version_change: bool,
    control: ServiceControl,
    timeout: Duration,
    poll_interval: Duration,
}

impl ServiceProcess {
    #[must_use]
    pub fn new(name: impl Into<String>, service: impl Into<String>, control: ServiceControl) -> Self {
        Self {
            name: name.into(),
            group: "Services".to_string(),
            service: service.into(),
            restart_on_version_change: false,
            control,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
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
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    async fn state(&self, operation: Operation) -> Result<ServiceState, ProcessError> {
        self.control
            .query(&self.service)
            .await
            .map_err(|details| ProcessError::operation(operation, &self.name, details))
    }

    async fn wait_for(&self, target: ServiceState, operation: Operation) -> Result<(), ProcessError> {
        let wait = async {
            loop {
                let state = self.state(operation).await?;
                if state == target {
                    return Ok(());
                }
                debug!("{} is {state:?}, waiting for {target:?}", self.service);
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        if let Ok(result) = tokio::time::timeout(self.timeout, wait).await {
            result
        } else {
            warn!(
                "{} did not reach {target:?} within {}s",
                self.service,
                self.timeout.as_secs()
            );
            Err(ProcessError::operation(
                operation,
                &self.name,
                format!("timed out after {}s", self.timeout.as_secs()),
            ))
        }
    }

    async fn transition(&self, target: ServiceState, operation: Operation) -> Result<(), ProcessError> {
        if self.state(operation).await? == target {
            debug!("{} already {target:?}", self.service);
            return Ok(());
        }

        info!("Requesting {operation} of service {}", self.service);
        let request = match operation {
            Operation::Stop => self.control.stop(&self.service).await,
            Operation::Start | Operation::Restart => self.control.start(&self.service).await,
        };
        request.map_err(|details| ProcessError::operation(operation, &self.name, details))?;

        self.wait_for(target, operation).await
    }
}

#[async_trait]
impl ManagedProcess for ServiceProcess {
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
        self.control
            .query(&self.service)
            .await
            .map(|state| state == ServiceState::Running)
            .map_err(|details| ProcessError::query(&self.name, details))
    }

    async fn start(&self) -> Result<(), ProcessError> {
        self.transition(ServiceState::Running, Operation::Start).await
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        self.transition(ServiceState::Stopped, Operation::Stop).await
    }
}
