use log::{debug, error, warn};
use vswitch_core::{
    ActionError, ActionOutcome, ExecutorError, ManagedProcess, Operation, Version,
};

use super::App;

const VERSION_CHANGE: &str = "version to change";

impl App {
    /// Processes flagged for restart that are running, or whose state is
    /// unknown, at the moment a switch is requested.
    async fn running_dependents(&self) -> Vec<&dyn ManagedProcess> {
        let mut running = Vec::new();
        for process in self
            .processes
            .iter()
            .filter(|process| process.restart_on_version_change())
        {
            match process.is_running().await {
                Ok(true) => running.push(process.as_ref()),
                Ok(false) => debug!("{} is stopped, not restarting", process.name()),
                Err(error) => {
                    warn!("{error}; restarting {} anyway", process.name());
                    running.push(process.as_ref());
                }
            }
        }
        running
    }

    pub(super) async fn switch_version(&self, version: &Version) -> Option<ActionOutcome> {
        let dependents = self.running_dependents().await;
        let dependents = &dependents;
        let catalog = &self.catalog;

        let result = self
            .executor
            .run(VERSION_CHANGE, || async move {
                catalog.switch_to(version).await?;
                for process in dependents {
                    process.restart().await?;
                }
                Ok::<(), ActionError>(())
            })
            .await;

        report(VERSION_CHANGE, result)
    }

    pub(super) async fn run_process_action(
        &self,
        index: usize,
        operation: Operation,
    ) -> Option<ActionOutcome> {
        let Some(process) = self.processes.get(index) else {
            warn!("No process at menu index {index}");
            return None;
        };
        let process = process.as_ref();
        let description = format!("{} to {operation}", process.name());

        let result = self
            .executor
            .run(&description, || async move {
                match operation {
                    Operation::Start => process.start().await,
                    Operation::Stop => process.stop().await,
                    Operation::Restart => process.restart().await,
                }
                .map_err(ActionError::from)
            })
            .await;

        report(&description, result)
    }
}

fn report(
    description: &str,
    result: Result<ActionOutcome, ExecutorError>,
) -> Option<ActionOutcome> {
    match result {
        Ok(outcome) => {
            match &outcome {
                ActionOutcome::Completed { attempts } => {
                    debug!("{description} done after {attempts} attempt(s)");
                    println!("Done.");
                }
                ActionOutcome::Abandoned { error, .. } => println!("{error}"),
            }
            Some(outcome)
        }
        Err(error @ ExecutorError::Busy { .. }) => {
            println!("{error}");
            None
        }
        Err(error @ ExecutorError::Fatal { .. }) => {
            error!("{error}");
            println!("{error}");
            None
        }
    }
}
