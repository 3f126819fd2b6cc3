mod actions;
mod console;
mod init;

use std::sync::Arc;

use log::{debug, info, warn};
use vswitch_core::{ActionExecutor, ActionObserver, ManagedProcess, VersionCatalog};

use crate::menu::{Menu, MenuCommand, ProcessStatus};

pub use console::ConsoleInput;
pub use init::{catalog_from_settings, processes_from_settings};

use console::{ConsoleObserver, prompt};

/// Everything the menu loop acts on, built once at startup.
pub struct App {
    catalog: VersionCatalog,
    processes: Vec<Box<dyn ManagedProcess>>,
    executor: ActionExecutor,
    observer: Arc<ConsoleObserver>,
    input: Arc<ConsoleInput>,
}

impl App {
    pub fn new(
        catalog: VersionCatalog,
        processes: Vec<Box<dyn ManagedProcess>>,
        input: Arc<ConsoleInput>,
    ) -> Self {
        let observer = Arc::new(ConsoleObserver::new(Arc::clone(&input)));
        Self {
            catalog,
            processes,
            executor: ActionExecutor::new(observer.clone()),
            observer,
            input,
        }
    }

    pub async fn run(&self) {
        info!(
            "Managing {} with {} process(es)",
            self.catalog.install_root().display(),
            self.processes.len()
        );

        let mut menu = Menu::default();
        loop {
            if self.observer.take_stale() {
                menu = self.build_menu().await;
                println!();
                print!("{menu}");
            }

            prompt("> ");
            let Some(line) = self.input.next_line().await else {
                debug!("Input closed");
                break;
            };

            let Some(command) = menu.select(&line).cloned() else {
                if !line.trim().is_empty() {
                    println!("No enabled entry for {:?}", line.trim());
                }
                continue;
            };

            match command {
                MenuCommand::SwitchVersion(version) => {
                    self.switch_version(&version).await;
                }
                MenuCommand::Process { index, operation } => {
                    self.run_process_action(index, operation).await;
                }
                MenuCommand::Refresh => self.observer.on_action_resync(),
                MenuCommand::Close => break,
            }
        }
    }

    async fn build_menu(&self) -> Menu {
        let mut notices = Vec::new();

        let mut versions = self.catalog.list().await.unwrap_or_else(|error| {
            warn!("Version discovery failed: {error}");
            notices.push(error.to_string());
            Vec::new()
        });
        versions.sort();

        let active = self.catalog.active().await.unwrap_or_else(|error| {
            warn!("Active version unavailable: {error}");
            notices.push(error.to_string());
            None
        });

        let mut states = Vec::with_capacity(self.processes.len());
        for process in &self.processes {
            states.push(match process.is_running().await {
                Ok(running) => Some(running),
                Err(error) => {
                    warn!("{error}");
                    None
                }
            });
        }

        let statuses: Vec<ProcessStatus<'_>> = self
            .processes
            .iter()
            .zip(states)
            .map(|(process, running)| ProcessStatus {
                name: process.name(),
                group: process.group_name(),
                running,
            })
            .collect();

        notices
            .into_iter()
            .rev()
            .fold(
                Menu::build(&versions, active.as_ref(), &statuses),
                Menu::with_notice,
            )
    }
}
