mod app;
mod error;
mod logging;
mod menu;
mod settings;
mod single_instance;

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use vswitch_platform::AppPaths;

use crate::app::{App, ConsoleInput, catalog_from_settings, processes_from_settings};
use crate::error::AppError;
use crate::settings::AppSettings;
use crate::single_instance::SingleInstance;

fn main() -> ExitCode {
    let settings = AppSettings::load();
    logging::init_logging(settings.debug_logging, settings.max_log_size_bytes);

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &AppSettings) -> Result<(), AppError> {
    let _instance = SingleInstance::acquire()?;
    let paths = AppPaths::new()?;

    if !paths.settings_file().exists() {
        settings
            .save()
            .map_err(|e| AppError::io("failed to write default settings", e))?;
        info!("Wrote default settings to {}", paths.settings_file().display());
    }

    let catalog = catalog_from_settings(settings, &paths)?;
    let processes = processes_from_settings(settings, &catalog, &paths.pid_dir())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::io("failed to start async runtime", e))?;

    runtime.block_on(async {
        App::new(catalog, processes, Arc::new(ConsoleInput::stdin()))
            .run()
            .await;
    });

    info!("Exiting");
    Ok(())
}
