use std::path::Path;

use log::{debug, info};
use vswitch_core::{ActiveMarker, ManagedProcess, VersionCatalog};
use vswitch_platform::AppPaths;
use vswitch_service::{ExecutableProcess, ServiceControl, ServiceManagerKind, ServiceProcess};

use crate::error::AppError;
use crate::settings::{AppSettings, MarkerSettings};

pub fn catalog_from_settings(
    settings: &AppSettings,
    paths: &AppPaths,
) -> Result<VersionCatalog, AppError> {
    let install_root = settings
        .install_root
        .clone()
        .ok_or_else(|| AppError::InstallRootNotConfigured {
            settings_file: paths.settings_file(),
        })?;

    if !install_root.is_dir() {
        return Err(AppError::InstallRootMissing { path: install_root });
    }

    let marker = match &settings.marker {
        None => ActiveMarker::PointerFile(install_root.join("active")),
        Some(MarkerSettings::PointerFile { path }) => ActiveMarker::PointerFile(path.clone()),
        #[cfg(unix)]
        Some(MarkerSettings::Symlink { path }) => ActiveMarker::Symlink(path.clone()),
        #[cfg(not(unix))]
        Some(MarkerSettings::Symlink { .. }) => return Err(AppError::SymlinkMarkerUnsupported),
    };

    info!(
        "Install root {}, marker {:?}",
        install_root.display(),
        marker
    );
    Ok(VersionCatalog::new(install_root, marker))
}

fn service_control(settings: &AppSettings) -> Option<ServiceControl> {
    match &settings.service_control_program {
        Some(program) => {
            debug!("Using configured service control {}", program.display());
            Some(ServiceControl::new(
                ServiceManagerKind::native(),
                program.clone(),
            ))
        }
        None => ServiceControl::detect(),
    }
}

/// Services first, then executables, each in settings order.
pub fn processes_from_settings(
    settings: &AppSettings,
    catalog: &VersionCatalog,
    pid_dir: &Path,
) -> Result<Vec<Box<dyn ManagedProcess>>, AppError> {
    let mut processes: Vec<Box<dyn ManagedProcess>> = Vec::new();

    if let Some(first) = settings.services.first() {
        let control = service_control(settings).ok_or_else(|| {
            AppError::ServiceControlUnavailable {
                service: first.name.clone(),
            }
        })?;

        for service in &settings.services {
            let mut process = ServiceProcess::new(&service.name, &service.service, control.clone())
                .with_restart_on_version_change(service.restart_on_version_change)
                .with_timeout(settings.service_timeout())
                .with_poll_interval(settings.poll_interval());
            if let Some(group) = &service.group {
                process = process.with_group(group);
            }
            processes.push(process.into());
        }
    }

    for executable in &settings.executables {
        let mut process =
            ExecutableProcess::new(&executable.name, catalog.clone(), &executable.path, pid_dir)
                .with_args(executable.args.clone())
                .with_restart_on_version_change(executable.restart_on_version_change);
        if let Some(group) = &executable.group {
            process = process.with_group(group);
        }
        processes.push(process.into());
    }

    Ok(processes)
}
