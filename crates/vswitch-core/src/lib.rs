mod catalog;
mod executor;
mod marker;

pub use catalog::VersionCatalog;
pub use executor::{ActionExecutor, ActionFailure, ActionObserver, ActionOutcome, ExecutorError};
pub use marker::ActiveMarker;

pub use vswitch_backend::{
    ActionError, CatalogError, ManagedProcess, Operation, ProcessError, Version,
};
