mod control;
mod executable;
mod service;

pub use control::{ServiceControl, ServiceManagerKind, ServiceState};
pub use executable::ExecutableProcess;
pub use service::ServiceProcess;
