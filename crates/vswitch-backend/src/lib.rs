mod error;
mod traits;
mod types;

pub use error::{ActionError, CatalogError, Operation, ProcessError};
pub use traits::{ManagedProcess, ManagedProcessClone};
pub use types::{Version, VersionParseError};
