mod atomic;
mod commands;
mod paths;
mod process;

pub use atomic::{replace_file, temp_sibling};
#[cfg(unix)]
pub use atomic::replace_symlink;
pub use commands::HideWindow;
pub use paths::{AppPaths, AppPathsError};
pub use process::{is_pid_alive, pid_command_line, terminate_pid};
