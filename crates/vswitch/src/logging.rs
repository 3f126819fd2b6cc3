use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use simplelog::{CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use vswitch_platform::AppPaths;

/// Log sink that survives the log file being deleted or its directory being
/// cleaned up while vswitch is running.
struct ReopeningFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ReopeningFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = append_to(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        let file = match slot.take() {
            Some(file) if self.path.exists() => file,
            _ => {
                if let Some(dir) = self.path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                append_to(&self.path)?
            }
        };

        f(slot.insert(file))
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for ReopeningFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(File::flush)
    }
}

/// Drop the older half of `log_path` once it exceeds `max_size` bytes,
/// cutting at a line boundary. Returns whether the file was shortened.
fn shrink_log(log_path: &Path, max_size: u64) -> io::Result<bool> {
    if std::fs::metadata(log_path)?.len() <= max_size {
        return Ok(false);
    }

    let contents = std::fs::read(log_path)?;
    let middle = contents.len() / 2;
    let cut = contents[middle..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(middle, |offset| middle + offset + 1);
    std::fs::write(log_path, &contents[cut..])?;
    Ok(true)
}

fn log_config() -> Config {
    // Only records from the vswitch crates; dependency chatter is dropped.
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("vswitch")
        .build()
}

pub fn init_logging(debug_enabled: bool, max_log_size: u64) {
    let Ok(paths) = AppPaths::new() else {
        return;
    };
    let _ = paths.ensure_dirs();
    let log_path = paths.log_file();

    let shrunk = matches!(shrink_log(&log_path, max_log_size), Ok(true));

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if let Ok(file) = ReopeningFile::open(log_path.clone()) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, log_config(), file));
    }

    // Stdout belongs to the menu.
    #[cfg(debug_assertions)]
    loggers.push(simplelog::TermLogger::new(
        LevelFilter::Debug,
        log_config(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ));

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }

    set_logging_enabled(debug_enabled);
    log::debug!("vswitch logging to {}", log_path.display());
    if shrunk {
        log::debug!("Dropped older half of log beyond {max_log_size} bytes");
    }
}

pub fn set_logging_enabled(enabled: bool) {
    log::set_max_level(if enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Off
    });
}
