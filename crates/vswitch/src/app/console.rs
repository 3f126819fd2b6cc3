use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use vswitch_core::{ActionFailure, ActionObserver};

const INPUT_RECV_TIMEOUT: Duration = Duration::from_millis(250);
const INPUT_QUEUE_CAPACITY: usize = 32;

fn spawn_stdin_reader() -> crossbeam_channel::Receiver<String> {
    let (line_tx, line_rx) = crossbeam_channel::unbounded();
    // Blocked in read_line until input or EOF; never joined.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    line_rx
}

struct InputWorker {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl InputWorker {
    fn start(
        lines: crossbeam_channel::Receiver<String>,
        line_tx: mpsc::Sender<String>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = Arc::clone(&shutdown);

        let join_handle = std::thread::spawn(move || {
            while !worker_shutdown.load(Ordering::Relaxed) {
                match lines.recv_timeout(INPUT_RECV_TIMEOUT) {
                    Ok(line) => {
                        if line_tx.blocking_send(line).is_err() {
                            log::debug!("Input receiver closed");
                            break;
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for InputWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

/// Lines typed by the user, shared by the menu loop and the retry prompt.
pub struct ConsoleInput {
    // Dropped before the worker is joined, which unblocks a pending send.
    lines: Mutex<mpsc::Receiver<String>>,
    _worker: InputWorker,
}

impl ConsoleInput {
    pub fn stdin() -> Self {
        Self::from_lines(spawn_stdin_reader())
    }

    pub fn from_lines(lines: crossbeam_channel::Receiver<String>) -> Self {
        let (line_tx, line_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        Self {
            lines: Mutex::new(line_rx),
            _worker: InputWorker::start(lines, line_tx),
        }
    }

    /// Next line of input, or `None` once input is closed.
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

pub fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

pub fn failure_message(failure: &ActionFailure<'_>) -> String {
    match (failure.operation(), failure.target()) {
        (Some(operation), Some(name)) => format!("Unable to {operation} {name}."),
        (None, Some(version)) => format!("Unable to switch to {version}."),
        _ => format!("Unable to complete {}.", failure.description),
    }
}

/// Terminal side of the action executor.
pub struct ConsoleObserver {
    input: Arc<ConsoleInput>,
    stale: AtomicBool,
}

impl ConsoleObserver {
    pub fn new(input: Arc<ConsoleInput>) -> Self {
        Self {
            input,
            // Nothing has been rendered yet.
            stale: AtomicBool::new(true),
        }
    }

    /// Whether the menu must be rebuilt; clears the flag.
    pub fn take_stale(&self) -> bool {
        self.stale.swap(false, Ordering::AcqRel)
    }
}

#[async_trait]
impl ActionObserver for ConsoleObserver {
    fn on_action_start(&self, description: &str) {
        println!("Waiting for {description}...");
    }

    fn on_action_resync(&self) {
        self.stale.store(true, Ordering::Release);
    }

    async fn on_action_failed(&self, failure: &ActionFailure<'_>) -> bool {
        println!("{}", failure_message(failure));
        println!("  {}", failure.error);

        loop {
            prompt("[r]etry / [c]ancel: ");
            let Some(answer) = self.input.next_line().await else {
                return false;
            };
            match answer.trim().to_ascii_lowercase().as_str() {
                "r" | "retry" => return true,
                "c" | "cancel" => return false,
                _ => {}
            }
        }
    }
}
