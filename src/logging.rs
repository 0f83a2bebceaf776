// src/logging.rs
//
// Timestamped logging to stderr and, optionally, a log file.
//
// While the terminal is in raw mode stderr would tear through the operator's
// input line, so the echo is muted and only the log file receives messages.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        if $crate::logging::STDERR_ECHO.load(std::sync::atomic::Ordering::Relaxed) {
            eprintln!("{}", msg);
        }
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

/// Global log file handle. When `Some`, `tlog!` writes to this file as well.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Whether `tlog!` echoes to stderr
pub(crate) static STDERR_ECHO: AtomicBool = AtomicBool::new(true);

pub(crate) fn set_stderr_echo(enabled: bool) {
    STDERR_ECHO.store(enabled, Ordering::Relaxed);
}

/// Initialise file logging to the given directory.
/// Creates a timestamped log file and a `busterm.log` symlink to it.
pub(crate) fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-busterm.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    let symlink_path = log_dir.join("busterm.log");
    let _ = std::fs::remove_file(&symlink_path);
    if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
        eprintln!(
            "{} [logging] Failed to create busterm.log symlink: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            e
        );
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    tlog!("[logging] File logging started: {}", log_path.display());
    Ok(())
}

/// Stop file logging and close the log file.
pub(crate) fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.take().is_some() && STDERR_ECHO.load(Ordering::Relaxed) {
            eprintln!(
                "{} [logging] File logging stopped",
                chrono::Local::now().format("%H:%M:%S%.3f")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_creates_file_and_symlink() {
        let dir = tempfile::tempdir().unwrap();
        init_file_logging(dir.path()).unwrap();
        tlog!("[test] hello from the log");
        stop_file_logging();

        let link = dir.path().join("busterm.log");
        let content = std::fs::read_to_string(&link).unwrap();
        assert!(content.contains("[test] hello from the log"));
        assert!(content.contains("[logging] File logging started"));
    }
}
