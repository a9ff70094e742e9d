//! Logging setup.
//!
//! Console logging uses `env_logger`; every record that passes the filter is
//! mirrored to an append-only flat log file. `RUST_LOG` overrides the level
//! configured in settings.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::Log;

struct TeeLogger {
    console: env_logger::Logger,
    file: Option<Mutex<File>>,
}

impl log::Log for TeeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.console.matches(record) {
            return;
        }
        self.console.log(record);

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(
                    file,
                    "[{} {:<5} {}] {}",
                    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                    record.level(),
                    record.target(),
                    record.args()
                );
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Install the process-wide logger. `level` is the settings-file level name
/// ("INFO", "DEBUG", ...); `log_file` enables the file mirror.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    let default_filter = level.to_ascii_lowercase();
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let console = env_logger::Builder::from_env(env).build();
    let max_level = console.filter();

    let file = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(Mutex::new(file))
        }
        None => None,
    };

    log::set_boxed_logger(Box::new(TeeLogger { console, file }))
        .context("logger already installed")?;
    log::set_max_level(max_level);
    Ok(())
}
