//! Console logging plus an optional size-rotated log file.
//!
//! Console output goes through `env_logger` (filter from `RUST_LOG`, falling
//! back to `--log-level`). When a log file is configured every enabled record
//! is also appended there; the file rotates at 1 MiB and keeps 3 backups:
//!   classboard.log → classboard.log.1 → classboard.log.2 → classboard.log.3

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use env_logger::Logger;
use log::{LevelFilter, Log, Metadata, Record};

use crate::http;

/// Maximum log file size before rotation (1 MiB).
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 3;

/// Rotate `log_path` if its size reached `max_bytes`.
///
/// The oldest backup is dropped, the others shift up by one and the live
/// file becomes `.1`. Returns `true` if rotation occurred. A missing file is
/// not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// `classboard.log.2` for `n = 2`.
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("classboard.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

struct LogFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl LogFile {
    fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(path, max_bytes, MAX_ROTATED_FILES)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
        })
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if self.written >= self.max_bytes {
            *self = Self::open(&self.path, self.max_bytes)?;
        }
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.written += line.len() as u64 + 1;
        Ok(())
    }
}

struct TeeLogger {
    console: Logger,
    file: Option<Mutex<LogFile>>,
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.console.log(record);
        if let Some(file) = &self.file {
            let line = format!(
                "{} {} {}",
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                record.level(),
                record.args().to_string().replace('\n', "\\n")
            );
            if let Ok(mut guard) = file.lock() {
                let _ = guard.append(&line);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            if let Ok(mut guard) = file.lock() {
                let _ = guard.file.flush();
            }
        }
    }
}

/// Install the global logger. `level` is used when `RUST_LOG` is unset;
/// `log_http` turns on request tracing whatever the level.
pub fn init(level: &str, log_file: Option<&Path>, log_http: bool) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_secs();
    if log_http {
        builder.filter_module(http::TARGET, LevelFilter::Debug);
    }
    let console = builder.build();
    let max_level = console.filter();
    let file = match log_file {
        Some(path) => {
            let file = LogFile::open(path, MAX_LOG_BYTES)
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
