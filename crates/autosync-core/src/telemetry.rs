//! Centralised tracing initialisation for AutoSync binaries.
//!
//! Call [`init_tracing`] once at program start. Console lines go to stderr and,
//! when a logs directory is given, are also appended as plain text to
//! `<logs_dir>/autosync_YYYYMMDD.log`, one file per calendar day.
//! Later calls are ignored since the global subscriber can only be set once.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON on stderr, leaving stdout for command output.
/// * `level` is the default verbosity when `RUST_LOG` is not set.
/// * `logs_dir`, when given, receives the daily append-only log files.
pub fn init_tracing(json: bool, level: Level, logs_dir: Option<&Path>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(io::stderr).json())
            .with(daily_file_layer(logs_dir))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .with(daily_file_layer(logs_dir))
            .try_init()
            .ok();
    }
}

/// Plain-text layer over [`DailyLogWriter`], built per subscriber stack.
fn daily_file_layer<S>(logs_dir: Option<&Path>) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    logs_dir.map(|dir| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(DailyLogWriter::new(dir, "autosync"))
    })
}

/// Opens `<dir>/<prefix>_YYYYMMDD.log` in append mode for each event.
#[derive(Debug, Clone)]
pub struct DailyLogWriter {
    dir: PathBuf,
    prefix: String,
}

impl DailyLogWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Path of the file that receives today's lines.
    pub fn current_path(&self) -> PathBuf {
        let day = Local::now().format("%Y%m%d");
        self.dir.join(format!("{}_{}.log", self.prefix, day))
    }

    fn open(&self) -> io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())
    }
}

/// Writer handed out per event; falls back to a sink if the file can't be opened.
pub enum DailyLog {
    File(File),
    Sink(io::Sink),
}

impl Write for DailyLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            DailyLog::File(f) => f.write(buf),
            DailyLog::Sink(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            DailyLog::File(f) => f.flush(),
            DailyLog::Sink(s) => s.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for DailyLogWriter {
    type Writer = DailyLog;

    fn make_writer(&'a self) -> Self::Writer {
        match self.open() {
            Ok(file) => DailyLog::File(file),
            Err(_) => DailyLog::Sink(io::sink()),
        }
    }
}
