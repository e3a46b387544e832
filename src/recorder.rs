//! Per-session attention log.
//!
//! Each Record session writes one `;`-delimited file named after the session
//! start time. Rows carry no header: `timestamp;label`.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::classifier::AttentionState;
use crate::error::RecorderError;

const FILE_NAME_FORMAT: &str = "%d_%m_%Y %Hh%Mm%Ss";
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
pub const DELIMITER: char = ';';

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRow {
    pub timestamp: DateTime<Local>,
    pub state: AttentionState,
}

impl fmt::Display for LogRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.timestamp.format(ROW_TIMESTAMP_FORMAT),
            DELIMITER,
            self.state.label()
        )
    }
}

pub fn session_file_stem(started_at: DateTime<Local>) -> String {
    started_at.format(FILE_NAME_FORMAT).to_string()
}

/// Where session rows end up. A file is synced to disk on close.
pub trait SessionSink: Write + Send {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SessionSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub rows: u64,
}

pub struct SessionRecorder {
    path: PathBuf,
    writer: LineWriter<Box<dyn SessionSink>>,
    rows: u64,
}

impl SessionRecorder {
    /// Creates the session file in `dir`, never overwriting an earlier session.
    pub fn create(dir: &Path, started_at: DateTime<Local>) -> Result<Self, RecorderError> {
        fs::create_dir_all(dir).map_err(|source| RecorderError::Create {
            path: dir.to_path_buf(),
            source,
        })?;

        let stem = session_file_stem(started_at);
        let mut attempt = 0;
        loop {
            let path = if attempt == 0 {
                dir.join(format!("{stem}.csv"))
            } else {
                dir.join(format!("{stem} ({attempt}).csv"))
            };

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    log::info!("recording session to {}", path.display());
                    return Ok(Self::with_sink(path, Box::new(file)));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(RecorderError::Create { path, source }),
            }
        }
    }

    /// Records into `sink`; `path` names the session in errors and summaries.
    pub fn with_sink(path: PathBuf, sink: Box<dyn SessionSink>) -> Self {
        Self {
            path,
            writer: LineWriter::new(sink),
            rows: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &LogRow) -> Result<(), RecorderError> {
        writeln!(self.writer, "{row}").map_err(|source| RecorderError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes and syncs the file. Consumes the recorder so it closes once.
    pub fn finish(mut self) -> Result<SessionSummary, RecorderError> {
        let path = self.path.clone();
        let write_err = |source| RecorderError::Write {
            path: path.clone(),
            source,
        };
        self.writer.flush().map_err(write_err)?;
        self.writer.get_mut().sync().map_err(write_err)?;

        log::info!("closed session {} ({} rows)", path.display(), self.rows);
        Ok(SessionSummary {
            path: self.path,
            rows: self.rows,
        })
    }
}
