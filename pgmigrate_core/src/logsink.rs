//! Per-migration append-only log file, written alongside `schema_migrations`
//! so a `log_ref` column always points at a readable transcript of what ran.
//!
//! Ported from `original_source/logging_utils.py::migration_log`: one file
//! per execution, named `<migration_id>_<UTC timestamp>.log`, flushed after
//! every line so a crash mid-migration leaves a readable partial log.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::Error;

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// An open log sink for one migration execution. The bookkeeping row's
/// `log_ref` should be set to [`LogSink::file_name`].
pub struct LogSink {
    file: File,
    file_name: String,
}

impl LogSink {
    /// Create `<log_dir>/<migration_id>_<now>.log`, creating `log_dir` if
    /// necessary.
    pub fn create(log_dir: &Path, migration_id: &str, now: OffsetDateTime) -> Result<LogSink, Error> {
        std::fs::create_dir_all(log_dir)?;
        let timestamp = now
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());
        let file_name = format!("{migration_id}_{timestamp}.log");
        let path = log_dir.join(&file_name);
        let file = File::create(&path)?;
        Ok(LogSink { file, file_name })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(&self.file_name)
    }

    /// Append one line, flushing immediately.
    pub fn log(&mut self, message: impl AsRef<str>) -> Result<(), Error> {
        writeln!(self.file, "{}", message.as_ref())?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    #[test]
    fn creates_timestamped_log_file_and_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let now = datetime!(2026-07-30 12:34:56 UTC);
        let mut sink = LogSink::create(tmp.path(), "0001_init", now).unwrap();

        assert_eq!(sink.file_name(), "0001_init_20260730T123456Z.log");
        sink.log("-- applying 0001_init --").unwrap();
        sink.log("done").unwrap();

        let contents = std::fs::read_to_string(sink.path(tmp.path())).unwrap();
        assert_eq!(contents, "-- applying 0001_init --\ndone\n");
    }

    #[test]
    fn creates_log_dir_if_missing() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("nested").join("logs");
        let now = datetime!(2026-07-30 12:34:56 UTC);
        let sink = LogSink::create(&nested, "0001_init", now).unwrap();
        assert!(nested.join(sink.file_name()).exists());
    }
}
