//! Detailed report writer.
//!
//! One CSV file per device and process start:
//! `<report_dir>/<device dir>/<ip>_<firmware>_<YYYYmmdd-HHMM>_Detailed.csv`.
//! Rows are appended and flushed one at a time so a crashed run still
//! leaves every tick it saw on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::domain::report::{ResultRow, COLUMNS};
use crate::domain::run::DeviceSummary;
use crate::error::Result;
use crate::port::outbound::sink::ResultSink;

/// Append-only CSV [`ResultSink`].
pub struct CsvReportSink {
    report_dir: PathBuf,
    /// Timestamp shared by every report of this process.
    stamp: String,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl CsvReportSink {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self::with_stamp(report_dir, Local::now().format("%Y%m%d-%H%M").to_string())
    }

    pub fn with_stamp(report_dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            report_dir: report_dir.into(),
            stamp: stamp.into(),
            writer: None,
            path: None,
        }
    }

    /// Report file rows currently go to.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn report_path(&self, device: &DeviceSummary) -> PathBuf {
        self.report_dir.join(device.report_dir()).join(format!(
            "{}_{}_Detailed.csv",
            device.report_prefix(),
            self.stamp
        ))
    }
}

impl ResultSink for CsvReportSink {
    fn prepare(&mut self, device: &DeviceSummary) -> Result<()> {
        let path = self.report_path(device);
        if self.path.as_deref() == Some(path.as_path()) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        if is_new {
            write_record(&mut writer, COLUMNS.iter().copied())?;
            writer.flush()?;
        }
        info!(path = %path.display(), "Detailed report");
        self.writer = Some(writer);
        self.path = Some(path);
        Ok(())
    }

    fn append(&mut self, row: &ResultRow) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        write_record(writer, row.cells().iter().map(String::as_str))?;
        writer.flush()?;
        Ok(())
    }
}

fn write_record<'a, W: Write>(writer: &mut W, fields: impl Iterator<Item = &'a str>) -> Result<()> {
    let line = fields.map(escape).collect::<Vec<_>>().join(",");
    writeln!(writer, "{line}")?;
    Ok(())
}

/// Quote fields that contain a separator, a quote or a line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::RunState;
    use crate::testkit::profile::{device, tput_profile};

    fn row(run_id: &str) -> ResultRow {
        let profile = tput_profile();
        let state = RunState::new(&profile, run_id, "http");
        ResultRow::capture(&profile, &state, "0.1.0")
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn report_is_named_after_device_and_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvReportSink::with_stamp(dir.path(), "20260101-0930");
        sink.prepare(&device()).unwrap();

        let device = device();
        let expected = dir
            .path()
            .join(device.report_dir())
            .join("10.0.0.5_20.1_20260101-0930_Detailed.csv");
        assert_eq!(sink.path(), Some(expected.as_path()));
        assert!(expected.exists());
    }

    #[test]
    fn header_is_written_once_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvReportSink::with_stamp(dir.path(), "stamp");
        sink.prepare(&device()).unwrap();
        sink.append(&row("run-1")).unwrap();

        let mut reopened = CsvReportSink::with_stamp(dir.path(), "stamp");
        reopened.prepare(&device()).unwrap();
        reopened.append(&row("run-2")).unwrap();

        let lines = lines(sink.path().unwrap());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("test_name,seconds,state,"));
        assert!(lines[0].ends_with(",version,report"));
        assert!(lines[1].contains(",run-1,"));
        assert!(lines[2].contains(",run-2,"));
        assert_eq!(lines[1].split(',').count(), COLUMNS.len());
    }

    #[test]
    fn rows_before_prepare_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvReportSink::with_stamp(dir.path(), "stamp");
        sink.append(&row("run-1")).unwrap();
        assert!(sink.path().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
