//! In-memory [`ResultSink`] that keeps every row for assertions.

use std::sync::{Arc, Mutex};

use crate::domain::report::ResultRow;
use crate::domain::run::DeviceSummary;
use crate::error::Result;
use crate::port::outbound::sink::ResultSink;

/// Rows and prepared devices shared between a [`RecordingSink`] and the test.
#[derive(Debug, Default)]
pub struct Recorded {
    devices: Mutex<Vec<DeviceSummary>>,
    rows: Mutex<Vec<ResultRow>>,
}

impl Recorded {
    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.devices.lock().unwrap().clone()
    }

    pub fn rows(&self) -> Vec<ResultRow> {
        self.rows.lock().unwrap().clone()
    }

    /// Values of one column across all rows.
    pub fn column(&self, name: &str) -> Vec<String> {
        self.rows()
            .iter()
            .filter_map(|row| row.get(name).map(str::to_string))
            .collect()
    }
}

/// A sink that records instead of writing.
#[derive(Debug, Default)]
pub struct RecordingSink {
    recorded: Arc<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Arc<Recorded> {
        self.recorded.clone()
    }
}

impl ResultSink for RecordingSink {
    fn prepare(&mut self, device: &DeviceSummary) -> Result<()> {
        self.recorded.devices.lock().unwrap().push(device.clone());
        Ok(())
    }

    fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.recorded.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}
