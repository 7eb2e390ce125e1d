//! Result sink port: an append-only table with one row per sampling tick.

use crate::domain::report::ResultRow;
use crate::domain::run::DeviceSummary;
use crate::error::Result;

/// Append-only writer for detailed report rows.
pub trait ResultSink: Send {
    /// Select the report for `device`, creating it (with its header) when
    /// it does not exist yet.
    fn prepare(&mut self, device: &DeviceSummary) -> Result<()>;

    /// Append one row to the prepared report.
    fn append(&mut self, row: &ResultRow) -> Result<()>;
}
