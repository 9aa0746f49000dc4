use csv::WriterBuilder;
use ndarray::{Array2, ArrayView1, Axis};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::error::ModelError;

/// Result of one simulation: one row per output time
///
/// Columns are `time`, then compartments in declaration order, then `$TABLE`
/// outputs in order of first assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutput {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl SimulationOutput {
    pub(crate) fn new(columns: Vec<String>, data: Array2<f64>) -> Self {
        debug_assert_eq!(columns.len(), data.ncols());
        Self { columns, data }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The full table, rows by columns
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.data.column(0)
    }

    /// Values of a named column
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.data.column(idx))
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        if row >= self.nrows() {
            return None;
        }
        self.column(name).map(|c| c[row])
    }

    /// Value of a named column at the last output time
    pub fn last(&self, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.last().copied())
    }

    /// Write the table as CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ModelError> {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in self.data.axis_iter(Axis(0)) {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_path(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(file)?;
        tracing::info!("Wrote {} rows to {}", self.nrows(), path.as_ref().display());
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, ModelError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| ModelError::Io(std::io::Error::other(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn output() -> SimulationOutput {
        SimulationOutput::new(
            vec!["time".into(), "CENT".into(), "CP".into()],
            array![[0.0, 0.0, 0.0], [1.0, 10.0, 0.5], [2.0, 8.0, 0.4]],
        )
    }

    #[test]
    fn test_column_access() {
        let out = output();
        assert_eq!(out.nrows(), 3);
        assert_eq!(out.times().to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(out.value(1, "CENT"), Some(10.0));
        assert_eq!(out.last("CP"), Some(0.4));
        assert_eq!(out.column("DEPOT"), None);
        assert_eq!(out.value(3, "CENT"), None);
    }

    #[test]
    fn test_csv() {
        let csv = output().to_csv_string().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("time,CENT,CP"));
        assert_eq!(lines.next(), Some("0,0,0"));
        assert_eq!(lines.next(), Some("1,10,0.5"));
    }

    #[test]
    fn test_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        output().to_csv_path(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
