use crate::error::Result;
use crate::infrastructure::in_memory::AccountBalance;
use std::io::Write;

/// Writes the final balances report as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_balances(&mut self, balances: Vec<AccountBalance>) -> Result<()> {
        for row in balances {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
