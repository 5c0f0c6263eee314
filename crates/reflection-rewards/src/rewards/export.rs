use std::io;

use super::domain::LedgerEntry;

/// Write ledger rows as CSV with a header line.
pub fn write_ledger_csv<W: io::Write>(writer: W, entries: &[LedgerEntry]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}
