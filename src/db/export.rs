//! CSV export of device records

use crate::device::DeviceRecord;
use crate::error::DbResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column order of the export
pub const CSV_HEADERS: [&str; 8] = [
    "address",
    "hostname",
    "device_type",
    "serial_number",
    "platform",
    "version",
    "neighbor_count",
    "neighbors",
];

/// Write records to a CSV file, returning the number of rows
pub fn write_csv(path: &Path, records: &[DeviceRecord]) -> DbResult<usize> {
    let file = File::create(path)?;
    let count = write_records(file, records)?;
    tracing::debug!(path = %path.display(), rows = count, "CSV export written");
    Ok(count)
}

fn write_records<W: Write>(writer: W, records: &[DeviceRecord]) -> DbResult<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADERS)?;

    for record in records {
        let neighbors = record.neighbors_json()?;
        let neighbor_count = record.neighbors.len().to_string();
        wtr.write_record([
            record.address.as_str(),
            record.hostname.as_str(),
            record.device_type.as_str(),
            record.serial_number.as_str(),
            record.platform.as_str(),
            record.version.as_str(),
            neighbor_count.as_str(),
            neighbors.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(records.len())
}
