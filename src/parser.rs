//! Reader for the plant's batch pool exported as CSV.
//!
//! Header names follow `BatchRecord`'s field names; the legacy `d28`,
//! `measured_mpa` and `predicted_mpa` columns are accepted as well. Columns
//! other than cement and water may be omitted.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::MixError;
use crate::strength::BatchRecord;

pub fn batch_records_from_reader<R: Read>(reader: R) -> Result<Vec<BatchRecord>, MixError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        let record: BatchRecord = row?;
        records.push(record);
    }
    Ok(records)
}

pub fn read_batch_records<P: AsRef<Path>>(path: P) -> Result<Vec<BatchRecord>, MixError> {
    let file = File::open(path.as_ref())?;
    let records = batch_records_from_reader(file)?;
    tracing::debug!(path = %path.as_ref().display(), rows = records.len(), "batch pool loaded");
    Ok(records)
}
