// Traceability file: the one durable record of how a run ended.
//
// Every invocation writes `<serialNumber>_<YYMMDD>.json` into the output
// directory, holding the serial number and the execution result (0 for
// success, otherwise the failing stage's code). A rerun on the same day
// overwrites the previous file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{info, warn};

use crate::error::UploadError;

/// File name stem used when the serial number cannot be part of a file name.
pub const NO_SERIAL_NUMBER: &str = "No_Serial_Number_Available";

const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME_LEN: usize = 255;
const NAME_SUFFIX_LEN: usize = "_YYMMDD.json".len();

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceabilityRecord {
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
    #[serde(rename = "outputExecutionResult")]
    pub output_execution_result: u8,
}

impl TraceabilityRecord {
    pub fn new(serial_number: &str, outcome: &Result<(), UploadError>) -> Self {
        TraceabilityRecord {
            serial_number: serial_number.to_string(),
            output_execution_result: outcome.as_ref().err().map_or(0, UploadError::code),
        }
    }
}

/// Local date used in file names.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `<serial>_<YYMMDD>.json`, or code 1 if `serial` would not stay a single
/// plain file name inside the output directory.
pub fn file_name(serial: &str, date: NaiveDate) -> Result<String, UploadError> {
    let breaks_path = serial.is_empty()
        || serial == "."
        || serial == ".."
        || serial.len() + NAME_SUFFIX_LEN > MAX_FILE_NAME_LEN
        || serial.chars().any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c));
    if breaks_path {
        return Err(UploadError::Filename(serial.to_string()));
    }
    Ok(format!("{serial}_{}.json", date.format("%y%m%d")))
}

fn render(record: &TraceabilityRecord) -> Result<Vec<u8>, UploadError> {
    let value = serde_json::to_value(record).map_err(|e| UploadError::Convert(e.to_string()))?;

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut ser)
        .map_err(|e| UploadError::GenerateContent(e.to_string()))?;
    Ok(buf)
}

/// Write the traceability file for `record` into `dir` and return its
/// absolute path. If the serial number cannot be embedded in the file name
/// the file is written under [`NO_SERIAL_NUMBER`] with code 1 instead.
pub fn write_report(
    dir: &Path,
    mut record: TraceabilityRecord,
    date: NaiveDate,
) -> Result<PathBuf, UploadError> {
    let name = match file_name(&record.serial_number, date) {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "falling back to placeholder file name");
            record.output_execution_result = e.code();
            format!("{NO_SERIAL_NUMBER}_{}.json", date.format("%y%m%d"))
        }
    };

    let content = render(&record)?;
    fs::create_dir_all(dir)
        .map_err(|e| UploadError::PrepareOutput(format!("{}: {e}", dir.display())))?;

    let path = dir.join(name);
    fs::write(&path, content).map_err(|e| UploadError::WriteFile(format!("{}: {e}", path.display())))?;
    info!(
        path = %path.display(),
        result = record.output_execution_result,
        "traceability file written"
    );

    Ok(fs::canonicalize(&path).unwrap_or(path))
}
