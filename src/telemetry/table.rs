//! # Table Rows
//!
//! Renders decoded telemetry records as rows of the converter's table file.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use super::decoder::TelemetryRecord;

/// Output format of the table file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// `tag,seq,x,y,z,bit0,bit1,value` in base 10
    #[default]
    Csv,
    /// One JSON object per line
    Jsonl,
}

impl TableFormat {
    /// File extension used when the table path is derived from the log path
    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Jsonl => "jsonl",
        }
    }

    /// Render one record as a newline-terminated row
    pub fn render(self, record: &TelemetryRecord) -> String {
        match self {
            TableFormat::Csv => format!("{}\n", csv_row(record)),
            TableFormat::Jsonl => {
                // Plain integer fields only, serialization cannot fail
                let json = serde_json::to_string(record).unwrap_or_default();
                format!("{}\n", json)
            }
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableFormat::Csv => "csv",
            TableFormat::Jsonl => "jsonl",
        })
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(TableFormat::Csv),
            "jsonl" => Ok(TableFormat::Jsonl),
            other => Err(format!("unknown table format '{}' (expected csv or jsonl)", other)),
        }
    }
}

/// Format a record as a CSV row without line terminator
pub fn csv_row(record: &TelemetryRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        record.device_tag,
        record.sequence,
        record.position.x,
        record.position.y,
        record.position.z,
        record.flags.bit0,
        record.flags.bit1,
        record.value,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decode;

    #[test]
    fn test_csv_row_for_sample_line() {
        let record = decode("##00AB_0001_0010-0020-0030_12_00FF").unwrap();
        assert_eq!(csv_row(&record), "171,1,16,32,48,1,2,255");
        assert_eq!(TableFormat::Csv.render(&record), "171,1,16,32,48,1,2,255\n");
    }

    #[test]
    fn test_jsonl_row() {
        let record = decode("##00AB_0001_0010-0020-0030_12_00FF").unwrap();
        let row = TableFormat::Jsonl.render(&record);
        assert!(row.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(row.trim_end()).unwrap();
        assert_eq!(value["device_tag"], 171);
        assert_eq!(value["position"]["z"], 48);
        assert_eq!(value["flags"]["bit1"], 2);
        assert_eq!(value["value"], 255);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("csv".parse::<TableFormat>(), Ok(TableFormat::Csv));
        assert_eq!("jsonl".parse::<TableFormat>(), Ok(TableFormat::Jsonl));
        assert!("xlsx".parse::<TableFormat>().is_err());
    }

    #[test]
    fn test_extension() {
        assert_eq!(TableFormat::Csv.extension(), "csv");
        assert_eq!(TableFormat::Jsonl.extension(), "jsonl");
        assert_eq!(TableFormat::default(), TableFormat::Csv);
    }
}
