use super::{is_blank_record, RowSource, SourceError};
use crate::model::RawTable;
use std::fs::File;
use std::path::{Path, PathBuf};

const UTF8_BOM: &str = "\u{feff}";

/// CSV file with a header row
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn reader(&self) -> Result<::csv::Reader<File>, SourceError> {
        let file = File::open(&self.path)?;
        Ok(::csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(file))
    }
}

fn clean_header(raw: &str, first: bool) -> String {
    let text = if first { raw.trim_start_matches(UTF8_BOM) } else { raw };
    text.trim().to_string()
}

impl RowSource for CsvSource {
    fn read(&self) -> Result<RawTable, SourceError> {
        let mut reader = self.reader()?;
        let mut records = reader.records();

        let headers = match records.next() {
            Some(first) => first?
                .iter()
                .enumerate()
                .map(|(i, h)| clean_header(h, i == 0))
                .collect(),
            None => Vec::new(),
        };

        let mut rows = Vec::new();
        for record in records {
            let record: Vec<String> = record?.iter().map(str::to_string).collect();
            if !is_blank_record(&record) {
                rows.push(record);
            }
        }

        tracing::debug!(path = %self.path.display(), rows = rows.len(), "Read CSV");
        Ok(RawTable::new(headers, rows))
    }

    fn headers(&self) -> Result<Vec<String>, SourceError> {
        let mut reader = self.reader()?;
        match reader.records().next() {
            Some(first) => Ok(first?
                .iter()
                .enumerate()
                .map(|(i, h)| clean_header(h, i == 0))
                .collect()),
            None => Ok(Vec::new()),
        }
    }
}
