//! Static snapshot exports, one delimited file per category.
//!
//! Snapshots are all-or-nothing: a failed download or a malformed line fails
//! the whole fetch. Exports come from different tools, so the file may be
//! UTF-8 or Latin-1, may start with a BOM, and may use `;` instead of `,`.

use crate::models::{
    DatasetCategory, RawTable, Record, Result, SnapshotConfig, SubsidiosError, Value,
};
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, info};

/// Fetcher for the per-category snapshot files.
pub struct SnapshotFetcher {
    http: reqwest::Client,
    config: SnapshotConfig,
    timeout: Duration,
}

impl SnapshotFetcher {
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        let timeout = config.timeout();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("subsidios/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SubsidiosError::Network)?;

        Ok(Self {
            http,
            config: config.clone(),
            timeout,
        })
    }

    /// Export date embedded in every snapshot (`YYYYMMDD`).
    pub fn as_of(&self) -> &str {
        &self.config.as_of
    }

    pub fn url_for(&self, category: DatasetCategory) -> String {
        self.config.url_for(category)
    }

    /// Download and parse a category's snapshot.
    pub async fn fetch(&self, category: DatasetCategory) -> Result<RawTable> {
        let url = self.url_for(category);
        info!(category = %category, url = %url, "Fetching snapshot");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SubsidiosError::from_request(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(SubsidiosError::HttpStatus {
                status: response.status().as_u16(),
                url,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SubsidiosError::from_request(e, self.timeout))?;

        let table = parse_delimited(&bytes)?;
        info!(
            category = %category,
            records = table.len(),
            columns = table.columns.len(),
            "Snapshot parsed"
        );
        Ok(table)
    }
}

/// Decode as UTF-8, falling back to Latin-1 (every byte is a code point).
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("Snapshot is not valid UTF-8, decoding as Latin-1");
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Pick `;`, `\t` or `,` by counting occurrences in the header line.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    [b';', b'\t', b',']
        .into_iter()
        .map(|d| (d, header.bytes().filter(|&b| b == d).count()))
        .filter(|&(_, count)| count > 0)
        .max_by_key(|&(_, count)| count)
        .map_or(b',', |(d, _)| d)
}

/// Parse a delimited export with a header row.
pub fn parse_delimited(bytes: &[u8]) -> Result<RawTable> {
    let text = decode_text(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = detect_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(SubsidiosError::ParseError(
            "Snapshot has no header row".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: Record = columns
            .iter()
            .zip(record.iter())
            .map(|(column, field)| {
                let value = if field.is_empty() {
                    Value::Missing
                } else {
                    Value::from(field)
                };
                (column.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}
