use csv::StringRecord;
use serde::Serialize;

use crate::client::DatasetClient;
use crate::error::FetchError;
use crate::retry::{Classify, FailureKind};
use crate::sink::{RowBatch, SinkHandle};

/// One `$limit`/`$offset`/`$order` request against the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
    pub order: String,
}

impl PageRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("$limit", self.limit.to_string()),
            ("$offset", self.offset.to_string()),
            ("$order", self.order.clone()),
        ]
    }
}

/// Page offsets for a dataset of `total` rows, dropping those past `max_offset`.
pub fn page_offsets(total: u64, page_size: u64, max_offset: u64) -> Vec<u64> {
    if page_size == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(page_size as usize)
        .take_while(|&offset| offset <= max_offset)
        .collect()
}

/// Data rows of one page, already laid out in the run header's column order.
#[derive(Debug, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<StringRecord>,
}

impl Page {
    /// Parses a CSV page body whose first line is its own header.
    pub fn parse(body: &str, header: &StringRecord) -> Result<Self, FetchError> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(Page::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(body.as_bytes());
        let page_header = reader.headers()?.clone();
        let layout = column_layout(&page_header, header)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(match &layout {
                None => record,
                Some(indices) => indices.iter().map(|&i| &record[i]).collect(),
            });
        }
        Ok(Page { rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `None` when the page already matches the run header, otherwise the source
/// index of each run-header column.
fn column_layout(
    page_header: &StringRecord,
    header: &StringRecord,
) -> Result<Option<Vec<usize>>, FetchError> {
    if page_header == header {
        return Ok(None);
    }
    header
        .iter()
        .map(|column| {
            page_header
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| FetchError::Parse(format!("column `{column}` missing from page")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Ok { rows: u64 },
    Empty,
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub offset: u64,
    pub attempts: u32,
    pub outcome: PageOutcome,
}

impl PageReport {
    pub fn failed(offset: u64, attempts: u32, error: &FetchError) -> Self {
        Self {
            offset,
            attempts,
            outcome: PageOutcome::Failed {
                kind: error.kind(),
                reason: error.to_string(),
            },
        }
    }
}

/// Fetches the page at `offset` with retries and hands its rows to the sink.
///
/// Never fails: every problem ends up in the returned report.
pub async fn fetch_page(
    client: &DatasetClient,
    request: PageRequest,
    header: &StringRecord,
    sink: &SinkHandle,
) -> PageReport {
    let offset = request.offset;
    let attempted = client
        .retry
        .run(|| client.fetch_page(&request, header))
        .await;
    let attempts = attempted.attempts;

    let page = match attempted.result {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(offset, attempts, error = %e, "page failed");
            return PageReport::failed(offset, attempts, &e);
        }
    };

    if page.is_empty() {
        tracing::debug!(offset, "page is empty");
        return PageReport {
            offset,
            attempts,
            outcome: PageOutcome::Empty,
        };
    }

    let rows = page.rows.len() as u64;
    if let Err(e) = sink.send(RowBatch { offset, rows: page.rows }).await {
        tracing::warn!(offset, error = %e, "page fetched but not written");
        return PageReport::failed(offset, attempts, &e);
    }

    PageReport {
        offset,
        attempts,
        outcome: PageOutcome::Ok { rows },
    }
}
