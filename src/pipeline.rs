use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;

use crate::client::DatasetClient;
use crate::config::DatasetConfig;
use crate::page::{PageOutcome, PageReport, PageRequest, fetch_page, page_offsets};
use crate::progress::{Progress, RunSummary};
use crate::retry::FailureKind;
use crate::sink::spawn_sink;
use crate::{Error, Result};

/// Downloads every page of the dataset into `config.output`.
///
/// Fails only if the client can't be built, the header can't be fetched, or
/// the output file can't be written. Per-page failures are recorded in the
/// returned summary.
pub async fn download_dataset(config: &DatasetConfig) -> Result<RunSummary> {
    let client = Arc::new(DatasetClient::new(config)?);

    let expected_rows = client.fetch_total_rows().await;
    let total = expected_rows.unwrap_or(config.fallback_total_rows);

    let header = Arc::new(client.fetch_header().await.map_err(Error::HeaderUnavailable)?);
    tracing::info!(columns = header.len(), "header fetched");

    let offsets = page_offsets(total, config.page_size, config.max_offset);
    let (sink, writer) = spawn_sink(&config.output, &header, config.max_concurrency)?;
    tracing::info!(
        pages = offsets.len(),
        output = %config.output.display(),
        "downloading"
    );

    let mut progress = Progress::new(offsets.len() as u64, config.show_progress);
    let mut results = futures::stream::iter(offsets)
        .map(|offset| {
            let client = client.clone();
            let header = header.clone();
            let sink = sink.clone();
            let request = PageRequest {
                offset,
                limit: config.page_size,
                order: config.order.clone(),
            };
            let handle = tokio::spawn(async move {
                fetch_page(&client, request, &header, &sink).await
            });
            async move { (offset, handle.await) }
        })
        .buffer_unordered(config.max_concurrency.max(1));

    while let Some((offset, joined)) = results.next().await {
        let report = joined.unwrap_or_else(|e| PageReport {
            offset,
            attempts: 1,
            outcome: PageOutcome::Failed {
                kind: FailureKind::Permanent,
                reason: format!("page task died: {e}"),
            },
        });
        progress.record(report);
    }
    drop(results);
    drop(sink);

    let written = writer.await??;
    let summary = progress.finish(config.output.clone(), expected_rows);
    if written != summary.rows_written {
        tracing::warn!(
            written,
            counted = summary.rows_written,
            "writer and page tally disagree"
        );
    }

    tracing::info!(
        rows = summary.rows_written,
        ok = summary.pages_ok,
        empty = summary.pages_empty,
        failed = summary.pages_failed,
        "download finished"
    );
    Ok(summary)
}

/// Writes the summary as pretty JSON.
pub fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}
