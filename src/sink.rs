//! The output file and the single task allowed to write to it.
//!
//! Producers send whole pages through a bounded channel; the writer drains the
//! channel on a blocking thread and writes each batch before taking the next, so
//! rows from different pages can never interleave.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::StringRecord;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};

use crate::Result;
use crate::error::FetchError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Rows of one page.
#[derive(Debug)]
pub struct RowBatch {
    pub offset: u64,
    pub rows: Vec<StringRecord>,
}

#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<RowBatch>,
}

impl SinkHandle {
    pub async fn send(&self, batch: RowBatch) -> core::result::Result<(), FetchError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| FetchError::WriterClosed)
    }
}

/// Creates (truncating) `path` as a CSV file with a byte-order mark, for
/// spreadsheet tools that otherwise guess the encoding.
///
/// The header is left to the caller, so it is written even when no rows follow.
pub fn bom_csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;
    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file))
}

/// Creates the output file, writes `header`, and starts the writer.
///
/// The returned task resolves to the number of data rows written once every
/// [`SinkHandle`] has been dropped.
pub fn spawn_sink(
    path: &Path,
    header: &StringRecord,
    capacity: usize,
) -> Result<(SinkHandle, JoinHandle<Result<u64>>)> {
    let mut writer = bom_csv_writer(path)?;
    writer.write_record(header)?;
    writer.flush()?;

    let (tx, mut rx) = mpsc::channel::<RowBatch>(capacity.max(1));
    let handle = spawn_blocking(move || -> Result<u64> {
        let mut written = 0u64;
        while let Some(batch) = rx.blocking_recv() {
            for row in &batch.rows {
                writer.write_record(row)?;
            }
            written += batch.rows.len() as u64;
            tracing::debug!(offset = batch.offset, rows = batch.rows.len(), "page written");
        }
        writer.flush()?;
        Ok(written)
    });

    Ok((SinkHandle { tx }, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_rows(path: &Path) -> (StringRecord, Vec<StringRecord>) {
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let header = reader.headers().unwrap().clone();
        let rows = reader.records().map(|r| r.unwrap()).collect();
        (header, rows)
    }

    #[tokio::test]
    async fn header_is_written_even_without_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let header = StringRecord::from(vec!["a", "b"]);

        let (sink, writer) = spawn_sink(&path, &header, 4).unwrap();
        drop(sink);
        assert_eq!(writer.await.unwrap().unwrap(), 0);

        let (read_header, rows) = read_rows(&path);
        assert_eq!(read_header, header);
        assert!(rows.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_batches_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let header = StringRecord::from(vec!["page", "row", "check"]);
        let (sink, writer) = spawn_sink(&path, &header, 2).unwrap();

        let mut producers = Vec::new();
        for page in 0..16u64 {
            let sink = sink.clone();
            producers.push(tokio::spawn(async move {
                let rows = (0..200)
                    .map(|row| {
                        let p = page.to_string();
                        StringRecord::from(vec![p.clone(), row.to_string(), p])
                    })
                    .collect();
                sink.send(RowBatch { offset: page, rows }).await.unwrap();
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        drop(sink);
        assert_eq!(writer.await.unwrap().unwrap(), 16 * 200);

        let (_, rows) = read_rows(&path);
        assert_eq!(rows.len(), 16 * 200);
        // Each batch lands as one contiguous, in-order run.
        for chunk in rows.chunks(200) {
            let page = &chunk[0][0];
            for (i, row) in chunk.iter().enumerate() {
                assert_eq!(&row[0], page);
                assert_eq!(&row[2], page);
                assert_eq!(row[1].parse::<usize>().unwrap(), i);
            }
        }
    }

    #[tokio::test]
    async fn send_after_writer_stops_fails() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = SinkHandle { tx };
        let err = sink
            .send(RowBatch {
                offset: 0,
                rows: vec![StringRecord::from(vec!["x"])],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::WriterClosed));
    }
}
