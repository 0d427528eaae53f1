use std::io::IsTerminal;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::page::{PageOutcome, PageReport};
use crate::retry::FailureKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageFailure {
    pub offset: u64,
    pub attempts: u32,
    pub kind: FailureKind,
    pub reason: String,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub destination: PathBuf,
    /// Row count reported by the probe, if it answered.
    pub expected_rows: Option<u64>,
    pub pages_total: u64,
    pub pages_ok: u64,
    pub pages_empty: u64,
    pub pages_failed: u64,
    pub rows_written: u64,
    pub failures: Vec<PageFailure>,
}

impl RunSummary {
    pub fn pages_done(&self) -> u64 {
        self.pages_ok + self.pages_empty + self.pages_failed
    }
}

/// Counts finished pages and drives the progress bar.
pub struct Progress {
    bar: ProgressBar,
    summary: RunSummary,
}

impl Progress {
    pub fn new(pages: u64, visible: bool) -> Self {
        Self {
            bar: page_bar(pages, visible),
            summary: RunSummary {
                pages_total: pages,
                ..RunSummary::default()
            },
        }
    }

    /// Call exactly once per page task, whatever its outcome.
    pub fn record(&mut self, report: PageReport) {
        match report.outcome {
            PageOutcome::Ok { rows } => {
                self.summary.pages_ok += 1;
                self.summary.rows_written += rows;
            }
            PageOutcome::Empty => self.summary.pages_empty += 1,
            PageOutcome::Failed { kind, reason } => {
                self.summary.pages_failed += 1;
                self.summary.failures.push(PageFailure {
                    offset: report.offset,
                    attempts: report.attempts,
                    kind,
                    reason,
                });
            }
        }
        self.bar.set_message(format!("{} rows", self.summary.rows_written));
        self.bar.inc(1);
    }

    pub fn finish(mut self, destination: PathBuf, expected_rows: Option<u64>) -> RunSummary {
        self.bar.finish_and_clear();
        self.summary.failures.sort_by_key(|f| f.offset);
        self.summary.destination = destination;
        self.summary.expected_rows = expected_rows;
        self.summary
    }
}

fn page_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.cyan} pages [{bar:40.cyan/blue}] {pos}/{len} ({percent:>3}%) | {msg}",
    ) {
        bar.set_style(style);
    }
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(offset: u64, attempts: u32, outcome: PageOutcome) -> PageReport {
        PageReport {
            offset,
            attempts,
            outcome,
        }
    }

    #[test]
    fn only_ok_pages_add_rows() {
        let mut progress = Progress::new(4, false);
        progress.record(report(10000, 1, PageOutcome::Ok { rows: 2000 }));
        progress.record(report(15000, 1, PageOutcome::Empty));
        progress.record(report(
            5000,
            1,
            PageOutcome::Failed {
                kind: FailureKind::Authorization,
                reason: "403".into(),
            },
        ));
        progress.record(report(0, 2, PageOutcome::Ok { rows: 5000 }));

        let summary = progress.finish(PathBuf::from("out.csv"), Some(12000));
        assert_eq!(summary.rows_written, 7000);
        assert_eq!(summary.pages_ok, 2);
        assert_eq!(summary.pages_empty, 1);
        assert_eq!(summary.pages_failed, 1);
        assert_eq!(summary.pages_done(), summary.pages_total);
        assert_eq!(summary.failures[0].offset, 5000);
        assert_eq!(summary.failures[0].kind, FailureKind::Authorization);
    }

    #[test]
    fn hidden_bar_still_counts() {
        let mut progress = Progress::new(1, false);
        assert!(progress.bar.is_hidden());
        progress.record(report(0, 1, PageOutcome::Empty));
        assert_eq!(progress.bar.position(), 1);
    }

    #[test]
    fn summary_serializes_failure_kind() {
        let mut progress = Progress::new(1, false);
        progress.record(report(
            0,
            3,
            PageOutcome::Failed {
                kind: FailureKind::Transient,
                reason: "timeout".into(),
            },
        ));
        let json = serde_json::to_value(progress.finish(PathBuf::from("x.csv"), None)).unwrap();
        assert_eq!(json["failures"][0]["kind"], "transient");
        assert_eq!(json["failures"][0]["attempts"], 3);
    }
}
