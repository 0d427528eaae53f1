//! Concurrent paginated download of tabular open-data APIs into CSV files,
//! plus a small scraper for podcast episodes and transcripts.

pub mod client;
pub mod config;
pub mod error;
pub mod page;
pub mod pipeline;
pub mod podcast;
pub mod progress;
pub mod retry;
pub mod sink;

pub use config::{AuthScheme, DatasetConfig, PodcastConfig};
pub use error::{Error, FetchError, Result};
pub use pipeline::{download_dataset, write_report};
pub use podcast::{PodcastSummary, scrape_podcast};
pub use progress::RunSummary;
pub use retry::RetryPolicy;
