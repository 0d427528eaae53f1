use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dataset_spider_rs::config::{self, AuthScheme};
use dataset_spider_rs::{DatasetConfig, PodcastConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a paginated CSV dataset
    Dataset(DatasetArgs),
    /// Scrape podcast episodes and transcripts
    Podcast(PodcastArgs),
}

#[derive(clap::Args, Debug)]
struct DatasetArgs {
    #[clap(long, env = config::TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    #[clap(long, value_enum, default_value_t = AuthScheme::OAuth)]
    auth_scheme: AuthScheme,

    #[clap(long, default_value = config::DATASET_URL)]
    dataset_url: String,

    #[clap(long, default_value = config::COUNT_URL)]
    count_url: String,

    #[clap(short, long, default_value_t = config::MAX_CONCURRENT_REQUESTS)]
    parallel_requests: usize,

    #[clap(long, default_value_t = config::PAGE_LIMIT)]
    page_size: u64,

    #[clap(long, default_value_t = config::MAX_OFFSET)]
    max_offset: u64,

    #[clap(long, default_value = ":id")]
    order: String,

    #[clap(long, default_value_t = 60)]
    timeout_secs: u64,

    #[clap(short, long, default_value = config::OUTPUT_FILENAME)]
    output: PathBuf,

    /// Write a JSON run summary, including every failed page, to this path
    #[clap(long)]
    report: Option<PathBuf>,

    #[clap(long)]
    no_progress: bool,
}

#[derive(clap::Args, Debug)]
struct PodcastArgs {
    #[clap(long, env = config::PODCAST_TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    #[clap(long, default_value = config::PODCAST_API_BASE)]
    api_base: String,

    #[clap(long, default_value_t = config::PODCAST_ID)]
    podcast_id: u64,

    #[clap(long, default_value_t = 99)]
    max_pages: u32,

    #[clap(long, default_value_t = 20)]
    page_size: u32,

    #[clap(long, default_value_t = 1000)]
    delay_ms: u64,

    #[clap(long, default_value = "episodes.csv")]
    episodes_output: PathBuf,

    #[clap(long, default_value = "transcripts.csv")]
    transcripts_output: PathBuf,
}

impl DatasetArgs {
    fn into_config(self) -> dataset_spider_rs::Result<DatasetConfig> {
        let mut config = DatasetConfig::new(self.token)?;
        config.auth_scheme = self.auth_scheme;
        config.dataset_url = self.dataset_url;
        config.count_url = self.count_url;
        config.max_concurrency = self.parallel_requests;
        config.page_size = self.page_size;
        config.max_offset = self.max_offset;
        config.order = self.order;
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config.output = self.output;
        config.report = self.report;
        config.show_progress = !self.no_progress;
        Ok(config)
    }
}

impl PodcastArgs {
    fn into_config(self) -> dataset_spider_rs::Result<PodcastConfig> {
        let mut config = PodcastConfig::new(self.token)?;
        config.api_base = self.api_base;
        config.podcast_id = self.podcast_id;
        config.max_pages = self.max_pages;
        config.page_size = self.page_size;
        config.delay = Duration::from_millis(self.delay_ms);
        config.episodes_output = self.episodes_output;
        config.transcripts_output = self.transcripts_output;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Dataset(args) => {
            let config = args.into_config()?;
            println!("saving to {}", config.output.display());

            let summary = dataset_spider_rs::download_dataset(&config).await?;
            if let Some(report) = &config.report {
                dataset_spider_rs::write_report(&summary, report)?;
            }

            println!("done, data saved to {}", summary.destination.display());
            println!(
                "{} rows written ({} pages ok, {} empty, {} failed)",
                summary.rows_written, summary.pages_ok, summary.pages_empty, summary.pages_failed
            );
            for failure in &summary.failures {
                println!(
                    "  offset {} failed after {} attempt(s): {}",
                    failure.offset, failure.attempts, failure.reason
                );
            }
        }
        Command::Podcast(args) => {
            let config = args.into_config()?;
            let summary = dataset_spider_rs::scrape_podcast(&config).await?;
            println!(
                "{} episodes -> {}, {} transcript lines -> {} ({} episodes without transcript)",
                summary.episodes,
                config.episodes_output.display(),
                summary.transcripts,
                config.transcripts_output.display(),
                summary.episodes_without_transcript
            );
        }
    }

    Ok(())
}
