//! Episode metadata and transcripts for one podcast.
//!
//! Episodes are listed page by page through the list endpoint; each episode's
//! transcript is then fetched on its own. A missing transcript never stops the
//! scrape.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::Result;
use crate::config::{PodcastConfig, USER_AGENT};
use crate::error::FetchError;
use crate::sink::bom_csv_writer;

pub const EPISODE_COLUMNS: [&str; 5] = [
    "episode_id",
    "release_date",
    "duration",
    "title",
    "description",
];
pub const TRANSCRIPT_COLUMNS: [&str; 4] = ["episode_id", "utterance", "start_time", "end_time"];

#[derive(Debug, Deserialize)]
struct EpisodeList {
    #[serde(default)]
    entities: Vec<Episode>,
}

#[derive(Debug, Deserialize)]
struct Episode {
    id: u64,
    air_date: Option<String>,
    length: Option<serde_json::Number>,
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    utterance: Option<String>,
    /// `[start, end, ...]`; anything past the first two entries is ignored.
    #[serde(default)]
    timestamp: Option<Vec<f64>>,
}

impl Utterance {
    fn span(&self) -> (Option<f64>, Option<f64>) {
        let timestamp = self.timestamp.as_deref().unwrap_or_default();
        (timestamp.first().copied(), timestamp.get(1).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRow {
    pub episode_id: u64,
    pub release_date: Option<String>,
    pub duration: Option<serde_json::Number>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl From<Episode> for EpisodeRow {
    fn from(episode: Episode) -> Self {
        Self {
            episode_id: episode.id,
            release_date: episode.air_date,
            duration: episode.length,
            title: episode.title,
            description: episode.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptRow {
    pub episode_id: u64,
    pub utterance: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PodcastSummary {
    pub episodes: u64,
    pub transcripts: u64,
    pub episodes_without_transcript: u64,
}

struct PodcastClient<'a> {
    http: reqwest::Client,
    config: &'a PodcastConfig,
}

impl<'a> PodcastClient<'a> {
    fn new(config: &'a PodcastConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    async fn list_episodes(&self, start: u64) -> core::result::Result<Vec<Episode>, FetchError> {
        let body = json!({
            "start": start,
            "count": self.config.page_size,
            "sort_order": "SORT_ORDER_RECENT",
            "sort_direction": "desc",
            "filters": { "podcast_id": self.config.podcast_id },
            "options": {},
            "omit_results": false,
            "total_hits": false,
        });
        let response = self
            .http
            .post(format!("{}/list/episode", self.config.api_base))
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::from_status(response.status()));
        }
        let text = response.text().await?;
        let list: EpisodeList =
            serde_json::from_str(&text).map_err(|e| FetchError::Parse(e.to_string()))?;
        Ok(list.entities)
    }

    async fn transcript(&self, episode_id: u64) -> core::result::Result<Vec<Utterance>, FetchError> {
        let response = self
            .http
            .get(format!(
                "{}/episodes/{episode_id}/transcript",
                self.config.api_base
            ))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::from_status(response.status()));
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Scrapes all episodes and transcripts and writes them to the configured files.
pub async fn scrape_podcast(config: &PodcastConfig) -> Result<PodcastSummary> {
    let client = PodcastClient::new(config)?;
    let mut episodes = Vec::new();
    let mut transcripts = Vec::new();
    let mut summary = PodcastSummary::default();

    for page in 0..config.max_pages {
        let start = page_start(page, config.page_size);
        tracing::info!(page = page + 1, start, "requesting episode list");

        let attempted = config.retry.run(|| client.list_episodes(start)).await;
        let entities = match attempted.result {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(start, error = %e, "episode list failed, stopping");
                break;
            }
        };
        if entities.is_empty() {
            tracing::info!(start, "no more episodes");
            break;
        }

        for episode in entities {
            let episode_id = episode.id;
            // One try only: most missing transcripts are plain 404s.
            let utterances = match client.transcript(episode_id).await {
                Ok(utterances) => utterances,
                Err(e) => {
                    tracing::info!(episode_id, error = %e, "no transcript");
                    Vec::new()
                }
            };
            if utterances.is_empty() {
                summary.episodes_without_transcript += 1;
            }
            transcripts.extend(utterances.into_iter().map(|u| {
                let (start_time, end_time) = u.span();
                TranscriptRow {
                    episode_id,
                    utterance: u.utterance,
                    start_time,
                    end_time,
                }
            }));
            episodes.push(EpisodeRow::from(episode));

            if !config.delay.is_zero() {
                tokio::time::sleep(config.delay).await;
            }
        }
    }

    write_rows(&config.episodes_output, &EPISODE_COLUMNS, &episodes)?;
    write_rows(&config.transcripts_output, &TRANSCRIPT_COLUMNS, &transcripts)?;

    summary.episodes = episodes.len() as u64;
    summary.transcripts = transcripts.len() as u64;
    tracing::info!(
        episodes = summary.episodes,
        transcripts = summary.transcripts,
        "podcast scrape finished"
    );
    Ok(summary)
}

/// Offset of the first episode on `page`, widened so large pages can't overflow.
fn page_start(page: u32, page_size: u32) -> u64 {
    u64::from(page) * u64::from(page_size)
}

fn write_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = bom_csv_writer(path)?;
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
