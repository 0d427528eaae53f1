use std::time::Duration;

use dataset_spider_rs::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, dir: &std::path::Path) -> PodcastConfig {
    let mut config = PodcastConfig::new(Some("jwt".into())).unwrap();
    config.api_base = server.uri();
    config.podcast_id = 72263;
    config.page_size = 2;
    config.delay = Duration::ZERO;
    config.episodes_output = dir.join("episodes.csv");
    config.transcripts_output = dir.join("transcripts.csv");
    config.retry.initial_delay = Duration::from_millis(10);
    config
}

async fn mount_list(server: &MockServer, start: u32, entities: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/list/episode"))
        .and(header("Authorization", "Bearer jwt"))
        .and(body_partial_json(json!({
            "start": start,
            "count": 2,
            "filters": { "podcast_id": 72263 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entities": entities })))
        .mount(server)
        .await;
}

fn read(path: &std::path::Path) -> String {
    std::fs::read_to_string(path)
        .unwrap()
        .trim_start_matches('\u{feff}')
        .to_string()
}

#[tokio::test]
async fn scrapes_episodes_until_empty_page() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_list(
        &server,
        0,
        json!([
            { "id": 11, "air_date": "2025-02-01", "length": 1800, "title": "First", "description": "a, b" },
            { "id": 12, "title": "Second" },
        ]),
    )
    .await;
    mount_list(&server, 2, json!([])).await;
    Mock::given(method("GET"))
        .and(path("/episodes/11/transcript"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "utterance": "hello", "timestamp": [0.0, 1.5] },
            { "utterance": "world", "timestamp": [1.5, 3.0, 0.75] },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/episodes/12/transcript"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server, dir.path());
    let summary = scrape_podcast(&config).await.unwrap();

    assert_eq!(
        summary,
        PodcastSummary {
            episodes: 2,
            transcripts: 2,
            episodes_without_transcript: 1,
        }
    );
    assert_eq!(
        read(&config.episodes_output),
        "episode_id,release_date,duration,title,description\n\
         11,2025-02-01,1800,First,\"a, b\"\n\
         12,,,Second,\n"
    );
    assert_eq!(
        read(&config.transcripts_output),
        "episode_id,utterance,start_time,end_time\n\
         11,hello,0.0,1.5\n\
         11,world,1.5,3.0\n"
    );
}

#[tokio::test]
async fn rejected_token_stops_paging() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/list/episode"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server, dir.path());
    let summary = scrape_podcast(&config).await.unwrap();

    assert_eq!(summary, PodcastSummary::default());
    assert_eq!(
        read(&config.transcripts_output),
        "episode_id,utterance,start_time,end_time\n"
    );
}
