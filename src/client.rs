use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::config::{DatasetConfig, USER_AGENT};
use crate::error::FetchError;
use crate::page::{Page, PageRequest};
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// HTTP access to one paginated CSV dataset and its count endpoint.
#[derive(Debug, Clone)]
pub struct DatasetClient {
    http: reqwest::Client,
    dataset_url: String,
    count_url: String,
    pub(crate) retry: RetryPolicy,
}

impl DatasetClient {
    pub fn new(config: &DatasetConfig) -> Result<Self> {
        let mut auth =
            HeaderValue::from_str(&config.authorization()).map_err(|_| Error::InvalidCredential)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        // Idle pool matches the page task ceiling.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(config.max_concurrency)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            dataset_url: config.dataset_url.clone(),
            count_url: config.count_url.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Asks the count endpoint how many records the dataset holds.
    ///
    /// Returns `None` on any failure; the caller falls back to an estimate.
    pub async fn fetch_total_rows(&self) -> Option<u64> {
        match self.try_fetch_total_rows().await {
            Ok(total) => {
                tracing::info!(total, "dataset size probed");
                Some(total)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch the row count, progress will be approximate");
                None
            }
        }
    }

    async fn try_fetch_total_rows(&self) -> core::result::Result<u64, FetchError> {
        let response = self.http.get(&self.count_url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::from_status(response.status()));
        }
        let payload = response.json::<Value>().await?;
        parse_count(&payload)
    }

    /// Fetches a one-row page and returns its header record.
    pub async fn fetch_header(&self) -> core::result::Result<csv::StringRecord, FetchError> {
        let body = self.get_csv(&[("$limit", "1".to_string())]).await?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(body.trim().as_bytes());
        match reader.records().next() {
            Some(record) => Ok(record?),
            None => Err(FetchError::Parse("empty response, no header row".into())),
        }
    }

    /// One attempt at a page; retrying is up to the caller.
    pub async fn fetch_page(
        &self,
        request: &PageRequest,
        header: &csv::StringRecord,
    ) -> core::result::Result<Page, FetchError> {
        let body = self.get_csv(&request.query()).await?;
        Page::parse(&body, header)
    }

    async fn get_csv(&self, query: &[(&str, String)]) -> core::result::Result<String, FetchError> {
        tracing::debug!(url = %self.dataset_url, ?query, "GET");
        let response = self
            .http
            .get(&self.dataset_url)
            .header(ACCEPT, "text/csv")
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }
        Ok(response.text().await?)
    }
}

/// Pulls the first value of the first object, e.g. `[{"count_trip_id": "12000"}]`.
fn parse_count(payload: &Value) -> core::result::Result<u64, FetchError> {
    let value = payload
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(Value::as_object)
        .and_then(|row| row.values().next())
        .ok_or_else(|| FetchError::Parse(format!("no count in {payload}")))?;

    let count = match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    count.ok_or_else(|| FetchError::Parse(format!("count is not a non-negative integer: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn count_as_string_or_number() {
        assert_eq!(parse_count(&json!([{"count_trip_id": "12000"}])).unwrap(), 12000);
        assert_eq!(parse_count(&json!([{"count": 7}])).unwrap(), 7);
    }

    #[test]
    fn count_missing_or_garbage() {
        assert!(parse_count(&json!([])).is_err());
        assert!(parse_count(&json!({"count": 1})).is_err());
        assert!(parse_count(&json!([{"count": "many"}])).is_err());
        assert!(parse_count(&json!([{"count": -3}])).is_err());
    }

    #[test]
    fn invalid_token_is_rejected() {
        let config = DatasetConfig::new(Some("bad\ntoken".into())).unwrap();
        assert!(matches!(
            DatasetClient::new(&config),
            Err(Error::InvalidCredential)
        ));
    }
}
