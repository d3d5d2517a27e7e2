//! People-search client used for enrichment.
//!
//! [`PeopleSearch`] is the seam the enrichment pass depends on: a query goes
//! in, ranked candidate profiles come out. [`ExaClient`] implements it against
//! the Exa search API; tests substitute their own implementations.

use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use lobgraph_shared::{LobGraphError, Result, SearchConfig};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One ranked candidate returned by a people search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl SearchCandidate {
    pub fn new(url: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            url: url.into(),
            title: title.map(String::from),
        }
    }
}

/// Candidates in ranking order, plus the raw payload for auditing.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub candidates: Vec<SearchCandidate>,
    pub raw: serde_json::Value,
}

/// A people-search backend.
pub trait PeopleSearch: Send + Sync {
    /// Run `query`, asking for up to `num_results` ranked candidates.
    fn search(
        &self,
        query: &str,
        num_results: u32,
    ) -> impl Future<Output = Result<SearchResponse>> + Send;
}

// ---------------------------------------------------------------------------
// Exa
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    search_type: &'static str,
    category: &'static str,
    num_results: u32,
    use_autoprompt: bool,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<SearchCandidate>,
}

/// Exa API client restricted to the `people` category.
pub struct ExaClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ExaClient {
    /// Build a client for `config.endpoint` authenticated with `api_key`.
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LobGraphError::Search(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
        })
    }
}

impl PeopleSearch for ExaClient {
    #[instrument(skip_all, fields(query = %query))]
    async fn search(&self, query: &str, num_results: u32) -> Result<SearchResponse> {
        let body = ExaRequest {
            query,
            search_type: "auto",
            category: "people",
            num_results,
            use_autoprompt: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LobGraphError::Search(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LobGraphError::Search(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LobGraphError::Search(format!("invalid response body: {e}")))?;
        let parsed: ExaResponse = serde_json::from_value(raw.clone())?;

        debug!(candidates = parsed.results.len(), "search returned");
        Ok(SearchResponse {
            candidates: parsed.results,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(endpoint: String) -> SearchConfig {
        SearchConfig {
            endpoint,
            num_results: 5,
            request_delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn request_body_shape() {
        let body = ExaRequest {
            query: "github.com/alice",
            search_type: "auto",
            category: "people",
            num_results: 5,
            use_autoprompt: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "query": "github.com/alice",
                "type": "auto",
                "category": "people",
                "numResults": 5,
                "useAutoprompt": true,
            })
        );
    }

    #[tokio::test]
    async fn parses_ranked_candidates() {
        let server = wiremock::MockServer::start().await;
        let payload = serde_json::json!({
            "requestId": "abc",
            "results": [
                {"url": "https://www.linkedin.com/in/alice", "title": "Alice Smith - Engineer - Acme | LinkedIn", "id": "1"},
                {"url": "https://alice.dev", "id": "2"}
            ]
        });

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/search"))
            .and(wiremock::matchers::header("x-api-key", "test-key"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "query": "github.com/alice",
                "category": "people",
                "numResults": 5,
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(&payload))
            .expect(1)
            .mount(&server)
            .await;

        let client = ExaClient::new(&config(format!("{}/search", server.uri())), "test-key").unwrap();
        let response = client.search("github.com/alice", 5).await.unwrap();

        assert_eq!(
            response.candidates,
            vec![
                SearchCandidate::new(
                    "https://www.linkedin.com/in/alice",
                    Some("Alice Smith - Engineer - Acme | LinkedIn")
                ),
                SearchCandidate::new("https://alice.dev", None),
            ]
        );
        assert_eq!(response.raw, payload);
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({})),
            )
            .mount(&server)
            .await;

        let client = ExaClient::new(&config(server.uri()), "k").unwrap();
        let response = client.search("nobody", 5).await.unwrap();
        assert!(response.candidates.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_search_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = ExaClient::new(&config(server.uri()), "wrong").unwrap();
        let err = client.search("github.com/alice", 5).await.unwrap_err();
        assert!(matches!(err, LobGraphError::Search(_)));
        assert!(err.to_string().contains("401"));
    }
}
