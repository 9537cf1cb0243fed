//! Prometheus HTTP API: range queries

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// One labelled series from a range query
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Series {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// (unix seconds, sample value as Prometheus formats it)
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryRangeData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<Series>,
}

/// Blocking client for one Prometheus server
pub struct PrometheusClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PrometheusClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn query_range_url(&self) -> String {
        format!("{}/api/v1/query_range", self.base_url)
    }

    /// Range query that reports every failure as an error
    pub fn try_query_range(&self, query: &str, start: f64, end: f64, step: &str) -> Result<Vec<Series>> {
        let url = self.query_range_url();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", step.to_string()),
            ])
            .send()
            .with_context(|| format!("Error connecting to Prometheus ({})", url))?
            .error_for_status()
            .with_context(|| format!("Prometheus rejected query '{}'", query))?;

        let body: QueryRangeResponse = response
            .json()
            .with_context(|| format!("Unexpected response from Prometheus for '{}'", query))?;

        if body.status != "success" {
            return Err(anyhow!(
                "Error in Prometheus query '{}': {} {}",
                query,
                body.error_type.unwrap_or_default(),
                body.error.unwrap_or_else(|| "Unknown error".to_string())
            ));
        }

        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }

    /// Range query; any failure is logged and yields no series
    pub fn query_range(&self, query: &str, start: f64, end: f64, step: &str) -> Vec<Series> {
        crate::log_info!(
            "Querying Prometheus: {} (from {} to {}, step {})",
            query,
            start,
            end,
            step
        );

        match self.try_query_range(query, start, end, step) {
            Ok(series) => {
                if series.is_empty() {
                    crate::log_warn!("No data returned from Prometheus for query: {}", query);
                }
                series
            }
            Err(e) => {
                crate::log_warn!("{:#}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // The blocking client must live outside the async runtime's worker threads
    async fn query(uri: String, q: &'static str) -> Vec<Series> {
        tokio::task::spawn_blocking(move || {
            PrometheusClient::new(&uri)
                .unwrap()
                .query_range(q, 1718000000.0, 1718000060.0, "15s")
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = PrometheusClient::new("http://localhost:9090/").unwrap();
        assert_eq!(
            client.query_range_url(),
            "http://localhost:9090/api/v1/query_range"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_range_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("query", "up"))
            .and(query_param("step", "15s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "resultType": "matrix",
                    "result": [{
                        "metric": {"job": "prometheus"},
                        "values": [[1718000000.5, "1"], [1718000015, "1"]]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let series = query(server.uri(), "up").await;
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].metric["job"], "prometheus");
        assert_eq!(series[0].values[0], (1718000000.5, "1".to_string()));
        assert_eq!(series[0].values.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_error_status_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "errorType": "bad_data",
                "error": "parse error"
            })))
            .mount(&server)
            .await;

        assert!(query(server.uri(), "up{").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_failure_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(query(server.uri(), "up").await.is_empty());
    }

    #[test]
    fn test_unreachable_server_yields_nothing() {
        let client = PrometheusClient::new("http://127.0.0.1:1").unwrap();
        assert!(client.query_range("up", 0.0, 60.0, "15s").is_empty());
        assert!(client.try_query_range("up", 0.0, 60.0, "15s").is_err());
    }
}
