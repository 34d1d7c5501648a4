use std::time::Duration;

use tracing::{info, warn};
use waysampler_core::{Error, QueryTask, loading::OverpassResponse};

use crate::config::OverpassConfig;

/// Overpass API client with a bounded number of attempts per query
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl OverpassClient {
    pub fn new(config: &OverpassConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs) + 30))
            .user_agent(concat!("waysampler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Runs `query`, retrying transport failures, error statuses and HTML
    /// error pages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoData`] once every attempt has failed.
    pub async fn fetch(&self, query: &str) -> Result<OverpassResponse, Error> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            match self.try_fetch(query).await {
                Ok(response) => {
                    info!(
                        attempt,
                        elements = response.elements.len(),
                        "Overpass query succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(attempt, max = self.max_retries, error = %e, "Overpass query failed");
                    last_error = e.to_string();
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(Error::NoData(format!(
            "Overpass query failed after {} attempts: {last_error}",
            self.max_retries
        )))
    }

    async fn try_fetch(&self, query: &str) -> Result<OverpassResponse, Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(|e| Error::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::NetworkError(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::NetworkError(format!("HTTP {status}")));
        }
        // Overpass reports errors such as rate limiting as HTML pages
        if body.trim_start().starts_with('<') {
            return Err(Error::NetworkError(
                "Overpass returned an HTML error page".to_string(),
            ));
        }
        OverpassResponse::from_json_str(&body)
    }

    /// Runs `query` on the tokio runtime; the pipeline polls the returned
    /// task while initializing
    pub fn spawn_query(&self, query: String) -> QueryTask {
        let (sender, task) = QueryTask::channel();
        let client = self.clone();
        tokio::spawn(async move {
            let _ = sender.send(client.fetch(&query).await);
        });
        task
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    use super::*;

    const BODY: &str = r#"{"elements": [
        {"type": "node", "id": 1, "lat": 52.5, "lon": 13.4},
        {"type": "node", "id": 2, "lat": 52.5, "lon": 13.401},
        {"type": "way", "id": 7, "nodes": [1, 2], "tags": {"highway": "primary"}}
    ]}"#;

    fn client(server: &MockServer) -> OverpassClient {
        OverpassClient::new(&OverpassConfig {
            endpoint: format!("{}/api/interpreter", server.uri()),
            retry_delay_ms: 1,
            ..OverpassConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_html_error_page_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body>rate_limited</body></html>"),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .and(body_string_contains("data="))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).fetch("[out:json];").await.unwrap();
        assert_eq!(response.elements.len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(504))
            .expect(3)
            .mount(&server)
            .await;

        let result = client(&server).fetch("[out:json];").await;
        assert!(matches!(result, Err(Error::NoData(_))));
    }

    #[tokio::test]
    async fn test_spawned_query_resolves_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let mut task = client(&server).spawn_query("[out:json];".to_string());
        let result = loop {
            if let Some(result) = task.poll() {
                break result;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(result.unwrap().elements.len(), 3);
    }
}
