//! HTTP client for the external diagnosis completion service.

use super::{DiagnosisOutcome, DiagnosisPrompt, DiagnosisService, UpstreamError};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpDiagnosisService {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

impl HttpDiagnosisService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            max_elapsed: Duration::from_secs(20),
        }
    }

    /// Cap on total time spent retrying transient failures.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    fn diagnose_url(&self) -> String {
        format!("{}/diagnose", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DiagnosisService for HttpDiagnosisService {
    async fn diagnose(&self, prompt: &DiagnosisPrompt) -> Result<DiagnosisOutcome, UpstreamError> {
        let url = self.diagnose_url();
        debug!(
            "Requesting diagnosis: {} guided answers, {} media refs",
            prompt.guided_answers.len(),
            prompt.media_refs.len()
        );

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let outcome = retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(prompt)
                .timeout(Duration::from_secs(30))
                .send()
                .await
                .map_err(|e| backoff::Error::transient(UpstreamError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(UpstreamError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(UpstreamError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(UpstreamError::Http {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<DiagnosisOutcome>()
                .await
                .map_err(|e| backoff::Error::permanent(UpstreamError::Parse(e.to_string())))
        })
        .await?;

        outcome.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnose_url_trims_trailing_slash() {
        let svc = HttpDiagnosisService::new("http://diag.local/".to_string());
        assert_eq!(svc.diagnose_url(), "http://diag.local/diagnose");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let svc = HttpDiagnosisService::new("http://127.0.0.1:9".to_string())
            .with_max_elapsed(Duration::from_millis(1));
        let err = svc
            .diagnose(&DiagnosisPrompt {
                description: "sink".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Network(_)), "{:?}", err);
    }
}
