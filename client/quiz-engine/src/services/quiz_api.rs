use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ApiSettings;
use crate::error::ApiError;
use crate::metrics::track_api_call;
use crate::models::{Quiz, SubmissionPayload};
use crate::services::result_submitter::ResultSubmitter;
use crate::utils::retry::{retry_async_if, RetryConfig};

/// Where a session gets its quiz and its start precondition from.
#[async_trait]
pub trait QuizSource: Send + Sync {
    async fn fetch_quiz(&self, quiz_id: &str) -> Result<Quiz, ApiError>;

    /// Whether the candidate has already completed this quiz.
    async fn has_attempted(&self, quiz_id: &str, candidate_id: &str) -> Result<bool, ApiError>;
}

#[derive(Debug, Deserialize)]
struct AttemptStatus {
    attempted: bool,
}

/// REST client for the quiz backend.
pub struct HttpQuizApi {
    http_client: Client,
    base_url: Url,
    token: Option<String>,
    fetch_retry: RetryConfig,
}

impl HttpQuizApi {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| ApiError::Other(format!("invalid base url {}: {}", settings.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Other(format!(
                "base url {} cannot carry a path",
                settings.base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|source| ApiError::Request {
                endpoint: settings.base_url.clone(),
                source,
            })?;

        Ok(Self {
            http_client,
            base_url,
            token: settings.token.clone().filter(|t| !t.is_empty()),
            fetch_retry: RetryConfig::with_attempts(settings.fetch_attempts),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        let endpoint = url.path().to_string();
        tracing::debug!("GET {}", url);

        let response = self
            .authorize(self.http_client.get(url.clone()))
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound { endpoint });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::Decode { endpoint, source })
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        retry_async_if(self.fetch_retry.clone(), ApiError::is_transient, || {
            self.get_json(url)
        })
        .await
    }
}

#[async_trait]
impl QuizSource for HttpQuizApi {
    async fn fetch_quiz(&self, quiz_id: &str) -> Result<Quiz, ApiError> {
        let url = self.endpoint(&["quizzes", quiz_id]);
        let quiz: Quiz = track_api_call("fetch_quiz", self.get_with_retry(&url)).await?;

        tracing::info!(
            "Fetched quiz {} ({} questions, {}s)",
            quiz.id,
            quiz.questions.len(),
            quiz.duration_seconds
        );
        Ok(quiz)
    }

    async fn has_attempted(&self, quiz_id: &str, candidate_id: &str) -> Result<bool, ApiError> {
        let url = self.endpoint(&["quizzes", quiz_id, "attempts", candidate_id]);
        let status = track_api_call("check_attempt", self.get_with_retry::<AttemptStatus>(&url)).await;

        match status {
            Ok(status) => Ok(status.attempted),
            // No attempt record yet.
            Err(ApiError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ResultSubmitter for HttpQuizApi {
    async fn submit_result(&self, payload: &SubmissionPayload) -> Result<(), ApiError> {
        let url = self.endpoint(&["quizzes", &payload.quiz_id, "results"]);
        let endpoint = url.path().to_string();

        track_api_call("submit_result", async {
            let response = self
                .authorize(self.http_client.post(url.clone()))
                .json(payload)
                .send()
                .await
                .map_err(|source| ApiError::Request {
                    endpoint: endpoint.clone(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(ApiError::Status {
                    endpoint: endpoint.clone(),
                    status: status.as_u16(),
                    body,
                });
            }

            tracing::info!(
                "Result submitted: quiz={}, candidate={}, answers={}",
                payload.quiz_id,
                payload.candidate_id,
                payload.answers.len()
            );
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> ApiSettings {
        ApiSettings {
            base_url: base_url.to_string(),
            token: None,
            request_timeout_secs: 5,
            fetch_attempts: 1,
        }
    }

    #[test]
    fn endpoint_appends_encoded_segments() {
        let api = HttpQuizApi::new(&settings("http://localhost:8080/api/")).unwrap();
        let url = api.endpoint(&["quizzes", "a b/c", "results"]);
        assert_eq!(url.as_str(), "http://localhost:8080/api/quizzes/a%20b%2Fc/results");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpQuizApi::new(&settings("not a url")).is_err());
        assert!(HttpQuizApi::new(&settings("mailto:quiz@example.com")).is_err());
    }
}
