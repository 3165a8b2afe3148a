/// Grading Client - Transport to the External Grading Backend
///
/// **Responsibility:**
/// Encode a solution as a request, make exactly one outbound call, and
/// normalize whatever comes back into a GradingResult.
///
/// **Critical Properties:**
/// - One network call per invocation, no internal retries
/// - Retry, backoff and time limits belong to the Dispatcher
/// - Business validation happens before the payload reaches this layer
///
/// The backend answers either synchronously (`ok`/`not_ok` with output and
/// return code) or asynchronously (`running` plus a tracking handle to
/// poll later); both shapes decode into the same GradingResult.

use async_trait::async_trait;
use gradely_common::config::GraderConfig;
use gradely_common::error::GradingError;
use gradely_common::types::{GradingRequest, GradingResult, SolutionKind};

const API_KEY_HEADER: &str = "X-Grader-Key";

/// Seam between the dispatch/poll logic and the wire. Production uses
/// [`HttpGraderBackend`]; tests script responses through this trait.
#[async_trait]
pub trait GraderBackend: Send + Sync {
    /// Send a solution for grading.
    async fn submit(&self, request: &GradingRequest) -> Result<GradingResult, GradingError>;

    /// Check on a previously acknowledged grading run.
    async fn poll(
        &self,
        tracking_handle: &str,
        kind: SolutionKind,
    ) -> Result<GradingResult, GradingError>;
}

/// HTTP implementation of the grader protocol.
pub struct HttpGraderBackend {
    http: reqwest::Client,
    config: GraderConfig,
}

impl HttpGraderBackend {
    pub fn new(config: GraderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn grade_url(&self) -> String {
        format!("{}/grade", self.config.base_url.trim_end_matches('/'))
    }

    /// The tracking handle is the grader-relative check location.
    fn poll_url(&self, tracking_handle: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            tracking_handle.trim_start_matches('/')
        )
    }

    fn with_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn decode(response: reqwest::Response) -> Result<GradingResult, GradingError> {
        let status = response.status();
        if !status.is_success() {
            return Err(GradingError::Transport(format!(
                "grader returned {}",
                status
            )));
        }
        response
            .json::<GradingResult>()
            .await
            .map_err(|e| GradingError::Transport(format!("undecodable grader response: {}", e)))
    }
}

#[async_trait]
impl GraderBackend for HttpGraderBackend {
    async fn submit(&self, request: &GradingRequest) -> Result<GradingResult, GradingError> {
        let response = self
            .with_api_key(self.http.post(self.grade_url()))
            .json(request)
            .send()
            .await
            .map_err(|e| GradingError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn poll(
        &self,
        tracking_handle: &str,
        kind: SolutionKind,
    ) -> Result<GradingResult, GradingError> {
        let response = self
            .with_api_key(self.http.get(self.poll_url(tracking_handle)))
            .query(&[("kind", kind.as_str())])
            .send()
            .await
            .map_err(|e| GradingError::Transport(e.to_string()))?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: &str) -> HttpGraderBackend {
        HttpGraderBackend::new(GraderConfig {
            base_url: base_url.to_string(),
            api_key: None,
        })
    }

    #[test]
    fn test_grade_url_tolerates_trailing_slash() {
        assert_eq!(
            backend("http://grader:8600/").grade_url(),
            "http://grader:8600/grade"
        );
        assert_eq!(
            backend("http://grader:8600").grade_url(),
            "http://grader:8600/grade"
        );
    }

    #[test]
    fn test_poll_url_joins_relative_handle() {
        assert_eq!(
            backend("http://grader:8600").poll_url("check/42"),
            "http://grader:8600/check/42"
        );
        assert_eq!(
            backend("http://grader:8600/").poll_url("/check/42"),
            "http://grader:8600/check/42"
        );
    }
}
