use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use super::monitor::ViolationReporter;
use crate::dto::session_dto::{
    CreateSessionRequest, CreateSessionResponse, InstructionsResponse, ReportViolationRequest,
    ResumeSessionResponse, SaveAnswerRequest, SaveAnswerResponse, SessionRefs,
    SessionStatusResponse, StartSessionResponse, SubmitSessionRequest, SubmitSessionResponse,
    ViolationAck,
};
use crate::error::{Error, Result};
use crate::models::result::SessionResult;

pub const WATCHDOG: Duration = Duration::from_secs(10);

/// Fails with [`Error::Timeout`] when `fut` does not settle within [`WATCHDOG`].
pub async fn with_watchdog<T, F>(what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(WATCHDOG, fut).await {
        Ok(out) => out,
        Err(_) => {
            tracing::warn!(operation = what, "Request watchdog fired");
            Err(Error::Timeout(format!("{} took longer than {}s", what, WATCHDOG.as_secs())))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
    opens_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    closes_at: Option<DateTime<Utc>>,
    remaining_minutes: Option<i64>,
    required_minutes: Option<i64>,
    expired_at: Option<DateTime<Utc>>,
}

impl ErrorBody {
    fn into_error(self, status: u16) -> Error {
        match self.error.as_str() {
            "unauthenticated" => Error::Unauthenticated,
            "already_started" => Error::AlreadyStarted,
            "already_submitted" => Error::AlreadySubmitted,
            "not_yet_open" if self.opens_at.is_some() => Error::NotYetOpen {
                opens_at: self.opens_at.unwrap_or_default(),
            },
            "window_closed" if self.closed_at.is_some() => Error::WindowClosed {
                closed_at: self.closed_at.unwrap_or_default(),
            },
            "insufficient_remaining_time" if self.closes_at.is_some() => {
                Error::InsufficientRemainingTime {
                    closes_at: self.closes_at.unwrap_or_default(),
                    remaining_minutes: self.remaining_minutes.unwrap_or_default(),
                    required_minutes: self.required_minutes.unwrap_or_default(),
                }
            }
            "link_expired" if self.expired_at.is_some() => Error::AlreadyExpiredLink {
                expired_at: self.expired_at.unwrap_or_default(),
            },
            _ => Error::Remote {
                status,
                code: self.error,
                message: self.message,
            },
        }
    }
}

/// HTTP client for the candidate-facing session endpoints.
#[derive(Clone)]
pub struct SessionApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl SessionApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let raw = resp.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&raw) {
            Ok(body) => body.into_error(status.as_u16()),
            Err(_) => Error::Remote {
                status: status.as_u16(),
                code: "unexpected_response".to_string(),
                message: raw,
            },
        })
    }

    pub async fn create_session(&self, req: &CreateSessionRequest) -> Result<CreateSessionResponse> {
        with_watchdog(
            "create_session",
            self.send(self.client.post(self.url("/api/sessions")).json(req)),
        )
        .await
    }

    pub async fn get_instructions(&self, session_id: Uuid, refs: SessionRefs) -> Result<InstructionsResponse> {
        let request = self
            .client
            .get(self.url(&format!("/api/sessions/{}/instructions", session_id)))
            .query(&refs);
        with_watchdog("get_instructions", self.send(request)).await
    }

    pub async fn start_session(&self, session_id: Uuid, refs: SessionRefs) -> Result<StartSessionResponse> {
        let request = self
            .client
            .post(self.url(&format!("/api/sessions/{}/start", session_id)))
            .json(&refs);
        self.send(request).await
    }

    pub async fn save_answer(&self, session_id: Uuid, req: &SaveAnswerRequest) -> Result<SaveAnswerResponse> {
        let request = self
            .client
            .patch(self.url(&format!("/api/sessions/{}/answers", session_id)))
            .json(req);
        self.send(request).await
    }

    pub async fn report_violation(
        &self,
        session_id: Uuid,
        req: &ReportViolationRequest,
    ) -> Result<ViolationAck> {
        let request = self
            .client
            .post(self.url(&format!("/api/sessions/{}/violations", session_id)))
            .json(req);
        self.send(request).await
    }

    pub async fn submit_session(
        &self,
        session_id: Uuid,
        req: &SubmitSessionRequest,
    ) -> Result<SubmitSessionResponse> {
        let request = self
            .client
            .post(self.url(&format!("/api/sessions/{}/submit", session_id)))
            .json(req);
        self.send(request).await
    }

    pub async fn get_status(&self, session_id: Uuid) -> Result<SessionStatusResponse> {
        let request = self
            .client
            .get(self.url(&format!("/api/sessions/{}/status", session_id)));
        self.send(request).await
    }

    pub async fn resume_session(&self, session_id: Uuid) -> Result<ResumeSessionResponse> {
        let request = self
            .client
            .get(self.url(&format!("/api/sessions/{}/resume", session_id)));
        self.send(request).await
    }

    pub async fn get_result(&self, session_id: Uuid) -> Result<SessionResult> {
        let request = self
            .client
            .get(self.url(&format!("/api/sessions/{}/result", session_id)));
        self.send(request).await
    }
}

impl ViolationReporter for SessionApiClient {
    fn report(&self, session_id: Uuid, report: ReportViolationRequest) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.report_violation(session_id, &report).await {
                tracing::warn!(error = ?e, %session_id, "Violation report failed");
            }
        });
    }
}
