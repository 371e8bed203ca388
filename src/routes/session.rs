use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::session_dto::{
    CreateSessionRequest, CreateSessionResponse, ReportViolationRequest, SaveAnswerRequest,
    SaveAnswerResponse, SessionRefs, SubmitSessionRequest,
};
use crate::middleware::auth::CandidateId;
use crate::routes::extract::{AppJson, AppPath, AppQuery};
use crate::models::answer::Answer;
use crate::store::SessionStore;
use crate::AppState;

pub async fn create_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let session = state.sessions.create_session(candidate_id, req).await?;
    let body = CreateSessionResponse {
        session_id: session.id,
        status: session.status,
        created_at: session.created_at,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn get_instructions<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
    AppQuery(refs): AppQuery<SessionRefs>,
) -> crate::error::Result<Response> {
    let instructions = state
        .sessions
        .get_instructions(candidate_id, session_id, refs)
        .await?;
    Ok(Json(instructions).into_response())
}

pub async fn start_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
    AppJson(refs): AppJson<SessionRefs>,
) -> crate::error::Result<Response> {
    let started = state
        .sessions
        .start_session(candidate_id, session_id, refs)
        .await?;
    Ok(Json(started).into_response())
}

pub async fn save_answer<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
    AppJson(req): AppJson<SaveAnswerRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let timestamp = state
        .sessions
        .save_answer(candidate_id, session_id, Answer::from(&req))
        .await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id: req.question_id,
        timestamp,
    })
    .into_response())
}

pub async fn report_violation<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
    AppJson(req): AppJson<ReportViolationRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let ack = state
        .sessions
        .report_violation(candidate_id, session_id, req)
        .await?;
    Ok(Json(ack).into_response())
}

pub async fn submit_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
    AppJson(req): AppJson<SubmitSessionRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    tracing::info!(%session_id, submission = req.submission_type.as_str(), "Submit requested");
    let submitted = state
        .sessions
        .submit_session(candidate_id, session_id, req)
        .await?;
    Ok(Json(submitted).into_response())
}

pub async fn get_status<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
) -> crate::error::Result<Response> {
    let status = state.sessions.get_status(candidate_id, session_id).await?;
    Ok(Json(status).into_response())
}

pub async fn resume_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
) -> crate::error::Result<Response> {
    let resumed = state.sessions.resume_session(candidate_id, session_id).await?;
    Ok(Json(resumed).into_response())
}

pub async fn get_result<S: SessionStore>(
    State(state): State<AppState<S>>,
    Extension(CandidateId(candidate_id)): Extension<CandidateId>,
    AppPath(session_id): AppPath<Uuid>,
) -> crate::error::Result<Response> {
    let result = state.sessions.get_result(candidate_id, session_id).await?;
    Ok(Json(result).into_response())
}
