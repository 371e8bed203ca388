use std::sync::{Arc, Mutex};

use aptitude_backend::{
    middleware::{
        auth::{Claims, JwtAuth},
        rate_limit::RateLimiter,
    },
    models::{candidate::Candidate, question::Question, test::AptitudeTest},
    routes::app_router,
    services::{
        notification_service::{NotificationPort, SessionEvent},
        session_service::SessionSettings,
    },
    store::MemoryStore,
    utils::time::{Clock, ManualClock},
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<SessionEvent>>,
}

impl NotificationPort for RecordingNotifier {
    fn notify(&self, _candidate_id: Uuid, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn broadcast(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    token: String,
    test: AptitudeTest,
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
}

fn token_for(candidate_id: Uuid) -> String {
    let claims = Claims {
        sub: candidate_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
        role: Some("candidate".into()),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn harness(rps: u32) -> Harness {
    let store = MemoryStore::new();
    let college_id = Uuid::new_v4();
    let candidate_id = Uuid::new_v4();
    store.put_candidate(Candidate {
        id: candidate_id,
        college_id,
        name: "Ravi".into(),
        email: "ravi@example.com".into(),
    });
    let test = AptitudeTest {
        id: Uuid::new_v4(),
        college_id,
        name: "Quantitative Aptitude".into(),
        instructions: Some("Read carefully".into()),
        rules: vec!["No tab switching".into()],
        duration_minutes: 60,
        passing_percentage: Some(50),
        question_count: 4,
        has_expiry: true,
        window_start: Some(at(9, 0)),
        window_end: Some(at(11, 0)),
        link_expires_at: None,
        max_attempts: None,
        is_active: true,
    };
    store.put_test(test.clone());
    for i in 0..6 {
        store.put_question(Question {
            id: Uuid::new_v4(),
            test_id: test.id,
            text: format!("What is {} + {}?", i, i),
            options: vec![format!("{}", 2 * i), format!("{}", 2 * i + 1)],
            correct_answer: format!("{}", 2 * i),
            explanation: Some(format!("{} doubled", i)),
            category: if i < 3 { "arithmetic".into() } else { "logic".into() },
        });
    }

    let clock = Arc::new(ManualClock::new(at(9, 15)));
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(store, notifier.clone(), clock.clone(), SessionSettings::default());
    let app = app_router(state, JwtAuth::new(SECRET), RateLimiter::new(rps));

    Harness {
        app,
        clock,
        notifier,
        token: token_for(candidate_id),
        test,
    }
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, body)
}

async fn create(h: &Harness) -> String {
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/api/sessions",
        Some(&h.token),
        Some(json!({ "test_id": h.test.id, "college_id": h.test.college_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "created");
    body["session_id"].as_str().unwrap().to_string()
}

fn refs(h: &Harness) -> JsonValue {
    json!({ "test_id": h.test.id, "college_id": h.test.college_id })
}

#[tokio::test]
async fn health_is_public() {
    let h = harness(100);
    let (status, body) = call(&h.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthenticated() {
    let h = harness(100);
    let (status, body) = call(&h.app, Method::POST, "/api/sessions", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let stranger = token_for(Uuid::new_v4());
    let (status, _) = call(
        &h.app,
        Method::POST,
        "/api/sessions",
        Some(&stranger),
        Some(refs(&h)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_session_flow() {
    let h = harness(100);
    let id = create(&h).await;

    let uri = format!(
        "/api/sessions/{}/instructions?test_id={}&college_id={}",
        id, h.test.id, h.test.college_id
    );
    let (status, body) = call(&h.app, Method::GET, &uri, Some(&h.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["window"]["status"], "ready");
    assert_eq!(body["total_questions"], 4);
    assert_eq!(body["max_violations"], 10);

    let (status, started) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", started);
    assert_eq!(started["status"], "in_progress");
    let questions = started["questions"].as_array().unwrap().clone();
    assert_eq!(questions.len(), 4);
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));
    assert!(questions.iter().all(|q| q.get("explanation").is_none()));

    let first = questions[0]["id"].clone();
    let (status, saved) = call(
        &h.app,
        Method::PATCH,
        &format!("/api/sessions/{}/answers", id),
        Some(&h.token),
        Some(json!({ "question_id": first, "selected_answer": 0, "time_spent_seconds": 12 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["saved"], true);

    h.clock.advance(Duration::minutes(10));
    let (status, state) = call(
        &h.app,
        Method::GET,
        &format!("/api/sessions/{}/status", id),
        Some(&h.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["questions_answered"], 1);
    assert_eq!(state["time_remaining_seconds"], 50 * 60);

    let answers: Vec<JsonValue> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| json!({ "question_id": q["id"], "selected_answer": if i < 2 { 0 } else { 1 }, "time_spent_seconds": 30 }))
        .collect();
    let (status, submitted) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/submit", id),
        Some(&h.token),
        Some(json!({ "answers": answers, "submission_type": "manual" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", submitted);
    assert_eq!(submitted["status"], "completed");
    assert_eq!(submitted["already_submitted"], false);
    assert_eq!(submitted["result"]["score"], 2);
    assert_eq!(submitted["result"]["percentage"], 50);
    assert_eq!(submitted["result"]["passed"], true);

    let (status, again) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/submit", id),
        Some(&h.token),
        Some(json!({ "answers": [], "submission_type": "auto" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["already_submitted"], true);
    assert_eq!(again["result"], submitted["result"]);

    let (status, result) = call(
        &h.app,
        Method::GET,
        &format!("/api/sessions/{}/result", id),
        Some(&h.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(result["breakdown"][0]["explanation"].is_string());

    let events = h.notifier.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SessionEvent::SessionSubmitted { score: 2, .. }));
}

#[tokio::test]
async fn start_outside_window_reports_boundaries() {
    let h = harness(100);
    let id = create(&h).await;

    h.clock.set(at(10, 30));
    let (status, body) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "insufficient_remaining_time");
    assert_eq!(body["remaining_minutes"], 30);
    assert_eq!(body["required_minutes"], 60);

    h.clock.set(at(11, 0) + Duration::seconds(1));
    let (status, body) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "window_closed");
}

#[tokio::test]
async fn mismatched_refs_are_not_found() {
    let h = harness(100);
    let id = create(&h).await;
    let (status, _) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(json!({ "test_id": Uuid::new_v4(), "college_id": h.test.college_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn violations_are_counted_server_side() {
    let h = harness(100);
    let id = create(&h).await;
    call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;

    for n in 1..=3 {
        let (status, ack) = call(
            &h.app,
            Method::POST,
            &format!("/api/sessions/{}/violations", id),
            Some(&h.token),
            Some(json!({
                "violation_type": "tab_switch",
                "timestamp": h.clock.now(),
                "running_count": n
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["server_count"], n);
    }

    let (_, state) = call(
        &h.app,
        Method::GET,
        &format!("/api/sessions/{}/status", id),
        Some(&h.token),
        None,
    )
    .await;
    assert_eq!(state["violation_count"], 3);
}

#[tokio::test]
async fn invalid_answer_payload_is_rejected() {
    let h = harness(100);
    let id = create(&h).await;
    let (_, started) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;

    let (status, body) = call(
        &h.app,
        Method::PATCH,
        &format!("/api/sessions/{}/answers", id),
        Some(&h.token),
        Some(json!({ "question_id": started["questions"][0]["id"], "selected_answer": -5, "time_spent_seconds": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = call(
        &h.app,
        Method::PATCH,
        &format!("/api/sessions/{}/answers", id),
        Some(&h.token),
        Some(json!({ "question_id": Uuid::new_v4(), "selected_answer": 0, "time_spent_seconds": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let h = harness(100);
    let id = create(&h).await;

    let (status, body) = call(&h.app, Method::GET, &format!("/api/sessions/{}/instructions", id), Some(&h.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().unwrap().contains("query"), "{}", body);

    let (status, body) = call(&h.app, Method::GET, "/api/sessions/not-a-uuid/status", Some(&h.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = call(&h.app, Method::POST, &format!("/api/sessions/{}/start", id), Some(&h.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(json!({ "test_id": h.test.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/sessions")
        .header("authorization", format!("Bearer {}", h.token))
        .header("content-type", "application/json")
        .body(Body::from("{\"test_id\": "))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn oversized_time_spent_is_rejected_on_submit() {
    let h = harness(100);
    let id = create(&h).await;
    let (_, started) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;

    let answers: Vec<JsonValue> = started["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| json!({ "question_id": q["id"], "selected_answer": 0, "time_spent_seconds": i32::MAX }))
        .collect();
    let (status, body) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/submit", id),
        Some(&h.token),
        Some(json!({ "answers": answers, "submission_type": "manual" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = call(&h.app, Method::GET, &format!("/api/sessions/{}/status", id), Some(&h.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
}

#[tokio::test]
async fn resume_returns_checkpointed_answers() {
    let h = harness(100);
    let id = create(&h).await;
    let (_, started) = call(
        &h.app,
        Method::POST,
        &format!("/api/sessions/{}/start", id),
        Some(&h.token),
        Some(refs(&h)),
    )
    .await;
    let qid = started["questions"][1]["id"].clone();
    call(
        &h.app,
        Method::PATCH,
        &format!("/api/sessions/{}/answers", id),
        Some(&h.token),
        Some(json!({ "question_id": qid, "selected_answer": 1, "time_spent_seconds": 8 })),
    )
    .await;

    h.clock.advance(Duration::minutes(20));
    let (status, resumed) = call(
        &h.app,
        Method::GET,
        &format!("/api/sessions/{}/resume", id),
        Some(&h.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["time_remaining_seconds"], 40 * 60);
    assert_eq!(resumed["questions"], started["questions"]);
    assert_eq!(resumed["answers"][0]["question_id"], qid);
}

#[tokio::test]
async fn rate_limit_applies_per_token() {
    let h = harness(2);
    for _ in 0..2 {
        let (status, _) = call(&h.app, Method::GET, &format!("/api/sessions/{}/status", Uuid::new_v4()), Some(&h.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, body) = call(&h.app, Method::GET, &format!("/api/sessions/{}/status", Uuid::new_v4()), Some(&h.token), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");
}
