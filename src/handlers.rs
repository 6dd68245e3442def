//! Axum route handlers for the grade relay.

use crate::{
    callback,
    callback::CallbackError,
    error::RelayError,
    launch,
    models::{BlockInfo, LaunchQuery, LaunchResponse},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /health` — Health check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sy-grade-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Block info ────────────────────────────────────────────────────────────────

/// `GET /blocks/:block_id` — Public settings of a block (never the shared key).
pub async fn block_info(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<String>,
) -> Result<Json<BlockInfo>, RelayError> {
    let block = state
        .block(&block_id)
        .ok_or_else(|| RelayError::BlockNotFound(block_id.clone()))?;
    Ok(Json(block.into()))
}

// ── Launch ────────────────────────────────────────────────────────────────────

/// `GET /blocks/:block_id/launch?anonymous_student_id=...` — Partner URL
/// parameters and iframe URLs for a learner.
pub async fn launch(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<String>,
    Query(q): Query<LaunchQuery>,
) -> Result<Json<LaunchResponse>, RelayError> {
    let block = state
        .block(&block_id)
        .ok_or_else(|| RelayError::BlockNotFound(block_id.clone()))?;

    let user_id = launch::student_id(q.anonymous_student_id.as_deref());
    let params = launch::launch_params(block, Some(user_id));
    let iframe_url = launch::iframe_url(block, &params)?;
    let screenshot_url = launch::screenshot_url(block)?;

    Ok(Json(LaunchResponse {
        display_name: block.display_name(),
        iframe_url: iframe_url.into(),
        screenshot_url: screenshot_url.into(),
        params,
    }))
}

// ── Grade callback ────────────────────────────────────────────────────────────

/// `POST /blocks/:block_id/grade` — Signed mastery callback from School Yourself.
///
/// Body: `{ "mastery": { "<topic>": 0.7 }, "user_id": "...", "signature": "<hex>" }`
///
/// Responds with the grade as a bare JSON number, or with one of the outcome
/// codes `"forbidden"`, `"bad_request"` or `"invalid_signature"`.
pub async fn grade(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<String>,
    body: Bytes,
) -> Result<Json<f64>, RelayError> {
    let block = state
        .block(&block_id)
        .ok_or_else(|| RelayError::BlockNotFound(block_id.clone()))?;

    let payload: Value =
        serde_json::from_slice(&body).map_err(|_| CallbackError::NotAnObject)?;

    let grade = callback::handle_grade(block, &payload, state.publisher.as_ref())?;
    Ok(Json(grade.value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::SignatureHash,
        config::{BlockConfig, BlockKind, SharedKey},
        publish::RecordingPublisher,
    };
    use axum::http::StatusCode;
    use axum_test::TestServer;

    const SHA256_SIGNATURE: &str =
        "7fe4b5841a07e46150ea949a332b122400da18b5f8dfa8f30512aab45fe9c375";

    fn server() -> (TestServer, Arc<RecordingPublisher>) {
        let mut block = BlockConfig::new("mult", BlockKind::Review);
        block.module_id = "algebra/multiplication".into();
        block.module_title = "Multiplication".into();
        block.shared_key = SharedKey::new("key");
        block.signature_hash = SignatureHash::Sha256;

        let publisher = Arc::new(RecordingPublisher::default());
        let state = AppState::new(vec![block], publisher.clone());
        let server = TestServer::new(crate::app(Arc::new(state))).unwrap();
        (server, publisher)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let resp = health().await;
        assert_eq!(resp.0["status"], "ok");
        assert_eq!(resp.0["service"], "sy-grade-relay");
    }

    #[tokio::test]
    async fn valid_callback_returns_grade() {
        let (server, publisher) = server();
        let resp = server
            .post("/blocks/mult/grade")
            .json(&json!({
                "mastery": { "algebra/multiplication": 0.7 },
                "user_id": "foo",
                "signature": SHA256_SIGNATURE,
            }))
            .await;

        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>(), json!(1.0));
        assert_eq!(publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn outcome_codes_map_to_statuses() {
        let (server, publisher) = server();

        let resp = server
            .post("/blocks/mult/grade")
            .json(&json!({
                "mastery": { "algebra/multiplication": 0.7 },
                "user_id": "foo",
                "signature": "asdf",
            }))
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(resp.json::<Value>(), json!("invalid_signature"));

        let resp = server.post("/blocks/mult/grade").json(&json!({})).await;
        resp.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(resp.json::<Value>(), json!("forbidden"));

        let resp = server.post("/blocks/mult/grade").json(&json!(["foo"])).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>(), json!("bad_request"));

        let resp = server.post("/blocks/mult/grade").text("not json at all").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>(), json!("bad_request"));

        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn unknown_block_is_not_found() {
        let (server, _) = server();
        let resp = server.post("/blocks/nope/grade").json(&json!({})).await;
        resp.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(resp.json::<Value>()["error"], "Block not found: nope");

        server.get("/blocks/nope").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn block_info_hides_the_shared_key() {
        let (server, _) = server();
        let resp = server.get("/blocks/mult").await;
        resp.assert_status_ok();

        let body = resp.json::<Value>();
        assert_eq!(body["display_name"], "Review: Multiplication");
        assert_eq!(body["kind"], "review");
        assert_eq!(body["signature_hash"], "sha256");
        assert_eq!(body["shared_key_configured"], true);
        assert!(body.get("shared_key").is_none());
        assert!(!resp.text().contains("\"key\""));
    }

    #[tokio::test]
    async fn launch_signs_the_student_id() {
        let (server, _) = server();
        let resp = server
            .get("/blocks/mult/launch")
            .add_query_param("anonymous_student_id", "abc123")
            .await;
        resp.assert_status_ok();

        let body = resp.json::<Value>();
        assert_eq!(body["params"]["partner"], "edx");
        assert_eq!(body["params"]["partner_user_id"], "abc123");
        assert_eq!(
            body["params"]["partner_signature"],
            "493d75d3869aad0fcbf2bf1962a152a0719445338d3f627ba93b697d8e3528e5"
        );
        assert_eq!(
            body["screenshot_url"],
            "https://schoolyourself.org/screenshot/algebra/multiplication"
        );
        assert!(body["iframe_url"]
            .as_str()
            .unwrap()
            .starts_with("https://schoolyourself.org/player?id=algebra%2Fmultiplication&partner=edx"));
    }

    #[tokio::test]
    async fn launch_without_student_uses_debug() {
        let (server, _) = server();
        let body = server.get("/blocks/mult/launch").await.json::<Value>();
        assert_eq!(body["params"]["partner_user_id"], "debug");
    }
}
