/// REST API routes.
///
/// Read and verify endpoints are safe to call at any time; verification
/// runs over a consistent snapshot even while appends or mining are in
/// flight. Errors are returned as `{ "error": "..." }` with a status code
/// derived from the error kind.
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::anchor::{AnchorResult, AnchorStatus};
use crate::chain::{Block, ChainVerification};
use crate::error::LedgerError;
use crate::ledger::{LedgerEntry, LedgerVerification};

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 1000;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: LedgerError) -> ApiError {
    let status = match &e {
        LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::StaleTip => StatusCode::CONFLICT,
        LedgerError::MiningTimeout { .. } | LedgerError::AnchorUnconfigured => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        LedgerError::ExternalAnchor(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Io(_) | LedgerError::Serialization(_) | LedgerError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::warn!(status = %status, error = %e, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ─── Health ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    anchor_mode: String,
    ledger_length: u64,
    chain_height: u64,
}

/// GET /health
///
/// Liveness plus the sizes of both stores, read without verification.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        anchor_mode: state.anchor.mode().to_string(),
        ledger_length: state.ledger.length(),
        chain_height: state.chain.height(),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Evidence Ledger ─────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AppendRequest {
    evidence_id: String,
    content_hash: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    offset: Option<u64>,
    limit: Option<usize>,
}

/// GET /evidence/ledger/verify
async fn verify_ledger(State(state): State<Arc<AppState>>) -> Json<LedgerVerification> {
    Json(state.ledger.verify())
}

/// POST /evidence/ledger/entries: record an evidence fingerprint.
async fn append_entry(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppendRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    let entry = state
        .ledger
        .append(&req.evidence_id, &req.content_hash)
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /evidence/ledger/entries?offset=&limit=
async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Json<Vec<LedgerEntry>> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    Json(state.ledger.entries(page.offset.unwrap_or(0), limit))
}

/// GET /evidence/ledger/entries/{index}
async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(index): Path<u64>,
) -> Result<Json<LedgerEntry>, ApiError> {
    state.ledger.get(index).map(Json).map_err(error_response)
}

pub fn ledger_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/evidence/ledger/verify", get(verify_ledger))
        .route(
            "/evidence/ledger/entries",
            post(append_entry).get(list_entries),
        )
        .route("/evidence/ledger/entries/{index}", get(get_entry))
}

// ─── Blockchain ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChainQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AnchorRequest {
    text: String,
}

/// GET /blockchain/status
async fn chain_status(State(state): State<Arc<AppState>>) -> Json<AnchorStatus> {
    Json(state.anchor.status())
}

/// GET /blockchain/chain?limit=N: most recent blocks, ascending by index.
async fn chain_blocks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChainQuery>,
) -> Json<Vec<Block>> {
    Json(state.chain.chain(query.limit))
}

/// POST /blockchain/verify
async fn verify_chain(State(state): State<Arc<AppState>>) -> Json<ChainVerification> {
    Json(state.chain.verify())
}

/// POST /blockchain/anchor
async fn anchor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnchorRequest>,
) -> Result<Json<AnchorResult>, ApiError> {
    state
        .anchor
        .anchor(&req.text)
        .await
        .map(Json)
        .map_err(error_response)
}

pub fn blockchain_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/blockchain/status", get(chain_status))
        .route("/blockchain/chain", get(chain_blocks))
        .route("/blockchain/verify", post(verify_chain).get(verify_chain))
        .route("/blockchain/anchor", post(anchor))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use super::*;
    use crate::anchor::AnchorGateway;
    use crate::chain::pow::MiningBudget;
    use crate::chain::BlockChain;
    use crate::crypto::hash::sha256_hex;
    use crate::ledger::EvidenceLedger;
    use crate::server::build_app;

    fn create_test_state(local: bool) -> AppState {
        let chain = Arc::new(BlockChain::new());
        let anchor = if local {
            AnchorGateway::Local {
                chain: Arc::clone(&chain),
                difficulty: 1,
                budget: MiningBudget::default(),
            }
        } else {
            AnchorGateway::Off
        };
        AppState {
            ledger: Arc::new(EvidenceLedger::new()),
            chain,
            anchor: Arc::new(anchor),
        }
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = build_app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state(true);
        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["anchor_mode"], "local");
        assert_eq!(body["ledger_length"], 0);
        assert_eq!(body["chain_height"], 0);
    }

    #[tokio::test]
    async fn test_ledger_verify_after_appends() {
        let state = create_test_state(true);
        for id in ["e1", "e2", "e3"] {
            let (status, body) = send(
                &state,
                Method::POST,
                "/evidence/ledger/entries",
                Some(json!({"evidence_id": id, "content_hash": sha256_hex(id.as_bytes())})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["evidence_id"], id);
        }

        let (status, body) = send(&state, Method::GET, "/evidence/ledger/verify", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "length": 3}));
    }

    #[tokio::test]
    async fn test_ledger_verify_reports_tampering() {
        let state = create_test_state(true);
        for id in ["e1", "e2", "e3"] {
            state.ledger.append(id, &sha256_hex(id.as_bytes())).unwrap();
        }
        state
            .ledger
            .tamper(1, |e| e.content_hash = sha256_hex(b"forged"));

        let (_, body) = send(&state, Method::GET, "/evidence/ledger/verify", None).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["length"], 3);
        assert_eq!(body["first_invalid"], 1);
    }

    #[tokio::test]
    async fn test_append_rejects_malformed_digest() {
        let state = create_test_state(true);
        let (status, body) = send(
            &state,
            Method::POST,
            "/evidence/ledger/entries",
            Some(json!({"evidence_id": "e1", "content_hash": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("content_hash"));
        assert_eq!(state.ledger.length(), 0);
    }

    #[tokio::test]
    async fn test_get_entry_and_paging() {
        let state = create_test_state(true);
        for id in ["a", "b", "c"] {
            state.ledger.append(id, &sha256_hex(id.as_bytes())).unwrap();
        }

        let (status, body) = send(&state, Method::GET, "/evidence/ledger/entries/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["evidence_id"], "c");

        let (status, _) = send(&state, Method::GET, "/evidence/ledger/entries/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(
            &state,
            Method::GET,
            "/evidence/ledger/entries?offset=1&limit=1",
            None,
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["index"], 1);
    }

    #[tokio::test]
    async fn test_anchor_mines_and_chain_lists() {
        let state = create_test_state(true);

        let (status, body) = send(
            &state,
            Method::POST,
            "/blockchain/anchor",
            Some(json!({"text": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "local");
        assert_eq!(body["block"]["index"], 0);
        assert!(body["block"]["hash"].as_str().unwrap().starts_with('0'));

        send(
            &state,
            Method::POST,
            "/blockchain/anchor",
            Some(json!({"text": "world"})),
        )
        .await;

        let (_, blocks) = send(&state, Method::GET, "/blockchain/chain?limit=1", None).await;
        let blocks = blocks.as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["index"], 1);
        assert_eq!(blocks[0]["data"], "world");

        let (_, status) = send(&state, Method::GET, "/blockchain/status", None).await;
        assert_eq!(status["mode"], "local");
        assert_eq!(status["ok"], true);
        assert_eq!(status["height"], 2);
        assert_eq!(status["tip_hash"], blocks[0]["hash"]);

        for method in [Method::POST, Method::GET] {
            let (status, body) = send(&state, method, "/blockchain/verify", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"ok": true, "height": 2}));
        }
    }

    #[tokio::test]
    async fn test_anchor_rejects_blank_text() {
        let state = create_test_state(true);
        let (status, _) = send(
            &state,
            Method::POST,
            "/blockchain/anchor",
            Some(json!({"text": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.chain.height(), 0);
    }

    #[tokio::test]
    async fn test_off_mode_leaves_chain_alone() {
        let state = create_test_state(false);

        let (status, body) = send(
            &state,
            Method::POST,
            "/blockchain/anchor",
            Some(json!({"text": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "off");
        assert!(body["note"].is_string());
        assert_eq!(state.chain.height(), 0);

        let (_, status) = send(&state, Method::GET, "/blockchain/status", None).await;
        assert_eq!(status["mode"], "off");
    }

    #[tokio::test]
    async fn test_empty_chain_endpoints() {
        let state = create_test_state(true);
        let (_, blocks) = send(&state, Method::GET, "/blockchain/chain", None).await;
        assert_eq!(blocks, json!([]));

        let (_, status) = send(&state, Method::GET, "/blockchain/status", None).await;
        assert_eq!(
            status,
            json!({"mode": "local", "ok": true, "height": 0, "tip_hash": null})
        );
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (LedgerError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (LedgerError::NotFound(1), StatusCode::NOT_FOUND),
            (LedgerError::StaleTip, StatusCode::CONFLICT),
            (
                LedgerError::MiningTimeout { attempts: 1 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (LedgerError::AnchorUnconfigured, StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::ExternalAnchor("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (error, expected) in cases {
            assert_eq!(error_response(error).0, expected);
        }
    }
}
