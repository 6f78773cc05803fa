use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, DASHBOARD_HTML};
use crate::agent::{AgentSnapshot, AgentStats, CycleReport, DashboardStats};
use crate::generator::Scenario;
use crate::records::{Alert, Investigation, InvestigationStatus, LogEntry};
use crate::runner::lock;
use crate::storage::TransactionFilter;
use crate::transaction::{Transaction, TransactionStatus};

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

const DEFAULT_LIST_LIMIT: usize = 100;
const DEFAULT_LOG_LIMIT: usize = 50;
const ALERT_LIMIT: usize = 50;

pub(super) async fn index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TransactionQuery {
    status: Option<String>,
    min_risk: Option<u32>,
    bank: Option<String>,
    limit: Option<usize>,
}

pub(super) async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> ApiResult<Vec<Transaction>> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<TransactionStatus>)
        .transpose()?;
    let filter = TransactionFilter {
        status,
        min_risk: query.min_risk,
        bank: query.bank.filter(|b| !b.is_empty()),
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    };

    let agent = lock(&state.agent)?;
    Ok(Json(agent.storage().list_transactions(&filter)?))
}

pub(super) async fn get_transaction(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Transaction> {
    let Path(id) = id?;
    let agent = lock(&state.agent)?;
    agent
        .storage()
        .get_transaction(&id)?
        .map(Json)
        .ok_or_else(|| crate::Error::TransactionNotFound { id }.into())
}

pub(super) async fn blocked(State(state): State<AppState>) -> ApiResult<Vec<Transaction>> {
    let agent = lock(&state.agent)?;
    let filter = TransactionFilter {
        status: Some(TransactionStatus::Blocked),
        limit: DEFAULT_LIST_LIMIT,
        ..TransactionFilter::default()
    };
    Ok(Json(agent.storage().list_transactions(&filter)?))
}

#[derive(Debug, Serialize)]
pub(super) struct StatsPayload {
    #[serde(flatten)]
    dashboard: DashboardStats,
    session: AgentStats,
    fraud_threshold: f64,
}

pub(super) async fn stats(State(state): State<AppState>) -> ApiResult<StatsPayload> {
    let agent = lock(&state.agent)?;
    Ok(Json(StatsPayload {
        dashboard: agent.dashboard_stats()?,
        session: agent.stats(),
        fraud_threshold: agent.fraud_threshold()?,
    }))
}

pub(super) async fn alerts(State(state): State<AppState>) -> ApiResult<Vec<Alert>> {
    let agent = lock(&state.agent)?;
    Ok(Json(agent.storage().list_alerts(ALERT_LIMIT)?))
}

pub(super) async fn list_investigations(
    State(state): State<AppState>,
) -> ApiResult<Vec<Investigation>> {
    let agent = lock(&state.agent)?;
    Ok(Json(agent.storage().list_investigations(0)?))
}

#[derive(Debug, Deserialize)]
pub(super) struct NewInvestigation {
    transaction_id: Option<String>,
    reason: Option<String>,
}

pub(super) async fn create_investigation(
    State(state): State<AppState>,
    body: Result<Json<NewInvestigation>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<Investigation>), ApiError> {
    let Json(body) = body?;
    let (Some(transaction_id), Some(reason)) = (body.transaction_id, body.reason) else {
        return Err(ApiError::bad_request("transaction_id and reason are required"));
    };

    let mut agent = lock(&state.agent)?;
    let investigation = agent.open_investigation(&transaction_id, &reason)?;
    Ok((StatusCode::CREATED, Json(investigation)))
}

#[derive(Debug, Deserialize)]
pub(super) struct InvestigationUpdate {
    status: String,
    outcome: Option<String>,
}

pub(super) async fn update_investigation(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<InvestigationUpdate>, JsonRejection>,
) -> ApiResult<Investigation> {
    let Path(id) = id?;
    let Json(body) = body?;
    let status: InvestigationStatus = body.status.parse()?;
    let mut agent = lock(&state.agent)?;
    Ok(Json(agent.close_investigation(
        id,
        status,
        body.outcome.as_deref(),
    )?))
}

#[derive(Debug, Serialize)]
pub(super) struct StatusPayload {
    running: bool,
    #[serde(flatten)]
    snapshot: AgentSnapshot,
    logs: Vec<LogEntry>,
}

pub(super) async fn agent_status(State(state): State<AppState>) -> ApiResult<StatusPayload> {
    let agent = lock(&state.agent)?;
    Ok(Json(StatusPayload {
        running: state.control.is_running(),
        snapshot: agent.snapshot()?,
        logs: agent.storage().recent_logs(DEFAULT_LOG_LIMIT)?,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct ControlPayload {
    running: bool,
    changed: bool,
}

pub(super) async fn start_agent(State(state): State<AppState>) -> Json<ControlPayload> {
    let changed = state.control.start();
    Json(ControlPayload {
        running: state.control.is_running(),
        changed,
    })
}

pub(super) async fn stop_agent(State(state): State<AppState>) -> Json<ControlPayload> {
    let changed = state.control.stop();
    Json(ControlPayload {
        running: state.control.is_running(),
        changed,
    })
}

pub(super) async fn step_agent(State(state): State<AppState>) -> ApiResult<CycleReport> {
    let mut agent = lock(&state.agent)?;
    Ok(Json(agent.run_cycle()?))
}

#[derive(Debug, Deserialize)]
pub(super) struct LogQuery {
    limit: Option<usize>,
}

pub(super) async fn logs(
    State(state): State<AppState>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<Vec<String>> {
    let Query(query) = query?;
    let agent = lock(&state.agent)?;
    let entries = agent
        .storage()
        .recent_logs(query.limit.unwrap_or(DEFAULT_LOG_LIMIT))?;
    Ok(Json(entries.iter().map(LogEntry::render).collect()))
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ThresholdPayload {
    value: f64,
}

pub(super) async fn get_threshold(State(state): State<AppState>) -> ApiResult<ThresholdPayload> {
    let agent = lock(&state.agent)?;
    Ok(Json(ThresholdPayload {
        value: agent.fraud_threshold()?,
    }))
}

pub(super) async fn put_threshold(
    State(state): State<AppState>,
    body: Result<Json<ThresholdPayload>, JsonRejection>,
) -> ApiResult<ThresholdPayload> {
    let Json(body) = body?;
    let mut agent = lock(&state.agent)?;
    agent.set_fraud_threshold(body.value)?;
    Ok(Json(ThresholdPayload {
        value: agent.fraud_threshold()?,
    }))
}

pub(super) async fn reset(State(state): State<AppState>) -> ApiResult<ControlPayload> {
    state.control.stop();
    lock(&state.agent)?.reset()?;
    if state.autostart {
        state.control.start();
    }
    Ok(Json(ControlPayload {
        running: state.control.is_running(),
        changed: true,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SimulateRequest {
    scenario: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SimulatePayload {
    scenario: Scenario,
    injected: usize,
}

pub(super) async fn simulate(
    State(state): State<AppState>,
    body: Result<Json<SimulateRequest>, JsonRejection>,
) -> ApiResult<SimulatePayload> {
    let Json(body) = body?;
    let scenario: Scenario = body.scenario.parse()?;
    let mut agent = lock(&state.agent)?;
    let records = agent.inject_scenario(scenario)?;
    Ok(Json(SimulatePayload {
        scenario,
        injected: records.len(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::super::router;
    use super::*;
    use crate::agent::SentinelAgent;
    use crate::config::Config;
    use crate::runner::{share, AgentControl};
    use crate::storage::Storage;
    use crate::transaction::fixtures::transaction;

    fn test_state() -> AppState {
        crate::logging::init_test_logging();
        let mut config = Config::default();
        config.generator.seed = Some(3);
        config.dataset.paths = Vec::new();
        config.dataset.backfill = 0;
        config.learning.adjust_probability = 0.0;
        let agent = SentinelAgent::new(config, Storage::open_in_memory().unwrap()).unwrap();
        agent
            .storage()
            .upsert_transaction(&transaction("TX_KNOWN"), true)
            .unwrap();
        AppState {
            agent: share(agent),
            control: AgentControl::new(),
            autostart: false,
        }
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_index_serves_dashboard() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Sentinel"));
        assert!(html.contains("plotly"));
    }

    #[test]
    fn test_dashboard_has_a_view_per_page() {
        for view in ["dashboard", "logic", "transactions", "investigations", "blocked"] {
            assert!(DASHBOARD_HTML.contains(&format!("href=\"#/{view}\"")), "{view}");
            assert!(DASHBOARD_HTML.contains(&format!("id=\"view-{view}\"")), "{view}");
        }
        for endpoint in [
            "/api/transactions?",
            "/api/investigations/${id}",
            "/api/blocked",
            "/api/alerts",
            "/api/agent/status",
        ] {
            assert!(DASHBOARD_HTML.contains(endpoint), "{endpoint}");
        }
    }

    #[tokio::test]
    async fn test_list_and_get_transactions() {
        let state = test_state();
        let (status, body) = send(router(state.clone()), Method::GET, "/api/transactions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) =
            send(router(state.clone()), Method::GET, "/api/transactions/TX_KNOWN", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Processed");

        let (status, body) =
            send(router(state), Method::GET, "/api/transactions/TX_NOPE", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("TX_NOPE"));
    }

    #[tokio::test]
    async fn test_transaction_filters() {
        let state = test_state();
        let (status, body) = send(
            router(state.clone()),
            Method::GET,
            "/api/transactions?status=Failed&min_risk=10",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _) =
            send(router(state), Method::GET, "/api/transactions?status=weird", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_investigation_endpoints() {
        let state = test_state();

        let (status, created) = send(
            router(state.clone()),
            Method::POST,
            "/api/investigations",
            Some(json!({"transaction_id": "TX_KNOWN", "reason": "looks odd"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "OPEN");

        let (status, _) = send(
            router(state.clone()),
            Method::POST,
            "/api/investigations",
            Some(json!({"transaction_id": "TX_KNOWN", "reason": "again"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            router(state.clone()),
            Method::POST,
            "/api/investigations",
            Some(json!({"transaction_id": "TX_KNOWN"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            router(state.clone()),
            Method::POST,
            "/api/investigations",
            Some(json!({"transaction_id": "TX_NOPE", "reason": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = created["id"].as_i64().unwrap();
        let (status, updated) = send(
            router(state.clone()),
            Method::PATCH,
            &format!("/api/investigations/{id}"),
            Some(json!({"status": "BLOCKED", "outcome": "confirmed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "BLOCKED");

        let (_, blocked) = send(router(state.clone()), Method::GET, "/api/blocked", None).await;
        assert_eq!(blocked[0]["id"], "TX_KNOWN");

        let (status, _) = send(
            router(state.clone()),
            Method::PATCH,
            "/api/investigations/999",
            Some(json!({"status": "RESOLVED"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = send(router(state), Method::GET, "/api/investigations", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_agent_control_endpoints() {
        let state = test_state();

        let (_, started) = send(router(state.clone()), Method::POST, "/api/agent/start", None).await;
        assert_eq!(started["running"], true);
        assert_eq!(started["changed"], true);
        assert!(state.control.is_running());

        let (_, stopped) = send(router(state.clone()), Method::POST, "/api/agent/stop", None).await;
        assert_eq!(stopped["running"], false);

        let (status, report) =
            send(router(state.clone()), Method::POST, "/api/agent/step", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(report["ingested"].as_u64().unwrap() >= 2);

        let (_, agent_status) =
            send(router(state.clone()), Method::GET, "/api/agent/status", None).await;
        assert_eq!(agent_status["running"], false);
        assert_eq!(agent_status["phase"], "IDLE");
        assert_eq!(agent_status["policy"]["high_risk_trigger"], 20);
        assert!(!agent_status["logs"].as_array().unwrap().is_empty());

        let (_, lines) = send(router(state), Method::GET, "/api/logs?limit=1", None).await;
        let lines = lines.as_array().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].as_str().unwrap().starts_with('['));
    }

    #[tokio::test]
    async fn test_threshold_endpoints() {
        let state = test_state();

        let (_, current) = send(router(state.clone()), Method::GET, "/api/threshold", None).await;
        assert_eq!(current["value"], 0.8);

        let (status, updated) = send(
            router(state.clone()),
            Method::PUT,
            "/api/threshold",
            Some(json!({"value": 0.72})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["value"], 0.72);

        let (status, _) = send(
            router(state),
            Method::PUT,
            "/api/threshold",
            Some(json!({"value": 2.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_simulate_and_stats() {
        let state = test_state();

        let (status, body) = send(
            router(state.clone()),
            Method::POST,
            "/api/simulate",
            Some(json!({"scenario": "fraud_attack"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["injected"], 10);

        let (status, _) = send(
            router(state.clone()),
            Method::POST,
            "/api/simulate",
            Some(json!({"scenario": "meteor_strike"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(router(state.clone()), Method::POST, "/api/agent/step", None).await;

        let (status, stats) = send(router(state.clone()), Method::GET, "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["fraud_spike_detected"], true);
        assert!(stats["blocked_count"].as_i64().unwrap() >= 10);
        assert!(stats["session"]["processed"].as_u64().unwrap() >= 2);

        let (_, alerts) = send(router(state), Method::GET, "/api/alerts", None).await;
        assert!(!alerts.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_endpoint() {
        let state = test_state();
        state.control.start();
        send(
            router(state.clone()),
            Method::PUT,
            "/api/threshold",
            Some(json!({"value": 0.9})),
        )
        .await;

        let (status, body) = send(router(state.clone()), Method::POST, "/api/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);

        let (_, current) = send(router(state.clone()), Method::GET, "/api/threshold", None).await;
        assert_eq!(current["value"], 0.8);

        let (_, list) = send(router(state), Method::GET, "/api/transactions", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bodies_answer_bad_request_json() {
        let state = test_state();
        let cases = [
            (Method::POST, "/api/simulate", json!({})),
            (Method::PATCH, "/api/investigations/1", json!({})),
            (Method::PUT, "/api/threshold", json!({"value": "high"})),
            (Method::POST, "/api/investigations", json!([1, 2])),
        ];

        for (method, uri, body) in cases {
            let (status, reply) = send(router(state.clone()), method, uri, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(reply["message"].is_string(), "{uri}: {reply}");
        }
    }

    #[tokio::test]
    async fn test_missing_body_answers_bad_request_json() {
        let (status, reply) =
            send(router(test_state()), Method::PUT, "/api/threshold", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["message"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_query_and_path_answer_bad_request_json() {
        let state = test_state();

        let (status, reply) = send(
            router(state.clone()),
            Method::GET,
            "/api/transactions?min_risk=lots",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["message"].is_string());

        let (status, reply) = send(
            router(state),
            Method::PATCH,
            "/api/investigations/abc",
            Some(json!({"status": "RESOLVED"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["message"].is_string());
    }
}
