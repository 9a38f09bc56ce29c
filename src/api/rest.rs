// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The renderer reads the active view
// and drives key selection; nothing here touches the stream directly.
//
// CORS is configured permissively; the viewer is read-only and
// unauthenticated.
// =============================================================================

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::supervisor::{SelectError, SupervisorHandle};
use crate::types::{Interval, Symbol, SubscriptionKey};

// =============================================================================
// Router construction
// =============================================================================

/// Build the API router with CORS middleware and the supervisor handle.
pub fn router(supervisor: SupervisorHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/options", get(options))
        .route("/api/v1/view", get(view))
        .route("/api/v1/faults", get(faults))
        .route("/api/v1/subscription", post(select_subscription))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(supervisor)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connecting: bool,
    view_version: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(supervisor): State<SupervisorHandle>) -> impl IntoResponse {
    let view = supervisor.view();
    Json(HealthResponse {
        status: "ok",
        connecting: view.is_connecting(),
        view_version: view.current_version(),
        uptime_secs: view.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Selectable options
// =============================================================================

#[derive(Serialize)]
struct OptionsResponse {
    symbols: Vec<Symbol>,
    intervals: Vec<Interval>,
}

async fn options() -> impl IntoResponse {
    Json(OptionsResponse {
        symbols: Symbol::ALL.to_vec(),
        intervals: Interval::ALL.to_vec(),
    })
}

// =============================================================================
// View snapshot & faults
// =============================================================================

async fn view(State(supervisor): State<SupervisorHandle>) -> impl IntoResponse {
    Json(supervisor.view().snapshot())
}

async fn faults(State(supervisor): State<SupervisorHandle>) -> impl IntoResponse {
    Json(supervisor.view().recent_faults())
}

// =============================================================================
// Subscription selection
// =============================================================================

#[derive(Deserialize)]
struct SubscriptionRequest {
    symbol: String,
    interval: String,
}

#[derive(Serialize)]
struct SubscriptionResponse {
    key: SubscriptionKey,
    message: String,
}

async fn select_subscription(
    State(supervisor): State<SupervisorHandle>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let symbol: Symbol = req.symbol.parse().map_err(bad_request)?;
    let interval: Interval = req.interval.parse().map_err(bad_request)?;
    let key = SubscriptionKey::new(symbol, interval);
    let previous = supervisor.view().active_key();

    match supervisor.select(key).await {
        Ok(key) => {
            info!(from = %previous, to = %key, "subscription selected via API");
            Ok(Json(SubscriptionResponse {
                key,
                message: format!("streaming {key}"),
            }))
        }
        Err(e) => {
            let status = match e {
                SelectError::Connecting => StatusCode::CONFLICT,
                SelectError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            };
            warn!(key = %key, error = %e, "subscription selection refused");
            Err((status, Json(serde_json::json!({ "error": e.to_string() }))))
        }
    }
}

fn bad_request(e: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::runtime_config::ViewerConfig;
    use crate::stream::testing::{settle, MockConnector};
    use crate::supervisor::Supervisor;

    async fn app(connector: Arc<MockConnector>) -> Router {
        let config = ViewerConfig {
            stream_base: "wss://mock/ws".to_string(),
            ..ViewerConfig::default()
        };
        let (handle, _task) = Supervisor::spawn(connector, &config);
        settle().await;
        router(handle)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_subscription(body: &str) -> Request<Body> {
        Request::post("/api/v1/subscription")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn view_reports_active_key() {
        let app = app(Arc::new(MockConnector::default())).await;
        let resp = app
            .oneshot(Request::get("/api/v1/view").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["key"]["symbol"], "ETHUSDT");
        assert_eq!(json["key"]["interval"], "1m");
        assert_eq!(json["connecting"], false);
        assert_eq!(json["candles"], serde_json::json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn options_lists_enumerated_values() {
        let app = app(Arc::new(MockConnector::default())).await;
        let resp = app
            .oneshot(Request::get("/api/v1/options").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["symbols"], serde_json::json!(["ETHUSDT", "BNBUSDT", "DOTUSDT"]));
        assert_eq!(json["intervals"].as_array().map(Vec::len), Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_switches_key() {
        let connector = Arc::new(MockConnector::default());
        let app = app(connector.clone()).await;
        let resp = app
            .oneshot(post_subscription(r#"{"symbol":"bnbusdt","interval":"5m"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["key"]["symbol"], "BNBUSDT");

        settle().await;
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_interval_is_bad_request() {
        let app = app(Arc::new(MockConnector::default())).await;
        let resp = app
            .oneshot(post_subscription(r#"{"symbol":"ETHUSDT","interval":"2m"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_status_and_view_version() {
        let app = app(Arc::new(MockConnector::default())).await;
        let resp = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connecting"], false);
        assert!(json["view_version"].as_u64().unwrap() >= 1);
        assert!(json["server_time"].as_i64().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn faults_lists_protocol_errors() {
        let connector = Arc::new(MockConnector::default());
        let app = app(connector.clone()).await;
        connector.link(0).push_text("{not json");
        settle().await;

        let resp = app
            .oneshot(Request::get("/api/v1/faults").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        let faults = json.as_array().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0]["kind"], "protocol");
        assert_eq!(faults[0]["key"]["symbol"], "ETHUSDT");
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_unavailable_after_shutdown() {
        let config = ViewerConfig {
            stream_base: "wss://mock/ws".to_string(),
            ..ViewerConfig::default()
        };
        let (handle, task) = Supervisor::spawn(Arc::new(MockConnector::default()), &config);
        settle().await;
        handle.shutdown().await;
        task.await.unwrap();

        let resp = router(handle)
            .oneshot(post_subscription(r#"{"symbol":"BNBUSDT","interval":"5m"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_conflicts_while_connecting() {
        let connector = Arc::new(MockConnector::default());
        connector.hang_connects(true);
        let app = app(connector).await;
        let resp = app
            .oneshot(post_subscription(r#"{"symbol":"DOTUSDT","interval":"1d"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
