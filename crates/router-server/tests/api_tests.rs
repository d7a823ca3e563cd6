//! End-to-end API tests against an in-memory stack.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use router_config::{ConfigHandle, RouterConfig};
use router_core::RoutingId;
use router_engine::{
    AnalyticsReporter, HealthMonitor, IntelligentRouter, OutcomeRecorder, RouterComponents,
};
use router_learning::{LearningEngine, LearningParams};
use router_registry::{Agent, Registry};
use router_resilience::{BreakerRegistry, CircuitBreakerConfig, LoadTracker};
use router_scoring::{Scorer, Selector};
use router_server::{build_router, AppState};
use router_storage::MemoryStore;
use std::sync::Arc;
use tower::ServiceExt;

fn app_state() -> AppState {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new());
    let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
    let load = Arc::new(LoadTracker::new(10));
    let scorer = Arc::new(Scorer::new(store.clone(), load.clone()));
    let selector = Arc::new(Selector::new(store.clone(), load.clone()));
    let learning = Arc::new(LearningEngine::new(LearningParams::default(), store.clone()));

    let components = RouterComponents {
        registry: registry.clone(),
        breakers: breakers.clone(),
        load: load.clone(),
        scorer: scorer.clone(),
        selector,
        learning: learning.clone(),
    };
    let router = Arc::new(IntelligentRouter::new(components, true, 0.6));
    let recorder = Arc::new(OutcomeRecorder::new(
        store.clone(),
        breakers.clone(),
        load.clone(),
        scorer.clone(),
        learning.clone(),
    ));
    let health = Arc::new(HealthMonitor::new(
        registry.clone(),
        load.clone(),
        store.clone(),
    ));
    let analytics = Arc::new(AnalyticsReporter::new(
        store, breakers, load, scorer, learning.clone(),
    ));

    AppState {
        config: Arc::new(ConfigHandle::new(RouterConfig::default(), None)),
        registry,
        router,
        recorder,
        health,
        analytics,
        learning,
    }
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_health_endpoints() {
    let state = app_state();
    let app = build_router(state.clone());

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Not ready until an agent is registered.
    let response = app
        .clone()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.registry.register(Agent::new("a1", "anthropic"));
    let response = app
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_route_then_record_outcome() {
    let state = app_state();
    state.registry.register(Agent::new("summarizer-1", "anthropic"));
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "/v1/route",
            serde_json::json!({
                "task_type": "summarize",
                "complexity": "moderate",
                "priority": 5
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let routed = body_json(response).await;
    assert_eq!(routed["selection"]["agent_name"], "summarizer-1");
    let routing_id = routed["routing_id"].as_str().expect("routing id").to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "/v1/outcomes",
            serde_json::json!({
                "routing_id": routing_id,
                "success": true,
                "execution_ms": 640.0,
                "cost_cents": 3
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ack = body_json(response).await;
    assert_eq!(ack["recorded"], true);
    assert_eq!(ack["durable"], true);

    // Analytics now reflect the routing.
    let response = app
        .oneshot(
            Request::get("/v1/analytics?window_hours=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let analytics = body_json(response).await;
    assert_eq!(analytics["overall"]["total_routings"], 1);
}

#[tokio::test]
async fn test_route_without_agents_is_404() {
    let app = build_router(app_state());

    let response = app
        .oneshot(json_request(
            "/v1/route",
            serde_json::json!({"task_type": "summarize", "complexity": "simple"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "NoCapableAgent");
}

#[tokio::test]
async fn test_unknown_outcome_is_404() {
    let app = build_router(app_state());

    let response = app
        .oneshot(json_request(
            "/v1/outcomes",
            serde_json::json!({
                "routing_id": RoutingId::new(),
                "success": false,
                "execution_ms": 100.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "OutcomeNotFound");
}

#[tokio::test]
async fn test_optimize_underflow_is_422() {
    let app = build_router(app_state());

    let response = app
        .oneshot(json_request("/v1/optimize", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "OptimizationUnderflow");
}

#[tokio::test]
async fn test_agent_health_listing() {
    let state = app_state();
    state.registry.register(Agent::new("a1", "anthropic"));
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::get("/v1/agents/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().expect("array").len(), 1);
    assert_eq!(body[0]["name"], "a1");
    assert_eq!(body[0]["load_level"], "low");
}

#[tokio::test]
async fn test_subtask_fan_out_endpoint() {
    let state = app_state();
    state.registry.register(Agent::new("a1", "anthropic"));
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "/v1/route/subtasks",
            serde_json::json!([
                {"task_type": "summarize", "complexity": "simple"},
                {"task_type": "translate", "complexity": "moderate"}
            ]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["routed"], 2);
}

#[tokio::test]
async fn test_learning_analytics_endpoint() {
    let app = build_router(app_state());

    let response = app
        .oneshot(
            Request::get("/v1/analytics/learning")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["stats"]["outcomes_in_memory"], 0);
}
