use axum::http::StatusCode;
use payout_engine::api;
use payout_engine::db::init_db;
use payout_engine::distribution::{Distributor, RewardSettings};
use payout_engine::domain::{Address, Decimal, Quote, UserId};
use payout_engine::engine::{EnginePolicy, LifecycleEngine};
use payout_engine::execution::{ExecutionError, MockExecutionClient, RemoteStatus, SubmitOutcome};
use payout_engine::Repository;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
    execution: Arc<MockExecutionClient>,
    _temp: TempDir,
}

async fn setup_test_app(execution: MockExecutionClient) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let execution = Arc::new(execution);
    let engine = LifecycleEngine::new(
        repo.clone(),
        execution.clone(),
        Vec::new(),
        EnginePolicy::default(),
    );
    let rewards = RewardSettings {
        chain_id: "137".to_string(),
        token: "RWD".to_string(),
        signup_amount: Decimal::zero(),
        referral_amount: Decimal::zero(),
        link_amount: Decimal::zero(),
    };
    let distributor = Distributor::new(engine, repo.clone(), repo.clone(), rewards);
    let app = api::create_router(api::AppState::new(distributor));

    TestApp {
        app,
        repo,
        execution,
        _temp: temp_dir,
    }
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn quote(quote_id: &str, token: Option<&str>, fiat: Option<&str>) -> Quote {
    Quote {
        quote_id: quote_id.to_string(),
        user: UserId::new("buyer"),
        chain_id: "137".to_string(),
        recipient: Address::new("0xbuyer"),
        token: "TKN".to_string(),
        token_amount: token.map(|a| Decimal::from_str_canonical(a).unwrap()),
        fiat_token: "USDC".to_string(),
        fiat_amount: fiat.map(|a| Decimal::from_str_canonical(a).unwrap()),
    }
}

async fn convert(app: &axum::Router, event_id: &str, quote_id: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/v1/events/conversion",
        Some(json!({"eventId": event_id, "quoteId": quote_id})),
    )
    .await
}

#[tokio::test]
async fn test_unknown_order_is_404() {
    let test_app = setup_test_app(MockExecutionClient::new()).await;
    let (status, body) = send(&test_app.app, "GET", "/v1/orders/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_unknown_quote_conversion_is_acknowledged() {
    let test_app = setup_test_app(MockExecutionClient::new()).await;
    let (status, body) = convert(&test_app.app, "conv-0", "nope").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "skipped");
    assert_eq!(test_app.execution.submit_calls(), 0);
}

#[tokio::test]
async fn test_quoted_order_reports_pending_before_conversion() {
    let test_app = setup_test_app(MockExecutionClient::new()).await;
    test_app
        .repo
        .put_quote(&quote("q-new", Some("10"), Some("3")))
        .await
        .unwrap();
    let (status, body) = send(&test_app.app, "GET", "/v1/orders/q-new", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert!(body["tokenLeg"].is_null());
}

#[tokio::test]
async fn test_both_legs_settled_report_success() {
    let test_app = setup_test_app(
        MockExecutionClient::new().with_default_submit(SubmitOutcome::Hash("0xleg".into())),
    )
    .await;
    test_app
        .repo
        .put_quote(&quote("q-1", Some("100"), Some("42")))
        .await
        .unwrap();

    let (status, body) = convert(&test_app.app, "conv-1", "q-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handled"], true);
    assert_eq!(body["orderStatus"], "SUCCESS");

    let (status, view) = send(&test_app.app, "GET", "/v1/orders/q-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "SUCCESS");
    assert_eq!(view["tokenLeg"]["status"], "SUCCESS");
    assert_eq!(view["fiatLeg"]["status"], "SUCCESS");
    assert_ne!(view["tokenLeg"]["recordId"], view["fiatLeg"]["recordId"]);
}

#[tokio::test]
async fn test_waiting_leg_keeps_order_pending_until_it_fails() {
    let test_app = setup_test_app(
        MockExecutionClient::new()
            .with_submit(Ok(SubmitOutcome::Hash("0xtoken".to_string())))
            .with_submit(Err(ExecutionError::Network("connection reset".to_string())))
            .with_submit(Ok(SubmitOutcome::Handle("op-fiat".to_string())))
            .with_poll(Ok(RemoteStatus::Failed {
                reason: "insufficient liquidity".to_string(),
            })),
    )
    .await;
    test_app
        .repo
        .put_quote(&quote("q-2", Some("100"), Some("42")))
        .await
        .unwrap();

    let (status, body) = convert(&test_app.app, "conv-2", "q-2").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["outcome"], "in_progress");
    assert_eq!(body["orderStatus"], "PENDING");

    let (_, view) = send(&test_app.app, "GET", "/v1/orders/q-2", None).await;
    assert_eq!(view["status"], "PENDING");
    assert_eq!(view["tokenLeg"]["status"], "SUCCESS");
    assert_eq!(view["fiatLeg"]["status"], "PENDING");

    // Redelivered under a new event id; the settled token leg is not resubmitted.
    let (status, body) = convert(&test_app.app, "conv-3", "q-2").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["orderStatus"], "PENDING");

    let (status, body) = convert(&test_app.app, "conv-3", "q-2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderStatus"], "FAILURE");
    assert_eq!(test_app.execution.submit_calls(), 3);
    assert_eq!(test_app.execution.poll_calls(), 1);

    let (_, view) = send(&test_app.app, "GET", "/v1/orders/q-2", None).await;
    assert_eq!(view["status"], "FAILURE");
    assert_eq!(view["tokenLeg"]["transactionHash"], "0xtoken");
    assert_eq!(view["fiatLeg"]["status"], "FAILURE");
}

#[tokio::test]
async fn test_single_leg_order_follows_that_leg() {
    let test_app = setup_test_app(
        MockExecutionClient::new()
            .with_submit(Ok(SubmitOutcome::Handle("op-fiat".to_string())))
            .with_poll(Ok(RemoteStatus::Failed {
                reason: "reverted".to_string(),
            })),
    )
    .await;
    test_app
        .repo
        .put_quote(&quote("q-3", None, Some("42")))
        .await
        .unwrap();

    let (status, _) = convert(&test_app.app, "conv-4", "q-3").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (_, view) = send(&test_app.app, "GET", "/v1/orders/q-3", None).await;
    assert_eq!(view["status"], "PENDING");
    assert!(view["tokenLeg"].is_null());
    assert_eq!(view["fiatLeg"]["status"], "PENDING_HASH");

    let (status, _) = convert(&test_app.app, "conv-4", "q-3").await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = send(&test_app.app, "GET", "/v1/orders/q-3", None).await;
    assert_eq!(view["status"], "FAILURE");
}
