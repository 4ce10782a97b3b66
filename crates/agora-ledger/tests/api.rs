//! HTTP-level tests for the ledger API.

use agora_ledger::{
    api, AnonymousMode, AnonymousOnly, Error, FeedbackService, FeedbackStore, IdentityKey,
    LedgerConfig, LedgerState, StaticVersionOracle, Storage, ValidationEntry, VoteEntry,
};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret-0123456789abcdef";

struct TestNode {
    router: Router,
    storage: Arc<Storage>,
    _dir: TempDir,
}

fn node(mode: AnonymousMode) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::open(dir.path()).unwrap());
    storage.register_node("n1", 1).unwrap();

    let config = LedgerConfig {
        data_dir: dir.path().to_path_buf(),
        jwt_secret: Some(SECRET.to_string()),
        anonymous_mode: mode,
        ..LedgerConfig::default()
    };
    let state = LedgerState::new(Arc::clone(&storage), config).unwrap();

    TestNode {
        router: api::build_router(Arc::new(state)),
        storage,
        _dir: dir,
    }
}

fn token(user: &str) -> String {
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 600;
    encode(
        &Header::default(),
        &json!({"sub": user, "exp": exp}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

async fn post(router: &Router, uri: &str, body: Value, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(router, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn anonymous_vote_returns_entry_and_stats() {
    let node = node(AnonymousMode::Shared);

    let (status, body) = post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vote_entry"]["identity"]["kind"], "anonymous");
    assert_eq!(body["vote_entry"]["node_version"], 1);
    assert_eq!(
        body["stats"],
        json!({"perspective_id": "p1", "upvotes": 1, "downvotes": 0, "net_score": 1})
    );
    assert!(body.get("stats_error").is_none());
}

#[tokio::test]
async fn two_authenticated_downvotes() {
    let node = node(AnonymousMode::Shared);
    let vote = json!({"node_id": "n1", "perspective_id": "p1", "vote_value": -1});

    post(&node.router, "/api/v1/votes", vote.clone(), Some(&token("alice"))).await;
    let (status, body) = post(&node.router, "/api/v1/votes", vote, Some(&token("bob"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vote_entry"]["identity"]["user_id"], "bob");
    assert_eq!(body["stats"]["upvotes"], 0);
    assert_eq!(body["stats"]["downvotes"], 2);
    assert_eq!(body["stats"]["net_score"], -2);
}

#[tokio::test]
async fn credential_in_body_is_accepted() {
    let node = node(AnonymousMode::Shared);

    let (status, body) = post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1, "credential": token("carol")}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vote_entry"]["identity"]["user_id"], "carol");
}

#[tokio::test]
async fn invalid_token_degrades_to_anonymous() {
    let node = node(AnonymousMode::Shared);

    let (status, body) = post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1}),
        Some("garbage.token.value"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vote_entry"]["identity"]["kind"], "anonymous");
}

#[tokio::test]
async fn flipped_validation_reports_zero_rate() {
    let node = node(AnonymousMode::Shared);
    let alice = token("alice");

    let (status, body) = post(
        &node.router,
        "/api/v1/validations",
        json!({"node_id": "n1", "perspective_id": "p1", "is_represented": true}),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validation_entry"]["is_represented"], true);

    post(
        &node.router,
        "/api/v1/validations",
        json!({"node_id": "n1", "perspective_id": "p1", "is_represented": false, "feedback": "missing context"}),
        Some(&alice),
    )
    .await;

    let (status, body) = get(&node.router, "/api/v1/nodes/n1/validations/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{
            "perspective_id": "p1",
            "total_validations": 1,
            "positive_validations": 0,
            "validation_rate": 0.0
        }])
    );
}

#[tokio::test]
async fn invalid_input_is_400() {
    let node = node(AnonymousMode::Shared);

    for body in [
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 0}),
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 2}),
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": "up"}),
        json!({"perspective_id": "p1", "vote_value": 1}),
        json!({"node_id": "n1", "vote_value": 1}),
    ] {
        let (status, resp) = post(&node.router, "/api/v1/votes", body, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"]["code"], "invalid_argument");
    }

    let (status, resp) = post(
        &node.router,
        "/api/v1/validations",
        json!({"node_id": "n1", "perspective_id": "p1", "is_represented": "yes"}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"]["code"], "invalid_argument");

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/votes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, resp) = send(&node.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"]["code"], "invalid_argument");

    assert!(node.storage.get_node("n1").unwrap().is_some());
    let (_, stats) = get(&node.router, "/api/v1/nodes/n1/votes/stats").await;
    assert_eq!(stats, json!([]));
}

#[tokio::test]
async fn unknown_node_is_404() {
    let node = node(AnonymousMode::Shared);

    let (status, resp) = post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "ghost", "perspective_id": "p1", "vote_value": 1}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(resp["error"]["code"], "not_found");

    let (status, _) = post(
        &node.router,
        "/api/v1/validations",
        json!({"node_id": "ghost", "perspective_id": "p1", "is_represented": true}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&node.router, "/api/v1/nodes/ghost/validations/stats").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn version_bump_isolates_buckets() {
    let node = node(AnonymousMode::Shared);
    let alice = token("alice");

    post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1}),
        Some(&alice),
    )
    .await;
    post(
        &node.router,
        "/api/v1/validations",
        json!({"node_id": "n1", "perspective_id": "p1", "is_represented": true}),
        Some(&alice),
    )
    .await;

    node.storage.bump_version("n1").unwrap();

    let (_, current) = get(&node.router, "/api/v1/nodes/n1/validations/stats").await;
    assert_eq!(current, json!([]));
    let (_, current) = get(&node.router, "/api/v1/nodes/n1/votes/stats").await;
    assert_eq!(current, json!([]));
    let (_, bucket) = get(&node.router, "/api/v1/nodes/n1/versions/2/perspectives/p1/votes/stats").await;
    assert_eq!(bucket["upvotes"], 0);

    let (status, old) = get(&node.router, "/api/v1/nodes/n1/versions/1/perspectives/p1/votes/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(old["upvotes"], 1);
    let (_, old) = get(&node.router, "/api/v1/nodes/n1/versions/1/validations/stats").await;
    assert_eq!(old[0]["positive_validations"], 1);

    let (status, _) = get(&node.router, "/api/v1/nodes/n1/versions/3/validations/stats").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": -1}),
        Some(&alice),
    )
    .await;
    assert_eq!(body["vote_entry"]["node_version"], 2);
    assert_eq!(body["stats"]["net_score"], -1);
}

#[tokio::test]
async fn session_mode_and_own_entries() {
    let node = node(AnonymousMode::Session);

    post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1, "session_token": "tab-a"}),
        None,
    )
    .await;
    let (_, body) = post(
        &node.router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": -1, "session_token": "tab-b"}),
        None,
    )
    .await;
    assert_eq!(body["stats"]["upvotes"], 1);
    assert_eq!(body["stats"]["downvotes"], 1);
    assert_eq!(body["vote_entry"]["identity"]["kind"], "anonymous_session");

    let (status, mine) = get(
        &node.router,
        "/api/v1/nodes/n1/perspectives/p1/votes/mine?session_token=tab-a",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["vote_value"], 1);

    let (status, none) = get(&node.router, "/api/v1/nodes/n1/perspectives/p1/validations/mine").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(none, Value::Null);
}

#[tokio::test]
async fn health() {
    let node = node(AnonymousMode::Shared);
    let (status, body) = get(&node.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn malformed_path_and_query_use_error_body() {
    let node = node(AnonymousMode::Shared);

    for uri in [
        "/api/v1/nodes/n1/versions/abc/validations/stats",
        "/api/v1/nodes/n1/versions/-1/perspectives/p1/votes/stats",
        "/api/v1/nodes/n1/perspectives/p1/votes/mine?session_token=a&session_token=b",
    ] {
        let (status, body) = get(&node.router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "invalid_argument", "{}", uri);
    }
}

/// Store whose aggregation scans always fail.
struct ScanFailures(Storage);

impl FeedbackStore for ScanFailures {
    fn upsert_vote(&self, entry: &VoteEntry) -> agora_ledger::Result<()> {
        self.0.upsert_vote(entry)
    }
    fn upsert_validation(&self, entry: &ValidationEntry) -> agora_ledger::Result<()> {
        self.0.upsert_validation(entry)
    }
    fn get_vote(
        &self,
        n: &str,
        v: u64,
        p: &str,
        i: &IdentityKey,
    ) -> agora_ledger::Result<Option<VoteEntry>> {
        self.0.get_vote(n, v, p, i)
    }
    fn get_validation(
        &self,
        n: &str,
        v: u64,
        p: &str,
        i: &IdentityKey,
    ) -> agora_ledger::Result<Option<ValidationEntry>> {
        self.0.get_validation(n, v, p, i)
    }
    fn votes_in_bucket(&self, _: &str, _: u64, _: &str) -> agora_ledger::Result<Vec<VoteEntry>> {
        Err(Error::Storage("scan aborted".into()))
    }
    fn votes_at(&self, _: &str, _: u64) -> agora_ledger::Result<Vec<VoteEntry>> {
        Err(Error::Storage("scan aborted".into()))
    }
    fn validations_at(&self, _: &str, _: u64) -> agora_ledger::Result<Vec<ValidationEntry>> {
        Err(Error::Storage("scan aborted".into()))
    }
}

#[tokio::test]
async fn stats_failure_still_reports_the_vote() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ScanFailures(Storage::open(dir.path()).unwrap()));
    let service = FeedbackService::new(
        store.clone(),
        Arc::new(StaticVersionOracle::new().with_node("n1", 1)),
        Arc::new(AnonymousOnly),
    );
    let state = LedgerState {
        service: Arc::new(service),
        config: LedgerConfig::default(),
    };
    let router = api::build_router(Arc::new(state));

    let (status, body) = post(
        &router,
        "/api/v1/votes",
        json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vote_entry"]["vote_value"], 1);
    assert_eq!(body["stats"], Value::Null);
    assert!(body["stats_error"].as_str().unwrap().contains("scan aborted"));

    let stored = store
        .get_vote("n1", 1, "p1", &IdentityKey::Anonymous)
        .unwrap()
        .unwrap();
    assert_eq!(body["vote_entry"]["timestamp"], stored.timestamp);

    let (status, body) = get(&router, "/api/v1/nodes/n1/votes/stats").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "storage_failure");
}
