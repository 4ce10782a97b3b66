//! HTTP API for the feedback ledger.

use crate::error::Error;
use crate::identity::bearer_token;
use crate::models::{ValidationEntry, ValidationStats, VoteEntry, VoteStats};
use crate::node::LedgerState;
use crate::service::{FeedbackService, ValidationSubmission, VoteReceipt, VoteSubmission};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

type AppState = Arc<LedgerState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let timeout = state.config.request_timeout;

    let routes: Router<AppState> = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Submissions
        .route("/api/v1/votes", post(submit_vote))
        .route("/api/v1/validations", post(submit_validation))
        // Current-version stats
        .route("/api/v1/nodes/:node_id/validations/stats", get(validation_stats))
        .route("/api/v1/nodes/:node_id/votes/stats", get(current_vote_stats))
        // Historical buckets
        .route(
            "/api/v1/nodes/:node_id/versions/:version/validations/stats",
            get(validation_stats_at),
        )
        .route(
            "/api/v1/nodes/:node_id/versions/:version/perspectives/:perspective_id/votes/stats",
            get(vote_stats),
        )
        // Caller's own entries
        .route(
            "/api/v1/nodes/:node_id/perspectives/:perspective_id/votes/mine",
            get(own_vote),
        )
        .route(
            "/api/v1/nodes/:node_id/perspectives/:perspective_id/validations/mine",
            get(own_validation),
        );

    with_request_timeout(routes, timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bound every request and answer late ones with the JSON error body.
fn with_request_timeout<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(move |response: Response| async move {
            if response.status() == StatusCode::REQUEST_TIMEOUT {
                tracing::warn!("Request timed out after {:?}", timeout);
                return ApiError(Error::Timeout(timeout)).into_response();
            }
            response
        }))
}

// --- Errors ---

/// Error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Ledger error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::InvalidArgument(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(Error::InvalidArgument(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::InvalidArgument(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run a blocking service call off the async workers.
async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&FeedbackService) -> crate::Result<T> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(Error::from)?;
    Ok(Json(result?))
}

/// Credential from the `Authorization` header, falling back to the body.
fn credential(headers: &HeaderMap, body: Option<String>) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .or(body)
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready() -> &'static str {
    "OK"
}

// --- Submissions ---

#[derive(Debug, Deserialize)]
struct VoteRequest {
    node_id: Option<String>,
    perspective_id: Option<String>,
    vote_value: Option<Value>,
    reason: Option<String>,
    credential: Option<String>,
    session_token: Option<String>,
}

impl VoteRequest {
    fn into_submission(self) -> crate::Result<(VoteSubmission, Option<String>)> {
        let vote_value = match self.vote_value {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                Error::InvalidArgument(format!("vote_value must be 1 or -1, got {}", n))
            })?,
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "vote_value must be 1 or -1, got {}",
                    other
                )))
            }
            None => return Err(Error::InvalidArgument("vote_value is required".into())),
        };

        Ok((
            VoteSubmission {
                node_id: self.node_id.unwrap_or_default(),
                perspective_id: self.perspective_id.unwrap_or_default(),
                vote_value,
                reason: self.reason,
                session_token: self.session_token,
            },
            self.credential,
        ))
    }
}

async fn submit_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<VoteReceipt> {
    let Json(req) = body?;
    let (submission, body_credential) = req.into_submission()?;
    let credential = credential(&headers, body_credential);

    blocking(&state, move |service| {
        service.submit_vote(credential.as_deref(), submission)
    })
    .await
}

#[derive(Debug, Deserialize)]
struct ValidationRequest {
    node_id: Option<String>,
    perspective_id: Option<String>,
    is_represented: Option<Value>,
    feedback: Option<String>,
    credential: Option<String>,
    session_token: Option<String>,
}

impl ValidationRequest {
    fn into_submission(self) -> crate::Result<(ValidationSubmission, Option<String>)> {
        let is_represented = match self.is_represented {
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "is_represented must be a boolean, got {}",
                    other
                )))
            }
            None => return Err(Error::InvalidArgument("is_represented is required".into())),
        };

        Ok((
            ValidationSubmission {
                node_id: self.node_id.unwrap_or_default(),
                perspective_id: self.perspective_id.unwrap_or_default(),
                is_represented,
                feedback: self.feedback,
                session_token: self.session_token,
            },
            self.credential,
        ))
    }
}

#[derive(Debug, Serialize)]
struct ValidationReceipt {
    validation_entry: ValidationEntry,
}

async fn submit_validation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ValidationRequest>, JsonRejection>,
) -> ApiResult<ValidationReceipt> {
    let Json(req) = body?;
    let (submission, body_credential) = req.into_submission()?;
    let credential = credential(&headers, body_credential);

    blocking(&state, move |service| {
        service
            .submit_validation(credential.as_deref(), submission)
            .map(|validation_entry| ValidationReceipt { validation_entry })
    })
    .await
}

// --- Stats ---

async fn validation_stats(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Vec<ValidationStats>> {
    let Path(node_id) = path?;
    blocking(&state, move |service| service.validation_stats(&node_id)).await
}

async fn validation_stats_at(
    State(state): State<AppState>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> ApiResult<Vec<ValidationStats>> {
    let Path((node_id, version)) = path?;
    blocking(&state, move |service| {
        service.validation_stats_at(&node_id, version)
    })
    .await
}

async fn current_vote_stats(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Vec<VoteStats>> {
    let Path(node_id) = path?;
    blocking(&state, move |service| service.current_vote_stats(&node_id)).await
}

async fn vote_stats(
    State(state): State<AppState>,
    path: Result<Path<(String, u64, String)>, PathRejection>,
) -> ApiResult<VoteStats> {
    let Path((node_id, version, perspective_id)) = path?;
    blocking(&state, move |service| {
        service.vote_stats(&node_id, version, &perspective_id)
    })
    .await
}

// --- Own entries ---

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_token: Option<String>,
}

async fn own_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> ApiResult<Option<VoteEntry>> {
    let Path((node_id, perspective_id)) = path?;
    let Query(query) = query?;
    let credential = credential(&headers, None);
    blocking(&state, move |service| {
        service.own_vote(
            credential.as_deref(),
            query.session_token.as_deref(),
            &node_id,
            &perspective_id,
        )
    })
    .await
}

async fn own_validation(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> ApiResult<Option<ValidationEntry>> {
    let Path((node_id, perspective_id)) = path?;
    let Query(query) = query?;
    let credential = credential(&headers, None);
    blocking(&state, move |service| {
        service.own_validation(
            credential.as_deref(),
            query.session_token.as_deref(),
            &node_id,
            &perspective_id,
        )
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn vote_request(body: Value) -> VoteRequest {
        serde_json::from_value(body).unwrap()
    }

    fn validation_request(body: Value) -> ValidationRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn vote_value_must_be_integer() {
        let req = vote_request(json!({"node_id": "n1", "perspective_id": "p1", "vote_value": "1"}));
        assert!(matches!(req.into_submission(), Err(Error::InvalidArgument(_))));

        let req = vote_request(json!({"node_id": "n1", "perspective_id": "p1", "vote_value": 1.5}));
        assert!(matches!(req.into_submission(), Err(Error::InvalidArgument(_))));

        let req = vote_request(json!({"node_id": "n1", "perspective_id": "p1"}));
        assert!(matches!(req.into_submission(), Err(Error::InvalidArgument(_))));

        let req = vote_request(json!({"node_id": "n1", "perspective_id": "p1", "vote_value": -1}));
        let (sub, credential) = req.into_submission().unwrap();
        assert_eq!(sub.vote_value, -1);
        assert!(credential.is_none());
    }

    #[test]
    fn is_represented_must_be_boolean() {
        for bad in [json!("true"), json!(1), json!(null)] {
            let req = validation_request(
                json!({"node_id": "n1", "perspective_id": "p1", "is_represented": bad}),
            );
            assert!(matches!(req.into_submission(), Err(Error::InvalidArgument(_))));
        }

        let req = validation_request(
            json!({"node_id": "n1", "perspective_id": "p1", "is_represented": false, "credential": "tok"}),
        );
        let (sub, credential) = req.into_submission().unwrap();
        assert!(!sub.is_represented);
        assert_eq!(credential.as_deref(), Some("tok"));
    }

    #[test]
    fn header_credential_wins_over_body() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(
            credential(&headers, Some("from-body".into())).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            credential(&HeaderMap::new(), Some("from-body".into())).as_deref(),
            Some("from-body")
        );
    }

    #[tokio::test]
    async fn late_request_gets_timeout_body() {
        let slow: Router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let router = with_request_timeout(slow, Duration::from_millis(20));

        let response = router
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "timeout");
    }

    #[tokio::test]
    async fn fast_request_passes_through() {
        let fast: Router = Router::new().route("/fast", get(|| async { "ok" }));
        let router = with_request_timeout(fast, Duration::from_secs(5));

        let response = router
            .oneshot(Request::builder().uri("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
