//! Axum route handlers and router assembly for the happy thoughts API.

use crate::db::Db;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch};
use happy_thoughts_types::*;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub db: Arc<Db>,
}

pub const SAVE_FAILED_MESSAGE: &str =
    "Couldn't save thought. Please try again, your thoughts are important.";
pub const LIST_FAILED_MESSAGE: &str = "Couldn't load thoughts. Please try again.";
pub const LIKED_MESSAGE: &str = "You just liked a thought!";
pub const NOT_FOUND_MESSAGE: &str = "Thought not found.";
pub const LIKE_FAILED_MESSAGE: &str = "Something went wrong, please try again.";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Every route `router` serves, listed by `GET /`.
const ENDPOINTS: &[(&str, &[&str])] = &[
    ("/", &["GET"]),
    ("/thoughts", &["GET", "POST"]),
    ("/thoughts/:thoughtId/like", &["PATCH"]),
];

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_endpoints))
        .route("/thoughts", get(list_thoughts).post(create_thought))
        .route("/thoughts/:thoughtId/like", patch(like_thought))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub fn endpoints() -> Vec<Endpoint> {
    ENDPOINTS
        .iter()
        .map(|(path, methods)| Endpoint {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        })
        .collect()
}

// GET /
pub async fn list_endpoints() -> Json<Vec<Endpoint>> {
    Json(endpoints())
}

// GET /thoughts
pub async fn list_thoughts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Thought>>, ApiError> {
    match state.db.list_recent(RECENT_THOUGHTS_LIMIT) {
        Ok(thoughts) => Ok(Json(thoughts)),
        Err(e) => {
            log::error!("{}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(LIST_FAILED_MESSAGE).with_error(e)),
            ))
        }
    }
}

// POST /thoughts
pub async fn create_thought(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateThoughtRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Thought>), ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        let detail = rejection.body_text();
        log::warn!("Rejected thought body: {}", detail);
        save_failed(Some(detail))
    })?;

    let new = req.validate().map_err(|errors| {
        log::warn!("Rejected thought: {}", errors);
        save_failed(Some(errors))
    })?;

    match state.db.create_thought(&new) {
        Ok(thought) => {
            log::info!("Created thought {}", thought.id);
            Ok((StatusCode::CREATED, Json(thought)))
        }
        Err(e) => {
            log::error!("{}", e);
            Err(save_failed(None::<()>))
        }
    }
}

// PATCH /thoughts/:thoughtId/like
//
// Malformed ids and store failures answer 404 like unknown ids do; only
// the message differs.
pub async fn like_thought(
    State(state): State<Arc<AppState>>,
    Path(thought_id): Path<String>,
) -> Result<Json<LikeResponse>, ApiError> {
    let Some(id) = ThoughtId::parse(&thought_id) else {
        log::warn!("Malformed thought id: {}", thought_id);
        return Err(not_found(LIKE_FAILED_MESSAGE));
    };

    match state.db.like_thought(&id) {
        Ok(Some(thought)) => {
            log::info!("Thought {} now has {} hearts", id, thought.hearts);
            Ok(Json(LikeResponse {
                message: LIKED_MESSAGE.to_string(),
                thought,
            }))
        }
        Ok(None) => {
            log::warn!("Like for unknown thought {}", id);
            Err(not_found(NOT_FOUND_MESSAGE))
        }
        Err(e) => {
            log::error!("{}", e);
            Err(not_found(LIKE_FAILED_MESSAGE))
        }
    }
}

fn save_failed(detail: Option<impl serde::Serialize>) -> ApiError {
    let mut body = ErrorResponse::new(SAVE_FAILED_MESSAGE);
    if let Some(detail) = detail {
        body = body.with_error(detail);
    }
    (StatusCode::BAD_REQUEST, Json(body))
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<Db>) {
        let db = Arc::new(Db::open(":memory:").unwrap());
        (router(Arc::new(AppState { db: db.clone() })), db)
    }

    fn test_router() -> Router {
        test_app().0
    }

    async fn api(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_post_list_and_like_flow() {
        let app = test_router();

        let (status, created) =
            api(&app, "POST", "/thoughts", Some(json!({ "message": "Hello world" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["message"], "Hello world");
        assert_eq!(created["hearts"], 0);
        let id = created["_id"].as_str().unwrap().to_string();
        assert!(ThoughtId::parse(&id).is_some());
        assert!(created["createdAt"].is_string());

        let (status, listed) = api(&app, "GET", "/thoughts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0], created);

        let uri = format!("/thoughts/{}/like", id);
        let (status, liked) = api(&app, "PATCH", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(liked["message"], LIKED_MESSAGE);
        assert_eq!(liked["thoughtsId"]["_id"], id.as_str());
        assert_eq!(liked["thoughtsId"]["hearts"], 1);

        let (_, liked) = api(&app, "PATCH", &uri, None).await;
        assert_eq!(liked["thoughtsId"]["hearts"], 2);
    }

    #[tokio::test]
    async fn test_short_message_is_rejected_and_not_stored() {
        let app = test_router();

        let (status, body) =
            api(&app, "POST", "/thoughts", Some(json!({ "message": "hi" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], SAVE_FAILED_MESSAGE);
        assert_eq!(body["error"]["message"]["kind"], "minlength");

        let (_, listed) = api(&app, "GET", "/thoughts", None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn test_missing_message_reports_required() {
        let app = test_router();
        let (status, body) = api(&app, "POST", "/thoughts", Some(json!({ "hearts": 3 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"]["kind"], "required");
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let app = test_router();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/thoughts")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // no content type
        let req = Request::builder()
            .method(Method::POST)
            .uri("/thoughts")
            .body(Body::from(r#"{"message":"Hello world"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_caller_may_set_hearts_and_created_at() {
        let app = test_router();
        let (status, created) = api(
            &app,
            "POST",
            "/thoughts",
            Some(json!({
                "message": "Backdated thought",
                "hearts": 41,
                "createdAt": "2021-03-04T05:06:07.000Z",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["hearts"], 41);
        assert_eq!(created["createdAt"], "2021-03-04T05:06:07.000Z");
    }

    #[tokio::test]
    async fn test_list_returns_at_most_twenty_newest_first() {
        let app = test_router();
        for day in 1..=25 {
            let (status, _) = api(
                &app,
                "POST",
                "/thoughts",
                Some(json!({
                    "message": format!("Thought for day {}", day),
                    "createdAt": format!("2024-01-{:02}T00:00:00.000Z", day),
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, listed) = api(&app, "GET", "/thoughts", None).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), RECENT_THOUGHTS_LIMIT);
        assert_eq!(listed[0]["message"], "Thought for day 25");
        assert_eq!(listed[19]["message"], "Thought for day 6");
    }

    #[tokio::test]
    async fn test_like_unknown_id_is_not_found() {
        let app = test_router();
        let (status, body) =
            api(&app, "PATCH", "/thoughts/000000000000000000000000/like", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": NOT_FOUND_MESSAGE }));
    }

    #[tokio::test]
    async fn test_like_malformed_id_is_not_found() {
        let app = test_router();
        let (status, body) = api(&app, "PATCH", "/thoughts/not-an-id/like", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": LIKE_FAILED_MESSAGE }));
    }

    #[tokio::test]
    async fn test_root_lists_served_routes() {
        let app = test_router();
        let (status, body) = api(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Endpoint> = serde_json::from_value(body).unwrap();
        assert_eq!(listed, endpoints());

        for endpoint in &listed {
            let path = endpoint.path.replace(":thoughtId", "000000000000000000000000");
            for method in &endpoint.methods {
                let body = (method == "POST").then(|| json!({ "message": "Route check" }));
                let (status, _) = api(&app, method, &path, body).await;
                assert_ne!(status, StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, path);
                assert!(
                    status != StatusCode::NOT_FOUND || path.ends_with("/like"),
                    "{} {} not routed",
                    method,
                    path
                );
            }
        }
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = test_router();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/thoughts")
            .header("origin", "https://example.com")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_like_at_max_hearts_keeps_listing_working() {
        let app = test_router();
        let (status, created) = api(
            &app,
            "POST",
            "/thoughts",
            Some(json!({ "message": "max hearts", "hearts": i64::MAX })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["_id"].as_str().unwrap();

        let (status, body) = api(&app, "PATCH", &format!("/thoughts/{}/like", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": LIKE_FAILED_MESSAGE }));

        let (status, listed) = api(&app, "GET", "/thoughts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["hearts"], i64::MAX);
    }

    #[tokio::test]
    async fn test_valid_unusual_messages_are_stored() {
        let app = test_router();
        for message in ["a\u{0}bcdefg", "😀😀😀"] {
            let (status, created) =
                api(&app, "POST", "/thoughts", Some(json!({ "message": message }))).await;
            assert_eq!(status, StatusCode::CREATED, "{:?}", message);
            assert_eq!(created["message"], message);
        }
    }

    #[tokio::test]
    async fn test_store_failures_map_to_documented_statuses() {
        let (app, db) = test_app();
        db.execute_batch("DROP TABLE thoughts;").unwrap();

        let (status, body) =
            api(&app, "POST", "/thoughts", Some(json!({ "message": "Hello world" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": SAVE_FAILED_MESSAGE }));

        let (status, body) = api(&app, "GET", "/thoughts", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], LIST_FAILED_MESSAGE);
        assert!(body["error"].is_string());

        let (status, body) =
            api(&app, "PATCH", "/thoughts/000000000000000000000000/like", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": LIKE_FAILED_MESSAGE }));
    }
}
