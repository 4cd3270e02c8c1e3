//! `studyplan serve`: the study-plan HTTP API.
//!
//! All routes live under `/api/study-plans` and act on behalf of the user
//! named in the `x-user-id` header. Authentication happens upstream; the
//! header is trusted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use studyplan_core::planner::{PlannerConfig, StudyPlanRequest};
use studyplan_core::repository::{PlanDetail, PlanRepository};
use studyplan_core::service::{self, GeneratedPlan, PlanError};
use studyplan_db::models::StudyPlan;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field: None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{err:#}"), "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Validation(v) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: v.to_string(),
                field: Some(v.field()),
            },
            PlanError::Persistence(e) => Self::internal(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("invalid query string: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            error: &self.message,
            field: self.field,
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and extractors
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn PlanRepository>,
    pub planner: PlannerConfig,
}

/// The user id from the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(CurrentUser)
            .ok_or_else(|| AppError::unauthorized(format!("{USER_ID_HEADER} must be a UUID")))
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProgressUpdate {
    pub completion_percentage: i32,
}

/// `?completion_percentage=N`; takes precedence over a JSON body.
#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub completion_percentage: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub id: Uuid,
    pub completion_percentage: i32,
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub id: Uuid,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/study-plans/generate", post(generate))
        .route("/api/study-plans/my-plans", get(list_my_plans))
        .route("/api/study-plans/active", get(get_active))
        .route("/api/study-plans/{id}", get(get_plan))
        .route("/api/study-plans/{id}/progress", put(update_progress))
        .route("/api/study-plans/{id}/deactivate", post(deactivate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("studyplan serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("studyplan serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl+C; stop the process another way");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn generate(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<StudyPlanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GeneratedPlan>), AppError> {
    let Json(request) = payload?;
    let plan =
        service::generate_plan(state.repo.as_ref(), &state.planner, user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn list_my_plans(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<StudyPlan>>, AppError> {
    let plans = state
        .repo
        .list_for_user(user_id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(plans))
}

async fn get_active(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<PlanDetail>, AppError> {
    let plan = state
        .repo
        .get_active(user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("no active study plan"))?;
    Ok(Json(plan))
}

async fn get_plan(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanDetail>, AppError> {
    let plan = state
        .repo
        .get(user_id, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("study plan {id} not found")))?;
    Ok(Json(plan))
}

async fn update_progress(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    query: Result<Query<ProgressQuery>, QueryRejection>,
    payload: Result<Json<ProgressUpdate>, JsonRejection>,
) -> Result<Json<ProgressResponse>, AppError> {
    let Query(query) = query?;
    let requested = match query.completion_percentage {
        Some(percentage) => percentage,
        None => payload?.0.completion_percentage,
    };
    let completion_percentage = state
        .repo
        .set_completion(user_id, id, requested)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("study plan {id} not found")))?;
    Ok(Json(ProgressResponse {
        id,
        completion_percentage,
    }))
}

async fn deactivate(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeactivateResponse>, AppError> {
    let found = state
        .repo
        .deactivate(user_id, id)
        .await
        .map_err(AppError::internal)?;
    if !found {
        return Err(AppError::not_found(format!("study plan {id} not found")));
    }
    tracing::info!(user_id = %user_id, plan_id = %id, "study plan deactivated");
    Ok(Json(DeactivateResponse {
        id,
        is_active: false,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::bail;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use studyplan_core::planner::PlannerConfig;
    use studyplan_core::repository::{
        InMemoryPlanRepository, PgPlanRepository, PlanDetail, PlanRepository,
    };
    use studyplan_db::models::{NewStudyPlan, StudyPlan};
    use studyplan_test_utils::{create_test_db, drop_test_db};

    use super::{AppState, USER_ID_HEADER, build_router};

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn memory_state() -> AppState {
        AppState {
            repo: Arc::new(InMemoryPlanRepository::new()),
            planner: PlannerConfig::default(),
        }
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        build_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn generate_body(exam: &str) -> Value {
        json!({
            "target_exam": exam,
            "hours_per_day": 3,
            "days_per_week": 5,
            "subjects": ["Mathematics", "Physics"],
            "weak_areas": ["Calculus"],
        })
    }

    async fn generate(state: &AppState, user: &str, exam: &str) -> Value {
        let resp = send(
            state,
            Method::POST,
            "/api/study-plans/generate",
            Some(user),
            Some(generate_body(exam)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await
    }

    struct BrokenRepository;

    #[async_trait]
    impl PlanRepository for BrokenRepository {
        async fn save(&self, _: &NewStudyPlan) -> anyhow::Result<Uuid> {
            bail!("database unavailable")
        }
        async fn get_active(&self, _: Uuid) -> anyhow::Result<Option<PlanDetail>> {
            bail!("database unavailable")
        }
        async fn deactivate_all(&self, _: Uuid) -> anyhow::Result<u64> {
            bail!("database unavailable")
        }
        async fn replace_active(&self, _: &NewStudyPlan) -> anyhow::Result<PlanDetail> {
            bail!("database unavailable")
        }
        async fn get(&self, _: Uuid, _: Uuid) -> anyhow::Result<Option<PlanDetail>> {
            bail!("database unavailable")
        }
        async fn list_for_user(&self, _: Uuid) -> anyhow::Result<Vec<StudyPlan>> {
            bail!("database unavailable")
        }
        async fn deactivate(&self, _: Uuid, _: Uuid) -> anyhow::Result<bool> {
            bail!("database unavailable")
        }
        async fn set_completion(&self, _: Uuid, _: Uuid, _: i32) -> anyhow::Result<Option<i32>> {
            bail!("database unavailable")
        }
    }

    // -----------------------------------------------------------------------
    // POST /generate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_generate_returns_created_plan() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();

        let json = generate(&state, &user, "WAEC").await;
        assert_eq!(json["plan_name"], "WAEC Preparation Plan");
        assert_eq!(json["user_id"], user.as_str());
        assert_eq!(json["is_active"], true);
        assert_eq!(json["weeks_until_exam"], 12);

        let sessions = json["sessions"].as_array().expect("sessions array");
        assert_eq!(sessions.len(), 15);
        assert_eq!(sessions[0]["subject"], "Mathematics");
        assert_eq!(sessions[0]["duration_minutes"], 60);
        assert_eq!(sessions[1]["subject"], "Physics");

        let warnings = json["warnings"].as_array().expect("warnings array");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0]["kind"], "weak_area_ignored");
        assert_eq!(warnings[0]["weak_area"], "Calculus");
        assert_eq!(json["unscheduled_minutes"], 0);
    }

    #[tokio::test]
    async fn test_generate_requires_user_header() {
        let state = memory_state();
        let resp = send(
            &state,
            Method::POST,
            "/api/study-plans/generate",
            None,
            Some(generate_body("WAEC")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = send(
            &state,
            Method::POST,
            "/api/study-plans/generate",
            Some("not-a-uuid"),
            Some(generate_body("WAEC")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains(USER_ID_HEADER));
    }

    #[tokio::test]
    async fn test_generate_validation_error_names_field() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();

        let mut body = generate_body("WAEC");
        body["days_per_week"] = json!(8);
        let resp = send(
            &state,
            Method::POST,
            "/api/study-plans/generate",
            Some(&user),
            Some(body),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["field"], "days_per_week");

        let mut body = generate_body("WAEC");
        body["hours_per_day"] = json!(0);
        let resp = send(
            &state,
            Method::POST,
            "/api/study-plans/generate",
            Some(&user),
            Some(body),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["field"], "hours_per_day");

        let resp = send(
            &state,
            Method::GET,
            "/api/study-plans/my-plans",
            Some(&user),
            None,
        )
        .await;
        assert_eq!(body_json(resp).await, json!([]));
    }

    #[tokio::test]
    async fn test_generate_malformed_body_is_bad_request() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/study-plans/generate")
            .header(USER_ID_HEADER, &user)
            .header("content-type", "application/json")
            .body(Body::from("{\"target_exam\": "))
            .unwrap();
        let resp = build_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(
            &state,
            Method::POST,
            "/api/study-plans/generate",
            Some(&user),
            Some(json!({"target_exam": "WAEC"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_persistence_failure_is_500() {
        let state = AppState {
            repo: Arc::new(BrokenRepository),
            planner: PlannerConfig::default(),
        };
        let user = Uuid::new_v4().to_string();
        let resp = send(
            &state,
            Method::POST,
            "/api/study-plans/generate",
            Some(&user),
            Some(generate_body("WAEC")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("database unavailable"));
        assert!(json.get("field").is_none());
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_active_plan_follows_latest_generation() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();

        let resp = send(&state, Method::GET, "/api/study-plans/active", Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let first = generate(&state, &user, "WAEC").await;
        let second = generate(&state, &user, "JAMB").await;

        let resp = send(&state, Method::GET, "/api/study-plans/active", Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let active = body_json(resp).await;
        assert_eq!(active["id"], second["id"]);
        assert_eq!(active["sessions"].as_array().unwrap().len(), 15);

        let resp = send(&state, Method::GET, "/api/study-plans/my-plans", Some(&user), None).await;
        let plans = body_json(resp).await;
        let plans = plans.as_array().unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0]["id"], second["id"]);
        assert_eq!(plans[0]["is_active"], true);
        assert_eq!(plans[1]["id"], first["id"]);
        assert_eq!(plans[1]["is_active"], false);
    }

    #[tokio::test]
    async fn test_get_plan_is_scoped_to_owner() {
        let state = memory_state();
        let owner = Uuid::new_v4().to_string();
        let stranger = Uuid::new_v4().to_string();
        let plan = generate(&state, &owner, "NECO").await;
        let uri = format!("/api/study-plans/{}", plan["id"].as_str().unwrap());

        let resp = send(&state, Method::GET, &uri, Some(&owner), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["target_exam"], "NECO");

        let resp = send(&state, Method::GET, &uri, Some(&stranger), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(
            &state,
            Method::GET,
            &format!("/api/study-plans/{}", Uuid::new_v4()),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_progress_is_clamped() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();
        let plan = generate(&state, &user, "WAEC").await;
        let id = plan["id"].as_str().unwrap();
        let uri = format!("/api/study-plans/{id}/progress");

        let resp = send(
            &state,
            Method::PUT,
            &uri,
            Some(&user),
            Some(json!({"completion_percentage": 150})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["completion_percentage"], 100);
        assert_eq!(json["id"], id);

        let resp = send(
            &state,
            Method::PUT,
            &uri,
            Some(&Uuid::new_v4().to_string()),
            Some(json!({"completion_percentage": 10})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_progress_from_query_string() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();
        let plan = generate(&state, &user, "WAEC").await;
        let id = plan["id"].as_str().unwrap();

        let uri = format!("/api/study-plans/{id}/progress?completion_percentage=50");
        let resp = send(&state, Method::PUT, &uri, Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["completion_percentage"], 50);

        let uri = format!("/api/study-plans/{id}/progress?completion_percentage=-5");
        let resp = send(&state, Method::PUT, &uri, Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["completion_percentage"], 0);

        let resp = send(
            &state,
            Method::GET,
            &format!("/api/study-plans/{id}"),
            Some(&user),
            None,
        )
        .await;
        assert_eq!(body_json(resp).await["completion_percentage"], 0);
    }

    #[tokio::test]
    async fn test_progress_rejects_bad_query_and_missing_value() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();
        let plan = generate(&state, &user, "WAEC").await;
        let id = plan["id"].as_str().unwrap();

        let uri = format!("/api/study-plans/{id}/progress?completion_percentage=half");
        let resp = send(&state, Method::PUT, &uri, Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/api/study-plans/{id}/progress");
        let resp = send(&state, Method::PUT, &uri, Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deactivate_clears_active_plan() {
        let state = memory_state();
        let user = Uuid::new_v4().to_string();
        let plan = generate(&state, &user, "WAEC").await;
        let uri = format!("/api/study-plans/{}/deactivate", plan["id"].as_str().unwrap());

        let resp = send(&state, Method::POST, &uri, Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["is_active"], false);

        let resp = send(&state, Method::GET, "/api/study-plans/active", Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(
            &state,
            Method::POST,
            &uri,
            Some(&Uuid::new_v4().to_string()),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // PostgreSQL-backed
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_generate_against_postgres() {
        let Some((pool, db_name)) = create_test_db().await else {
            return;
        };
        let state = AppState {
            repo: Arc::new(PgPlanRepository::new(pool.clone())),
            planner: PlannerConfig::default(),
        };
        let user = Uuid::new_v4().to_string();

        let first = generate(&state, &user, "WAEC").await;
        let second = generate(&state, &user, "JAMB").await;
        assert_ne!(first["id"], second["id"]);

        let resp = send(&state, Method::GET, "/api/study-plans/active", Some(&user), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let active = body_json(resp).await;
        assert_eq!(active["id"], second["id"]);
        assert_eq!(active["sessions"].as_array().unwrap().len(), 15);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
