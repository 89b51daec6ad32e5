use crate::config::MgmtConfig;
use crate::security::{constant_time_eq, security_headers_middleware, AuthLockout};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use voteguard_core::{
    FlagEntry, Finding, GuardError, GuardStats, ModerationAction, ModerationEngine, Report,
    ReportFilter, ReportReason, TargetType, VoteDecision, VoteRequest,
};

/// Identity attached to requests that passed auth.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// Client address as seen by the API.
    pub client: String,
}

/// Body of `POST /api/v1/reports`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReportRequest {
    /// Who is filing the report.
    pub reporter_id: String,
    /// Kind of target.
    pub target_type: TargetType,
    /// Target id.
    pub target_id: String,
    /// Report reason.
    pub reason: ReportReason,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Body of `POST /api/v1/reports/:id/review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Reviewer id.
    pub reviewer_id: String,
    /// Action to take.
    pub action: ModerationAction,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
}

/// Response of `GET /api/v1/users/:id/analysis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnalysis {
    /// Analyzed user.
    pub user_id: String,
    /// Whether the user is currently flagged.
    pub flagged: bool,
    /// Votes considered.
    pub votes_analyzed: usize,
    /// Detector output.
    pub findings: Vec<Finding>,
}

/// Response of `DELETE /api/v1/flags/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearFlagResponse {
    /// User whose flag was targeted.
    pub user_id: String,
    /// Whether a flag was removed.
    pub cleared: bool,
}

/// Errors surfaced by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Engine rejected the request.
    #[error(transparent)]
    Guard(#[from] GuardError),
    /// Lookup found nothing.
    #[error("{0} not found")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) | ApiError::Guard(GuardError::ReportNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Guard(GuardError::ReportAlreadyReviewed { .. }) => StatusCode::CONFLICT,
            ApiError::Guard(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Admin HTTP API over a shared moderation engine.
#[derive(Clone)]
pub struct AdminApi {
    engine: Arc<ModerationEngine>,
    config: Arc<MgmtConfig>,
    lockout: Arc<AuthLockout>,
}

impl AdminApi {
    /// API serving `engine` with auth and bind settings from `config`.
    pub fn new(engine: Arc<ModerationEngine>, config: Arc<MgmtConfig>) -> Self {
        let lockout = AuthLockout::new(
            config.auth_max_failures,
            Duration::from_secs(config.auth_lockout_secs),
        );
        Self {
            engine,
            config,
            lockout: Arc::new(lockout),
        }
    }

    /// Full router: protected routes behind bearer auth, health probes public.
    pub fn router(self: Arc<Self>) -> Router {
        let protected = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/api/v1/votes/validate", post(validate_vote_handler))
            .route("/api/v1/reports", get(list_reports_handler).post(submit_report_handler))
            .route("/api/v1/reports/pending", get(pending_reports_handler))
            .route("/api/v1/reports/:id", get(get_report_handler))
            .route("/api/v1/reports/:id/review", post(review_report_handler))
            .route("/api/v1/stats", get(stats_handler))
            .route("/api/v1/users/:id/analysis", get(user_analysis_handler))
            .route("/api/v1/flags", get(flags_handler))
            .route("/api/v1/flags/:id", delete(clear_flag_handler))
            .layer(axum::middleware::from_fn_with_state(
                self.clone(),
                auth_middleware,
            ));

        let public = Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler));

        Router::new()
            .merge(protected)
            .merge(public)
            .layer(axum::middleware::from_fn(security_headers_middleware))
            .with_state(self)
    }

    /// Drop stale auth-failure entries.
    pub fn prune_auth(&self) {
        self.lockout.prune();
    }

    /// Bind and serve until the listener fails.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr;
        let router = Arc::new(self).router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Admin API listening on {}", addr);

        axum::serve(listener, router.into_make_service()).await?;
        Ok(())
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn metrics_handler(State(state): State<Arc<AdminApi>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.engine.render_metrics(),
    )
}

async fn validate_vote_handler(
    State(state): State<Arc<AdminApi>>,
    Json(request): Json<VoteRequest>,
) -> Json<VoteDecision> {
    Json(state.engine.validate_vote(request))
}

async fn submit_report_handler(
    State(state): State<Arc<AdminApi>>,
    Json(body): Json<SubmitReportRequest>,
) -> (StatusCode, Json<Report>) {
    let report = state.engine.submit_report(
        &body.reporter_id,
        body.target_type,
        &body.target_id,
        body.reason,
        &body.description,
    );
    (StatusCode::CREATED, Json(report))
}

async fn list_reports_handler(
    State(state): State<Arc<AdminApi>>,
    Query(filter): Query<ReportFilter>,
) -> Json<Vec<Report>> {
    Json(state.engine.list_reports(&filter))
}

async fn pending_reports_handler(State(state): State<Arc<AdminApi>>) -> Json<Vec<Report>> {
    Json(state.engine.list_pending())
}

async fn get_report_handler(
    State(state): State<Arc<AdminApi>>,
    Path(id): Path<String>,
) -> Result<Json<Report>, ApiError> {
    state
        .engine
        .get_report(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("report {}", id)))
}

async fn review_report_handler(
    State(state): State<Arc<AdminApi>>,
    Extension(client): Extension<AuthenticatedClient>,
    Path(id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<Report>, ApiError> {
    tracing::debug!(report_id = %id, client = %client.client, "review requested");
    let report = state
        .engine
        .review(&id, &body.reviewer_id, body.action, &body.notes)?;
    Ok(Json(report))
}

async fn stats_handler(State(state): State<Arc<AdminApi>>) -> Json<GuardStats> {
    Json(state.engine.get_stats())
}

async fn user_analysis_handler(
    State(state): State<Arc<AdminApi>>,
    Path(user_id): Path<String>,
) -> Json<UserAnalysis> {
    let votes_analyzed = state.engine.user_votes(&user_id).len();
    let findings = state.engine.analyze_user(&user_id);
    Json(UserAnalysis {
        flagged: state.engine.is_flagged(&user_id),
        votes_analyzed,
        findings,
        user_id,
    })
}

async fn flags_handler(State(state): State<Arc<AdminApi>>) -> Json<Vec<FlagEntry>> {
    Json(state.engine.flagged_users())
}

async fn clear_flag_handler(
    State(state): State<Arc<AdminApi>>,
    Extension(client): Extension<AuthenticatedClient>,
    Path(user_id): Path<String>,
) -> Result<Json<ClearFlagResponse>, ApiError> {
    if !state.engine.clear_flag(&user_id, &client.client) {
        return Err(ApiError::NotFound(format!("flag on {}", user_id)));
    }
    Ok(Json(ClearFlagResponse {
        user_id,
        cleared: true,
    }))
}

fn client_address(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, r#"Bearer realm="voteguard""#)],
        "Unauthorized",
    )
        .into_response()
}

async fn auth_middleware(
    State(state): State<Arc<AdminApi>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_address(&request);

    if state.lockout.is_locked(&client) {
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }

    let Some(token) = state.config.admin_token.as_deref() else {
        tracing::warn!("admin API is running without authentication; set admin_token in config");
        request
            .extensions_mut()
            .insert(AuthenticatedClient { client });
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(provided) if constant_time_eq(provided, token) => {
            request
                .extensions_mut()
                .insert(AuthenticatedClient { client });
            next.run(request).await
        }
        _ => {
            state.lockout.record_failure(&client);
            unauthorized()
        }
    }
}
