use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, header},
    response::Json,
    routing::{get, post},
};
use common_errors::AppError;
use csrf_guard::{CsrfConfig, build_set_cookie, issue_token};
use serde::{Deserialize, Serialize};
use spam_filter::{
    SpamCheckRequest, SpamChecker, SubmissionKind,
};
use sql_connection::SqlConnect;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct SecurityServices {
    pub checker: Arc<SpamChecker>,
    pub csrf: CsrfConfig,
}

impl SecurityServices {
    pub fn new(db: SqlConnect, csrf: CsrfConfig) -> Self {
        Self {
            checker: Arc::new(SpamChecker::postgres(db)),
            csrf,
        }
    }

    pub fn with_checker(checker: SpamChecker, csrf: CsrfConfig) -> Self {
        Self {
            checker: Arc::new(checker),
            csrf,
        }
    }
}

pub struct SecurityHandlers;

impl SecurityHandlers {
    pub fn routes() -> Router<SecurityServices> {
        Router::new()
            .route("/csrf-token", get(issue_csrf_token))
            .route("/spam-check", post(check_spam))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CsrfTokenResponse {
    pub token: String,
}

#[utoipa::path(
    get,
    path = "/api/security/csrf-token",
    responses(
        (status = 200, description = "Fresh token, also set as the csrf-token cookie", body = CsrfTokenResponse)
    ),
    tag = "security"
)]
#[instrument(skip_all)]
pub async fn issue_csrf_token(
    State(services): State<SecurityServices>,
) -> Result<(HeaderMap, Json<CsrfTokenResponse>), AppError> {
    let token = issue_token();
    let cookie = build_set_cookie(&token, services.csrf.secure_cookies);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        cookie.parse().map_err(|_| {
            AppError::internal_server_error("failed to encode cookie")
        })?,
    );

    Ok((headers, Json(CsrfTokenResponse { token })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SpamCheckBody {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SpamCheckResponse {
    #[serde(rename = "isSpam")]
    pub is_spam: bool,
    pub score: i32,
    /// Semicolon-joined descriptions of the rules that fired
    pub reason: String,
}

#[utoipa::path(
    post,
    path = "/api/security/spam-check",
    request_body = SpamCheckBody,
    responses(
        (status = 200, description = "Heuristic classification", body = SpamCheckResponse),
        (status = 422, description = "Malformed request body")
    ),
    tag = "security"
)]
#[instrument(skip_all)]
pub async fn check_spam(
    State(services): State<SecurityServices>,
    Json(body): Json<SpamCheckBody>,
) -> Result<Json<SpamCheckResponse>, AppError> {
    let request = SpamCheckRequest {
        text: body.text,
        kind: body.kind,
        ip: body.ip,
        email: body.email,
    };

    let result = services.checker.check(&request).await;

    Ok(Json(SpamCheckResponse {
        is_spam: result.is_spam,
        score: result.score,
        reason: result.reason_summary(),
    }))
}
