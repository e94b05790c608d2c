use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use common_errors::AppError;
use http::{HeaderMap, Method, header};
use tracing::warn;

use crate::{
    cookie::cookie_value,
    token::{TOKEN_COOKIE, TOKEN_HEADER, verify},
};

/// Form field consulted when the header copy is absent
pub const TOKEN_FORM_FIELD: &str = "csrf_token";

/// Cap on the body bytes buffered while looking for a form-field copy
const MAX_BUFFERED_BODY: usize = 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct CsrfConfig {
    /// Path prefixes excluded from verification, e.g. webhook receivers
    pub exempt_paths: Vec<String>,
    pub secure_cookies: bool,
}

impl CsrfConfig {
    pub fn new(exempt_paths: Vec<String>, secure_cookies: bool) -> Self {
        Self {
            exempt_paths,
            secure_cookies,
        }
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn is_form_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Middleware enforcing the double-submit pair on mutating requests.
/// Safe methods and exempt path prefixes pass through; everything
/// else needs the cookie copy and a header (or form field) copy that
/// match, or the request is rejected.
pub async fn require_csrf_token(
    State(config): State<CsrfConfig>, request: Request, next: Next,
) -> Response {
    if is_safe_method(request.method())
        || config.is_exempt(request.uri().path())
    {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let cookie_copy = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| cookie_value(header, TOKEN_COOKIE))
        .map(str::to_string);
    let header_copy = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (presented, request) = match header_copy {
        Some(value) => (Some(value), request),
        None if is_form_content(request.headers()) => {
            match form_token(request).await {
                Ok(found) => found,
                Err(response) => return response,
            }
        }
        None => (None, request),
    };

    if verify(cookie_copy.as_deref(), presented.as_deref()) {
        next.run(request).await
    }
    else {
        warn!(
            path = %path,
            "rejected mutating request without a valid token pair"
        );
        rejection()
    }
}

fn rejection() -> Response {
    AppError::forbidden(
        "CSRF_TOKEN_INVALID",
        "missing or mismatched security token",
    )
    .into_response()
}

/// Buffers a form body to pull out the token copy, then rebuilds the
/// request so the inner handler still sees the full body.
async fn form_token(
    request: Request,
) -> Result<(Option<String>, Request), Response> {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer form body for token check");
            return Err(rejection());
        }
    };

    // Tokens are plain hex, so no urlencoding to undo
    let token = std::str::from_utf8(&bytes).ok().and_then(|form| {
        form.split('&').find_map(|pair| {
            pair.split_once('=').and_then(|(key, value)| {
                (key == TOKEN_FORM_FIELD).then(|| value.to_string())
            })
        })
    });

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}
