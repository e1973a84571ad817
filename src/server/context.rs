//! Per-request authentication context.

use crate::db::User;
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

/// Name of the cookie holding the session token.
pub const SESSION_COOKIE: &str = "session";

/// The authenticated user behind a request.
///
/// Extracting this from a request validates the session cookie. Requests
/// without a valid session are redirected to the login page, with the
/// requested path kept as `next`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Logged-in user.
    pub user: User,
    /// Session token the user authenticated with.
    pub token: String,
}

impl RequestContext {
    /// Username of the logged-in user.
    pub fn username(&self) -> &str {
        &self.user.username
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let next = parts.uri.path_and_query().map(|p| p.as_str().to_string());
        let unauthorized = || AppError::Unauthorized { next: next.clone() };

        let token = CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(unauthorized)?;

        let user = state
            .auth
            .validate_token(&token)?
            .ok_or_else(unauthorized)?;

        Ok(Self { user, token })
    }
}
