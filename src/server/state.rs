//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::readership::Readership;
use crate::server::context::SESSION_COOKIE;
use crate::templates::Templates;
use axum_extra::extract::cookie::{Cookie, SameSite};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Book catalog.
    pub catalog: Catalog,
    /// Per-user read sets.
    pub readership: Readership,
    /// Page templates.
    pub templates: Arc<Templates>,
}

impl AppState {
    /// Create new application state with database.
    pub fn new_with_db(config: Config, db: Database, auth: AuthService) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            catalog: Catalog::new(db.clone()),
            readership: Readership::new(db.clone()),
            db,
            auth: Arc::new(auth),
            templates: Arc::new(Templates::new()?),
        })
    }

    /// Build state from configuration alone.
    pub fn from_config(config: Config, db: Database) -> Result<Self> {
        let auth = AuthService::new(
            db.clone(),
            config.auth.session_days,
            config.auth.registration_enabled(),
        );
        Self::new_with_db(config, db, auth)
    }

    /// Cookie that establishes a session.
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(self.auth.session_seconds()))
            .secure(self.config.auth.secure_cookies)
            .build()
    }

    /// Cookie that removes the session when passed to `CookieJar::remove`.
    pub fn session_removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE)
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.config.auth.secure_cookies)
            .build()
    }

    /// Periodically delete expired sessions, if enabled.
    pub fn start_session_cleanup(&self) {
        let seconds = self.config.auth.cleanup_interval_seconds;
        if seconds == 0 {
            return;
        }

        let auth = self.auth.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(seconds));
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                match auth.cleanup_expired_sessions() {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Expired sessions removed"),
                    Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
                }
            }
        });
    }
}
