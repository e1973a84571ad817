//! Authentication module.

use crate::db::{Database, Role, Session, User, now_timestamp};
use crate::error::{AppError, Result};
use crate::forms;
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Message shown for any failed login, so usernames cannot be probed.
pub const INVALID_CREDENTIALS: &str = "Please enter a correct username and password.";

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
        }
    }

    /// Session lifetime in seconds, used for the cookie max-age.
    pub fn session_seconds(&self) -> i64 {
        self.session_duration_days as i64 * 24 * 60 * 60
    }

    /// Whether self-service registration is open.
    pub fn registration_enabled(&self) -> bool {
        self.registration_enabled
    }

    /// Register a new ordinary user.
    pub fn register(&self, username: &str, password: &str) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Validation("Registration is disabled".to_string()));
        }

        let user = self.create_user(username, password, Role::User)?;
        tracing::info!(user = %user.username, "User registered");
        Ok(user)
    }

    /// Create a new user (admin function).
    pub fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User> {
        forms::validate_username(username).map_err(AppError::Validation)?;
        forms::validate_password(password).map_err(AppError::Validation)?;

        let password_hash = hash_password(password)?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash,
            role,
            created_at: now_timestamp(),
            last_login: None,
        };

        self.db.create_user(&user)?;
        Ok(user)
    }

    /// Login and create a session.
    pub fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::Validation(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Validation(INVALID_CREDENTIALS.to_string()));
        }

        self.db.update_user_last_login(&user.id)?;

        let token = generate_token();
        let session = Session {
            token: token.clone(),
            user_id: user.id.clone(),
            expires_at: now_timestamp() + self.session_seconds(),
        };

        self.db.create_session(&session)?;
        tracing::info!(user = %user.username, "User logged in");

        Ok((user, token))
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.db.get_user_by_id(&session.user_id)
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Delete every expired session. Returns how many were removed.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        self.db.cleanup_expired_sessions()
    }

    /// Change user password.
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<bool> {
        forms::validate_password(new_password).map_err(AppError::Validation)?;

        let password_hash = hash_password(new_password)?;
        self.db.update_user_password(username, &password_hash)
    }

    /// Delete a user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        self.db.delete_user(username)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }
}
