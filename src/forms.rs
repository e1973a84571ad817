//! Typed form inputs and their validation.
//!
//! Every form is deserialized as submitted, then checked by a pure
//! `validate` that yields either the cleaned value or the messages to show
//! next to the re-rendered form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 200;
/// Maximum author length in characters.
pub const AUTHOR_MAX_CHARS: usize = 100;
/// Maximum username length in characters.
pub const USERNAME_MAX_CHARS: usize = 150;
/// Minimum password length in characters.
pub const PASSWORD_MIN_CHARS: usize = 8;

const REQUIRED: &str = "This field is required.";

/// Where to send the user after login when no usable `next` is given.
pub const DEFAULT_REDIRECT: &str = "/books";

/// Messages collected while validating a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    /// Messages attached to a single field.
    pub fields: BTreeMap<&'static str, Vec<String>>,
    /// Messages about the form as a whole.
    pub form: Vec<String>,
}

impl ValidationErrors {
    /// Attach a message to `field`.
    pub fn add_field(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    /// Attach a form-level message.
    pub fn add_form(&mut self, message: impl Into<String>) {
        self.form.push(message.into());
    }

    /// Errors holding a single form-level message.
    pub fn form_error(message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add_form(message);
        errors
    }

    /// True when no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_empty()
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Check a username: 1-150 characters of letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if len == 0 || len > USERNAME_MAX_CHARS {
        return Err(format!(
            "Username must be 1-{} characters",
            USERNAME_MAX_CHARS
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err("Username can only contain letters, numbers and @/./+/-/_".to_string());
    }

    Ok(())
}

/// Check a password: at least 8 characters and not entirely numeric.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_CHARS
        ));
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("Password can't be entirely numeric".to_string());
    }

    Ok(())
}

/// Route that ends the session; never a useful place to land after login.
const LOGOUT_PATH: &str = "/logout";

/// Accept `next` only when it is a path on this site.
///
/// Browsers drop tabs and newlines while parsing a `Location`, so any
/// control character is refused outright.
pub fn safe_next(next: Option<&str>) -> &str {
    let Some(path) = next else {
        return DEFAULT_REDIRECT;
    };

    let route = path.split(['?', '#']).next().unwrap_or_default();
    let local = path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control);

    if local && route != LOGOUT_PATH {
        path
    } else {
        DEFAULT_REDIRECT
    }
}

/// Registration form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegisterForm {
    /// Requested username.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default, skip_serializing)]
    pub password1: String,
    /// Password confirmation.
    #[serde(default, skip_serializing)]
    pub password2: String,
}

/// A registration that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Trimmed username.
    pub username: String,
    /// Password as typed.
    pub password: String,
}

impl RegisterForm {
    /// Validate the submitted registration.
    pub fn validate(&self) -> Result<Registration, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let username = self.username.trim();

        if username.is_empty() {
            errors.add_field("username", REQUIRED);
        } else if let Err(e) = validate_username(username) {
            errors.add_field("username", e);
        }

        if self.password1.is_empty() {
            errors.add_field("password1", REQUIRED);
        } else if let Err(e) = validate_password(&self.password1) {
            errors.add_field("password1", e);
        }

        if self.password2.is_empty() {
            errors.add_field("password2", REQUIRED);
        } else if self.password1 != self.password2 {
            errors.add_field("password2", "The two password fields didn't match.");
        }

        errors.into_result(Registration {
            username: username.to_string(),
            password: self.password1.clone(),
        })
    }
}

/// Login form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoginForm {
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Path to return to after a successful login.
    #[serde(default)]
    pub next: Option<String>,
}

impl LoginForm {
    /// Check that both credentials were supplied.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.username.trim().is_empty() {
            errors.add_field("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add_field("password", REQUIRED);
        }
        errors.into_result(())
    }
}

/// Add-book form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BookForm {
    /// Book title.
    #[serde(default)]
    pub title: String,
    /// Book author.
    #[serde(default)]
    pub author: String,
}

/// A book submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    /// Trimmed title.
    pub title: String,
    /// Trimmed author.
    pub author: String,
}

impl BookForm {
    /// Validate the submitted book.
    pub fn validate(&self) -> Result<NewBook, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = self.title.trim();
        let author = self.author.trim();

        check_text(&mut errors, "title", title, TITLE_MAX_CHARS);
        check_text(&mut errors, "author", author, AUTHOR_MAX_CHARS);

        errors.into_result(NewBook {
            title: title.to_string(),
            author: author.to_string(),
        })
    }
}

fn check_text(errors: &mut ValidationErrors, field: &'static str, value: &str, max: usize) {
    let len = value.chars().count();
    if len == 0 {
        errors.add_field(field, REQUIRED);
    } else if len > max {
        errors.add_field(
            field,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, len
            ),
        );
    }
}

/// Read-state submission from the book list. Each checked box sends one
/// `book_id` value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadershipForm {
    /// IDs of every book that should be marked as read.
    #[serde(default)]
    pub book_id: Vec<i64>,
}
