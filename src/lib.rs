//! shelf-rs: a shared reading list for a small group of readers.
//!
//! Users register, log in, browse a common catalog of books and mark the
//! ones they have read. Anyone logged in can add a book; administrators can
//! delete them.
//!
//! # Features
//!
//! - Server-rendered HTML forms, no client-side code
//! - Argon2 password hashing and server-side sessions
//! - Duplicate detection on (title, author)
//! - Full-replace read marks per user
//! - SQLite storage, single binary with embedded templates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Book catalog.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Form inputs and validation.
pub mod forms;
/// Per-user read marks.
pub mod readership;
/// HTTP server.
pub mod server;
/// HTML templates.
pub mod templates;


pub use catalog::Catalog;
pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use readership::Readership;
pub use server::AppState;
