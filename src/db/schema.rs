use crate::db::*;
use crate::error::{AppError, Result};
use crate::readership::{self, ReadershipDiff};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, last_login";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
        last_login: row.get(5)?,
    })
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
    })
}

fn find_book_in(conn: &Connection, title: &str, author: &str) -> Result<Option<Book>> {
    conn.query_row(
        "SELECT id, title, author FROM books WHERE title = ?1 AND author = ?2",
        params![title, author],
        book_from_row,
    )
    .optional()
    .map_err(|e| AppError::Internal(format!("Failed to look up book: {}", e)))
}

fn readership_in(conn: &Connection, user_id: &str) -> Result<BTreeSet<i64>> {
    let mut stmt = conn
        .prepare("SELECT book_id FROM book_readers WHERE user_id = ?1")
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

    let ids = stmt
        .query_map(params![user_id], |row| row.get(0))
        .map_err(|e| AppError::Internal(format!("Failed to get readership: {}", e)))?
        .collect::<std::result::Result<BTreeSet<i64>, _>>()
        .map_err(|e| AppError::Internal(format!("Failed to collect readership: {}", e)))?;

    Ok(ids)
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table. (title, author) uniqueness is checked on insert.
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Which users have read which books
            CREATE TABLE IF NOT EXISTS book_readers (
                user_id TEXT NOT NULL,
                book_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_title_author ON books(title, author);
            CREATE INDEX IF NOT EXISTS idx_book_readers_book ON book_readers(book_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, password_hash, role, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.password_hash,
                user.role,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Validation(format!(
                    "A user with username '{}' already exists",
                    user.username
                ))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM users ORDER BY username",
                USER_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], user_from_row)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE username = ?2",
                params![password_hash, username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user. Sessions and readership rows go with it.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a book and record `reader_id` as its first reader, unless a
    /// book with the same title and author already exists.
    ///
    /// Returns `None` when the pair is taken.
    pub fn insert_book_if_absent(
        &self,
        title: &str,
        author: &str,
        reader_id: &str,
    ) -> Result<Option<Book>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        if find_book_in(&tx, title, author)?.is_some() {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO books (title, author, created_at) VALUES (?1, ?2, ?3)",
            params![title, author, now_timestamp()],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO book_readers (user_id, book_id) VALUES (?1, ?2)",
            params![reader_id, id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to add reader: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit book: {}", e)))?;

        Ok(Some(Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
        }))
    }

    /// Find a book by exact title and author.
    pub fn find_book(&self, title: &str, author: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        find_book_in(&conn, title, author)
    }

    /// Get book by ID.
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, title, author FROM books WHERE id = ?1",
            params![id],
            book_from_row,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// List all books in insertion order.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, title, author FROM books ORDER BY id")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], book_from_row)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// List all books with the number of users who have read each.
    pub fn list_books_with_reader_counts(&self) -> Result<Vec<(Book, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT b.id, b.title, b.author, COUNT(r.user_id)
                 FROM books b
                 LEFT JOIN book_readers r ON r.book_id = b.id
                 GROUP BY b.id
                 ORDER BY b.id",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], |row| Ok((book_from_row(row)?, row.get(3)?)))
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Users who have marked the book as read.
    pub fn list_readers(&self, book_id: i64) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT u.id, u.username, u.password_hash, u.role, u.created_at, u.last_login
                 FROM users u
                 JOIN book_readers r ON r.user_id = u.id
                 WHERE r.book_id = ?1
                 ORDER BY u.username",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map(params![book_id], user_from_row)
            .map_err(|e| AppError::Internal(format!("Failed to list readers: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect readers: {}", e)))?;

        Ok(users)
    }

    /// Delete a book and its readership rows. Returns the deleted book.
    pub fn delete_book(&self, id: i64) -> Result<Option<Book>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let book = tx
            .query_row(
                "SELECT id, title, author FROM books WHERE id = ?1",
                params![id],
                book_from_row,
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))?;

        if book.is_some() {
            tx.execute("DELETE FROM books WHERE id = ?1", params![id])
                .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
            tx.commit()
                .map_err(|e| AppError::Internal(format!("Failed to commit delete: {}", e)))?;
        }

        Ok(book)
    }

    // ========== READERSHIP OPERATIONS ==========

    /// Book IDs the user has marked as read.
    pub fn get_readership(&self, user_id: &str) -> Result<BTreeSet<i64>> {
        let conn = self.conn.lock();
        readership_in(&conn, user_id)
    }

    /// Replace the user's readership with `book_ids`, applying only the
    /// difference. Nothing changes if any ID is unknown.
    pub fn set_readership(
        &self,
        user_id: &str,
        book_ids: &BTreeSet<i64>,
    ) -> Result<ReadershipDiff> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        for id in book_ids {
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM books WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Internal(format!("Failed to check book: {}", e)))?;
            if !exists {
                return Err(AppError::NotFound(format!("Book not found: {}", id)));
            }
        }

        let current = readership_in(&tx, user_id)?;
        let changes = readership::diff(&current, book_ids);

        for id in &changes.added {
            tx.execute(
                "INSERT INTO book_readers (user_id, book_id) VALUES (?1, ?2)",
                params![user_id, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to add reader: {}", e)))?;
        }

        for id in &changes.removed {
            tx.execute(
                "DELETE FROM book_readers WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to remove reader: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit readership: {}", e)))?;

        Ok(changes)
    }
}
