//! Catalog manager: book creation, deletion and listing.

use crate::db::{Book, Database, User};
use crate::error::{AppError, Result};
use crate::forms::NewBook;

/// Message returned when the (title, author) pair is already catalogued.
pub const DUPLICATE_BOOK: &str = "A book with this title and author already exists.";

/// Catalog service.
#[derive(Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Create a new catalog service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a book and mark it as read by the user who added it.
    ///
    /// Fails with `Validation` if a book with the same title and author
    /// already exists; no record is created in that case.
    pub fn add_book(&self, book: &NewBook, requested_by: &User) -> Result<Book> {
        let created = self
            .db
            .insert_book_if_absent(&book.title, &book.author, &requested_by.id)?
            .ok_or_else(|| AppError::Validation(DUPLICATE_BOOK.to_string()))?;

        tracing::info!(
            book_id = created.id,
            book = %created,
            user = %requested_by.username,
            "Book added"
        );

        Ok(created)
    }

    /// Delete a book. Only administrators may do this.
    pub fn delete_book(&self, book_id: i64, requested_by: &User) -> Result<Book> {
        if !requested_by.is_admin() {
            return Err(AppError::PermissionDenied(format!(
                "{} may not delete books",
                requested_by.username
            )));
        }

        let deleted = self
            .db
            .delete_book(book_id)?
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", book_id)))?;

        tracing::info!(
            book_id,
            book = %deleted,
            user = %requested_by.username,
            "Book deleted"
        );

        Ok(deleted)
    }

    /// All books, oldest first.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        self.db.list_books()
    }

    /// All books with how many users have read each.
    pub fn list_books_with_reader_counts(&self) -> Result<Vec<(Book, i64)>> {
        self.db.list_books_with_reader_counts()
    }

    /// Users who have read the book.
    pub fn readers_of(&self, book_id: i64) -> Result<Vec<User>> {
        if self.db.get_book(book_id)?.is_none() {
            return Err(AppError::NotFound(format!("Book not found: {}", book_id)));
        }
        self.db.list_readers(book_id)
    }
}
