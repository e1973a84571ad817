//! HTTP server and routes.

mod context;
mod handlers;
mod state;

#[cfg(test)]
mod tests;

pub use context::{RequestContext, SESSION_COOKIE};
pub use state::AppState;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let account_routes = Router::new()
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout).post(handlers::logout));

    let book_routes = Router::new()
        .route(
            "/books",
            get(handlers::book_list).post(handlers::update_readership),
        )
        .route(
            "/books/add",
            get(handlers::add_book_page).post(handlers::add_book),
        )
        .route(
            "/books/{id}/delete",
            get(handlers::delete_book).post(handlers::delete_book),
        );

    Router::new()
        .route("/", get(handlers::index))
        .merge(account_routes)
        .merge(book_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
