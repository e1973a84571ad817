//! HTTP request handlers.

use crate::db::User;
use crate::error::{AppError, Result};
use crate::forms::{self, BookForm, LoginForm, ReadershipForm, RegisterForm, ValidationErrors};
use crate::server::AppState;
use crate::server::context::RequestContext;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    CookieJar, Form,
    cookie::{Cookie, SameSite},
};
use serde::{Deserialize, Serialize};

/// Cookie carrying a one-shot message for the next page.
const NOTICE_COOKIE: &str = "notice";

/// Common page context. `body` is merged into the top level.
#[derive(Serialize)]
struct Page<'a, T: Serialize> {
    site_title: &'a str,
    username: Option<&'a str>,
    is_admin: bool,
    notice: Option<String>,
    #[serde(flatten)]
    body: T,
}

fn render<T: Serialize>(
    state: &AppState,
    template: &str,
    user: Option<&User>,
    notice: Option<String>,
    body: T,
) -> Result<Html<String>> {
    state.templates.render(
        template,
        Page {
            site_title: &state.config.server.title,
            username: user.map(|u| u.username.as_str()),
            is_admin: user.is_some_and(User::is_admin),
            notice,
            body,
        },
    )
}

/// Queue a message to show on the next rendered page.
fn set_notice(jar: CookieJar, message: &str) -> CookieJar {
    jar.add(
        Cookie::build((NOTICE_COOKIE, urlencoding::encode(message).into_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Read and clear the pending message, if any.
fn take_notice(jar: CookieJar) -> (CookieJar, Option<String>) {
    let notice = jar
        .get(NOTICE_COOKIE)
        .and_then(|c| urlencoding::decode(c.value()).ok())
        .map(|m| m.into_owned());

    match notice {
        Some(message) => (
            jar.remove(Cookie::build(NOTICE_COOKIE).path("/")),
            Some(message),
        ),
        None => (jar, None),
    }
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[derive(Serialize)]
struct RegisterPage<'a> {
    form: &'a RegisterForm,
    errors: &'a ValidationErrors,
}

/// Registration form.
pub async fn register_page(State(state): State<AppState>) -> Result<Html<String>> {
    render(
        &state,
        "register.html",
        None,
        None,
        RegisterPage {
            form: &RegisterForm::default(),
            errors: &ValidationErrors::default(),
        },
    )
}

/// Create an account, then send the user to the login page.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let errors = match form.validate() {
        Ok(registration) => {
            match state
                .auth
                .register(&registration.username, &registration.password)
            {
                Ok(_) => {
                    let jar = set_notice(jar, "Your account was created. Please log in.");
                    return Ok((jar, Redirect::to("/login")).into_response());
                }
                Err(AppError::Validation(message)) => ValidationErrors::form_error(message),
                Err(e) => return Err(e),
            }
        }
        Err(errors) => errors,
    };

    let page = render(
        &state,
        "register.html",
        None,
        None,
        RegisterPage {
            form: &form,
            errors: &errors,
        },
    )?;
    Ok(page.into_response())
}

/// Query string of the login page.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

#[derive(Serialize)]
struct LoginPage<'a> {
    form: &'a LoginForm,
    errors: &'a ValidationErrors,
    registration_enabled: bool,
}

/// Login form.
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let (jar, notice) = take_notice(jar);
    let form = LoginForm {
        next: query.next,
        ..LoginForm::default()
    };

    let page = render(
        &state,
        "login.html",
        None,
        notice,
        LoginPage {
            form: &form,
            errors: &ValidationErrors::default(),
            registration_enabled: state.auth.registration_enabled(),
        },
    )?;
    Ok((jar, page).into_response())
}

/// Check credentials and open a session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let errors = match form.validate() {
        Ok(()) => match state.auth.login(form.username.trim(), &form.password) {
            Ok((_, token)) => {
                let target = forms::safe_next(form.next.as_deref());
                let jar = jar.add(state.session_cookie(token));
                return Ok((jar, Redirect::to(target)).into_response());
            }
            Err(AppError::Validation(message)) => ValidationErrors::form_error(message),
            Err(e) => return Err(e),
        },
        Err(errors) => errors,
    };

    let page = render(
        &state,
        "login.html",
        None,
        None,
        LoginPage {
            form: &form,
            errors: &errors,
            registration_enabled: state.auth.registration_enabled(),
        },
    )?;
    Ok(page.into_response())
}

/// End the session.
pub async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    state.auth.logout(&ctx.token)?;
    tracing::info!(user = %ctx.username(), "User logged out");

    let jar = jar.remove(state.session_removal_cookie());
    Ok((jar, Redirect::to("/login")))
}

// ============================================================================
// BOOKS
// ============================================================================

/// Home page.
pub async fn index() -> Redirect {
    Redirect::to("/books")
}

#[derive(Serialize)]
struct BookRow<'a> {
    id: i64,
    title: &'a str,
    author: &'a str,
    read: bool,
}

#[derive(Serialize)]
struct BookListPage<'a> {
    books: Vec<BookRow<'a>>,
    read_count: usize,
}

/// Catalog with the user's read marks.
pub async fn book_list(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
) -> Result<Response> {
    let books = state.catalog.list_books()?;
    let read = state.readership.current(&ctx.user)?;
    let (jar, notice) = take_notice(jar);

    let rows: Vec<BookRow<'_>> = books
        .iter()
        .map(|b| BookRow {
            id: b.id,
            title: &b.title,
            author: &b.author,
            read: read.contains(&b.id),
        })
        .collect();

    let page = render(
        &state,
        "book_list.html",
        Some(&ctx.user),
        notice,
        BookListPage {
            read_count: rows.iter().filter(|r| r.read).count(),
            books: rows,
        },
    )?;
    Ok((jar, page).into_response())
}

/// Replace the user's read marks with the checked boxes.
pub async fn update_readership(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<ReadershipForm>,
) -> Result<Redirect> {
    state.readership.submit(&ctx.user, form.book_id)?;
    Ok(Redirect::to("/books"))
}

#[derive(Serialize)]
struct AddBookPage<'a> {
    form: &'a BookForm,
    errors: &'a ValidationErrors,
}

/// Add-book form.
pub async fn add_book_page(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>> {
    render(
        &state,
        "add_book.html",
        Some(&ctx.user),
        None,
        AddBookPage {
            form: &BookForm::default(),
            errors: &ValidationErrors::default(),
        },
    )
}

/// Add a book; the submitter is recorded as having read it.
pub async fn add_book(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
    Form(form): Form<BookForm>,
) -> Result<Response> {
    let errors = match form.validate() {
        Ok(new_book) => match state.catalog.add_book(&new_book, &ctx.user) {
            Ok(book) => {
                let jar = set_notice(jar, &format!("Added \"{}\".", book));
                return Ok((jar, Redirect::to("/books")).into_response());
            }
            Err(AppError::Validation(message)) => ValidationErrors::form_error(message),
            Err(e) => return Err(e),
        },
        Err(errors) => errors,
    };

    let page = render(
        &state,
        "add_book.html",
        Some(&ctx.user),
        None,
        AddBookPage {
            form: &form,
            errors: &errors,
        },
    )?;
    Ok(page.into_response())
}

/// Delete a book (administrators only).
pub async fn delete_book(
    State(state): State<AppState>,
    ctx: RequestContext,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let book = state.catalog.delete_book(id, &ctx.user)?;
    let jar = set_notice(jar, &format!("Deleted \"{}\".", book));
    Ok((jar, Redirect::to("/books")))
}
