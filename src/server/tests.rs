use super::*;
use crate::config::Config;
use crate::db::{Database, Role, User};
use crate::forms::NewBook;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use std::collections::BTreeSet;
use tower::ServiceExt;

struct TestApp {
    state: AppState,
    router: Router,
    user: User,
    admin: User,
    book1: i64,
    book2: i64,
}

fn test_app() -> TestApp {
    let db = Database::open_memory().unwrap();
    let state = AppState::from_config(Config::default(), db).unwrap();

    let user = state
        .auth
        .create_user("testuser", "password123", Role::User)
        .unwrap();
    let admin = state
        .auth
        .create_user("admin", "adminpass1", Role::Admin)
        .unwrap();

    let add = |title: &str, author: &str| {
        state
            .catalog
            .add_book(
                &NewBook {
                    title: title.to_string(),
                    author: author.to_string(),
                },
                &admin,
            )
            .unwrap()
            .id
    };
    let book1 = add("Book One", "Author A");
    let book2 = add("Book Two", "Author B");

    TestApp {
        router: create_router(state.clone()),
        state,
        user,
        admin,
        book1,
        book2,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(
        header::CONTENT_TYPE,
        "application/x-www-form-urlencoded",
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `name=value` pairs of every cookie the response sets.
fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
        .collect()
}

async fn login(app: &TestApp, username: &str, password: &str) -> String {
    let response = send(
        app,
        post_form(
            "/login",
            &format!("username={}&password={}", username, password),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("session="))
        .unwrap()
}

#[tokio::test]
async fn register_redirects_to_login_and_allows_login() {
    let app = test_app();

    let response = send(
        &app,
        post_form(
            "/register",
            "username=newuser&password1=ComplexPass123&password2=ComplexPass123",
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(
        app.state
            .db
            .get_user_by_username("newuser")
            .unwrap()
            .is_some()
    );

    let cookie = login(&app, "newuser", "ComplexPass123").await;
    assert!(cookie.len() > "session=".len());
}

#[tokio::test]
async fn register_invalid_rerenders_form() {
    let app = test_app();

    let response = send(
        &app,
        post_form(
            "/register",
            "username=newuser&password1=ComplexPass123&password2=Different123",
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("password fields didn"));
    assert!(body.contains("value=\"newuser\""));

    let response = send(
        &app,
        post_form(
            "/register",
            "username=testuser&password1=ComplexPass123&password2=ComplexPass123",
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("already exists"));
}

#[tokio::test]
async fn login_sets_only_session_cookie() {
    let app = test_app();

    let response = send(
        &app,
        post_form("/login", "username=testuser&password=password123", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/books");

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("session="));
}

#[tokio::test]
async fn login_wrong_password_rerenders_form() {
    let app = test_app();

    let response = send(
        &app,
        post_form("/login", "username=testuser&password=nope12345", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert!(
        body_text(response)
            .await
            .contains("Please enter a correct username and password.")
    );
}

#[tokio::test]
async fn login_honours_local_next() {
    let app = test_app();

    let response = send(
        &app,
        post_form(
            "/login",
            "username=testuser&password=password123&next=%2Fbooks%2Fadd",
            None,
        ),
    )
    .await;
    assert_eq!(location(&response), "/books/add");

    let response = send(
        &app,
        post_form(
            "/login",
            "username=testuser&password=password123&next=https%3A%2F%2Fevil.example",
            None,
        ),
    )
    .await;
    assert_eq!(location(&response), "/books");

    // Tabs and newlines are dropped by browsers, turning "/\t/host" into "//host".
    for next in ["%2F%09%2Fevil.example", "%2F%0A%2Fevil", "%2Fbooks%0D%0AX-Evil%3A+1"] {
        let response = send(
            &app,
            post_form(
                "/login",
                &format!("username=testuser&password=password123&next={}", next),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/books");
        assert!(set_cookies(&response)[0].starts_with("session="));
    }
}

#[tokio::test]
async fn login_after_expired_logout_keeps_session() {
    let app = test_app();

    let response = send(&app, post_form("/logout", "", Some("session=expired"))).await;
    assert_eq!(location(&response), "/login?next=%2Flogout");

    let response = send(
        &app,
        post_form(
            "/login",
            "username=testuser&password=password123&next=%2Flogout",
            None,
        ),
    )
    .await;
    assert_eq!(location(&response), "/books");
}

#[tokio::test]
async fn session_cookie_attributes() {
    let mut config = Config::default();
    config.auth.secure_cookies = true;
    let state = AppState::from_config(config, Database::open_memory().unwrap()).unwrap();
    state
        .auth
        .create_user("testuser", "password123", Role::User)
        .unwrap();
    let router = create_router(state);

    let response = router
        .clone()
        .oneshot(post_form(
            "/login",
            "username=testuser&password=password123",
            None,
        ))
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=1209600"));
    assert!(cookie.contains("Secure"));

    let session = cookie.split(';').next().unwrap().to_string();
    let response = router
        .oneshot(post_form("/logout", "", Some(&session)))
        .await
        .unwrap();
    let removal = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(removal.starts_with("session="));
    assert!(removal.contains("Max-Age=0"));
    assert!(removal.contains("Secure"));
}

#[tokio::test]
async fn anonymous_is_sent_to_login() {
    let app = test_app();

    let response = send(&app, get("/books", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?next=%2Fbooks");

    let response = send(&app, get("/books", Some("session=bogus"))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn book_list_shows_catalog() {
    let app = test_app();
    let cookie = login(&app, "testuser", "password123").await;

    let response = send(&app, get("/books", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Book One"));
    assert!(body.contains("Book Two"));
    assert!(body.contains("testuser"));
    assert!(!body.contains("/delete"));
}

#[tokio::test]
async fn admin_sees_delete_links() {
    let app = test_app();
    let cookie = login(&app, "admin", "adminpass1").await;

    let body = body_text(send(&app, get("/books", Some(&cookie))).await).await;
    assert!(body.contains(&format!("/books/{}/delete", app.book1)));
}

#[tokio::test]
async fn add_duplicate_book_rerenders_with_error() {
    let app = test_app();
    let cookie = login(&app, "testuser", "password123").await;

    let response = send(
        &app,
        post_form("/books/add", "title=Book+One&author=Author+A", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("A book with this title and author already exists.")
    );
    assert_eq!(app.state.catalog.list_books().unwrap().len(), 2);
}

#[tokio::test]
async fn add_book_success() {
    let app = test_app();
    let cookie = login(&app, "testuser", "password123").await;

    let response = send(
        &app,
        post_form(
            "/books/add",
            "title=New+Book&author=New+Author",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/books");

    let book = app
        .state
        .db
        .find_book("New Book", "New Author")
        .unwrap()
        .unwrap();
    assert!(
        app.state
            .readership
            .current(&app.user)
            .unwrap()
            .contains(&book.id)
    );
}

#[tokio::test]
async fn delete_book_permission() {
    let app = test_app();
    let uri = format!("/books/{}/delete", app.book1);

    let cookie = login(&app, "testuser", "password123").await;
    let response = send(&app, get(&uri, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.state.db.get_book(app.book1).unwrap().is_some());

    let cookie = login(&app, "admin", "adminpass1").await;
    let response = send(&app, get(&uri, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/books");
    assert!(app.state.db.get_book(app.book1).unwrap().is_none());

    // The success notice shows once on the next page.
    let notice = set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("notice="))
        .unwrap();
    let cookies = format!("{}; {}", cookie, notice);
    let response = send(&app, get("/books", Some(&cookies))).await;
    let body = body_text(response).await;
    assert!(body.contains("Deleted"));
    assert!(!body.contains(&format!("/books/{}/delete", app.book1)));
    assert!(body.contains(&format!("/books/{}/delete", app.book2)));
}

#[tokio::test]
async fn delete_missing_book_is_not_found() {
    let app = test_app();
    let cookie = login(&app, "admin", "adminpass1").await;

    let response = send(&app, get("/books/9999/delete", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mark_books_read_replaces_selection() {
    let app = test_app();
    let cookie = login(&app, "testuser", "password123").await;

    let both = format!("book_id={}&book_id={}", app.book1, app.book2);
    let response = send(&app, post_form("/books", &both, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/books");
    assert_eq!(
        app.state.readership.current(&app.user).unwrap(),
        BTreeSet::from([app.book1, app.book2])
    );

    let only_two = format!("book_id={}", app.book2);
    let response = send(&app, post_form("/books", &only_two, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        app.state.readership.current(&app.user).unwrap(),
        BTreeSet::from([app.book2])
    );

    // Nothing checked clears the marks.
    send(&app, post_form("/books", "", Some(&cookie))).await;
    assert!(app.state.readership.current(&app.user).unwrap().is_empty());

    // The admin's marks from adding the books are untouched.
    assert_eq!(
        app.state.readership.current(&app.admin).unwrap(),
        BTreeSet::from([app.book1, app.book2])
    );
}

#[tokio::test]
async fn mark_unknown_book_is_not_found() {
    let app = test_app();
    let cookie = login(&app, "testuser", "password123").await;

    let response = send(&app, post_form("/books", "book_id=4242", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_ends_session() {
    let app = test_app();
    let cookie = login(&app, "testuser", "password123").await;

    let response = send(&app, post_form("/logout", "", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = send(&app, get("/books", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login"));
}
