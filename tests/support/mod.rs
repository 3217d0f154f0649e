// Fake hosted backend served on an ephemeral port for integration tests.
use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderMap, StatusCode, header::ACCEPT},
    routing::{post, put},
};
use serde_json::{Value, json};
use session_mirror::domain::{Session, User};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

pub const USER_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
pub const EMAIL: &str = "pilot@example.com";
pub const PASSWORD: &str = "hunter22";

type Reply = (StatusCode, Json<Value>);

// Start a fake backend and return its base URL.
pub async fn spawn_backend() -> Url {
    // Bind to an ephemeral port to avoid collisions with local services.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");

    let app = Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/recover", post(recover))
        .route("/auth/v1/user", put(update_user))
        .route("/rest/v1/profiles", post(insert_profile).get(select_profiles));

    // Serve until the test runtime shuts down.
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend failed");
    });

    Url::parse(&format!("http://{addr}/")).expect("valid base url")
}

// Base URL of a port nothing listens on.
pub async fn unreachable_backend() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    drop(listener);
    Url::parse(&format!("http://{addr}/")).expect("valid base url")
}

// An already expired session for the fake user.
pub fn expired_session() -> Session {
    Session {
        access_token: "access-old".to_string(),
        refresh_token: "refresh-access-old".to_string(),
        token_type: "bearer".to_string(),
        expires_at: 0,
        user: User {
            id: USER_ID.parse().expect("valid uuid"),
            email: Some(EMAIL.to_string()),
        },
    }
}

// Receive the next published update or fail the test.
pub async fn next_update<T: Clone>(updates: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("expected an update before timeout")
        .expect("updates channel should stay open")
}

fn token_body(access: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": format!("refresh-{access}"),
        "token_type": "bearer",
        "expires_in": 3600,
        "user": { "id": USER_ID, "email": EMAIL }
    })
}

fn auth_error(status: StatusCode, code: &str, msg: &str) -> Reply {
    (
        status,
        Json(json!({ "code": status.as_u16(), "error_code": code, "msg": msg })),
    )
}

async fn token(Query(params): Query<HashMap<String, String>>, Json(body): Json<Value>) -> Reply {
    match params.get("grant_type").map(String::as_str) {
        Some("password") if body["email"] == EMAIL && body["password"] == PASSWORD => {
            (StatusCode::OK, Json(token_body("access-1")))
        }
        Some("password") => auth_error(
            StatusCode::BAD_REQUEST,
            "invalid_credentials",
            "Invalid login credentials",
        ),
        Some("refresh_token")
            if body["refresh_token"]
                .as_str()
                .is_some_and(|token| token.starts_with("refresh-")) =>
        {
            (StatusCode::OK, Json(token_body("access-refreshed")))
        }
        Some("refresh_token") => auth_error(
            StatusCode::BAD_REQUEST,
            "refresh_token_not_found",
            "Invalid Refresh Token: Refresh Token Not Found",
        ),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        ),
    }
}

async fn signup(Json(body): Json<Value>) -> Reply {
    let password = body["password"].as_str().unwrap_or_default();
    if password.len() < 8 {
        return auth_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "weak_password",
            "Password should be at least 8 characters.",
        );
    }
    match body["email"].as_str() {
        Some("taken@example.com") => auth_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "user_already_exists",
            "User already registered",
        ),
        // Confirmation required: user only, no session.
        Some("confirm@example.com") => (
            StatusCode::OK,
            Json(json!({ "id": USER_ID, "email": "confirm@example.com" })),
        ),
        _ => (StatusCode::OK, Json(token_body("access-signup"))),
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn recover() -> Reply {
    (StatusCode::OK, Json(json!({})))
}

async fn update_user(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if headers.get("authorization").is_none() {
        return auth_error(
            StatusCode::UNAUTHORIZED,
            "no_authorization",
            "This endpoint requires a Bearer token",
        );
    }
    let email = body["email"].as_str().unwrap_or(EMAIL);
    (StatusCode::OK, Json(json!({ "id": USER_ID, "email": email })))
}

fn wants_single_object(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("vnd.pgrst.object"))
}

async fn select_profiles(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    let profile = json!({ "id": 1, "name": "pilot" });
    if !wants_single_object(&headers) {
        return (StatusCode::OK, Json(json!([profile])));
    }
    match params.get("id").map(String::as_str) {
        Some("eq.1") => (StatusCode::OK, Json(profile)),
        _ => (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({
                "code": "PGRST116",
                "details": "The result contains 0 rows",
                "hint": null,
                "message": "JSON object requested, multiple (or no) rows returned"
            })),
        ),
    }
}

async fn insert_profile(Json(body): Json<Value>) -> Reply {
    match body["name"].as_str() {
        Some("dup") => (
            StatusCode::CONFLICT,
            Json(json!({
                "code": "23505",
                "details": "Key (name)=(dup) already exists.",
                "hint": null,
                "message": "duplicate key value violates unique constraint \"profiles_name_key\""
            })),
        ),
        Some("orphan") => (
            StatusCode::CONFLICT,
            Json(json!({
                "code": "23503",
                "details": "Key (team_id)=(9) is not present in table \"teams\".",
                "hint": null,
                "message": "insert or update on table \"profiles\" violates foreign key constraint"
            })),
        ),
        Some("broken") => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "XX999",
                "details": null,
                "hint": null,
                "message": "boom"
            })),
        ),
        _ => (StatusCode::CREATED, Json(json!({ "id": 2, "name": body["name"] }))),
    }
}
