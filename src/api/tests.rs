use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::session::SessionKeys;
use super::{build_router, AppState};
use crate::config::{Config, NewsConfig};
use crate::db::{Database, NewAdvertisement};
use crate::env::MapEnv;
use crate::news::NewsClient;
use crate::secrets::{EnvOverride, SecretResolver, NEWS_API_KEY};

const PASSWORD: &str = "tr0ub4dor&3";

struct Harness {
    state: Arc<AppState>,
    app: Router,
    news: MockServer,
}

async fn harness(news_status: u16) -> Harness {
    let news = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(news_status).set_body_json(serde_json::json!({
            "status": "ok",
            "articles": [{ "title": "Markets rally", "url": "https://example.com/markets" }]
        })))
        .mount(&news)
        .await;

    let env = MapEnv::new().with("NEWS_API_KEY_OVERRIDE", "test-news-key");
    let secrets = Arc::new(SecretResolver::new(
        vec![Box::new(EnvOverride::new(Arc::new(env)))],
        false,
    ));
    let config = Config {
        debug: true,
        news: NewsConfig {
            base_url: news.uri(),
            country: "us".to_string(),
            timeout: Duration::from_secs(2),
        },
        ..Config::default()
    };
    let state = Arc::new(AppState {
        news: NewsClient::new(&config.news).unwrap(),
        db: Database::open_in_memory().await.unwrap(),
        sessions: SessionKeys::new("test-signing-key", 24, false),
        secrets,
        config,
    });
    let app = build_router(Arc::clone(&state));
    Harness { state, app, news }
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// `name=value` pair from the response's Set-Cookie headers.
fn set_cookie(resp: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn location(resp: &Response) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let resp = send(
        app,
        post_form(
            "/register",
            &[
                ("username", username),
                ("email", "reader@example.com"),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    set_cookie(&resp, "sessionid").expect("session cookie")
}

#[tokio::test]
async fn wrong_method_is_rejected_before_auth() {
    let h = harness(200).await;

    let resp = send(
        &h.app,
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers().get(header::ALLOW).unwrap(), "GET, HEAD");

    let resp = send(&h.app, get("/logout", None)).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers().get(header::ALLOW).unwrap(), "POST");

    let resp = send(
        &h.app,
        Request::builder()
            .method(Method::HEAD)
            .uri("/login")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = send(&h.app, get("/subscribe/process", None)).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn wrong_method_skips_handler_for_signed_in_user() {
    let h = harness(200).await;
    let cookie = register_and_login(&h.app, "alice").await;
    let user = h.state.db.find_user_by_username("alice").await.unwrap().unwrap();

    let resp = send(&h.app, post_form("/", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(h.news.received_requests().await.unwrap().len(), 0);

    let resp = send(&h.app, post_form("/subscribe", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let resp = send(&h.app, get("/subscribe/process", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(h.state.db.subscription(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn wildcard_cors_origin_does_not_break_router() {
    let h = harness(200).await;
    let state = Arc::new(AppState {
        config: Config {
            cors_allowed_origins: vec!["*".to_string(), "http://localhost:8000".to_string()],
            ..Config::default()
        },
        db: h.state.db.clone(),
        secrets: Arc::clone(&h.state.secrets),
        news: h.state.news.clone(),
        sessions: SessionKeys::new("test-signing-key", 24, false),
    });
    let app = build_router(state);

    let resp = send(&app, get("/api/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn anonymous_page_request_redirects_to_login() {
    let h = harness(200).await;

    let resp = send(&h.app, get("/category/sports", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login?next=%2Fcategory%2Fsports");

    let resp = send(&h.app, post_form("/unsubscribe", &[], None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/login"));
    assert_eq!(h.news.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn anonymous_api_request_is_401() {
    let h = harness(200).await;
    let resp = send(&h.app, get("/api/me", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_session_is_anonymous() {
    let h = harness(200).await;
    let forged = SessionKeys::new("other-key", 24, false)
        .issue(&crate::db::User {
            id: 1,
            username: "alice".to_string(),
            email: String::new(),
            password_hash: String::new(),
            date_joined: String::new(),
        })
        .unwrap();

    let resp = send(&h.app, get("/", Some(&format!("sessionid={}", forged)))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn security_headers_on_every_response() {
    let h = harness(200).await;
    for resp in [
        send(&h.app, get("/api/health", None)).await,
        send(&h.app, get("/", None)).await,
        send(&h.app, get("/login", None)).await,
    ] {
        let headers = resp.headers();
        assert!(headers
            .get(header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("frame-ancestors 'none'"));
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    }
}

#[tokio::test]
async fn home_renders_headlines_with_override_key() {
    let h = harness(200).await;
    h.state
        .db
        .insert_advertisement(NewAdvertisement {
            title: "Buy coffee".to_string(),
            ..NewAdvertisement::default()
        })
        .await
        .unwrap();
    let cookie = register_and_login(&h.app, "alice").await;

    let resp = send(&h.app, get("/", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Markets rally"));
    assert!(html.contains("Buy coffee"));

    let requests = h.news.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .url
        .query()
        .unwrap_or("")
        .contains("apiKey=test-news-key"));
}

#[tokio::test]
async fn news_failure_renders_empty_page() {
    let h = harness(500).await;
    let cookie = register_and_login(&h.app, "alice").await;

    let resp = send(&h.app, get("/category/science", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("<h1>Science</h1>"));
    assert!(html.contains("No headlines available"));
}

#[tokio::test]
async fn rejected_news_key_is_dropped_from_cache() {
    let h = harness(401).await;
    let cookie = register_and_login(&h.app, "alice").await;

    let resp = send(&h.app, get("/", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!h.state.secrets.invalidate(NEWS_API_KEY.name).await);
}

#[tokio::test]
async fn accepted_news_key_stays_cached() {
    let h = harness(200).await;
    let cookie = register_and_login(&h.app, "alice").await;

    send(&h.app, get("/", Some(&cookie))).await;
    assert!(h.state.secrets.invalidate(NEWS_API_KEY.name).await);
}

#[tokio::test]
async fn subscription_toggle_flow() {
    let h = harness(200).await;
    let cookie = register_and_login(&h.app, "alice").await;
    let user = h.state.db.find_user_by_username("alice").await.unwrap().unwrap();

    // Unsubscribing without a record changes nothing and flashes nothing.
    let resp = send(&h.app, post_form("/unsubscribe", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert!(set_cookie(&resp, "messages").is_none());
    assert!(h.state.db.subscription(user.id).await.unwrap().is_none());

    let resp = send(&h.app, post_form("/subscribe/process", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/subscribe/success");
    let flash = set_cookie(&resp, "messages").expect("flash cookie");
    assert!(h.state.db.is_subscribed(user.id).await.unwrap());

    let resp = send(
        &h.app,
        get("/subscribe/success", Some(&format!("{}; {}", cookie, flash))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Successfully Subscribed!"));

    let resp = send(&h.app, post_form("/unsubscribe", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(set_cookie(&resp, "messages").is_some());
    assert!(!h.state.db.is_subscribed(user.id).await.unwrap());
}

#[tokio::test]
async fn login_failure_and_next_redirect() {
    let h = harness(200).await;
    register_and_login(&h.app, "alice").await;

    let resp = send(
        &h.app,
        post_form("/login", &[("username", "alice"), ("password", "wrong")], None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(set_cookie(&resp, "sessionid").is_none());
    assert!(body_text(resp).await.contains("Invalid credentials"));

    let resp = send(
        &h.app,
        post_form(
            "/login",
            &[
                ("username", "alice"),
                ("password", PASSWORD),
                ("next", "/category/science"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/category/science");
    assert!(set_cookie(&resp, "sessionid").is_some());

    let resp = send(
        &h.app,
        post_form(
            "/login",
            &[
                ("username", "alice"),
                ("password", PASSWORD),
                ("next", "https://evil.test/"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn register_form_reports_problems() {
    let h = harness(200).await;

    let resp = send(
        &h.app,
        post_form(
            "/register",
            &[
                ("username", "bob"),
                ("password1", PASSWORD),
                ("password2", "something-else"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Passwords do not match"));

    register_and_login(&h.app, "bob").await;
    let resp = send(
        &h.app,
        post_form(
            "/register",
            &[
                ("username", "bob"),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Error creating account."));
}

#[tokio::test]
async fn logout_clears_session() {
    let h = harness(200).await;
    let cookie = register_and_login(&h.app, "alice").await;

    let resp = send(&h.app, post_form("/logout", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    assert_eq!(set_cookie(&resp, "sessionid").as_deref(), Some("sessionid="));
}

#[tokio::test]
async fn api_register_issues_token() {
    let h = harness(200).await;

    let resp = send(
        &h.app,
        post_json(
            "/api/register",
            serde_json::json!({"username": "carol", "email": "carol@example.com", "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 40);
    assert_eq!(body["user"]["username"], "carol");
    assert!(body["user"].get("password_hash").is_none());

    let resp = send(
        &h.app,
        Request::builder()
            .uri("/api/me")
            .header(header::AUTHORIZATION, format!("Token {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let me: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(me["username"], "carol");
    assert_eq!(me["is_subscribed"], false);

    let resp = send(
        &h.app,
        post_json(
            "/api/register",
            serde_json::json!({"username": "carol", "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let errors: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(errors.get("username").is_some());

    let resp = send(
        &h.app,
        post_json(
            "/api/register",
            serde_json::json!({"username": "dave", "password": "123"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let errors: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(errors.get("password").is_some());
}

#[tokio::test]
async fn api_register_malformed_body_is_json_error() {
    let h = harness(200).await;

    let resp = send(
        &h.app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{"))
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(body["detail"].as_str().unwrap().contains("JSON"));
}

#[tokio::test]
async fn bearer_session_token_authenticates_api() {
    let h = harness(200).await;
    let cookie = register_and_login(&h.app, "erin").await;
    let jwt = cookie.trim_start_matches("sessionid=");

    let resp = send(
        &h.app,
        Request::builder()
            .uri("/api/me")
            .header(header::AUTHORIZATION, format!("Bearer {}", jwt))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn ads_and_health_are_public() {
    let h = harness(200).await;
    h.state
        .db
        .insert_advertisement(NewAdvertisement {
            title: "Ad".to_string(),
            ..NewAdvertisement::default()
        })
        .await
        .unwrap();

    let resp = send(&h.app, get("/api/ads", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ads: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(ads.as_array().unwrap().len(), 1);

    let resp = send(&h.app, get("/api/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(health["status"], "ok");
}
