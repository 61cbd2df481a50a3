//! Request gate: per-route method and authentication policy.
//!
//! Every route is registered from [`ROUTES`] and wrapped with [`guard`], so
//! the policy table is the single place that decides which methods a route
//! accepts and who may reach it. The method check runs first; a request with
//! a disallowed method never reaches authentication or the handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::MethodRouter,
    Json,
};
use axum_extra::extract::cookie::CookieJar;

use super::routes::AppState;
use super::session::{self, CurrentUser};

/// Methods a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Methods {
    /// GET and HEAD
    Safe,
    /// POST only
    Post,
    /// GET (render the form) and POST (submit it)
    Form,
}

impl Methods {
    pub fn allows(self, method: &Method) -> bool {
        match self {
            Methods::Safe => method == Method::GET || method == Method::HEAD,
            Methods::Post => method == Method::POST,
            Methods::Form => method == Method::GET || method == Method::POST,
        }
    }

    /// Value for the `Allow` header of a 405 response.
    pub fn allow_header(self) -> &'static str {
        match self {
            Methods::Safe => "GET, HEAD",
            Methods::Post => "POST",
            Methods::Form => "GET, POST",
        }
    }
}

/// Who may reach a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Authenticated; anonymous browsers are redirected to the login page.
    Page,
    /// Authenticated; anonymous clients get a 401 JSON body.
    Api,
}

#[derive(Debug)]
pub struct RoutePolicy {
    pub path: &'static str,
    pub methods: Methods,
    pub access: Access,
}

pub static HOME: RoutePolicy = RoutePolicy {
    path: "/",
    methods: Methods::Safe,
    access: Access::Page,
};

pub static CATEGORY: RoutePolicy = RoutePolicy {
    path: "/category/:name",
    methods: Methods::Safe,
    access: Access::Page,
};

pub static LOGIN: RoutePolicy = RoutePolicy {
    path: "/login",
    methods: Methods::Form,
    access: Access::Public,
};

pub static REGISTER: RoutePolicy = RoutePolicy {
    path: "/register",
    methods: Methods::Form,
    access: Access::Public,
};

pub static LOGOUT: RoutePolicy = RoutePolicy {
    path: "/logout",
    methods: Methods::Post,
    access: Access::Public,
};

pub static UNSUBSCRIBE: RoutePolicy = RoutePolicy {
    path: "/unsubscribe",
    methods: Methods::Post,
    access: Access::Page,
};

pub static SUBSCRIBE: RoutePolicy = RoutePolicy {
    path: "/subscribe",
    methods: Methods::Safe,
    access: Access::Page,
};

pub static SUBSCRIBE_PROCESS: RoutePolicy = RoutePolicy {
    path: "/subscribe/process",
    methods: Methods::Post,
    access: Access::Page,
};

pub static SUBSCRIBE_SUCCESS: RoutePolicy = RoutePolicy {
    path: "/subscribe/success",
    methods: Methods::Safe,
    access: Access::Page,
};

pub static API_REGISTER: RoutePolicy = RoutePolicy {
    path: "/api/register",
    methods: Methods::Post,
    access: Access::Public,
};

pub static API_ADS: RoutePolicy = RoutePolicy {
    path: "/api/ads",
    methods: Methods::Safe,
    access: Access::Public,
};

pub static API_ME: RoutePolicy = RoutePolicy {
    path: "/api/me",
    methods: Methods::Safe,
    access: Access::Api,
};

pub static API_HEALTH: RoutePolicy = RoutePolicy {
    path: "/api/health",
    methods: Methods::Safe,
    access: Access::Public,
};

pub static ROUTES: &[&RoutePolicy] = &[
    &HOME,
    &CATEGORY,
    &LOGIN,
    &REGISTER,
    &LOGOUT,
    &UNSUBSCRIBE,
    &SUBSCRIBE,
    &SUBSCRIBE_PROCESS,
    &SUBSCRIBE_SUCCESS,
    &API_REGISTER,
    &API_ADS,
    &API_ME,
    &API_HEALTH,
];

/// Wrap `route` so every request is checked against `policy` first.
pub fn guard(
    policy: &'static RoutePolicy,
    state: &Arc<AppState>,
    route: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    route.layer(middleware::from_fn_with_state(
        Arc::clone(state),
        move |State(state): State<Arc<AppState>>, req: Request<Body>, next: Next| {
            enforce(policy, state, req, next)
        },
    ))
}

async fn enforce(
    policy: &'static RoutePolicy,
    state: Arc<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if !policy.methods.allows(req.method()) {
        tracing::debug!("{} {} rejected: method not allowed", req.method(), policy.path);
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, policy.methods.allow_header())],
            "Method Not Allowed",
        )
            .into_response();
    }

    let user = identify(&state, req.headers()).await;
    match (user, policy.access) {
        (Some(user), _) => {
            req.extensions_mut().insert(user);
        }
        (None, Access::Public) => {}
        (None, Access::Page) => {
            let next_path = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(policy.path);
            return Redirect::to(&format!(
                "/login?next={}",
                urlencoding::encode(next_path)
            ))
            .into_response();
        }
        (None, Access::Api) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "detail": "Authentication credentials were not provided."
                })),
            )
                .into_response();
        }
    }

    next.run(req).await
}

/// Authenticate from the session cookie, a bearer JWT, or an API token.
async fn identify(state: &AppState, headers: &HeaderMap) -> Option<CurrentUser> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if let Some(key) = authorization.strip_prefix("Token ") {
        return match state.db.user_for_token(key.trim()).await {
            Ok(user) => user.as_ref().map(CurrentUser::from),
            Err(e) => {
                tracing::warn!("Token lookup failed: {}", e);
                None
            }
        };
    }

    let token = authorization
        .strip_prefix("Bearer ")
        .or_else(|| authorization.strip_prefix("bearer "))
        .map(|t| t.trim().to_string())
        .or_else(|| session::session_token(&CookieJar::from_headers(headers)))?;

    let claimed = state.sessions.verify(&token)?;
    // The account may have been removed since the session was issued.
    match state.db.find_user(claimed.id).await {
        Ok(Some(user)) => Some(CurrentUser::from(&user)),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Session user lookup failed: {}", e);
            None
        }
    }
}
