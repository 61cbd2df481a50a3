//! HTTP route definitions and server setup.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::env::SystemEnv;
use crate::news::NewsClient;
use crate::secrets::{SecretResolver, SecretStore, VaultClient, SIGNING_KEY};

use super::gate::{self, RoutePolicy};
use super::session::SessionKeys;
use super::{pages, rest};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' https://cdn.jsdelivr.net https://kit.fontawesome.com; \
    style-src 'self' https://cdn.jsdelivr.net 'unsafe-inline'; \
    img-src 'self' data: https:; \
    font-src 'self' https://cdn.jsdelivr.net https://kit.fontawesome.com; \
    frame-ancestors 'none';";

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub secrets: Arc<SecretResolver>,
    pub news: NewsClient,
    pub sessions: SessionKeys,
}

impl AppState {
    /// Resolve the signing key and open the stores.
    ///
    /// In production a missing signing key aborts startup.
    pub async fn initialize(config: Config, secrets: Arc<SecretResolver>) -> anyhow::Result<Self> {
        let signing_key = secrets.resolve(&SIGNING_KEY).await?;
        let sessions = SessionKeys::new(
            signing_key.expose(),
            config.session_ttl_hours,
            config.is_production(),
        );
        let db = Database::open(config.database_path.clone()).await?;
        let news = NewsClient::new(&config.news)?;
        Ok(Self {
            config,
            db,
            secrets,
            news,
            sessions,
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter(|origin| {
            if origin.as_str() == "*" {
                tracing::warn!("Ignoring wildcard CORS origin; credentials are allowed");
                return false;
            }
            true
        })
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the application router. Every route goes through the gate.
pub fn build_router(state: Arc<AppState>) -> Router {
    let gated = |policy: &'static RoutePolicy, route: MethodRouter<Arc<AppState>>| {
        (policy.path, gate::guard(policy, &state, route))
    };
    let routes = [
        gated(&gate::HOME, get(pages::home)),
        gated(&gate::CATEGORY, get(pages::category)),
        gated(
            &gate::LOGIN,
            get(pages::login_page).post(pages::login_submit),
        ),
        gated(
            &gate::REGISTER,
            get(pages::register_page).post(pages::register_submit),
        ),
        gated(&gate::LOGOUT, post(pages::logout)),
        gated(&gate::UNSUBSCRIBE, post(pages::unsubscribe)),
        gated(&gate::SUBSCRIBE, get(pages::subscription_page)),
        gated(&gate::SUBSCRIBE_PROCESS, post(pages::process_payment)),
        gated(&gate::SUBSCRIBE_SUCCESS, get(pages::subscription_success)),
        gated(&gate::API_REGISTER, post(rest::register)),
        gated(&gate::API_ADS, get(rest::advertisements)),
        gated(&gate::API_ME, get(rest::me)),
        gated(&gate::API_HEALTH, get(rest::health)),
    ];
    debug_assert_eq!(routes.len(), gate::ROUTES.len());

    let mut router = Router::new();
    for (path, route) in routes {
        router = router.route(path, route);
    }

    router
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state))
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn SecretStore> = Arc::new(VaultClient::new(&config.vault)?);
    let secrets = Arc::new(SecretResolver::from_config(
        &config,
        store,
        Arc::new(SystemEnv),
    ));

    let state = Arc::new(AppState::initialize(config, secrets).await?);
    let app = build_router(Arc::clone(&state));

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        "Server listening on {} ({} mode)",
        addr,
        if state.config.is_production() {
            "production"
        } else {
            "development"
        }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
