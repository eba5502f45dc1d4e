use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse_server::auth::{AuthGateway, AuthState, registry};
use gatehouse_server::config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Resolve backend, session store, and authorization chain from the
    // static registries. Unknown identifiers are configuration defects
    // and abort startup here.
    let backend = registry::build_backend(&config)
        .await
        .expect("failed to construct auth backend");
    let sessions = registry::build_session_store(&config.session, &config.cache)
        .await
        .expect("failed to construct session store");
    let authz =
        registry::build_authz_chain(&config.auth).expect("failed to construct authorization chain");

    tracing::info!(
        backend = backend.name(),
        store = %config.session.store,
        checks = authz.len(),
        "auth layer configured"
    );

    let state = AuthState::new(backend, sessions, Arc::new(authz), &config.auth);
    let gateway = AuthGateway::new(state);

    let app = Router::new().route("/healthz", get(healthz));
    let app = gateway.configure(app).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}

async fn healthz() -> &'static str {
    "ok"
}
