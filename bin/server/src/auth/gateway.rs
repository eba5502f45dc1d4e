//! The auth gateway: the orchestrator wiring one backend and one session
//! store into a router.

use axum::Router;
use axum::routing::get;

use super::{AuthState, middleware, routes};

/// Owns exactly one authentication backend and one session store for its
/// lifetime, both fixed at construction.
///
/// `configure` registers the fixed endpoint set (`GET/POST /login`,
/// `GET /logout`, the API-style variants, and, for external backends, the
/// backend's callback path) and installs the per-request middleware
/// around the whole application.
pub struct AuthGateway {
    state: AuthState,
}

impl AuthGateway {
    /// Creates the gateway over the shared auth state.
    #[must_use]
    pub fn new(state: AuthState) -> Self {
        Self { state }
    }

    /// Registers the auth endpoints on top of the application router and
    /// wraps everything in the auth middleware.
    #[must_use]
    pub fn configure(&self, app: Router) -> Router {
        let mut auth_routes = Router::new()
            .route("/login", get(routes::login_page).post(routes::login))
            .route("/logout", get(routes::logout))
            .route(
                "/api/v1/login",
                get(routes::api_login).post(routes::api_login),
            )
            .route("/api/v1/logout", get(routes::api_logout));

        // Only external backends bring a callback endpoint; it is
        // appended to the route table at configuration time.
        if let Some(path) = self.state.backend.callback_path() {
            auth_routes = auth_routes.route(&path, get(routes::callback));
        }

        app.merge(auth_routes.with_state(self.state.clone()))
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                middleware::auth_middleware,
            ))
    }
}
