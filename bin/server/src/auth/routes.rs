//! Authentication endpoints: login page, login, logout, API variants, and
//! the external callback.
//!
//! Every failure inside a handler is converted into a response here;
//! nothing propagates far enough to crash the serving process. Flow
//! errors on the callback funnel into a single redirect to the configured
//! failure destination after being logged with full context.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;

use gatehouse_access::{AuthError, Identity};

use super::AuthState;
use super::backend::{AuthOutcome, CallbackParams, extract_credentials};
use crate::error::ApiError;

/// The login form, rendered for page-style requests on the local backend.
fn login_form(message: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>Login</title></head>
  <body>
    <p>{message}</p>
    <form action="/login" method="POST">
      Login:
      <input type="text" name="login">
      Password:
      <input type="password" name="password">
      <input type="submit" value="Login">
    </form>
    <a href="/logout">Logout</a>
  </body>
</html>
"#
    )
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CONTENT_TYPE)?.to_str().ok()
}

/// Creates the session and attaches the handle cookie to the jar.
async fn establish_session(
    state: &AuthState,
    jar: CookieJar,
    identity: &Identity,
) -> Result<CookieJar, AuthError> {
    let (_session, handle) = state.sessions.create(identity).await?;

    let config = state.sessions.cookie();
    let cookie = Cookie::build((config.name.clone(), handle))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .max_age(config.max_age);

    Ok(jar.add(cookie))
}

/// Forgets the session behind the cookie and clears it client-side.
async fn clear_session(state: &AuthState, jar: CookieJar) -> CookieJar {
    let name = state.sessions.cookie().name.clone();
    if let Some(cookie) = jar.get(&name) {
        state.sessions.forget(cookie.value()).await;
    }

    let removal = Cookie::build((name, ""))
        .path("/")
        .max_age(time::Duration::ZERO);
    jar.add(removal)
}

/// `GET /login`: renders the login form, or issues the provider
/// redirect straight away for external backends.
pub async fn login_page(State(state): State<AuthState>) -> Response {
    match state.backend.authenticate(None).await {
        Ok(AuthOutcome::Redirect(url)) => Redirect::to(&url).into_response(),
        Ok(AuthOutcome::Authenticated(_)) => Redirect::to(&state.home_redirect).into_response(),
        Err(AuthError::InvalidAuth { .. }) => {
            Html(login_form("You need to login")).into_response()
        }
        Err(err) => {
            tracing::error!(backend = state.backend.name(), error = %err, "failed to start login flow");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Html(login_form("Login is temporarily unavailable")),
            )
                .into_response()
        }
    }
}

/// `POST /login`: submits credentials from the login form.
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = extract_credentials(content_type(&headers), &body);

    match state.backend.authenticate(credentials).await {
        Ok(AuthOutcome::Authenticated(identity)) => {
            match establish_session(&state, jar, &identity).await {
                Ok(jar) => (jar, Redirect::to(&state.home_redirect)).into_response(),
                Err(err) => {
                    tracing::error!(error = %err, "session creation failed");
                    (
                        StatusCode::UNAUTHORIZED,
                        Html(login_form("Failed to create session")),
                    )
                        .into_response()
                }
            }
        }
        Ok(AuthOutcome::Redirect(url)) => Redirect::to(&url).into_response(),
        Err(AuthError::ConsentRequired { consent_url }) => {
            Redirect::to(&consent_url).into_response()
        }
        Err(AuthError::InvalidAuth { .. }) => (
            StatusCode::UNAUTHORIZED,
            Html(login_form("Invalid username/password combination")),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(backend = state.backend.name(), error = %err, "login failed");
            (StatusCode::UNAUTHORIZED, Html(login_form("Login failed"))).into_response()
        }
    }
}

/// `GET /logout`: clears the session and returns to the application root.
pub async fn logout(State(state): State<AuthState>, jar: CookieJar) -> impl IntoResponse {
    let jar = clear_session(&state, jar).await;
    (jar, Redirect::to("/"))
}

/// `GET|POST /api/v1/login`: API-style login with a JSON identity body.
pub async fn api_login(
    State(state): State<AuthState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = extract_credentials(content_type(&headers), &body);

    match state.backend.authenticate(credentials).await {
        Ok(AuthOutcome::Authenticated(identity)) => {
            match establish_session(&state, jar, &identity).await {
                Ok(jar) => (jar, Json(identity)).into_response(),
                Err(err) => ApiError::from(err).into_response(),
            }
        }
        Ok(AuthOutcome::Redirect(url)) => Redirect::to(&url).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// `GET /api/v1/logout`: API-style logout with a JSON confirmation.
pub async fn api_logout(State(state): State<AuthState>, jar: CookieJar) -> impl IntoResponse {
    let jar = clear_session(&state, jar).await;
    (jar, Json(json!({ "message": "logout successful" })))
}

/// Provider callback: resumes the stashed flow and finishes session
/// creation, or funnels any failure to the configured failure redirect.
pub async fn callback(
    State(state): State<AuthState>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    match state.backend.auth_callback(params).await {
        Ok(identity) => match establish_session(&state, jar, &identity).await {
            Ok(jar) => (jar, Redirect::to(&state.home_redirect)).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "session creation failed after callback");
                Redirect::to(&state.failure_redirect).into_response()
            }
        },
        Err(AuthError::ConsentRequired { consent_url }) => {
            Redirect::to(&consent_url).into_response()
        }
        Err(err) => {
            tracing::error!(backend = state.backend.name(), error = %err, "external login callback failed");
            Redirect::to(&state.failure_redirect).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::backend::LocalBackend;
    use crate::auth::entra::EntraBackend;
    use crate::auth::gateway::AuthGateway;
    use crate::auth::middleware::RequireUser;
    use crate::auth::session_store::CacheSessionStore;
    use crate::config::{AuthConfig, EntraConfig, LocalUser, SessionConfig};
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use gatehouse_access::{AuthzChain, FlowState};
    use gatehouse_cache::{KvCache, MemoryCache};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn hash_password(password: &str) -> String {
        let salt = SaltString::encode_b64(b"gatehouse-test-salt").expect("salt");
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("hash")
            .to_string()
    }

    fn test_user() -> LocalUser {
        LocalUser {
            username: "alice".to_string(),
            password_hash: hash_password("hunter2"),
            email: Some("alice@example.com".to_string()),
            given_name: Some("Alice".to_string()),
            family_name: Some("Example".to_string()),
            display_name: Some("Alice Example".to_string()),
        }
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            store: "memory".to_string(),
            secure_cookies: false,
            ..SessionConfig::default()
        }
    }

    fn local_state() -> AuthState {
        AuthState::new(
            Arc::new(LocalBackend::new(vec![test_user()])),
            Arc::new(CacheSessionStore::new(
                Arc::new(MemoryCache::new()),
                &session_config(),
            )),
            Arc::new(AuthzChain::new()),
            &AuthConfig::default(),
        )
    }

    fn entra_state(cache: Arc<MemoryCache>, provider_base: &str) -> AuthState {
        let entra = EntraConfig {
            tenant_id: "testtenant".to_string(),
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            scopes: "https://graph.microsoft.com/.default".to_string(),
            domain_hint: None,
            authority: provider_base.to_string(),
            userinfo_url: format!("{provider_base}/me"),
            provider_timeout_ms: 2_000,
        };
        let backend =
            EntraBackend::new(entra, cache, "http://127.0.0.1:3000").expect("backend");

        AuthState::new(
            Arc::new(backend),
            Arc::new(CacheSessionStore::new(
                Arc::new(MemoryCache::new()),
                &session_config(),
            )),
            Arc::new(AuthzChain::new()),
            &AuthConfig::default(),
        )
    }

    fn app(state: AuthState) -> Router {
        let inner = Router::new()
            .route("/", get(|| async { "home" }))
            .route(
                "/whoami",
                get(|RequireUser(identity): RequireUser| async move { Json(identity) }),
            );
        AuthGateway::new(state).configure(inner)
    }

    /// Spawns a stub identity provider serving the token and userinfo
    /// endpoints, returning its base URL.
    async fn spawn_stub_provider() -> String {
        let provider = Router::new()
            .route(
                "/testtenant/oauth2/v2.0/token",
                post(|| async {
                    Json(json!({
                        "access_token": "stub-access-token",
                        "token_type": "bearer",
                        "expires_in": 3600,
                    }))
                }),
            )
            .route(
                "/me",
                get(|| async {
                    Json(json!({
                        "userPrincipalName": "carol@contoso.com",
                        "givenName": "Carol",
                        "surname": "Danvers",
                        "displayName": "Carol Danvers",
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub provider");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        tokio::spawn(async move {
            axum::serve(listener, provider).await.expect("stub provider");
        });
        base
    }

    /// Spawns a stub provider whose token endpoint demands consent.
    async fn spawn_consent_provider() -> String {
        let provider = Router::new().route(
            "/testtenant/oauth2/v2.0/token",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "AADSTS65001: consent required",
                        "error_codes": [65001],
                    })),
                )
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub provider");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        tokio::spawn(async move {
            axum::serve(listener, provider).await.expect("stub provider");
        });
        base
    }

    fn session_cookie(response: &Response) -> Option<String> {
        let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        let (name, rest) = value.split_once('=')?;
        (name == "gatehouse_session")
            .then(|| rest.split(';').next().unwrap_or_default().to_string())
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .expect("location header")
            .to_str()
            .expect("utf-8 location")
    }

    fn state_param(url: &str) -> String {
        url.split("state=")
            .nth(1)
            .expect("state parameter")
            .split('&')
            .next()
            .expect("state value")
            .to_string()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn api_login_with_valid_credentials() {
        let response = app(local_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"hunter2"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).is_some());

        let identity = body_json(response).await;
        assert_eq!(identity["user_id"], "alice");
        assert_eq!(identity["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn api_login_with_wrong_password() {
        let response = app(local_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"wrong"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(session_cookie(&response).is_none());
    }

    #[tokio::test]
    async fn api_login_with_missing_body() {
        let response = app(local_state())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_page_renders_form_for_local_backend() {
        let response = app(local_state())
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let html = String::from_utf8(bytes.to_vec()).expect("utf-8");
        assert!(html.contains("<form action=\"/login\" method=\"POST\">"));
    }

    #[tokio::test]
    async fn form_login_sets_cookie_and_redirects_home() {
        let response = app(local_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("login=alice&password=hunter2"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/");
        assert!(session_cookie(&response).is_some());
    }

    #[tokio::test]
    async fn form_login_with_bad_credentials_shows_message() {
        let response = app(local_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("login=alice&password=nope"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let html = String::from_utf8(bytes.to_vec()).expect("utf-8");
        assert!(html.contains("Invalid username/password combination"));
    }

    #[tokio::test]
    async fn middleware_attaches_identity_for_session_cookie() {
        let state = local_state();
        let app = app(state.clone());

        let login = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"hunter2"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        let handle = session_cookie(&login).expect("session cookie");

        let whoami = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::COOKIE, format!("gatehouse_session={handle}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(whoami.status(), StatusCode::OK);
        assert_eq!(body_json(whoami).await["user_id"], "alice");

        // Without a session the extractor rejects, but plain routes stay
        // reachable.
        let anonymous = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let home = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(home.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_logout_forgets_the_session() {
        let state = local_state();
        let app = app(state.clone());

        let login = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"hunter2"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        let handle = session_cookie(&login).expect("session cookie");
        assert!(state.sessions.decode(&handle).await.is_some());

        let logout = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/logout")
                    .header(header::COOKIE, format!("gatehouse_session={handle}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(logout.status(), StatusCode::OK);
        assert_eq!(body_json(logout).await["message"], "logout successful");
        assert!(state.sessions.decode(&handle).await.is_none());

        // Logging out again, without any session, still succeeds.
        let again = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/logout")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(again.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn denied_by_authorization_chain() {
        let chain = AuthzChain::new().with_check(Box::new(
            gatehouse_access::AllowedHosts::new(vec!["app.example.com".to_string()]),
        ));
        let state = AuthState::new(
            Arc::new(LocalBackend::new(vec![test_user()])),
            Arc::new(CacheSessionStore::new(
                Arc::new(MemoryCache::new()),
                &session_config(),
            )),
            Arc::new(chain),
            &AuthConfig::default(),
        );
        let app = app(state);

        let denied = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::HOST, "evil.example.net")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let granted = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::HOST, "app.example.com")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(granted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn external_login_redirects_and_stashes_flow_state() {
        let cache = Arc::new(MemoryCache::new());
        let app = app(entra_state(cache.clone(), "https://login.microsoftonline.com"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_redirection());
        let location = location(&response).to_string();
        assert!(location.starts_with(
            "https://login.microsoftonline.com/testtenant/oauth2/v2.0/authorize"
        ));
        assert!(location.contains("client_id=client-123"));
        assert!(location.contains("code_challenge="));

        let state_token = state_param(&location);
        let stashed = cache
            .get(&FlowState::cache_key("entra", &state_token))
            .await
            .expect("cache read")
            .expect("flow state cached");
        let flow: FlowState = serde_json::from_str(&stashed).expect("flow state");
        assert_eq!(flow.state(), state_token);
    }

    #[tokio::test]
    async fn callback_with_unknown_state_redirects_to_failure() {
        let cache = Arc::new(MemoryCache::new());
        let app = app(entra_state(cache, "https://login.microsoftonline.com"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/entra/callback?code=whatever&state=forged")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/login");
        assert!(session_cookie(&response).is_none());
    }

    #[tokio::test]
    async fn callback_completes_flow_and_is_single_use() {
        let provider_base = spawn_stub_provider().await;
        let cache = Arc::new(MemoryCache::new());
        let app = app(entra_state(cache.clone(), &provider_base));

        // Initiate the flow to get a real stashed state.
        let login = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let state_token = state_param(location(&login));

        let callback_uri =
            format!("/auth/entra/callback?code=stub-code&state={state_token}");
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(&callback_uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/");
        assert!(session_cookie(&response).is_some());

        // The flow state was consumed with the callback.
        assert!(
            cache
                .get(&FlowState::cache_key("entra", &state_token))
                .await
                .expect("cache read")
                .is_none()
        );

        // A replayed callback with the same state observes absence and
        // lands on the failure destination without a session.
        let replay = app
            .oneshot(
                Request::builder()
                    .uri(&callback_uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(replay.status().is_redirection());
        assert_eq!(location(&replay), "/login");
        assert!(session_cookie(&replay).is_none());
    }

    #[tokio::test]
    async fn callback_with_provider_error_redirects_to_failure() {
        let cache = Arc::new(MemoryCache::new());
        let app = app(entra_state(cache, "https://login.microsoftonline.com"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/entra/callback?error=access_denied&error_description=user+cancelled")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn direct_credentials_needing_consent_redirect_to_consent_url() {
        let provider_base = spawn_consent_provider().await;
        let cache = Arc::new(MemoryCache::new());
        let app = app(entra_state(cache, &provider_base));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("login=carol@contoso.com&password=secret"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_redirection());
        assert!(location(&response).contains("/testtenant/oauth2/v2.0/authorize"));
    }
}
