//! Microsoft Entra ID backend and its authorization-code flow engine.
//!
//! Two physically separate requests must agree on context: the initial
//! login attempt (which issues the provider redirect) and the provider's
//! asynchronous callback. The flow state stashed in the shared cache when
//! the redirect is issued is the only channel carrying that context
//! forward; its TTL bounds how long the user may take and limits the CSRF
//! attack window. The state token is validated byte-for-byte on callback
//! and consumed on first use.
//!
//! The direct-credential variant first attempts silent reacquisition from
//! the token cache, then falls back to a password grant. A provider
//! response carrying error code 65001 means the user must grant consent;
//! that surfaces a consent URL instead of a generic failure.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_access::{AuthError, ClaimMapping, FLOW_STATE_TTL, FlowState, Identity, SetupError, TokenSet};
use gatehouse_cache::KvCache;

use super::backend::{AuthBackend, AuthOutcome, CallbackParams, Credentials};
use crate::config::EntraConfig;

/// Provider tag qualifying every cache key this backend writes.
const PROVIDER: &str = "entra";

/// Callback route appended to the route table at configuration time.
const CALLBACK_PATH: &str = "/auth/entra/callback";

/// AADSTS error code meaning the user must grant consent first.
const CONSENT_REQUIRED_CODE: i64 = 65001;

/// Entra ID authentication backend.
#[derive(Debug)]
pub struct EntraBackend {
    config: EntraConfig,
    cache: Arc<dyn KvCache>,
    http: reqwest::Client,
    redirect_uri: String,
    mapping: ClaimMapping,
}

impl EntraBackend {
    /// Creates the backend, validating endpoint URLs once up front.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::InvalidConfig` for unusable URLs or an
    /// unbuildable HTTP client.
    pub fn new(
        config: EntraConfig,
        cache: Arc<dyn KvCache>,
        public_url: &str,
    ) -> Result<Self, SetupError> {
        let redirect_uri = format!("{}{}", public_url.trim_end_matches('/'), CALLBACK_PATH);

        // Validate URLs
        AuthUrl::new(config.authorize_url()).map_err(|e| SetupError::InvalidConfig {
            field: "entra.authority".to_string(),
            reason: format!("invalid authorize URL: {e}"),
        })?;
        TokenUrl::new(config.token_url()).map_err(|e| SetupError::InvalidConfig {
            field: "entra.authority".to_string(),
            reason: format!("invalid token URL: {e}"),
        })?;
        RedirectUrl::new(redirect_uri.clone()).map_err(|e| SetupError::InvalidConfig {
            field: "public_url".to_string(),
            reason: format!("invalid redirect URL: {e}"),
        })?;

        // One client for every provider call; the timeout bounds each
        // suspension point, and redirects stay disabled so token endpoint
        // responses are never followed anywhere.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.provider_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SetupError::InvalidConfig {
                field: "entra.provider_timeout_ms".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            cache,
            http,
            redirect_uri,
            mapping: ClaimMapping::entra(),
        })
    }

    /// Issues the provider redirect and stashes the flow state.
    ///
    /// Entry at the start of the redirect sub-path: generates the CSRF
    /// state, PKCE pair, and nonce, writes the `FlowState` under its
    /// provider-qualified key with the flow TTL, and returns the authorize
    /// URL to redirect the client to.
    pub async fn start_flow(&self) -> Result<String, AuthError> {
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(self.config.authorize_url()).expect("validated at construction"))
            .set_redirect_uri(
                RedirectUrl::new(self.redirect_uri.clone()).expect("validated at construction"),
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let nonce = CsrfToken::new_random();

        let mut auth_request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("nonce", nonce.secret().clone());

        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }
        if let Some(hint) = &self.config.domain_hint {
            auth_request = auth_request.add_extra_param("domain_hint", hint.clone());
        }

        let (auth_url, csrf_token) = auth_request.url();

        let flow = FlowState::new(
            csrf_token.secret().clone(),
            self.config.scopes().iter().map(|s| (*s).to_string()).collect(),
            self.redirect_uri.clone(),
            pkce_verifier.secret().clone(),
            nonce.secret().clone(),
        );

        let payload = serde_json::to_string(&flow).map_err(|e| AuthError::FlowState {
            reason: format!("failed to serialize flow state: {e}"),
        })?;
        self.cache
            .set_ex(
                &FlowState::cache_key(PROVIDER, flow.state()),
                &payload,
                FLOW_STATE_TTL,
            )
            .await
            .map_err(|e| AuthError::FlowState {
                reason: format!("failed to stash flow state: {e}"),
            })?;

        tracing::info!(state = %flow.state(), "issued provider redirect");
        Ok(auth_url.to_string())
    }

    /// Consumes the stashed flow state and completes the handshake.
    ///
    /// State lookup is single-use: the cache entry is removed as it is
    /// read, so a replayed callback observes absence and fails. Code
    /// exchange and the attribute fetch each fail the flow on error or
    /// timeout alike.
    pub async fn resume_flow(&self, params: CallbackParams) -> Result<Identity, AuthError> {
        if let Some(error) = params.error {
            return Err(AuthError::Provider {
                provider: PROVIDER.to_string(),
                error,
                description: params.error_description,
            });
        }

        let state = params.state.ok_or_else(|| AuthError::FlowState {
            reason: "callback missing state".to_string(),
        })?;
        let code = params.code.ok_or_else(|| AuthError::FlowState {
            reason: "callback missing authorization code".to_string(),
        })?;

        let stashed = self
            .cache
            .take(&FlowState::cache_key(PROVIDER, &state))
            .await
            .map_err(|e| AuthError::FlowState {
                reason: format!("failed to read flow state: {e}"),
            })?
            .ok_or_else(|| AuthError::FlowState {
                reason: "flow state missing, expired, or already consumed".to_string(),
            })?;

        let flow: FlowState = serde_json::from_str(&stashed).map_err(|e| AuthError::FlowState {
            reason: format!("stored flow state is unreadable: {e}"),
        })?;

        if flow.state() != state {
            return Err(AuthError::FlowState {
                reason: "state token mismatch".to_string(),
            });
        }

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_token_uri(TokenUrl::new(self.config.token_url()).expect("validated at construction"))
            .set_redirect_uri(
                RedirectUrl::new(flow.redirect_uri().to_string()).expect("validated at construction"),
            );

        let token_response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(flow.pkce_verifier().to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Provider {
                provider: PROVIDER.to_string(),
                error: "token_exchange_failed".to_string(),
                description: Some(e.to_string()),
            })?;

        let tokens = TokenSet::new(
            token_response.access_token().secret().clone(),
            "Bearer".to_string(),
            token_response.refresh_token().map(|t| t.secret().clone()),
            token_response.expires_in().map(|d| d.as_secs()),
        );

        let identity = self.fetch_identity(&tokens).await?;
        self.save_tokens(identity.user_id(), &tokens).await;

        tracing::info!(user_id = %identity.user_id(), "external flow completed");
        Ok(identity)
    }

    /// Direct credential path: silent reacquisition, then password grant.
    async fn direct_grant(&self, credentials: Credentials) -> Result<Identity, AuthError> {
        // Firstly, check the cache to see if this end user has signed in
        // before and the token still works.
        if let Some(tokens) = self.load_tokens(&credentials.username).await {
            if !tokens.is_expired() {
                match self.fetch_identity(&tokens).await {
                    Ok(identity) => {
                        tracing::debug!(username = %credentials.username, "silent reacquisition succeeded");
                        return Ok(identity);
                    }
                    Err(e) => {
                        tracing::debug!(username = %credentials.username, error = %e, "cached token no longer usable");
                    }
                }
            }
        }

        let scope = self.config.scopes().join(" ");
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Provider {
                provider: PROVIDER.to_string(),
                error: "credential_exchange_failed".to_string(),
                description: Some(e.to_string()),
            })?;

        let body: JsonValue = response.json().await.map_err(|e| AuthError::Provider {
            provider: PROVIDER.to_string(),
            error: "invalid_token_response".to_string(),
            description: Some(e.to_string()),
        })?;

        let tokens = match classify_grant_response(body) {
            GrantResult::Tokens(tokens) => tokens,
            GrantResult::ConsentRequired => {
                return Err(AuthError::ConsentRequired {
                    consent_url: self.consent_url(),
                });
            }
            GrantResult::ProviderError { error, description } => {
                return Err(AuthError::Provider {
                    provider: PROVIDER.to_string(),
                    error,
                    description,
                });
            }
        };

        // A fresh grant always changes the cached set; rewrite it.
        self.save_tokens(&credentials.username, &tokens).await;
        self.fetch_identity(&tokens).await
    }

    /// Fetches user attributes and normalizes them into an `Identity`.
    async fn fetch_identity(&self, tokens: &TokenSet) -> Result<Identity, AuthError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(tokens.access_token())
            .send()
            .await
            .map_err(|e| AuthError::Provider {
                provider: PROVIDER.to_string(),
                error: "userinfo_fetch_failed".to_string(),
                description: Some(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Provider {
                provider: PROVIDER.to_string(),
                error: format!("userinfo_status_{}", status.as_u16()),
                description: None,
            });
        }

        let claims: JsonValue = response.json().await.map_err(|e| AuthError::Provider {
            provider: PROVIDER.to_string(),
            error: "userinfo_unreadable".to_string(),
            description: Some(e.to_string()),
        })?;

        self.mapping
            .normalize(&claims)
            .ok_or_else(|| AuthError::Provider {
                provider: PROVIDER.to_string(),
                error: "missing_user_id_claim".to_string(),
                description: None,
            })
    }

    async fn load_tokens(&self, account: &str) -> Option<TokenSet> {
        let cached = self
            .cache
            .get(&TokenSet::cache_key(PROVIDER, account))
            .await
            .ok()??;
        serde_json::from_str(&cached).ok()
    }

    /// Writes the token cache entry. Failure here is logged and swallowed:
    /// the login already has its tokens in hand.
    async fn save_tokens(&self, account: &str, tokens: &TokenSet) {
        let Ok(payload) = serde_json::to_string(tokens) else {
            return;
        };
        if let Err(e) = self
            .cache
            .set_ex(
                &TokenSet::cache_key(PROVIDER, account),
                &payload,
                FLOW_STATE_TTL,
            )
            .await
        {
            tracing::warn!(account = %account, error = %e, "failed to cache tokens");
        }
    }

    /// An authorize URL the user can visit to grant the required consent.
    fn consent_url(&self) -> String {
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(self.config.authorize_url()).expect("validated at construction"))
            .set_redirect_uri(
                RedirectUrl::new(self.redirect_uri.clone()).expect("validated at construction"),
            );

        let mut request = client.authorize_url(CsrfToken::new_random);
        for scope in self.config.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (url, _csrf) = request.url();
        url.to_string()
    }
}

#[async_trait]
impl AuthBackend for EntraBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<AuthOutcome, AuthError> {
        match credentials {
            Some(credentials) => {
                let identity = self.direct_grant(credentials).await?;
                Ok(AuthOutcome::Authenticated(identity))
            }
            None => {
                let url = self.start_flow().await?;
                Ok(AuthOutcome::Redirect(url))
            }
        }
    }

    async fn auth_callback(&self, params: CallbackParams) -> Result<Identity, AuthError> {
        self.resume_flow(params).await
    }

    fn callback_path(&self) -> Option<String> {
        Some(CALLBACK_PATH.to_string())
    }
}

#[derive(Deserialize)]
struct GrantTokens {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Deserialize)]
struct GrantError {
    error: String,
    error_description: Option<String>,
    #[serde(default)]
    error_codes: Vec<i64>,
}

enum GrantResult {
    Tokens(TokenSet),
    ConsentRequired,
    ProviderError {
        error: String,
        description: Option<String>,
    },
}

/// Sorts a token-endpoint response body into its three outcomes.
fn classify_grant_response(body: JsonValue) -> GrantResult {
    if body.get("access_token").is_some() {
        if let Ok(tokens) = serde_json::from_value::<GrantTokens>(body) {
            return GrantResult::Tokens(TokenSet::new(
                tokens.access_token,
                tokens.token_type,
                tokens.refresh_token,
                tokens.expires_in,
            ));
        }
        return GrantResult::ProviderError {
            error: "invalid_token_response".to_string(),
            description: None,
        };
    }

    match serde_json::from_value::<GrantError>(body) {
        Ok(err) if err.error_codes.contains(&CONSENT_REQUIRED_CODE) => {
            GrantResult::ConsentRequired
        }
        Ok(err) => GrantResult::ProviderError {
            error: err.error,
            description: err.error_description,
        },
        Err(_) => GrantResult::ProviderError {
            error: "invalid_token_response".to_string(),
            description: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_response_with_tokens() {
        let body = serde_json::json!({
            "access_token": "tok",
            "token_type": "Bearer",
            "refresh_token": "refresh",
            "expires_in": 3600,
        });

        match classify_grant_response(body) {
            GrantResult::Tokens(tokens) => {
                assert_eq!(tokens.access_token(), "tok");
                assert_eq!(tokens.refresh_token(), Some("refresh"));
                assert!(!tokens.is_expired());
            }
            _ => panic!("expected tokens"),
        }
    }

    #[test]
    fn grant_response_consent_required() {
        let body = serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS65001: consent required",
            "error_codes": [65001],
        });

        assert!(matches!(
            classify_grant_response(body),
            GrantResult::ConsentRequired
        ));
    }

    #[test]
    fn grant_response_provider_error() {
        let body = serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS50126: bad password",
            "error_codes": [50126],
            "correlation_id": "abc",
        });

        match classify_grant_response(body) {
            GrantResult::ProviderError { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert!(description.expect("description").contains("AADSTS50126"));
            }
            _ => panic!("expected provider error"),
        }
    }

    #[test]
    fn grant_response_garbage_body() {
        let body = serde_json::json!({ "unexpected": true });

        assert!(matches!(
            classify_grant_response(body),
            GrantResult::ProviderError { .. }
        ));
    }
}
