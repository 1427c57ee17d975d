//! Shared Firebase auth client logic.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{compact_text, is_http_url, normalize_text_option, unix_timestamp_now};

const EXPIRY_SKEW_SECONDS: i64 = 60;

const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Token storage error: {0}")]
    TokenStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

pub trait TokenStore: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Identity operations consumed by the session manager.
///
/// `current_user` never fails; read errors degrade to `None` so callers see
/// a signed-out state rather than an error path.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<AuthUser>;
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthUser>;
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> AuthResult<AuthUser>;
    async fn sign_out(&self) -> AuthResult<()>;
}

/// Identity-toolkit and secure-token base URLs, overridable for the local
/// emulator suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    identity_url: String,
    token_url: String,
}

impl AuthEndpoints {
    pub fn new(identity_url: impl AsRef<str>, token_url: impl AsRef<str>) -> AuthResult<Self> {
        Ok(Self {
            identity_url: normalize_endpoint_url(identity_url.as_ref())?,
            token_url: normalize_endpoint_url(token_url.as_ref())?,
        })
    }
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct FirebaseAuth<S: TokenStore> {
    endpoints: AuthEndpoints,
    api_key: String,
    client: Client,
    store: S,
}

impl<S: TokenStore> FirebaseAuth<S> {
    pub fn new(api_key: impl Into<String>, store: S) -> AuthResult<Self> {
        Self::with_endpoints(api_key, AuthEndpoints::default(), store)
    }

    pub fn with_endpoints(
        api_key: impl Into<String>,
        endpoints: AuthEndpoints,
        store: S,
    ) -> AuthResult<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Firebase API key must not be empty",
            ));
        }

        Ok(Self {
            endpoints,
            api_key,
            client: Client::builder().build()?,
            store,
        })
    }

    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {error}");
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let request = self
            .client
            .post(self.identity_endpoint("signInWithPassword"))
            .json(&payload);

        let response = self.send_identity_request(request).await?;
        let session = response.into_session()?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let request = self
            .client
            .post(self.identity_endpoint("signUp"))
            .json(&payload);
        let response = self.send_identity_request(request).await?;
        let session = response.into_session()?;

        // The account exists and is signed in from this point; a failed
        // display-name write leaves it that way.
        self.store.save_session(&session)?;

        let Some(name) = normalize_text_option(Some(name.to_string())) else {
            return Ok(session);
        };
        let named = self.apply_display_name(session, &name).await?;
        self.store.save_session(&named)?;
        Ok(named)
    }

    pub async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        if session.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", session.refresh_token.as_str()),
        ];
        let response = self
            .client
            .post(self.token_endpoint())
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        let payload = response.json::<RefreshResponse>().await?;
        let refreshed = payload.into_session(&session.user)?;
        let refreshed = self.rehydrate_profile(refreshed).await;
        self.store.save_session(&refreshed)?;
        Ok(refreshed)
    }

    /// Drop the persisted session.
    ///
    /// ID tokens cannot be revoked through this API surface, so sign-out is
    /// a local operation, the same as the hosted SDK's.
    pub fn sign_out(&self) -> AuthResult<()> {
        self.store.clear_session()
    }

    async fn apply_display_name(
        &self,
        mut session: AuthSession,
        name: &str,
    ) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({
            "idToken": session.id_token,
            "displayName": name,
            "returnSecureToken": false,
        });
        let request = self
            .client
            .post(self.identity_endpoint("update"))
            .json(&payload);
        let response = self.send_identity_request(request).await?;

        session.user.display_name =
            normalize_text_option(response.display_name).or_else(|| Some(name.to_string()));
        Ok(session)
    }

    /// Re-read email and display name from the account record.
    ///
    /// Profile reads are best-effort; the refreshed tokens stand even when
    /// the lookup fails.
    async fn rehydrate_profile(&self, mut session: AuthSession) -> AuthSession {
        let payload = serde_json::json!({ "idToken": session.id_token });
        let request = self
            .client
            .post(self.identity_endpoint("lookup"))
            .json(&payload);

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!("Account lookup failed: {error}");
                return session;
            }
        };
        if !response.status().is_success() {
            tracing::debug!("Account lookup returned {}", response.status());
            return session;
        }

        match response.json::<LookupResponse>().await {
            Ok(payload) => {
                if let Some(account) = payload.users.into_iter().next() {
                    if let Some(uid) = normalize_text_option(account.local_id) {
                        session.user.uid = uid;
                    }
                    session.user.email = normalize_text_option(account.email);
                    session.user.display_name = normalize_text_option(account.display_name);
                }
                session
            }
            Err(error) => {
                tracing::debug!("Account lookup returned a malformed payload: {error}");
                session
            }
        }
    }

    fn identity_endpoint(&self, method: &str) -> String {
        format!(
            "{}/accounts:{method}?key={}",
            self.endpoints.identity_url, self.api_key
        )
    }

    fn token_endpoint(&self) -> String {
        format!("{}/token?key={}", self.endpoints.token_url, self.api_key)
    }

    async fn send_identity_request(&self, request: RequestBuilder) -> AuthResult<IdentityResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<IdentityResponse>().await?)
    }
}

#[async_trait]
impl<S: TokenStore> IdentityProvider for FirebaseAuth<S> {
    async fn current_user(&self) -> Option<AuthUser> {
        match self.restore_session().await {
            Ok(session) => session.map(|session| session.user),
            Err(error) => {
                tracing::warn!("Failed to read persisted session: {error}");
                None
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        self.sign_in(email, password).await.map(|session| session.user)
    }

    async fn sign_up(&self, name: &str, email: &str, password: &str) -> AuthResult<AuthUser> {
        self.sign_up(name, email, password)
            .await
            .map(|session| session.user)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.sign_out()
    }
}

pub fn normalize_endpoint_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Endpoint URL must not be empty",
        ));
    }
    if !is_http_url(trimmed) {
        return Err(AuthError::InvalidConfiguration(
            "Endpoint URL must include http:// or https://",
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    local_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    // The identity toolkit serializes this i64 as a JSON string
    expires_in: Option<String>,
}

impl IdentityResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        let expires_at = self
            .expires_in
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|expires_in| unix_timestamp_now().saturating_add(expires_in));

        match (self.id_token, self.refresh_token, self.local_id, expires_at) {
            (Some(id_token), Some(refresh_token), Some(uid), Some(expires_at)) => Ok(AuthSession {
                id_token,
                refresh_token,
                expires_at,
                user: AuthUser {
                    uid,
                    email: normalize_text_option(self.email),
                    display_name: normalize_text_option(self.display_name),
                },
            }),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    user_id: Option<String>,
}

impl RefreshResponse {
    fn into_session(self, previous: &AuthUser) -> AuthResult<AuthSession> {
        let expires_at = self
            .expires_in
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|expires_in| unix_timestamp_now().saturating_add(expires_in));

        match (self.id_token, self.refresh_token, expires_at) {
            (Some(id_token), Some(refresh_token), Some(expires_at)) => Ok(AuthSession {
                id_token,
                refresh_token,
                expires_at,
                user: AuthUser {
                    uid: self.user_id.unwrap_or_else(|| previous.uid.clone()),
                    email: previous.email.clone(),
                    display_name: previous.display_name.clone(),
                },
            }),
            _ => Err(AuthError::Api(
                "Refresh response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupAccount {
    local_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityErrorResponse {
    error: Option<IdentityErrorBody>,
}

#[derive(Debug, Deserialize)]
struct IdentityErrorBody {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<IdentityErrorResponse>(body) {
        if let Some(message) = payload.error.and_then(|error| error.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct MapStore {
        session: Arc<Mutex<Option<AuthSession>>>,
    }

    impl TokenStore for MapStore {
        fn load_session(&self) -> AuthResult<Option<AuthSession>> {
            Ok(self.session.lock().unwrap().clone())
        }

        fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
            *self.session.lock().unwrap() = Some(session.clone());
            Ok(())
        }

        fn clear_session(&self) -> AuthResult<()> {
            *self.session.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Clone)]
    struct BrokenStore;

    impl TokenStore for BrokenStore {
        fn load_session(&self) -> AuthResult<Option<AuthSession>> {
            Err(AuthError::TokenStorage("backend unavailable".to_string()))
        }

        fn save_session(&self, _session: &AuthSession) -> AuthResult<()> {
            Err(AuthError::TokenStorage("backend unavailable".to_string()))
        }

        fn clear_session(&self) -> AuthResult<()> {
            Err(AuthError::TokenStorage("backend unavailable".to_string()))
        }
    }

    fn sample_session(expires_at: i64) -> AuthSession {
        AuthSession {
            id_token: "secret-id-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at,
            user: AuthUser {
                uid: "user-1".to_string(),
                email: Some("user@example.com".to_string()),
                display_name: Some("User One".to_string()),
            },
        }
    }

    #[test]
    fn normalize_endpoint_url_trims_trailing_slash() {
        let normalized =
            normalize_endpoint_url("https://identitytoolkit.googleapis.com/v1/").unwrap();
        assert_eq!(normalized, "https://identitytoolkit.googleapis.com/v1");
    }

    #[test]
    fn normalize_endpoint_url_rejects_plain_host() {
        assert!(normalize_endpoint_url("identitytoolkit.googleapis.com").is_err());
        assert!(normalize_endpoint_url("   ").is_err());
    }

    #[test]
    fn endpoints_accept_emulator_urls() {
        let endpoints = AuthEndpoints::new(
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1",
            "http://127.0.0.1:9099/securetoken.googleapis.com/v1",
        );
        assert!(endpoints.is_ok());
    }

    #[test]
    fn client_rejects_blank_api_key() {
        let result = FirebaseAuth::new("   ", MapStore::default());
        assert!(matches!(
            result,
            Err(AuthError::InvalidConfiguration(message)) if message.contains("API key")
        ));
    }

    #[test]
    fn validate_credentials_requires_both_fields() {
        assert!(validate_credentials("", "secret").is_err());
        assert!(validate_credentials("user@example.com", "  ").is_err());
        assert!(validate_credentials("user@example.com", "secret").is_ok());
    }

    #[test]
    fn identity_response_parses_string_expiry() {
        let response: IdentityResponse = serde_json::from_str(
            r#"{
                "localId": "user-1",
                "email": "user@example.com",
                "displayName": "",
                "idToken": "token",
                "refreshToken": "refresh",
                "expiresIn": "3600"
            }"#,
        )
        .unwrap();
        let session = response.into_session().unwrap();
        assert!(session.expires_at > unix_timestamp_now() + 3000);
        assert_eq!(session.user.uid, "user-1");
        assert_eq!(session.user.display_name, None);
    }

    #[test]
    fn identity_response_requires_session_fields() {
        let response: IdentityResponse =
            serde_json::from_str(r#"{"localId": "user-1", "email": "user@example.com"}"#).unwrap();
        assert!(matches!(response.into_session(), Err(AuthError::Api(_))));
    }

    #[test]
    fn refresh_response_keeps_previous_profile() {
        let response: RefreshResponse = serde_json::from_str(
            r#"{
                "id_token": "new-token",
                "refresh_token": "new-refresh",
                "expires_in": "3600",
                "user_id": "user-1"
            }"#,
        )
        .unwrap();
        let previous = sample_session(0).user;
        let session = response.into_session(&previous).unwrap();
        assert_eq!(session.id_token, "new-token");
        assert_eq!(session.user.email, Some("user@example.com".to_string()));
        assert_eq!(session.user.display_name, Some("User One".to_string()));
    }

    #[test]
    fn session_expiry_includes_skew() {
        assert!(sample_session(unix_timestamp_now() + 30).is_expired());
        assert!(!sample_session(unix_timestamp_now() + 3600).is_expired());
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let rendered = format!("{:?}", sample_session(1_700_000_000));
        assert!(!rendered.contains("secret-id-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_api_message() {
        let body = r#"{"error": {"code": 400, "message": "INVALID_PASSWORD"}}"#;
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, body),
            "INVALID_PASSWORD (400)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_body() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream unavailable"),
            "upstream unavailable (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[tokio::test]
    async fn restore_session_returns_unexpired_session_without_refresh() {
        let store = MapStore::default();
        store
            .save_session(&sample_session(unix_timestamp_now() + 3600))
            .unwrap();
        let client = FirebaseAuth::new("test-key", store).unwrap();

        let restored = client.restore_session().await.unwrap().unwrap();
        assert_eq!(restored.user.uid, "user-1");
    }

    #[tokio::test]
    async fn restore_session_is_none_when_store_is_empty() {
        let client = FirebaseAuth::new("test-key", MapStore::default()).unwrap();
        assert!(client.restore_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn current_user_degrades_to_none_on_storage_error() {
        let client = FirebaseAuth::new("test-key", BrokenStore).unwrap();
        assert!(IdentityProvider::current_user(&client).await.is_none());
    }

    #[test]
    fn sign_out_clears_the_store() {
        let store = MapStore::default();
        store
            .save_session(&sample_session(unix_timestamp_now() + 3600))
            .unwrap();
        let client = FirebaseAuth::new("test-key", store.clone()).unwrap();

        client.sign_out().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
