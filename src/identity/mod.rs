//! Credential acquisition against the Microsoft identity platform.
//!
//! A single interactive login ([`InteractiveCredential`]) produces an
//! [`AuthenticationRecord`] and fills the shared [`TokenCache`]. Every later
//! token request goes through a [`SilentTenantCredential`], which only ever
//! reads the cache or redeems the cached refresh token for the tenant it was
//! built for.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthType, AuthUrl, ClientId, ExtraTokenFields, StandardRevocableToken, StandardTokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cache;
pub mod interactive;
pub mod silent;

pub use cache::{CacheError, TokenCache};
pub use interactive::{Authenticator, InteractiveCredential, LoginFlow};
pub use silent::SilentTenantCredential;

/// Well-known public client id of the Azure command line tools.
pub const PUBLIC_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Multi-tenant authority segment; reaches the home tenant and every guest tenant.
pub const ORGANIZATIONS_TENANT: &str = "organizations";

pub const AUTHENTICATION_RECORD_VERSION: &str = "1.0";

/// Scopes that shape the token response rather than name a resource.
pub const OIDC_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Cached access tokens are only served if they outlive this buffer.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "cached credentials for tenant {tenant_id} can no longer be used ({reason}). \
         Run `azctl login` to sign in again"
    )]
    SilentAuth { tenant_id: String, reason: String },
    #[error("interactive login failed: {0}")]
    Interactive(String),
    #[error("{context}: {message}")]
    Transport { context: String, message: String },
    #[error("invalid identity configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AuthError {
    pub fn silent(tenant_id: &str, reason: impl Into<String>) -> Self {
        AuthError::SilentAuth {
            tenant_id: tenant_id.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the only remedy is another interactive login.
    pub fn requires_login(&self) -> bool {
        matches!(self, AuthError::SilentAuth { .. })
    }
}

/// Non-secret pointer to the account a login placed in the token cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRecord {
    /// Authority host URL, e.g. `https://login.microsoftonline.com`.
    pub authority: String,
    pub home_account_id: String,
    pub tenant_id: String,
    pub username: String,
    pub client_id: String,
    pub version: String,
}

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError>;
}

/// Cache key form of a scope list: trimmed, lowercased, deduplicated,
/// sorted, OpenID scopes removed.
pub fn normalize_scopes(scopes: &[&str]) -> String {
    let mut target: Vec<String> = scopes
        .iter()
        .flat_map(|scope| scope.split_whitespace())
        .map(|scope| scope.to_ascii_lowercase())
        .filter(|scope| !OIDC_SCOPES.contains(&scope.as_str()))
        .collect();
    target.sort();
    target.dedup();
    target.join(" ")
}

/// The `id_token` rides along with the standard token response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdentityTokenFields {}

pub type IdentityTokenResponse = StandardTokenResponse<IdentityTokenFields, BasicTokenType>;

pub type IdentityClient = oauth2::Client<
    BasicErrorResponse,
    IdentityTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// OAuth2 client for the v2.0 endpoints of `{authority_host}/{tenant}`.
pub fn identity_client(
    authority_host: &str,
    tenant: &str,
    client_id: &str,
) -> Result<IdentityClient, AuthError> {
    let base = format!("{}/{}", authority_host.trim_end_matches('/'), tenant);
    let auth_url = AuthUrl::new(format!("{base}/oauth2/v2.0/authorize"))
        .map_err(|e| AuthError::Configuration(format!("authorize endpoint for {base}: {e}")))?;
    let token_url = TokenUrl::new(format!("{base}/oauth2/v2.0/token"))
        .map_err(|e| AuthError::Configuration(format!("token endpoint for {base}: {e}")))?;

    Ok(
        IdentityClient::new(
            ClientId::new(client_id.to_string()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody),
    )
}

/// Assumed lifetime when the token endpoint omits or garbles `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Absolute expiry of a token that lives `expires_in` from now.
pub fn expiry_from(expires_in: Option<Duration>) -> DateTime<Utc> {
    let now = Utc::now();
    expires_in
        .and_then(|lifetime| i64::try_from(lifetime.as_secs()).ok())
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| now + chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl IdTokenClaims {
    pub fn username(&self) -> Option<&str> {
        self.preferred_username
            .as_deref()
            .or(self.upn.as_deref())
            .or(self.email.as_deref())
    }
}

/// Reads the claims of an `id_token` without validating its signature; the
/// token arrived straight from the token endpoint over TLS.
pub fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, AuthError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Interactive("malformed id_token".to_string()))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Interactive(format!("failed to decode id_token: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Interactive(format!("failed to parse id_token claims: {e}")))
}
