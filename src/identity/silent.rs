use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::basic::BasicErrorResponse;
use oauth2::reqwest::async_http_client;
use oauth2::{RefreshToken, RequestTokenError, Scope, TokenResponse};
use tracing::debug;

use crate::cloud::host_of;

use super::cache::{CachedAccessToken, CachedRefreshToken};
use super::{
    expiry_from, identity_client, normalize_scopes, AccessToken, AuthError, AuthenticationRecord,
    TokenCache, TokenCredential,
};

/// Token credential for one tenant, backed only by the token cache.
///
/// It never prompts. When the cache holds nothing usable for the account in
/// the [`AuthenticationRecord`] it fails with [`AuthError::SilentAuth`].
#[derive(Debug, Clone)]
pub struct SilentTenantCredential {
    tenant_id: String,
    record: AuthenticationRecord,
    cache: TokenCache,
}

enum CacheLookup {
    Hit(AccessToken),
    Refresh(String),
}

impl SilentTenantCredential {
    pub fn new(cache: TokenCache, tenant_id: &str, record: &AuthenticationRecord) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            record: record.clone(),
            cache,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn record(&self) -> &AuthenticationRecord {
        &self.record
    }

    fn environment(&self) -> &str {
        host_of(&self.record.authority)
    }

    fn lookup(&self, target: &str, now: DateTime<Utc>) -> Result<CacheLookup, AuthError> {
        let state = self.cache.load().unwrap_or_default();
        let home_account_id = &self.record.home_account_id;

        if state.account(home_account_id).is_none() {
            return Err(AuthError::silent(
                &self.tenant_id,
                format!("no cached account for {}", self.record.username),
            ));
        }

        if let Some(token) = state.fresh_access_token(home_account_id, &self.tenant_id, target, now) {
            debug!(tenant = %self.tenant_id, "using cached access token");
            return Ok(CacheLookup::Hit(AccessToken {
                token: token.secret.clone(),
                expires_on: token.expires_on,
            }));
        }

        state
            .refresh_token(home_account_id, self.environment(), &self.record.client_id)
            .map(|token| CacheLookup::Refresh(token.secret.clone()))
            .ok_or_else(|| AuthError::silent(&self.tenant_id, "no cached refresh token"))
    }
}

#[async_trait]
impl TokenCredential for SilentTenantCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError> {
        let target = normalize_scopes(scopes);
        if target.is_empty() {
            return Err(AuthError::Configuration(
                "at least one resource scope is required".to_string(),
            ));
        }

        let refresh_token = match self.lookup(&target, Utc::now())? {
            CacheLookup::Hit(token) => return Ok(token),
            CacheLookup::Refresh(refresh_token) => refresh_token,
        };

        debug!(tenant = %self.tenant_id, scopes = %target, "redeeming cached refresh token");
        let client = identity_client(&self.record.authority, &self.tenant_id, &self.record.client_id)?;
        let refresh_token = RefreshToken::new(refresh_token);
        let mut request = client.exchange_refresh_token(&refresh_token);
        for scope in scopes.iter().flat_map(|s| s.split_whitespace()) {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let response = request
            .request_async(async_http_client)
            .await
            .map_err(|e| refresh_failure(&self.tenant_id, e))?;

        let token = AccessToken {
            token: response.access_token().secret().clone(),
            expires_on: expiry_from(response.expires_in()),
        };
        let rotated = response.refresh_token().map(|t| t.secret().clone());

        let home_account_id = self.record.home_account_id.clone();
        let environment = self.environment().to_string();
        self.cache.update(|state| {
            state.upsert_access_token(CachedAccessToken {
                home_account_id: home_account_id.clone(),
                environment: environment.clone(),
                realm: self.tenant_id.clone(),
                target,
                secret: token.token.clone(),
                expires_on: token.expires_on,
            });
            if let Some(secret) = rotated {
                state.upsert_refresh_token(CachedRefreshToken {
                    home_account_id,
                    environment,
                    client_id: self.record.client_id.clone(),
                    secret,
                });
            }
        })?;

        Ok(token)
    }
}

/// Rejections from the token endpoint mean the cached grant is dead;
/// anything else is a transport problem.
fn refresh_failure<RE>(tenant_id: &str, err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            AuthError::silent(tenant_id, response.to_string())
        }
        other => AuthError::Transport {
            context: format!("refresh token exchange for tenant {tenant_id}"),
            message: other.to_string(),
        },
    }
}
