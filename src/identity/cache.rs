use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{remove_file_if_exists, write_private_file, TOKEN_CACHE_FILE_NAME};

use super::EXPIRY_BUFFER;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write token cache {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize token cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAccount {
    pub home_account_id: String,
    /// Authority host the account signed in through.
    pub environment: String,
    /// Home tenant.
    pub realm: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRefreshToken {
    pub home_account_id: String,
    pub environment: String,
    pub client_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAccessToken {
    pub home_account_id: String,
    pub environment: String,
    /// Tenant the token was issued for.
    pub realm: String,
    /// Normalized scopes, see [`super::normalize_scopes`].
    pub target: String,
    pub secret: String,
    pub expires_on: DateTime<Utc>,
}

impl CachedAccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let buffer = chrono::Duration::seconds(EXPIRY_BUFFER.as_secs() as i64);
        self.expires_on > now + buffer
    }
}

/// Everything a login leaves behind for silent token acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheState {
    pub accounts: BTreeMap<String, CachedAccount>,
    pub refresh_tokens: BTreeMap<String, CachedRefreshToken>,
    pub access_tokens: BTreeMap<String, CachedAccessToken>,
}

fn refresh_token_key(home_account_id: &str, environment: &str, client_id: &str) -> String {
    format!("{home_account_id}-{environment}-refreshtoken-{client_id}").to_ascii_lowercase()
}

fn access_token_key(home_account_id: &str, realm: &str, target: &str) -> String {
    format!("{home_account_id}-{realm}-{target}").to_ascii_lowercase()
}

impl CacheState {
    pub fn account(&self, home_account_id: &str) -> Option<&CachedAccount> {
        self.accounts.get(&home_account_id.to_ascii_lowercase())
    }

    pub fn upsert_account(&mut self, account: CachedAccount) {
        self.accounts
            .insert(account.home_account_id.to_ascii_lowercase(), account);
    }

    pub fn refresh_token(
        &self,
        home_account_id: &str,
        environment: &str,
        client_id: &str,
    ) -> Option<&CachedRefreshToken> {
        self.refresh_tokens
            .get(&refresh_token_key(home_account_id, environment, client_id))
    }

    pub fn upsert_refresh_token(&mut self, token: CachedRefreshToken) {
        let key = refresh_token_key(&token.home_account_id, &token.environment, &token.client_id);
        self.refresh_tokens.insert(key, token);
    }

    /// A cached access token that stays valid past the expiry buffer.
    pub fn fresh_access_token(
        &self,
        home_account_id: &str,
        realm: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> Option<&CachedAccessToken> {
        self.access_tokens
            .get(&access_token_key(home_account_id, realm, target))
            .filter(|token| token.is_fresh(now))
    }

    pub fn upsert_access_token(&mut self, token: CachedAccessToken) {
        let key = access_token_key(&token.home_account_id, &token.realm, &token.target);
        self.access_tokens.insert(key, token);
    }
}

/// Handle on the file-backed token cache.
///
/// Every credential gets a clone of the same handle; clones share one lock so
/// that read-modify-write cycles inside this process never interleave. Other
/// processes are not coordinated with: the last one to write wins.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(TOKEN_CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Current cache contents. A missing or unreadable file yields `None`;
    /// callers treat that as an empty cache.
    pub fn load(&self) -> Option<CacheState> {
        let _guard = self.guard();
        self.read()
    }

    pub fn save(&self, state: &CacheState) -> Result<(), CacheError> {
        let _guard = self.guard();
        self.write(state)
    }

    /// Apply `f` to the current state and persist the result.
    pub fn update<T>(&self, f: impl FnOnce(&mut CacheState) -> T) -> Result<T, CacheError> {
        let _guard = self.guard();
        let mut state = self.read().unwrap_or_default();
        let result = f(&mut state);
        self.write(&state)?;
        Ok(result)
    }

    /// Delete the backing file. Returns whether there was one.
    pub fn remove(&self) -> io::Result<bool> {
        let _guard = self.guard();
        remove_file_if_exists(&self.path)
    }

    fn read(&self) -> Option<CacheState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token cache on disk");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read token cache, treating it as empty");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token cache is corrupt, treating it as empty");
                None
            }
        }
    }

    fn write(&self, state: &CacheState) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(state)?;
        write_private_file(&self.path, &json).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn access_token(realm: &str, expires_on: DateTime<Utc>) -> CachedAccessToken {
        CachedAccessToken {
            home_account_id: "oid.tid".into(),
            environment: "login.microsoftonline.com".into(),
            realm: realm.into(),
            target: "https://management.core.windows.net//.default".into(),
            secret: format!("token-{realm}"),
            expires_on,
        }
    }

    #[test]
    fn load_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let cache = TokenCache::in_dir(tmp.path());
        assert!(cache.load().is_none());
    }

    #[test]
    fn load_corrupt_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let cache = TokenCache::in_dir(tmp.path());
        fs::write(cache.path(), "not valid json {{{").unwrap();
        assert!(cache.load().is_none());
    }

    #[test]
    fn clones_share_the_same_file() {
        let tmp = TempDir::new().unwrap();
        let first = TokenCache::in_dir(tmp.path());
        let second = first.clone();

        first
            .update(|state| {
                state.upsert_account(CachedAccount {
                    home_account_id: "OID.TID".into(),
                    environment: "login.microsoftonline.com".into(),
                    realm: "tid".into(),
                    username: "user@contoso.com".into(),
                })
            })
            .unwrap();

        let loaded = second.load().unwrap();
        assert_eq!(loaded.account("oid.tid").unwrap().username, "user@contoso.com");
    }

    #[test]
    fn update_preserves_existing_entries() {
        let tmp = TempDir::new().unwrap();
        let cache = TokenCache::in_dir(tmp.path());
        let later = Utc::now() + chrono::Duration::hours(1);

        cache
            .update(|state| state.upsert_access_token(access_token("t1", later)))
            .unwrap();
        cache
            .update(|state| state.upsert_access_token(access_token("t2", later)))
            .unwrap();

        let state = cache.load().unwrap();
        assert_eq!(state.access_tokens.len(), 2);
    }

    #[test]
    fn access_tokens_inside_expiry_buffer_are_stale() {
        let now = Utc::now();
        let mut state = CacheState::default();
        state.upsert_access_token(access_token("soon", now + chrono::Duration::minutes(4)));
        state.upsert_access_token(access_token("later", now + chrono::Duration::minutes(30)));

        let target = "https://management.core.windows.net//.default";
        assert!(state.fresh_access_token("oid.tid", "soon", target, now).is_none());
        assert_eq!(
            state
                .fresh_access_token("oid.tid", "later", target, now)
                .unwrap()
                .secret,
            "token-later"
        );
    }

    #[test]
    fn refresh_tokens_are_shared_across_tenants() {
        let mut state = CacheState::default();
        state.upsert_refresh_token(CachedRefreshToken {
            home_account_id: "oid.tid".into(),
            environment: "login.microsoftonline.com".into(),
            client_id: "client".into(),
            secret: "rt".into(),
        });
        assert!(state
            .refresh_token("OID.TID", "login.microsoftonline.com", "client")
            .is_some());
        assert!(state
            .refresh_token("oid.tid", "login.chinacloudapi.cn", "client")
            .is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cache = TokenCache::in_dir(tmp.path());
        cache.save(&CacheState::default()).unwrap();

        assert!(cache.remove().unwrap());
        assert!(!cache.remove().unwrap());
        assert!(cache.load().is_none());
    }
}
