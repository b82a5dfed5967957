use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{remove_file_if_exists, write_private_file, PROFILE_FILE_NAME};
use crate::identity::{AuthenticationRecord, TokenCache};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("not logged in. Run `azctl login` to sign in")]
    NotLoggedIn,
    #[error("profile {path} is corrupt ({source}). Run `azctl login` to recreate it")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to access profile {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to serialize profile: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("subscription '{0}' not found. Run `azctl account list` to see available subscriptions")]
    SubscriptionNotFound(String),
    #[error("subscription name '{name}' matches {count} subscriptions; use the subscription id instead")]
    AmbiguousSubscription { name: String, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_default_domain: Option<String>,
    #[serde(default)]
    pub home_tenant_id: String,
    #[serde(default)]
    pub environment_name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub user: String,
}

impl Subscription {
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id.trim())
    }
}

/// What `login` leaves on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub authentication_record: Option<AuthenticationRecord>,
}

impl Profile {
    pub fn new(subscriptions: Vec<Subscription>, record: AuthenticationRecord) -> Self {
        Self {
            subscriptions,
            authentication_record: Some(record),
        }
    }

    /// The flagged subscription, or the first one when none is flagged.
    pub fn default_subscription(&self) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|s| s.is_default)
            .or_else(|| self.subscriptions.first())
    }

    /// Look up a subscription by id (case-insensitive), then by exact name.
    pub fn find(&self, id_or_name: &str) -> Result<&Subscription, ProfileError> {
        let index = self.position(id_or_name)?;
        Ok(&self.subscriptions[index])
    }

    fn position(&self, id_or_name: &str) -> Result<usize, ProfileError> {
        if let Some(index) = self.subscriptions.iter().position(|s| s.matches_id(id_or_name)) {
            return Ok(index);
        }

        let by_name: Vec<usize> = self
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.name == id_or_name)
            .map(|(i, _)| i)
            .collect();
        match by_name.as_slice() {
            [index] => Ok(*index),
            [] => Err(ProfileError::SubscriptionNotFound(id_or_name.to_string())),
            many => Err(ProfileError::AmbiguousSubscription {
                name: id_or_name.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Flag exactly one subscription as default.
    pub fn set_default(&mut self, id_or_name: &str) -> Result<&Subscription, ProfileError> {
        let index = self.position(id_or_name)?;
        for (i, subscription) in self.subscriptions.iter_mut().enumerate() {
            subscription.is_default = i == index;
        }
        Ok(&self.subscriptions[index])
    }

    /// Carry the default of `previous` over to a freshly discovered list,
    /// falling back to the first subscription.
    pub fn keep_default_from(&mut self, previous: &Profile) {
        let previous_id = previous.default_subscription().map(|s| s.id.clone());
        let keep = previous_id
            .as_deref()
            .and_then(|id| self.subscriptions.iter().position(|s| s.matches_id(id)))
            .unwrap_or(0);
        for (i, subscription) in self.subscriptions.iter_mut().enumerate() {
            subscription.is_default = i == keep;
        }
    }

    /// Drop all but the first default flag.
    pub fn normalize_default(&mut self) {
        let mut seen = false;
        for subscription in &mut self.subscriptions {
            if subscription.is_default {
                if seen {
                    subscription.is_default = false;
                }
                seen = true;
            }
        }
    }
}

/// File-backed profile, paired with the token cache it points into.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    token_cache: TokenCache,
}

impl ProfileStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(PROFILE_FILE_NAME),
            token_cache: TokenCache::in_dir(dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    pub fn load(&self) -> Result<Profile, ProfileError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ProfileError::NotLoggedIn),
            Err(source) => {
                return Err(ProfileError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| ProfileError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, profile: &Profile) -> Result<(), ProfileError> {
        let mut profile = profile.clone();
        profile.normalize_default();
        let json = serde_json::to_vec_pretty(&profile)?;
        write_private_file(&self.path, &json).map_err(|source| ProfileError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), subscriptions = profile.subscriptions.len(), "saved profile");
        Ok(())
    }

    /// Logout. The token cache goes too, but failing to remove it never
    /// fails the logout.
    pub fn delete(&self) -> Result<(), ProfileError> {
        remove_file_if_exists(&self.path).map_err(|source| ProfileError::Io {
            path: self.path.clone(),
            source,
        })?;

        match self.token_cache.remove() {
            Ok(true) => debug!(path = %self.token_cache.path().display(), "removed token cache"),
            Ok(false) => debug!("no token cache to remove"),
            Err(e) => {
                warn!(path = %self.token_cache.path().display(), error = %e, "failed to remove token cache")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Subscription;

    pub fn subscription(id: &str, name: &str, tenant_id: &str) -> Subscription {
        Subscription {
            id: id.into(),
            name: name.into(),
            state: "Enabled".into(),
            tenant_id: tenant_id.into(),
            tenant_display_name: None,
            tenant_default_domain: None,
            home_tenant_id: "home".into(),
            environment_name: "AzureCloud".into(),
            is_default: false,
            user: "user@contoso.com".into(),
        }
    }
}
