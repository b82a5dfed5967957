//! Tenant and subscription discovery.
//!
//! Tenants are listed once with a tenant-agnostic credential, then each
//! tenant's subscriptions are listed with a credential scoped to that
//! tenant. Tenants are walked in listing order and a subscription reachable
//! through several tenants is attributed to the first one that reported it.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::arm::{DirectoryError, ResourceDirectory, SubscriptionInfo, TenantInfo};
use crate::cloud::Cloud;
use crate::identity::{
    AuthError, AuthenticationRecord, Authenticator, TokenCredential, ORGANIZATIONS_TENANT,
};
use crate::profile::{Profile, ProfileError, ProfileStore, Subscription};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("not logged in. Run `azctl login` to sign in")]
    NotLoggedIn,
    #[error("no subscriptions found for {username}")]
    NoSubscriptions { username: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Directory(DirectoryError),
    #[error(transparent)]
    Profile(ProfileError),
    #[error(transparent)]
    Selection(anyhow::Error),
}

impl From<DirectoryError> for DiscoveryError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Auth { source, .. } => DiscoveryError::Auth(source),
            other => DiscoveryError::Directory(other),
        }
    }
}

impl From<ProfileError> for DiscoveryError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::NotLoggedIn => DiscoveryError::NotLoggedIn,
            other => DiscoveryError::Profile(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub display_name: Option<String>,
    pub default_domain: Option<String>,
    pub subscriptions: Vec<Subscription>,
}

/// A tenant whose subscriptions could not be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDiscoveryWarning {
    pub tenant_id: String,
    pub message: String,
    /// The tenant needs its own interactive login, e.g. for MFA.
    pub requires_login: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub tenants: Vec<Tenant>,
    pub warnings: Vec<PartialDiscoveryWarning>,
}

impl Discovery {
    /// Every discovered subscription, in tenant order.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.tenants
            .iter()
            .flat_map(|tenant| tenant.subscriptions.iter().cloned())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.tenants.iter().map(|t| t.subscriptions.len()).sum()
    }
}

type ProgressFn<'a> = Box<dyn Fn(String) + Send + Sync + 'a>;

/// Walks the directory with per-tenant credentials built by `credential_for`.
pub struct Discoverer<'a, D: ?Sized, F> {
    directory: &'a D,
    cloud: &'static Cloud,
    credential_for: F,
    tenant: Option<String>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, D, F, C> Discoverer<'a, D, F>
where
    D: ResourceDirectory + ?Sized,
    F: Fn(&str, &AuthenticationRecord) -> C,
    C: TokenCredential,
{
    pub fn new(directory: &'a D, cloud: &'static Cloud, credential_for: F) -> Self {
        Self {
            directory,
            cloud,
            credential_for,
            tenant: None,
            progress: None,
        }
    }

    /// Called with a short status line before each directory request.
    pub fn on_progress(mut self, progress: impl Fn(String) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    fn report(&self, message: impl FnOnce() -> String) {
        if let Some(progress) = &self.progress {
            progress(message());
        }
    }

    /// Restrict discovery to one tenant, by id or default domain.
    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    /// Log in, then discover. Fails when nothing at all is reachable.
    pub async fn discover_with_login(
        &self,
        authenticator: &dyn Authenticator,
    ) -> Result<(Discovery, AuthenticationRecord), DiscoveryError> {
        let record = authenticator.authenticate().await?;
        let discovery = self.discover(&record).await?;
        if discovery.subscription_count() == 0 {
            return Err(DiscoveryError::NoSubscriptions {
                username: record.username,
            });
        }
        Ok((discovery, record))
    }

    /// Log in, discover and save the new profile. The default is the
    /// subscription `choose_default` names, or the first one. Nothing is
    /// written unless discovery found at least one subscription.
    pub async fn login_and_save(
        &self,
        authenticator: &dyn Authenticator,
        store: &ProfileStore,
        choose_default: impl FnOnce(&[Subscription]) -> anyhow::Result<Option<String>>,
    ) -> Result<(Discovery, Profile), DiscoveryError> {
        let (discovery, record) = self.discover_with_login(authenticator).await?;
        let mut profile = Profile::new(discovery.subscriptions(), record);

        let wanted = match choose_default(&profile.subscriptions).map_err(DiscoveryError::Selection)? {
            Some(wanted) => Some(wanted),
            None => profile.default_subscription().map(|s| s.id.clone()),
        };
        if let Some(wanted) = wanted {
            profile.set_default(&wanted)?;
        }

        store.save(&profile)?;
        Ok((discovery, profile))
    }

    /// Rediscover with the cached login and replace the saved subscriptions,
    /// keeping the previous default when it is still reachable. The saved
    /// profile is left untouched when nothing is found.
    pub async fn refresh_saved(
        &self,
        store: &ProfileStore,
    ) -> Result<(Discovery, Profile), DiscoveryError> {
        let previous = store.load()?;
        let discovery = self.discover_from_cache(store).await?;
        let record = previous
            .authentication_record
            .clone()
            .ok_or(DiscoveryError::NotLoggedIn)?;
        if discovery.subscription_count() == 0 {
            return Err(DiscoveryError::NoSubscriptions {
                username: record.username,
            });
        }

        let mut refreshed = Profile::new(discovery.subscriptions(), record);
        refreshed.keep_default_from(&previous);
        store.save(&refreshed)?;
        Ok((discovery, refreshed))
    }

    /// Discover again for the account of the saved profile.
    pub async fn discover_from_cache(
        &self,
        store: &ProfileStore,
    ) -> Result<Discovery, DiscoveryError> {
        let profile = store.load()?;
        let record = profile
            .authentication_record
            .ok_or(DiscoveryError::NotLoggedIn)?;
        self.discover(&record).await
    }

    pub async fn discover(&self, record: &AuthenticationRecord) -> Result<Discovery, DiscoveryError> {
        let base_tenant = self.tenant.as_deref().unwrap_or(ORGANIZATIONS_TENANT);
        let base = (self.credential_for)(base_tenant, record);
        self.report(|| "Listing tenants...".to_string());
        let listed = self.directory.list_tenants(&base).await?;
        debug!(count = listed.len(), "listed tenants");

        let mut seen = HashSet::new();
        let mut discovery = Discovery::default();
        for info in self.select_tenants(listed) {
            let credential = (self.credential_for)(&info.tenant_id, record);
            self.report(|| {
                let label = info
                    .display_name
                    .as_deref()
                    .or(info.default_domain.as_deref())
                    .unwrap_or(&info.tenant_id);
                format!("Listing subscriptions in {label}...")
            });
            let listed = match self.directory.list_subscriptions(&credential).await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!(tenant = %info.tenant_id, error = %e, "skipping tenant, failed to list its subscriptions");
                    discovery.warnings.push(PartialDiscoveryWarning {
                        tenant_id: info.tenant_id.clone(),
                        message: e.to_string(),
                        requires_login: e.requires_login(),
                    });
                    continue;
                }
            };

            let mut subscriptions = Vec::with_capacity(listed.len());
            for sub in listed {
                if !seen.insert(sub.subscription_id.to_ascii_lowercase()) {
                    debug!(subscription = %sub.subscription_id, tenant = %info.tenant_id, "already discovered through an earlier tenant");
                    continue;
                }
                subscriptions.push(self.subscription(sub, &info, record));
            }

            discovery.tenants.push(Tenant {
                id: info.tenant_id,
                display_name: info.display_name,
                default_domain: info.default_domain,
                subscriptions,
            });
        }

        Ok(discovery)
    }

    fn select_tenants(&self, listed: Vec<TenantInfo>) -> Vec<TenantInfo> {
        let Some(wanted) = self.tenant.as_deref() else {
            return listed;
        };

        let matches = |info: &TenantInfo| {
            info.tenant_id.eq_ignore_ascii_case(wanted)
                || info
                    .default_domain
                    .as_deref()
                    .is_some_and(|domain| domain.eq_ignore_ascii_case(wanted))
        };
        match listed.into_iter().find(|info| matches(info)) {
            Some(info) => vec![info],
            None => vec![TenantInfo {
                tenant_id: wanted.to_string(),
                display_name: None,
                default_domain: None,
            }],
        }
    }

    fn subscription(
        &self,
        sub: SubscriptionInfo,
        tenant: &TenantInfo,
        record: &AuthenticationRecord,
    ) -> Subscription {
        if let Some(claimed) = sub.tenant_id.as_deref() {
            if !claimed.eq_ignore_ascii_case(&tenant.tenant_id) {
                warn!(
                    subscription = %sub.subscription_id,
                    claimed,
                    listed_under = %tenant.tenant_id,
                    "subscription reported under a different tenant, keeping the tenant it was listed under"
                );
            }
        }

        Subscription {
            id: sub.subscription_id,
            name: sub.display_name,
            state: sub.state.unwrap_or_default(),
            tenant_id: tenant.tenant_id.clone(),
            tenant_display_name: tenant.display_name.clone(),
            tenant_default_domain: tenant.default_domain.clone(),
            home_tenant_id: record.tenant_id.clone(),
            environment_name: self.cloud.name.to_string(),
            is_default: false,
            user: record.username.clone(),
        }
    }
}
