//! The seam resource commands use to get a credential and a subscription.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::config::resolve_config_dir;
use crate::identity::SilentTenantCredential;
use crate::profile::{ProfileError, ProfileStore};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not logged in. Run `azctl login` to sign in")]
    NotLoggedIn,
    #[error("the saved profile has no subscriptions. Run `azctl login` to sign in again")]
    NoSubscriptions,
    #[error(transparent)]
    Profile(ProfileError),
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl From<ProfileError> for ResolveError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::NotLoggedIn => ResolveError::NotLoggedIn,
            other => ResolveError::Profile(other),
        }
    }
}

pub struct CredentialResolver {
    store: ProfileStore,
}

impl CredentialResolver {
    pub fn new(store: ProfileStore) -> Self {
        Self { store }
    }

    /// Silent credential for the tenant of the default subscription.
    pub fn resolve(&self) -> Result<SilentTenantCredential, ResolveError> {
        self.resolve_for_tenant(None)
    }

    /// Like [`Self::resolve`], but `tenant` overrides the active tenant.
    pub fn resolve_for_tenant(
        &self,
        tenant: Option<&str>,
    ) -> Result<SilentTenantCredential, ResolveError> {
        let profile = self.store.load()?;
        let record = profile
            .authentication_record
            .as_ref()
            .ok_or(ResolveError::NotLoggedIn)?;

        let tenant_id = match tenant {
            Some(tenant) => tenant.to_string(),
            None => profile
                .default_subscription()
                .ok_or(ResolveError::NoSubscriptions)?
                .tenant_id
                .clone(),
        };
        debug!(tenant = %tenant_id, "resolved active tenant");

        Ok(SilentTenantCredential::new(
            self.store.token_cache().clone(),
            &tenant_id,
            record,
        ))
    }

    pub fn resolve_default_subscription_id(&self) -> Result<String, ResolveError> {
        let profile = self.store.load()?;
        profile
            .default_subscription()
            .map(|s| s.id.clone())
            .ok_or(ResolveError::NoSubscriptions)
    }
}

fn resolver_in(config_dir: Option<&Path>) -> Result<CredentialResolver, ResolveError> {
    let dir = resolve_config_dir(config_dir)?;
    Ok(CredentialResolver::new(ProfileStore::new(&dir)))
}

/// Credential for the active tenant of the profile in `config_dir`
/// (the per-user default when `None`).
pub fn resolve_credential(config_dir: Option<&Path>) -> Result<SilentTenantCredential, ResolveError> {
    resolver_in(config_dir)?.resolve()
}

pub fn resolve_default_subscription_id(config_dir: Option<&Path>) -> Result<String, ResolveError> {
    resolver_in(config_dir)?.resolve_default_subscription_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AuthenticationRecord, AUTHENTICATION_RECORD_VERSION, PUBLIC_CLIENT_ID};
    use crate::profile::test_support::subscription;
    use crate::profile::Profile;
    use tempfile::TempDir;

    fn logged_in(dir: &Path) -> ProfileStore {
        let store = ProfileStore::new(dir);
        let record = AuthenticationRecord {
            authority: "https://login.microsoftonline.com".into(),
            home_account_id: "oid.home".into(),
            tenant_id: "home".into(),
            username: "user@contoso.com".into(),
            client_id: PUBLIC_CLIENT_ID.into(),
            version: AUTHENTICATION_RECORD_VERSION.into(),
        };
        let mut profile = Profile::new(
            vec![subscription("s1", "Prod", "t1"), subscription("s2", "Dev", "t2")],
            record,
        );
        profile.set_default("s2").unwrap();
        store.save(&profile).unwrap();
        store
    }

    #[test]
    fn resolves_tenant_of_default_subscription() {
        let tmp = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(logged_in(tmp.path()));

        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert_eq!(first.tenant_id(), "t2");
        assert_eq!(second.tenant_id(), first.tenant_id());
        assert_eq!(first.record().home_account_id, "oid.home");
        assert_eq!(resolver.resolve_default_subscription_id().unwrap(), "s2");
    }

    #[test]
    fn falls_back_to_first_subscription() {
        let tmp = TempDir::new().unwrap();
        let store = logged_in(tmp.path());
        let mut profile = store.load().unwrap();
        for sub in &mut profile.subscriptions {
            sub.is_default = false;
        }
        store.save(&profile).unwrap();

        let resolver = CredentialResolver::new(store);
        assert_eq!(resolver.resolve().unwrap().tenant_id(), "t1");
        assert_eq!(resolver.resolve_default_subscription_id().unwrap(), "s1");
    }

    #[test]
    fn explicit_tenant_overrides_default() {
        let tmp = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(logged_in(tmp.path()));
        assert_eq!(resolver.resolve_for_tenant(Some("other")).unwrap().tenant_id(), "other");
    }

    #[test]
    fn logout_means_not_logged_in() {
        let tmp = TempDir::new().unwrap();
        let store = logged_in(tmp.path());
        store.delete().unwrap();

        let resolver = CredentialResolver::new(store);
        assert!(matches!(resolver.resolve(), Err(ResolveError::NotLoggedIn)));
        assert!(matches!(
            resolver.resolve_default_subscription_id(),
            Err(ResolveError::NotLoggedIn)
        ));
    }

    #[test]
    fn module_functions_read_the_given_dir() {
        let tmp = TempDir::new().unwrap();
        logged_in(tmp.path());
        assert_eq!(resolve_credential(Some(tmp.path())).unwrap().tenant_id(), "t2");
        assert_eq!(resolve_default_subscription_id(Some(tmp.path())).unwrap(), "s2");

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            resolve_credential(Some(empty.path())),
            Err(ResolveError::NotLoggedIn)
        ));
    }
}
