use anyhow::Result;
use chrono::Utc;
use clap::Args;

use crate::args::BaseArgs;
use crate::cloud::Cloud;
use crate::config::resolve_config_dir;
use crate::identity::TokenCredential;
use crate::profile::ProfileStore;
use crate::resolver::{resolve_credential, resolve_default_subscription_id, CredentialResolver};
use crate::ui::with_spinner;

#[derive(Debug, Clone, Args)]
pub struct TokenArgs {
    /// Scope to request (defaults to the Resource Manager scope)
    #[arg(long)]
    pub scope: Option<String>,

    /// Tenant to issue the token for (defaults to the default subscription's tenant)
    #[arg(long, short = 't')]
    pub tenant: Option<String>,

    /// Show full token (default: masked)
    #[arg(long)]
    pub show: bool,
}

pub async fn run(base: &BaseArgs, args: &TokenArgs) -> Result<()> {
    let dir = resolve_config_dir(base.config_dir.as_deref())?;
    let credential = match args.tenant.as_deref() {
        Some(tenant) => {
            CredentialResolver::new(ProfileStore::new(&dir)).resolve_for_tenant(Some(tenant))?
        }
        None => resolve_credential(Some(&dir))?,
    };
    let subscription = resolve_default_subscription_id(Some(&dir))?;

    let cloud = match Cloud::by_authority(&credential.record().authority) {
        Some(cloud) => cloud,
        None => base.cloud()?,
    };
    let scope = args
        .scope
        .clone()
        .unwrap_or_else(|| cloud.resource_manager_scope.to_string());

    let token = with_spinner("Acquiring token...", credential.get_token(&[scope.as_str()])).await?;
    let token_value = if args.show {
        token.token.clone()
    } else {
        mask_token(&token.token)
    };
    let ttl_seconds = (token.expires_on - Utc::now()).num_seconds();

    if base.json {
        let output = serde_json::json!({
            "accessToken": token_value,
            "expiresOn": token.expires_on,
            "ttlSeconds": ttl_seconds,
            "tenant": credential.tenant_id(),
            "subscription": subscription,
            "tokenType": "Bearer",
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Token:        {token_value}");
        println!("Tenant:       {}", credential.tenant_id());
        println!("Subscription: {subscription}");
        println!("Expires:      {} (in {ttl_seconds} seconds)", token.expires_on);
    }
    Ok(())
}

fn mask_token(token: &str) -> String {
    if token.len() <= 8 || !token.is_ascii() {
        return "***".to_string();
    }
    format!("{}...{}", &token[..4], &token[token.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_hides_the_middle() {
        assert_eq!(mask_token("abcdefghijkl"), "abcd...ijkl");
    }

    #[test]
    fn mask_token_hides_short_tokens() {
        assert_eq!(mask_token("short"), "***");
    }
}
