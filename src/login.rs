use std::io::IsTerminal;

use anyhow::Result;
use clap::Args;

use crate::account::{print_subscriptions_json, report_partial_discovery};
use crate::args::BaseArgs;
use crate::arm::ArmClient;
use crate::discovery::Discoverer;
use crate::identity::{AuthenticationRecord, InteractiveCredential, LoginFlow, SilentTenantCredential};
use crate::ui::{print_command_status, select_subscription_interactive, CommandStatus, Spinner};
use crate::utils::pluralize;

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Sign in with a device code instead of opening a browser (for headless machines)
    #[arg(long)]
    pub use_device_code: bool,

    /// Only sign in to this tenant (id or domain)
    #[arg(long, short = 't')]
    pub tenant: Option<String>,

    /// Subscription (id or name) to make the default
    #[arg(long, short = 's')]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct LogoutArgs {}

pub async fn run(base: BaseArgs, args: LoginArgs) -> Result<()> {
    let cloud = base.cloud()?;
    let store = base.profile_store()?;
    let cache = store.token_cache().clone();

    let flow = if args.use_device_code {
        LoginFlow::DeviceCode
    } else {
        LoginFlow::Browser
    };
    let mut authenticator = InteractiveCredential::new(cache.clone(), cloud, flow);
    if let Some(tenant) = &args.tenant {
        authenticator = authenticator.with_tenant(tenant.clone());
    }

    let spinner = Spinner::pending();
    let directory = ArmClient::new(cloud);
    let discoverer = Discoverer::new(&directory, cloud, |tenant: &str, record: &AuthenticationRecord| {
        SilentTenantCredential::new(cache.clone(), tenant, record)
    })
    .with_tenant(args.tenant.clone())
    .on_progress(spinner.updater());

    let interactive = !base.json && std::io::stdin().is_terminal();
    let result = discoverer
        .login_and_save(&authenticator, &store, |subscriptions| {
            match args.subscription.as_deref() {
                Some(wanted) => Ok(Some(wanted.to_string())),
                None if interactive && subscriptions.len() > 1 => spinner
                    .suspend(|| select_subscription_interactive(subscriptions))
                    .map(Some),
                None => Ok(None),
            }
        })
        .await;
    spinner.finish();
    let (discovery, profile) = result?;
    report_partial_discovery(&discovery.warnings);

    if base.json {
        return print_subscriptions_json(&profile.subscriptions);
    }

    for tenant in &discovery.tenants {
        let label = tenant
            .display_name
            .as_deref()
            .or(tenant.default_domain.as_deref())
            .unwrap_or(&tenant.id);
        let found = tenant.subscriptions.len();
        eprintln!(
            "  {label} ({}): {found} {}",
            tenant.id,
            pluralize(found, "subscription", None)
        );
    }

    let username = profile
        .authentication_record
        .as_ref()
        .map(|record| record.username.as_str())
        .unwrap_or("-");
    let count = profile.subscriptions.len();
    let tenants = discovery.tenants.len();
    print_command_status(
        CommandStatus::Success,
        &format!(
            "Logged in as {username}: {count} {} across {tenants} {}",
            pluralize(count, "subscription", None),
            pluralize(tenants, "tenant", None),
        ),
    );
    if let Some(selected) = profile.default_subscription() {
        print_command_status(
            CommandStatus::Success,
            &format!("Default subscription: {} ({})", selected.name, selected.id),
        );
    }
    Ok(())
}

pub fn run_logout(base: BaseArgs) -> Result<()> {
    let store = base.profile_store()?;
    let was_logged_in = store.path().exists();
    store.delete()?;

    if was_logged_in {
        print_command_status(CommandStatus::Success, "Logged out");
    } else {
        print_command_status(CommandStatus::Warning, "Not logged in (nothing to remove)");
    }
    Ok(())
}
