use std::fmt::Write as _;

use anyhow::Result;
use dialoguer::console;

use crate::args::BaseArgs;
use crate::arm::ArmClient;
use crate::discovery::Discoverer;
use crate::identity::{AuthenticationRecord, SilentTenantCredential};
use crate::profile::{Profile, ProfileStore, Subscription};
use crate::ui::{print_with_pager, subscription_table, Paging, Spinner};
use crate::utils::pluralize;

use super::{print_subscriptions_json, report_partial_discovery, ListArgs};

pub async fn run(base: &BaseArgs, args: &ListArgs) -> Result<()> {
    let store = base.profile_store()?;
    let profile = if args.refresh {
        rediscover(base, &store).await?
    } else {
        store.load()?
    };

    let shown: Vec<Subscription> = profile
        .subscriptions
        .iter()
        .filter(|s| args.all || is_enabled(s))
        .cloned()
        .collect();

    if base.json {
        return print_subscriptions_json(&shown);
    }

    let mut output = String::new();
    writeln!(
        output,
        "{} {} for {}\n",
        console::style(shown.len()),
        pluralize(shown.len(), "subscription", None),
        console::style(shown.first().map(|s| s.user.as_str()).unwrap_or("-")).bold()
    )?;
    let default_id = profile.default_subscription().map(|s| s.id.as_str());
    write!(output, "{}", subscription_table(&shown, default_id))?;

    let paging = if args.no_pager {
        Paging::Never
    } else {
        Paging::Auto
    };
    print_with_pager(&output, paging)?;
    Ok(())
}

async fn rediscover(base: &BaseArgs, store: &ProfileStore) -> Result<Profile> {
    let cloud = base.cloud()?;
    let cache = store.token_cache().clone();
    let directory = ArmClient::new(cloud);
    let spinner = Spinner::start("Discovering subscriptions...");
    let discoverer = Discoverer::new(&directory, cloud, |tenant: &str, record: &AuthenticationRecord| {
        SilentTenantCredential::new(cache.clone(), tenant, record)
    })
    .on_progress(spinner.updater());

    let result = discoverer.refresh_saved(store).await;
    spinner.finish();
    let (discovery, refreshed) = result?;
    report_partial_discovery(&discovery.warnings);
    Ok(refreshed)
}

fn is_enabled(subscription: &Subscription) -> bool {
    subscription.state.is_empty() || subscription.state.eq_ignore_ascii_case("enabled")
}
