use std::io::IsTerminal;

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, FuzzySelect};

use crate::profile::Subscription;

/// Fuzzy select from a list of items. Requires TTY.
pub fn fuzzy_select<T: ToString>(prompt: &str, items: &[T]) -> Result<usize> {
    if !std::io::stdin().is_terminal() {
        bail!("interactive mode requires TTY");
    }

    if items.is_empty() {
        bail!("no items to select from");
    }

    let labels: Vec<String> = items.iter().map(|i| i.to_string()).collect();

    let selection = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(selection)
}

/// Pick the default subscription; returns its id.
pub fn select_subscription_interactive(subscriptions: &[Subscription]) -> Result<String> {
    let labels: Vec<String> = subscriptions
        .iter()
        .map(|s| {
            let tenant = s
                .tenant_display_name
                .as_deref()
                .or(s.tenant_default_domain.as_deref())
                .unwrap_or(&s.tenant_id);
            format!("{}  ({})  {}", s.name, s.id, tenant)
        })
        .collect();

    let selection = fuzzy_select("Select default subscription", &labels)?;
    Ok(subscriptions[selection].id.clone())
}
