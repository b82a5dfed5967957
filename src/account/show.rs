use anyhow::Result;

use crate::args::BaseArgs;
use crate::resolver::ResolveError;

pub fn run(base: &BaseArgs, subscription: Option<&str>) -> Result<()> {
    let store = base.profile_store()?;
    let profile = store.load()?;
    let subscription = match subscription {
        Some(wanted) => profile.find(wanted)?,
        None => profile
            .default_subscription()
            .ok_or(ResolveError::NoSubscriptions)?,
    };

    if base.json {
        println!("{}", serde_json::to_string_pretty(subscription)?);
        return Ok(());
    }

    let tenant = match (&subscription.tenant_display_name, &subscription.tenant_default_domain) {
        (Some(name), Some(domain)) => format!("{name} ({domain})"),
        (Some(name), None) => name.clone(),
        (None, Some(domain)) => domain.clone(),
        (None, None) => "-".to_string(),
    };
    let is_default = profile
        .default_subscription()
        .is_some_and(|d| d.id == subscription.id);

    println!("Name:          {}", subscription.name);
    println!("ID:            {}", subscription.id);
    println!("State:         {}", subscription.state);
    println!("Tenant:        {tenant}");
    println!("Tenant ID:     {}", subscription.tenant_id);
    println!("Home tenant:   {}", subscription.home_tenant_id);
    println!("User:          {}", subscription.user);
    println!("Cloud:         {}", subscription.environment_name);
    println!("Default:       {is_default}");
    Ok(())
}
