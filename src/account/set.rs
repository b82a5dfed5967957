use anyhow::{Context, Result};

use crate::args::BaseArgs;
use crate::ui::{print_command_status, CommandStatus};

pub fn run(base: &BaseArgs, subscription: &str) -> Result<()> {
    let store = base.profile_store()?;
    let mut profile = store.load()?;
    let selected = profile.set_default(subscription)?.clone();
    store.save(&profile).context("failed to save profile")?;

    if base.json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
    } else {
        print_command_status(
            CommandStatus::Success,
            &format!("Default subscription: {} ({})", selected.name, selected.id),
        );
    }
    Ok(())
}
