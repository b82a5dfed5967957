use anyhow::Result;
use clap::{Args, Subcommand};

use crate::args::BaseArgs;
use crate::discovery::PartialDiscoveryWarning;
use crate::profile::Subscription;
use crate::ui::{print_command_status, CommandStatus};

mod list;
mod set;
mod show;
mod token;

#[derive(Debug, Clone, Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    command: AccountCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum AccountCommands {
    /// List the subscriptions of the logged in account
    List(ListArgs),
    /// Show the default (or a given) subscription
    Show(ShowArgs),
    /// Change the default subscription
    Set(SetArgs),
    /// Forget all subscriptions and cached tokens (same as logout)
    Clear,
    /// Print an access token for the active tenant
    GetAccessToken(token::TokenArgs),
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// Discover subscriptions again using the cached login
    #[arg(long)]
    refresh: bool,

    /// Include subscriptions that are not enabled
    #[arg(long)]
    all: bool,

    /// Print the table directly even when it is taller than the terminal
    #[arg(long)]
    no_pager: bool,
}

#[derive(Debug, Clone, Args)]
struct ShowArgs {
    /// Subscription id or name (defaults to the default subscription)
    #[arg(long, short = 's')]
    subscription: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct SetArgs {
    /// Subscription id or name
    #[arg(long, short = 's')]
    subscription: String,
}

pub async fn run(base: BaseArgs, args: AccountArgs) -> Result<()> {
    match args.command {
        AccountCommands::List(list) => list::run(&base, &list).await,
        AccountCommands::Show(show) => show::run(&base, show.subscription.as_deref()),
        AccountCommands::Set(set) => set::run(&base, &set.subscription),
        AccountCommands::Clear => crate::login::run_logout(base),
        AccountCommands::GetAccessToken(token) => token::run(&base, &token).await,
    }
}

pub fn print_subscriptions_json(subscriptions: &[Subscription]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(subscriptions)?);
    Ok(())
}

pub fn report_partial_discovery(warnings: &[PartialDiscoveryWarning]) {
    for warning in warnings {
        print_command_status(
            CommandStatus::Warning,
            &format!("Skipped tenant {}: {}", warning.tenant_id, warning.message),
        );
        if warning.requires_login {
            print_command_status(
                CommandStatus::Hint,
                &format!("run `azctl login --tenant {}` to sign in to it", warning.tenant_id),
            );
        }
    }
}
