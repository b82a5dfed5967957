use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod account;
mod args;
mod arm;
mod cloud;
mod config;
mod discovery;
mod env;
mod identity;
mod login;
mod profile;
mod resolver;
mod ui;
mod utils;

use crate::args::{BaseArgs, CLIArgs};
use crate::ui::{print_command_status, CommandStatus};

/// Exit status for a run cut short by Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "azctl", about = "Azure sign-in and subscription manager", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sign in and discover every reachable subscription
    Login(CLIArgs<login::LoginArgs>),
    /// Remove the saved profile and cached tokens
    Logout(CLIArgs<login::LogoutArgs>),
    /// Inspect and change the saved subscriptions
    Account(CLIArgs<account::AccountArgs>),
}

impl Commands {
    fn base(&self) -> &BaseArgs {
        match self {
            Commands::Login(cmd) => &cmd.base,
            Commands::Logout(cmd) => &cmd.base,
            Commands::Account(cmd) => &cmd.base,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let imported = env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);
    init_tracing(cli.command.base().verbose);
    if !imported.files.is_empty() {
        debug!(
            files = ?imported.files,
            applied = ?imported.applied,
            ignored = imported.ignored.len(),
            "loaded env files"
        );
    }

    let command = async {
        match cli.command {
            Commands::Login(cmd) => login::run(cmd.base, cmd.args).await,
            Commands::Logout(cmd) => login::run_logout(cmd.base),
            Commands::Account(cmd) => account::run(cmd.base, cmd.args).await,
        }
    };

    // Dropping the command future abandons in-flight requests; profiles are
    // only written after discovery completes.
    tokio::select! {
        result = command => result,
        _ = tokio::signal::ctrl_c() => {
            print_command_status(CommandStatus::Error, "Interrupted");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

/// `--verbose` turns on azctl's debug events and keeps warnings from
/// everything else; otherwise `AZCTL_LOG` decides, defaulting to warn.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("warn,azctl=debug")
    } else {
        EnvFilter::try_from_env("AZCTL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
