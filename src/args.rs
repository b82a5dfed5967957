use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::cloud::{Cloud, DEFAULT_CLOUD};
use crate::config::resolve_config_dir;
use crate::profile::ProfileStore;

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Directory holding the profile and token cache (or via AZCTL_CONFIG_DIR)
    #[arg(long, env = "AZCTL_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Cloud environment to sign in to (or via AZCTL_CLOUD)
    #[arg(long, env = "AZCTL_CLOUD", default_value = DEFAULT_CLOUD, global = true)]
    pub cloud: String,

    /// Log debug output to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "AZCTL_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

impl BaseArgs {
    pub fn cloud(&self) -> Result<&'static Cloud> {
        Ok(Cloud::by_name(&self.cloud)?)
    }

    pub fn profile_store(&self) -> Result<ProfileStore> {
        let dir = resolve_config_dir(self.config_dir.as_deref())?;
        Ok(ProfileStore::new(&dir))
    }
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
