//! `.env` support. Project env files often carry unrelated secrets, so only
//! azctl's own settings (`AZCTL_*`, `AZURE_*`) are imported from them, and
//! variables already set in the process always win.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const ENV_FILE_VAR: &str = "AZCTL_ENV_FILE";
const IMPORTED_PREFIXES: &[&str] = &["AZCTL_", "AZURE_"];

/// What was read from env files, for logging once tracing is up.
#[derive(Debug, Default)]
pub struct EnvImport {
    pub files: Vec<PathBuf>,
    pub applied: Vec<String>,
    pub ignored: Vec<String>,
}

/// Runs before clap so env file values can feed `env = ...` defaults.
pub fn bootstrap_from_args(args: &[OsString]) -> Result<EnvImport> {
    let explicit = env_file_from_args(args).or_else(|| {
        std::env::var_os(ENV_FILE_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    import_env_files(&cwd, explicit)
}

fn import_env_files(cwd: &Path, explicit: Option<PathBuf>) -> Result<EnvImport> {
    // An explicit file must exist; the defaults are optional. `.env.local`
    // overrides `.env`.
    let candidates = match explicit {
        Some(path) => vec![(cwd.join(path), true)],
        None => vec![(cwd.join(".env"), false), (cwd.join(".env.local"), false)],
    };

    let mut import = EnvImport::default();
    let mut values = BTreeMap::new();
    for (path, required) in candidates {
        if !required && !path.exists() {
            continue;
        }
        let entries = dotenvy::from_path_iter(&path)
            .with_context(|| format!("failed to read env file {}", path.display()))?;
        for entry in entries {
            let (key, value) =
                entry.with_context(|| format!("failed to parse env file {}", path.display()))?;
            if !IMPORTED_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                import.ignored.push(key);
            } else if std::env::var_os(&key).is_none() {
                values.insert(key, value);
            }
        }
        import.files.push(path);
    }

    for (key, value) in values {
        std::env::set_var(&key, value);
        import.applied.push(key);
    }
    Ok(import)
}

/// `--env-file PATH` or `--env-file=PATH`, last one wins, nothing after `--`.
fn env_file_from_args(args: &[OsString]) -> Option<PathBuf> {
    let mut found = None;
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        let Some(arg) = arg.to_str() else {
            continue;
        };
        match arg {
            "--" => break,
            "--env-file" => found = rest.next().map(PathBuf::from),
            _ => {
                if let Some(value) = arg.strip_prefix("--env-file=") {
                    found = Some(PathBuf::from(value));
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn env_file_flag_is_found_before_parsing() {
        assert_eq!(
            env_file_from_args(&args(&["azctl", "account", "show", "--env-file", "ci.env"])),
            Some(PathBuf::from("ci.env"))
        );
        assert_eq!(
            env_file_from_args(&args(&["azctl", "--env-file=prod.env", "login"])),
            Some(PathBuf::from("prod.env"))
        );
        assert_eq!(
            env_file_from_args(&args(&["azctl", "login", "--", "--env-file", "x"])),
            None
        );
    }

    #[test]
    fn only_azctl_settings_are_imported() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(".env"),
            "AZCTL_ENV_TEST_CLOUD=AzureChinaCloud\nDATABASE_PASSWORD=hunter2\n",
        )
        .unwrap();

        let import = import_env_files(tmp.path(), None).unwrap();
        assert_eq!(import.files, vec![tmp.path().join(".env")]);
        assert_eq!(import.applied, vec!["AZCTL_ENV_TEST_CLOUD"]);
        assert_eq!(import.ignored, vec!["DATABASE_PASSWORD"]);
        assert_eq!(std::env::var("AZCTL_ENV_TEST_CLOUD").unwrap(), "AzureChinaCloud");
        assert!(std::env::var_os("DATABASE_PASSWORD").is_none());
    }

    #[test]
    fn local_file_overrides_and_process_wins() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(".env"),
            "AZCTL_ENV_TEST_LAYER=base\nAZCTL_ENV_TEST_KEEP=file\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join(".env.local"), "AZCTL_ENV_TEST_LAYER=local\n").unwrap();
        std::env::set_var("AZCTL_ENV_TEST_KEEP", "process");

        import_env_files(tmp.path(), None).unwrap();
        assert_eq!(std::env::var("AZCTL_ENV_TEST_LAYER").unwrap(), "local");
        assert_eq!(std::env::var("AZCTL_ENV_TEST_KEEP").unwrap(), "process");
    }

    #[test]
    fn explicit_file_must_exist() {
        let tmp = TempDir::new().unwrap();
        assert!(import_env_files(tmp.path(), Some(PathBuf::from("missing.env"))).is_err());
        assert!(import_env_files(tmp.path(), None).unwrap().files.is_empty());
    }
}
