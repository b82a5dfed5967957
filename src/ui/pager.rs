//! Paging for listings that outgrow the terminal, such as
//! `account list --all` over many tenants.

use std::io::{self, IsTerminal, Write};
use std::process::{Command, Stdio};

use tracing::debug;

const DEFAULT_PAGER: &str = "less -FRX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Page when stdout is a terminal and the output is taller than it.
    Auto,
    Never,
}

pub fn print_with_pager(output: &str, paging: Paging) -> io::Result<()> {
    let pager = match paging {
        Paging::Auto if io::stdout().is_terminal() => {
            let (_, rows) = crossterm::terminal::size().unwrap_or((80, 24));
            (output.lines().count() > usize::from(rows)).then(|| {
                pager_command(
                    std::env::var("AZCTL_PAGER").ok(),
                    std::env::var("PAGER").ok(),
                )
            })
        }
        _ => None,
    };

    let Some((program, args)) = pager else {
        println!("{output}");
        return Ok(());
    };

    match Command::new(&program).args(&args).stdin(Stdio::piped()).spawn() {
        Ok(mut child) => {
            if let Some(mut stdin) = child.stdin.take() {
                // The user may quit the pager before reading everything.
                let _ = writeln!(stdin, "{output}");
            }
            child.wait()?;
        }
        Err(e) => {
            debug!(pager = %program, error = %e, "pager unavailable, printing directly");
            println!("{output}");
        }
    }
    Ok(())
}

/// `AZCTL_PAGER` wins over `PAGER`; blank values are skipped.
fn pager_command(azctl_pager: Option<String>, pager: Option<String>) -> (String, Vec<String>) {
    let command = [azctl_pager, pager]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PAGER.to_string());

    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_else(|| "less".to_string());
    (program, parts.collect())
}
