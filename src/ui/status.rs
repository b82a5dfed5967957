use dialoguer::console::style;

pub enum CommandStatus {
    Success,
    Error,
    Warning,
    /// Follow-up to the line above, e.g. the command that fixes a warning.
    Hint,
}

fn status_line(status: CommandStatus, message: &str) -> String {
    match status {
        CommandStatus::Success => format!("{} {message}", style("✓").green()),
        CommandStatus::Error => format!("{} {message}", style("✗").red()),
        CommandStatus::Warning => format!("{} {message}", style("!").yellow()),
        CommandStatus::Hint => format!("  {}", style(format!("→ {message}")).dim()),
    }
}

pub fn print_command_status(status: CommandStatus, message: &str) {
    eprintln!("{}", status_line(status, message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_are_indented_under_their_status() {
        dialoguer::console::set_colors_enabled(false);
        assert_eq!(status_line(CommandStatus::Warning, "Skipped tenant t2"), "! Skipped tenant t2");
        assert_eq!(
            status_line(CommandStatus::Hint, "run `azctl login --tenant t2`"),
            "  → run `azctl login --tenant t2`"
        );
    }
}
