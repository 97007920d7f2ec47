use {anyhow::Result, clap::Subcommand};

use switchboard_config::{Diagnostic, Severity, SwitchboardConfig, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check,
}

pub fn handle_config(action: &ConfigAction, config: &SwitchboardConfig) -> Result<()> {
    match action {
        ConfigAction::Check => check(config),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn format_diagnostic(d: &Diagnostic) -> String {
    let color = match d.severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
    };
    if d.path.is_empty() {
        format!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message)
    } else {
        format!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message)
    }
}

fn check(config: &SwitchboardConfig) -> Result<()> {
    match switchboard_config::find_config_file() {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let result = validate(config);
    for d in &result.diagnostics {
        eprintln!("{}", format_diagnostic(d));
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
