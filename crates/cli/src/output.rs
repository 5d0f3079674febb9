//! Output formatting
//!
//! Results go to stdout as JSON so they can be piped; status lines go to
//! stderr with colors.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

pub struct OutputHandler {
    pub pretty: bool,
}

impl OutputHandler {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Print a value as JSON on stdout
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{}", json);
        Ok(())
    }

    /// Print a section header
    pub fn print_header(&self, text: &str) {
        eprintln!();
        eprintln!("{}", format!("▶ {}", text).bright_yellow().bold());
        eprintln!("{}", "─".repeat(60).dimmed());
    }

    /// Print a success message
    pub fn print_success(&self, text: &str) {
        eprintln!("{} {}", "✓".bright_green(), text.bright_white());
    }

    /// Print an error message
    pub fn print_error(&self, text: &str) {
        eprintln!("{} {}", "✗".bright_red(), text.bright_red());
    }

    /// Print a warning message
    pub fn print_warning(&self, text: &str) {
        eprintln!("{} {}", "⚠".bright_yellow(), text.yellow());
    }

    /// Print a key/value line
    pub fn print_field(&self, key: &str, value: &str) {
        eprintln!("  {} {}", format!("{}:", key).dimmed(), value);
    }
}
