//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows as a table, or as a JSON array.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", format_json(data, "[]")),
    }
}

/// Print one JSON document regardless of format.
pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| fallback.to_string())
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}
