//! Output formatting utilities for the CLI

use colored::Colorize;
use console::{style, Emoji};

static INFO: Emoji = Emoji("ℹ️ ", "");
static SUCCESS: Emoji = Emoji("✅", "✓");
static WARNING: Emoji = Emoji("⚠️ ", "!");
static ERROR: Emoji = Emoji("❌", "x");

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style(INFO).blue(), message);
}

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style(SUCCESS).green(), message.green());
}

/// Print a warning message
pub fn warn(message: &str) {
    eprintln!("{} {}", style(WARNING).yellow(), message.yellow());
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style(ERROR).red(), message.red());
}

/// Print a header
pub fn header(title: &str) {
    println!("\n{}\n", title.bold().underline());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("{}: {}", key.bold(), value);
}

/// Print a bullet point
pub fn bullet(message: &str) {
    println!("  • {}", message);
}
