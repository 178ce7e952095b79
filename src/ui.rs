//! Terminal output helpers. Logs go through `log`; everything a user is
//! meant to read goes through here.

use colored::Colorize;
use std::fmt::Display;

pub fn info(msg: impl Display) {
    println!("{} {msg}", "ℹ".blue());
}

pub fn success(msg: impl Display) {
    println!("{} {msg}", "✓".green());
}

pub fn warn(msg: impl Display) {
    println!("{} {msg}", "⚠".yellow());
}

/// Errors go to stderr so piped `show` output stays parseable
pub fn error(msg: impl Display) {
    eprintln!("{} {msg}", "✗".red());
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Bold title with an underline as wide as the title
pub fn header(title: &str) {
    let rule = "─".repeat(title.chars().count());
    println!();
    println!("{}", title.bold());
    println!("{}", rule.dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

pub fn kv(key: &str, value: impl Display) {
    println!("  {}: {value}", key.dimmed());
}

/// `1 object`, `3 objects`
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Whether a human can answer prompts
pub fn is_interactive() -> bool {
    console::Term::stdout().is_term() && console::Term::stderr().is_term()
}

/// Shorten an id or path for display, keeping the end
pub fn truncate(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        return text.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let tail: String = text.chars().skip(len - (max_len - 3)).collect();
    format!("...{tail}")
}
