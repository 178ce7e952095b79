//! Plan display

use colored::{ColoredString, Colorize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use super::planner::{Action, Change, FieldChange, Plan};

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &Plan) {
    if plan.is_empty() {
        println!();
        println!(
            "  {} No changes needed ({} resource(s) up to date)",
            "✓".green(),
            plan.unchanged
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");

    for change in &plan.changes {
        println!("│ {} {}", symbol(change.action), change.address.bold());
        for line in describe(change) {
            println!("│     {line}");
        }
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to create, {} to update, {} to delete, {} unchanged",
        plan.count(Action::Create).to_string().green(),
        plan.count(Action::Update).to_string().yellow(),
        plan.count(Action::Delete).to_string().red(),
        plan.unchanged
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Update => "~".yellow(),
        Action::Delete => "-".red(),
    }
}

/// Detail lines under one change
fn describe(change: &Change) -> Vec<String> {
    match change.action {
        Action::Delete => {
            let id = change
                .observed
                .as_ref()
                .and_then(|r| r.id())
                .unwrap_or("?");
            vec![format!("{}", format!("(will remove #{id})").dimmed())]
        }
        Action::Create | Action::Update => {
            change.fields.iter().flat_map(describe_field).collect()
        }
    }
}

fn describe_field(field: &FieldChange) -> Vec<String> {
    match (&field.before, &field.after) {
        (None, Some(after)) if is_scalar(after) => {
            vec![format!("{}: {}", field.name, render(after).green())]
        }
        (Some(before), None) => {
            vec![format!("{}: {} → {}", field.name, render(before).red(), "(removed)".dimmed())]
        }
        (Some(before), Some(after)) if is_scalar(before) && is_scalar(after) => vec![format!(
            "{}: {} → {}",
            field.name,
            render(before).red(),
            render(after).green()
        )],
        (before, after) => {
            let mut lines = vec![format!("{}:", field.name)];
            lines.extend(structured_diff(before.as_ref(), after.as_ref()));
            lines
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

fn pretty(value: Option<&Value>) -> String {
    value
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .map(|s| s + "\n")
        .unwrap_or_default()
}

/// Line diff of pretty-printed JSON
fn structured_diff(before: Option<&Value>, after: Option<&Value>) -> Vec<String> {
    let old = pretty(before);
    let new = pretty(after);
    let diff = TextDiff::from_lines(&old, &new);

    diff.iter_all_changes()
        .map(|change| {
            let text = change.to_string_lossy();
            let text = text.trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Delete => format!("{}", format!("- {text}").red()),
                ChangeTag::Insert => format!("{}", format!("+ {text}").green()),
                ChangeTag::Equal => format!("  {text}"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, before: Option<Value>, after: Option<Value>) -> FieldChange {
        FieldChange {
            name: name.to_string(),
            before,
            after,
        }
    }

    #[test]
    fn test_scalar_change_on_one_line() {
        colored::control::set_override(false);
        let lines = describe_field(&field("weight", Some(json!(1.0)), Some(json!(2.5))));
        assert_eq!(lines, vec!["weight: 1.0 → 2.5"]);
    }

    #[test]
    fn test_removal() {
        colored::control::set_override(false);
        let lines = describe_field(&field("mode", Some(json!("fifo")), None));
        assert_eq!(lines, vec!["mode: \"fifo\" → (removed)"]);
    }

    #[test]
    fn test_structured_change_uses_line_diff() {
        colored::control::set_override(false);
        let lines = describe_field(&field(
            "member_of",
            Some(json!(["devs", "ops"])),
            Some(json!(["devs", "sre"])),
        ));
        assert_eq!(lines[0], "member_of:");
        assert!(lines.contains(&"  [".to_string()));
        assert!(lines.iter().any(|l| l.starts_with('-') && l.ends_with("\"ops\"")));
        assert!(lines.iter().any(|l| l.starts_with('+') && l.ends_with("\"sre\"")));
        assert!(lines.iter().any(|l| l.trim() == "\"devs\","));
    }

    #[test]
    fn test_new_object_shows_full_value() {
        colored::control::set_override(false);
        let lines = describe_field(&field("options", None, Some(json!({"a": 1}))));
        assert_eq!(lines[0], "options:");
        assert!(lines.iter().skip(1).all(|l| l.starts_with("+ ")));
    }
}
