use colored::{ColoredString, Colorize};
use declarative::{Action, ActionType, ExecuteSummary, Plan};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plans
// ============================================================================

fn verb(todo: ActionType) -> ColoredString {
    let text = todo.as_str();
    match todo {
        ActionType::Install | ActionType::Ensure | ActionType::Setup => text.green(),
        ActionType::Update | ActionType::Import => text.yellow(),
        ActionType::Remove | ActionType::Cleanup => text.red(),
        ActionType::Dump => text.magenta(),
        ActionType::Start
        | ActionType::Stop
        | ActionType::Restart
        | ActionType::Reload
        | ActionType::Enable
        | ActionType::Disable => text.cyan(),
        ActionType::Mount => text.normal(),
    }
}

/// One numbered, coloured plan line
pub fn plan_line(num: usize, action: &Action) -> String {
    let mut line = format!(
        "{} {} {}",
        format!("{:>3}.", num).dimmed(),
        verb(action.todo),
        action.target
    );
    if let Some(diff) = &action.diff {
        let (added, removed) = (diff.insertions(), diff.deletions());
        if added + removed > 0 {
            line.push_str(&format!(
                " {}",
                format!("(+{} -{})", added, removed).dimmed()
            ));
        }
    }
    line
}

/// Print every step of a plan
pub fn print_plan(plan: &Plan, show_diffs: bool) {
    for (idx, action) in plan.steps().iter().enumerate() {
        println!("{}", plan_line(idx + 1, action));
        if show_diffs {
            if let Some(diff) = action.diff.as_ref().filter(|d| !d.is_unchanged()) {
                for line in diff.to_patch().lines() {
                    let styled = if line.starts_with('+') {
                        line.green()
                    } else if line.starts_with('-') {
                        line.red()
                    } else {
                        line.normal()
                    };
                    println!("       {}", styled);
                }
            }
        }
    }
}

/// Print the outcome of an execution
pub fn print_summary(summary: &ExecuteSummary) {
    if summary.nothing_to_do {
        success("Nothing to do");
        return;
    }
    success(&format!("Applied {} steps", summary.completed));
    for (label, count) in [
        ("Installed", summary.installed),
        ("Updated", summary.updated),
        ("Removed", summary.removed),
        ("Service actions", summary.service_actions),
        ("Host actions", summary.host_actions),
    ] {
        if count > 0 {
            kv(label, &count.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use components::{Component, ContentDiff, Resource};
    use std::sync::Arc;

    #[test]
    fn test_plan_line_mentions_target_and_diff() {
        colored::control::set_override(false);
        let app = Arc::new(Component::new("app"));
        let action = Action::new(ActionType::Update, &app, Resource::from_path("app", "app.env"))
            .with_diff(ContentDiff::text_diff("A=1\n", "A=2\nB=3\n"));
        let line = plan_line(2, &action);
        assert!(line.contains("2. update file app/app.env"));
        assert!(line.contains("(+"));
    }

    #[test]
    fn test_plan_line_without_diff() {
        colored::control::set_override(false);
        let app = Arc::new(Component::new("app"));
        let action = Action::new(ActionType::Install, &app, app.to_resource());
        assert_eq!(plan_line(10, &action), " 10. install component app");
    }
}
