//! Execution engine: run a plan against the cluster, one change at a time.
//!
//! The state file is saved after every successful change, so an aborted run
//! leaves it describing exactly what was done. The first failure stops the
//! run; re-running `apply` picks up from there.

use anyhow::Result;
use colored::Colorize;
use reconcile::{Context, Failure, Resource};
use std::path::Path;

use crate::progress::{self, SpinnerObserver};
use crate::state::State;

use super::differ::display_plan;
use super::planner::{Action, Change, Plan};

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Skip confirmation prompts
    pub yes: bool,
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
}

/// Outcome of one change
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    Created,
    Modified,
    Removed,
    Failed { failure: Failure },
    Skipped { reason: String },
}

/// Summary of execution results
#[derive(Debug, Default)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Where results are persisted as the run progresses
pub struct StateSink<'a> {
    pub state: &'a mut State,
    pub path: Option<&'a Path>,
}

impl StateSink<'_> {
    fn save(&self) -> Result<()> {
        match self.path {
            Some(path) => self.state.save(path),
            None => Ok(()),
        }
    }
}

/// Show the plan, confirm, then execute it
pub fn execute(
    plan: &Plan,
    ctx: &Context<'_>,
    sink: &mut StateSink<'_>,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    display_plan(plan);

    if plan.is_empty() {
        return Ok(ExecuteSummary::default());
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary::default());
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: plan.changes.len(),
            ..Default::default()
        });
    }

    println!();
    println!("  {} Applying {} change(s)...", "→".cyan(), plan.changes.len());

    let summary = run(plan, ctx, sink)?;
    print_summary(&summary);
    Ok(summary)
}

/// Execute without any prompt or plan display
pub fn run(plan: &Plan, ctx: &Context<'_>, sink: &mut StateSink<'_>) -> Result<ExecuteSummary> {
    let mut summary = ExecuteSummary::default();
    let mut halted = false;

    for change in &plan.changes {
        let result = if halted {
            ApplyResult::Skipped {
                reason: "an earlier change failed".to_string(),
            }
        } else {
            let label = format!("{} {}", change.action, change.address);
            let bar = progress::spinner(&label);
            let observer = SpinnerObserver::new(bar.clone(), label);
            let ctx = ctx.with_observer(&observer);

            let result = apply_change(change, &ctx, sink.state);
            bar.finish_and_clear();
            result
        };

        report(change, &result);
        if matches!(result, ApplyResult::Failed { .. }) {
            halted = true;
        } else if !matches!(result, ApplyResult::Skipped { .. }) {
            sink.save()?;
        }
        summary.record(&result);
    }

    Ok(summary)
}

fn apply_change(change: &Change, ctx: &Context<'_>, state: &mut State) -> ApplyResult {
    let outcome = match (change.action, &change.declared, &change.observed) {
        (Action::Create, Some(declared), _) => declared.create(ctx).map(|created| {
            state.upsert(created);
            ApplyResult::Created
        }),
        (Action::Update, Some(declared), Some(observed)) => {
            declared.update(ctx, observed).map(|updated| {
                state.upsert(updated);
                ApplyResult::Modified
            })
        }
        (Action::Delete, _, Some(observed)) => observed.delete(ctx).map(|()| {
            state.forget(&change.address);
            ApplyResult::Removed
        }),
        _ => {
            return ApplyResult::Skipped {
                reason: "incomplete change".to_string(),
            };
        }
    };

    outcome.unwrap_or_else(|err| {
        log::debug!("{} failed: {err:?}", change.address);
        ApplyResult::Failed {
            failure: err.to_failure(),
        }
    })
}

fn report(change: &Change, result: &ApplyResult) {
    match result {
        ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => {
            println!("    {} {} {}", "✓".green(), change.action, change.address);
        }
        ApplyResult::Failed { failure } => {
            println!("    {} {} {}", "✗".red(), change.action, change.address);
            println!("      {}", failure.to_string().red());
        }
        ApplyResult::Skipped { reason } => {
            println!(
                "    {} {} {} {}",
                "⊘".dimmed(),
                change.action,
                change.address,
                format!("({reason})").dimmed()
            );
        }
    }
}

/// Re-read every tracked object
///
/// Objects the cluster no longer knows are dropped from the state.
pub fn refresh(ctx: &Context<'_>, state: &mut State) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary::default();
    let tracked: Vec<Resource> = state.snapshots().cloned().collect();

    for snapshot in tracked {
        let address = snapshot.address();
        match snapshot.read(ctx) {
            Ok(observed) => {
                if observed.address() != address {
                    log::info!("{address} was renamed to {}", observed.address());
                    state.forget(&address);
                }
                state.upsert(observed);
                summary.refreshed += 1;
            }
            Err(err) if err.is_not_found() => {
                log::warn!("{address} no longer exists; dropping it from state");
                state.forget(&address);
                summary.vanished.push(address);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(summary)
}

#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub vanished: Vec<String>,
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Cluster converged!", "✓".green().bold());
    } else {
        println!("  {} Apply stopped on an error", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
