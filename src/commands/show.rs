use anyhow::Result;
use reconcile::Resource;

use crate::Globals;
use crate::engine::planner::Target;
use crate::paths;
use crate::state::State;
use crate::ui;

/// Print tracked snapshots from the state file. Never contacts the cluster.
pub fn run(globals: &Globals, target: Option<&str>) -> Result<()> {
    let target = target.map(Target::parse).transpose()?;
    let path = match &globals.state {
        Some(path) => path.clone(),
        None => paths::state_file()?,
    };
    let state = State::load(&path)?;

    let selected: Vec<&Resource> = state
        .snapshots()
        .filter(|r| target.as_ref().is_none_or(|t| t.matches(r)))
        .collect();

    if selected.is_empty() {
        if !globals.quiet {
            ui::info("Nothing tracked");
        }
        return Ok(());
    }

    if !globals.quiet {
        ui::header(state.cluster.as_deref().unwrap_or("(no cluster)"));
        ui::kv("state", &ui::truncate(&path.display().to_string(), 60));
        ui::kv("tracked", selected.len());
    }
    for resource in selected {
        ui::section(&resource.address());
        println!("{}", serde_json::to_string_pretty(resource)?);
    }
    Ok(())
}
