use anyhow::Result;

use crate::Globals;
use crate::engine::planner::{self, Target};
use crate::engine::{differ, executor};

use super::{Session, load_manifest};

/// Refresh, then show what apply would change.
pub fn run(globals: &Globals, target: Option<&str>) -> Result<()> {
    let target = target.map(Target::parse).transpose()?;
    let manifest = load_manifest(globals)?;

    let mut session = Session::open(globals)?;
    let ctx = session.remote.context();
    executor::refresh(&ctx, &mut session.state)?;
    session.save()?;

    let plan = planner::build(&manifest.resources(), &session.state, target.as_ref())?;
    differ::display_plan(&plan);
    Ok(())
}
