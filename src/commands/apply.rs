//! `apply` and `destroy`

use anyhow::{Result, bail};

use crate::Globals;
use crate::cli::ApplyArgs;
use crate::engine::executor::{self, ExecuteOptions, ExecuteSummary, StateSink};
use crate::engine::planner::{self, Plan, Target};
use crate::ui;

use super::{Session, load_manifest};

pub fn apply(globals: &Globals, args: &ApplyArgs) -> Result<()> {
    let target = args.target.as_deref().map(Target::parse).transpose()?;
    let manifest = load_manifest(globals)?;
    let mut session = Session::open(globals)?;

    {
        let ctx = session.remote.context();
        executor::refresh(&ctx, &mut session.state)?;
    }
    session.save()?;

    let plan = planner::build(&manifest.resources(), &session.state, target.as_ref())?;
    converge(&mut session, &plan, args)
}

pub fn destroy(globals: &Globals, args: &ApplyArgs) -> Result<()> {
    let target = args.target.as_deref().map(Target::parse).transpose()?;
    let mut session = Session::open(globals)?;

    {
        let ctx = session.remote.context();
        executor::refresh(&ctx, &mut session.state)?;
    }
    session.save()?;

    let plan = planner::destroy(&session.state, target.as_ref());
    if !plan.is_empty() && !args.dry_run {
        ui::warn(format!(
            "This deletes {} from {}",
            ui::count(plan.changes.len(), "object"),
            session.remote.cluster
        ));
    }
    converge(&mut session, &plan, args)
}

fn converge(session: &mut Session, plan: &Plan, args: &ApplyArgs) -> Result<()> {
    if !plan.is_empty() && !args.yes && !args.dry_run && !ui::is_interactive() {
        bail!("Refusing to change the cluster without a terminal; pass --yes to confirm");
    }

    let opts = ExecuteOptions {
        yes: args.yes,
        dry_run: args.dry_run,
    };
    let ctx = session.remote.context();
    let mut sink = StateSink {
        state: &mut session.state,
        path: Some(&session.state_path),
    };
    let summary = executor::execute(plan, &ctx, &mut sink, &opts)?;
    check(&summary)
}

fn check(summary: &ExecuteSummary) -> Result<()> {
    if !summary.is_success() {
        bail!(
            "{} change(s) failed; state records the {} that succeeded",
            summary.failed,
            summary.total_changes()
        );
    }
    Ok(())
}
