use anyhow::Result;

use crate::Globals;
use crate::engine::executor;
use crate::ui;

use super::Session;

pub fn run(globals: &Globals) -> Result<()> {
    let mut session = Session::open(globals)?;
    let ctx = session.remote.context();

    let summary = executor::refresh(&ctx, &mut session.state)?;
    session.save()?;

    if globals.quiet {
        return Ok(());
    }
    ui::success(format!(
        "Refreshed {} on {}",
        ui::count(summary.refreshed, "object"),
        session.remote.cluster
    ));
    for address in &summary.vanished {
        ui::warn(format!("{address} no longer exists and was dropped"));
    }
    Ok(())
}
