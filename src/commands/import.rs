use anyhow::{Context as AnyhowContext, Result, bail};
use reconcile::Resource;

use crate::Globals;
use crate::engine::planner::Target;
use crate::ui;

use super::Session;

/// Start tracking an object that already exists on the cluster.
///
/// The address must name the object as the cluster knows it, so the next
/// plan compares it against the matching manifest entry.
pub fn run(globals: &Globals, address: &str, id: &str) -> Result<()> {
    let target = Target::parse(address)?;
    let Some(key) = target.key.as_deref() else {
        bail!("Import needs a full address (kind.key), got '{address}'");
    };
    let id = id.trim().trim_start_matches('#');
    if id.is_empty() {
        bail!("Empty object id");
    }

    let mut session = Session::open(globals)?;
    if session.state.get(address).is_some() {
        bail!("{address} is already tracked; `ytconverge show {address}` prints it");
    }

    let ctx = session.remote.context();
    let imported = Resource::import(target.kind, &ctx, id)
        .with_context(|| format!("Could not import #{id} as {}", target.kind))?;
    if imported.key() != key {
        bail!("#{id} is {}, not {address}", imported.address());
    }

    session.state.upsert(imported);
    session.save()?;
    ui::success(format!("Imported {address} (#{id})"));
    Ok(())
}
