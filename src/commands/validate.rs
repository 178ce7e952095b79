use anyhow::Result;
use reconcile::Kind;
use std::collections::BTreeMap;

use crate::Globals;
use crate::ui;

use super::load_manifest;

pub fn run(globals: &Globals) -> Result<()> {
    let manifest = load_manifest(globals)?;
    if globals.quiet {
        return Ok(());
    }

    if manifest.is_empty() {
        ui::warn(format!("{} declares nothing", globals.manifest.display()));
        return Ok(());
    }

    let mut counts: BTreeMap<Kind, usize> = BTreeMap::new();
    for resource in manifest.resources() {
        *counts.entry(resource.kind()).or_default() += 1;
    }

    ui::success(format!(
        "{} is valid ({})",
        globals.manifest.display(),
        ui::count(manifest.len(), "resource")
    ));
    for (kind, n) in counts {
        ui::kv(&kind.to_string(), n);
    }
    ui::dim("Run `ytconverge plan` to compare it with the cluster");
    Ok(())
}
