use super::Session;
use crate::{Context, progress, ui};
use anyhow::Result;
use colored::Colorize;
use reconcile::VersionCatalog;

/// List enabled versions of a channel group, newest first
pub fn run(ctx: &Context, channel_group: &str) -> Result<()> {
    let session = Session::connect(ctx)?;

    let pb = progress::spinner("Fetching version catalog...", ctx.quiet);
    let catalog = VersionCatalog::fetch(&session.client);
    pb.finish_and_clear();
    let catalog = catalog?;

    let entries = catalog.available(channel_group);
    if entries.is_empty() {
        ui::warn(&format!("No enabled versions in channel group '{channel_group}'"));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Versions in '{channel_group}'"));
    }
    for entry in entries {
        let marker = if entry.default {
            " (default)".green().to_string()
        } else {
            String::new()
        };
        println!("  {:<12} {}{}", entry.raw_id, entry.canonical_id().dimmed(), marker);
    }

    Ok(())
}
