use super::Session;
use crate::state::Bindings;
use crate::{Context, progress, specfile, ui};
use anyhow::{Context as _, Result};
use colored::Colorize;
use dialoguer::Confirm;
use reconcile::{
    ApplyOutcome, CancelToken, ClusterDocument, ClusterSpec, DestroyOutcome, DestroyWaitPolicy,
    UpdateOutcome, Validator,
};
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Validate
// ============================================================================

/// Check a spec locally
pub fn validate(ctx: &Context, path: &Path) -> Result<()> {
    let spec = specfile::load(path)?;
    Validator::new().validate(&spec).map_err(reconcile::Error::from)?;

    if !ctx.quiet {
        ui::success(&format!("{} is valid", spec.name));
    }
    Ok(())
}

// ============================================================================
// Plan
// ============================================================================

/// Show what `apply` would do
pub fn plan(ctx: &Context, path: &Path) -> Result<()> {
    let spec = specfile::load(path)?;
    let session = Session::connect(ctx)?;
    let controller = session.controller();
    let bindings = Bindings::load()?;

    let existing = match bindings.id(&spec.name) {
        Some(id) => controller.read(id)?.map(|_| id),
        None => None,
    };

    let Some(id) = existing else {
        let document = controller.prepare_create(&spec)?;
        ui::header(&format!("Create {}", spec.name));
        println!("{}", pretty(&document)?);
        return Ok(());
    };

    let plan = controller.plan(id, &spec)?;
    if plan.changes.is_empty() {
        ui::success(&format!("{} is up to date", spec.name));
        return Ok(());
    }

    ui::header(&format!("Update {} ({id})", spec.name));
    for edit in &plan.changes {
        ui::edit(edit);
    }

    if !ctx.quiet {
        println!();
        let before = pretty(&plan.current)?;
        let after = pretty(&plan.preview()?)?;
        for line in diff_lines(&before, &after) {
            print!("    {line}");
        }
    }
    Ok(())
}

// ============================================================================
// Apply
// ============================================================================

/// Create or update the cluster described by the spec
pub fn apply(ctx: &Context, path: &Path, yes: bool) -> Result<()> {
    let spec = specfile::load(path)?;
    let session = Session::connect(ctx)?;
    let controller = session.controller();
    let mut bindings = Bindings::load()?;
    let binding = bindings.id(&spec.name).map(str::to_string);

    if !yes {
        let action = if binding.is_some() { "Update" } else { "Create" };
        let confirmed = Confirm::new()
            .with_prompt(format!("{action} cluster '{}'?", spec.name))
            .default(false)
            .interact()?;
        if !confirmed {
            ui::info("Aborted");
            return Ok(());
        }
    }

    let outcome = controller.apply(binding.as_deref(), &spec)?;
    let document = outcome.document();
    let id = document.require_id()?;

    bindings.bind(&spec.name, id);
    bindings.save()?;

    match &outcome {
        ApplyOutcome::Created(_) => ui::success(&format!("Created {} ({id})", spec.name)),
        ApplyOutcome::Updated(UpdateOutcome::Unchanged(_)) => {
            ui::success(&format!("{} is up to date", spec.name));
        }
        ApplyOutcome::Updated(UpdateOutcome::Patched { changes, .. }) => {
            ui::success(&format!("Updated {} ({} changes)", spec.name, changes.len()));
            if !ctx.quiet {
                for edit in changes {
                    ui::edit(edit);
                }
            }
        }
    }

    if !ctx.quiet {
        describe(document);
    }
    Ok(())
}

// ============================================================================
// Show
// ============================================================================

/// Print the remote state of the cluster
pub fn show(ctx: &Context, path: &Path) -> Result<()> {
    let spec = specfile::load(path)?;
    let bindings = Bindings::load()?;
    let Some(id) = bindings.id(&spec.name) else {
        ui::warn(&format!("{} has not been created by rosaform", spec.name));
        return Ok(());
    };

    let session = Session::connect(ctx)?;
    match session.controller().read(id)? {
        Some(document) => {
            describe(&document);
            if ctx.verbose > 0 {
                println!();
                print!("{}", pretty(&document)?);
            }
        }
        None => ui::warn(&format!("{} ({id}) no longer exists", spec.name)),
    }
    Ok(())
}

fn describe(document: &ClusterDocument) {
    ui::header(document.name.as_deref().unwrap_or("cluster"));
    let fields = [
        ("id", document.id.clone()),
        ("state", document.state.map(|s| s.to_string())),
        ("region", document.region.as_ref().map(|r| r.id.clone())),
        ("version", document.version.as_ref().map(|v| v.id.clone())),
        ("api", document.api.as_ref().and_then(|e| e.url.clone())),
        ("console", document.console.as_ref().and_then(|e| e.url.clone())),
        (
            "oidc endpoint",
            document
                .aws
                .as_ref()
                .and_then(|a| a.sts.as_ref())
                .and_then(|s| s.oidc_endpoint_url.clone()),
        ),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            ui::kv(key, &value);
        }
    }
}

// ============================================================================
// Destroy
// ============================================================================

/// Delete the cluster and wait for it to disappear
pub fn destroy(ctx: &Context, path: &Path, yes: bool, no_wait: bool, timeout: Option<u64>) -> Result<()> {
    let spec = specfile::load(path)?;
    let mut bindings = Bindings::load()?;
    let id = bindings
        .id(&spec.name)
        .map(str::to_string)
        .with_context(|| format!("{} has not been created by rosaform", spec.name))?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete cluster '{}' ({id})?", spec.name))
            .default(false)
            .interact()?;
        if !confirmed {
            ui::info("Aborted");
            return Ok(());
        }
    }

    let session = Session::connect(ctx)?;
    let controller = session.controller();
    let policy = destroy_policy(&spec, no_wait, timeout);

    let pb = progress::spinner(&format!("Deleting {}...", spec.name), ctx.quiet || policy.disabled);
    let outcome = controller.destroy(&id, &policy, &CancelToken::new());
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            pb.finish_and_clear();
            return Err(err.into());
        }
    };

    // The delete was accepted; only the wait can fall short.
    bindings.unbind(&spec.name);
    bindings.save()?;

    match (outcome, outcome.warning()) {
        (DestroyOutcome::Confirmed { waited }, _) => progress::finish_success(
            &pb,
            &format!("Deleted {} ({})", spec.name, ui::format_duration(waited)),
        ),
        (_, Some(warning)) => {
            pb.finish_and_clear();
            ui::warn(&warning);
        }
        (_, None) => pb.finish_and_clear(),
    }
    Ok(())
}

/// Destroy policy from the spec, with command-line overrides applied
fn destroy_policy(spec: &ClusterSpec, no_wait: bool, timeout: Option<u64>) -> DestroyWaitPolicy {
    if no_wait {
        return DestroyWaitPolicy::disabled();
    }
    let policy = DestroyWaitPolicy::from_spec(spec);
    match timeout {
        Some(minutes) => policy.with_timeout(Duration::from_secs(minutes.saturating_mul(60))),
        None => policy,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn pretty(document: &ClusterDocument) -> Result<String> {
    let mut text = serde_json::to_string_pretty(document).context("Failed to render cluster document")?;
    text.push('\n');
    Ok(text)
}

/// Colored `-`/`+` lines between two renderings; equal lines are dropped
fn diff_lines(before: &str, after: &str) -> Vec<String> {
    let diff = TextDiff::from_lines(before, after);
    diff.iter_all_changes()
        .filter_map(|change| match change.tag() {
            ChangeTag::Delete => Some(format!("- {change}").red().to_string()),
            ChangeTag::Insert => Some(format!("+ {change}").green().to_string()),
            ChangeTag::Equal => None,
        })
        .collect()
}
