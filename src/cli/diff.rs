use super::{bootstrap, short_id};
use crate::store::ContentStore;
use crate::{Context, Result};
use colored::Colorize;

/// Show what a variant changed relative to the benchmark base
pub async fn run(session: &str, target: Option<String>) -> Result<()> {
    let app = bootstrap()?;

    let Some((_, record)) = app.bench.resolve_parent_record(session)? else {
        println!(
            "{}",
            format!("No benchmark attached to session {}", short_id(session)).yellow()
        );
        return Ok(());
    };

    let Some((_, child_id)) = app.bench.resolve_child(session, target.as_deref())? else {
        println!(
            "{}",
            "Name a variant to diff: benchd diff --session <parent> --target <variant>".yellow()
        );
        return Ok(());
    };

    let snapshot = app
        .bench
        .latest_snapshot(&child_id)?
        .with_context(|| format!("variant {} has not produced a snapshot yet", short_id(&child_id)))?;

    let diff = app
        .store
        .diff_between(&record.base_snapshot, &snapshot)
        .await?;
    if diff.trim().is_empty() {
        println!("No changes against the benchmark base.");
    } else {
        print!("{}", diff);
    }
    Ok(())
}
